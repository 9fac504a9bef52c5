//! STT backend contract (spec.md §4.7, §3 "STT Backend").

use async_trait::async_trait;

use crate::error::Result;

/// Per-request capability hints that influence backend scoring.
#[derive(Debug, Clone, Copy, Default)]
pub struct SelectionRequest {
    pub include_emotion: bool,
}

/// Detected emotion on a transcribed utterance.
#[derive(Debug, Clone)]
pub struct EmotionResult {
    pub primary_emotion: String,
    pub confidence: f32,
}

/// A non-speech audio event (laughter, applause, etc.) detected alongside
/// transcription.
#[derive(Debug, Clone)]
pub struct AudioEventResult {
    pub event_type: String,
    pub confidence: f32,
    pub start_time: Option<f32>,
    pub end_time: Option<f32>,
}

/// Result of a single transcription call.
#[derive(Debug, Clone)]
pub struct Transcript {
    pub text: String,
    pub confidence: f32,
    pub language: Option<String>,
    pub emotion: Option<EmotionResult>,
    pub audio_events: Vec<AudioEventResult>,
}

/// A registered speech-to-text provider.
#[async_trait]
pub trait SttBackend: Send + Sync {
    fn name(&self) -> &str;
    fn supports_emotion(&self) -> bool;
    fn supports_streaming(&self) -> bool;
    /// Whether this backend earns the router's "significantly faster" score
    /// boost (deployment-configured; spec.md §9 Open Questions).
    fn is_fast(&self) -> bool;

    /// Probe backend health. Called at most once per availability-check
    /// interval by the router; must not hold any lock while awaiting.
    async fn check_available(&self) -> bool;

    async fn transcribe(&self, audio: &[u8], request: &SelectionRequest) -> Result<Transcript>;
}

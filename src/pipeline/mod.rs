//! Top-level wiring for the voice dialogue pipeline (spec.md §9 Design
//! Notes).
//!
//! `Pipeline` is constructed with explicit dependency injection — no global
//! singletons or lazy statics — so tests can build fresh, isolated
//! instances per case and concurrent sessions never share barge-in state.

use std::sync::Arc;

use crate::bus::EventBus;
use crate::cache::AudioCache;
use crate::config::PipelineConfig;
use crate::error::Result;
use crate::llm::{LlmClient, VoiceAwareLlm};
use crate::mode::ModeDetector;
use crate::stt::{SttBackend, SttRouter};
use crate::tts::{Synthesizer, TtsEngine};

/// Aggregate health snapshot across the pipeline's externally-facing
/// collaborators.
#[derive(Debug, Clone)]
pub struct HealthSnapshot {
    pub tts_available: bool,
    pub tts_state: &'static str,
    pub cache_entries: usize,
    pub cache_hit_rate: f64,
}

/// Owns and wires together one conversation's worth of pipeline components.
pub struct Pipeline {
    pub mode: Arc<ModeDetector>,
    pub cache: Arc<AudioCache>,
    pub tts: Arc<TtsEngine>,
    pub stt_router: Arc<SttRouter>,
    pub llm: Arc<VoiceAwareLlm>,
    pub bus: EventBus,
}

impl Pipeline {
    /// Assemble a pipeline from its collaborators. The TTS engine's
    /// synthesizer and the LLM's client are both injected so that tests and
    /// alternate deployments never reach into a shared singleton.
    pub fn new(
        config: PipelineConfig,
        synthesizer: Arc<dyn Synthesizer>,
        stt_backends: Vec<Arc<dyn SttBackend>>,
        llm_client: Arc<dyn LlmClient>,
    ) -> Self {
        let mode = Arc::new(ModeDetector::new());
        let bus = EventBus::new();
        let cache = Arc::new(AudioCache::new(config.cache));
        let tts = Arc::new(TtsEngine::with_synthesizer_and_cache(config.engine, synthesizer, Arc::clone(&cache)));
        let stt_router = Arc::new(SttRouter::new(config.stt_router, stt_backends));
        let llm = Arc::new(VoiceAwareLlm::new(llm_client, Arc::clone(&mode)).with_bus(bus.clone()));

        tracing::info!("pipeline assembled");

        Self {
            mode,
            cache,
            tts,
            stt_router,
            llm,
            bus,
        }
    }

    /// Aggregate health across the engine and the cache, for a status
    /// endpoint or doctor-style command.
    pub async fn health_snapshot(&self) -> HealthSnapshot {
        let tts_metrics = self.tts.metrics();
        let cache_stats = self.cache.stats();
        let total = cache_stats.hits + cache_stats.misses;
        let hit_rate = if total == 0 { 0.0 } else { cache_stats.hits as f64 / total as f64 };

        HealthSnapshot {
            tts_available: self.tts.is_available().await,
            tts_state: tts_metrics.state,
            cache_entries: cache_stats.entries,
            cache_hit_rate: hit_rate,
        }
    }

    /// Gracefully shut down owned long-running resources: waits for the TTS
    /// worker to drain and exit.
    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!("pipeline shutting down");
        self.tts.stop().await;
        Ok(())
    }
}

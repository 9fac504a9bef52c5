//! Typed event bus bindings emitted and consumed by the pipeline (spec.md §4.8).
//!
//! Components publish and subscribe without holding direct references to one
//! another, following the same `tokio::sync::broadcast`-backed pattern the
//! teacher crate uses for its runtime event stream
//! (`fae::runtime::RuntimeEvent`). Delivery is per-event, per-subscriber, and
//! never blocks the publisher on a slow subscriber: `broadcast` drops the
//! oldest buffered event for a lagging subscriber rather than stalling the
//! sender.

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;

/// Default buffer size for the bus's broadcast channel.
const DEFAULT_BUS_CAPACITY: usize = 256;

/// Generate a fresh session identifier for a new conversation turn.
#[must_use]
pub fn new_session_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// The fixed taxonomy of events the pipeline publishes (spec.md §4.8).
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Connected {
        session_id: String,
        orchestrator_url: String,
    },
    Disconnected {
        session_id: String,
        reason: Option<String>,
    },
    Transcript {
        session_id: String,
        text: String,
        is_final: bool,
        confidence: f32,
        language: Option<String>,
        original_text: Option<String>,
        was_cleaned: Option<bool>,
        had_wake_word: Option<bool>,
    },
    Interrupt {
        session_id: String,
        interrupt_type: InterruptType,
        reason: String,
        metadata: Option<serde_json::Value>,
    },
    Synthesizing {
        session_id: String,
        text: String,
        voice_id: Option<String>,
        provider: Option<String>,
    },
    Complete {
        session_id: String,
        text: String,
        duration_ns: u64,
        duration_ms: u64,
        audio_length_seconds: f32,
        provider: Option<String>,
        voice_id: Option<String>,
    },
    Error {
        session_id: String,
        error: String,
        component: String,
        recoverable: bool,
    },
    Status {
        session_id: String,
        state: VoiceState,
        metadata: Option<serde_json::Value>,
    },
    WakeWord {
        session_id: String,
        wake_word: String,
        confidence: f32,
        audio_base64: String,
    },
    Emotion {
        session_id: String,
        primary_emotion: String,
        confidence: f32,
        all_emotions: Option<serde_json::Value>,
        transcript_text: Option<String>,
        backend: String,
    },
    AudioEvent {
        session_id: String,
        event_type: String,
        confidence: f32,
        start_time: Option<f32>,
        end_time: Option<f32>,
        backend: String,
    },
}

/// Interrupt cause, mirroring the data model's `InterruptSignal` (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptType {
    UserSpeech,
    Manual,
    Timeout,
    Error,
}

/// Discrete pipeline activity states reported on `voice.status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceState {
    Idle,
    Listening,
    Processing,
    Speaking,
}

impl Event {
    /// Stable type tag, e.g. `"voice.transcript"`.
    #[must_use]
    pub fn type_tag(&self) -> &'static str {
        match self {
            Event::Connected { .. } => "voice.connected",
            Event::Disconnected { .. } => "voice.disconnected",
            Event::Transcript { .. } => "voice.transcript",
            Event::Interrupt { .. } => "voice.interrupt",
            Event::Synthesizing { .. } => "voice.synthesizing",
            Event::Complete { .. } => "voice.complete",
            Event::Error { .. } => "voice.error",
            Event::Status { .. } => "voice.status",
            Event::WakeWord { .. } => "voice.wake_word",
            Event::Emotion { .. } => "voice.emotion",
            Event::AudioEvent { .. } => "voice.audio_event",
        }
    }
}

/// An event with its type tag and creation timestamp, as delivered to
/// subscribers.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub event: Event,
    pub type_tag: &'static str,
    pub created_at: DateTime<Utc>,
}

/// A subscriber handle. Dropping it removes the subscription.
pub struct Subscription {
    rx: broadcast::Receiver<Envelope>,
}

impl Subscription {
    /// Await the next event published after this subscription was created
    /// (or after the last successful `recv`).
    ///
    /// Returns `None` once the bus has been dropped and no more events can
    /// arrive.
    pub async fn recv(&mut self) -> Option<Envelope> {
        loop {
            match self.rx.recv().await {
                Ok(envelope) => return Some(envelope),
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

/// Process-wide typed event bus.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<Envelope>,
}

impl EventBus {
    /// Create a bus with the default buffer capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_BUS_CAPACITY)
    }

    /// Create a bus with an explicit buffer capacity. A larger capacity
    /// reduces how often a slow subscriber observes a `Lagged` gap.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish an event. Never blocks; a publish with zero subscribers is a
    /// no-op other than the timestamp stamp.
    pub fn publish(&self, event: Event) {
        let envelope = Envelope {
            type_tag: event.type_tag(),
            event,
            created_at: Utc::now(),
        };
        // `send` only errors when there are no receivers; that's expected
        // and not a publisher-visible failure.
        let _ = self.tx.send(envelope);
    }

    /// Subscribe to the bus. The returned handle must be dropped to
    /// unsubscribe.
    #[must_use]
    pub fn subscribe(&self) -> Subscription {
        Subscription {
            rx: self.tx.subscribe(),
        }
    }

    /// Number of currently active subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

//! Error types for the voice dialogue pipeline.

/// Top-level error type for the pipeline.
///
/// Variants correspond to the error taxonomy kinds in the design: validation,
/// capacity, lifecycle rejection, transport, cancellation, interruption, and
/// playback. Kinds, not concrete types, are what callers are expected to
/// match on.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Empty required input, invalid enum value, or out-of-range numeric.
    #[error("validation error: {0}")]
    Validation(String),

    /// The bounded job queue is full. Transient; the caller may retry.
    #[error("queue is full")]
    QueueFull,

    /// The engine has been stopped and no longer accepts new jobs.
    #[error("engine is stopped")]
    EngineStopped,

    /// An STT backend is registered but currently unavailable.
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    /// The preferred backend is unavailable and fallback is disabled.
    #[error("preferred backend unavailable: {0}")]
    PreferredUnavailable(String),

    /// No backend is available to service the request.
    #[error("no backends available")]
    NoBackendsAvailable,

    /// Network failure, non-2xx response, or marshal/decode failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// Context cancellation or deadline, distinct from a transport failure.
    #[error("operation cancelled")]
    Cancelled,

    /// Job was cancelled by a barge-in interrupt before it could play.
    #[error("interrupted by barge-in")]
    Interrupted,

    /// The playback sink returned an error.
    #[error("playback error: {0}")]
    Playback(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Channel send/receive error.
    #[error("channel error: {0}")]
    Channel(String),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, PipelineError>;

//! Internal synthesis job representation (spec.md §4.5).

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::error::Result;

/// A queued synthesis request. Constructed by `TtsEngine::speak*` and
/// consumed exactly once by the worker, which is what gives at-most-once
/// delivery per job: the oneshot sender is used (or dropped) precisely once.
pub(super) struct Job {
    pub text: String,
    pub voice_id: String,
    pub speed: f32,
    pub response_format: String,
    pub result_tx: oneshot::Sender<Result<()>>,
    /// Cancel handle for this job alone, invoked whenever the job leaves the
    /// queue — whether by completing synthesis/playback or by being drained
    /// on barge-in — so a synthesizer can release any per-request resources.
    pub cancel: CancellationToken,
    /// Set once the job's outcome has been delivered to `result_tx`.
    pub processed: AtomicBool,
}

impl Job {
    pub(super) fn mark_processed(&self) {
        self.processed.store(true, Ordering::SeqCst);
    }
}

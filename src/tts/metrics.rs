//! Engine metrics counters (spec.md §4.5 `Metrics()`).

use std::sync::atomic::{AtomicU64, Ordering};

/// Point-in-time snapshot returned by `TtsEngine::metrics()`.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsSnapshot {
    pub synthesis_count: u64,
    pub synthesis_errors: u64,
    pub playback_count: u64,
    pub interrupt_count: u64,
    pub queue_length: usize,
    pub average_latency_ms: f64,
    pub state: &'static str,
}

#[derive(Default)]
pub(super) struct Metrics {
    synthesis_count: AtomicU64,
    synthesis_errors: AtomicU64,
    playback_count: AtomicU64,
    interrupt_count: AtomicU64,
    latency_sum_ms: AtomicU64,
    latency_samples: AtomicU64,
}

impl Metrics {
    pub(super) fn record_synthesis(&self) {
        self.synthesis_count.fetch_add(1, Ordering::Relaxed);
    }

    pub(super) fn record_synthesis_error(&self) {
        self.synthesis_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub(super) fn record_playback(&self, latency_ms: u64) {
        self.playback_count.fetch_add(1, Ordering::Relaxed);
        self.latency_sum_ms.fetch_add(latency_ms, Ordering::Relaxed);
        self.latency_samples.fetch_add(1, Ordering::Relaxed);
    }

    pub(super) fn record_interrupts(&self, count: u64) {
        self.interrupt_count.fetch_add(count, Ordering::Relaxed);
    }

    pub(super) fn snapshot(&self, queue_length: usize, state: &'static str) -> MetricsSnapshot {
        let samples = self.latency_samples.load(Ordering::Relaxed);
        let sum = self.latency_sum_ms.load(Ordering::Relaxed);
        let average_latency_ms = if samples == 0 { 0.0 } else { sum as f64 / samples as f64 };
        MetricsSnapshot {
            synthesis_count: self.synthesis_count.load(Ordering::Relaxed),
            synthesis_errors: self.synthesis_errors.load(Ordering::Relaxed),
            playback_count: self.playback_count.load(Ordering::Relaxed),
            interrupt_count: self.interrupt_count.load(Ordering::Relaxed),
            queue_length,
            average_latency_ms,
            state,
        }
    }
}

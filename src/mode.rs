//! Thread-safe voice/text mode arbitration (spec.md §4.3).

use std::sync::atomic::{AtomicU8, Ordering};

/// Output mode governing prompt injection and sanitization policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Text,
    Voice,
}

const EXPLICIT_NONE: u8 = 0;
const EXPLICIT_TEXT: u8 = 1;
const EXPLICIT_VOICE: u8 = 2;

/// Arbitrates whether pipeline output should be speech-formatted.
///
/// `sttActive` and `ttsEnabled` are plain atomics (single-variable updates,
/// no cross-field ordering guaranteed, matching spec.md's "readers are
/// allowed to observe slightly stale values"). The explicit-mode override is
/// also lock-free; a `RwLock` is reserved for nothing here because every
/// field is independently atomic — there is no pair of fields that must move
/// together.
pub struct ModeDetector {
    stt_active: std::sync::atomic::AtomicBool,
    tts_enabled: std::sync::atomic::AtomicBool,
    explicit_mode: AtomicU8,
}

impl ModeDetector {
    #[must_use]
    pub fn new() -> Self {
        Self {
            stt_active: std::sync::atomic::AtomicBool::new(false),
            tts_enabled: std::sync::atomic::AtomicBool::new(false),
            explicit_mode: AtomicU8::new(EXPLICIT_NONE),
        }
    }

    pub fn set_stt_active(&self, active: bool) {
        self.stt_active.store(active, Ordering::Relaxed);
    }

    pub fn set_tts_enabled(&self, enabled: bool) {
        self.tts_enabled.store(enabled, Ordering::Relaxed);
    }

    /// Set or clear an explicit mode override. `None` restores inferred mode.
    pub fn set_explicit_mode(&self, mode: Option<Mode>) {
        let tag = match mode {
            None => EXPLICIT_NONE,
            Some(Mode::Text) => EXPLICIT_TEXT,
            Some(Mode::Voice) => EXPLICIT_VOICE,
        };
        self.explicit_mode.store(tag, Ordering::Relaxed);
    }

    /// Whether an explicit mode override is currently set.
    #[must_use]
    pub fn has_explicit(&self) -> bool {
        self.explicit_mode.load(Ordering::Relaxed) != EXPLICIT_NONE
    }

    /// `currentMode = explicitMode ?? (sttActive && ttsEnabled ? voice : text)`.
    #[must_use]
    pub fn current_mode(&self) -> Mode {
        match self.explicit_mode.load(Ordering::Relaxed) {
            EXPLICIT_TEXT => Mode::Text,
            EXPLICIT_VOICE => Mode::Voice,
            _ => {
                let stt = self.stt_active.load(Ordering::Relaxed);
                let tts = self.tts_enabled.load(Ordering::Relaxed);
                if stt && tts { Mode::Voice } else { Mode::Text }
            }
        }
    }

    #[must_use]
    pub fn is_voice_mode(&self) -> bool {
        self.current_mode() == Mode::Voice
    }
}

impl Default for ModeDetector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn defaults_to_text_mode() {
        let detector = ModeDetector::new();
        assert_eq!(detector.current_mode(), Mode::Text);
    }

    #[test]
    fn voice_requires_both_stt_and_tts() {
        let detector = ModeDetector::new();
        detector.set_stt_active(true);
        assert_eq!(detector.current_mode(), Mode::Text);
        detector.set_tts_enabled(true);
        assert_eq!(detector.current_mode(), Mode::Voice);
        detector.set_stt_active(false);
        assert_eq!(detector.current_mode(), Mode::Text);
    }

    #[test]
    fn explicit_mode_overrides_inferred_mode() {
        let detector = ModeDetector::new();
        detector.set_stt_active(true);
        detector.set_tts_enabled(true);
        detector.set_explicit_mode(Some(Mode::Text));
        assert!(detector.has_explicit());
        assert_eq!(detector.current_mode(), Mode::Text);

        detector.set_explicit_mode(None);
        assert!(!detector.has_explicit());
        assert_eq!(detector.current_mode(), Mode::Voice);
    }

    #[test]
    fn holds_under_concurrent_writers() {
        let detector = Arc::new(ModeDetector::new());
        let mut handles = Vec::new();
        for i in 0..8 {
            let detector = Arc::clone(&detector);
            handles.push(thread::spawn(move || {
                for _ in 0..1000 {
                    detector.set_stt_active(i % 2 == 0);
                    detector.set_tts_enabled(i % 3 == 0);
                    let _ = detector.current_mode();
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        // No assertion beyond "did not panic / deadlock" — readers tolerate
        // stale values by design.
    }
}

//! Content-addressed cache for synthesized audio (spec.md §4.6).
//!
//! Entries are keyed by a SHA-256 fingerprint of the text, voice id, and
//! speed that produced them, so repeated prompts (e.g. common confirmations)
//! skip synthesis entirely. Eviction is LRU-by-recency-of-access bounded by
//! entry count, with an independent TTL sweep.

use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use crate::config::CacheConfig;
use crate::tts::Synthesizer;

/// Default phrases warmed when `prewarm` is called without an explicit list
/// — short, common confirmations a voice assistant says often enough that
/// pre-synthesizing them avoids a round trip on the hot path.
const DEFAULT_PREWARM_PHRASES: &[&str] =
    &["Okay.", "Got it.", "Sure thing.", "One moment, please.", "All set.", "On it."];

/// Audio container format of a cached payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AudioFormat {
    Wav,
    Mp3,
    Ogg,
    Pcm,
    Opus,
}

impl AudioFormat {
    /// Parse a response-format string (as configured for the synthesis
    /// endpoint), defaulting to `Wav` for anything unrecognized.
    #[must_use]
    pub fn parse(format: &str) -> Self {
        match format.to_lowercase().as_str() {
            "mp3" => AudioFormat::Mp3,
            "ogg" => AudioFormat::Ogg,
            "pcm" => AudioFormat::Pcm,
            "opus" => AudioFormat::Opus,
            _ => AudioFormat::Wav,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            AudioFormat::Wav => "wav",
            AudioFormat::Mp3 => "mp3",
            AudioFormat::Ogg => "ogg",
            AudioFormat::Pcm => "pcm",
            AudioFormat::Opus => "opus",
        }
    }
}

/// A single cached synthesis result.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub fingerprint: String,
    pub audio: Vec<u8>,
    pub format: AudioFormat,
    pub created_at: Instant,
    last_accessed: Instant,
}

/// Point-in-time cache statistics.
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub total_bytes: usize,
}

/// Compute the fingerprint for a `(text, voice_id, speed)` triple.
///
/// Speed is formatted to two decimal places before hashing so that
/// floating-point noise (e.g. `1.0` vs `1.00000001`) does not fragment the
/// cache.
#[must_use]
pub fn fingerprint(text: &str, voice_id: &str, speed: f32) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hasher.update(b"|");
    hasher.update(voice_id.as_bytes());
    hasher.update(b"|");
    hasher.update(format!("{speed:.2}").as_bytes());
    format!("{:x}", hasher.finalize())
}

struct Inner {
    entries: HashMap<String, CacheEntry>,
    /// Most-recently-used fingerprint last; eviction pops from the front.
    lru: Vec<String>,
    hits: u64,
    misses: u64,
}

impl Inner {
    fn touch(&mut self, key: &str) {
        if let Some(pos) = self.lru.iter().position(|k| k == key) {
            let k = self.lru.remove(pos);
            self.lru.push(k);
        }
    }

    fn evict_one(&mut self) {
        if self.lru.is_empty() {
            return;
        }
        let oldest = self.lru.remove(0);
        self.entries.remove(&oldest);
        tracing::debug!(fingerprint = %oldest, "audio cache evicted entry");
    }
}

/// Content-addressed, LRU-bounded, TTL-expiring audio cache.
pub struct AudioCache {
    config: CacheConfig,
    inner: Mutex<Inner>,
}

impl AudioCache {
    #[must_use]
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                lru: Vec::new(),
                hits: 0,
                misses: 0,
            }),
        }
    }

    /// Look up a cached entry by fingerprint. A hit that has outlived its
    /// TTL is evicted and counted as a miss. Returns the audio alongside the
    /// format it was cached with, so callers never have to re-derive it.
    pub fn get(&self, key: &str) -> Option<(Vec<u8>, AudioFormat)> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let expired = inner
            .entries
            .get(key)
            .is_some_and(|e| e.created_at.elapsed() > self.config.ttl);

        if expired {
            inner.entries.remove(key);
            inner.lru.retain(|k| k != key);
            inner.misses += 1;
            return None;
        }

        if let Some(entry) = inner.entries.get_mut(key) {
            entry.last_accessed = Instant::now();
            let audio = entry.audio.clone();
            let format = entry.format;
            inner.touch(key);
            inner.hits += 1;
            Some((audio, format))
        } else {
            inner.misses += 1;
            None
        }
    }

    /// True iff `key` is currently cached and not yet TTL-expired, without
    /// affecting hit/miss counters — used by `prewarm` to skip phrases that
    /// are already warm.
    fn contains_fresh(&self, key: &str) -> bool {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner
            .entries
            .get(key)
            .is_some_and(|e| e.created_at.elapsed() <= self.config.ttl)
    }

    /// Insert an entry. Payloads larger than `max_entry_size_bytes` are
    /// silently rejected rather than cached; entries beyond `max_entries`
    /// evict the least-recently-used entry first.
    pub fn set(&self, key: String, audio: Vec<u8>, format: AudioFormat) {
        if audio.len() > self.config.max_entry_size_bytes {
            tracing::warn!(bytes = audio.len(), "audio cache rejected oversized entry");
            return;
        }

        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());

        if !inner.entries.contains_key(&key) {
            while inner.entries.len() >= self.config.max_entries {
                inner.evict_one();
            }
        }

        let now = Instant::now();
        inner.entries.insert(
            key.clone(),
            CacheEntry {
                fingerprint: key.clone(),
                audio,
                format,
                created_at: now,
                last_accessed: now,
            },
        );
        inner.lru.retain(|k| k != &key);
        inner.lru.push(key);
    }

    /// Remove every entry whose TTL has elapsed. Returns the number removed.
    pub fn clean_expired(&self) -> usize {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let ttl = self.config.ttl;
        let expired: Vec<String> = inner
            .entries
            .iter()
            .filter(|(_, e)| e.created_at.elapsed() > ttl)
            .map(|(k, _)| k.clone())
            .collect();
        for key in &expired {
            inner.entries.remove(key);
            inner.lru.retain(|k| k != key);
        }
        if !expired.is_empty() {
            tracing::debug!(count = expired.len(), "audio cache swept expired entries");
        }
        expired.len()
    }

    /// Discard every cached entry.
    pub fn clear(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.entries.clear();
        inner.lru.clear();
    }

    /// Warm the cache by synthesizing `phrases` (or a built-in default set,
    /// when `None` or empty) for `voice_id` and storing each result, skipping
    /// any phrase that's already cached. Stops early if `ctx` is cancelled,
    /// retaining whatever progress was made so far (spec.md §4.6).
    pub async fn prewarm(
        &self,
        ctx: &CancellationToken,
        provider: &dyn Synthesizer,
        voice_id: &str,
        phrases: Option<Vec<String>>,
    ) {
        let phrases = match phrases {
            Some(p) if !p.is_empty() => p,
            _ => DEFAULT_PREWARM_PHRASES.iter().map(|s| (*s).to_owned()).collect(),
        };
        let speed = 1.0;
        let format_str = "wav";

        for phrase in phrases {
            if ctx.is_cancelled() {
                tracing::debug!("audio cache prewarm cancelled, keeping partial progress");
                return;
            }
            let key = fingerprint(&phrase, voice_id, speed);
            if self.contains_fresh(&key) {
                continue;
            }
            match provider.synthesize(&phrase, voice_id, speed, format_str, ctx).await {
                Ok(audio) => self.set(key, audio, AudioFormat::parse(format_str)),
                Err(e) => tracing::warn!(error = %e, phrase = %phrase, "audio cache prewarm synthesis failed"),
            }
        }
    }

    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        CacheStats {
            entries: inner.entries.len(),
            hits: inner.hits,
            misses: inner.misses,
            total_bytes: inner.entries.values().map(|e| e.audio.len()).sum(),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache_with(max_entries: usize) -> AudioCache {
        AudioCache::new(CacheConfig {
            max_entries,
            max_entry_size_bytes: 1024,
            ttl: Duration::from_secs(3600),
        })
    }

    #[test]
    fn fingerprint_is_stable_and_sensitive_to_each_input() {
        let a = fingerprint("hello", "af_sky", 1.0);
        let b = fingerprint("hello", "af_sky", 1.0);
        assert_eq!(a, b);
        assert_ne!(a, fingerprint("hello", "af_nova", 1.0));
        assert_ne!(a, fingerprint("hello", "af_sky", 1.1));
        assert_ne!(a, fingerprint("goodbye", "af_sky", 1.0));
    }

    #[test]
    fn miss_then_hit_after_set() {
        let cache = cache_with(10);
        let key = fingerprint("hi", "af_sky", 1.0);
        assert!(cache.get(&key).is_none());
        cache.set(key.clone(), vec![1, 2, 3], AudioFormat::Wav);
        assert_eq!(cache.get(&key), Some((vec![1, 2, 3], AudioFormat::Wav)));
        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[test]
    fn oversized_entry_is_rejected() {
        let cache = cache_with(10);
        let key = "k".to_owned();
        cache.set(key.clone(), vec![0u8; 2048], AudioFormat::Wav);
        assert!(cache.get(&key).is_none());
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn evicts_least_recently_used_when_full() {
        let cache = cache_with(2);
        cache.set("a".into(), vec![1], AudioFormat::Wav);
        cache.set("b".into(), vec![2], AudioFormat::Wav);
        // Touch "a" so "b" becomes the least-recently-used entry.
        assert!(cache.get("a").is_some());
        cache.set("c".into(), vec![3], AudioFormat::Wav);
        assert!(cache.get("b").is_none());
        assert!(cache.get("a").is_some());
        assert!(cache.get("c").is_some());
    }

    #[test]
    fn clear_empties_cache() {
        let cache = cache_with(10);
        cache.set("a".into(), vec![1], AudioFormat::Wav);
        cache.clear();
        assert!(cache.is_empty());
    }

    struct CountingSynth {
        calls: std::sync::atomic::AtomicUsize,
    }

    #[async_trait::async_trait]
    impl Synthesizer for CountingSynth {
        async fn synthesize(
            &self,
            text: &str,
            _voice_id: &str,
            _speed: f32,
            _format: &str,
            _cancellation: &CancellationToken,
        ) -> crate::error::Result<Vec<u8>> {
            self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(text.as_bytes().to_vec())
        }
    }

    #[tokio::test]
    async fn prewarm_synthesizes_default_phrases_without_touching_stats() {
        let cache = cache_with(20);
        let synth = CountingSynth { calls: std::sync::atomic::AtomicUsize::new(0) };
        cache.prewarm(&CancellationToken::new(), &synth, "af_sky", None).await;

        assert_eq!(cache.stats().hits, 0);
        assert_eq!(cache.stats().misses, 0);
        assert_eq!(cache.len(), DEFAULT_PREWARM_PHRASES.len());
        assert_eq!(synth.calls.load(std::sync::atomic::Ordering::SeqCst), DEFAULT_PREWARM_PHRASES.len());
    }

    #[tokio::test]
    async fn prewarm_skips_phrases_already_cached() {
        let cache = cache_with(20);
        let key = fingerprint("Hello there.", "af_sky", 1.0);
        cache.set(key, b"cached".to_vec(), AudioFormat::Wav);

        let synth = CountingSynth { calls: std::sync::atomic::AtomicUsize::new(0) };
        cache
            .prewarm(&CancellationToken::new(), &synth, "af_sky", Some(vec!["Hello there.".to_owned()]))
            .await;

        assert_eq!(synth.calls.load(std::sync::atomic::Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn prewarm_stops_early_when_cancelled_but_keeps_partial_progress() {
        let cache = cache_with(20);
        let synth = CountingSynth { calls: std::sync::atomic::AtomicUsize::new(0) };
        let ctx = CancellationToken::new();
        ctx.cancel();

        cache.prewarm(&ctx, &synth, "af_sky", None).await;

        assert_eq!(synth.calls.load(std::sync::atomic::Ordering::SeqCst), 0);
        assert_eq!(cache.len(), 0);
    }
}

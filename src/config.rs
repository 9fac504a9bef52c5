//! Configuration types for the voice dialogue pipeline.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Top-level configuration for the pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// TTS engine settings.
    pub engine: EngineConfig,
    /// Audio cache settings.
    pub cache: CacheConfig,
    /// STT router settings.
    pub stt_router: SttRouterConfig,
    /// Per-backend STT settings, keyed by backend name.
    pub stt_backends: std::collections::HashMap<String, SttBackendConfig>,
}

/// Text-to-speech engine configuration.
///
/// Mirrors the reference OpenAI-compatible synthesis contract (spec.md §6):
/// `endpoint`, `voice_id`, `model`, `response_format`, `speed`, `timeout`,
/// `queue_size`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Synthesis endpoint, e.g. `http://127.0.0.1:8880/v1/audio/speech`.
    pub endpoint: String,
    /// Default voice identifier.
    pub voice_id: String,
    /// Model name passed in the synthesis request body.
    pub model: String,
    /// Requested audio container/format (e.g. "wav", "mp3", "opus").
    pub response_format: String,
    /// Speech speed multiplier. Clamped to \[0.5, 2.0\].
    pub speed: f32,
    /// HTTP request timeout. Defaults long enough to cover a first-run
    /// sidecar model download.
    #[serde(with = "duration_secs")]
    pub timeout: Duration,
    /// Bounded job queue capacity.
    pub queue_size: usize,
}

/// Endpoint a sidecar launcher binds by default; engines configured with
/// this endpoint are rebound to the launcher's actual address once known.
pub const DEFAULT_SIDECAR_ENDPOINT: &str = "http://127.0.0.1:8880/v1/audio/speech";

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_SIDECAR_ENDPOINT.to_owned(),
            voice_id: "af_sky".to_owned(),
            model: "tts-1".to_owned(),
            response_format: "wav".to_owned(),
            speed: 1.0,
            timeout: Duration::from_secs(60),
            queue_size: 100,
        }
    }
}

impl EngineConfig {
    /// Clamp a caller-supplied speed to the valid range, falling back to the
    /// configured default when zero-valued.
    #[must_use]
    pub fn resolve_speed(&self, requested: f32) -> f32 {
        if requested <= 0.0 {
            self.speed
        } else {
            requested.clamp(0.5, 2.0)
        }
    }

    /// Point the engine at a sidecar launcher's actual bound address, but
    /// only if it's still configured with the launcher's well-known default
    /// — a caller who explicitly set a different endpoint keeps it.
    pub fn rebind_to_launcher(&mut self, actual_endpoint: impl Into<String>) {
        if self.endpoint == DEFAULT_SIDECAR_ENDPOINT {
            self.endpoint = actual_endpoint.into();
        }
    }

    /// Derive the health-probe endpoint by stripping the path from the
    /// synthesis endpoint and appending `/health` (spec.md §6).
    #[must_use]
    pub fn health_endpoint(&self) -> String {
        let base = self
            .endpoint
            .find("://")
            .and_then(|scheme_end| {
                self.endpoint[scheme_end + 3..]
                    .find('/')
                    .map(|rel| scheme_end + 3 + rel)
            })
            .map_or(self.endpoint.as_str(), |idx| &self.endpoint[..idx]);
        format!("{base}/health")
    }
}

/// Audio cache configuration (LRU + TTL).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum number of entries retained.
    pub max_entries: usize,
    /// Maximum size in bytes for a single cached entry; larger payloads are
    /// rejected by `Set`.
    pub max_entry_size_bytes: usize,
    /// Time-to-live for a cached entry.
    #[serde(with = "duration_secs")]
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 500,
            max_entry_size_bytes: 10 * 1024 * 1024,
            ttl: Duration::from_secs(24 * 3600),
        }
    }
}

/// STT router configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SttRouterConfig {
    /// Preferred backend name, or `"auto"` to always score.
    pub preferred_backend: String,
    /// Whether scoring should favor emotion-capable backends.
    pub prefer_emotion_capable: bool,
    /// Whether to fall back to scoring when the preferred backend is
    /// unavailable.
    pub fallback_enabled: bool,
    /// Minimum interval between availability re-checks per backend.
    #[serde(with = "duration_secs")]
    pub availability_check_interval: Duration,
}

impl Default for SttRouterConfig {
    fn default() -> Self {
        Self {
            preferred_backend: "auto".to_owned(),
            prefer_emotion_capable: false,
            fallback_enabled: true,
            availability_check_interval: Duration::from_secs(30),
        }
    }
}

/// Per-STT-backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SttBackendConfig {
    /// Whether this backend is registered at all.
    pub enabled: bool,
    /// Base endpoint, e.g. `http://127.0.0.1:8881`.
    pub endpoint: String,
    /// Tie-break priority; higher registers first (ties broken by name).
    pub priority: i32,
    /// Whether the backend can report emotion.
    pub enable_emotion: bool,
    /// Whether the backend can report audio events (laughter, etc).
    pub enable_events: bool,
    /// Whether this backend earns the "significantly faster" scoring boost.
    /// The spec leaves backend identity abstract (§9 Open Questions); a
    /// deployment configures which backend, if any, earns it.
    pub fast: bool,
    /// Request timeout.
    #[serde(with = "duration_secs")]
    pub timeout: Duration,
}

impl Default for SttBackendConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: String::new(),
            priority: 0,
            enable_emotion: false,
            enable_events: false,
            fast: false,
            timeout: Duration::from_secs(10),
        }
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        d.as_secs_f64().serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Ok(Duration::from_secs_f64(secs.max(0.0)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_endpoint_strips_path() {
        let mut config = EngineConfig::default();
        config.endpoint = "http://127.0.0.1:8880/v1/audio/speech".to_owned();
        assert_eq!(config.health_endpoint(), "http://127.0.0.1:8880/health");
    }

    #[test]
    fn health_endpoint_handles_bare_host() {
        let mut config = EngineConfig::default();
        config.endpoint = "http://127.0.0.1:8880".to_owned();
        assert_eq!(config.health_endpoint(), "http://127.0.0.1:8880/health");
    }

    #[test]
    fn resolve_speed_clamps_and_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.resolve_speed(0.0), 1.0);
        assert_eq!(config.resolve_speed(3.0), 2.0);
        assert_eq!(config.resolve_speed(0.1), 0.5);
        assert_eq!(config.resolve_speed(1.25), 1.25);
    }

    #[test]
    fn rebind_to_launcher_only_replaces_the_default_endpoint() {
        let mut config = EngineConfig::default();
        config.rebind_to_launcher("http://127.0.0.1:54219/v1/audio/speech");
        assert_eq!(config.endpoint, "http://127.0.0.1:54219/v1/audio/speech");

        let mut explicit = EngineConfig::default();
        explicit.endpoint = "http://custom-host:9000/v1/audio/speech".to_owned();
        explicit.rebind_to_launcher("http://127.0.0.1:54219/v1/audio/speech");
        assert_eq!(explicit.endpoint, "http://custom-host:9000/v1/audio/speech");
    }

    #[test]
    fn config_roundtrips_through_toml() {
        let config = PipelineConfig::default();
        let text = toml::to_string(&config).expect("serialize");
        let restored: PipelineConfig = toml::from_str(&text).expect("deserialize");
        assert_eq!(restored.engine.endpoint, config.engine.endpoint);
        assert_eq!(restored.cache.max_entries, config.cache.max_entries);
    }

    #[test]
    fn config_roundtrips_through_a_file_on_disk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("pipeline.toml");
        let mut config = PipelineConfig::default();
        config.engine.voice_id = "af_nova".to_owned();

        std::fs::write(&path, toml::to_string(&config).unwrap()).expect("write config");
        let text = std::fs::read_to_string(&path).expect("read config");
        let restored: PipelineConfig = toml::from_str(&text).expect("deserialize");
        assert_eq!(restored.engine.voice_id, "af_nova");
    }
}

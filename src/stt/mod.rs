//! Capability-weighted STT backend selection with cached availability
//! (spec.md §4.7).

mod backend;
mod http;

pub use backend::{AudioEventResult, EmotionResult, SelectionRequest, SttBackend, Transcript};
pub use http::HttpSttBackend;

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use crate::config::SttRouterConfig;
use crate::error::{PipelineError, Result};

struct AvailabilityCache {
    entries: RwLock<HashMap<String, (bool, Instant)>>,
}

impl AvailabilityCache {
    fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Return the cached availability for `backend`, refreshing it (without
    /// holding the lock across the network probe) if the cached value is
    /// older than `interval` or absent.
    async fn is_available(&self, backend: &Arc<dyn SttBackend>, interval: Duration) -> bool {
        let cached = {
            let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
            entries.get(backend.name()).copied()
        };

        if let Some((available, checked_at)) = cached {
            if checked_at.elapsed() < interval {
                return available;
            }
        }

        let available = backend.check_available().await;
        tracing::debug!(backend = backend.name(), available, "stt availability refreshed");
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.insert(backend.name().to_owned(), (available, Instant::now()));
        available
    }
}

/// Selects an STT backend per request based on capability and cached
/// availability, with optional fallback to scoring.
pub struct SttRouter {
    backends: Vec<Arc<dyn SttBackend>>,
    availability: AvailabilityCache,
    config: SttRouterConfig,
}

impl SttRouter {
    #[must_use]
    pub fn new(config: SttRouterConfig, backends: Vec<Arc<dyn SttBackend>>) -> Self {
        Self {
            backends,
            availability: AvailabilityCache::new(),
            config,
        }
    }

    /// Select a backend for `request`, following spec.md §4.7's three-step
    /// algorithm: preferred-if-available, else capability scoring, else
    /// fail.
    pub async fn select(&self, request: &SelectionRequest) -> Result<Arc<dyn SttBackend>> {
        if self.config.preferred_backend != "auto" {
            match self.backends.iter().find(|b| b.name() == self.config.preferred_backend) {
                Some(preferred) => {
                    if self
                        .availability
                        .is_available(preferred, self.config.availability_check_interval)
                        .await
                    {
                        return Ok(Arc::clone(preferred));
                    }
                    if !self.config.fallback_enabled {
                        return Err(PipelineError::PreferredUnavailable(
                            self.config.preferred_backend.clone(),
                        ));
                    }
                }
                None if !self.config.fallback_enabled => {
                    return Err(PipelineError::PreferredUnavailable(
                        self.config.preferred_backend.clone(),
                    ));
                }
                None => {}
            }
        }

        self.select_by_score(request).await
    }

    async fn select_by_score(&self, request: &SelectionRequest) -> Result<Arc<dyn SttBackend>> {
        let mut scored: Vec<(i32, &str, Arc<dyn SttBackend>)> = Vec::new();

        for backend in &self.backends {
            if !self
                .availability
                .is_available(backend, self.config.availability_check_interval)
                .await
            {
                continue;
            }

            let mut score = 0;
            if request.include_emotion && backend.supports_emotion() {
                score += 100;
            }
            if self.config.prefer_emotion_capable && backend.supports_emotion() {
                score += 50;
            }
            if backend.supports_streaming() {
                score += 10;
            }
            if backend.is_fast() {
                score += 30;
            }
            scored.push((score, backend.name(), Arc::clone(backend)));
        }

        if scored.is_empty() {
            tracing::warn!("stt selection failed: no backend available");
            return Err(PipelineError::NoBackendsAvailable);
        }

        // Highest score first; ties broken by name for determinism.
        scored.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(b.1)));
        tracing::debug!(backend = scored[0].1, score = scored[0].0, "stt backend selected");
        Ok(Arc::clone(&scored[0].2))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubBackend {
        name: &'static str,
        emotion: bool,
        streaming: bool,
        fast: bool,
        available: bool,
        probe_calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl SttBackend for StubBackend {
        fn name(&self) -> &str {
            self.name
        }
        fn supports_emotion(&self) -> bool {
            self.emotion
        }
        fn supports_streaming(&self) -> bool {
            self.streaming
        }
        fn is_fast(&self) -> bool {
            self.fast
        }
        async fn check_available(&self) -> bool {
            self.probe_calls.fetch_add(1, Ordering::SeqCst);
            self.available
        }
        async fn transcribe(&self, _audio: &[u8], _request: &SelectionRequest) -> Result<Transcript> {
            Ok(Transcript {
                text: "stub".to_owned(),
                confidence: 1.0,
                language: None,
                emotion: None,
                audio_events: Vec::new(),
            })
        }
    }

    fn backend(name: &'static str, emotion: bool, streaming: bool, fast: bool, available: bool) -> Arc<dyn SttBackend> {
        Arc::new(StubBackend {
            name,
            emotion,
            streaming,
            fast,
            available,
            probe_calls: Arc::new(AtomicUsize::new(0)),
        })
    }

    fn router_config() -> SttRouterConfig {
        SttRouterConfig {
            preferred_backend: "auto".to_owned(),
            prefer_emotion_capable: false,
            fallback_enabled: true,
            availability_check_interval: Duration::from_secs(30),
        }
    }

    #[tokio::test]
    async fn scores_emotion_request_toward_emotion_capable_backend() {
        let router = SttRouter::new(
            router_config(),
            vec![
                backend("plain", false, false, false, true),
                backend("emotive", true, false, false, true),
            ],
        );
        let selected = router
            .select(&SelectionRequest { include_emotion: true })
            .await
            .expect("a backend is selected");
        assert_eq!(selected.name(), "emotive");
    }

    #[tokio::test]
    async fn fast_backend_wins_without_emotion_request() {
        let router = SttRouter::new(
            router_config(),
            vec![
                backend("slow", false, false, false, true),
                backend("quick", false, false, true, true),
            ],
        );
        let selected = router
            .select(&SelectionRequest::default())
            .await
            .expect("a backend is selected");
        assert_eq!(selected.name(), "quick");
    }

    #[tokio::test]
    async fn ties_break_by_name() {
        let router = SttRouter::new(
            router_config(),
            vec![
                backend("zeta", false, false, false, true),
                backend("alpha", false, false, false, true),
            ],
        );
        let selected = router.select(&SelectionRequest::default()).await.unwrap();
        assert_eq!(selected.name(), "alpha");
    }

    #[tokio::test]
    async fn preferred_backend_used_when_available() {
        let mut config = router_config();
        config.preferred_backend = "chosen".to_owned();
        let router = SttRouter::new(
            config,
            vec![backend("chosen", false, false, false, true), backend("other", true, true, true, true)],
        );
        let selected = router.select(&SelectionRequest::default()).await.unwrap();
        assert_eq!(selected.name(), "chosen");
    }

    #[tokio::test]
    async fn preferred_unavailable_without_fallback_fails() {
        let mut config = router_config();
        config.preferred_backend = "chosen".to_owned();
        config.fallback_enabled = false;
        let router = SttRouter::new(config, vec![backend("chosen", false, false, false, false)]);
        let err = router.select(&SelectionRequest::default()).await.unwrap_err();
        assert!(matches!(err, PipelineError::PreferredUnavailable(_)));
    }

    #[tokio::test]
    async fn preferred_unavailable_with_fallback_scores_remaining() {
        let mut config = router_config();
        config.preferred_backend = "chosen".to_owned();
        let router = SttRouter::new(
            config,
            vec![backend("chosen", false, false, false, false), backend("fallback", false, false, false, true)],
        );
        let selected = router.select(&SelectionRequest::default()).await.unwrap();
        assert_eq!(selected.name(), "fallback");
    }

    #[tokio::test]
    async fn no_available_backend_fails() {
        let router = SttRouter::new(router_config(), vec![backend("only", false, false, false, false)]);
        let err = router.select(&SelectionRequest::default()).await.unwrap_err();
        assert!(matches!(err, PipelineError::NoBackendsAvailable));
    }

    #[tokio::test]
    async fn availability_is_cached_within_interval() {
        let probe_calls = Arc::new(AtomicUsize::new(0));
        let stub = Arc::new(StubBackend {
            name: "cached",
            emotion: false,
            streaming: false,
            fast: false,
            available: true,
            probe_calls: Arc::clone(&probe_calls),
        });
        let backends: Vec<Arc<dyn SttBackend>> = vec![stub];
        let router = SttRouter::new(router_config(), backends);

        router.select(&SelectionRequest::default()).await.unwrap();
        router.select(&SelectionRequest::default()).await.unwrap();

        assert_eq!(probe_calls.load(Ordering::SeqCst), 1);
    }
}

//! Reference STT backend: the multipart/form-data contract from spec.md §6.

use async_trait::async_trait;
use serde::Deserialize;

use crate::config::SttBackendConfig;
use crate::error::{PipelineError, Result};

use super::backend::{AudioEventResult, EmotionResult, SelectionRequest, SttBackend, Transcript};

/// An STT backend reached over HTTP, grounded on the reference
/// `/v1/audio/transcriptions[/emotion]` contract.
pub struct HttpSttBackend {
    name: String,
    client: reqwest::Client,
    config: SttBackendConfig,
}

#[derive(Deserialize)]
struct TranscribeResponse {
    text: String,
    #[serde(default)]
    confidence: f32,
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    emotion: Option<EmotionPayload>,
    #[serde(default)]
    events: Vec<AudioEventPayload>,
}

#[derive(Deserialize)]
struct EmotionPayload {
    primary: String,
    confidence: f32,
}

#[derive(Deserialize)]
struct AudioEventPayload {
    #[serde(rename = "type")]
    event_type: String,
    confidence: f32,
    #[serde(default)]
    start_time: Option<f32>,
    #[serde(default)]
    end_time: Option<f32>,
}

impl HttpSttBackend {
    /// Build a backend from its registered name and per-backend config. The
    /// client's timeout tracks the backend's configured timeout.
    pub fn new(name: impl Into<String>, config: SttBackendConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| PipelineError::Transport(e.to_string()))?;
        Ok(Self { name: name.into(), client, config })
    }

    fn transcription_path(&self, request: &SelectionRequest) -> String {
        if request.include_emotion && self.config.enable_emotion {
            format!("{}/v1/audio/transcriptions/emotion", self.config.endpoint)
        } else {
            format!("{}/v1/audio/transcriptions", self.config.endpoint)
        }
    }

    fn health_endpoint(&self) -> String {
        format!("{}/health", self.config.endpoint)
    }
}

#[async_trait]
impl SttBackend for HttpSttBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn supports_emotion(&self) -> bool {
        self.config.enable_emotion
    }

    fn supports_streaming(&self) -> bool {
        false
    }

    fn is_fast(&self) -> bool {
        self.config.fast
    }

    async fn check_available(&self) -> bool {
        self.client
            .get(self.health_endpoint())
            .send()
            .await
            .is_ok_and(|resp| resp.status().is_success())
    }

    async fn transcribe(&self, audio: &[u8], request: &SelectionRequest) -> Result<Transcript> {
        let part = reqwest::multipart::Part::bytes(audio.to_vec()).file_name("audio.wav");
        let form = reqwest::multipart::Form::new().part("file", part);

        let response = self
            .client
            .post(self.transcription_path(request))
            .multipart(form)
            .send()
            .await
            .map_err(|e| PipelineError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(PipelineError::Transport(format!("{status}: {body}")));
        }

        let parsed: TranscribeResponse = response
            .json()
            .await
            .map_err(|e| PipelineError::Transport(e.to_string()))?;

        Ok(Transcript {
            text: parsed.text,
            confidence: parsed.confidence,
            language: parsed.language,
            emotion: parsed.emotion.map(|e| EmotionResult {
                primary_emotion: e.primary,
                confidence: e.confidence,
            }),
            audio_events: parsed
                .events
                .into_iter()
                .map(|e| AudioEventResult {
                    event_type: e.event_type,
                    confidence: e.confidence,
                    start_time: e.start_time,
                    end_time: e.end_time,
                })
                .collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn backend_config(endpoint: String) -> SttBackendConfig {
        SttBackendConfig {
            endpoint,
            enable_emotion: true,
            ..SttBackendConfig::default()
        }
    }

    #[tokio::test]
    async fn transcribe_parses_standard_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/audio/transcriptions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "text": "hello world",
                "confidence": 0.97,
                "language": "en"
            })))
            .mount(&server)
            .await;

        let mut config = backend_config(server.uri());
        config.enable_emotion = false;
        let backend = HttpSttBackend::new("reference", config).unwrap();
        let transcript = backend
            .transcribe(b"fake-audio", &SelectionRequest::default())
            .await
            .expect("transcribe succeeds");
        assert_eq!(transcript.text, "hello world");
        assert_eq!(transcript.language.as_deref(), Some("en"));
        assert!(transcript.emotion.is_none());
    }

    #[tokio::test]
    async fn transcribe_uses_emotion_path_and_parses_emotion_payload() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/audio/transcriptions/emotion"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "text": "i am thrilled",
                "confidence": 0.9,
                "emotion": {"primary": "joy", "confidence": 0.8},
                "events": [{"type": "laughter", "confidence": 0.6}]
            })))
            .mount(&server)
            .await;

        let backend = HttpSttBackend::new("emotive", backend_config(server.uri())).unwrap();
        let transcript = backend
            .transcribe(b"fake-audio", &SelectionRequest { include_emotion: true })
            .await
            .expect("transcribe succeeds");
        assert_eq!(transcript.emotion.unwrap().primary_emotion, "joy");
        assert_eq!(transcript.audio_events.len(), 1);
        assert_eq!(transcript.audio_events[0].event_type, "laughter");
    }

    #[tokio::test]
    async fn non_success_status_is_a_transport_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/audio/transcriptions"))
            .respond_with(ResponseTemplate::new(500).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let mut config = backend_config(server.uri());
        config.enable_emotion = false;
        let backend = HttpSttBackend::new("reference", config).unwrap();
        let err = backend
            .transcribe(b"fake-audio", &SelectionRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Transport(_)));
    }

    #[tokio::test]
    async fn check_available_reflects_health_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let backend = HttpSttBackend::new("reference", backend_config(server.uri())).unwrap();
        assert!(backend.check_available().await);
    }
}

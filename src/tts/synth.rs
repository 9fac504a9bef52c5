//! Synthesis backend contract and its reference HTTP implementation
//! (spec.md §6).

use async_trait::async_trait;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::config::EngineConfig;
use crate::error::{PipelineError, Result};

/// Pluggable text-to-audio backend. The engine worker calls this once per
/// job; tests substitute a fake to avoid real network I/O. `cancellation` is
/// the job's own cancel handle: implementations must distinguish a request
/// cancelled through it (`PipelineError::Cancelled`) from one that failed in
/// transit (`PipelineError::Transport`).
#[async_trait]
pub trait Synthesizer: Send + Sync {
    async fn synthesize(
        &self,
        text: &str,
        voice_id: &str,
        speed: f32,
        format: &str,
        cancellation: &CancellationToken,
    ) -> Result<Vec<u8>>;
}

#[derive(Serialize)]
struct SynthesisRequest<'a> {
    model: &'a str,
    input: &'a str,
    voice: &'a str,
    response_format: &'a str,
    speed: f32,
}

/// Talks to the reference OpenAI-compatible synthesis sidecar.
pub struct HttpSynthesizer {
    client: reqwest::Client,
    endpoint: String,
    model: String,
}

impl HttpSynthesizer {
    pub fn new(config: &EngineConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| PipelineError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
        })
    }
}

#[async_trait]
impl Synthesizer for HttpSynthesizer {
    async fn synthesize(
        &self,
        text: &str,
        voice_id: &str,
        speed: f32,
        format: &str,
        cancellation: &CancellationToken,
    ) -> Result<Vec<u8>> {
        let body = SynthesisRequest {
            model: &self.model,
            input: text,
            voice: voice_id,
            response_format: format,
            speed,
        };

        let request = async {
            let response = self
                .client
                .post(&self.endpoint)
                .json(&body)
                .send()
                .await
                .map_err(|e| PipelineError::Transport(e.to_string()))?;

            if !response.status().is_success() {
                let status = response.status();
                let text = response.text().await.unwrap_or_default();
                return Err(PipelineError::Transport(format!(
                    "synthesis request failed: {status} {text}"
                )));
            }

            let audio: bytes::Bytes = response
                .bytes()
                .await
                .map_err(|e| PipelineError::Transport(e.to_string()))?;
            Ok(audio.to_vec())
        };

        tokio::select! {
            () = cancellation.cancelled() => Err(PipelineError::Cancelled),
            result = request => result,
        }
    }
}

//! Dual-channel (visual + voice) fan-out of a streaming LLM token channel,
//! with voice-mode prompt injection (spec.md §4.4).

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_stream::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;

use crate::bus::{Event, EventBus};
use crate::error::{PipelineError, Result};
use crate::mode::ModeDetector;
use crate::sanitizer::{sanitize_for_sentence, StreamSanitizer};

/// Visual channel buffer depth (spec.md §4.4).
const VISUAL_CHANNEL_CAPACITY: usize = 100;
/// Voice channel buffer depth.
const VOICE_CHANNEL_CAPACITY: usize = 20;
/// Error channel buffer depth.
const ERROR_CHANNEL_CAPACITY: usize = 1;

/// One turn of conversation history.
#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    System,
    User,
    Assistant,
}

impl ChatMessage {
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

/// A token stream as produced by an LLM backend.
pub type TokenStream = std::pin::Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Pluggable streaming chat completion backend.
#[async_trait::async_trait]
pub trait LlmClient: Send + Sync {
    async fn stream(&self, messages: &[ChatMessage]) -> Result<TokenStream>;
}

#[derive(serde::Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    stream: bool,
}

#[derive(serde::Serialize)]
struct WireMessage<'a> {
    role: &'a str,
    content: &'a str,
}

impl Role {
    fn wire_tag(self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

#[derive(serde::Deserialize)]
struct ChatChunk {
    choices: Vec<ChatChoice>,
}

#[derive(serde::Deserialize)]
struct ChatChoice {
    delta: ChatDelta,
}

#[derive(serde::Deserialize, Default)]
struct ChatDelta {
    #[serde(default)]
    content: Option<String>,
}

/// Talks to an OpenAI-compatible `/chat/completions` SSE streaming endpoint.
pub struct HttpLlmClient {
    client: reqwest::Client,
    endpoint: String,
    model: String,
}

impl HttpLlmClient {
    pub fn new(endpoint: impl Into<String>, model: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| PipelineError::Transport(e.to_string()))?;
        Ok(Self { client, endpoint: endpoint.into(), model: model.into() })
    }
}

/// Parse one SSE `data: ...` line into its chunk payload, or `None` for
/// blank lines, comments, and the terminal `[DONE]` marker.
fn parse_sse_line(line: &str) -> Option<&str> {
    let data = line.strip_prefix("data:")?.trim();
    if data.is_empty() || data == "[DONE]" {
        None
    } else {
        Some(data)
    }
}

#[async_trait::async_trait]
impl LlmClient for HttpLlmClient {
    async fn stream(&self, messages: &[ChatMessage]) -> Result<TokenStream> {
        let body = ChatRequest {
            model: &self.model,
            messages: messages
                .iter()
                .map(|m| WireMessage { role: m.role.wire_tag(), content: &m.content })
                .collect(),
            stream: true,
        };

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
            return Err(PipelineError::Transport(format!("chat request failed: {status} {text}")));
        }

        let byte_stream = response.bytes_stream();
        let token_stream = async_stream::stream! {
            tokio::pin!(byte_stream);
            let mut carry = String::new();
            while let Some(chunk) = byte_stream.next().await {
                let chunk = match chunk {
                    Ok(c) => c,
                    Err(e) => {
                        yield Err(PipelineError::Transport(e.to_string()));
                        return;
                    }
                };
                carry.push_str(&String::from_utf8_lossy(&chunk));
                while let Some(nl) = carry.find('\n') {
                    let line = carry[..nl].trim_end_matches('\r').to_owned();
                    carry.drain(..=nl);
                    let Some(data) = parse_sse_line(&line) else { continue };
                    match serde_json::from_str::<ChatChunk>(data) {
                        Ok(parsed) => {
                            for choice in parsed.choices {
                                if let Some(content) = choice.delta.content {
                                    if !content.is_empty() {
                                        yield Ok(content);
                                    }
                                }
                            }
                        }
                        Err(e) => yield Err(PipelineError::Transport(format!("malformed sse chunk: {e}"))),
                    }
                }
            }
        };

        Ok(Box::pin(token_stream))
    }
}

/// The three output channels produced by `stream_response`.
pub struct StreamHandles {
    pub visual: mpsc::Receiver<String>,
    pub voice: mpsc::Receiver<String>,
    pub errors: mpsc::Receiver<PipelineError>,
}

/// Wraps an `LlmClient`, fanning its token stream into a visual channel (raw
/// tokens, in arrival order) and a voice channel (sanitized, complete
/// sentences, emitted only while in voice mode), and injecting a voice
/// system prompt and few-shot examples when voice mode is active.
pub struct VoiceAwareLlm {
    client: Arc<dyn LlmClient>,
    mode: Arc<ModeDetector>,
    bus: Option<EventBus>,
    voice_system_prompt: String,
    code_error_addendum: String,
    few_shot: Vec<ChatMessage>,
}

impl VoiceAwareLlm {
    #[must_use]
    pub fn new(client: Arc<dyn LlmClient>, mode: Arc<ModeDetector>) -> Self {
        Self {
            client,
            mode,
            bus: None,
            voice_system_prompt: String::new(),
            code_error_addendum: String::new(),
            few_shot: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_bus(mut self, bus: EventBus) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn set_voice_system_prompt(&mut self, prompt: impl Into<String>) {
        self.voice_system_prompt = prompt.into();
    }

    pub fn set_code_error_addendum(&mut self, addendum: impl Into<String>) {
        self.code_error_addendum = addendum.into();
    }

    pub fn set_few_shot(&mut self, pairs: Vec<ChatMessage>) {
        self.few_shot = pairs;
    }

    /// Mirror to the mode detector (spec.md §4.4 input hooks).
    pub fn set_voice_mode(&self, mode: Option<crate::mode::Mode>) {
        self.mode.set_explicit_mode(mode);
    }

    pub fn on_stt_active(&self, active: bool) {
        self.mode.set_stt_active(active);
    }

    pub fn on_tts_enabled(&self, enabled: bool) {
        self.mode.set_tts_enabled(enabled);
    }

    /// The few-shot examples to splice into the prompt, or empty when the
    /// mode detector isn't reporting voice mode.
    fn build_few_shot_messages(&self) -> Vec<ChatMessage> {
        if !self.mode.is_voice_mode() {
            return Vec::new();
        }
        self.few_shot.clone()
    }

    /// Build the message list actually sent to the backend: unchanged in
    /// text mode, or voice system prompt + few-shot examples + code/error
    /// addendum + the caller's leading system message (if any) relabeled
    /// under an "Additional Context" header, followed by the conversation
    /// history (spec.md §4.4 prompt composition policy).
    fn compose_messages(&self, base: &[ChatMessage]) -> Vec<ChatMessage> {
        if !self.mode.is_voice_mode() {
            return base.to_vec();
        }

        let mut composed = Vec::new();
        if !self.voice_system_prompt.is_empty() {
            composed.push(ChatMessage::system(self.voice_system_prompt.clone()));
        }
        composed.extend(self.build_few_shot_messages());
        if !self.code_error_addendum.is_empty() {
            composed.push(ChatMessage::system(self.code_error_addendum.clone()));
        }

        let mut history = Vec::with_capacity(base.len());
        let mut base_prompt_seen = false;
        for message in base {
            if !base_prompt_seen && message.role == Role::System {
                composed.push(ChatMessage::system(format!(
                    "Additional Context\n\n{}",
                    message.content
                )));
                base_prompt_seen = true;
            } else {
                history.push(message.clone());
            }
        }
        composed.extend(history);
        composed
    }

    /// Stream a response, fanning tokens into the visual and voice
    /// channels. All three channels are guaranteed to close (by sender
    /// drop) exactly once, whether streaming completes, errors, or is
    /// cancelled.
    pub async fn stream_response(
        &self,
        messages: &[ChatMessage],
        cancellation: CancellationToken,
    ) -> Result<StreamHandles> {
        let composed = self.compose_messages(messages);
        let mut token_stream = self.client.stream(&composed).await?;

        let (visual_tx, visual_rx) = mpsc::channel(VISUAL_CHANNEL_CAPACITY);
        let (voice_tx, voice_rx) = mpsc::channel(VOICE_CHANNEL_CAPACITY);
        let (error_tx, error_rx) = mpsc::channel(ERROR_CHANNEL_CAPACITY);

        let mode = Arc::clone(&self.mode);
        let bus = self.bus.clone();

        tokio::spawn(async move {
            let sanitizer = StreamSanitizer::new();

            loop {
                tokio::select! {
                    () = cancellation.cancelled() => {
                        tracing::debug!("llm stream cancelled");
                        let _ = error_tx.send(PipelineError::Cancelled).await;
                        break;
                    }
                    next = token_stream.next() => {
                        match next {
                            None => break,
                            Some(Err(e)) => {
                                tracing::warn!(error = %e, "llm token stream errored");
                                let _ = error_tx.send(e).await;
                                break;
                            }
                            Some(Ok(token)) => {
                                let _ = visual_tx.send(token.clone()).await;
                                if mode.is_voice_mode() {
                                    if let Some(sentence) = sanitizer.push_token(&token) {
                                        emit_voice_sentence(&voice_tx, &bus, sentence).await;
                                    }
                                }
                            }
                        }
                    }
                }
            }

            if mode.is_voice_mode() {
                if let Some(sentence) = sanitizer.flush() {
                    emit_voice_sentence(&voice_tx, &bus, sentence).await;
                }
            }
        });

        Ok(StreamHandles {
            visual: visual_rx,
            voice: voice_rx,
            errors: error_rx,
        })
    }

    /// Non-streaming convenience: collect the full visual-channel text.
    pub async fn chat(&self, messages: &[ChatMessage], cancellation: CancellationToken) -> Result<String> {
        let mut handles = self.stream_response(messages, cancellation).await?;
        let mut text = String::new();
        while let Some(token) = handles.visual.recv().await {
            text.push_str(&token);
        }
        if let Ok(err) = handles.errors.try_recv() {
            return Err(err);
        }
        Ok(text)
    }
}

async fn emit_voice_sentence(voice_tx: &mpsc::Sender<String>, bus: &Option<EventBus>, sentence: String) {
    let cleaned = sanitize_for_sentence(&sentence);
    if cleaned.is_empty() {
        return;
    }
    if let Some(bus) = bus {
        bus.publish(Event::Synthesizing {
            session_id: String::new(),
            text: cleaned.clone(),
            voice_id: None,
            provider: None,
        });
    }
    let _ = voice_tx.send(cleaned).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use tokio_stream::wrappers::ReceiverStream;

    struct ScriptedClient {
        tokens: Vec<&'static str>,
    }

    #[async_trait]
    impl LlmClient for ScriptedClient {
        async fn stream(&self, _messages: &[ChatMessage]) -> Result<TokenStream> {
            let (tx, rx) = mpsc::channel(16);
            for token in self.tokens.clone() {
                let _ = tx.send(Ok(token.to_owned())).await;
            }
            Ok(Box::pin(ReceiverStream::new(rx)))
        }
    }

    #[tokio::test]
    async fn visual_channel_forwards_every_token_in_order() {
        let client = Arc::new(ScriptedClient { tokens: vec!["Hel", "lo "] });
        let wrapper = VoiceAwareLlm::new(client, Arc::new(ModeDetector::new()));
        let mut handles = wrapper
            .stream_response(&[ChatMessage::user("hi")], CancellationToken::new())
            .await
            .unwrap();

        let mut collected = String::new();
        while let Some(token) = handles.visual.recv().await {
            collected.push_str(&token);
        }
        assert_eq!(collected, "Hello ");
    }

    #[tokio::test]
    async fn voice_channel_silent_in_text_mode() {
        let client = Arc::new(ScriptedClient { tokens: vec!["Done. "] });
        let wrapper = VoiceAwareLlm::new(client, Arc::new(ModeDetector::new()));
        let mut handles = wrapper
            .stream_response(&[ChatMessage::user("hi")], CancellationToken::new())
            .await
            .unwrap();

        while handles.visual.recv().await.is_some() {}
        assert!(handles.voice.recv().await.is_none());
    }

    #[tokio::test]
    async fn voice_channel_emits_sentences_in_voice_mode() {
        let mode = Arc::new(ModeDetector::new());
        mode.set_stt_active(true);
        mode.set_tts_enabled(true);
        let client = Arc::new(ScriptedClient { tokens: vec!["Hi there. ", "Bye. "] });
        let wrapper = VoiceAwareLlm::new(client, Arc::clone(&mode));
        let mut handles = wrapper
            .stream_response(&[ChatMessage::user("hi")], CancellationToken::new())
            .await
            .unwrap();

        while handles.visual.recv().await.is_some() {}
        let first = handles.voice.recv().await.expect("first sentence");
        let second = handles.voice.recv().await.expect("second sentence");
        assert_eq!(first, "Hi there.");
        assert_eq!(second, "Bye.");
    }

    #[tokio::test]
    async fn compose_messages_injects_voice_prompt_and_few_shot() {
        let mode = Arc::new(ModeDetector::new());
        mode.set_stt_active(true);
        mode.set_tts_enabled(true);
        let client = Arc::new(ScriptedClient { tokens: vec![] });
        let mut wrapper = VoiceAwareLlm::new(client, mode);
        wrapper.set_voice_system_prompt("Speak naturally.");
        wrapper.set_few_shot(vec![ChatMessage::user("example"), ChatMessage::assistant("example reply")]);

        let composed = wrapper.compose_messages(&[ChatMessage::system("base prompt"), ChatMessage::user("hi")]);
        assert_eq!(composed[0].content, "Speak naturally.");
        assert_eq!(composed[1].content, "example");
        assert_eq!(composed[2].content, "example reply");
        assert!(composed[3].content.starts_with("Additional Context"));
        assert_eq!(composed[4].content, "hi");
    }

    #[tokio::test]
    async fn build_few_shot_messages_is_nonempty_only_in_voice_mode() {
        let mode = Arc::new(ModeDetector::new());
        let client = Arc::new(ScriptedClient { tokens: vec![] });
        let mut wrapper = VoiceAwareLlm::new(client, Arc::clone(&mode));
        wrapper.set_few_shot(vec![ChatMessage::user("example"), ChatMessage::assistant("example reply")]);

        assert!(wrapper.build_few_shot_messages().is_empty());

        mode.set_stt_active(true);
        mode.set_tts_enabled(true);
        let few_shot = wrapper.build_few_shot_messages();
        assert_eq!(few_shot.len(), 2);
        assert_eq!(few_shot[0].content, "example");
    }

    #[tokio::test]
    async fn text_mode_passes_base_prompt_unchanged() {
        let wrapper = VoiceAwareLlm::new(Arc::new(ScriptedClient { tokens: vec![] }), Arc::new(ModeDetector::new()));
        let base = vec![ChatMessage::system("base prompt"), ChatMessage::user("hi")];
        let composed = wrapper.compose_messages(&base);
        assert_eq!(composed[0].content, "base prompt");
        assert_eq!(composed[1].content, "hi");
    }
}

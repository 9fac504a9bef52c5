//! SSE streaming contract for the reference `HttpLlmClient`, exercised
//! against a real mock server rather than a fake `LlmClient`.

use tokio_stream::StreamExt;
use vox_dialogue::llm::{ChatMessage, HttpLlmClient, LlmClient};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SSE_BODY: &str = "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\n\
data: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\n\n\
data: [DONE]\n\n";

#[tokio::test]
async fn streams_tokens_from_sse_chunks() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(SSE_BODY, "text/event-stream"),
        )
        .mount(&server)
        .await;

    let client = HttpLlmClient::new(format!("{}/v1/chat/completions", server.uri()), "gpt-test").unwrap();
    let mut stream = client.stream(&[ChatMessage::user("hi")]).await.unwrap();

    let mut collected = String::new();
    while let Some(token) = stream.next().await {
        collected.push_str(&token.unwrap());
    }
    assert_eq!(collected, "Hello");
}

#[tokio::test]
async fn non_success_status_is_a_transport_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(503).set_body_string("backend down"))
        .mount(&server)
        .await;

    let client = HttpLlmClient::new(format!("{}/v1/chat/completions", server.uri()), "gpt-test").unwrap();
    let err = client.stream(&[ChatMessage::user("hi")]).await.unwrap_err();
    assert!(matches!(err, vox_dialogue::error::PipelineError::Transport(_)));
}

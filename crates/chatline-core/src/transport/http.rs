use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use serde::Deserialize;

use super::{BufferedReply, ChatRequest, ChatResponse, ChatTransport};
use crate::error::{Error, Result};

#[derive(Deserialize)]
struct HealthResponse {
    status: String,
}

/// reqwest client for the chat endpoint.
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl ChatTransport for HttpTransport {
    async fn send(&self, request: &ChatRequest) -> Result<ChatResponse> {
        let url = format!("{}/chat", self.base_url);

        let response = self.client.post(&url).json(request).send().await?;

        if !response.status().is_success() {
            tracing::warn!(status = %response.status(), "chat request failed");
            return Err(Error::Status(response.status().as_u16()));
        }

        let is_json = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.starts_with("application/json"));

        if is_json {
            let body = response.bytes().await?;
            let reply: BufferedReply = serde_json::from_slice(&body)?;
            return Ok(ChatResponse::Buffered(reply));
        }

        let stream = response.bytes_stream().map(|chunk| chunk.map_err(Error::from));
        Ok(ChatResponse::Streamed(Box::pin(stream)))
    }

    /// `true` when `GET /health` answers `{"status": "healthy"}`.
    async fn health(&self) -> Result<bool> {
        let url = format!("{}/health", self.base_url);

        let response = self.client.get(&url).send().await?;

        if !response.status().is_success() {
            return Err(Error::Status(response.status().as_u16()));
        }

        let health: HealthResponse = response.json().await?;
        Ok(health.status == "healthy")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::ChatMessage;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request() -> ChatRequest {
        ChatRequest {
            messages: vec![ChatMessage::user("2+2?")],
            model: "llama-3.3-70b-versatile".into(),
            max_tokens: 8192,
            stream: true,
        }
    }

    #[tokio::test]
    async fn test_json_body_is_buffered() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat"))
            .and(body_json(serde_json::json!({
                "messages": [{"role": "user", "content": "2+2?"}],
                "model": "llama-3.3-70b-versatile",
                "max_tokens": 8192,
                "stream": true
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "response": "4",
                "model": "llama-3.3-70b-versatile"
            })))
            .mount(&server)
            .await;

        let transport = HttpTransport::new(&server.uri());
        match transport.send(&request()).await.unwrap() {
            ChatResponse::Buffered(reply) => assert_eq!(reply.response, "4"),
            other => panic!("expected buffered reply, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_event_stream_is_streamed() {
        let server = MockServer::start().await;
        let body = "data: {\"delta\":\"He\"}\n\ndata: {\"delta\":\"llo\"}\n\n";
        Mock::given(method("POST"))
            .and(path("/chat"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
            .mount(&server)
            .await;

        let transport = HttpTransport::new(&format!("{}/", server.uri()));
        let ChatResponse::Streamed(mut stream) = transport.send(&request()).await.unwrap() else {
            panic!("expected a stream");
        };
        let mut received = Vec::new();
        while let Some(chunk) = stream.next().await {
            received.extend_from_slice(&chunk.unwrap());
        }
        assert_eq!(received, body.as_bytes());
    }

    #[tokio::test]
    async fn test_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let transport = HttpTransport::new(&server.uri());
        let err = transport.send(&request()).await.unwrap_err();
        assert!(matches!(err, Error::Status(500)));
    }

    #[tokio::test]
    async fn test_health() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"status": "healthy"})),
            )
            .mount(&server)
            .await;

        let transport = HttpTransport::new(&server.uri());
        assert!(transport.health().await.unwrap());
    }
}

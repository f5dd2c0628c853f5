//! Network port: one request per turn carrying the whole transcript.

mod http;

use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::Stream;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::state::ChatMessage;

pub use http::HttpTransport;

/// Body of `POST /chat`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    pub model: String,
    pub max_tokens: u32,
    pub stream: bool,
}

/// A reply delivered in one piece.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct BufferedReply {
    #[serde(default)]
    pub response: String,
    #[serde(default)]
    pub model: Option<String>,
}

pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

pub enum ChatResponse {
    Buffered(BufferedReply),
    /// Raw body chunks, decoded by the session.
    Streamed(ByteStream),
}

impl std::fmt::Debug for ChatResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChatResponse::Buffered(reply) => f.debug_tuple("Buffered").field(reply).finish(),
            ChatResponse::Streamed(_) => f.write_str("Streamed(..)"),
        }
    }
}

#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Issue the request. A non-success status is an
    /// [`Error::Status`](crate::Error::Status).
    async fn send(&self, request: &ChatRequest) -> Result<ChatResponse>;

    /// Whether the backend reports itself healthy.
    async fn health(&self) -> Result<bool>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_body_shape() {
        let request = ChatRequest {
            messages: vec![ChatMessage::user("2+2?")],
            model: "llama-3.3-70b-versatile".into(),
            max_tokens: 8192,
            stream: true,
        };
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            serde_json::json!({
                "messages": [{"role": "user", "content": "2+2?"}],
                "model": "llama-3.3-70b-versatile",
                "max_tokens": 8192,
                "stream": true
            })
        );
    }

    #[test]
    fn test_buffered_reply_tolerates_missing_fields() {
        let reply: BufferedReply = serde_json::from_str(r#"{"response":"4","model":"m"}"#).unwrap();
        assert_eq!(reply.response, "4");
        assert_eq!(reply.model.as_deref(), Some("m"));

        let reply: BufferedReply = serde_json::from_str("{}").unwrap();
        assert_eq!(reply, BufferedReply::default());
    }
}

//! UI-agnostic conversation state
//!
//! The transcript is the ordered list of messages replayed to the chat
//! endpoint on every turn. It only grows; the session clears it on reset.

use serde::{Deserialize, Serialize};

/// A chat message in the conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// The role of a chat message sender
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

impl ChatRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
        }
    }
}

/// Append-only, insertion-ordered list of messages.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Transcript {
    messages: Vec<ChatMessage>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&ChatMessage> {
        self.messages.last()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChatMessage> {
        self.messages.iter()
    }

    pub fn as_slice(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub(crate) fn clear(&mut self) {
        self.messages.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_serializes_lowercase() {
        let json = serde_json::to_string(&ChatMessage::user("hi")).unwrap();
        assert_eq!(json, r#"{"role":"user","content":"hi"}"#);

        let msg: ChatMessage =
            serde_json::from_str(r#"{"role":"assistant","content":"hello"}"#).unwrap();
        assert_eq!(msg, ChatMessage::assistant("hello"));
    }

    #[test]
    fn test_transcript_keeps_insertion_order() {
        let mut transcript = Transcript::new();
        assert!(transcript.is_empty());

        transcript.push(ChatMessage::user("one"));
        transcript.push(ChatMessage::assistant("two"));
        transcript.push(ChatMessage::user("three"));

        let contents: Vec<&str> = transcript.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["one", "two", "three"]);
        assert_eq!(transcript.last().map(|m| m.role), Some(ChatRole::User));
    }

    #[test]
    fn test_transcript_serializes_as_array() {
        let mut transcript = Transcript::new();
        transcript.push(ChatMessage::user("2+2?"));
        let json = serde_json::to_value(&transcript).unwrap();
        assert_eq!(json, serde_json::json!([{"role": "user", "content": "2+2?"}]));
    }
}

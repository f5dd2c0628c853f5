//! Error types for the chatline core library.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// The HTTP request could not be completed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The chat endpoint answered with a non-success status.
    #[error("chat endpoint returned status {0}")]
    Status(u16),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(String),

    /// Writing to the system clipboard failed.
    #[error("clipboard error: {0}")]
    Clipboard(String),

    /// A second turn was submitted while one is still streaming.
    #[error("a response is still streaming")]
    TurnInProgress,

    #[error("message is empty")]
    EmptyMessage,
}

pub type Result<T> = std::result::Result<T, Error>;

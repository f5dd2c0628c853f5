pub mod config;
pub mod error;
pub mod model;
pub mod ports;
pub mod render;
pub mod session;
pub mod state;
pub mod stream;
pub mod theme;
pub mod transport;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

// Re-export main types for convenience
pub use config::Config;
pub use error::{Error, Result};
pub use model::{ModelFamily, ModelSelector, SelectedModel, DEFAULT_MODEL};
pub use ports::{BubbleBody, BubbleId, ChatView, Clipboard, Notice, SubmitState, ViewMode};
pub use render::{Markup, RenderPipeline};
pub use session::{ChatSession, SessionOptions, Turn, TurnFailure, TurnId, TurnOutcome, TurnReport, TurnState};
pub use state::{ChatMessage, ChatRole, Transcript};
pub use stream::StreamProtocol;
pub use theme::{ModeToggle, ThemeMode};
pub use transport::{ChatRequest, ChatResponse, ChatTransport, HttpTransport};

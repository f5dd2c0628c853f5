//! Ports the session drives.
//!
//! A front-end implements [`ChatView`] and [`Clipboard`]; the session never
//! touches a concrete screen or system clipboard.

use crate::error::Result;
use crate::render::Markup;
use crate::state::ChatRole;

/// Handle of a bubble appended to the view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BubbleId(pub u64);

/// Which presentation is visible. Derived from transcript emptiness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewMode {
    Welcome,
    Active,
}

impl ViewMode {
    pub fn for_transcript_len(len: usize) -> Self {
        if len == 0 {
            ViewMode::Welcome
        } else {
            ViewMode::Active
        }
    }

    /// Only the chat form's submit control is enabled in the active view;
    /// the welcome form has its own.
    pub fn submit_enabled(&self) -> bool {
        matches!(self, ViewMode::Active)
    }
}

/// What the submit control does when activated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitState {
    /// Idle: input enabled, the control sends.
    Send,
    /// Streaming: input disabled, the control cancels.
    Stop,
}

impl SubmitState {
    pub fn input_enabled(&self) -> bool {
        matches!(self, SubmitState::Send)
    }

    pub fn label(&self) -> &'static str {
        match self {
            SubmitState::Send => "Send",
            SubmitState::Stop => "Stop",
        }
    }
}

/// Fixed texts shown in place of a reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// Non-success status, or any transport/parse failure.
    RequestFailed,
    /// The reply finished without content.
    NoResponse,
    /// The user cancelled.
    Stopped,
    /// An `error` record from the stream, shown verbatim.
    ServerError(String),
}

impl Notice {
    pub fn text(&self) -> &str {
        match self {
            Notice::RequestFailed => "Error: Could not get response.",
            Notice::NoResponse => "No response from assistant.",
            Notice::Stopped => "Response stopped.",
            Notice::ServerError(message) => message,
        }
    }

    /// Errors are styled differently from the neutral notices.
    pub fn is_error(&self) -> bool {
        matches!(self, Notice::RequestFailed | Notice::ServerError(_))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BubbleBody {
    /// Placeholder while waiting for the first byte.
    Thinking,
    /// User text, shown as typed.
    Text(String),
    Markup(Markup),
    Notice(Notice),
    /// Partial reply kept after a cancel, followed by the stopped annotation.
    Stopped(Markup),
}

impl BubbleBody {
    pub const THINKING: &'static str = "Thinking...";
}

/// The presentation side of a chat session.
pub trait ChatView: Send {
    /// Show exactly one of the welcome or active presentations.
    fn show_mode(&mut self, mode: ViewMode);

    fn append_bubble(&mut self, role: ChatRole, body: BubbleBody) -> BubbleId;

    fn update_bubble(&mut self, id: BubbleId, body: BubbleBody);

    fn set_submit(&mut self, state: SubmitState);

    fn scroll_to_latest(&mut self);

    /// Remove every bubble.
    fn clear(&mut self);
}

/// Write-only access to the system clipboard.
pub trait Clipboard {
    fn write_text(&mut self, text: &str) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_view_mode_follows_transcript() {
        assert_eq!(ViewMode::for_transcript_len(0), ViewMode::Welcome);
        assert_eq!(ViewMode::for_transcript_len(3), ViewMode::Active);
        assert!(!ViewMode::Welcome.submit_enabled());
        assert!(ViewMode::Active.submit_enabled());
    }

    #[test]
    fn test_notice_texts() {
        assert_eq!(Notice::RequestFailed.text(), "Error: Could not get response.");
        assert_eq!(Notice::NoResponse.text(), "No response from assistant.");
        assert_eq!(Notice::Stopped.text(), "Response stopped.");
        assert_eq!(Notice::ServerError("rate limited".into()).text(), "rate limited");
        assert!(Notice::ServerError(String::new()).is_error());
        assert!(!Notice::Stopped.is_error());
    }
}

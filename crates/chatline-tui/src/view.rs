//! Terminal implementations of the session ports.
//!
//! The session and its running turns call the view from wherever they are;
//! every call becomes a [`ViewEvent`] on the app's event channel and is
//! applied to the screen state by the main loop.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chatline_core::{BubbleBody, BubbleId, ChatRole, ChatView, Clipboard, SubmitState, ViewMode};
use tokio::sync::mpsc;

use crate::tui::AppEvent;

#[derive(Debug, Clone, PartialEq)]
pub enum ViewEvent {
    ShowMode(ViewMode),
    Append {
        id: BubbleId,
        role: ChatRole,
        body: BubbleBody,
    },
    Update {
        id: BubbleId,
        body: BubbleBody,
    },
    Submit(SubmitState),
    ScrollToLatest,
    Clear,
}

#[derive(Clone)]
pub struct ChannelView {
    tx: mpsc::UnboundedSender<AppEvent>,
    next_id: Arc<AtomicU64>,
}

impl ChannelView {
    pub fn new(tx: mpsc::UnboundedSender<AppEvent>) -> Self {
        Self {
            tx,
            next_id: Arc::new(AtomicU64::new(0)),
        }
    }

    fn emit(&self, event: ViewEvent) {
        // The receiver only goes away on shutdown.
        let _ = self.tx.send(AppEvent::View(event));
    }
}

impl ChatView for ChannelView {
    fn show_mode(&mut self, mode: ViewMode) {
        self.emit(ViewEvent::ShowMode(mode));
    }

    fn append_bubble(&mut self, role: ChatRole, body: BubbleBody) -> BubbleId {
        let id = BubbleId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.emit(ViewEvent::Append { id, role, body });
        id
    }

    fn update_bubble(&mut self, id: BubbleId, body: BubbleBody) {
        self.emit(ViewEvent::Update { id, body });
    }

    fn set_submit(&mut self, state: SubmitState) {
        self.emit(ViewEvent::Submit(state));
    }

    fn scroll_to_latest(&mut self) {
        self.emit(ViewEvent::ScrollToLatest);
    }

    fn clear(&mut self) {
        self.emit(ViewEvent::Clear);
    }
}

/// System clipboard through arboard.
pub struct SystemClipboard {
    inner: arboard::Clipboard,
}

impl SystemClipboard {
    /// `None` when no clipboard is reachable (headless session, no display).
    pub fn open() -> Option<Self> {
        match arboard::Clipboard::new() {
            Ok(inner) => Some(Self { inner }),
            Err(e) => {
                tracing::warn!(error = %e, "clipboard unavailable");
                None
            }
        }
    }
}

impl Clipboard for SystemClipboard {
    fn write_text(&mut self, text: &str) -> chatline_core::Result<()> {
        self.inner
            .set_text(text)
            .map_err(|e| chatline_core::Error::Clipboard(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(rx: &mut mpsc::UnboundedReceiver<AppEvent>) -> Vec<ViewEvent> {
        let mut events = Vec::new();
        while let Ok(AppEvent::View(event)) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[test]
    fn test_calls_become_events_in_order() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut view = ChannelView::new(tx);
        let mut clone = view.clone();

        let user = view.append_bubble(ChatRole::User, BubbleBody::Text("hi".into()));
        let bot = clone.append_bubble(ChatRole::Assistant, BubbleBody::Thinking);
        assert_ne!(user, bot);
        clone.set_submit(SubmitState::Stop);
        view.clear();

        assert_eq!(
            drain(&mut rx),
            vec![
                ViewEvent::Append {
                    id: user,
                    role: ChatRole::User,
                    body: BubbleBody::Text("hi".into()),
                },
                ViewEvent::Append {
                    id: bot,
                    role: ChatRole::Assistant,
                    body: BubbleBody::Thinking,
                },
                ViewEvent::Submit(SubmitState::Stop),
                ViewEvent::Clear,
            ]
        );
    }

    #[test]
    fn test_closed_channel_is_ignored() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let mut view = ChannelView::new(tx);
        view.scroll_to_latest();
        assert_eq!(view.append_bubble(ChatRole::User, BubbleBody::Thinking), BubbleId(0));
    }
}

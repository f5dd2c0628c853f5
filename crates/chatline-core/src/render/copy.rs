//! Copy affordances for code blocks.

use std::time::{Duration, Instant};

use super::{CodeBlock, Markup};
use crate::error::Result;
use crate::ports::Clipboard;

/// Acknowledgment shown on buttons inside chat bubbles.
pub const BUBBLE_COPY_ACK: Duration = Duration::from_millis(600);
/// Acknowledgment shown on buttons in static content.
pub const STATIC_COPY_ACK: Duration = Duration::from_millis(1200);

pub const COPY_LABEL: &str = "Copy";
pub const COPIED_LABEL: &str = "Copied!";

pub(crate) const BUTTON_HTML: &str =
    r#"<button class="copy-btn" type="button" aria-label="Copy code">Copy</button>"#;

#[derive(Debug, Clone, PartialEq)]
pub struct CopyButton {
    ack: Duration,
    copied_at: Option<Instant>,
}

impl CopyButton {
    pub fn new(ack: Duration) -> Self {
        Self {
            ack,
            copied_at: None,
        }
    }

    pub fn ack(&self) -> Duration {
        self.ack
    }

    /// Whether the "Copied!" acknowledgment is still showing at `now`.
    pub fn is_acknowledging(&self, now: Instant) -> bool {
        self.copied_at
            .is_some_and(|at| now.saturating_duration_since(at) < self.ack)
    }

    pub fn label(&self, now: Instant) -> &'static str {
        if self.is_acknowledging(now) {
            COPIED_LABEL
        } else {
            COPY_LABEL
        }
    }

    /// Put `text` on the clipboard and start the acknowledgment.
    pub fn activate(&mut self, text: &str, clipboard: &mut dyn Clipboard, now: Instant) -> Result<()> {
        clipboard.write_text(text)?;
        self.copied_at = Some(now);
        Ok(())
    }
}

impl CodeBlock {
    /// Activate this block's copy button. Returns `false` when the block has
    /// no button.
    pub fn copy_to(&mut self, clipboard: &mut dyn Clipboard, now: Instant) -> Result<bool> {
        let Some(button) = self.copy.as_mut() else {
            return Ok(false);
        };
        button.activate(&self.code, clipboard, now)?;
        Ok(true)
    }
}

/// Give every code block without a button one. Returns how many were added.
pub fn attach_copy_buttons(markup: &mut Markup, ack: Duration) -> usize {
    let mut attached = 0;
    markup.for_each_code_block(&mut |block| {
        if block.copy.is_none() {
            block.copy = Some(CopyButton::new(ack));
            attached += 1;
        }
    });
    attached
}

/// Same as [`attach_copy_buttons`] for content outside the transcript.
pub fn attach_static_copy_buttons(markup: &mut Markup) -> usize {
    attach_copy_buttons(markup, STATIC_COPY_ACK)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::markdown;
    use crate::testing::MemoryClipboard;

    #[test]
    fn test_attach_is_idempotent() {
        let mut markup = markdown::parse("```\na\n```\n\ntext\n\n```sh\nb\n```\n");
        assert_eq!(attach_copy_buttons(&mut markup, BUBBLE_COPY_ACK), 2);
        assert_eq!(attach_copy_buttons(&mut markup, BUBBLE_COPY_ACK), 0);
        assert_eq!(attach_static_copy_buttons(&mut markup), 0);
        assert!(markup.code_blocks().iter().all(|b| b.copy.is_some()));
    }

    #[test]
    fn test_activation_copies_and_acknowledges() {
        let mut markup = markdown::parse("```\nlet x = 1;\n```\n");
        attach_copy_buttons(&mut markup, BUBBLE_COPY_ACK);
        let mut clipboard = MemoryClipboard::default();
        let now = Instant::now();

        let mut copied = false;
        markup.for_each_code_block(&mut |block| {
            copied = block.copy_to(&mut clipboard, now).unwrap();
        });
        assert!(copied);
        assert_eq!(clipboard.contents(), vec!["let x = 1;\n".to_string()]);

        let button = markup.code_blocks()[0].copy.clone().unwrap();
        assert_eq!(button.label(now), COPIED_LABEL);
        assert_eq!(button.label(now + Duration::from_millis(599)), COPIED_LABEL);
        assert_eq!(button.label(now + Duration::from_millis(600)), COPY_LABEL);
    }

    #[test]
    fn test_static_buttons_ack_longer() {
        let mut button = CopyButton::new(STATIC_COPY_ACK);
        let mut clipboard = MemoryClipboard::default();
        let now = Instant::now();
        assert_eq!(button.label(now), COPY_LABEL);
        button.activate("x", &mut clipboard, now).unwrap();
        assert!(button.is_acknowledging(now + Duration::from_millis(1000)));
        assert!(!button.is_acknowledging(now + Duration::from_millis(1200)));
    }

    #[test]
    fn test_failed_clipboard_write_does_not_acknowledge() {
        let mut button = CopyButton::new(BUBBLE_COPY_ACK);
        let mut clipboard = MemoryClipboard::failing();
        let now = Instant::now();
        assert!(button.activate("x", &mut clipboard, now).is_err());
        assert_eq!(button.label(now), COPY_LABEL);
    }

    #[test]
    fn test_block_without_button_is_not_copied() {
        let mut block = CodeBlock::new(None, "x".to_string());
        let mut clipboard = MemoryClipboard::default();
        assert!(!block.copy_to(&mut clipboard, Instant::now()).unwrap());
        assert!(clipboard.contents().is_empty());
    }
}

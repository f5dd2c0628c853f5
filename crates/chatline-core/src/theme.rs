//! Dark/light display mode.
//!
//! The toggle owns a watch channel; anything that cares about the current mode
//! (the syntax highlighter, the front-end palette) holds a receiver and reads
//! it when it needs to, so the toggle never calls into them directly.

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThemeMode {
    #[default]
    Dark,
    Light,
}

impl ThemeMode {
    pub fn toggled(self) -> Self {
        match self {
            ThemeMode::Dark => ThemeMode::Light,
            ThemeMode::Light => ThemeMode::Dark,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ThemeMode::Dark => "dark",
            ThemeMode::Light => "light",
        }
    }

    /// Material icon name shown on the toggle.
    pub fn icon(&self) -> &'static str {
        match self {
            ThemeMode::Dark => "dark_mode",
            ThemeMode::Light => "light_mode",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ThemeMode::Dark => "Dark",
            ThemeMode::Light => "Light",
        }
    }
}

pub struct ModeToggle {
    tx: watch::Sender<ThemeMode>,
}

impl ModeToggle {
    pub fn new(initial: ThemeMode) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx }
    }

    pub fn mode(&self) -> ThemeMode {
        *self.tx.borrow()
    }

    /// Receiver that observes every subsequent mode change.
    pub fn subscribe(&self) -> watch::Receiver<ThemeMode> {
        self.tx.subscribe()
    }

    pub fn set(&self, mode: ThemeMode) {
        self.tx.send_replace(mode);
    }

    /// Flip the mode and return the new one.
    pub fn toggle(&self) -> ThemeMode {
        let next = self.mode().toggled();
        self.set(next);
        tracing::debug!(mode = next.as_str(), "display mode toggled");
        next
    }
}

impl Default for ModeToggle {
    fn default() -> Self {
        Self::new(ThemeMode::default())
    }
}

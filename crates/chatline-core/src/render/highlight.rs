//! Syntax highlighting for code blocks.

use syntect::easy::HighlightLines;
use syntect::highlighting::{FontStyle, Theme, ThemeSet};
use syntect::parsing::{SyntaxReference, SyntaxSet};
use syntect::util::LinesWithEndings;
use tokio::sync::watch;

use crate::theme::ThemeMode;

pub const DARK_THEME: &str = "base16-ocean.dark";
pub const LIGHT_THEME: &str = "InspiredGitHub";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb(pub u8, pub u8, pub u8);

/// A span of highlighted text with styling information
#[derive(Debug, Clone, PartialEq)]
pub struct HighlightedSpan {
    pub text: String,
    pub fg: Rgb,
    pub bold: bool,
    pub italic: bool,
}

pub type HighlightedLine = Vec<HighlightedSpan>;

/// Optional colorizing facility used by the render pipeline.
pub trait Highlighter: Send + Sync {
    /// `None` when the language is unknown or highlighting failed; the block
    /// is then shown uncolored.
    fn highlight(&self, code: &str, lang: Option<&str>) -> Option<Vec<HighlightedLine>>;
}

/// Normalize language names to match syntect's syntax definitions
fn normalize_language(lang: &str) -> String {
    match lang.to_lowercase().as_str() {
        "py" => "python".to_string(),
        "js" => "javascript".to_string(),
        "ts" => "typescript".to_string(),
        "rs" => "rust".to_string(),
        "sh" | "shell" | "zsh" => "bash".to_string(),
        "yml" => "yaml".to_string(),
        "md" => "markdown".to_string(),
        "cpp" | "c++" => "c++".to_string(),
        "cs" => "c#".to_string(),
        "rb" => "ruby".to_string(),
        "golang" => "go".to_string(),
        other => other.to_string(),
    }
}

/// syntect-backed highlighter with one dark and one light theme. The active
/// theme follows the display mode channel.
pub struct SyntectHighlighter {
    syntaxes: SyntaxSet,
    dark: Theme,
    light: Theme,
    mode: watch::Receiver<ThemeMode>,
}

impl SyntectHighlighter {
    pub fn new(mode: watch::Receiver<ThemeMode>) -> Self {
        let mut themes = ThemeSet::load_defaults();
        let dark = themes.themes.remove(DARK_THEME).unwrap_or_default();
        let light = themes.themes.remove(LIGHT_THEME).unwrap_or_default();
        Self {
            syntaxes: SyntaxSet::load_defaults_newlines(),
            dark,
            light,
            mode,
        }
    }

    fn active_theme(&self) -> &Theme {
        match *self.mode.borrow() {
            ThemeMode::Dark => &self.dark,
            ThemeMode::Light => &self.light,
        }
    }

    fn find_syntax(&self, lang: &str) -> Option<&SyntaxReference> {
        let normalized = normalize_language(lang);
        self.syntaxes
            .find_syntax_by_extension(&normalized)
            .or_else(|| self.syntaxes.find_syntax_by_name(&normalized))
            .or_else(|| self.syntaxes.find_syntax_by_token(&normalized))
    }
}

impl Highlighter for SyntectHighlighter {
    fn highlight(&self, code: &str, lang: Option<&str>) -> Option<Vec<HighlightedLine>> {
        let syntax = self.find_syntax(lang?)?;
        let mut highlighter = HighlightLines::new(syntax, self.active_theme());

        let mut lines = Vec::new();
        for line in LinesWithEndings::from(code) {
            let ranges = match highlighter.highlight_line(line, &self.syntaxes) {
                Ok(ranges) => ranges,
                Err(e) => {
                    tracing::debug!(error = %e, "highlighting failed");
                    return None;
                }
            };
            lines.push(
                ranges
                    .into_iter()
                    .map(|(style, text)| HighlightedSpan {
                        text: text.to_string(),
                        fg: Rgb(style.foreground.r, style.foreground.g, style.foreground.b),
                        bold: style.font_style.contains(FontStyle::BOLD),
                        italic: style.font_style.contains(FontStyle::ITALIC),
                    })
                    .collect(),
            );
        }
        Some(lines)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::theme::ModeToggle;

    const CODE: &str = "fn main() {\n    println!(\"hi\");\n}\n";

    #[test]
    fn test_highlight_known_language() {
        let toggle = ModeToggle::new(ThemeMode::Dark);
        let highlighter = SyntectHighlighter::new(toggle.subscribe());

        let lines = highlighter.highlight(CODE, Some("rs")).unwrap();
        assert_eq!(lines.len(), 3);
        let rebuilt: String = lines.iter().flatten().map(|s| s.text.as_str()).collect();
        assert_eq!(rebuilt, CODE);
    }

    #[test]
    fn test_unknown_or_missing_language_is_not_highlighted() {
        let highlighter = SyntectHighlighter::new(ModeToggle::default().subscribe());
        assert!(highlighter.highlight(CODE, None).is_none());
        assert!(highlighter.highlight(CODE, Some("no-such-lang")).is_none());
    }

    #[test]
    fn test_theme_follows_mode_changes() {
        let toggle = ModeToggle::new(ThemeMode::Dark);
        let highlighter = SyntectHighlighter::new(toggle.subscribe());

        let dark = highlighter.highlight(CODE, Some("rust")).unwrap();
        toggle.toggle();
        let light = highlighter.highlight(CODE, Some("rust")).unwrap();
        assert_ne!(dark, light);

        toggle.toggle();
        assert_eq!(highlighter.highlight(CODE, Some("rust")).unwrap(), dark);
    }
}

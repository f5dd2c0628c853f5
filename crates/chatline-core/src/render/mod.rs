//! Render pipeline for assistant text.
//!
//! `render` runs on every streamed increment with the whole accumulated reply,
//! so each pass is idempotent: a code block that already carries a copy button
//! keeps it, and highlighting/typesetting only fill in what is missing.

pub mod copy;
pub mod highlight;
pub mod html;
pub mod markdown;
pub mod math;

use std::sync::Arc;
use std::time::Duration;

pub use copy::{CopyButton, BUBBLE_COPY_ACK, STATIC_COPY_ACK};
pub use highlight::{HighlightedLine, HighlightedSpan, Highlighter, Rgb, SyntectHighlighter};
pub use math::{Typesetter, UnicodeTypesetter};

/// Rendered form of a markdown document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Markup {
    /// Text the markup was rendered from.
    pub source: String,
    pub blocks: Vec<Block>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Block {
    Paragraph(Vec<Inline>),
    Heading {
        level: u8,
        content: Vec<Inline>,
    },
    Code(CodeBlock),
    List {
        /// First number for ordered lists.
        start: Option<u64>,
        items: Vec<Vec<Block>>,
    },
    Quote(Vec<Block>),
    Table {
        header: Vec<Vec<Inline>>,
        rows: Vec<Vec<Vec<Inline>>>,
    },
    Rule,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Inline {
    Text { text: String, style: TextStyle },
    Code(String),
    Link { text: String, href: String },
    Math(MathSpan),
    /// Checkbox of a task-list item.
    Task(bool),
    LineBreak,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TextStyle {
    pub bold: bool,
    pub italic: bool,
    pub strike: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CodeBlock {
    pub lang: Option<String>,
    /// Fence contents exactly as written.
    pub code: String,
    pub copy: Option<CopyButton>,
    pub highlighted: Option<Vec<HighlightedLine>>,
}

impl CodeBlock {
    pub fn new(lang: Option<String>, code: String) -> Self {
        Self {
            lang,
            code,
            copy: None,
            highlighted: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MathSpan {
    pub source: String,
    pub display: bool,
    pub typeset: Option<String>,
}

impl Markup {
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn code_blocks(&self) -> Vec<&CodeBlock> {
        let mut out = Vec::new();
        collect_code(&self.blocks, &mut out);
        out
    }

    pub fn for_each_code_block(&mut self, f: &mut impl FnMut(&mut CodeBlock)) {
        visit_code(&mut self.blocks, f);
    }

    pub fn for_each_math(&mut self, f: &mut impl FnMut(&mut MathSpan)) {
        visit_math(&mut self.blocks, f);
    }

    /// Text content with markup stripped, one line per block.
    pub fn plain_text(&self) -> String {
        let mut lines = Vec::new();
        plain_blocks(&self.blocks, &mut lines);
        lines.join("\n")
    }
}

fn collect_code<'a>(blocks: &'a [Block], out: &mut Vec<&'a CodeBlock>) {
    for block in blocks {
        match block {
            Block::Code(code) => out.push(code),
            Block::List { items, .. } => items.iter().for_each(|item| collect_code(item, out)),
            Block::Quote(inner) => collect_code(inner, out),
            _ => {}
        }
    }
}

fn visit_code(blocks: &mut [Block], f: &mut impl FnMut(&mut CodeBlock)) {
    for block in blocks {
        match block {
            Block::Code(code) => f(code),
            Block::List { items, .. } => items.iter_mut().for_each(|item| visit_code(item, f)),
            Block::Quote(inner) => visit_code(inner, f),
            _ => {}
        }
    }
}

fn visit_math(blocks: &mut [Block], f: &mut impl FnMut(&mut MathSpan)) {
    fn inlines(content: &mut [Inline], f: &mut impl FnMut(&mut MathSpan)) {
        for inline in content {
            if let Inline::Math(span) = inline {
                f(span);
            }
        }
    }

    for block in blocks {
        match block {
            Block::Paragraph(content) | Block::Heading { content, .. } => inlines(content, f),
            Block::List { items, .. } => items.iter_mut().for_each(|item| visit_math(item, f)),
            Block::Quote(inner) => visit_math(inner, f),
            Block::Table { header, rows } => {
                header.iter_mut().for_each(|cell| inlines(cell, f));
                rows.iter_mut()
                    .flatten()
                    .for_each(|cell| inlines(cell, f));
            }
            Block::Code(_) | Block::Rule => {}
        }
    }
}

/// Plain text of a run of inlines.
pub fn inline_text(content: &[Inline]) -> String {
    let mut out = String::new();
    for inline in content {
        match inline {
            Inline::Text { text, .. } | Inline::Code(text) | Inline::Link { text, .. } => {
                out.push_str(text)
            }
            Inline::Math(span) => out.push_str(span.typeset.as_deref().unwrap_or(&span.source)),
            Inline::Task(done) => out.push_str(if *done { "[x] " } else { "[ ] " }),
            Inline::LineBreak => out.push('\n'),
        }
    }
    out
}

fn plain_blocks(blocks: &[Block], lines: &mut Vec<String>) {
    for block in blocks {
        match block {
            Block::Paragraph(content) | Block::Heading { content, .. } => {
                lines.push(inline_text(content))
            }
            Block::Code(code) => lines.push(code.code.trim_end_matches('\n').to_string()),
            Block::List { items, .. } => items.iter().for_each(|item| plain_blocks(item, lines)),
            Block::Quote(inner) => plain_blocks(inner, lines),
            Block::Table { header, rows } => {
                let row_text =
                    |cells: &[Vec<Inline>]| cells.iter().map(|c| inline_text(c)).collect::<Vec<_>>().join(" | ");
                lines.push(row_text(header));
                rows.iter().for_each(|row| lines.push(row_text(row)));
            }
            Block::Rule => {}
        }
    }
}

/// Markdown → markup, followed by the copy, highlight and typeset passes.
#[derive(Clone)]
pub struct RenderPipeline {
    highlighter: Option<Arc<dyn Highlighter>>,
    typesetter: Option<Arc<dyn Typesetter>>,
    copy_ack: Duration,
}

impl Default for RenderPipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderPipeline {
    /// Pipeline with no highlighter and no typesetter.
    pub fn new() -> Self {
        Self {
            highlighter: None,
            typesetter: None,
            copy_ack: BUBBLE_COPY_ACK,
        }
    }

    pub fn with_highlighter(mut self, highlighter: Arc<dyn Highlighter>) -> Self {
        self.highlighter = Some(highlighter);
        self
    }

    pub fn with_typesetter(mut self, typesetter: Arc<dyn Typesetter>) -> Self {
        self.typesetter = Some(typesetter);
        self
    }

    pub fn with_copy_ack(mut self, ack: Duration) -> Self {
        self.copy_ack = ack;
        self
    }

    pub fn render(&self, text: &str) -> Markup {
        let mut markup = markdown::parse(text);
        self.decorate(&mut markup);
        markup
    }

    /// Run the post-conversion passes. Safe to call any number of times.
    pub fn decorate(&self, markup: &mut Markup) {
        copy::attach_copy_buttons(markup, self.copy_ack);

        if let Some(highlighter) = &self.highlighter {
            markup.for_each_code_block(&mut |block| {
                if block.highlighted.is_none() {
                    block.highlighted = highlighter.highlight(&block.code, block.lang.as_deref());
                }
            });
        }

        if let Some(typesetter) = &self.typesetter {
            markup.for_each_math(&mut |span| {
                if span.typeset.is_none() {
                    span.typeset = typesetter.typeset(&span.source, span.display);
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct UpperHighlighter;

    impl Highlighter for UpperHighlighter {
        fn highlight(&self, code: &str, _lang: Option<&str>) -> Option<Vec<HighlightedLine>> {
            Some(vec![vec![HighlightedSpan {
                text: code.to_uppercase(),
                fg: Rgb(1, 2, 3),
                bold: false,
                italic: false,
            }]])
        }
    }

    #[test]
    fn test_plain_pipeline_attaches_copy_buttons_only() {
        let markup = RenderPipeline::new().render("```rust\nfn main() {}\n```\n");
        let blocks = markup.code_blocks();
        assert_eq!(blocks.len(), 1);
        assert!(blocks[0].copy.is_some());
        assert!(blocks[0].highlighted.is_none());
    }

    #[test]
    fn test_decorate_twice_is_stable() {
        let pipeline = RenderPipeline::new().with_highlighter(Arc::new(UpperHighlighter));
        let mut markup = pipeline.render("```\nabc\n```\n\n> ```\n> def\n> ```\n");
        let once = markup.clone();
        pipeline.decorate(&mut markup);
        assert_eq!(markup, once);
        assert_eq!(markup.code_blocks().len(), 2);
        assert!(markup.code_blocks().iter().all(|b| b.copy.is_some()));
        assert_eq!(markup.code_blocks()[0].highlighted.as_ref().unwrap()[0][0].text, "ABC\n");
    }

    #[test]
    fn test_typesetter_fills_math_spans() {
        let pipeline = RenderPipeline::new().with_typesetter(Arc::new(UnicodeTypesetter));
        let markup = pipeline.render("Area is $\\pi r^2$.");
        assert_eq!(markup.plain_text(), "Area is πr².");
    }

    #[test]
    fn test_missing_typesetter_leaves_source() {
        let markup = RenderPipeline::new().render("Area is $\\pi r^2$.");
        assert_eq!(markup.plain_text(), "Area is \\pi r^2.");
    }

    #[test]
    fn test_plain_text_of_simple_reply() {
        assert_eq!(RenderPipeline::new().render("4").plain_text(), "4");
        assert!(RenderPipeline::new().render("").is_empty());
    }
}

//! Markdown → [`Markup`] conversion.
//!
//! Dialect: GitHub-flavored tables, strikethrough and task lists, smart
//! punctuation, `$`/`$$` math, and every soft line break kept as a hard one.
//! Code fence contents are copied through untouched.

use pulldown_cmark::{CodeBlockKind, Event, Options, Parser, Tag};

use super::{Block, CodeBlock, Inline, Markup, MathSpan, TextStyle};

pub fn options() -> Options {
    Options::ENABLE_TABLES
        | Options::ENABLE_STRIKETHROUGH
        | Options::ENABLE_TASKLISTS
        | Options::ENABLE_SMART_PUNCTUATION
        | Options::ENABLE_MATH
        | Options::ENABLE_GFM
}

pub fn parse(text: &str) -> Markup {
    let mut builder = Builder::new();
    for event in Parser::new_ext(text, options()) {
        builder.event(event);
    }
    Markup {
        source: text.to_string(),
        blocks: builder.finish(),
    }
}

/// What a `Start` event opened; popped again on the matching `End`.
enum Open {
    Paragraph,
    Heading(u8),
    Quote,
    List,
    Item,
    Code,
    Table,
    TableHead,
    TableRow,
    TableCell,
    Emphasis,
    Strong,
    Strike,
    Link,
    Other,
}

#[derive(Default)]
struct TableState {
    header: Vec<Vec<Inline>>,
    rows: Vec<Vec<Vec<Inline>>>,
    row: Vec<Vec<Inline>>,
}

struct Builder {
    open: Vec<Open>,
    /// Block containers: the document, then one per open quote or list item.
    sinks: Vec<Vec<Block>>,
    lists: Vec<(Option<u64>, Vec<Vec<Block>>)>,
    inlines: Vec<Inline>,
    bold: u32,
    italic: u32,
    strike: u32,
    link: Option<(String, String)>,
    code: Option<(Option<String>, String)>,
    table: Option<TableState>,
}

impl Builder {
    fn new() -> Self {
        Self {
            open: Vec::new(),
            sinks: vec![Vec::new()],
            lists: Vec::new(),
            inlines: Vec::new(),
            bold: 0,
            italic: 0,
            strike: 0,
            link: None,
            code: None,
            table: None,
        }
    }

    fn finish(mut self) -> Vec<Block> {
        self.flush_loose();
        // Unbalanced containers only happen on malformed input; fold them back.
        while self.sinks.len() > 1 {
            if let Some(inner) = self.sinks.pop() {
                self.push_block(Block::Quote(inner));
            }
        }
        self.sinks.pop().unwrap_or_default()
    }

    fn event(&mut self, event: Event<'_>) {
        match event {
            Event::Start(tag) => self.start(tag),
            Event::End(_) => self.end(),
            Event::Text(text) => {
                if let Some((_, code)) = self.code.as_mut() {
                    code.push_str(&text);
                } else if let Some((_, label)) = self.link.as_mut() {
                    label.push_str(&text);
                } else {
                    self.push_text(&text);
                }
            }
            Event::Code(code) => {
                if let Some((_, label)) = self.link.as_mut() {
                    label.push_str(&code);
                } else {
                    self.inlines.push(Inline::Code(code.into_string()));
                }
            }
            Event::InlineMath(source) => self.inlines.push(Inline::Math(MathSpan {
                source: source.into_string(),
                display: false,
                typeset: None,
            })),
            Event::DisplayMath(source) => self.inlines.push(Inline::Math(MathSpan {
                source: source.into_string(),
                display: true,
                typeset: None,
            })),
            Event::Html(html) | Event::InlineHtml(html) => self.push_text(&html),
            Event::SoftBreak | Event::HardBreak => {
                if let Some((_, label)) = self.link.as_mut() {
                    label.push(' ');
                } else {
                    self.inlines.push(Inline::LineBreak);
                }
            }
            Event::Rule => {
                self.flush_loose();
                self.push_block(Block::Rule);
            }
            Event::TaskListMarker(done) => self.inlines.push(Inline::Task(done)),
            Event::FootnoteReference(label) => self.push_text(&format!("[{label}]")),
            #[allow(unreachable_patterns)]
            _ => {}
        }
    }

    fn start(&mut self, tag: Tag<'_>) {
        let open = match tag {
            Tag::Paragraph | Tag::HtmlBlock => Open::Paragraph,
            Tag::Heading { level, .. } => Open::Heading(level as u8),
            Tag::BlockQuote(_) => {
                self.flush_loose();
                self.sinks.push(Vec::new());
                Open::Quote
            }
            Tag::CodeBlock(kind) => {
                self.flush_loose();
                let lang = match kind {
                    CodeBlockKind::Fenced(info) => info
                        .split_whitespace()
                        .next()
                        .map(str::to_string),
                    CodeBlockKind::Indented => None,
                };
                self.code = Some((lang, String::new()));
                Open::Code
            }
            Tag::List(start) => {
                self.flush_loose();
                self.lists.push((start, Vec::new()));
                Open::List
            }
            Tag::Item => {
                self.sinks.push(Vec::new());
                Open::Item
            }
            Tag::Table(_) => {
                self.flush_loose();
                self.table = Some(TableState::default());
                Open::Table
            }
            Tag::TableHead => Open::TableHead,
            Tag::TableRow => Open::TableRow,
            Tag::TableCell => Open::TableCell,
            Tag::Emphasis => {
                self.italic += 1;
                Open::Emphasis
            }
            Tag::Strong => {
                self.bold += 1;
                Open::Strong
            }
            Tag::Strikethrough => {
                self.strike += 1;
                Open::Strike
            }
            Tag::Link { dest_url, .. } | Tag::Image { dest_url, .. } => {
                self.link = Some((dest_url.into_string(), String::new()));
                Open::Link
            }
            _ => Open::Other,
        };
        self.open.push(open);
    }

    fn end(&mut self) {
        let Some(open) = self.open.pop() else {
            return;
        };
        match open {
            Open::Paragraph => {
                let content = std::mem::take(&mut self.inlines);
                if !content.is_empty() {
                    self.push_block(Block::Paragraph(content));
                }
            }
            Open::Heading(level) => {
                let content = std::mem::take(&mut self.inlines);
                self.push_block(Block::Heading { level, content });
            }
            Open::Quote => {
                self.flush_loose();
                let inner = self.sinks.pop().unwrap_or_default();
                self.push_block(Block::Quote(inner));
            }
            Open::Code => {
                if let Some((lang, code)) = self.code.take() {
                    self.push_block(Block::Code(CodeBlock::new(lang, code)));
                }
            }
            Open::List => {
                if let Some((start, items)) = self.lists.pop() {
                    self.push_block(Block::List { start, items });
                }
            }
            Open::Item => {
                self.flush_loose();
                let item = self.sinks.pop().unwrap_or_default();
                if let Some((_, items)) = self.lists.last_mut() {
                    items.push(item);
                }
            }
            Open::TableCell => {
                let cell = std::mem::take(&mut self.inlines);
                if let Some(table) = self.table.as_mut() {
                    table.row.push(cell);
                }
            }
            Open::TableHead => {
                if let Some(table) = self.table.as_mut() {
                    table.header = std::mem::take(&mut table.row);
                }
            }
            Open::TableRow => {
                if let Some(table) = self.table.as_mut() {
                    let row = std::mem::take(&mut table.row);
                    table.rows.push(row);
                }
            }
            Open::Table => {
                if let Some(table) = self.table.take() {
                    self.push_block(Block::Table {
                        header: table.header,
                        rows: table.rows,
                    });
                }
            }
            Open::Emphasis => self.italic = self.italic.saturating_sub(1),
            Open::Strong => self.bold = self.bold.saturating_sub(1),
            Open::Strike => self.strike = self.strike.saturating_sub(1),
            Open::Link => {
                if let Some((href, text)) = self.link.take() {
                    self.inlines.push(Inline::Link { text, href });
                }
            }
            Open::Other => {}
        }
    }

    fn style(&self) -> TextStyle {
        TextStyle {
            bold: self.bold > 0,
            italic: self.italic > 0,
            strike: self.strike > 0,
        }
    }

    fn push_text(&mut self, text: &str) {
        let style = self.style();
        if let Some(Inline::Text { text: last, style: last_style }) = self.inlines.last_mut() {
            if *last_style == style {
                last.push_str(text);
                return;
            }
        }
        self.inlines.push(Inline::Text {
            text: text.to_string(),
            style,
        });
    }

    /// Tight list items carry their text without a paragraph wrapper.
    fn flush_loose(&mut self) {
        if !self.inlines.is_empty() {
            let content = std::mem::take(&mut self.inlines);
            self.push_block(Block::Paragraph(content));
        }
    }

    fn push_block(&mut self, block: Block) {
        if let Some(sink) = self.sinks.last_mut() {
            sink.push(block);
        }
    }
}

//! HTML serialization of [`Markup`], for embedding rendered replies in a page.

use std::fmt::Write;

use super::copy::BUTTON_HTML;
use super::{Block, CodeBlock, Inline, Markup, MathSpan};

pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

impl Markup {
    pub fn to_html(&self) -> String {
        let mut out = String::new();
        write_blocks(&mut out, &self.blocks);
        out
    }
}

fn write_blocks(out: &mut String, blocks: &[Block]) {
    for block in blocks {
        match block {
            Block::Paragraph(content) => {
                out.push_str("<p>");
                write_inlines(out, content);
                out.push_str("</p>\n");
            }
            Block::Heading { level, content } => {
                let _ = write!(out, "<h{level}>");
                write_inlines(out, content);
                let _ = writeln!(out, "</h{level}>");
            }
            Block::Code(code) => write_code(out, code),
            Block::List { start, items } => {
                match start {
                    Some(1) => out.push_str("<ol>\n"),
                    Some(n) => {
                        let _ = writeln!(out, "<ol start=\"{n}\">");
                    }
                    None => out.push_str("<ul>\n"),
                }
                for item in items {
                    out.push_str("<li>");
                    write_item(out, item);
                    out.push_str("</li>\n");
                }
                out.push_str(if start.is_some() { "</ol>\n" } else { "</ul>\n" });
            }
            Block::Quote(inner) => {
                out.push_str("<blockquote>\n");
                write_blocks(out, inner);
                out.push_str("</blockquote>\n");
            }
            Block::Table { header, rows } => {
                out.push_str("<table>\n<thead><tr>");
                for cell in header {
                    out.push_str("<th>");
                    write_inlines(out, cell);
                    out.push_str("</th>");
                }
                out.push_str("</tr></thead>\n<tbody>\n");
                for row in rows {
                    out.push_str("<tr>");
                    for cell in row {
                        out.push_str("<td>");
                        write_inlines(out, cell);
                        out.push_str("</td>");
                    }
                    out.push_str("</tr>\n");
                }
                out.push_str("</tbody>\n</table>\n");
            }
            Block::Rule => out.push_str("<hr />\n"),
        }
    }
}

/// A single paragraph inside a list item is written inline.
fn write_item(out: &mut String, item: &[Block]) {
    match item {
        [Block::Paragraph(content)] => write_inlines(out, content),
        _ => write_blocks(out, item),
    }
}

fn write_code(out: &mut String, code: &CodeBlock) {
    out.push_str("<pre><code");
    if let Some(lang) = &code.lang {
        let _ = write!(out, " class=\"language-{}\"", escape(lang));
    }
    out.push('>');
    match &code.highlighted {
        Some(lines) => {
            for span in lines.iter().flatten() {
                let _ = write!(
                    out,
                    "<span style=\"color:#{:02x}{:02x}{:02x}\">{}</span>",
                    span.fg.0,
                    span.fg.1,
                    span.fg.2,
                    escape(&span.text)
                );
            }
        }
        None => out.push_str(&escape(&code.code)),
    }
    out.push_str("</code>");
    if code.copy.is_some() {
        out.push_str(BUTTON_HTML);
    }
    out.push_str("</pre>\n");
}

fn write_math(out: &mut String, span: &MathSpan) {
    let class = if span.display { "math math-display" } else { "math math-inline" };
    let body = span.typeset.as_deref().unwrap_or(&span.source);
    let _ = write!(out, "<span class=\"{class}\">{}</span>", escape(body));
}

fn write_inlines(out: &mut String, content: &[Inline]) {
    for inline in content {
        match inline {
            Inline::Text { text, style } => {
                if style.bold {
                    out.push_str("<strong>");
                }
                if style.italic {
                    out.push_str("<em>");
                }
                if style.strike {
                    out.push_str("<del>");
                }
                out.push_str(&escape(text));
                if style.strike {
                    out.push_str("</del>");
                }
                if style.italic {
                    out.push_str("</em>");
                }
                if style.bold {
                    out.push_str("</strong>");
                }
            }
            Inline::Code(code) => {
                let _ = write!(out, "<code>{}</code>", escape(code));
            }
            Inline::Link { text, href } => {
                let _ = write!(out, "<a href=\"{}\">{}</a>", escape(href), escape(text));
            }
            Inline::Math(span) => write_math(out, span),
            Inline::Task(done) => {
                out.push_str(if *done {
                    "<input disabled=\"\" type=\"checkbox\" checked=\"\"/> "
                } else {
                    "<input disabled=\"\" type=\"checkbox\"/> "
                });
            }
            Inline::LineBreak => out.push_str("<br />\n"),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::render::{markdown, RenderPipeline};

    #[test]
    fn test_simple_paragraph() {
        assert_eq!(markdown::parse("4").to_html(), "<p>4</p>\n");
    }

    #[test]
    fn test_breaks_and_escaping() {
        assert_eq!(
            markdown::parse("a < b\n**c**").to_html(),
            "<p>a &lt; b<br />\n<strong>c</strong></p>\n"
        );
    }

    #[test]
    fn test_code_block_gets_one_button() {
        let pipeline = RenderPipeline::new();
        let html = pipeline.render("```rust\nlet a = \"<x>\";\n```\n").to_html();
        assert_eq!(
            html,
            "<pre><code class=\"language-rust\">let a = &quot;&lt;x&gt;&quot;;\n</code>\
             <button class=\"copy-btn\" type=\"button\" aria-label=\"Copy code\">Copy</button></pre>\n"
        );

        // Decorating again never adds a second button.
        let mut markup = pipeline.render("```rust\nlet a = \"<x>\";\n```\n");
        pipeline.decorate(&mut markup);
        assert_eq!(markup.to_html(), html);
    }

    #[test]
    fn test_lists() {
        assert_eq!(
            markdown::parse("2. two\n3. three\n").to_html(),
            "<ol start=\"2\">\n<li>two</li>\n<li>three</li>\n</ol>\n"
        );
        assert_eq!(
            markdown::parse("- a\n- b\n").to_html(),
            "<ul>\n<li>a</li>\n<li>b</li>\n</ul>\n"
        );
    }

    #[test]
    fn test_math_markup() {
        assert_eq!(
            markdown::parse("$x$").to_html(),
            "<p><span class=\"math math-inline\">x</span></p>\n"
        );
    }
}

use std::time::Instant;

use chatline_core::render::{inline_text, Block as MdBlock, CodeBlock, Inline, TextStyle};
use chatline_core::{BubbleBody, ChatRole, Markup, ModelFamily, Notice, SubmitState, ThemeMode, ViewMode};
use ratatui::{
    Frame,
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, List, ListItem, Paragraph, Wrap},
};
use crate::app::{App, Bubble, InputField};

/// Colors for one display mode.
pub struct Palette {
    pub fg: Color,
    pub bg: Color,
    pub muted: Color,
    pub accent: Color,
    pub user: Color,
    pub assistant: Color,
    pub error: Color,
    pub code: Color,
    pub bar: Color,
}

pub fn palette(mode: ThemeMode) -> Palette {
    match mode {
        ThemeMode::Dark => Palette {
            fg: Color::White,
            bg: Color::Black,
            muted: Color::DarkGray,
            accent: Color::Cyan,
            user: Color::Cyan,
            assistant: Color::Yellow,
            error: Color::LightRed,
            code: Color::LightGreen,
            bar: Color::DarkGray,
        },
        ThemeMode::Light => Palette {
            fg: Color::Black,
            bg: Color::White,
            muted: Color::Gray,
            accent: Color::Blue,
            user: Color::Blue,
            assistant: Color::Magenta,
            error: Color::Red,
            code: Color::Rgb(0x24, 0x29, 0x2e),
            bar: Color::Gray,
        },
    }
}

/// Turns [`Markup`] into terminal lines.
pub struct MarkupRenderer<'a> {
    palette: &'a Palette,
    now: Instant,
    /// Prefix copy labels with the block number (help page).
    numbered: bool,
    code_index: usize,
}

impl<'a> MarkupRenderer<'a> {
    pub fn new(palette: &'a Palette, now: Instant) -> Self {
        Self {
            palette,
            now,
            numbered: false,
            code_index: 0,
        }
    }

    pub fn numbered(mut self) -> Self {
        self.numbered = true;
        self
    }

    pub fn lines(&mut self, markup: &Markup) -> Vec<Line<'static>> {
        self.blocks(&markup.blocks, true)
    }

    fn blocks(&mut self, blocks: &[MdBlock], spaced: bool) -> Vec<Line<'static>> {
        let mut out = Vec::new();
        for (i, block) in blocks.iter().enumerate() {
            if spaced && i > 0 {
                out.push(Line::default());
            }
            out.extend(self.block(block));
        }
        out
    }

    fn block(&mut self, block: &MdBlock) -> Vec<Line<'static>> {
        match block {
            MdBlock::Paragraph(content) => self.inlines(content, Style::default()),
            MdBlock::Heading { level, content } => {
                let mut style = Style::default().fg(self.palette.accent).add_modifier(Modifier::BOLD);
                if *level == 1 {
                    style = style.add_modifier(Modifier::UNDERLINED);
                }
                self.inlines(content, style)
            }
            MdBlock::Code(code) => self.code(code),
            MdBlock::List { start, items } => {
                let mut out = Vec::new();
                for (n, item) in items.iter().enumerate() {
                    let marker = match start {
                        Some(first) => format!("{}. ", first + n as u64),
                        None => "• ".to_string(),
                    };
                    let rest = " ".repeat(marker.chars().count());
                    let lines = self.blocks(item, false);
                    out.extend(indent(lines, Span::raw(marker), Span::raw(rest)));
                }
                out
            }
            MdBlock::Quote(inner) => {
                let bar = Span::styled("│ ", Style::default().fg(self.palette.muted));
                let lines = self.blocks(inner, true);
                indent(lines, bar.clone(), bar)
            }
            MdBlock::Table { header, rows } => self.table(header, rows),
            MdBlock::Rule => vec![Line::from(Span::styled(
                "─".repeat(24),
                Style::default().fg(self.palette.muted),
            ))],
        }
    }

    fn inlines(&self, content: &[Inline], base: Style) -> Vec<Line<'static>> {
        let mut lines = Vec::new();
        let mut spans: Vec<Span<'static>> = Vec::new();

        for inline in content {
            match inline {
                Inline::Text { text, style } => {
                    spans.push(Span::styled(text.clone(), base.patch(text_style(*style))));
                }
                Inline::Code(code) => {
                    spans.push(Span::styled(code.clone(), base.fg(self.palette.code)));
                }
                Inline::Link { text, href } => {
                    spans.push(Span::styled(
                        text.clone(),
                        base.fg(self.palette.accent).add_modifier(Modifier::UNDERLINED),
                    ));
                    if href != text {
                        spans.push(Span::styled(
                            format!(" ({href})"),
                            Style::default().fg(self.palette.muted),
                        ));
                    }
                }
                Inline::Math(math) => {
                    let body = math.typeset.clone().unwrap_or_else(|| math.source.clone());
                    spans.push(Span::styled(body, base.add_modifier(Modifier::ITALIC)));
                }
                Inline::Task(done) => {
                    spans.push(Span::raw(if *done { "[x] " } else { "[ ] " }));
                }
                Inline::LineBreak => lines.push(Line::from(std::mem::take(&mut spans))),
            }
        }

        lines.push(Line::from(spans));
        lines
    }

    fn code(&mut self, code: &CodeBlock) -> Vec<Line<'static>> {
        let fence = Style::default().fg(self.palette.muted);
        let mut header = vec![Span::styled(
            format!("```{}", code.lang.as_deref().unwrap_or("")),
            fence,
        )];

        self.code_index += 1;
        if let Some(button) = &code.copy {
            let label = if self.numbered {
                format!(" [{}] {} ", self.code_index, button.label(self.now))
            } else {
                format!(" [{}] ", button.label(self.now))
            };
            let style = if button.is_acknowledging(self.now) {
                Style::default().fg(Color::Green).add_modifier(Modifier::BOLD)
            } else {
                fence
            };
            header.push(Span::styled(label, style));
        }

        let mut out = vec![Line::from(header)];
        match &code.highlighted {
            Some(lines) => {
                for line in lines {
                    let spans: Vec<Span<'static>> = line
                        .iter()
                        .map(|span| {
                            let mut style = Style::default().fg(Color::Rgb(span.fg.0, span.fg.1, span.fg.2));
                            if span.bold {
                                style = style.add_modifier(Modifier::BOLD);
                            }
                            if span.italic {
                                style = style.add_modifier(Modifier::ITALIC);
                            }
                            Span::styled(span.text.trim_end_matches('\n').to_string(), style)
                        })
                        .collect();
                    out.push(Line::from(spans));
                }
            }
            None => {
                let style = Style::default().fg(self.palette.code);
                out.extend(
                    code.code
                        .lines()
                        .map(|line| Line::from(Span::styled(line.to_string(), style))),
                );
            }
        }
        out.push(Line::from(Span::styled("```", fence)));
        out
    }

    fn table(&self, header: &[Vec<Inline>], rows: &[Vec<Vec<Inline>>]) -> Vec<Line<'static>> {
        let text_rows: Vec<Vec<String>> = std::iter::once(header)
            .chain(rows.iter().map(Vec::as_slice))
            .map(|row| row.iter().map(|cell| inline_text(cell)).collect())
            .collect();

        let columns = text_rows.iter().map(Vec::len).max().unwrap_or(0);
        let widths: Vec<usize> = (0..columns)
            .map(|c| {
                text_rows
                    .iter()
                    .filter_map(|row| row.get(c))
                    .map(|cell| cell.chars().count())
                    .max()
                    .unwrap_or(0)
            })
            .collect();

        let sep = Style::default().fg(self.palette.muted);
        let mut out = Vec::new();
        for (r, row) in text_rows.iter().enumerate() {
            let mut spans = Vec::new();
            for (c, width) in widths.iter().enumerate() {
                if c > 0 {
                    spans.push(Span::styled(" │ ", sep));
                }
                let cell = row.get(c).map(String::as_str).unwrap_or("");
                let padded = format!("{cell:<width$}");
                if r == 0 {
                    spans.push(Span::styled(padded, Style::default().add_modifier(Modifier::BOLD)));
                } else {
                    spans.push(Span::raw(padded));
                }
            }
            out.push(Line::from(spans));
            if r == 0 {
                let rule: Vec<String> = widths.iter().map(|w| "─".repeat(*w)).collect();
                out.push(Line::from(Span::styled(rule.join("─┼─"), sep)));
            }
        }
        out
    }
}

fn text_style(style: TextStyle) -> Style {
    let mut out = Style::default();
    if style.bold {
        out = out.add_modifier(Modifier::BOLD);
    }
    if style.italic {
        out = out.add_modifier(Modifier::ITALIC);
    }
    if style.strike {
        out = out.add_modifier(Modifier::CROSSED_OUT);
    }
    out
}

/// Prepend `first` to the first line and `rest` to every other line.
fn indent(lines: Vec<Line<'static>>, first: Span<'static>, rest: Span<'static>) -> Vec<Line<'static>> {
    lines
        .into_iter()
        .enumerate()
        .map(|(i, line)| {
            let lead = if i == 0 { first.clone() } else { rest.clone() };
            let mut spans = vec![lead];
            spans.extend(line.spans);
            Line::from(spans)
        })
        .collect()
}

fn bubble_lines(bubble: &Bubble, palette: &Palette, frame: u8, now: Instant) -> Vec<Line<'static>> {
    let mut lines = Vec::new();
    let (label, color) = match bubble.role {
        ChatRole::User => ("You:", palette.user),
        ChatRole::Assistant => ("AI:", palette.assistant),
    };
    lines.push(Line::from(Span::styled(
        label,
        Style::default().fg(color).add_modifier(Modifier::BOLD),
    )));

    let muted = Style::default().fg(palette.muted).add_modifier(Modifier::ITALIC);
    match &bubble.body {
        BubbleBody::Thinking => {
            // Animated ellipsis: cycles through ".", "..", "..."
            let word = BubbleBody::THINKING.trim_end_matches('.');
            let dots = ".".repeat((frame as usize) + 1);
            lines.push(Line::from(Span::styled(format!("{word}{dots}"), muted)));
        }
        BubbleBody::Text(text) => {
            lines.extend(text.lines().map(|line| Line::from(line.to_string())));
        }
        BubbleBody::Markup(markup) => {
            lines.extend(MarkupRenderer::new(palette, now).lines(markup));
        }
        BubbleBody::Notice(notice) => lines.push(notice_line(notice, palette)),
        BubbleBody::Stopped(markup) => {
            lines.extend(MarkupRenderer::new(palette, now).lines(markup));
            lines.push(notice_line(&Notice::Stopped, palette));
        }
    }

    lines.push(Line::default());
    lines
}

fn notice_line(notice: &Notice, palette: &Palette) -> Line<'static> {
    let style = if notice.is_error() {
        Style::default().fg(palette.error)
    } else {
        Style::default().fg(palette.muted).add_modifier(Modifier::ITALIC)
    };
    Line::from(Span::styled(notice.text().to_string(), style))
}

pub fn render(app: &mut App, frame: &mut Frame) {
    let area = frame.area();
    let palette = palette(app.mode.mode());

    frame.render_widget(
        Block::default().style(Style::default().bg(palette.bg).fg(palette.fg)),
        area,
    );

    // Main layout: header, body, footer
    let [header_area, body_area, footer_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(0),
        Constraint::Length(1),
    ])
    .areas(area);

    render_header(app, &palette, frame, header_area);

    match app.view_mode {
        ViewMode::Welcome => render_welcome(app, &palette, frame, body_area),
        ViewMode::Active => render_chat(app, &palette, frame, body_area),
    }

    render_footer(app, &palette, frame, footer_area);

    if app.show_help {
        render_help(app, &palette, frame, area);
    } else if app.show_model_picker {
        render_model_picker(app, &palette, frame, area);
    }
}

fn render_header(app: &App, palette: &Palette, frame: &mut Frame, area: Rect) {
    let health = match app.server_healthy {
        Some(true) => Span::styled(" ● online ", Style::default().fg(Color::Green)),
        Some(false) => Span::styled(" ● offline ", Style::default().fg(palette.error)),
        None => Span::styled(" ○ ", Style::default().fg(palette.muted)),
    };
    let mode = app.mode.mode();

    let title = Line::from(vec![
        Span::styled(" chatline ", Style::default().fg(palette.accent).bold()),
        Span::raw(app.selector.value().to_string()),
        Span::styled(format!("  {}", app.endpoint()), Style::default().fg(palette.muted)),
        health,
        Span::styled(
            format!(" {} {} ", mode.icon(), mode.label()),
            Style::default().fg(palette.muted),
        ),
    ]);

    let header = Paragraph::new(title).style(Style::default().bg(palette.bar));
    frame.render_widget(header, area);
}

fn render_footer(app: &App, palette: &Palette, frame: &mut Frame, area: Rect) {
    let (mode_text, mode_style) = match (app.view_mode, app.submit) {
        (_, SubmitState::Stop) => (" STREAMING ", Style::default().bg(Color::Yellow).fg(Color::Black)),
        (ViewMode::Welcome, _) => (" WELCOME ", Style::default().bg(Color::Blue).fg(Color::White)),
        (ViewMode::Active, _) => (" CHAT ", Style::default().bg(Color::Blue).fg(Color::White)),
    };

    // Key chips read the same in both modes
    let key_style = Style::default().bg(Color::DarkGray).fg(Color::White);
    let label_style = Style::default().fg(palette.fg);

    let mut hints = match app.submit {
        SubmitState::Stop => vec![
            Span::styled(" Enter/Esc ", key_style),
            Span::styled(" stop ", label_style),
        ],
        SubmitState::Send => vec![
            Span::styled(" Enter ", key_style),
            Span::styled(" send ", label_style),
        ],
    };
    hints.extend(vec![
        Span::styled(" F1 ", key_style),
        Span::styled(" help ", label_style),
        Span::styled(" F2 ", key_style),
        Span::styled(" model ", label_style),
        Span::styled(" ^T ", key_style),
        Span::styled(" mode ", label_style),
        Span::styled(" ^Y ", key_style),
        Span::styled(" copy code ", label_style),
        Span::styled(" ^L ", key_style),
        Span::styled(" new ", label_style),
        Span::styled(" ^C ", key_style),
        Span::styled(" quit ", label_style),
    ]);

    if let Some((status, _)) = &app.status {
        hints.push(Span::styled(format!("  {status}"), Style::default().fg(palette.accent)));
    }

    let footer_content = Line::from(
        vec![Span::styled(mode_text, mode_style), Span::raw(" ")]
            .into_iter()
            .chain(hints)
            .collect::<Vec<_>>(),
    );

    frame.render_widget(Paragraph::new(footer_content), area);
}

fn render_welcome(app: &App, palette: &Palette, frame: &mut Frame, area: Rect) {
    let width = 60.min(area.width.saturating_sub(4));
    let x = area.x + (area.width.saturating_sub(width)) / 2;
    let y = area.y + area.height.saturating_sub(7) / 2;
    let [title_area, input_area, hint_area] = Layout::vertical([
        Constraint::Length(2),
        Constraint::Length(3),
        Constraint::Length(2),
    ])
    .areas(Rect::new(x, y, width, 7.min(area.height)));

    let title = Paragraph::new(Line::from(Span::styled(
        "How can I help you today?",
        Style::default().fg(palette.accent).add_modifier(Modifier::BOLD),
    )))
    .centered();
    frame.render_widget(title, title_area);

    render_input(&app.welcome_input, true, " Ask anything ", palette, frame, input_area);

    let hint = Paragraph::new(Line::from(Span::styled(
        "Enter to send · F1 for help",
        Style::default().fg(palette.muted),
    )))
    .centered();
    frame.render_widget(hint, hint_area);
}

fn render_chat(app: &mut App, palette: &Palette, frame: &mut Frame, area: Rect) {
    let [chat_area, input_area] = Layout::vertical([
        Constraint::Min(0),
        Constraint::Length(3),
    ])
    .areas(area);

    let chat_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(palette.muted))
        .title(format!(" {} ", app.selector.value()));

    let now = Instant::now();
    let lines: Vec<Line<'static>> = app
        .bubbles
        .iter()
        .flat_map(|bubble| bubble_lines(bubble, palette, app.animation_frame, now))
        .collect();

    let transcript = Paragraph::new(Text::from(lines)).wrap(Wrap { trim: false });

    // Keep the newest content in view unless the user scrolled away.
    // Rows are counted with the same word wrapping the paragraph renders with.
    let inner = chat_block.inner(chat_area);
    let total = u16::try_from(transcript.line_count(inner.width)).unwrap_or(u16::MAX);
    let max_scroll = total.saturating_sub(inner.height);
    if app.follow {
        app.chat_scroll = max_scroll;
    } else {
        app.chat_scroll = app.chat_scroll.min(max_scroll);
        if app.chat_scroll == max_scroll {
            app.follow = true;
        }
    }

    let chat = transcript.block(chat_block).scroll((app.chat_scroll, 0));
    frame.render_widget(chat, chat_area);

    let enabled = app.view_mode.submit_enabled() && app.submit.input_enabled();
    let title = if enabled {
        " Message (Enter to send) "
    } else {
        " Streaming (Enter or Esc to stop) "
    };
    render_input(&app.chat_input, enabled, title, palette, frame, input_area);
}

fn render_input(
    field: &InputField,
    enabled: bool,
    title: &str,
    palette: &Palette,
    frame: &mut Frame,
    area: Rect,
) {
    let border = if enabled { palette.accent } else { palette.muted };
    let input_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border))
        .title(title.to_string());

    // Calculate visible portion of input with horizontal scrolling
    // Inner width = total width - 2 (for borders)
    let inner_width = area.width.saturating_sub(2) as usize;
    let cursor_pos = field.cursor;

    // Calculate scroll offset to keep cursor visible
    let scroll_offset = if inner_width == 0 {
        0
    } else if cursor_pos >= inner_width {
        cursor_pos - inner_width + 1
    } else {
        0
    };

    let visible_text: String = field
        .text
        .chars()
        .skip(scroll_offset)
        .take(inner_width)
        .collect();

    let style = if enabled {
        Style::default().fg(palette.fg)
    } else {
        Style::default().fg(palette.muted)
    };
    frame.render_widget(Paragraph::new(visible_text).style(style).block(input_block), area);

    if enabled {
        let cursor_x = (cursor_pos - scroll_offset) as u16;
        frame.set_cursor_position((area.x + cursor_x + 1, area.y + 1));
    }
}

fn centered(area: Rect, width_pct: u16, height_pct: u16) -> Rect {
    let scale = |len: u16, pct: u16| (u32::from(len) * u32::from(pct.min(100)) / 100) as u16;
    let width = scale(area.width, width_pct);
    let height = scale(area.height, height_pct);
    Rect::new(
        area.x + (area.width - width) / 2,
        area.y + (area.height - height) / 2,
        width,
        height,
    )
}

fn render_help(app: &App, palette: &Palette, frame: &mut Frame, area: Rect) {
    let popup_area = centered(area, 80, 80);
    frame.render_widget(Clear, popup_area);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(palette.accent))
        .style(Style::default().bg(palette.bg).fg(palette.fg))
        .title(" Help (1-9 to copy a block, Esc to close) ");

    let lines = MarkupRenderer::new(palette, Instant::now()).numbered().lines(&app.help);
    let help = Paragraph::new(Text::from(lines))
        .block(block)
        .wrap(Wrap { trim: false })
        .scroll((app.help_scroll, 0));
    frame.render_widget(help, popup_area);
}

fn render_model_picker(app: &mut App, palette: &Palette, frame: &mut Frame, area: Rect) {
    // Calculate popup size and position (centered)
    let popup_width = 60.min(area.width.saturating_sub(4));
    let popup_height = (app.selector.choices().len() as u16 + 2).min(area.height.saturating_sub(4));

    let popup_x = (area.width.saturating_sub(popup_width)) / 2;
    let popup_y = (area.height.saturating_sub(popup_height)) / 2;

    let popup_area = Rect::new(popup_x, popup_y, popup_width, popup_height);

    // Clear the area behind the popup
    frame.render_widget(Clear, popup_area);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(palette.accent))
        .style(Style::default().bg(palette.bg).fg(palette.fg))
        .title(" Select Model (Enter to select, Esc to cancel) ");

    let current = app.selector.value();
    let items: Vec<ListItem> = app
        .selector
        .choices()
        .iter()
        .map(|model| {
            let style = if model == current {
                Style::default().fg(Color::Green).add_modifier(Modifier::BOLD)
            } else {
                Style::default()
            };
            let family = ModelFamily::for_model(model)
                .map(|f| f.display_name())
                .unwrap_or("custom");
            ListItem::new(Line::from(vec![
                Span::styled(format!(" {model} "), style),
                Span::styled(format!("({family})"), Style::default().fg(palette.muted)),
            ]))
        })
        .collect();

    let list = List::new(items)
        .block(block)
        .highlight_style(
            Style::default()
                .bg(Color::Blue)
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("> ");

    frame.render_stateful_widget(list, popup_area, &mut app.model_picker_state);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::view::ViewEvent;
    use chatline_core::testing::ScriptedTransport;
    use chatline_core::{BubbleId, RenderPipeline};
    use ratatui::{backend::TestBackend, Terminal};

    fn text(line: &Line<'_>) -> String {
        line.spans.iter().map(|s| s.content.as_ref()).collect()
    }

    fn render_markdown(source: &str) -> Vec<String> {
        let palette = palette(ThemeMode::Dark);
        let markup = RenderPipeline::new().render(source);
        MarkupRenderer::new(&palette, Instant::now())
            .lines(&markup)
            .iter()
            .map(text)
            .collect()
    }

    #[test]
    fn test_lists_quotes_and_breaks() {
        assert_eq!(
            render_markdown("a\nb\n\n- one\n- two\n\n> quoted"),
            vec!["a", "b", "", "• one", "• two", "", "│ quoted"]
        );
        assert_eq!(render_markdown("3. x\n4. y"), vec!["3. x", "4. y"]);
    }

    #[test]
    fn test_code_block_with_copy_label() {
        assert_eq!(
            render_markdown("```sh\nls\npwd\n```"),
            vec!["```sh [Copy] ", "ls", "pwd", "```"]
        );
    }

    #[test]
    fn test_table_columns_are_aligned() {
        assert_eq!(
            render_markdown("| a | bb |\n|---|---|\n| ccc | d |"),
            vec!["a   │ bb", "────┼───", "ccc │ d "]
        );
    }

    #[test]
    fn test_notices_and_stopped_bubbles() {
        let palette = palette(ThemeMode::Light);
        let stopped = Bubble {
            id: BubbleId(1),
            role: ChatRole::Assistant,
            body: BubbleBody::Stopped(RenderPipeline::new().render("partial")),
        };
        let lines: Vec<String> = bubble_lines(&stopped, &palette, 0, Instant::now())
            .iter()
            .map(text)
            .collect();
        assert_eq!(lines, vec!["AI:", "partial", "Response stopped.", ""]);

        let failed = Bubble {
            id: BubbleId(2),
            role: ChatRole::Assistant,
            body: BubbleBody::Notice(Notice::RequestFailed),
        };
        let lines = bubble_lines(&failed, &palette, 0, Instant::now());
        assert_eq!(text(&lines[1]), "Error: Could not get response.");
    }

    fn screen(terminal: &Terminal<TestBackend>) -> Vec<String> {
        let buffer = terminal.backend().buffer();
        let width = buffer.area.width as usize;
        buffer
            .content()
            .chunks(width)
            .map(|row| row.iter().map(|cell| cell.symbol()).collect())
            .collect()
    }

    #[test]
    fn test_welcome_screen_renders() {
        let (mut app, _rx) = App::scripted(ScriptedTransport::new());
        let mut terminal = Terminal::new(TestBackend::new(100, 30)).unwrap();
        terminal.draw(|frame| render(&mut app, frame)).unwrap();

        let screen = screen(&terminal).concat();
        assert!(screen.contains("How can I help you today?"));
        assert!(screen.contains("llama-3.3-70b-versatile"));
        assert!(screen.contains("WELCOME"));
    }

    /// A reply of long words that wrap one per row.
    fn long_reply_app() -> App {
        let source: Vec<String> = (0..6)
            .map(|i| {
                ['a', 'b', 'c', 'd']
                    .iter()
                    .map(|c| format!("{}{i}", c.to_string().repeat(19)))
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .chain(std::iter::once("FINALMARKER".to_string()))
            .collect();
        let markup = RenderPipeline::new().render(&source.join("\n\n"));

        let (mut app, _rx) = App::scripted(ScriptedTransport::new());
        app.apply_view_event(ViewEvent::ShowMode(ViewMode::Active));
        app.apply_view_event(ViewEvent::Append {
            id: BubbleId(0),
            role: ChatRole::Assistant,
            body: BubbleBody::Markup(markup),
        });
        app
    }

    #[test]
    fn test_following_shows_end_of_wrapped_reply() {
        let mut app = long_reply_app();
        let mut terminal = Terminal::new(TestBackend::new(40, 20)).unwrap();
        terminal.draw(|frame| render(&mut app, frame)).unwrap();

        let rows = screen(&terminal);
        assert!(
            rows.iter().any(|row| row.contains("FINALMARKER")),
            "last line hidden at scroll {}: {rows:#?}",
            app.chat_scroll
        );
        assert!(rows.iter().any(|row| row.contains("ddddddddddddddddddd5")));
    }

    #[test]
    fn test_scrolling_back_down_reaches_the_end() {
        let mut app = long_reply_app();
        let mut terminal = Terminal::new(TestBackend::new(40, 20)).unwrap();
        terminal.draw(|frame| render(&mut app, frame)).unwrap();

        app.scroll_up(100);
        terminal.draw(|frame| render(&mut app, frame)).unwrap();
        assert_eq!(app.chat_scroll, 0);
        assert!(!screen(&terminal).concat().contains("FINALMARKER"));

        app.scroll_down(u16::MAX);
        terminal.draw(|frame| render(&mut app, frame)).unwrap();
        assert!(app.follow);
        assert!(screen(&terminal).concat().contains("FINALMARKER"));
    }

    #[test]
    fn test_centered_popup_on_wide_terminal() {
        let area = Rect::new(0, 0, 1000, 300);
        assert_eq!(centered(area, 80, 80), Rect::new(100, 30, 800, 240));
    }

    #[test]
    fn test_thinking_placeholder_animates() {
        let palette = palette(ThemeMode::Dark);
        let bubble = Bubble {
            id: BubbleId(0),
            role: ChatRole::Assistant,
            body: BubbleBody::Thinking,
        };
        let lines = bubble_lines(&bubble, &palette, 2, Instant::now());
        assert_eq!(text(&lines[1]), BubbleBody::THINKING);
    }
}

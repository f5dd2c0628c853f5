use std::sync::Arc;
use std::time::{Duration, Instant};

use chatline_core::model::known_models;
use chatline_core::render::copy::attach_static_copy_buttons;
use chatline_core::render::{markdown, SyntectHighlighter, UnicodeTypesetter};
use chatline_core::{
    BubbleBody, BubbleId, ChatRole, ChatSession, ChatTransport, Clipboard, Config, Error,
    HttpTransport, Markup, ModeToggle, ModelSelector, RenderPipeline, SessionOptions, SubmitState,
    Turn, TurnReport, ViewMode,
};
use ratatui::widgets::ListState;
use tokio::sync::mpsc;

use crate::tui::AppEvent;
use crate::view::{ChannelView, SystemClipboard, ViewEvent};

const STATUS_TTL: Duration = Duration::from_secs(2);

const HELP_TEXT: &str = r#"# chatline

Type a message and press **Enter**. While a reply is streaming, **Enter** or **Esc** stops it.

| Key | Action |
|---|---|
| F1 | show or hide this help |
| F2 | choose the model |
| Ctrl-t | switch dark/light mode |
| Ctrl-y | copy the latest code block of the conversation |
| Ctrl-l | start a new conversation |
| PgUp / PgDn | scroll the conversation |
| Ctrl-c | quit |

In this help, press a digit to copy the matching code block.

Settings live in `config.json` inside the chatline config directory:

```json
{
  "endpoint": "http://localhost:8000",
  "default_model": "llama-3.3-70b-versatile",
  "stream_protocol": "data_lines"
}
```

Environment overrides:

```sh
CHATLINE_ENDPOINT=http://localhost:8000 CHATLINE_MODEL=deepseek-chat CHATLINE_LOG=debug chatline
```
"#;

/// Convert a character index to a byte index for UTF-8 safe string operations
fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

/// Single-line text input with a character cursor.
#[derive(Debug, Clone, Default)]
pub struct InputField {
    pub text: String,
    pub cursor: usize,
}

impl InputField {
    pub fn insert(&mut self, c: char) {
        let byte_pos = char_to_byte_index(&self.text, self.cursor);
        self.text.insert(byte_pos, c);
        self.cursor += 1;
    }

    pub fn backspace(&mut self) {
        if self.cursor > 0 {
            self.cursor -= 1;
            let byte_pos = char_to_byte_index(&self.text, self.cursor);
            self.text.remove(byte_pos);
        }
    }

    pub fn delete(&mut self) {
        if self.cursor < self.text.chars().count() {
            let byte_pos = char_to_byte_index(&self.text, self.cursor);
            self.text.remove(byte_pos);
        }
    }

    pub fn left(&mut self) {
        self.cursor = self.cursor.saturating_sub(1);
    }

    pub fn right(&mut self) {
        self.cursor = (self.cursor + 1).min(self.text.chars().count());
    }

    pub fn home(&mut self) {
        self.cursor = 0;
    }

    pub fn end(&mut self) {
        self.cursor = self.text.chars().count();
    }

    /// Take the contents, leaving the field empty.
    pub fn take(&mut self) -> String {
        self.cursor = 0;
        std::mem::take(&mut self.text)
    }

    pub fn clear(&mut self) {
        self.take();
    }
}

#[derive(Debug, Clone)]
pub struct Bubble {
    pub id: BubbleId,
    pub role: ChatRole,
    pub body: BubbleBody,
}

/// Activate the copy button of the `n`th code block of `markup`.
fn copy_code_block(
    markup: &mut Markup,
    n: usize,
    clipboard: &mut dyn Clipboard,
    now: Instant,
) -> chatline_core::Result<bool> {
    let mut index = 0;
    let mut result = Ok(false);
    markup.for_each_code_block(&mut |block| {
        if index == n {
            result = block.copy_to(&mut *clipboard, now);
        }
        index += 1;
    });
    result
}

/// Render pipeline with syntax highlighting that follows `mode`.
pub fn build_pipeline(mode: &ModeToggle) -> RenderPipeline {
    RenderPipeline::new()
        .with_highlighter(Arc::new(SyntectHighlighter::new(mode.subscribe())))
        .with_typesetter(Arc::new(UnicodeTypesetter))
}

/// Markdown outside the transcript: static copy buttons, then the usual
/// decoration passes.
pub fn render_static(pipeline: &RenderPipeline, source: &str) -> Markup {
    let mut markup = markdown::parse(source);
    attach_static_copy_buttons(&mut markup);
    pipeline.decorate(&mut markup);
    markup
}

fn build_help(pipeline: &RenderPipeline) -> Markup {
    render_static(pipeline, HELP_TEXT)
}

pub struct App {
    pub should_quit: bool,

    // Session and network
    pub session: ChatSession<ChannelView>,
    transport: Arc<dyn ChatTransport>,
    endpoint: String,
    events: mpsc::UnboundedSender<AppEvent>,
    pub server_healthy: Option<bool>,

    // Presentation, mirrored from the view port
    pub view_mode: ViewMode,
    pub submit: SubmitState,
    pub bubbles: Vec<Bubble>,

    // Welcome form and chat form
    pub welcome_input: InputField,
    pub chat_input: InputField,

    // Transcript scrolling
    pub chat_scroll: u16,
    pub follow: bool,

    // Display mode
    pub mode: ModeToggle,

    // Model picker state
    pub selector: ModelSelector,
    pub show_model_picker: bool,
    pub model_picker_state: ListState,

    // Help page (static content)
    pub show_help: bool,
    pub help: Markup,
    pub help_scroll: u16,

    clipboard: Option<SystemClipboard>,
    pub status: Option<(String, Instant)>,

    // Animation state
    pub animation_frame: u8, // 0-2 for ellipsis animation
}

impl App {
    pub fn new(config: &Config, model: Option<String>, events: mpsc::UnboundedSender<AppEvent>) -> Self {
        let transport = HttpTransport::new(config.endpoint());
        let endpoint = transport.base_url().to_string();
        Self::with_transport(config, model, Arc::new(transport), endpoint, events)
    }

    pub fn with_transport(
        config: &Config,
        model: Option<String>,
        transport: Arc<dyn ChatTransport>,
        endpoint: String,
        events: mpsc::UnboundedSender<AppEvent>,
    ) -> Self {
        let mode = ModeToggle::new(config.mode());
        let pipeline = build_pipeline(&mode);

        let initial_model = model.or_else(|| config.default_model.clone());
        let selector = ModelSelector::new(known_models(), initial_model.as_deref());

        let help = build_help(&pipeline);
        let session = ChatSession::new(
            ChannelView::new(events.clone()),
            pipeline,
            selector.hidden_field(),
            SessionOptions::from_config(config),
        );

        Self {
            should_quit: false,
            session,
            transport,
            endpoint,
            events,
            server_healthy: None,
            view_mode: ViewMode::Welcome,
            submit: SubmitState::Send,
            bubbles: Vec::new(),
            welcome_input: InputField::default(),
            chat_input: InputField::default(),
            chat_scroll: 0,
            follow: true,
            mode,
            selector,
            show_model_picker: false,
            model_picker_state: ListState::default(),
            show_help: false,
            help,
            help_scroll: 0,
            clipboard: SystemClipboard::open(),
            status: None,
            animation_frame: 0,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Check `/health` in the background; the answer arrives as an event.
    pub fn check_health(&self) {
        let transport = Arc::clone(&self.transport);
        let tx = self.events.clone();
        tokio::spawn(async move {
            let healthy = match transport.health().await {
                Ok(healthy) => healthy,
                Err(e) => {
                    tracing::warn!(error = %e, "health check failed");
                    false
                }
            };
            let _ = tx.send(AppEvent::Health(healthy));
        });
    }

    pub fn apply_view_event(&mut self, event: ViewEvent) {
        match event {
            ViewEvent::ShowMode(mode) => self.view_mode = mode,
            ViewEvent::Append { id, role, body } => self.bubbles.push(Bubble { id, role, body }),
            ViewEvent::Update { id, body } => {
                if let Some(bubble) = self.bubbles.iter_mut().find(|b| b.id == id) {
                    bubble.body = body;
                }
            }
            ViewEvent::Submit(state) => self.submit = state,
            ViewEvent::ScrollToLatest => self.follow = true,
            ViewEvent::Clear => {
                self.bubbles.clear();
                self.chat_scroll = 0;
                self.follow = true;
            }
        }
    }

    pub fn is_streaming(&self) -> bool {
        self.session.is_streaming()
    }

    /// The form the user is typing into.
    pub fn active_input_mut(&mut self) -> &mut InputField {
        match self.view_mode {
            ViewMode::Welcome => &mut self.welcome_input,
            ViewMode::Active => &mut self.chat_input,
        }
    }

    /// Submit control: sends when idle, stops when streaming.
    pub fn submit_or_stop(&mut self) {
        if self.is_streaming() {
            self.stop();
            return;
        }

        let text = self.active_input_mut().take();
        match self.session.begin_turn(&text) {
            Ok(turn) => self.spawn_turn(turn),
            Err(Error::EmptyMessage) => {}
            Err(e) => {
                tracing::warn!(error = %e, "could not start turn");
                self.flash(e.to_string());
            }
        }
    }

    fn spawn_turn(&mut self, turn: Turn<ChannelView>) {
        let transport = Arc::clone(&self.transport);
        let tx = self.events.clone();
        tokio::spawn(async move {
            let report = turn.run(transport.as_ref()).await;
            let _ = tx.send(AppEvent::TurnFinished(report));
        });
    }

    pub fn stop(&mut self) {
        self.session.cancel();
    }

    pub fn finish_turn(&mut self, report: TurnReport) {
        self.session.finish_turn(report);
    }

    pub fn reset_session(&mut self) {
        self.session.reset();
        self.welcome_input.clear();
        self.chat_input.clear();
        self.flash("New conversation");
    }

    /// Flip dark/light and re-render rendered replies so their code blocks
    /// pick up the other highlight theme.
    pub fn toggle_mode(&mut self) {
        let mode = self.mode.toggle();
        let pipeline = Arc::clone(self.session.pipeline());
        for bubble in &mut self.bubbles {
            if let BubbleBody::Markup(markup) | BubbleBody::Stopped(markup) = &mut bubble.body {
                *markup = pipeline.render(&markup.source);
            }
        }
        self.help = build_help(&pipeline);
        self.flash(format!("{} mode", mode.label()));
    }

    /// Copy the last code block of the most recent reply that has one.
    pub fn copy_latest_code(&mut self) {
        let now = Instant::now();
        let Some(clipboard) = self.clipboard.as_mut() else {
            self.flash("Clipboard unavailable");
            return;
        };
        let target = self.bubbles.iter_mut().rev().find_map(|b| match &mut b.body {
            BubbleBody::Markup(markup) | BubbleBody::Stopped(markup)
                if !markup.code_blocks().is_empty() =>
            {
                Some(markup)
            }
            _ => None,
        });
        let result = match target {
            Some(markup) => {
                let last = markup.code_blocks().len() - 1;
                copy_code_block(markup, last, clipboard, now)
            }
            None => Ok(false),
        };
        self.report_copy(result);
    }

    /// Copy the `n`th (zero-based) code block of the help page.
    pub fn copy_help_block(&mut self, n: usize) {
        let now = Instant::now();
        let Some(clipboard) = self.clipboard.as_mut() else {
            self.flash("Clipboard unavailable");
            return;
        };
        let result = copy_code_block(&mut self.help, n, clipboard, now);
        self.report_copy(result);
    }

    fn report_copy(&mut self, result: chatline_core::Result<bool>) {
        match result {
            Ok(true) => {}
            Ok(false) => self.flash("No code block to copy"),
            Err(e) => {
                tracing::warn!(error = %e, "copy failed");
                self.flash(e.to_string());
            }
        }
    }

    // Model picker methods
    pub fn open_model_picker(&mut self) {
        self.model_picker_state.select(Some(self.selector.selected_index()));
        self.show_model_picker = true;
    }

    pub fn model_picker_nav_down(&mut self) {
        let len = self.selector.choices().len();
        if len > 0 {
            let i = self.model_picker_state.selected().unwrap_or(0);
            self.model_picker_state.select(Some((i + 1).min(len - 1)));
        }
    }

    pub fn model_picker_nav_up(&mut self) {
        let i = self.model_picker_state.selected().unwrap_or(0);
        self.model_picker_state.select(Some(i.saturating_sub(1)));
    }

    pub fn select_model(&mut self) {
        let Some(i) = self.model_picker_state.selected() else {
            return;
        };
        if let Some(model) = self.selector.select(i).map(str::to_string) {
            self.show_model_picker = false;
            // Save to config
            if let Err(e) = Config::save_default_model(&model) {
                tracing::warn!(error = %e, "could not save default model");
            }
        }
    }

    pub fn scroll_up(&mut self, lines: u16) {
        self.follow = false;
        self.chat_scroll = self.chat_scroll.saturating_sub(lines);
    }

    pub fn scroll_down(&mut self, lines: u16) {
        self.chat_scroll = self.chat_scroll.saturating_add(lines);
    }

    pub fn flash(&mut self, message: impl Into<String>) {
        self.status = Some((message.into(), Instant::now()));
    }

    /// Tick animation frame and expire the status line (called by Tick event)
    pub fn tick(&mut self) {
        if self.is_streaming() {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
        if self
            .status
            .as_ref()
            .is_some_and(|(_, at)| at.elapsed() >= STATUS_TTL)
        {
            self.status = None;
        }
    }
}

#[cfg(test)]
impl App {
    /// App talking to an in-memory backend, with the view events on `rx`.
    pub(crate) fn scripted(
        transport: chatline_core::testing::ScriptedTransport,
    ) -> (Self, mpsc::UnboundedReceiver<AppEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let app = Self::with_transport(
            &Config::new(),
            None,
            Arc::new(transport),
            "http://test".to_string(),
            tx,
        );
        (app, rx)
    }

    /// Apply pending view events without waiting.
    pub(crate) fn pump(&mut self, rx: &mut mpsc::UnboundedReceiver<AppEvent>) {
        while let Ok(event) = rx.try_recv() {
            if let AppEvent::View(event) = event {
                self.apply_view_event(event);
            }
        }
    }

    /// Apply events until the running turn reports back.
    pub(crate) async fn settle(&mut self, rx: &mut mpsc::UnboundedReceiver<AppEvent>) {
        let wait = async {
            while let Some(event) = rx.recv().await {
                match event {
                    AppEvent::View(event) => self.apply_view_event(event),
                    AppEvent::TurnFinished(report) => {
                        self.finish_turn(report);
                        self.pump(&mut *rx);
                        return;
                    }
                    AppEvent::Health(healthy) => self.server_healthy = Some(healthy),
                    _ => {}
                }
            }
        };
        tokio::time::timeout(Duration::from_secs(5), wait)
            .await
            .expect("turn did not finish");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatline_core::testing::ScriptedTransport;

    fn type_text(app: &mut App, text: &str) {
        for c in text.chars() {
            app.active_input_mut().insert(c);
        }
    }

    #[test]
    fn test_input_field_editing_is_char_based() {
        let mut field = InputField::default();
        for c in "héllo".chars() {
            field.insert(c);
        }
        field.left();
        field.left();
        field.backspace();
        assert_eq!(field.text, "hélo");
        field.home();
        field.delete();
        assert_eq!(field.text, "élo");
        field.end();
        field.insert('!');
        assert_eq!(field.take(), "élo!");
        assert_eq!(field.cursor, 0);
    }

    #[test]
    fn test_help_has_static_copy_buttons() {
        let help = build_help(&RenderPipeline::new());
        let blocks = help.code_blocks();
        assert_eq!(blocks.len(), 2);
        assert!(blocks
            .iter()
            .all(|b| b.copy.as_ref().map(|c| c.ack()) == Some(chatline_core::render::STATIC_COPY_ACK)));
    }

    #[tokio::test]
    async fn test_welcome_submit_runs_turn() {
        let (mut app, mut rx) = App::scripted(
            ScriptedTransport::new().streamed(&["data: {\"delta\":\"4\"}\n"]),
        );
        app.pump(&mut rx);
        assert_eq!(app.view_mode, ViewMode::Welcome);

        type_text(&mut app, "2+2?");
        app.submit_or_stop();
        app.pump(&mut rx);
        assert_eq!(app.view_mode, ViewMode::Active);
        assert_eq!(app.submit, SubmitState::Stop);
        assert!(app.welcome_input.text.is_empty());
        assert_eq!(app.bubbles[1].body, BubbleBody::Thinking);

        app.settle(&mut rx).await;
        assert!(!app.is_streaming());
        assert_eq!(app.submit, SubmitState::Send);
        assert_eq!(app.session.transcript().len(), 2);
        let BubbleBody::Markup(reply) = &app.bubbles[1].body else {
            panic!("expected rendered reply, got {:?}", app.bubbles[1].body);
        };
        assert_eq!(reply.plain_text(), "4");
    }

    #[tokio::test]
    async fn test_submit_control_stops_turn() {
        let (mut app, mut rx) = App::scripted(ScriptedTransport::new().hanging(&[]));
        type_text(&mut app, "tell me a story");
        app.submit_or_stop();
        app.pump(&mut rx);
        assert!(app.is_streaming());

        app.submit_or_stop();
        app.pump(&mut rx);
        assert!(!app.is_streaming());
        assert_eq!(app.submit, SubmitState::Send);

        // The cancelled turn still reports; it leaves the transcript alone.
        app.settle(&mut rx).await;
        assert_eq!(app.session.transcript().len(), 1);
        assert_eq!(
            app.bubbles[1].body,
            BubbleBody::Notice(chatline_core::Notice::Stopped)
        );
    }

    #[tokio::test]
    async fn test_failed_request_shows_notice() {
        let (mut app, mut rx) = App::scripted(ScriptedTransport::new().status(500));
        type_text(&mut app, "hi");
        app.submit_or_stop();
        app.settle(&mut rx).await;

        assert_eq!(
            app.bubbles[1].body,
            BubbleBody::Notice(chatline_core::Notice::RequestFailed)
        );
        assert_eq!(app.session.transcript().len(), 1);
        assert_eq!(app.submit, SubmitState::Send);
    }

    #[tokio::test]
    async fn test_health_check_uses_transport() {
        let (app, mut rx) = App::scripted(ScriptedTransport::new().down());
        app.check_health();
        loop {
            match rx.recv().await {
                Some(AppEvent::Health(healthy)) => {
                    assert!(!healthy);
                    break;
                }
                Some(_) => continue,
                None => panic!("channel closed before the health result"),
            }
        }
    }

    #[tokio::test]
    async fn test_empty_submit_is_ignored() {
        let (mut app, mut rx) = App::scripted(ScriptedTransport::new());
        app.active_input_mut().insert(' ');
        app.submit_or_stop();
        app.pump(&mut rx);
        assert!(app.bubbles.is_empty());
        assert!(!app.is_streaming());
    }

    #[tokio::test]
    async fn test_toggle_rerenders_replies() {
        let (mut app, _rx) = App::scripted(ScriptedTransport::new());
        let markup = app.session.pipeline().render("```rust\nfn f() {}\n```\n");
        app.apply_view_event(ViewEvent::Append {
            id: BubbleId(0),
            role: ChatRole::Assistant,
            body: BubbleBody::Markup(markup),
        });
        let before = app.bubbles[0].body.clone();
        app.toggle_mode();
        assert_ne!(app.bubbles[0].body, before);
        let BubbleBody::Markup(markup) = &app.bubbles[0].body else {
            panic!("expected markup");
        };
        assert_eq!(markup.code_blocks().len(), 1);
    }

    #[test]
    fn test_render_static_attaches_buttons() {
        let markup = render_static(&RenderPipeline::new(), "```sh\nls\n```\n");
        assert_eq!(
            markup.code_blocks()[0].copy.as_ref().map(|c| c.ack()),
            Some(chatline_core::render::STATIC_COPY_ACK)
        );
    }
}

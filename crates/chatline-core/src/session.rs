//! The chat session: transcript, submit state machine and turn execution.
//!
//! A turn is split in two so a front-end can keep handling input while the
//! reply streams: [`ChatSession::begin_turn`] does the synchronous part
//! (transcript, placeholder bubble, Idle -> Streaming) and hands back a
//! [`Turn`], whose [`Turn::run`] future talks to the network and updates the
//! bubble. Its [`TurnReport`] goes back through [`ChatSession::finish_turn`].
//! Cancelling moves the session to Idle at once; the report of a cancelled
//! turn is then stale and ignored.

use std::sync::Arc;

use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{Config, DEFAULT_MAX_TOKENS};
use crate::error::{Error, Result};
use crate::model::SelectedModel;
use crate::ports::{BubbleBody, BubbleId, ChatView, Notice, SubmitState, ViewMode};
use crate::render::RenderPipeline;
use crate::state::{ChatMessage, ChatRole, Transcript};
use crate::stream::{RecordDecoder, StreamEvent, StreamProtocol};
use crate::transport::{ByteStream, ChatRequest, ChatResponse, ChatTransport};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    pub max_tokens: u32,
    pub protocol: StreamProtocol,
    /// Prefixed onto the first user message of a session.
    pub instructions: Option<String>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            max_tokens: DEFAULT_MAX_TOKENS,
            protocol: StreamProtocol::default(),
            instructions: None,
        }
    }
}

impl SessionOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_tokens: config.max_tokens(),
            protocol: config.stream_protocol(),
            instructions: config.instructions.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TurnId(pub u64);

#[derive(Debug, Clone, Default)]
pub enum TurnState {
    #[default]
    Idle,
    Streaming {
        turn: TurnId,
        cancel: CancellationToken,
    },
}

impl TurnState {
    pub fn is_streaming(&self) -> bool {
        matches!(self, TurnState::Streaming { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnFailure {
    /// The endpoint answered with a non-success status.
    Status(u16),
    /// The request or the body read failed.
    Transport(String),
    /// The stream carried an `error` record.
    Server(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// Full reply text; becomes the assistant message.
    Completed(String),
    /// The reply finished without content.
    Empty,
    Stopped,
    Failed(TurnFailure),
}

#[derive(Debug, Clone)]
pub struct TurnReport {
    pub turn: TurnId,
    pub outcome: TurnOutcome,
}

pub struct ChatSession<V> {
    transcript: Transcript,
    state: TurnState,
    next_turn: u64,
    view: V,
    pipeline: Arc<RenderPipeline>,
    model: SelectedModel,
    options: SessionOptions,
}

impl<V: ChatView + Clone> ChatSession<V> {
    pub fn new(view: V, pipeline: RenderPipeline, model: SelectedModel, options: SessionOptions) -> Self {
        let mut session = Self {
            transcript: Transcript::new(),
            state: TurnState::Idle,
            next_turn: 1,
            view,
            pipeline: Arc::new(pipeline),
            model,
            options,
        };
        session.update_view_mode();
        session.view.set_submit(SubmitState::Send);
        session
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn state(&self) -> &TurnState {
        &self.state
    }

    pub fn is_streaming(&self) -> bool {
        self.state.is_streaming()
    }

    pub fn pipeline(&self) -> &Arc<RenderPipeline> {
        &self.pipeline
    }

    pub fn view(&self) -> &V {
        &self.view
    }

    pub fn view_mode(&self) -> ViewMode {
        ViewMode::for_transcript_len(self.transcript.len())
    }

    /// Show the presentation matching the transcript.
    pub fn update_view_mode(&mut self) {
        let mode = self.view_mode();
        self.view.show_mode(mode);
    }

    /// Record the user's message and move to Streaming. The returned turn
    /// carries the request built from the whole transcript.
    pub fn begin_turn(&mut self, text: &str) -> Result<Turn<V>> {
        if self.state.is_streaming() {
            return Err(Error::TurnInProgress);
        }
        let text = text.trim();
        if text.is_empty() {
            return Err(Error::EmptyMessage);
        }

        let content = match &self.options.instructions {
            Some(instructions) if self.transcript.is_empty() => format!("{instructions}\n\n{text}"),
            _ => text.to_string(),
        };
        self.transcript.push(ChatMessage::user(content));
        self.update_view_mode();

        self.view.append_bubble(ChatRole::User, BubbleBody::Text(text.to_string()));
        let bubble = self.view.append_bubble(ChatRole::Assistant, BubbleBody::Thinking);
        self.view.scroll_to_latest();
        self.view.set_submit(SubmitState::Stop);

        let id = TurnId(self.next_turn);
        self.next_turn += 1;
        let cancel = CancellationToken::new();
        self.state = TurnState::Streaming {
            turn: id,
            cancel: cancel.clone(),
        };

        let request = ChatRequest {
            messages: self.transcript.as_slice().to_vec(),
            model: self.model.current(),
            max_tokens: self.options.max_tokens,
            stream: true,
        };
        info!(
            turn = id.0,
            messages = request.messages.len(),
            model = %request.model,
            "turn started"
        );

        Ok(Turn {
            id,
            view: self.view.clone(),
            bubble,
            request,
            cancel,
            pipeline: Arc::clone(&self.pipeline),
            protocol: self.options.protocol,
        })
    }

    /// Cancel the in-flight turn, if any, and return to Idle without waiting
    /// for the request to wind down.
    pub fn cancel(&mut self) -> bool {
        let TurnState::Streaming { turn, cancel } = std::mem::take(&mut self.state) else {
            return false;
        };
        cancel.cancel();
        info!(turn = turn.0, "turn cancelled");
        self.view.set_submit(SubmitState::Send);
        true
    }

    /// Apply the result of [`Turn::run`]. Returns `false` for a report of a
    /// turn that is no longer live.
    pub fn finish_turn(&mut self, report: TurnReport) -> bool {
        match &self.state {
            TurnState::Streaming { turn, .. } if *turn == report.turn => {}
            _ => {
                debug!(turn = report.turn.0, "ignoring report of a finished turn");
                return false;
            }
        }

        self.state = TurnState::Idle;
        if let TurnOutcome::Completed(content) = report.outcome {
            self.transcript.push(ChatMessage::assistant(content));
        }
        self.view.set_submit(SubmitState::Send);
        true
    }

    /// Run a whole turn in place.
    pub async fn send_turn(&mut self, text: &str, transport: &dyn ChatTransport) -> Result<TurnOutcome> {
        let turn = self.begin_turn(text)?;
        let report = turn.run(transport).await;
        let outcome = report.outcome.clone();
        self.finish_turn(report);
        Ok(outcome)
    }

    /// Drop the conversation and go back to the welcome presentation.
    pub fn reset(&mut self) {
        self.cancel();
        self.transcript.clear();
        self.view.clear();
        self.update_view_mode();
        info!("session reset");
    }
}

/// One in-flight request and the bubble it fills.
pub struct Turn<V> {
    id: TurnId,
    view: V,
    bubble: BubbleId,
    request: ChatRequest,
    cancel: CancellationToken,
    pipeline: Arc<RenderPipeline>,
    protocol: StreamProtocol,
}

impl<V: ChatView> Turn<V> {
    pub fn id(&self) -> TurnId {
        self.id
    }

    pub fn request(&self) -> &ChatRequest {
        &self.request
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub async fn run(mut self, transport: &dyn ChatTransport) -> TurnReport {
        let outcome = self.drive(transport).await;
        match &outcome {
            TurnOutcome::Completed(content) => {
                info!(turn = self.id.0, chars = content.len(), "turn completed")
            }
            TurnOutcome::Failed(failure) => warn!(turn = self.id.0, ?failure, "turn failed"),
            other => info!(turn = self.id.0, outcome = ?other, "turn finished"),
        }
        TurnReport {
            turn: self.id,
            outcome,
        }
    }

    async fn drive(&mut self, transport: &dyn ChatTransport) -> TurnOutcome {
        let cancel = self.cancel.clone();
        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return self.stopped(""),
            response = transport.send(&self.request) => response,
        };

        match response {
            Ok(ChatResponse::Buffered(reply)) => {
                if self.cancel.is_cancelled() {
                    return self.stopped("");
                }
                self.finish(reply.response)
            }
            Ok(ChatResponse::Streamed(body)) => self.consume(body).await,
            Err(e) => self.failed(e),
        }
    }

    async fn consume(&mut self, mut body: ByteStream) -> TurnOutcome {
        let cancel = self.cancel.clone();
        let mut decoder = RecordDecoder::new(self.protocol);
        let mut content = String::new();

        loop {
            let chunk = tokio::select! {
                biased;
                _ = cancel.cancelled() => return self.stopped(&content),
                chunk = body.next() => chunk,
            };
            let events = match chunk {
                Some(Ok(bytes)) => decoder.push(&bytes),
                Some(Err(e)) => return self.failed(e),
                None => break,
            };
            if let Some(outcome) = self.apply(events, &mut content) {
                return outcome;
            }
        }

        if let Some(outcome) = self.apply(decoder.finish(), &mut content) {
            return outcome;
        }
        self.finish(content)
    }

    /// Fold decoded events into `content` and re-render. An error record ends
    /// the turn.
    fn apply(&mut self, events: Vec<StreamEvent>, content: &mut String) -> Option<TurnOutcome> {
        let mut changed = false;
        for event in events {
            match event {
                StreamEvent::Delta(delta) => {
                    content.push_str(&delta);
                    changed = true;
                }
                StreamEvent::Error(message) => {
                    self.show(BubbleBody::Notice(Notice::ServerError(message.clone())));
                    return Some(TurnOutcome::Failed(TurnFailure::Server(message)));
                }
            }
        }
        if changed && !content.is_empty() {
            let markup = self.pipeline.render(content);
            self.show(BubbleBody::Markup(markup));
        }
        None
    }

    fn finish(&mut self, content: String) -> TurnOutcome {
        if content.trim().is_empty() {
            self.show(BubbleBody::Notice(Notice::NoResponse));
            return TurnOutcome::Empty;
        }
        let markup = self.pipeline.render(&content);
        self.show(BubbleBody::Markup(markup));
        TurnOutcome::Completed(content)
    }

    fn stopped(&mut self, partial: &str) -> TurnOutcome {
        if partial.trim().is_empty() {
            self.show(BubbleBody::Notice(Notice::Stopped));
        } else {
            let markup = self.pipeline.render(partial);
            self.show(BubbleBody::Stopped(markup));
        }
        TurnOutcome::Stopped
    }

    fn failed(&mut self, error: Error) -> TurnOutcome {
        self.show(BubbleBody::Notice(Notice::RequestFailed));
        match error {
            Error::Status(code) => TurnOutcome::Failed(TurnFailure::Status(code)),
            other => TurnOutcome::Failed(TurnFailure::Transport(other.to_string())),
        }
    }

    fn show(&mut self, body: BubbleBody) {
        self.view.update_bubble(self.bubble, body);
        self.view.scroll_to_latest();
    }
}

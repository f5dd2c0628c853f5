//! In-memory ports for tests. Front-end crates get them through the
//! `testing` feature.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::{self, StreamExt};

use crate::error::{Error, Result};
use crate::ports::{BubbleBody, BubbleId, ChatView, Clipboard, SubmitState, ViewMode};
use crate::state::ChatRole;
use crate::transport::{BufferedReply, ChatRequest, ChatResponse, ChatTransport};

enum Reply {
    Buffered(String),
    Chunks(Vec<Vec<u8>>),
    /// Chunks, then a body that never ends.
    Hang(Vec<Vec<u8>>),
    /// Chunks, then a read error.
    Broken(Vec<Vec<u8>>),
    Status(u16),
}

/// Transport that answers each request with the next scripted reply.
#[derive(Default)]
pub struct ScriptedTransport {
    replies: Mutex<VecDeque<Reply>>,
    requests: Mutex<Vec<ChatRequest>>,
    down: bool,
}

fn chunks(parts: &[&str]) -> Vec<Vec<u8>> {
    parts.iter().map(|p| p.as_bytes().to_vec()).collect()
}

fn body(parts: Vec<Vec<u8>>) -> impl futures_util::Stream<Item = Result<Bytes>> + Send {
    stream::iter(parts.into_iter().map(|p| Ok(Bytes::from(p))))
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(self, reply: Reply) -> Self {
        self.replies.lock().unwrap().push_back(reply);
        self
    }

    pub fn buffered(self, response: &str) -> Self {
        self.push(Reply::Buffered(response.to_string()))
    }

    pub fn streamed(self, parts: &[&str]) -> Self {
        self.push(Reply::Chunks(chunks(parts)))
    }

    pub fn hanging(self, parts: &[&str]) -> Self {
        self.push(Reply::Hang(chunks(parts)))
    }

    pub fn broken(self, parts: &[&str]) -> Self {
        self.push(Reply::Broken(chunks(parts)))
    }

    pub fn status(self, code: u16) -> Self {
        self.push(Reply::Status(code))
    }

    /// Report the backend as unhealthy.
    pub fn down(mut self) -> Self {
        self.down = true;
        self
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatTransport for ScriptedTransport {
    async fn send(&self, request: &ChatRequest) -> Result<ChatResponse> {
        self.requests.lock().unwrap().push(request.clone());
        let reply = self.replies.lock().unwrap().pop_front();
        match reply {
            Some(Reply::Buffered(response)) => Ok(ChatResponse::Buffered(BufferedReply {
                response,
                model: Some(request.model.clone()),
            })),
            Some(Reply::Chunks(parts)) => Ok(ChatResponse::Streamed(Box::pin(body(parts)))),
            Some(Reply::Hang(parts)) => Ok(ChatResponse::Streamed(Box::pin(
                body(parts).chain(stream::pending()),
            ))),
            Some(Reply::Broken(parts)) => {
                let failure = stream::once(async {
                    Err::<Bytes, Error>(Error::Io(std::io::Error::other("connection reset")))
                });
                Ok(ChatResponse::Streamed(Box::pin(body(parts).chain(failure))))
            }
            Some(Reply::Status(code)) => Err(Error::Status(code)),
            None => Err(Error::Status(503)),
        }
    }

    async fn health(&self) -> Result<bool> {
        Ok(!self.down)
    }
}

#[derive(Default)]
struct Recorded {
    bubbles: Vec<(BubbleId, ChatRole, BubbleBody)>,
    updates: Vec<BubbleBody>,
    next_id: u64,
    mode: Option<ViewMode>,
    submit: Option<SubmitState>,
    scrolls: usize,
}

/// View that records what it was told to show. Clones share one record.
#[derive(Clone, Default)]
pub struct RecordingView {
    inner: Arc<Mutex<Recorded>>,
}

impl RecordingView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bubbles(&self) -> Vec<(ChatRole, BubbleBody)> {
        let inner = self.inner.lock().unwrap();
        inner
            .bubbles
            .iter()
            .map(|(_, role, body)| (*role, body.clone()))
            .collect()
    }

    pub fn last_body(&self) -> Option<BubbleBody> {
        let inner = self.inner.lock().unwrap();
        inner.bubbles.last().map(|(_, _, body)| body.clone())
    }

    /// Bodies passed to `update_bubble`, in order.
    pub fn updates(&self) -> Vec<BubbleBody> {
        self.inner.lock().unwrap().updates.clone()
    }

    pub fn mode(&self) -> Option<ViewMode> {
        self.inner.lock().unwrap().mode
    }

    pub fn submit(&self) -> Option<SubmitState> {
        self.inner.lock().unwrap().submit
    }

    pub fn scrolls(&self) -> usize {
        self.inner.lock().unwrap().scrolls
    }
}

impl ChatView for RecordingView {
    fn show_mode(&mut self, mode: ViewMode) {
        self.inner.lock().unwrap().mode = Some(mode);
    }

    fn append_bubble(&mut self, role: ChatRole, body: BubbleBody) -> BubbleId {
        let mut inner = self.inner.lock().unwrap();
        let id = BubbleId(inner.next_id);
        inner.next_id += 1;
        inner.bubbles.push((id, role, body));
        id
    }

    fn update_bubble(&mut self, id: BubbleId, body: BubbleBody) {
        let mut inner = self.inner.lock().unwrap();
        inner.updates.push(body.clone());
        if let Some(entry) = inner.bubbles.iter_mut().find(|(bid, _, _)| *bid == id) {
            entry.2 = body;
        }
    }

    fn set_submit(&mut self, state: SubmitState) {
        self.inner.lock().unwrap().submit = Some(state);
    }

    fn scroll_to_latest(&mut self) {
        self.inner.lock().unwrap().scrolls += 1;
    }

    fn clear(&mut self) {
        self.inner.lock().unwrap().bubbles.clear();
    }
}

#[derive(Default)]
pub struct MemoryClipboard {
    copied: Vec<String>,
    fail: bool,
}

impl MemoryClipboard {
    pub fn failing() -> Self {
        Self {
            copied: Vec::new(),
            fail: true,
        }
    }

    pub fn contents(&self) -> Vec<String> {
        self.copied.clone()
    }
}

impl Clipboard for MemoryClipboard {
    fn write_text(&mut self, text: &str) -> Result<()> {
        if self.fail {
            return Err(Error::Clipboard("clipboard unavailable".to_string()));
        }
        self.copied.push(text.to_string());
        Ok(())
    }
}

//! Per-generation streaming buffers.

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::classifier;

/// Mutable accumulator for one in-flight generation.
///
/// All three buffers are append-only for the lifetime of the stream.
#[derive(Debug)]
pub struct StreamingState {
    message_id: String,
    pub(crate) raw: String,
    pub(crate) visible: String,
    pub(crate) thought: String,
    pub(crate) in_think_tag: bool,
}

impl StreamingState {
    pub fn new(message_id: impl Into<String>) -> Self {
        Self {
            message_id: message_id.into(),
            raw: String::new(),
            visible: String::new(),
            thought: String::new(),
            in_think_tag: false,
        }
    }

    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    /// Every fragment received, markers included.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn visible(&self) -> &str {
        &self.visible
    }

    pub fn thought(&self) -> &str {
        &self.thought
    }

    pub fn in_think_tag(&self) -> bool {
        self.in_think_tag
    }
}

/// What the batched publisher pushes on one tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamSnapshot {
    pub visible: String,
    /// Tail of the thought buffer, `None` while it is empty.
    pub thought: Option<String>,
}

impl StreamSnapshot {
    pub fn is_empty(&self) -> bool {
        self.visible.is_empty() && self.thought.as_deref().map_or(true, str::is_empty)
    }
}

/// Full copies of the buffers taken when the stream ends.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamBuffers {
    pub raw: String,
    pub visible: String,
    pub thought: String,
}

/// Owner-confined streaming state with a synchronized snapshot accessor.
///
/// The orchestrator is the only writer; the publisher only takes snapshots.
#[derive(Debug, Clone)]
pub struct SharedStreamingState {
    inner: Arc<Mutex<StreamingState>>,
}

impl SharedStreamingState {
    pub fn new(message_id: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(StreamingState::new(message_id))),
        }
    }

    /// Route one engine fragment into the buffers.
    pub async fn classify(&self, token: &str) {
        let mut state = self.inner.lock().await;
        classifier::classify(token, &mut state);
    }

    /// Visible text plus the last `display_cap` characters of thought.
    pub async fn snapshot(&self, display_cap: usize) -> StreamSnapshot {
        let state = self.inner.lock().await;
        let thought = if state.thought.is_empty() {
            None
        } else {
            Some(tail_chars(&state.thought, display_cap).to_string())
        };

        StreamSnapshot {
            visible: state.visible.clone(),
            thought,
        }
    }

    pub async fn buffers(&self) -> StreamBuffers {
        let state = self.inner.lock().await;
        StreamBuffers {
            raw: state.raw.clone(),
            visible: state.visible.clone(),
            thought: state.thought.clone(),
        }
    }
}

/// The first `n` characters of `text`.
pub(crate) fn head_chars(text: &str, n: usize) -> &str {
    match text.char_indices().nth(n) {
        Some((at, _)) => &text[..at],
        None => text,
    }
}

/// The last `n` characters of `text`.
pub(crate) fn tail_chars(text: &str, n: usize) -> &str {
    let total = text.chars().count();
    if total <= n {
        return text;
    }
    match text.char_indices().nth(total - n) {
        Some((at, _)) => &text[at..],
        None => "",
    }
}

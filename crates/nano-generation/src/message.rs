//! Chat message shapes exchanged with the persistence layer.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Author of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    User,
    Assistant,
    Tool,
    System,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Role::User => "User",
            Role::Assistant => "Assistant",
            Role::Tool => "Tool",
            Role::System => "System",
        };
        f.write_str(name)
    }
}

/// A fenced code block lifted out of a model answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeBlock {
    pub code: String,
    /// Language tag after the opening fence, `"text"` when absent.
    pub language: String,
}

/// A persisted chat turn, as far as prompt assembly needs it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub text: String,
    #[serde(default)]
    pub code_blocks: Vec<CodeBlock>,
}

impl Message {
    pub fn new(id: impl Into<String>, role: Role, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role,
            text: text.into(),
            code_blocks: Vec::new(),
        }
    }

    pub fn with_code_blocks(mut self, code_blocks: Vec<CodeBlock>) -> Self {
        self.code_blocks = code_blocks;
        self
    }
}

/// A document retrieved from a knowledge pack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RagDoc {
    pub source: String,
    pub content: String,
    pub score: f32,
}

/// Retrieval timings attached to a [`RagResult`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetrievalStats {
    pub retrieved: usize,
    pub elapsed_ms: u64,
}

/// Retrieved context that accompanied the prompt; stored with the answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RagResult {
    pub docs: Vec<RagDoc>,
    pub stats: RetrievalStats,
}

/// A progressive or final write to a streaming message.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageUpdate {
    pub message_id: String,
    pub text: String,
    pub thought: Option<String>,
    pub tool_error: Option<String>,
    pub is_final: bool,
    pub rag_result: Option<RagResult>,
    pub code_blocks: Vec<CodeBlock>,
}

impl MessageUpdate {
    /// An in-progress snapshot pushed by the batched publisher.
    pub fn progress(
        message_id: impl Into<String>,
        text: impl Into<String>,
        thought: Option<String>,
    ) -> Self {
        Self {
            message_id: message_id.into(),
            text: text.into(),
            thought,
            tool_error: None,
            is_final: false,
            rag_result: None,
            code_blocks: Vec::new(),
        }
    }

    /// The terminal write for a generation.
    pub fn finalized(
        message_id: impl Into<String>,
        text: impl Into<String>,
        thought: Option<String>,
        rag_result: Option<RagResult>,
        code_blocks: Vec<CodeBlock>,
    ) -> Self {
        Self {
            message_id: message_id.into(),
            text: text.into(),
            thought,
            tool_error: None,
            is_final: true,
            rag_result,
            code_blocks,
        }
    }

    /// A terminal write that records a tool failure.
    pub fn tool_failure(
        message_id: impl Into<String>,
        text: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            message_id: message_id.into(),
            text: text.into(),
            thought: None,
            tool_error: Some(error.into()),
            is_final: true,
            rag_result: None,
            code_blocks: Vec::new(),
        }
    }
}

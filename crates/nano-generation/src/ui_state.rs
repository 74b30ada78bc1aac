//! Observable UI state for the chat screen.

use tokio::sync::{broadcast, watch};
use tokio::time::Instant;
use tracing::debug;

/// Progress of a single generation, strictly forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DecodingStage {
    PreparingPrompt,
    EncodingInput,
    /// Only entered when the model is not yet resident.
    LoadingModel,
    Decoding,
    Rendering,
}

/// A stage change, keyed by the message being generated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageUpdate {
    pub message_id: String,
    pub stage: DecodingStage,
}

/// What the chat screen should currently show.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatUiState {
    Idle,
    Decoding {
        message_id: String,
        started_at: Instant,
        with_tools: bool,
    },
    Generating {
        message_id: String,
        is_first_token: bool,
    },
    ExecutingTool {
        tool_name: String,
        message_id: String,
    },
    Error {
        message: String,
        cause: Option<String>,
    },
}

const STAGE_CHANNEL_CAPACITY: usize = 32;

/// Single owner of chat UI state, shared by reference with the worker.
pub struct UiStateManager {
    state: watch::Sender<ChatUiState>,
    stage: watch::Sender<Option<StageUpdate>>,
    transitions: broadcast::Sender<StageUpdate>,
}

impl UiStateManager {
    pub fn new() -> Self {
        let (state, _) = watch::channel(ChatUiState::Idle);
        let (stage, _) = watch::channel(None);
        let (transitions, _) = broadcast::channel(STAGE_CHANNEL_CAPACITY);
        Self {
            state,
            stage,
            transitions,
        }
    }

    pub fn current(&self) -> ChatUiState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ChatUiState> {
        self.state.subscribe()
    }

    /// Latest stage, `None` before the first generation.
    pub fn current_stage(&self) -> Option<StageUpdate> {
        self.stage.borrow().clone()
    }

    /// Every stage transition, in order.
    pub fn subscribe_stages(&self) -> broadcast::Receiver<StageUpdate> {
        self.transitions.subscribe()
    }

    /// Begin a new generation at `stage`.
    pub fn set_decoding_stage(&self, message_id: &str, stage: DecodingStage, started_at: Instant) {
        self.state.send_replace(ChatUiState::Decoding {
            message_id: message_id.to_string(),
            started_at,
            with_tools: false,
        });
        self.publish_stage(StageUpdate {
            message_id: message_id.to_string(),
            stage,
        });
    }

    /// Mark the decoding in progress as tool-enabled.
    pub fn set_decoding_tool(&self) {
        self.state.send_modify(|state| {
            if let ChatUiState::Decoding { with_tools, .. } = state {
                *with_tools = true;
            }
        });
    }

    /// Advance the current generation's stage; backwards moves are ignored.
    pub fn update_decoding_stage(&self, stage: DecodingStage) {
        let Some(current) = self.current_stage() else {
            debug!("Stage update {:?} without an active generation", stage);
            return;
        };
        if stage <= current.stage {
            debug!("Ignoring stage regression {:?} -> {:?}", current.stage, stage);
            return;
        }
        self.publish_stage(StageUpdate {
            message_id: current.message_id,
            stage,
        });
    }

    pub fn set_generating(&self, message_id: &str, is_first_token: bool) {
        self.state.send_replace(ChatUiState::Generating {
            message_id: message_id.to_string(),
            is_first_token,
        });
    }

    pub fn set_executing_tool(&self, tool_name: &str, message_id: &str) {
        self.state.send_replace(ChatUiState::ExecutingTool {
            tool_name: tool_name.to_string(),
            message_id: message_id.to_string(),
        });
    }

    pub fn set_error(&self, message: impl Into<String>, cause: Option<&dyn std::error::Error>) {
        self.state.send_replace(ChatUiState::Error {
            message: message.into(),
            cause: cause.map(|e| e.to_string()),
        });
    }

    pub fn set_idle(&self) {
        self.state.send_replace(ChatUiState::Idle);
    }

    pub fn is_executing_tool(&self) -> bool {
        matches!(*self.state.borrow(), ChatUiState::ExecutingTool { .. })
    }

    fn publish_stage(&self, update: StageUpdate) {
        debug!("Stage {:?} for message {}", update.stage, update.message_id);
        self.stage.send_replace(Some(update.clone()));
        // No subscribers is fine.
        let _ = self.transitions.send(update);
    }
}

impl Default for UiStateManager {
    fn default() -> Self {
        Self::new()
    }
}

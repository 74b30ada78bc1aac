//! Test doubles for the worker's collaborators.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use nano_engine::{EngineError, EngineEvent, InferenceEngine, StreamRequest, ToolInvocation};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::chat::ChatStore;
use crate::error::GenerationError;
use crate::message::{MessageUpdate, Role};
use crate::tools::ToolExecutor;

/// Records every write instead of persisting it.
pub(crate) struct RecordingChatStore {
    updates: Mutex<Vec<MessageUpdate>>,
    roles: Mutex<HashMap<String, Role>>,
    titles: Mutex<Vec<bool>>,
    refreshes: AtomicUsize,
    fail_background: bool,
}

impl RecordingChatStore {
    pub(crate) fn new() -> Self {
        Self {
            updates: Mutex::new(Vec::new()),
            roles: Mutex::new(HashMap::new()),
            titles: Mutex::new(Vec::new()),
            refreshes: AtomicUsize::new(0),
            fail_background: false,
        }
    }

    pub(crate) fn failing_background() -> Self {
        Self {
            fail_background: true,
            ..Self::new()
        }
    }

    pub(crate) fn with_role(self, message_id: &str, role: Role) -> Self {
        self.roles.lock().unwrap().insert(message_id.to_string(), role);
        self
    }

    pub(crate) fn updates(&self) -> Vec<MessageUpdate> {
        self.updates.lock().unwrap().clone()
    }

    pub(crate) fn finals(&self) -> Vec<MessageUpdate> {
        self.updates().into_iter().filter(|u| u.is_final).collect()
    }

    pub(crate) fn title_requests(&self) -> Vec<bool> {
        self.titles.lock().unwrap().clone()
    }

    pub(crate) fn refreshes(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChatStore for RecordingChatStore {
    async fn update_streaming_message(&self, update: MessageUpdate) {
        self.updates.lock().unwrap().push(update);
    }

    async fn message_role(&self, message_id: &str) -> Option<Role> {
        self.roles.lock().unwrap().get(message_id).copied()
    }

    fn current_chat_id(&self) -> String {
        "chat-1".to_string()
    }

    async fn generate_title_if_needed(&self, use_ai: bool) -> Result<(), GenerationError> {
        self.titles.lock().unwrap().push(use_ai);
        if self.fail_background {
            return Err(GenerationError::Store("title service down".to_string()));
        }
        Ok(())
    }

    async fn refresh_chat_list(&self) -> Result<(), GenerationError> {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        if self.fail_background {
            return Err(GenerationError::Store("disk unavailable".to_string()));
        }
        Ok(())
    }
}

/// One step of a scripted engine run.
#[derive(Debug, Clone)]
pub(crate) enum Step {
    Token(String),
    Tool(&'static str, &'static str),
    Sleep(Duration),
    Fail(&'static str),
    /// Block until cancelled.
    Hang,
}

/// Replays a fixed script of engine events.
pub(crate) struct ScriptedEngine {
    script: Vec<Step>,
    loaded: bool,
    requests: Mutex<Vec<StreamRequest>>,
    stops: AtomicUsize,
}

impl ScriptedEngine {
    pub(crate) fn new(script: Vec<Step>) -> Self {
        Self {
            script,
            loaded: true,
            requests: Mutex::new(Vec::new()),
            stops: AtomicUsize::new(0),
        }
    }

    pub(crate) fn unloaded(self) -> Self {
        Self {
            loaded: false,
            ..self
        }
    }

    pub(crate) fn requests(&self) -> Vec<StreamRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub(crate) fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl InferenceEngine for ScriptedEngine {
    async fn generate_streaming(
        &self,
        request: StreamRequest,
        events: mpsc::Sender<EngineEvent>,
        cancel: CancellationToken,
    ) -> Result<(), EngineError> {
        self.requests.lock().unwrap().push(request);

        for step in self.script.clone() {
            let event = match step {
                Step::Token(text) => EngineEvent::Token(text),
                Step::Tool(name, arguments) => EngineEvent::ToolCall(ToolInvocation {
                    name: name.to_string(),
                    arguments: arguments.to_string(),
                }),
                Step::Sleep(duration) => {
                    tokio::select! {
                        _ = cancel.cancelled() => return Ok(()),
                        _ = tokio::time::sleep(duration) => continue,
                    }
                }
                Step::Fail(message) => return Err(EngineError::Api(message.to_string())),
                Step::Hang => {
                    cancel.cancelled().await;
                    return Ok(());
                }
            };

            if cancel.is_cancelled() {
                return Ok(());
            }
            events
                .send(event)
                .await
                .map_err(|_| EngineError::ReceiverClosed)?;
        }
        Ok(())
    }

    async fn is_model_loaded(&self) -> bool {
        self.loaded
    }

    fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }

    fn model_name(&self) -> &str {
        "scripted-model"
    }

    fn max_tokens(&self) -> u32 {
        128
    }
}

/// Tool executor returning a fixed result.
pub(crate) struct ScriptedTools {
    result: Result<Value, String>,
    calls: Mutex<Vec<(String, String)>>,
}

impl ScriptedTools {
    pub(crate) fn returning(result: Result<Value, String>) -> Self {
        Self {
            result,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ToolExecutor for ScriptedTools {
    fn tool_schema(&self) -> Option<String> {
        Some(r#"[{"type":"function","function":{"name":"clock"}}]"#.to_string())
    }

    async fn execute(&self, tool_name: &str, arguments: &str) -> Result<Value, GenerationError> {
        self.calls
            .lock()
            .unwrap()
            .push((tool_name.to_string(), arguments.to_string()));
        self.result.clone().map_err(GenerationError::Tool)
    }
}

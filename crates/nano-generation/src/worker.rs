//! The generation orchestrator.
//!
//! One [`GenerationWorker`] lives for the whole application and drives every
//! generation through its stages:
//!
//! ```text
//! PreparingPrompt -> EncodingInput -> [LoadingModel] -> Decoding -> Rendering
//! ```
//!
//! While decoding, engine events are pulled from a bounded channel and
//! classified into the streaming buffers; a [`BatchPublisher`] concurrently
//! pushes snapshots to the chat store. Completion, cancellation and failure
//! all end in exactly one final message write built from whatever the
//! buffers hold; a failed tool call ends the message with a tool error
//! instead.

use std::sync::Arc;

use nano_engine::{EngineEvent, GenerationParams, InferenceEngine, StreamRequest, ToolInvocation};
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tokio_util::task::AbortOnDropHandle;
use tracing::{debug, error, info, warn};

use crate::chat::ChatStore;
use crate::code_blocks::extract_code_blocks;
use crate::config::WorkerConfig;
use crate::error::GenerationError;
use crate::message::{Message, MessageUpdate, RagResult, Role};
use crate::metrics::{DecodeType, DecodingMetrics, MetricsHub};
use crate::prompt::build_full_prompt;
use crate::publisher::BatchPublisher;
use crate::reasoning;
use crate::state::{head_chars, SharedStreamingState};
use crate::tools::{run_tool, ToolCallback, ToolExecutor, ToolOutcome, ToolReport};
use crate::ui_state::{DecodingStage, UiStateManager};

/// Text written over a tool message interrupted by [`GenerationWorker::stop`].
pub const CANCELLED_BY_USER: &str = "Generation cancelled by user";

/// Inputs for one generation.
#[derive(Clone)]
pub struct GenerationRequest {
    pub prompt: String,
    pub tools_enabled: bool,
    pub message_id: String,
    pub is_regeneration: bool,
    pub history: Vec<Message>,
    pub rag_result: Option<RagResult>,
    pub on_tool_execution: Option<ToolCallback>,
}

impl GenerationRequest {
    pub fn new(message_id: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            tools_enabled: false,
            message_id: message_id.into(),
            is_regeneration: false,
            history: Vec::new(),
            rag_result: None,
            on_tool_execution: None,
        }
    }

    pub fn with_tools(mut self, enabled: bool) -> Self {
        self.tools_enabled = enabled;
        self
    }

    pub fn regenerating(mut self, is_regeneration: bool) -> Self {
        self.is_regeneration = is_regeneration;
        self
    }

    pub fn with_history(mut self, history: Vec<Message>) -> Self {
        self.history = history;
        self
    }

    pub fn with_rag_result(mut self, rag_result: RagResult) -> Self {
        self.rag_result = Some(rag_result);
        self
    }

    pub fn on_tool_execution(mut self, callback: ToolCallback) -> Self {
        self.on_tool_execution = Some(callback);
        self
    }

    fn decode_type(&self) -> DecodeType {
        if self.is_regeneration {
            DecodeType::Regenerate
        } else {
            DecodeType::Normal
        }
    }

    fn notify_tool(&self, outcome: ToolOutcome) {
        if let Some(callback) = &self.on_tool_execution {
            callback(outcome);
        }
    }
}

/// How a generation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEnd {
    Completed,
    Cancelled,
    ToolFailed,
    Failed,
}

enum StreamStatus {
    Exhausted,
    ToolFailed,
}

struct ActiveGeneration {
    message_id: String,
    cancel: CancellationToken,
    handle: JoinHandle<StreamEnd>,
}

/// Application-wide orchestrator for streaming generations.
pub struct GenerationWorker {
    engine: Arc<dyn InferenceEngine>,
    chat: Arc<dyn ChatStore>,
    tools: Arc<dyn ToolExecutor>,
    ui: Arc<UiStateManager>,
    metrics: Arc<MetricsHub>,
    config: WorkerConfig,
    current_msg_id: watch::Sender<String>,
    active: Mutex<Option<ActiveGeneration>>,
}

impl GenerationWorker {
    pub fn new(
        engine: Arc<dyn InferenceEngine>,
        chat: Arc<dyn ChatStore>,
        tools: Arc<dyn ToolExecutor>,
        config: WorkerConfig,
    ) -> Self {
        let (current_msg_id, _) = watch::channel(String::new());
        Self {
            engine,
            chat,
            tools,
            ui: Arc::new(UiStateManager::new()),
            metrics: Arc::new(MetricsHub::new()),
            config,
            current_msg_id,
            active: Mutex::new(None),
        }
    }

    pub fn ui(&self) -> &Arc<UiStateManager> {
        &self.ui
    }

    pub fn metrics(&self) -> &Arc<MetricsHub> {
        &self.metrics
    }

    /// Message currently being generated, empty when idle.
    pub fn current_message_id(&self) -> String {
        self.current_msg_id.borrow().clone()
    }

    pub fn watch_current_message_id(&self) -> watch::Receiver<String> {
        self.current_msg_id.subscribe()
    }

    /// Spawn a generation, cancelling and awaiting any active one first.
    pub async fn start(self: &Arc<Self>, request: GenerationRequest) {
        let mut active = self.active.lock().await;

        if let Some(previous) = active.take() {
            info!(
                "Cancelling generation {} before starting {}",
                previous.message_id, request.message_id
            );
            previous.cancel.cancel();
            if let Err(e) = previous.handle.await {
                warn!("Previous generation ended abnormally: {}", e);
            }
        }

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let message_id = request.message_id.clone();
        let worker = Arc::clone(self);
        let handle = tokio::spawn(async move { worker.generate(request, token).await });

        *active = Some(ActiveGeneration {
            message_id,
            cancel,
            handle,
        });
    }

    /// Wait for the generation spawned by [`start`](Self::start) to end.
    pub async fn wait(&self) -> Option<StreamEnd> {
        let active = self.active.lock().await.take()?;
        match active.handle.await {
            Ok(end) => Some(end),
            Err(e) => {
                warn!("Generation {} ended abnormally: {}", active.message_id, e);
                None
            }
        }
    }

    /// Run one generation to completion in the caller's task.
    ///
    /// Callers must not run two generations at once; [`start`](Self::start)
    /// enforces that.
    pub async fn generate(
        &self,
        request: GenerationRequest,
        cancel: CancellationToken,
    ) -> StreamEnd {
        let started_at = Instant::now();
        let message_id = request.message_id.clone();
        info!("Starting generation for message {}", message_id);
        self.current_msg_id.send_replace(message_id.clone());

        self.ui
            .set_decoding_stage(&message_id, DecodingStage::PreparingPrompt, started_at);
        if request.tools_enabled {
            self.ui.set_decoding_tool();
        }

        let state = SharedStreamingState::new(message_id.as_str());
        let mut publisher = None;

        let stream = self.run_stream(&request, &state, &mut publisher, started_at, &cancel);
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            result = stream => Some(result),
        };

        if let Some(publisher) = publisher.take() {
            publisher.stop().await;
        }

        let end = match outcome {
            Some(Ok(StreamStatus::Exhausted)) => {
                let buffers = state.buffers().await;
                let extracted =
                    reasoning::extract(&buffers.raw, &buffers.visible, &buffers.thought);
                debug!("Reasoning extracted via {:?}", extracted.strategy);
                self.finalize_message(&request, extracted.answer, extracted.thought)
                    .await;
                StreamEnd::Completed
            }
            Some(Ok(StreamStatus::ToolFailed)) => StreamEnd::ToolFailed,
            None => {
                info!("Streaming cancelled for message {}", message_id);
                self.finalize_from_buffers(&request, &state).await;
                StreamEnd::Cancelled
            }
            Some(Err(e)) => {
                error!("Streaming failed: {}", e);
                self.ui
                    .set_error("Streaming failed", Some(&e as &dyn std::error::Error));
                self.finalize_from_buffers(&request, &state).await;
                StreamEnd::Failed
            }
        };
        drop(state);

        self.spawn_background(None);
        self.current_msg_id.send_replace(String::new());
        if !self.ui.is_executing_tool() && end != StreamEnd::Failed {
            self.ui.set_idle();
        }

        info!("Generation for message {} ended: {:?}", message_id, end);
        end
    }

    /// Cancel the active generation and halt the engine.
    ///
    /// An interrupted tool message is overwritten with [`CANCELLED_BY_USER`].
    pub async fn stop(&self) {
        let active = self.active.lock().await.take();
        // A freshly spawned task may not have published its id yet.
        let message_id = match &active {
            Some(active) => active.message_id.clone(),
            None => self.current_message_id(),
        };

        if let Some(active) = &active {
            active.cancel.cancel();
        }
        self.engine.stop();

        if let Some(active) = active {
            if let Err(e) = active.handle.await {
                warn!("Stopped generation ended abnormally: {}", e);
            }
        }

        if !message_id.is_empty()
            && self.chat.message_role(&message_id).await == Some(Role::Tool)
        {
            info!("Marking tool message {} as cancelled", message_id);
            self.chat
                .update_streaming_message(MessageUpdate::tool_failure(
                    message_id.as_str(),
                    CANCELLED_BY_USER,
                    CANCELLED_BY_USER,
                ))
                .await;
        }

        self.current_msg_id.send_replace(String::new());
        self.ui.set_idle();
    }

    /// Drop any active generation without finalizing it.
    pub async fn cleanup(&self) {
        if let Some(active) = self.active.lock().await.take() {
            debug!("Discarding generation {}", active.message_id);
            active.cancel.cancel();
            active.handle.abort();
        }
        self.current_msg_id.send_replace(String::new());
    }

    async fn run_stream(
        &self,
        request: &GenerationRequest,
        state: &SharedStreamingState,
        publisher: &mut Option<BatchPublisher>,
        started_at: Instant,
        cancel: &CancellationToken,
    ) -> Result<StreamStatus, GenerationError> {
        self.ui.update_decoding_stage(DecodingStage::EncodingInput);
        tokio::time::sleep(self.config.encode_delay).await;

        let prompt = build_full_prompt(&request.prompt, &request.history);
        let tool_schema = if request.tools_enabled {
            self.tools.tool_schema()
        } else {
            None
        };
        debug!("Tool JSON: {}", tool_schema.as_deref().unwrap_or(""));

        if !self.engine.is_model_loaded().await {
            self.ui.update_decoding_stage(DecodingStage::LoadingModel);
        }

        self.ui.update_decoding_stage(DecodingStage::Decoding);
        *publisher = Some(BatchPublisher::start(
            state.clone(),
            Arc::clone(&self.chat),
            request.message_id.as_str(),
            self.config.batch_interval,
            self.config.max_think_display_chars,
            cancel,
        ));

        let (tx, mut rx) = mpsc::channel(self.config.event_buffer);
        let engine_cancel = cancel.child_token();
        let stream_request = StreamRequest {
            prompt,
            params: GenerationParams {
                max_tokens: self.engine.max_tokens(),
            },
            tool_schema,
        };
        let engine = Arc::clone(&self.engine);
        let token = engine_cancel.clone();
        let producer = AbortOnDropHandle::new(tokio::spawn(async move {
            engine.generate_streaming(stream_request, tx, token).await
        }));

        let mut awaiting_first_token = true;
        while let Some(event) = rx.recv().await {
            match event {
                EngineEvent::Token(token) => {
                    if awaiting_first_token {
                        awaiting_first_token = false;
                        self.on_first_token(request, started_at);
                    }
                    state.classify(&token).await;
                }
                EngineEvent::ToolCall(invocation) => {
                    if let Err(message) = self.handle_tool_call(request, &invocation).await {
                        engine_cancel.cancel();
                        if let Some(publisher) = publisher.take() {
                            publisher.stop().await;
                        }
                        self.chat
                            .update_streaming_message(MessageUpdate::tool_failure(
                                request.message_id.as_str(),
                                "",
                                message,
                            ))
                            .await;
                        request.notify_tool(ToolOutcome::Error);
                        return Ok(StreamStatus::ToolFailed);
                    }
                }
            }
        }

        producer.await??;
        Ok(StreamStatus::Exhausted)
    }

    /// Run a tool while narrative consumption is suspended.
    async fn handle_tool_call(
        &self,
        request: &GenerationRequest,
        invocation: &ToolInvocation,
    ) -> Result<(), String> {
        info!("Model called tool '{}'", invocation.name);

        match run_tool(self.tools.as_ref(), invocation).await {
            ToolReport::Succeeded => {
                self.ui
                    .set_executing_tool(&invocation.name, &request.message_id);
                debug!("Tool executed successfully");
                request.notify_tool(ToolOutcome::Success);
                Ok(())
            }
            ToolReport::Failed(message) => Err(message),
        }
    }

    fn on_first_token(&self, request: &GenerationRequest, started_at: Instant) {
        let metrics = DecodingMetrics::new(
            request.decode_type(),
            self.chat.current_chat_id(),
            self.engine.model_name(),
            started_at,
            Instant::now(),
        );
        self.metrics.emit(metrics);
        self.ui.set_generating(&request.message_id, true);
    }

    async fn finalize_from_buffers(
        &self,
        request: &GenerationRequest,
        state: &SharedStreamingState,
    ) {
        let buffers = state.buffers().await;
        let thought = (!buffers.thought.trim().is_empty()).then_some(buffers.thought);
        self.finalize_message(request, buffers.visible, thought).await;
    }

    async fn finalize_message(
        &self,
        request: &GenerationRequest,
        text: String,
        thought: Option<String>,
    ) {
        self.ui.update_decoding_stage(DecodingStage::Rendering);
        tokio::time::sleep(self.config.render_delay).await;

        let thought =
            thought.map(|t| head_chars(&t, self.config.max_thought_save_chars).to_string());
        let code_blocks = extract_code_blocks(&text);
        let use_ai_title = thought.is_none();

        self.chat
            .update_streaming_message(MessageUpdate::finalized(
                request.message_id.as_str(),
                text,
                thought,
                request.rag_result.clone(),
                code_blocks,
            ))
            .await;

        self.spawn_background(Some(use_ai_title));
    }

    /// Fire-and-forget title generation and chat-list refresh.
    fn spawn_background(&self, title_with_ai: Option<bool>) {
        let chat = Arc::clone(&self.chat);
        tokio::spawn(async move {
            if let Some(use_ai) = title_with_ai {
                if let Err(e) = chat.generate_title_if_needed(use_ai).await {
                    warn!("Title generation failed: {}", e);
                }
            }
            if let Err(e) = chat.refresh_chat_list().await {
                warn!("Error refreshing chat list: {}", e);
            }
        });
    }
}

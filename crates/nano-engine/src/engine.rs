//! The contract between the generation pipeline and a model runtime.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::EngineError;
use crate::DEFAULT_MAX_TOKENS;

/// Sampling limits for one generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenerationParams {
    /// Maximum number of tokens the engine may produce.
    pub max_tokens: u32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }
}

/// Everything the engine needs to start streaming.
#[derive(Debug, Clone)]
pub struct StreamRequest {
    /// Fully assembled prompt text.
    pub prompt: String,
    pub params: GenerationParams,
    /// Tool definitions as JSON, `None` when tool calling is disabled.
    pub tool_schema: Option<String>,
}

/// A tool the model asked to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolInvocation {
    pub name: String,
    /// Raw JSON arguments exactly as the model produced them.
    pub arguments: String,
}

/// One unit of engine output, delivered in production order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// An arbitrary-length text fragment.
    Token(String),
    /// The model requested a tool invocation mid-stream.
    ToolCall(ToolInvocation),
}

/// A model runtime that produces a token stream for a prompt.
///
/// Implementations must deliver events in order and must wait on the
/// channel when it is full, so a consumer that stops reading (for example
/// while a tool runs) also stops generation.
#[async_trait]
pub trait InferenceEngine: Send + Sync {
    /// Run one streaming generation.
    ///
    /// Returns `Ok(())` once the stream is exhausted or `cancel` fires.
    async fn generate_streaming(
        &self,
        request: StreamRequest,
        events: mpsc::Sender<EngineEvent>,
        cancel: CancellationToken,
    ) -> Result<(), EngineError>;

    /// Whether the model is resident and ready to decode.
    async fn is_model_loaded(&self) -> bool;

    /// Halt whatever generation is currently running engine-side.
    fn stop(&self);

    /// Display name of the active model.
    fn model_name(&self) -> &str;

    /// Token budget configured for the active model.
    fn max_tokens(&self) -> u32;
}

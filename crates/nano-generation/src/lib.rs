//! # Nano Generation
//!
//! The streaming text-generation core of the Nano assistant.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌─────────────────┐     ┌─────────────────┐
//! │ InferenceEngine │ --> │   Classifier    │ --> │ StreamingState  │
//! │  (token events) │     │ (<think> tags)  │     │ visible/thought │
//! └─────────────────┘     └─────────────────┘     └────────┬────────┘
//!                                                          │
//!                         ┌─────────────────┐     ┌────────┴────────┐
//!                         │ Reasoning       │     │ BatchPublisher  │
//!                         │ extractor       │     │ (every 300 ms)  │
//!                         └────────┬────────┘     └────────┬────────┘
//!                                  │                       │
//!                                  └──────> ChatStore <────┘
//! ```
//!
//! [`GenerationWorker`] drives the stages, routes tool calls, emits
//! first-token metrics and guarantees a single final write per message
//! whether the stream completes, is cancelled or fails.
//!
//! ## Usage
//!
//! ```ignore
//! use nano_generation::{GenerationRequest, GenerationWorker, NoTools, WorkerConfig};
//!
//! let config = WorkerConfig::from_env();
//! let worker = Arc::new(GenerationWorker::new(engine, chat, Arc::new(NoTools), config));
//! worker.start(GenerationRequest::new("msg-1", "Explain ownership")).await;
//! let end = worker.wait().await;
//! ```

mod chat;
pub mod classifier;
mod code_blocks;
mod config;
mod error;
mod message;
mod metrics;
mod prompt;
mod publisher;
pub mod reasoning;
mod state;
mod tools;
mod ui_state;
mod worker;

#[cfg(test)]
mod testing;

pub use chat::ChatStore;
pub use code_blocks::extract_code_blocks;
pub use config::{WorkerConfig, WorkerConfigBuilder};
pub use error::GenerationError;
pub use message::{CodeBlock, Message, MessageUpdate, RagDoc, RagResult, RetrievalStats, Role};
pub use metrics::{DecodeType, DecodingMetrics, MetricsHub};
pub use prompt::build_full_prompt;
pub use publisher::BatchPublisher;
pub use reasoning::{Reasoning, Strategy};
pub use state::{SharedStreamingState, StreamBuffers, StreamSnapshot, StreamingState};
pub use tools::{NoTools, ToolCallback, ToolExecutor, ToolOutcome};
pub use ui_state::{ChatUiState, DecodingStage, StageUpdate, UiStateManager};
pub use worker::{GenerationRequest, GenerationWorker, StreamEnd, CANCELLED_BY_USER};

// Re-export engine types for convenience
pub use nano_engine::{
    EngineError, EngineEvent, GenerationParams, InferenceEngine, LlamaCppClient, StreamRequest,
    ToolInvocation, DEFAULT_MAX_TOKENS, DEFAULT_MODEL_NAME, DEFAULT_PORT,
};

//! Error types for the generation pipeline.

use nano_engine::EngineError;
use thiserror::Error;

/// Errors surfaced by a generation or its collaborators.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),
    #[error("tool error: {0}")]
    Tool(String),
    #[error("chat store error: {0}")]
    Store(String),
    #[error("generation task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

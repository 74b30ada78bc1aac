//! Inference engine interface for Nano.
//!
//! The generation pipeline treats the model runtime as a black box that
//! turns a prompt (plus an optional tool schema) into a stream of
//! [`EngineEvent`]s. This crate defines that contract and ships a client
//! for llama-server's OpenAI-compatible streaming API.

mod client;
mod engine;
mod error;
mod sse;

pub use client::LlamaCppClient;
pub use engine::{EngineEvent, GenerationParams, InferenceEngine, StreamRequest, ToolInvocation};
pub use error::EngineError;

/// Default port for the local llama-server instance.
pub const DEFAULT_PORT: u16 = 11435;

/// Default model name reported in decoding metrics.
pub const DEFAULT_MODEL_NAME: &str = "nano-chat-3b";

/// Default generation budget when the model does not specify one.
pub const DEFAULT_MAX_TOKENS: u32 = 2048;

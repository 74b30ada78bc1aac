//! Error types for inference engine operations.

use thiserror::Error;

/// Errors that can occur while talking to the inference engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Server returned an error response.
    #[error("API error: {0}")]
    Api(String),

    /// Server is not running or not reachable.
    #[error("Server not running at {0}")]
    ServerNotRunning(String),

    /// The tool schema handed to the engine is not a JSON array or object.
    #[error("Invalid tool schema: {0}")]
    InvalidToolSchema(String),

    /// The server reported an error inside the event stream.
    #[error("Stream error: {0}")]
    Stream(String),

    /// The consumer of the event channel went away.
    #[error("Event receiver dropped")]
    ReceiverClosed,
}

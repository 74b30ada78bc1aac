//! Tool-calling collaborator.

use std::sync::Arc;

use async_trait::async_trait;
use nano_engine::ToolInvocation;
use serde_json::Value;
use tracing::{debug, error};

use crate::error::GenerationError;

/// Result reported to the caller's tool callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolOutcome {
    Success,
    Error,
}

/// Notified once per tool invocation.
pub type ToolCallback = Arc<dyn Fn(ToolOutcome) + Send + Sync>;

/// Runs tools the model asks for.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// JSON definition of the currently selected tool(s).
    fn tool_schema(&self) -> Option<String>;

    /// Execute a tool. A JSON result carrying an `"error"` key is a failure.
    async fn execute(&self, tool_name: &str, arguments: &str) -> Result<Value, GenerationError>;
}

/// Executor for deployments without tools.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoTools;

#[async_trait]
impl ToolExecutor for NoTools {
    fn tool_schema(&self) -> Option<String> {
        None
    }

    async fn execute(&self, tool_name: &str, _arguments: &str) -> Result<Value, GenerationError> {
        Err(GenerationError::Tool(format!("unknown tool '{}'", tool_name)))
    }
}

/// How a single tool run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ToolReport {
    Succeeded,
    Failed(String),
}

pub(crate) async fn run_tool(
    executor: &dyn ToolExecutor,
    invocation: &ToolInvocation,
) -> ToolReport {
    debug!(
        "Executing tool '{}' with args {}",
        invocation.name, invocation.arguments
    );

    match executor.execute(&invocation.name, &invocation.arguments).await {
        Ok(result) => match result.get("error") {
            Some(Value::String(message)) => {
                error!("Tool execution error: {}", message);
                ToolReport::Failed(message.clone())
            }
            Some(other) => {
                error!("Tool execution error: {}", other);
                ToolReport::Failed(other.to_string())
            }
            None => ToolReport::Succeeded,
        },
        Err(GenerationError::Tool(message)) => {
            error!("Tool execution failed: {}", message);
            ToolReport::Failed(message)
        }
        Err(e) => {
            error!("Tool execution failed: {}", e);
            ToolReport::Failed(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Fixed(Result<Value, String>);

    #[async_trait]
    impl ToolExecutor for Fixed {
        fn tool_schema(&self) -> Option<String> {
            Some("[]".to_string())
        }

        async fn execute(&self, _: &str, _: &str) -> Result<Value, GenerationError> {
            self.0.clone().map_err(GenerationError::Tool)
        }
    }

    fn call(name: &str) -> ToolInvocation {
        ToolInvocation {
            name: name.to_string(),
            arguments: "{}".to_string(),
        }
    }

    #[tokio::test]
    async fn test_successful_result() {
        let report = run_tool(&Fixed(Ok(json!({"result": 3}))), &call("add")).await;
        assert_eq!(report, ToolReport::Succeeded);
    }

    #[tokio::test]
    async fn test_error_key_is_failure() {
        let report = run_tool(&Fixed(Ok(json!({"error": "rate limited"}))), &call("web")).await;
        assert_eq!(report, ToolReport::Failed("rate limited".to_string()));
    }

    #[tokio::test]
    async fn test_executor_error_is_failure() {
        let report = run_tool(&Fixed(Err("boom".to_string())), &call("web")).await;
        assert_eq!(report, ToolReport::Failed("boom".to_string()));

        let report = run_tool(&NoTools, &call("web")).await;
        assert_eq!(report, ToolReport::Failed("unknown tool 'web'".to_string()));
    }
}

//! HTTP client for llama-server's OpenAI-compatible streaming API.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::engine::{EngineEvent, InferenceEngine, StreamRequest, ToolInvocation};
use crate::error::EngineError;
use crate::sse::{SseDecoder, SseFrame};
use crate::{DEFAULT_MAX_TOKENS, DEFAULT_MODEL_NAME, DEFAULT_PORT};

/// Client for communicating with llama-server.
pub struct LlamaCppClient {
    client: reqwest::Client,
    base_url: String,
    model_name: String,
    max_tokens: u32,
    /// Stop signal of the request currently streaming, if any.
    active: Mutex<Option<CancellationToken>>,
}

/// OpenAI-compatible streaming chat completion request.
#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    stream: bool,
    /// Keep `<think>` spans inline in `content` instead of a side channel.
    reasoning_format: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<serde_json::Value>>,
}

/// Chat message in OpenAI format.
#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChunkResponse {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    /// Set when the server aborts mid-stream.
    error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: Delta,
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Delta {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ToolCallDelta>,
}

#[derive(Debug, Deserialize)]
struct ToolCallDelta {
    #[serde(default)]
    index: usize,
    function: Option<FunctionDelta>,
}

#[derive(Debug, Deserialize)]
struct FunctionDelta {
    name: Option<String>,
    arguments: Option<String>,
}

/// Tool call fragments collected until the model finishes the call.
#[derive(Debug, Default)]
struct PendingToolCalls {
    calls: Vec<ToolInvocation>,
}

impl PendingToolCalls {
    fn absorb(&mut self, delta: ToolCallDelta) {
        while self.calls.len() <= delta.index {
            self.calls.push(ToolInvocation {
                name: String::new(),
                arguments: String::new(),
            });
        }
        let call = &mut self.calls[delta.index];
        if let Some(function) = delta.function {
            if let Some(name) = function.name {
                call.name.push_str(&name);
            }
            if let Some(arguments) = function.arguments {
                call.arguments.push_str(&arguments);
            }
        }
    }

    fn drain(&mut self) -> Vec<ToolInvocation> {
        std::mem::take(&mut self.calls)
            .into_iter()
            .filter(|call| !call.name.is_empty())
            .collect()
    }
}

impl LlamaCppClient {
    /// Create a new client with default URL (localhost:11435).
    pub fn new() -> Self {
        Self::with_url(format!("http://127.0.0.1:{}", DEFAULT_PORT))
    }

    /// Create a new client with a custom URL.
    pub fn with_url(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            model_name: DEFAULT_MODEL_NAME.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            active: Mutex::new(None),
        }
    }

    /// Create a new client with a custom port on localhost.
    pub fn with_port(port: u16) -> Self {
        Self::with_url(format!("http://127.0.0.1:{}", port))
    }

    /// Set the model name reported to callers.
    pub fn with_model_name(mut self, name: impl Into<String>) -> Self {
        self.model_name = name.into();
        self
    }

    /// Set the per-generation token budget.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Get the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Check if the server is running and the model is loaded.
    pub async fn check_health(&self) -> Result<(), EngineError> {
        let url = format!("{}/health", self.base_url);

        let response = self
            .client
            .get(&url)
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() || e.is_timeout() {
                    EngineError::ServerNotRunning(self.base_url.clone())
                } else {
                    EngineError::Http(e)
                }
            })?;

        // llama-server answers 503 while the model is still loading.
        if response.status().is_success() {
            Ok(())
        } else {
            Err(EngineError::ServerNotRunning(self.base_url.clone()))
        }
    }

    fn build_request(&self, request: &StreamRequest) -> Result<ChatCompletionRequest, EngineError> {
        let tools = match request.tool_schema.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(schema) => Some(parse_tool_schema(schema)?),
        };

        Ok(ChatCompletionRequest {
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: request.prompt.clone(),
            }],
            max_tokens: request.params.max_tokens,
            stream: true,
            reasoning_format: "none",
            tools,
        })
    }

    fn register_active(&self) -> CancellationToken {
        let token = CancellationToken::new();
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = active.replace(token.clone()) {
            previous.cancel();
        }
        token
    }

    fn clear_active(&self) {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    async fn forward_frame(
        &self,
        data: &str,
        pending: &mut PendingToolCalls,
        events: &mpsc::Sender<EngineEvent>,
    ) -> Result<(), EngineError> {
        let chunk: ChunkResponse = serde_json::from_str(data)?;
        if let Some(error) = chunk.error {
            let message = error
                .get("message")
                .and_then(|m| m.as_str())
                .map_or_else(|| error.to_string(), str::to_string);
            return Err(EngineError::Stream(message));
        }

        for choice in chunk.choices {
            if let Some(content) = choice.delta.content {
                if !content.is_empty() {
                    events
                        .send(EngineEvent::Token(content))
                        .await
                        .map_err(|_| EngineError::ReceiverClosed)?;
                }
            }

            for delta in choice.delta.tool_calls {
                pending.absorb(delta);
            }

            if choice.finish_reason.as_deref() == Some("tool_calls") {
                flush_tool_calls(pending, events).await?;
            }
        }
        Ok(())
    }

    async fn stream_body(
        &self,
        response: reqwest::Response,
        events: &mpsc::Sender<EngineEvent>,
        cancel: &CancellationToken,
        stop: &CancellationToken,
    ) -> Result<(), EngineError> {
        let mut body = response.bytes_stream();
        let mut decoder = SseDecoder::new();
        let mut pending = PendingToolCalls::default();

        loop {
            let chunk = tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Stream cancelled by caller");
                    return Ok(());
                }
                _ = stop.cancelled() => {
                    debug!("Stream halted by stop request");
                    return Ok(());
                }
                chunk = body.next() => chunk,
            };

            let Some(chunk) = chunk else {
                break;
            };
            let chunk = chunk?;

            for frame in decoder.push(&chunk) {
                match frame {
                    SseFrame::Data(data) => self.forward_frame(&data, &mut pending, events).await?,
                    SseFrame::Done => {
                        flush_tool_calls(&mut pending, events).await?;
                        return Ok(());
                    }
                }
            }
        }

        if let Some(SseFrame::Data(data)) = decoder.finish() {
            self.forward_frame(&data, &mut pending, events).await?;
        }
        flush_tool_calls(&mut pending, events).await
    }

    async fn run_request(
        &self,
        url: &str,
        body: &ChatCompletionRequest,
        events: &mpsc::Sender<EngineEvent>,
        cancel: &CancellationToken,
        stop: &CancellationToken,
    ) -> Result<(), EngineError> {
        let send = self.client.post(url).json(body).send();
        let response = tokio::select! {
            _ = cancel.cancelled() => {
                debug!("Request cancelled before the server answered");
                return Ok(());
            }
            _ = stop.cancelled() => {
                debug!("Request halted before the server answered");
                return Ok(());
            }
            response = send => response.map_err(|e| {
                if e.is_connect() {
                    EngineError::ServerNotRunning(self.base_url.clone())
                } else {
                    EngineError::Http(e)
                }
            })?,
        };

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(EngineError::Api(format!("{}: {}", status, text)));
        }

        self.stream_body(response, events, cancel, stop).await
    }
}

impl Default for LlamaCppClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl InferenceEngine for LlamaCppClient {
    async fn generate_streaming(
        &self,
        request: StreamRequest,
        events: mpsc::Sender<EngineEvent>,
        cancel: CancellationToken,
    ) -> Result<(), EngineError> {
        let body = self.build_request(&request)?;
        let url = format!("{}/v1/chat/completions", self.base_url);

        info!(
            "Streaming completion from {} (max_tokens: {}, tools: {})",
            self.base_url,
            body.max_tokens,
            body.tools.is_some()
        );

        // Registered before sending so a stop during prompt evaluation lands.
        let stop = self.register_active();
        let result = self.run_request(&url, &body, &events, &cancel, &stop).await;
        self.clear_active();
        result
    }

    async fn is_model_loaded(&self) -> bool {
        self.check_health().await.is_ok()
    }

    fn stop(&self) {
        let active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        match active.as_ref() {
            Some(token) => {
                info!("Stopping active generation");
                token.cancel();
            }
            None => warn!("Stop requested with no active generation"),
        }
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn max_tokens(&self) -> u32 {
        self.max_tokens
    }
}

async fn flush_tool_calls(
    pending: &mut PendingToolCalls,
    events: &mpsc::Sender<EngineEvent>,
) -> Result<(), EngineError> {
    for call in pending.drain() {
        debug!("Model requested tool '{}'", call.name);
        events
            .send(EngineEvent::ToolCall(call))
            .await
            .map_err(|_| EngineError::ReceiverClosed)?;
    }
    Ok(())
}

/// Accept either a single tool definition or an array of them.
fn parse_tool_schema(schema: &str) -> Result<Vec<serde_json::Value>, EngineError> {
    match serde_json::from_str::<serde_json::Value>(schema)? {
        serde_json::Value::Array(tools) => Ok(tools),
        tool @ serde_json::Value::Object(_) => Ok(vec![tool]),
        other => Err(EngineError::InvalidToolSchema(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::GenerationParams;

    #[test]
    fn test_default_url() {
        let client = LlamaCppClient::new();
        assert_eq!(client.base_url(), "http://127.0.0.1:11435");
        assert_eq!(client.model_name(), DEFAULT_MODEL_NAME);
    }

    #[test]
    fn test_custom_port() {
        let client = LlamaCppClient::with_port(9000).with_max_tokens(512);
        assert_eq!(client.base_url(), "http://127.0.0.1:9000");
        assert_eq!(client.max_tokens(), 512);
    }

    #[test]
    fn test_tool_schema_accepts_object_and_array() {
        assert_eq!(parse_tool_schema(r#"{"type":"function"}"#).unwrap().len(), 1);
        assert_eq!(parse_tool_schema(r#"[{"a":1},{"b":2}]"#).unwrap().len(), 2);
        assert!(matches!(
            parse_tool_schema("42"),
            Err(EngineError::InvalidToolSchema(_))
        ));
    }

    #[test]
    fn test_blank_tool_schema_disables_tools() {
        let client = LlamaCppClient::new();
        let request = StreamRequest {
            prompt: "hi".to_string(),
            params: GenerationParams { max_tokens: 16 },
            tool_schema: Some("  ".to_string()),
        };
        let body = client.build_request(&request).unwrap();
        assert!(body.tools.is_none());
        assert!(body.stream);
        assert_eq!(body.max_tokens, 16);
    }

    #[test]
    fn test_pending_tool_calls_merge_fragments() {
        let mut pending = PendingToolCalls::default();
        let fragments = [
            r#"{"index":0,"function":{"name":"web_search","arguments":"{\"q\":"}}"#,
            r#"{"index":0,"function":{"arguments":"\"rust\"}"}}"#,
        ];
        for fragment in fragments {
            pending.absorb(serde_json::from_str(fragment).unwrap());
        }

        let calls = pending.drain();
        assert_eq!(
            calls,
            vec![ToolInvocation {
                name: "web_search".to_string(),
                arguments: r#"{"q":"rust"}"#.to_string(),
            }]
        );
        assert!(pending.drain().is_empty());
    }

    #[tokio::test]
    async fn test_forward_frame_emits_tokens_then_tool_call() {
        let client = LlamaCppClient::new();
        let (tx, mut rx) = mpsc::channel(8);
        let mut pending = PendingToolCalls::default();

        client
            .forward_frame(
                r#"{"choices":[{"delta":{"content":"<think>"},"finish_reason":null}]}"#,
                &mut pending,
                &tx,
            )
            .await
            .unwrap();
        client
            .forward_frame(
                r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"name":"clock","arguments":"{}"}}]},"finish_reason":"tool_calls"}]}"#,
                &mut pending,
                &tx,
            )
            .await
            .unwrap();

        assert_eq!(rx.recv().await, Some(EngineEvent::Token("<think>".to_string())));
        assert_eq!(
            rx.recv().await,
            Some(EngineEvent::ToolCall(ToolInvocation {
                name: "clock".to_string(),
                arguments: "{}".to_string(),
            }))
        );
    }

    #[tokio::test]
    async fn test_error_frame_fails_stream() {
        let client = LlamaCppClient::new();
        let (tx, _rx) = mpsc::channel(8);
        let mut pending = PendingToolCalls::default();

        let result = client
            .forward_frame(
                r#"{"error":{"code":500,"message":"context size exceeded"}}"#,
                &mut pending,
                &tx,
            )
            .await;
        assert!(matches!(
            result,
            Err(EngineError::Stream(ref message)) if message == "context size exceeded"
        ));
    }

    #[tokio::test]
    async fn test_stop_during_request_send() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (accepted_tx, accepted_rx) = tokio::sync::oneshot::channel();
        // Accept the connection but never answer, like a server busy evaluating the prompt.
        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            accepted_tx.send(()).ok();
            tokio::time::sleep(Duration::from_secs(30)).await;
            drop(socket);
        });

        let client = std::sync::Arc::new(LlamaCppClient::with_url(format!("http://{}", addr)));
        let (tx, _rx) = mpsc::channel(8);
        let request = StreamRequest {
            prompt: "hi".to_string(),
            params: GenerationParams { max_tokens: 16 },
            tool_schema: None,
        };
        let running = {
            let client = client.clone();
            tokio::spawn(async move {
                client
                    .generate_streaming(request, tx, CancellationToken::new())
                    .await
            })
        };

        accepted_rx.await.unwrap();
        client.stop();

        let result = tokio::time::timeout(Duration::from_secs(5), running)
            .await
            .expect("stop did not interrupt the pending request")
            .unwrap();
        assert!(result.is_ok());
        server.abort();
    }

    #[test]
    fn test_stop_without_active_generation_is_noop() {
        let client = LlamaCppClient::new();
        client.stop();
        let token = client.register_active();
        client.stop();
        assert!(token.is_cancelled());
    }
}

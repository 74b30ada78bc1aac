//! Chat command - stream one reply through the generation worker.

use async_trait::async_trait;
use nano_engine::{InferenceEngine, LlamaCppClient};
use nano_generation::{
    ChatStore, GenerationError, GenerationRequest, GenerationWorker, MessageUpdate, NoTools, Role,
    StreamEnd, ToolExecutor, ToolOutcome, WorkerConfig,
};
use serde_json::{json, Value};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tokio_util::sync::CancellationToken;

const MESSAGE_ID: &str = "cli-1";

pub(crate) struct ChatOptions {
    pub prompt: String,
    pub url: Option<String>,
    pub port: u16,
    pub model: Option<String>,
    pub max_tokens: Option<u32>,
    pub tools: Option<PathBuf>,
    pub regenerate: bool,
}

pub(crate) async fn run(options: ChatOptions) -> miette::Result<()> {
    let mut client = match &options.url {
        Some(url) => LlamaCppClient::with_url(url.as_str()),
        None => LlamaCppClient::with_port(options.port),
    };
    if let Some(model) = &options.model {
        client = client.with_model_name(model.as_str());
    }
    if let Some(max_tokens) = options.max_tokens {
        client = client.with_max_tokens(max_tokens);
    }

    if let Err(e) = client.check_health().await {
        return Err(miette::miette!(
            "llama-server is not reachable at {}: {}",
            client.base_url(),
            e
        ));
    }

    let tools: Arc<dyn ToolExecutor> = match &options.tools {
        Some(path) => Arc::new(EchoTools::load(path)?),
        None => Arc::new(NoTools),
    };
    let tools_enabled = options.tools.is_some();

    let engine: Arc<dyn InferenceEngine> = Arc::new(client);
    let chat = Arc::new(TerminalChat::default());
    let worker = GenerationWorker::new(engine, chat, tools, WorkerConfig::from_env());

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            interrupt.cancel();
        }
    });

    let request = GenerationRequest::new(MESSAGE_ID, options.prompt)
        .with_tools(tools_enabled)
        .regenerating(options.regenerate)
        .on_tool_execution(Arc::new(|outcome: ToolOutcome| {
            eprintln!("[tool {:?}]", outcome);
        }));

    let end = worker.generate(request, cancel).await;

    if let Some(ms) = worker.metrics().last_decoding_ms() {
        eprintln!("Time to first token: {} ms", ms);
    }

    match end {
        StreamEnd::Completed | StreamEnd::Cancelled => Ok(()),
        StreamEnd::ToolFailed => Err(miette::miette!("Tool execution failed")),
        StreamEnd::Failed => Err(miette::miette!("Streaming failed")),
    }
}

/// Prints streamed text as it arrives.
#[derive(Default)]
struct TerminalChat {
    /// Text already written to the terminal.
    printed: Mutex<String>,
}

impl TerminalChat {
    /// Terminal output for one update.
    ///
    /// Progress updates only ever extend the visible text. A final update
    /// may replace it when reasoning extraction rewrote the answer, in which
    /// case the answer is printed in full.
    fn render(&self, update: &MessageUpdate) -> String {
        let mut out = String::new();
        let mut printed = self.printed.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(fresh) = update.text.strip_prefix(printed.as_str()) {
            out.push_str(fresh);
            printed.push_str(fresh);
        } else if update.is_final && !update.text.is_empty() {
            out.push_str("\n\nAnswer:\n");
            out.push_str(&update.text);
            *printed = update.text.clone();
        }

        if !update.is_final {
            return out;
        }

        out.push('\n');
        if let Some(error) = &update.tool_error {
            out.push_str(&format!("\nTool error: {}\n", error));
        }
        if let Some(thought) = &update.thought {
            out.push_str(&format!("\nReasoning:\n{}\n", thought));
        }
        for block in &update.code_blocks {
            out.push_str(&format!(
                "\n[{} code, {} lines]\n",
                block.language,
                block.code.lines().count()
            ));
        }
        out
    }
}

#[async_trait]
impl ChatStore for TerminalChat {
    async fn update_streaming_message(&self, update: MessageUpdate) {
        print!("{}", self.render(&update));
        std::io::stdout().flush().ok();
    }

    async fn message_role(&self, message_id: &str) -> Option<Role> {
        (message_id == MESSAGE_ID).then_some(Role::Assistant)
    }

    fn current_chat_id(&self) -> String {
        "cli".to_string()
    }

    async fn generate_title_if_needed(&self, _use_ai: bool) -> Result<(), GenerationError> {
        Ok(())
    }

    async fn refresh_chat_list(&self) -> Result<(), GenerationError> {
        Ok(())
    }
}

/// Offers a schema from disk and echoes the arguments back as the result.
struct EchoTools {
    schema: String,
}

impl EchoTools {
    fn load(path: &Path) -> miette::Result<Self> {
        let schema = std::fs::read_to_string(path)
            .map_err(|e| miette::miette!("Failed to read tool schema: {}", e))?;
        serde_json::from_str::<Value>(&schema)
            .map_err(|e| miette::miette!("Failed to parse tool schema JSON: {}", e))?;
        Ok(Self { schema })
    }
}

#[async_trait]
impl ToolExecutor for EchoTools {
    fn tool_schema(&self) -> Option<String> {
        Some(self.schema.clone())
    }

    async fn execute(&self, tool_name: &str, arguments: &str) -> Result<Value, GenerationError> {
        let args: Value = serde_json::from_str(arguments).map_err(|e| {
            GenerationError::Tool(format!("invalid arguments for '{}': {}", tool_name, e))
        })?;
        Ok(json!({ "result": args }))
    }
}

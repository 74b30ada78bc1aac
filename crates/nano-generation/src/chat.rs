//! Persistence collaborator for streaming messages.

use async_trait::async_trait;

use crate::error::GenerationError;
use crate::message::{MessageUpdate, Role};

/// The chat layer the worker streams into.
///
/// `update_streaming_message` is expected to return promptly; the batched
/// publisher calls it on a fixed cadence without back-pressure.
#[async_trait]
pub trait ChatStore: Send + Sync {
    /// Apply a progressive or final write to a message.
    async fn update_streaming_message(&self, update: MessageUpdate);

    /// Role of a persisted message, `None` if it does not exist.
    async fn message_role(&self, message_id: &str) -> Option<Role>;

    /// Identifier of the chat currently open.
    fn current_chat_id(&self) -> String;

    /// Give the chat a title if it has none yet.
    async fn generate_title_if_needed(&self, use_ai: bool) -> Result<(), GenerationError>;

    /// Reload the chat list from storage.
    async fn refresh_chat_list(&self) -> Result<(), GenerationError>;
}

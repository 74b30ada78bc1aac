//! Periodic flush of streaming buffers to the chat layer.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tokio_util::task::AbortOnDropHandle;
use tracing::{debug, warn};

use crate::chat::ChatStore;
use crate::message::MessageUpdate;
use crate::state::SharedStreamingState;

/// Handle to the running publisher task.
///
/// The task stops when [`BatchPublisher::stop`] is called, when the parent
/// token is cancelled, or when the handle is dropped.
pub struct BatchPublisher {
    cancel: CancellationToken,
    handle: AbortOnDropHandle<()>,
}

impl BatchPublisher {
    pub fn start(
        state: SharedStreamingState,
        chat: Arc<dyn ChatStore>,
        message_id: impl Into<String>,
        interval: Duration,
        display_cap: usize,
        parent: &CancellationToken,
    ) -> Self {
        let message_id = message_id.into();
        let cancel = parent.child_token();
        let token = cancel.clone();

        let handle = tokio::spawn(async move {
            debug!("Batched updates started for {}", message_id);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {}
                }

                let snapshot = state.snapshot(display_cap).await;
                if snapshot.is_empty() {
                    continue;
                }
                chat.update_streaming_message(MessageUpdate::progress(
                    message_id.as_str(),
                    snapshot.visible,
                    snapshot.thought,
                ))
                .await;
            }
            debug!("Batched updates stopped for {}", message_id);
        });

        Self {
            cancel,
            handle: AbortOnDropHandle::new(handle),
        }
    }

    /// Cancel the task and wait until any in-flight update has landed.
    pub async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.handle.await {
            if !e.is_cancelled() {
                warn!("Batched publisher ended abnormally: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingChatStore;

    const TICK: Duration = Duration::from_millis(300);

    #[tokio::test(start_paused = true)]
    async fn test_publishes_on_each_tick() {
        let chat = Arc::new(RecordingChatStore::new());
        let state = SharedStreamingState::new("m1");
        let root = CancellationToken::new();
        let publisher = BatchPublisher::start(
            state.clone(),
            chat.clone(),
            "m1",
            TICK,
            16_000,
            &root,
        );

        // Nothing buffered yet: the first tick stays silent.
        tokio::time::sleep(TICK + Duration::from_millis(10)).await;
        assert!(chat.updates().is_empty());

        state.classify("Hello <think>hmm").await;
        tokio::time::sleep(TICK).await;

        let updates = chat.updates();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].message_id, "m1");
        assert_eq!(updates[0].text, "Hello ");
        assert_eq!(updates[0].thought.as_deref(), Some("hmm"));
        assert!(!updates[0].is_final);

        publisher.stop().await;
        state.classify(" more").await;
        tokio::time::sleep(TICK * 3).await;
        assert_eq!(chat.updates().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_thought_tail_is_capped_for_display() {
        let chat = Arc::new(RecordingChatStore::new());
        let state = SharedStreamingState::new("m1");
        let root = CancellationToken::new();
        let publisher = BatchPublisher::start(state.clone(), chat.clone(), "m1", TICK, 4, &root);

        state.classify("<think>abcdefgh").await;
        tokio::time::sleep(TICK + Duration::from_millis(10)).await;
        publisher.stop().await;

        let updates = chat.updates();
        assert_eq!(updates[0].thought.as_deref(), Some("efgh"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_parent_cancellation_stops_publisher() {
        let chat = Arc::new(RecordingChatStore::new());
        let state = SharedStreamingState::new("m1");
        let root = CancellationToken::new();
        let publisher =
            BatchPublisher::start(state.clone(), chat.clone(), "m1", TICK, 16_000, &root);

        state.classify("text").await;
        root.cancel();
        publisher.stop().await;
        tokio::time::sleep(TICK * 2).await;
        assert!(chat.updates().is_empty());
    }
}

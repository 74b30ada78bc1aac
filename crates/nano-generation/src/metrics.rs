//! Time-to-first-token metrics.

use std::time::Duration;

use tokio::sync::{broadcast, watch};
use tokio::time::Instant;
use tracing::info;

/// Why a generation ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DecodeType {
    #[default]
    Normal,
    Regenerate,
}

/// One record per generation, taken when the first token arrives.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodingMetrics {
    pub decode_type: DecodeType,
    pub chat_id: String,
    pub model_name: String,
    pub started_at: Instant,
    pub first_token_at: Instant,
    pub duration: Duration,
}

impl DecodingMetrics {
    pub fn new(
        decode_type: DecodeType,
        chat_id: impl Into<String>,
        model_name: impl Into<String>,
        started_at: Instant,
        first_token_at: Instant,
    ) -> Self {
        Self {
            decode_type,
            chat_id: chat_id.into(),
            model_name: model_name.into(),
            started_at,
            first_token_at,
            duration: first_token_at.saturating_duration_since(started_at),
        }
    }

    pub fn duration_ms(&self) -> u64 {
        u64::try_from(self.duration.as_millis()).unwrap_or(u64::MAX)
    }
}

const METRICS_CHANNEL_CAPACITY: usize = 16;

/// Observable metrics channel.
pub struct MetricsHub {
    records: broadcast::Sender<DecodingMetrics>,
    latest: watch::Sender<Option<DecodingMetrics>>,
    last_decoding_ms: watch::Sender<Option<u64>>,
}

impl MetricsHub {
    pub fn new() -> Self {
        let (records, _) = broadcast::channel(METRICS_CHANNEL_CAPACITY);
        let (latest, _) = watch::channel(None);
        let (last_decoding_ms, _) = watch::channel(None);
        Self {
            records,
            latest,
            last_decoding_ms,
        }
    }

    pub fn emit(&self, metrics: DecodingMetrics) {
        info!(
            "First token after {}ms (model: {}, type: {:?})",
            metrics.duration_ms(),
            metrics.model_name,
            metrics.decode_type
        );
        self.last_decoding_ms.send_replace(Some(metrics.duration_ms()));
        self.latest.send_replace(Some(metrics.clone()));
        let _ = self.records.send(metrics);
    }

    /// Stream of every record emitted after subscribing.
    pub fn subscribe(&self) -> broadcast::Receiver<DecodingMetrics> {
        self.records.subscribe()
    }

    pub fn latest(&self) -> Option<DecodingMetrics> {
        self.latest.borrow().clone()
    }

    pub fn last_decoding_ms(&self) -> Option<u64> {
        *self.last_decoding_ms.borrow()
    }

    pub fn watch_last_decoding_ms(&self) -> watch::Receiver<Option<u64>> {
        self.last_decoding_ms.subscribe()
    }
}

impl Default for MetricsHub {
    fn default() -> Self {
        Self::new()
    }
}

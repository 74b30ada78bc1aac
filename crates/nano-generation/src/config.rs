//! Generation worker configuration.

use std::time::Duration;

/// Configuration for the generation worker.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Period of the batched UI publisher
    pub batch_interval: Duration,
    /// Tail of the thought buffer shown while streaming
    pub max_think_display_chars: usize,
    /// Head of the thought kept on the persisted message
    pub max_thought_save_chars: usize,
    /// Pause after entering the encoding stage
    pub encode_delay: Duration,
    /// Pause before the final write so the rendering stage is visible
    pub render_delay: Duration,
    /// Capacity of the engine event channel
    pub event_buffer: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            batch_interval: Duration::from_millis(300),
            max_think_display_chars: 16_000,
            max_thought_save_chars: 6_000,
            encode_delay: Duration::from_millis(50),
            render_delay: Duration::from_millis(100),
            event_buffer: 64,
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let millis = |name: &str, fallback: Duration| {
            std::env::var(name)
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_millis)
                .unwrap_or(fallback)
        };
        let count = |name: &str, fallback: usize| {
            std::env::var(name)
                .ok()
                .and_then(|v| v.parse::<usize>().ok())
                .unwrap_or(fallback)
        };

        Self {
            batch_interval: millis("NANO_BATCH_INTERVAL_MS", defaults.batch_interval),
            max_think_display_chars: count(
                "NANO_MAX_THINK_DISPLAY_CHARS",
                defaults.max_think_display_chars,
            ),
            max_thought_save_chars: count(
                "NANO_MAX_THOUGHT_SAVE_CHARS",
                defaults.max_thought_save_chars,
            ),
            encode_delay: millis("NANO_ENCODE_DELAY_MS", defaults.encode_delay),
            render_delay: millis("NANO_RENDER_DELAY_MS", defaults.render_delay),
            event_buffer: defaults.event_buffer,
        }
    }

    /// Create a builder for configuration.
    pub fn builder() -> WorkerConfigBuilder {
        WorkerConfigBuilder::default()
    }
}

/// Builder for worker configuration.
#[derive(Debug, Default)]
pub struct WorkerConfigBuilder {
    config: WorkerConfig,
}

impl WorkerConfigBuilder {
    pub fn batch_interval(mut self, interval: Duration) -> Self {
        self.config.batch_interval = interval;
        self
    }

    pub fn max_think_display_chars(mut self, chars: usize) -> Self {
        self.config.max_think_display_chars = chars;
        self
    }

    pub fn max_thought_save_chars(mut self, chars: usize) -> Self {
        self.config.max_thought_save_chars = chars;
        self
    }

    pub fn encode_delay(mut self, delay: Duration) -> Self {
        self.config.encode_delay = delay;
        self
    }

    pub fn render_delay(mut self, delay: Duration) -> Self {
        self.config.render_delay = delay;
        self
    }

    pub fn event_buffer(mut self, capacity: usize) -> Self {
        // A zero-capacity mpsc channel panics on construction.
        self.config.event_buffer = capacity.max(1);
        self
    }

    pub fn build(self) -> WorkerConfig {
        self.config
    }
}

//! Info command - show the effective generation settings.

use nano_generation::{WorkerConfig, DEFAULT_MAX_TOKENS, DEFAULT_MODEL_NAME, DEFAULT_PORT};

pub(crate) fn run() -> miette::Result<()> {
    let config = WorkerConfig::from_env();

    println!("Nano Generation Pipeline");
    println!("========================");
    println!();
    println!("Version: {}", env!("CARGO_PKG_VERSION"));
    println!();

    println!("Engine:");
    println!("  Server:      llama-server on 127.0.0.1:{}", DEFAULT_PORT);
    println!("  Model:       {}", DEFAULT_MODEL_NAME);
    println!("  Max tokens:  {}", DEFAULT_MAX_TOKENS);
    println!();

    println!("Worker (override with NANO_* variables):");
    println!("  Batch interval:        {} ms", config.batch_interval.as_millis());
    println!("  Thought display cap:   {} chars", config.max_think_display_chars);
    println!("  Thought persist cap:   {} chars", config.max_thought_save_chars);
    println!("  Encode delay:          {} ms", config.encode_delay.as_millis());
    println!("  Render delay:          {} ms", config.render_delay.as_millis());

    Ok(())
}

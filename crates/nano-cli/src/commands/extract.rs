//! Extract command - split a saved model reply into its parts.

use nano_generation::{classifier, extract_code_blocks, reasoning, StreamingState};
use std::path::Path;

pub(crate) fn run(file: &Path) -> miette::Result<()> {
    let raw = std::fs::read_to_string(file)
        .map_err(|e| miette::miette!("Failed to read {}: {}", file.display(), e))?;

    // Replay the text through the classifier as if it had been streamed.
    let mut state = StreamingState::new("extract");
    classifier::classify(&raw, &mut state);

    let result = reasoning::extract(state.raw(), state.visible(), state.thought());

    println!("Strategy: {:?}", result.strategy);
    println!();
    println!("Answer:");
    println!("{}", result.answer);

    if let Some(thought) = &result.thought {
        println!();
        println!("Reasoning:");
        println!("{}", thought);
    }

    let blocks = extract_code_blocks(&result.answer);
    if !blocks.is_empty() {
        println!();
        println!("Code blocks:");
        for (i, block) in blocks.iter().enumerate() {
            println!("  {}. {} ({} lines)", i + 1, block.language, block.code.lines().count());
        }
    }

    Ok(())
}

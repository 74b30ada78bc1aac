//! Prompt assembly from conversation history.

use crate::message::{Message, Role};

/// Build the full prompt sent to the engine.
///
/// User and assistant turns are replayed as `Role: text` lines, followed by
/// the code of the most recent assistant message that produced any, then
/// the new user prompt. No trimming is applied here; the engine enforces
/// its own context limit.
pub fn build_full_prompt(prompt: &str, history: &[Message]) -> String {
    let conversation = history
        .iter()
        .filter(|m| matches!(m.role, Role::User | Role::Assistant))
        .map(|m| format!("{}: {}", m.role, m.text))
        .collect::<Vec<_>>()
        .join("\n");

    let last_code = history
        .iter()
        .rev()
        .find(|m| m.role == Role::Assistant && !m.code_blocks.is_empty())
        .map(|m| {
            m.code_blocks
                .iter()
                .map(|block| block.code.as_str())
                .collect::<Vec<_>>()
                .join("\n")
        });

    let mut out = String::new();

    if !conversation.trim().is_empty() {
        out.push_str("Conversation History:\n");
        out.push_str(&conversation);
        out.push_str("\n\n");
    }

    if let Some(code) = last_code.filter(|c| !c.trim().is_empty()) {
        out.push_str("Latest AI Code:\n");
        out.push_str(&code);
        out.push_str("\n\n");
    }

    out.push_str("User: ");
    out.push_str(prompt);
    out
}

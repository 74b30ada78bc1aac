//! Fenced code block extraction for persisted answers.

use regex::Regex;

use crate::message::CodeBlock;

lazy_static::lazy_static! {
    static ref FENCE: Regex = Regex::new(r"(?s)```(\w+)?\n(.*?)```").expect("invalid fence regex");
}

/// Collect every ```` ```lang ```` block in `text`, in order.
pub fn extract_code_blocks(text: &str) -> Vec<CodeBlock> {
    FENCE
        .captures_iter(text)
        .map(|captures| {
            let language = captures
                .get(1)
                .map(|m| m.as_str().trim().to_string())
                .unwrap_or_else(|| "text".to_string());
            let code = captures
                .get(2)
                .map(|m| m.as_str().trim().to_string())
                .unwrap_or_default();
            CodeBlock { code, language }
        })
        .collect()
}

//! Post-stream separation of the answer from the model's reasoning.
//!
//! Models disagree on how they expose reasoning: some answer with a JSON
//! object, some wrap it in `<think>` tags, some write `Reasoning: ... Final:
//! ...` prose. [`extract`] tries each shape in priority order over the raw
//! stream and falls back to the live classifier buffers, so it never fails.

use regex::Regex;
use serde_json::{Map, Value};

lazy_static::lazy_static! {
    static ref THINK_SPAN: Regex =
        Regex::new(r"(?is)<think>(.*?)</think>").expect("invalid think span regex");
    static ref LABELED: Regex = Regex::new(
        r"(?is)(?:reasoning|thoughts?)\s*:\s*(.+?)\s*(?:final|answer)\s*:\s*(.+)"
    )
    .expect("invalid labeled reasoning regex");
}

/// Which shape produced a [`Reasoning`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Json,
    Tagged,
    Labeled,
    Fallback,
}

/// Final answer text and optional thought for a finished stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reasoning {
    pub answer: String,
    pub thought: Option<String>,
    pub strategy: Strategy,
}

/// Reclassify a complete stream into answer and thought.
pub fn extract(raw: &str, visible: &str, thought: &str) -> Reasoning {
    if let Some(found) = from_json(raw) {
        return found;
    }
    if let Some(found) = from_think_span(raw) {
        return found;
    }
    if let Some(found) = from_labels(raw) {
        return found;
    }

    Reasoning {
        answer: visible.to_string(),
        thought: non_blank(thought),
        strategy: Strategy::Fallback,
    }
}

/// Isolate the outermost `{...}` in text that may carry surrounding prose.
pub fn extract_json(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (start < end).then(|| &text[start..=end])
}

fn from_json(raw: &str) -> Option<Reasoning> {
    let json = extract_json(raw)?;
    let Ok(Value::Object(obj)) = serde_json::from_str::<Value>(json) else {
        return None;
    };

    let answer = string_field(&obj, "final")
        .or_else(|| string_field(&obj, "answer"))
        .unwrap_or_default();
    let thought = string_field(&obj, "thought")
        .or_else(|| string_field(&obj, "reasoning"))
        .unwrap_or_default();

    if answer.trim().is_empty() && thought.trim().is_empty() {
        return None;
    }

    Some(Reasoning {
        answer,
        thought: non_blank(&thought),
        strategy: Strategy::Json,
    })
}

fn from_think_span(raw: &str) -> Option<Reasoning> {
    let captures = THINK_SPAN.captures(raw)?;
    let thought = captures.get(1).map_or("", |m| m.as_str()).trim().to_string();
    let answer = THINK_SPAN.replace_all(raw, "").trim().to_string();

    Some(Reasoning {
        answer,
        thought: Some(thought),
        strategy: Strategy::Tagged,
    })
}

fn from_labels(raw: &str) -> Option<Reasoning> {
    let captures = LABELED.captures(raw)?;
    let thought = captures.get(1).map_or("", |m| m.as_str()).trim().to_string();
    let answer = captures.get(2).map_or("", |m| m.as_str()).trim().to_string();

    Some(Reasoning {
        answer,
        thought: Some(thought),
        strategy: Strategy::Labeled,
    })
}

fn string_field(obj: &Map<String, Value>, key: &str) -> Option<String> {
    match obj.get(key)? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn non_blank(text: &str) -> Option<String> {
    (!text.trim().is_empty()).then(|| text.to_string())
}

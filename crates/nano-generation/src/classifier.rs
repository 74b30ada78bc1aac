//! Routes streamed fragments into visible text or thought.

use crate::state::StreamingState;

pub const OPEN_TAG: &str = "<think>";
pub const CLOSE_TAG: &str = "</think>";

/// Append `token` to the raw buffer and split it across visible/thought.
///
/// Marker matching is ASCII case-insensitive. A marker split across two
/// fragments is not reassembled: each half is routed as plain text.
pub fn classify(token: &str, state: &mut StreamingState) {
    state.raw.push_str(token);

    let mut rest = token;
    loop {
        if state.in_think_tag {
            match find_marker(rest, CLOSE_TAG) {
                Some(at) => {
                    state.thought.push_str(&rest[..at]);
                    state.in_think_tag = false;
                    rest = &rest[at + CLOSE_TAG.len()..];
                }
                None => {
                    state.thought.push_str(rest);
                    return;
                }
            }
        } else {
            match find_marker(rest, OPEN_TAG) {
                Some(at) => {
                    state.visible.push_str(&rest[..at]);
                    state.in_think_tag = true;
                    rest = &rest[at + OPEN_TAG.len()..];
                }
                None => {
                    state.visible.push_str(rest);
                    return;
                }
            }
        }
    }
}

// ASCII lowering keeps byte offsets valid for the original string.
fn find_marker(haystack: &str, marker: &str) -> Option<usize> {
    haystack.to_ascii_lowercase().find(marker)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(tokens: &[&str]) -> StreamingState {
        let mut state = StreamingState::new("m1");
        for token in tokens {
            classify(token, &mut state);
        }
        state
    }

    #[test]
    fn test_plain_tokens_are_visible() {
        let state = run(&["Hello", ", ", "world"]);
        assert_eq!(state.visible(), "Hello, world");
        assert_eq!(state.thought(), "");
        assert!(!state.in_think_tag());
    }

    #[test]
    fn test_think_region_across_tokens() {
        let state = run(&["Hi <think>let me", " see</think> ok", "!"]);
        assert_eq!(state.visible(), "Hi  ok!");
        assert_eq!(state.thought(), "let me see");
        assert_eq!(state.raw(), "Hi <think>let me see</think> ok!");
    }

    #[test]
    fn test_full_pair_inside_one_token() {
        let state = run(&["a<think>b</think>c"]);
        assert_eq!(state.visible(), "ac");
        assert_eq!(state.thought(), "b");
        assert!(!state.in_think_tag());
    }

    #[test]
    fn test_markers_are_case_insensitive() {
        let state = run(&["<THINK>Plan", "</Think>Answer"]);
        assert_eq!(state.thought(), "Plan");
        assert_eq!(state.visible(), "Answer");
    }

    #[test]
    fn test_unclosed_region_stays_thought() {
        let state = run(&["<think>still", " going"]);
        assert_eq!(state.thought(), "still going");
        assert!(state.in_think_tag());
    }

    #[test]
    fn test_split_marker_is_not_recognized() {
        let state = run(&["<thi", "nk>hidden?"]);
        assert_eq!(state.visible(), "<think>hidden?");
        assert_eq!(state.thought(), "");
        assert!(!state.in_think_tag());
    }

    #[test]
    fn test_non_marker_characters_are_conserved() {
        let sequences: &[&[&str]] = &[
            &["one <think>two</think> three"],
            &["<think>", "αβγ", "</think>", "δ"],
            &["x", "<think>y</think>z<think>w", "</think>"],
            &["no markers at all"],
        ];

        for tokens in sequences {
            let state = run(tokens);
            let joined: String = tokens.concat();
            let markers = joined.matches(OPEN_TAG).count() * OPEN_TAG.chars().count()
                + joined.matches(CLOSE_TAG).count() * CLOSE_TAG.chars().count();
            let expected = joined.chars().count() - markers;
            let routed = state.visible().chars().count() + state.thought().chars().count();
            assert_eq!(routed, expected, "tokens: {:?}", tokens);
        }
    }
}

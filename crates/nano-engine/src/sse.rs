//! Incremental decoder for `text/event-stream` bodies.

/// Payload of a single server-sent event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum SseFrame {
    Data(String),
    Done,
}

/// Splits an arbitrarily chunked byte stream into `data:` frames.
#[derive(Debug, Default)]
pub(crate) struct SseDecoder {
    pending: Vec<u8>,
}

impl SseDecoder {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and collect every frame completed by it.
    pub(crate) fn push(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        self.pending.extend_from_slice(chunk);

        let mut frames = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            if let Some(frame) = Self::parse_line(&line) {
                frames.push(frame);
            }
        }
        frames
    }

    /// Flush a trailing line that was not newline-terminated.
    pub(crate) fn finish(&mut self) -> Option<SseFrame> {
        if self.pending.is_empty() {
            return None;
        }
        let line = std::mem::take(&mut self.pending);
        Self::parse_line(&line)
    }

    fn parse_line(line: &[u8]) -> Option<SseFrame> {
        let line = String::from_utf8_lossy(line);
        let line = line.trim_end_matches(['\r', '\n']);
        let data = line.strip_prefix("data:")?.trim_start();

        if data == "[DONE]" {
            Some(SseFrame::Done)
        } else if data.is_empty() {
            None
        } else {
            Some(SseFrame::Data(data.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frames_split_across_chunks() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"data: {\"a\"").is_empty());
        let frames = decoder.push(b":1}\n\ndata: [DONE]\n");
        assert_eq!(
            frames,
            vec![SseFrame::Data("{\"a\":1}".to_string()), SseFrame::Done]
        );
    }

    #[test]
    fn test_ignores_comments_and_event_names() {
        let mut decoder = SseDecoder::new();
        let frames = decoder.push(b": keep-alive\nevent: message\ndata: x\r\n");
        assert_eq!(frames, vec![SseFrame::Data("x".to_string())]);
    }

    #[test]
    fn test_finish_flushes_unterminated_line() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"data: tail").is_empty());
        assert_eq!(decoder.finish(), Some(SseFrame::Data("tail".to_string())));
        assert_eq!(decoder.finish(), None);
    }
}

//! Server-sent event framing for streamed chat completions.
//!
//! Network chunks split events (and even UTF-8 sequences) at arbitrary
//! offsets, so bytes are buffered until a blank line closes an event. Lines
//! may end in `\n`, `\r\n` or a bare `\r`; all three are normalized to `\n`.

/// Incremental decoder that yields the `data:` payload of each complete event.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    /// The last byte seen was `\r`, so a following `\n` belongs to it.
    after_cr: bool,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds raw bytes and returns the payloads of every event they complete.
    ///
    /// Multi-line `data:` fields are joined with `\n`. Events without data
    /// (comments, keep-alives) yield nothing.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        for &b in bytes {
            match b {
                b'\r' => {
                    self.buffer.push(b'\n');
                    self.after_cr = true;
                }
                b'\n' if self.after_cr => self.after_cr = false,
                _ => {
                    self.buffer.push(b);
                    self.after_cr = false;
                }
            }
        }

        let mut events = Vec::new();
        while let Some(pos) = self.buffer.windows(2).position(|w| w == b"\n\n") {
            let block: Vec<u8> = self.buffer.drain(..pos + 2).collect();
            if let Some(data) = Self::data_of(&String::from_utf8_lossy(&block[..pos])) {
                events.push(data);
            }
        }
        events
    }

    /// Returns the payload of an unterminated trailing event, if any.
    pub fn finish(&mut self) -> Option<String> {
        self.after_cr = false;
        let block = std::mem::take(&mut self.buffer);
        Self::data_of(&String::from_utf8_lossy(&block))
    }

    fn data_of(block: &str) -> Option<String> {
        let lines: Vec<&str> = block
            .lines()
            .filter_map(|line| line.strip_prefix("data:"))
            .map(|data| data.strip_prefix(' ').unwrap_or(data))
            .collect();
        (!lines.is_empty()).then(|| lines.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yields_complete_events_only() {
        let mut sse = SseDecoder::new();
        assert!(sse.push(b"data: {\"a\":").is_empty());
        assert_eq!(sse.push(b"1}\n\ndata: [DO"), vec!["{\"a\":1}"]);
        assert_eq!(sse.push(b"NE]\n\n"), vec!["[DONE]"]);
        assert_eq!(sse.finish(), None);
    }

    #[test]
    fn handles_crlf_and_comments() {
        let mut sse = SseDecoder::new();
        let events = sse.push(b": keep-alive\r\n\r\ndata:x\r\n\r\nevent: ping\r\ndata: y\r\n\r\n");
        assert_eq!(events, vec!["x", "y"]);
    }

    #[test]
    fn bare_carriage_returns_end_lines() {
        let mut sse = SseDecoder::new();
        assert_eq!(sse.push(b"data: a\r\rdata: b\r\r"), vec!["a", "b"]);
    }

    #[test]
    fn crlf_split_across_chunks_is_one_line_break() {
        let mut sse = SseDecoder::new();
        assert!(sse.push(b"data: one\r").is_empty());
        assert!(sse.push(b"\ndata: two\r").is_empty());
        assert_eq!(sse.push(b"\n\r\n"), vec!["one\ntwo"]);
    }

    #[test]
    fn joins_multiline_data() {
        let mut sse = SseDecoder::new();
        assert_eq!(sse.push(b"data: one\ndata: two\n\n"), vec!["one\ntwo"]);
    }

    #[test]
    fn reassembles_split_utf8() {
        let mut sse = SseDecoder::new();
        let bytes = "data: caf\u{e9}\n\n".as_bytes();
        let split = bytes.len() - 3;
        assert!(sse.push(&bytes[..split]).is_empty());
        assert_eq!(sse.push(&bytes[split..]), vec!["caf\u{e9}"]);
    }

    #[test]
    fn finish_returns_trailing_event() {
        let mut sse = SseDecoder::new();
        assert!(sse.push(b"data: tail").is_empty());
        assert_eq!(sse.finish().as_deref(), Some("tail"));
    }
}

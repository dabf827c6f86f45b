//! Incremental framing of a streaming response body into event payloads.
//!
//! The upstream contract is one newline-terminated payload per event.
//! Real SSE endpoints wrap payloads in `data:` fields and interleave
//! comment keep-alives; both are tolerated here so the decoder accepts
//! either framing.

/// Splits an incoming byte stream into complete payload lines.
///
/// Feed network chunks with [`push`](Self::push); it returns the
/// payloads completed by that chunk. A partial trailing line is buffered
/// until the next chunk (or discarded by [`reset`](Self::reset) on
/// reconnect — a payload whose terminator never arrived was never
/// complete).
#[derive(Debug)]
pub struct StreamFrameDecoder {
    /// Carry-over bytes of the current, not-yet-terminated line.
    buffer: Vec<u8>,
    /// Maximum accepted payload size; longer lines are dropped whole.
    max_event_bytes: usize,
    /// Set while discarding the remainder of an oversized line.
    dropping: bool,
    /// Number of payloads dropped for exceeding the size limit.
    dropped_oversize: u64,
}

impl StreamFrameDecoder {
    /// Creates a decoder with the given payload size limit.
    #[must_use]
    pub fn new(max_event_bytes: usize) -> Self {
        Self {
            buffer: Vec::new(),
            max_event_bytes,
            dropping: false,
            dropped_oversize: 0,
        }
    }

    /// Consumes a network chunk and returns the payloads it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut payloads = Vec::new();

        for &byte in chunk {
            if byte == b'\n' {
                if self.dropping {
                    self.dropping = false;
                    self.dropped_oversize += 1;
                } else if let Some(payload) = Self::finish_line(&mut self.buffer) {
                    payloads.push(payload);
                }
                self.buffer.clear();
            } else if self.dropping {
                // Skip until the terminator of the oversized line.
            } else {
                self.buffer.push(byte);
                if self.buffer.len() > self.max_event_bytes {
                    self.dropping = true;
                    self.buffer.clear();
                }
            }
        }

        payloads
    }

    /// Drops any buffered partial line (called on reconnect).
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.dropping = false;
    }

    /// Returns the count of payloads dropped for exceeding the limit.
    #[must_use]
    pub fn dropped_oversize(&self) -> u64 {
        self.dropped_oversize
    }

    /// Returns whether a partial line is currently buffered.
    #[must_use]
    pub fn has_partial(&self) -> bool {
        !self.buffer.is_empty()
    }

    /// Turns one complete line into a payload, or `None` for lines that
    /// carry no event: blanks, SSE comments (keep-alives), and SSE
    /// metadata fields. A `data:` field prefix is stripped.
    fn finish_line(line: &mut Vec<u8>) -> Option<String> {
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        if line.is_empty() {
            return None;
        }

        let text = String::from_utf8_lossy(line);

        if let Some(data) = text.strip_prefix("data:") {
            let data = data.strip_prefix(' ').unwrap_or(data);
            if data.is_empty() {
                return None;
            }
            return Some(data.to_string());
        }

        // SSE comment (keep-alive) or metadata field — no payload.
        if text.starts_with(':')
            || text.starts_with("event:")
            || text.starts_with("id:")
            || text.starts_with("retry:")
        {
            return None;
        }

        Some(text.into_owned())
    }
}

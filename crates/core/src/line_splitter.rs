//! Incremental line splitting over an arbitrarily chunked byte stream.
//!
//! Child-process reads return whatever bytes are available, so a chunk may
//! end mid-line or even mid-character. Buffering policy:
//!
//! - A line is emitted only once its terminating `\n` has arrived.
//! - A trailing `\r` is stripped (CRLF output).
//! - The partial line left at end of stream is emitted by [`LineSplitter::finish`].
//! - Bytes are decoded lossily per complete line, so a UTF-8 sequence split
//!   across chunks is decoded intact.

#[derive(Debug, Default)]
pub struct LineSplitter {
    pending: Vec<u8>,
}

impl LineSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return every line it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        let mut rest = chunk;
        while let Some(pos) = rest.iter().position(|&b| b == b'\n') {
            self.pending.extend_from_slice(&rest[..pos]);
            lines.push(Self::decode(&self.pending));
            self.pending.clear();
            rest = &rest[pos + 1..];
        }
        self.pending.extend_from_slice(rest);
        lines
    }

    /// Flush the unterminated trailing line, if any.
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let line = Self::decode(&self.pending);
        self.pending.clear();
        Some(line)
    }

    fn decode(bytes: &[u8]) -> String {
        let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
        String::from_utf8_lossy(bytes).into_owned()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

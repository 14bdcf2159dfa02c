//! Incremental line framing over an arbitrary byte stream.
//!
//! rtl_433 writes one JSON object per line, but the pipe hands us arbitrary
//! chunks: partial lines, several lines at once, or bytes that split a
//! multi-byte UTF-8 sequence. [`LineFramer`] buffers bytes and emits only
//! complete lines, so feeding the same bytes in any chunking produces the
//! same sequence of lines.
//!
//! No line-length limit is imposed beyond available memory; runaway input is
//! a stated non-goal of the stream contract.

/// Incremental splitter turning byte chunks into complete text lines.
#[derive(Debug, Default)]
pub struct LineFramer {
    buf: Vec<u8>,
}

impl LineFramer {
    /// Create an empty framer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `chunk` and return all complete lines now available.
    ///
    /// Splitting happens on the raw bytes before UTF-8 decoding, so a
    /// multi-byte character split across chunks is reassembled rather than
    /// mangled. Decoding is lossy: encoding noise becomes replacement
    /// characters instead of dropping the line. Empty and whitespace-only
    /// lines are dropped silently.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let rest = self.buf.split_off(pos + 1);
            let mut raw = std::mem::replace(&mut self.buf, rest);
            raw.pop(); // trailing '\n'
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim();
            if !line.is_empty() {
                lines.push(line.to_string());
            }
        }
        lines
    }

    /// Number of buffered bytes belonging to an incomplete trailing line.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_chunk_multiple_lines() {
        let mut framer = LineFramer::new();
        let lines = framer.feed(b"one\ntwo\nthree\n");
        assert_eq!(lines, vec!["one", "two", "three"]);
        assert_eq!(framer.pending(), 0);
    }

    #[test]
    fn partial_line_is_retained() {
        let mut framer = LineFramer::new();
        assert!(framer.feed(b"{\"model\":").is_empty());
        assert!(framer.feed(b"\"Nexus-TH\"}").is_empty());
        let lines = framer.feed(b"\n");
        assert_eq!(lines, vec!["{\"model\":\"Nexus-TH\"}"]);
    }

    #[test]
    fn blank_and_whitespace_lines_dropped() {
        let mut framer = LineFramer::new();
        let lines = framer.feed(b"\n   \n\t\nreal\n");
        assert_eq!(lines, vec!["real"]);
    }

    #[test]
    fn carriage_returns_are_trimmed() {
        let mut framer = LineFramer::new();
        let lines = framer.feed(b"line\r\n");
        assert_eq!(lines, vec!["line"]);
    }

    #[test]
    fn chunking_invariance() {
        let input: &[u8] = b"{\"a\":1}\n\n{\"b\":2}\r\npartial tail";
        let whole = LineFramer::new().feed(input);

        for size in 1..=input.len() {
            let mut framer = LineFramer::new();
            let mut chunked = Vec::new();
            for chunk in input.chunks(size) {
                chunked.extend(framer.feed(chunk));
            }
            assert_eq!(chunked, whole, "chunk size {}", size);
        }
    }

    #[test]
    fn multibyte_char_split_across_chunks() {
        // "22.5°C" with the two-byte '°' split between feeds.
        let bytes = "temp 22.5\u{b0}C\n".as_bytes();
        let split = bytes.len() - 3; // inside the '°' sequence
        let mut framer = LineFramer::new();
        let mut lines = framer.feed(&bytes[..split]);
        lines.extend(framer.feed(&bytes[split..]));
        assert_eq!(lines, vec!["temp 22.5\u{b0}C"]);
    }
}

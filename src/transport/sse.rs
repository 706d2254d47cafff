//! Server-Sent-Events line framing
//!
//! Bytes arrive in arbitrary network-sized pieces; [`LineBuffer`] turns them
//! into complete lines, and [`classify`] decides what a line means under the
//! `data:` prefix convention shared by every supported provider.

use crate::error::{ChatError, Result};

/// SSE field prefix carrying an event payload
pub const DATA_PREFIX: &str = "data:";

/// Longest line accepted from a stream, in bytes
pub const MAX_LINE_LENGTH: usize = 1024 * 1024;

/// Meaning of one SSE line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SseLine<'a> {
    /// A `data:` payload, prefix and surrounding whitespace removed
    Data(&'a str),
    /// The dialect's explicit end-of-stream sentinel
    Terminator,
    /// Blank lines, comments, other fields, and empty payloads
    Skip,
}

/// Classify a single line
///
/// # Arguments
///
/// * `line` - One line without its trailing newline
/// * `terminator` - Payload that marks the end of the stream, if the
///   dialect has one
///
/// # Examples
///
/// ```
/// use streamchat::transport::sse::{classify, SseLine};
///
/// assert_eq!(classify("data: {\"a\":1}", None), SseLine::Data("{\"a\":1}"));
/// assert_eq!(classify("data: [DONE]", Some("[DONE]")), SseLine::Terminator);
/// assert_eq!(classify(": keep-alive", None), SseLine::Skip);
/// ```
pub fn classify<'a>(line: &'a str, terminator: Option<&str>) -> SseLine<'a> {
    let line = line.trim_end_matches('\r');
    if line.trim().is_empty() || line.starts_with(':') {
        return SseLine::Skip;
    }

    let Some(payload) = line.strip_prefix(DATA_PREFIX) else {
        // event:, id:, retry: and unknown fields carry nothing we extract
        return SseLine::Skip;
    };

    let payload = payload.trim();
    if payload.is_empty() {
        return SseLine::Skip;
    }
    if terminator.is_some_and(|t| t == payload) {
        return SseLine::Terminator;
    }
    SseLine::Data(payload)
}

/// Accumulates raw bytes and yields complete lines
///
/// Bytes are buffered until a `\n` arrives, so multi-byte UTF-8 sequences
/// split across network reads are decoded intact. A line longer than
/// [`MAX_LINE_LENGTH`] is rejected.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    /// Create an empty buffer
    pub fn new() -> Self {
        Self::default()
    }

    /// Append bytes and drain every complete line
    ///
    /// # Errors
    ///
    /// Returns a request error if a line exceeds [`MAX_LINE_LENGTH`]; the
    /// buffer is cleared.
    ///
    /// # Examples
    ///
    /// ```
    /// use streamchat::transport::sse::LineBuffer;
    ///
    /// let mut buffer = LineBuffer::new();
    /// assert!(buffer.push(b"data: hel").unwrap().is_empty());
    /// assert_eq!(
    ///     buffer.push(b"lo\r\n\n").unwrap(),
    ///     vec!["data: hello".to_string(), String::new()]
    /// );
    /// ```
    pub fn push(&mut self, bytes: &[u8]) -> Result<Vec<String>> {
        self.pending.extend_from_slice(bytes);

        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            if pos > MAX_LINE_LENGTH {
                return Err(self.overflow());
            }
            let raw: Vec<u8> = self.pending.drain(..=pos).collect();
            lines.push(decode_line(&raw[..raw.len() - 1]));
        }
        if self.pending.len() > MAX_LINE_LENGTH {
            return Err(self.overflow());
        }
        Ok(lines)
    }

    fn overflow(&mut self) -> ChatError {
        self.pending.clear();
        ChatError::Request(format!(
            "stream line exceeds {} bytes",
            MAX_LINE_LENGTH
        ))
    }

    /// Flush a trailing line that was not newline-terminated
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let raw = std::mem::take(&mut self.pending);
        Some(decode_line(&raw))
    }
}

fn decode_line(raw: &[u8]) -> String {
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    String::from_utf8_lossy(raw).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_data_trims_prefix_and_whitespace() {
        assert_eq!(classify("data:{\"x\":1}", None), SseLine::Data("{\"x\":1}"));
        assert_eq!(classify("data:   hi  \r", None), SseLine::Data("hi"));
    }

    #[test]
    fn test_classify_skips_blank_comment_and_other_fields() {
        assert_eq!(classify("", None), SseLine::Skip);
        assert_eq!(classify("   ", None), SseLine::Skip);
        assert_eq!(classify(": ping", None), SseLine::Skip);
        assert_eq!(classify("event: message", None), SseLine::Skip);
        assert_eq!(classify("id: 7", None), SseLine::Skip);
        assert_eq!(classify("data:", None), SseLine::Skip);
    }

    #[test]
    fn test_classify_terminator_only_when_dialect_has_one() {
        assert_eq!(classify("data: [DONE]", Some("[DONE]")), SseLine::Terminator);
        assert_eq!(classify("data: [DONE]", None), SseLine::Data("[DONE]"));
    }

    #[test]
    fn test_line_buffer_handles_split_utf8() {
        let text = "data: héllo\n".as_bytes();
        let split = text.iter().position(|b| *b == 0xC3).unwrap() + 1;
        let mut buffer = LineBuffer::new();
        assert!(buffer.push(&text[..split]).unwrap().is_empty());
        assert_eq!(buffer.push(&text[split..]).unwrap(), vec!["data: héllo".to_string()]);
    }

    #[test]
    fn test_line_buffer_multiple_lines_in_one_push() {
        let mut buffer = LineBuffer::new();
        let lines = buffer.push(b"a\nb\r\nc").unwrap();
        assert_eq!(lines, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(buffer.finish(), Some("c".to_string()));
        assert_eq!(buffer.finish(), None);
    }

    #[test]
    fn test_line_buffer_rejects_unterminated_oversized_line() {
        let mut buffer = LineBuffer::new();
        let chunk = vec![b'x'; 64 * 1024];
        let mut result = Ok(Vec::new());
        for _ in 0..(MAX_LINE_LENGTH / chunk.len() + 1) {
            result = buffer.push(&chunk);
            if result.is_err() {
                break;
            }
        }
        assert!(matches!(result, Err(ChatError::Request(_))));
        assert_eq!(buffer.finish(), None);
    }

    #[test]
    fn test_line_buffer_rejects_oversized_terminated_line() {
        let mut buffer = LineBuffer::new();
        let mut chunk = vec![b'x'; MAX_LINE_LENGTH + 1];
        chunk.push(b'\n');
        assert!(matches!(buffer.push(&chunk), Err(ChatError::Request(_))));
        assert_eq!(buffer.push(b"ok\n").unwrap(), vec!["ok".to_string()]);
    }
}

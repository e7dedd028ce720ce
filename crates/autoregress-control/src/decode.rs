//! Incremental decoding of the newline-delimited event stream.
//!
//! Pipe reads arrive in arbitrary chunks, so a protocol line can be split
//! across reads or several lines can land in one read. [`LineDecoder`]
//! reassembles complete lines; [`parse_event`] turns one line into a protocol
//! event, tolerating unknown fields and rejecting garbage.

use autoregress_engine::events::Event;
use tracing::warn;

/// Buffers raw pipe bytes and yields complete lines.
#[derive(Debug, Default)]
pub struct LineDecoder {
    buf: Vec<u8>,
}

impl LineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and get every line completed by it, in order.
    ///
    /// Trailing `\r` is stripped so CRLF output decodes the same as LF.
    /// Non-UTF-8 bytes are replaced rather than dropped.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let mut line: Vec<u8> = self.buf.drain(..=pos).collect();
            line.pop(); // the newline
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            lines.push(String::from_utf8_lossy(&line).into_owned());
        }
        lines
    }

    /// Drain whatever is buffered after EOF as a final, unterminated line.
    pub fn finish(&mut self) -> Option<String> {
        if self.buf.is_empty() {
            return None;
        }
        let line = String::from_utf8_lossy(&self.buf).into_owned();
        self.buf.clear();
        Some(line)
    }
}

/// Parse one stdout line into a protocol event.
///
/// Returns `None` for blank lines and anything that is not a protocol
/// object; a worker writing garbage to stdout must not crash the controller.
pub fn parse_event(line: &str) -> Option<Event> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }
    match serde_json::from_str(trimmed) {
        Ok(event) => Some(event),
        Err(e) => {
            warn!("ignoring malformed protocol line: {e}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use autoregress_engine::events::LogLevel;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_line_split_across_pushes() {
        let mut decoder = LineDecoder::new();
        assert!(decoder.push(b"{\"event\":\"log\",").is_empty());
        let lines = decoder.push(b"\"level\":\"INFO\",\"message\":\"hi\"}\n");
        assert_eq!(lines.len(), 1);
        let event = parse_event(&lines[0]).unwrap();
        assert_eq!(
            event,
            Event::Log {
                level: LogLevel::Info,
                message: "hi".to_string()
            }
        );
    }

    #[test]
    fn test_multiple_lines_in_one_chunk() {
        let mut decoder = LineDecoder::new();
        let lines = decoder.push(b"one\ntwo\nthree");
        assert_eq!(lines, vec!["one".to_string(), "two".to_string()]);
        assert_eq!(decoder.finish(), Some("three".to_string()));
        assert_eq!(decoder.finish(), None);
    }

    #[test]
    fn test_crlf_stripped() {
        let mut decoder = LineDecoder::new();
        let lines = decoder.push(b"alpha\r\nbeta\r\n");
        assert_eq!(lines, vec!["alpha".to_string(), "beta".to_string()]);
    }

    #[test]
    fn test_parse_event_rejects_garbage() {
        assert_eq!(parse_event(""), None);
        assert_eq!(parse_event("   "), None);
        assert_eq!(parse_event("Traceback (most recent call last):"), None);
        assert_eq!(parse_event(r#"{"event":"unknown_kind"}"#), None);
    }

    #[test]
    fn test_parse_event_ignores_extra_fields() {
        let event = parse_event(r#"{"event":"model_started","name":"SVR","extra":1}"#).unwrap();
        assert_eq!(
            event,
            Event::ModelStarted {
                name: "SVR".to_string()
            }
        );
    }
}

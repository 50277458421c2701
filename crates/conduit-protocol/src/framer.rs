//! Message boundary recovery for byte streams
//!
//! The wire carries bare JSON values back to back. [`Framer`] accepts read
//! chunks as they arrive and yields every message that has become complete.

use crate::protocol::Message;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// How read chunks map onto messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FramingPolicy {
    /// Parse values as soon as they complete, regardless of chunk boundaries
    #[default]
    Incremental,
    /// Every read event holds exactly one message.
    ///
    /// Only correct for transports that never split or coalesce writes.
    PerEvent,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    /// The buffered bytes can never become valid JSON
    #[error("malformed message: {0}")]
    Syntax(String),

    /// A complete top-level value that is neither an object nor an array
    #[error("top-level value is not a message: {0}")]
    NotAMessage(String),
}

#[derive(Debug)]
pub struct Framer {
    policy: FramingPolicy,
    buffer: Vec<u8>,
    scan: Scan,
}

impl Framer {
    pub fn new(policy: FramingPolicy) -> Self {
        Self {
            policy,
            buffer: Vec::new(),
            scan: Scan::default(),
        }
    }

    pub fn policy(&self) -> FramingPolicy {
        self.policy
    }

    /// Feed one read chunk, returning the messages it completed in order
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Result<Message, FrameError>> {
        match self.policy {
            FramingPolicy::Incremental => self.push_incremental(chunk),
            FramingPolicy::PerEvent => Self::push_event(chunk),
        }
    }

    /// Number of bytes held back waiting for the rest of a message
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Drop any partial message. Called when the connection goes away.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.scan = Scan::default();
    }

    /// Each byte is scanned once; only complete values reach `serde_json`.
    fn push_incremental(&mut self, chunk: &[u8]) -> Vec<Result<Message, FrameError>> {
        self.buffer.extend_from_slice(chunk);

        let mut frames = Vec::new();
        let mut consumed = 0;
        while let Some(boundary) = self.scan.next_boundary(&self.buffer) {
            let frame = match boundary {
                Boundary::Value { start, end } => {
                    consumed = end;
                    serde_json::from_slice::<Value>(&self.buffer[start..end])
                        .map_err(|e| FrameError::Syntax(e.to_string()))
                        .and_then(into_message)
                }
                Boundary::Stray(byte) => Err(FrameError::Syntax(format!(
                    "unexpected `{}` outside a value",
                    byte as char
                ))),
            };

            // Invalid JSON cannot be resynchronised, so everything buffered goes
            let unrecoverable = matches!(frame, Err(FrameError::Syntax(_)));
            frames.push(frame);
            if unrecoverable {
                self.reset();
                return frames;
            }
        }

        if !self.scan.in_value() {
            consumed = self.buffer.len();
        }
        self.buffer.drain(..consumed);
        self.scan.shift(consumed);
        frames
    }

    fn push_event(chunk: &[u8]) -> Vec<Result<Message, FrameError>> {
        if chunk.iter().all(u8::is_ascii_whitespace) {
            return Vec::new();
        }
        let frame = serde_json::from_slice::<Value>(chunk)
            .map_err(|e| FrameError::Syntax(e.to_string()))
            .and_then(into_message);
        vec![frame]
    }
}

fn into_message(value: Value) -> Result<Message, FrameError> {
    match value {
        Value::Object(_) | Value::Array(_) => Ok(Message::new(value)),
        other => Err(FrameError::NotAMessage(other.to_string())),
    }
}

/// Where a scan stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Boundary {
    /// A complete top-level value occupies `start..end`
    Value { start: usize, end: usize },
    /// A closing bracket with nothing open
    Stray(u8),
}

/// Structural scan over buffered bytes, resumable across chunks
#[derive(Debug, Default)]
struct Scan {
    /// Next byte to examine
    pos: usize,
    /// Start of the value under scan
    start: Option<usize>,
    depth: usize,
    in_string: bool,
    escaped: bool,
}

impl Scan {
    fn in_value(&self) -> bool {
        self.start.is_some()
    }

    /// Advance over `buf` until the next top-level value ends
    fn next_boundary(&mut self, buf: &[u8]) -> Option<Boundary> {
        while self.pos < buf.len() {
            let byte = buf[self.pos];

            let Some(start) = self.start else {
                self.pos += 1;
                match byte {
                    b'{' | b'[' => {
                        self.start = Some(self.pos - 1);
                        self.depth = 1;
                    }
                    b'"' => {
                        self.start = Some(self.pos - 1);
                        self.in_string = true;
                    }
                    b'}' | b']' => return Some(Boundary::Stray(byte)),
                    b if b.is_ascii_whitespace() => {}
                    // Number, literal or garbage; serde_json sorts it out
                    _ => self.start = Some(self.pos - 1),
                }
                continue;
            };

            if self.in_string {
                self.pos += 1;
                if self.escaped {
                    self.escaped = false;
                } else if byte == b'\\' {
                    self.escaped = true;
                } else if byte == b'"' {
                    self.in_string = false;
                    if self.depth == 0 {
                        return Some(self.finish(start));
                    }
                }
                continue;
            }

            if self.depth == 0 {
                // Bare scalar: ends before the next delimiter, which is left unread
                if byte.is_ascii_whitespace() || matches!(byte, b'{' | b'[' | b'}' | b']' | b'"') {
                    return Some(self.finish(start));
                }
                self.pos += 1;
                continue;
            }

            self.pos += 1;
            match byte {
                b'"' => self.in_string = true,
                b'{' | b'[' => self.depth += 1,
                b'}' | b']' => {
                    self.depth -= 1;
                    if self.depth == 0 {
                        return Some(self.finish(start));
                    }
                }
                _ => {}
            }
        }
        None
    }

    fn finish(&mut self, start: usize) -> Boundary {
        self.start = None;
        Boundary::Value {
            start,
            end: self.pos,
        }
    }

    /// Rebase offsets after `n` bytes were drained from the front
    fn shift(&mut self, n: usize) {
        self.pos -= n;
        if let Some(start) = self.start.as_mut() {
            *start -= n;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::RequestId;
    use serde_json::json;

    fn ids(frames: Vec<Result<Message, FrameError>>) -> Vec<Option<RequestId>> {
        frames.into_iter().map(|f| f.unwrap().id()).collect()
    }

    #[test]
    fn test_two_messages_in_one_chunk() {
        let mut framer = Framer::new(FramingPolicy::Incremental);
        let frames = framer.push(br#"{"id":1,"result":"a"}{"id":2,"result":"b"}"#);

        assert_eq!(ids(frames), vec![Some(RequestId::Number(1)), Some(RequestId::Number(2))]);
        assert_eq!(framer.buffered(), 0);
    }

    #[test]
    fn test_one_message_split_across_three_chunks() {
        let mut framer = Framer::new(FramingPolicy::Incremental);

        assert!(framer.push(br#"{"id":"A","#).is_empty());
        assert!(framer.push(br#""result":[1,"#).is_empty());
        assert!(framer.buffered() > 0);

        let frames = framer.push(br#"2]}"#);
        assert_eq!(frames.len(), 1);
        let msg = frames.into_iter().next().unwrap().unwrap();
        assert_eq!(msg.id(), Some("A".into()));
        assert_eq!(msg.result(), Some(&json!([1, 2])));
        assert_eq!(framer.buffered(), 0);
    }

    #[test]
    fn test_complete_message_followed_by_partial() {
        let mut framer = Framer::new(FramingPolicy::Incremental);

        let frames = framer.push(b"{\"id\":1}\n{\"id\":");
        assert_eq!(ids(frames), vec![Some(RequestId::Number(1))]);
        assert_eq!(framer.buffered(), b"\n{\"id\":".len());

        let frames = framer.push(b"2}\n");
        assert_eq!(ids(frames), vec![Some(RequestId::Number(2))]);
        assert_eq!(framer.buffered(), 0);
    }

    #[test]
    fn test_multibyte_character_split_between_chunks() {
        let text = "{\"id\":5,\"result\":\"h\u{e9}llo\"}".as_bytes();
        let split = text.iter().position(|b| *b == 0xc3).unwrap() + 1;

        let mut framer = Framer::new(FramingPolicy::Incremental);
        assert!(framer.push(&text[..split]).is_empty());
        let frames = framer.push(&text[split..]);

        let msg = frames.into_iter().next().unwrap().unwrap();
        assert_eq!(msg.result(), Some(&json!("h\u{e9}llo")));
    }

    #[test]
    fn test_batch_array_is_one_message() {
        let mut framer = Framer::new(FramingPolicy::Incremental);
        let frames = framer.push(br#"[{"id":9,"result":1},{"id":10,"result":2}]"#);

        assert_eq!(frames.len(), 1);
        let msg = frames.into_iter().next().unwrap().unwrap();
        assert!(msg.is_batch());
        assert_eq!(msg.id(), Some(RequestId::Number(9)));
    }

    #[test]
    fn test_syntax_error_discards_buffer_and_recovers() {
        let mut framer = Framer::new(FramingPolicy::Incremental);

        let frames = framer.push(br#"{"id":1}{"id":}"#);
        assert_eq!(frames.len(), 2);
        assert!(frames[0].is_ok());
        assert!(matches!(frames[1], Err(FrameError::Syntax(_))));
        assert_eq!(framer.buffered(), 0);

        let frames = framer.push(br#"{"id":2}"#);
        assert_eq!(ids(frames), vec![Some(RequestId::Number(2))]);
    }

    #[test]
    fn test_scalar_top_level_value_rejected() {
        let mut framer = Framer::new(FramingPolicy::Incremental);
        let frames = framer.push(b"\"hello\" {\"id\":3}");

        assert!(matches!(frames[0], Err(FrameError::NotAMessage(_))));
        assert_eq!(frames[1].as_ref().unwrap().id(), Some(RequestId::Number(3)));
    }

    #[test]
    fn test_brackets_inside_strings_do_not_end_message() {
        let mut framer = Framer::new(FramingPolicy::Incremental);

        assert!(framer.push(br#"{"id":1,"result":"}]\"#).is_empty());
        let frames = framer.push(br#""{"}"#);

        let msg = frames.into_iter().next().unwrap().unwrap();
        assert_eq!(msg.result(), Some(&json!("}]\"{")));
        assert_eq!(framer.buffered(), 0);
    }

    #[test]
    fn test_large_message_in_small_chunks() {
        let payload = "x".repeat(4 * 1024 * 1024);
        let text = format!(r#"{{"id":1,"result":"{}"}}"#, payload);
        let chunks: Vec<&[u8]> = text.as_bytes().chunks(8 * 1024).collect();
        let (last, rest) = chunks.split_last().unwrap();

        let mut framer = Framer::new(FramingPolicy::Incremental);
        for chunk in rest {
            assert!(framer.push(chunk).is_empty());
        }
        let frames = framer.push(last);

        assert_eq!(frames.len(), 1);
        let msg = frames.into_iter().next().unwrap().unwrap();
        assert_eq!(msg.result().and_then(Value::as_str).map(str::len), Some(payload.len()));
        assert_eq!(framer.buffered(), 0);
    }

    #[test]
    fn test_stray_closing_bracket_is_syntax_error() {
        let mut framer = Framer::new(FramingPolicy::Incremental);
        let frames = framer.push(b"} {\"id\":1}");

        assert_eq!(frames.len(), 1);
        assert!(matches!(frames[0], Err(FrameError::Syntax(_))));
        assert_eq!(framer.buffered(), 0);
        assert_eq!(ids(framer.push(br#"{"id":2}"#)), vec![Some(RequestId::Number(2))]);
    }

    #[test]
    fn test_reset_drops_partial_message() {
        let mut framer = Framer::new(FramingPolicy::Incremental);
        framer.push(br#"{"id":1,"res"#);
        assert!(framer.buffered() > 0);

        framer.reset();
        assert_eq!(framer.buffered(), 0);
        assert_eq!(ids(framer.push(br#"{"id":4}"#)), vec![Some(RequestId::Number(4))]);
    }

    #[test]
    fn test_per_event_treats_chunk_as_message() {
        let mut framer = Framer::new(FramingPolicy::PerEvent);

        let frames = framer.push(br#"{"id":1,"result":true}"#);
        assert_eq!(ids(frames), vec![Some(RequestId::Number(1))]);
        assert!(framer.push(b"  \n").is_empty());
        assert_eq!(framer.buffered(), 0);
    }

    #[test]
    fn test_per_event_cannot_handle_coalesced_messages() {
        let mut framer = Framer::new(FramingPolicy::PerEvent);
        let frames = framer.push(br#"{"id":1}{"id":2}"#);

        assert_eq!(frames.len(), 1);
        assert!(matches!(frames[0], Err(FrameError::Syntax(_))));
    }

    #[test]
    fn test_policy_deserializes_snake_case() {
        let policy: FramingPolicy = serde_json::from_str("\"per_event\"").unwrap();
        assert_eq!(policy, FramingPolicy::PerEvent);
        assert_eq!(FramingPolicy::default(), FramingPolicy::Incremental);
    }
}

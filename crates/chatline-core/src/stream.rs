//! Incremental decoding of a streamed chat reply.
//!
//! Bytes arrive in arbitrary chunks: a multi-byte character or a `data:`
//! record may straddle two chunks, so both the UTF-8 decoder and the line
//! splitter keep a carry-over buffer between calls.

use serde::{Deserialize, Serialize};
use tracing::debug;

/// How the body of a streamed response is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamProtocol {
    /// Newline-delimited `data: {"delta": ...}` / `data: {"error": ...}` records.
    #[default]
    DataLines,
    /// Every decoded byte is assistant text.
    RawText,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    Delta(String),
    Error(String),
}

#[derive(Deserialize)]
struct Record {
    delta: Option<String>,
    error: Option<String>,
}

/// Streaming UTF-8 decoder that holds back incomplete trailing sequences.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn decode(&mut self, chunk: &[u8]) -> String {
        self.pending.extend_from_slice(chunk);
        let mut out = String::new();

        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(text) => {
                    out.push_str(text);
                    self.pending.clear();
                    break;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    out.push_str(&String::from_utf8_lossy(&self.pending[..valid]));
                    match e.error_len() {
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            self.pending.drain(..valid + len);
                        }
                        None => {
                            // Incomplete sequence at the end: wait for more bytes.
                            self.pending.drain(..valid);
                            break;
                        }
                    }
                }
            }
        }

        out
    }

    /// Flush whatever is left at end of stream.
    pub fn finish(&mut self) -> String {
        let rest = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        rest
    }
}

/// Turns raw body chunks into [`StreamEvent`]s.
#[derive(Debug)]
pub struct RecordDecoder {
    protocol: StreamProtocol,
    utf8: Utf8Decoder,
    line: String,
}

impl RecordDecoder {
    pub fn new(protocol: StreamProtocol) -> Self {
        Self {
            protocol,
            utf8: Utf8Decoder::new(),
            line: String::new(),
        }
    }

    pub fn push(&mut self, chunk: &[u8]) -> Vec<StreamEvent> {
        let text = self.utf8.decode(chunk);
        self.feed(text)
    }

    /// Drain buffered bytes and any unterminated final record.
    pub fn finish(&mut self) -> Vec<StreamEvent> {
        let text = self.utf8.finish();
        let mut events = self.feed(text);
        if self.protocol == StreamProtocol::DataLines && !self.line.is_empty() {
            let line = std::mem::take(&mut self.line);
            events.extend(parse_record(&line));
        }
        events
    }

    fn feed(&mut self, text: String) -> Vec<StreamEvent> {
        if text.is_empty() {
            return Vec::new();
        }
        match self.protocol {
            StreamProtocol::RawText => vec![StreamEvent::Delta(text)],
            StreamProtocol::DataLines => {
                self.line.push_str(&text);
                let mut events = Vec::new();
                while let Some(pos) = self.line.find('\n') {
                    let line: String = self.line.drain(..=pos).collect();
                    events.extend(parse_record(&line));
                }
                events
            }
        }
    }
}

/// Parse one `data:` line. Anything else, including malformed JSON and
/// records with neither field, yields `None`.
pub fn parse_record(line: &str) -> Option<StreamEvent> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let Some(payload) = line.strip_prefix("data:") else {
        debug!(line, "skipping non-data line");
        return None;
    };

    match serde_json::from_str::<Record>(payload.trim()) {
        Ok(Record {
            error: Some(error), ..
        }) => Some(StreamEvent::Error(error)),
        Ok(Record {
            delta: Some(delta), ..
        }) => Some(StreamEvent::Delta(delta)),
        Ok(_) => None,
        Err(e) => {
            debug!(error = %e, "skipping malformed record");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn delta(s: &str) -> StreamEvent {
        StreamEvent::Delta(s.to_string())
    }

    #[test]
    fn test_parse_record_variants() {
        assert_eq!(parse_record(r#"data: {"delta":"He"}"#), Some(delta("He")));
        assert_eq!(
            parse_record("data: {\"error\":\"rate limited\"}\r\n"),
            Some(StreamEvent::Error("rate limited".to_string()))
        );
        assert_eq!(parse_record(r#"data:{"delta":""}"#), Some(delta("")));
        assert_eq!(parse_record("data: [DONE]"), None);
        assert_eq!(parse_record("data: {not json"), None);
        assert_eq!(parse_record(r#"data: {"other":1}"#), None);
        assert_eq!(parse_record("event: ping"), None);
        assert_eq!(parse_record(""), None);
    }

    #[test]
    fn test_error_wins_over_delta_in_same_record() {
        assert_eq!(
            parse_record(r#"data: {"delta":"x","error":"boom"}"#),
            Some(StreamEvent::Error("boom".to_string()))
        );
    }

    #[test]
    fn test_records_split_across_chunks() {
        let mut decoder = RecordDecoder::new(StreamProtocol::DataLines);
        assert!(decoder.push(b"data: {\"del").is_empty());
        assert_eq!(decoder.push(b"ta\":\"He\"}\ndata: {\"delta\""), vec![delta("He")]);
        assert_eq!(decoder.push(b":\"llo\"}\n"), vec![delta("llo")]);
        assert!(decoder.finish().is_empty());
    }

    #[test]
    fn test_unterminated_final_record_is_flushed() {
        let mut decoder = RecordDecoder::new(StreamProtocol::DataLines);
        assert!(decoder.push(br#"data: {"delta":"end"}"#).is_empty());
        assert_eq!(decoder.finish(), vec![delta("end")]);
    }

    #[test]
    fn test_malformed_lines_do_not_stop_decoding() {
        let mut decoder = RecordDecoder::new(StreamProtocol::DataLines);
        let events = decoder.push(b"data: {oops\n\ndata: {\"delta\":\"ok\"}\n");
        assert_eq!(events, vec![delta("ok")]);
    }

    #[test]
    fn test_utf8_sequence_split_across_chunks() {
        let bytes = "é😀".as_bytes();
        let mut decoder = Utf8Decoder::new();
        assert_eq!(decoder.decode(&bytes[..1]), "");
        assert_eq!(decoder.decode(&bytes[1..4]), "é");
        assert_eq!(decoder.decode(&bytes[4..]), "😀");
        assert_eq!(decoder.finish(), "");
    }

    #[test]
    fn test_invalid_bytes_become_replacement_chars() {
        let mut decoder = Utf8Decoder::new();
        assert_eq!(decoder.decode(b"a\xffb"), "a\u{fffd}b");
        assert_eq!(decoder.decode(b"\xe2\x82"), "");
        assert_eq!(decoder.finish(), "\u{fffd}");
    }

    #[test]
    fn test_raw_text_protocol_passes_text_through() {
        let mut decoder = RecordDecoder::new(StreamProtocol::RawText);
        assert_eq!(decoder.push(b"data: not parsed\n"), vec![delta("data: not parsed\n")]);
        assert_eq!(decoder.push("caf\u{e9}".as_bytes()), vec![delta("café")]);
        assert!(decoder.finish().is_empty());
    }

    #[test]
    fn test_protocol_serde_names() {
        assert_eq!(
            serde_json::to_string(&StreamProtocol::DataLines).unwrap(),
            "\"data_lines\""
        );
        let raw: StreamProtocol = serde_json::from_str("\"raw_text\"").unwrap();
        assert_eq!(raw, StreamProtocol::RawText);
    }
}

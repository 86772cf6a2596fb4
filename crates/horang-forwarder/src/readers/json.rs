//! JSON documents and newline-delimited JSON
//!
//! The offset counts records consumed. A document that is a top-level array
//! contributes one record per element, a top-level object contributes one
//! record. Otherwise the content is treated as NDJSON: every complete line
//! must hold a JSON object, and a trailing fragment that does not parse yet is
//! left for the next cycle.
//!
//! A document that opens with `[` or `{` and ends before it closes is a write
//! in progress: it is recognised as JSON but yields nothing until complete.

use horang_common::{FileOffset, Record};
use serde_json::Value;

use super::{split_complete, IncrementalReader, ReadOutcome};
use crate::detect::FileFormat;

#[derive(Debug, Clone, Copy, Default)]
pub struct JsonReader;

enum Parsed {
    Values(Vec<Value>),
    /// A single document still being written
    Incomplete,
}

impl JsonReader {
    /// Every record currently in the content, or `None` if it is not JSON
    fn parse(content: &[u8]) -> Option<Parsed> {
        let text = std::str::from_utf8(content).ok()?;
        let trimmed = text.trim_start();
        if trimmed.is_empty() {
            return None;
        }

        match serde_json::from_str::<Value>(text) {
            Ok(Value::Array(items)) => return Some(Parsed::Values(items)),
            Ok(value @ Value::Object(_)) => return Some(Parsed::Values(vec![value])),
            Ok(_) => return None,
            Err(e) if e.is_eof() && trimmed.starts_with(['[', '{']) => {
                return Some(Parsed::Incomplete)
            },
            Err(_) => {},
        }

        Self::parse_lines(content).map(Parsed::Values)
    }

    fn parse_lines(content: &[u8]) -> Option<Vec<Value>> {
        let (complete, fragment) = split_complete(content);
        let mut values = Vec::new();

        for line in complete.split(|&b| b == b'\n') {
            let line = trim_ascii(line);
            if line.is_empty() {
                continue;
            }
            match serde_json::from_slice::<Value>(line) {
                Ok(value @ Value::Object(_)) => values.push(value),
                _ => return None,
            }
        }

        // A fragment that parses is a final line without a newline; one that
        // does not is still being written.
        let fragment = trim_ascii(fragment);
        if !fragment.is_empty() {
            if let Ok(value @ Value::Object(_)) = serde_json::from_slice::<Value>(fragment) {
                values.push(value);
            }
        }

        (!values.is_empty()).then_some(values)
    }
}

fn trim_ascii(bytes: &[u8]) -> &[u8] {
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    let end = bytes
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(start, |idx| idx + 1);
    &bytes[start..end]
}

fn into_record(value: Value) -> Record {
    match value {
        Value::Object(map) => map,
        other => {
            let mut record = Record::new();
            record.insert("value".to_string(), other);
            record
        },
    }
}

impl IncrementalReader for JsonReader {
    fn format(&self) -> FileFormat {
        FileFormat::Json
    }

    fn accepts(&self, content: &[u8]) -> bool {
        Self::parse(content).is_some()
    }

    fn read(&self, content: &[u8], offset: u64) -> ReadOutcome {
        let values = match Self::parse(content) {
            Some(Parsed::Values(values)) => values,
            Some(Parsed::Incomplete) => return ReadOutcome::unchanged(offset),
            None => return ReadOutcome::rejected(),
        };

        let total = values.len() as u64;
        if offset >= total {
            return ReadOutcome::unchanged(offset);
        }

        let records = values
            .into_iter()
            .skip(offset as usize)
            .map(into_record)
            .collect();

        ReadOutcome::new(records, FileOffset::Resume(total))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_array_from_start() {
        let content = br#"[{"id": 1}, {"id": 2}, {"id": 3}]"#;
        let outcome = JsonReader.read(content, 0);

        assert_eq!(outcome.records.len(), 3);
        assert_eq!(outcome.records[0]["id"], json!(1));
        assert_eq!(outcome.next, FileOffset::Resume(3));
    }

    #[test]
    fn test_resume_returns_only_new_records() {
        let content = b"{\"id\":1}\n{\"id\":2}\n{\"id\":3}\n";
        let outcome = JsonReader.read(content, 2);

        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.records[0]["id"], json!(3));
        assert_eq!(outcome.next, FileOffset::Resume(3));
    }

    #[test]
    fn test_offset_at_end_is_noop() {
        let content = br#"[{"id": 1}]"#;
        assert_eq!(JsonReader.read(content, 1), ReadOutcome::unchanged(1));
    }

    #[test]
    fn test_single_object_document() {
        let outcome = JsonReader.read(br#"{"user": "kim", "ip": "1.1.1.1"}"#, 0);
        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.records[0]["user"], json!("kim"));
    }

    #[test]
    fn test_field_order_is_preserved() {
        let outcome = JsonReader.read(br#"{"zeta": 1, "alpha": 2, "mid": 3}"#, 0);
        let keys: Vec<_> = outcome.records[0].keys().cloned().collect();
        assert_eq!(keys, vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn test_scalar_elements_are_wrapped() {
        let outcome = JsonReader.read(br#"["a", 2]"#, 0);
        assert_eq!(outcome.records[0]["value"], json!("a"));
        assert_eq!(outcome.records[1]["value"], json!(2));
    }

    #[test]
    fn test_partial_trailing_line_is_held_back() {
        let content = b"{\"id\":1}\n{\"id\":2}\n{\"id\":";
        let outcome = JsonReader.read(content, 0);
        assert_eq!(outcome.records.len(), 2);
        assert_eq!(outcome.next, FileOffset::Resume(2));
    }

    #[test]
    fn test_final_line_without_newline_is_read() {
        let outcome = JsonReader.read(b"{\"id\":1}\n{\"id\":2}", 0);
        assert_eq!(outcome.records.len(), 2);
    }

    #[test]
    fn test_unterminated_document_waits() {
        let content = b"[\n  {\"id\": 1},\n  {\"id\": 2},\n  {\"id\":";
        assert!(JsonReader.accepts(content));
        assert_eq!(JsonReader.read(content, 0), ReadOutcome::unchanged(0));

        let done = b"[\n  {\"id\": 1},\n  {\"id\": 2},\n  {\"id\": 3}\n]\n";
        assert_eq!(JsonReader.read(done, 0).records.len(), 3);
    }

    #[test]
    fn test_bracketed_log_line_is_not_json() {
        assert!(!JsonReader.accepts(b"[2024-05-01 10:00:00] INFO started\n"));
        assert!(!JsonReader.accepts(b"[INFO] listening\n"));
    }

    #[test]
    fn test_not_json() {
        assert!(!JsonReader.accepts(b"plain text line\n"));
        assert!(!JsonReader.accepts(b"42"));
        assert!(!JsonReader.accepts(b""));
        assert!(!JsonReader.accepts(b"{\"ok\":1}\nnot json\n"));
        assert!(JsonReader.read(b"not json at all\n", 0).is_rejected());
    }
}

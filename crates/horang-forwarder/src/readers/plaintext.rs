//! Line-oriented plaintext logs
//!
//! The offset is a byte position. Only newline-terminated lines are consumed,
//! so a line still being written is picked up whole on a later cycle.
//!
//! Detection requires UTF-8 without NUL bytes. Once a file is tracked, later
//! regions are decoded lossily: a stray Latin-1 byte in one line must not
//! drop the rest of the log.

use horang_common::{FileOffset, Record};
use serde_json::Value;

use super::{split_complete, IncrementalReader, ReadOutcome};
use crate::detect::FileFormat;

/// Field holding the raw line
pub const MESSAGE_FIELD: &str = "message";

#[derive(Debug, Clone, Copy, Default)]
pub struct PlaintextReader;

impl PlaintextReader {
    /// Wrap one line, lifting `key=value` tokens into fields
    pub fn parse_line(line: &str) -> Record {
        let mut record = Record::new();
        record.insert(MESSAGE_FIELD.to_string(), Value::String(line.to_string()));

        for token in line.split_whitespace() {
            let Some((key, value)) = token.split_once('=') else {
                continue;
            };
            if !is_field_name(key) || key == MESSAGE_FIELD || record.contains_key(key) {
                continue;
            }
            let value = value.trim_matches(|c| c == '"' || c == '\'');
            record.insert(key.to_string(), Value::String(value.to_string()));
        }

        record
    }

    /// Records from `unread`, the bytes that start at `offset`
    pub fn read_region(unread: &[u8], offset: u64) -> ReadOutcome {
        let (complete, _) = split_complete(unread);
        if complete.is_empty() {
            return ReadOutcome::unchanged(offset);
        }

        let records = String::from_utf8_lossy(complete)
            .lines()
            .map(|line| line.trim_end_matches('\r'))
            .filter(|line| !line.trim().is_empty())
            .map(Self::parse_line)
            .collect();

        ReadOutcome::new(records, FileOffset::Resume(offset + complete.len() as u64))
    }
}

fn is_field_name(key: &str) -> bool {
    !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

fn is_text(content: &[u8]) -> bool {
    if content.contains(&0) {
        return false;
    }
    match std::str::from_utf8(content) {
        Ok(_) => true,
        // A multi-byte character cut off at the end is a write in progress
        Err(e) => e.error_len().is_none(),
    }
}

impl IncrementalReader for PlaintextReader {
    fn format(&self) -> FileFormat {
        FileFormat::PlaintextLog
    }

    fn accepts(&self, content: &[u8]) -> bool {
        is_text(content)
    }

    fn read(&self, content: &[u8], offset: u64) -> ReadOutcome {
        match usize::try_from(offset).ok().and_then(|start| content.get(start..)) {
            Some(unread) => Self::read_region(unread, offset),
            None => ReadOutcome::unchanged(offset),
        }
    }
}

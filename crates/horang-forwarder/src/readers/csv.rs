//! CSV with a header row
//!
//! The offset counts data rows consumed. Every row must have exactly as many
//! fields as the header and the header needs at least two columns, otherwise
//! the content is not treated as CSV. A trailing row without a newline is read
//! only if it already has the full width and no quoted field is left open.

use horang_common::{FileOffset, Record};
use serde_json::Value;

use super::{IncrementalReader, ReadOutcome};
use crate::detect::FileFormat;

#[derive(Debug, Clone, Copy, Default)]
pub struct CsvReader;

struct Table {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl CsvReader {
    fn parse(content: &[u8]) -> Option<Table> {
        std::str::from_utf8(content).ok()?;

        let (complete, fragment, open_quote) = split_rows(content);
        let (complete, fragment) = if complete.is_empty() && !open_quote {
            (fragment, &[][..])
        } else {
            (complete, fragment)
        };

        let mut reader = ::csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(false)
            .from_reader(complete);

        let headers: Vec<String> = reader
            .headers()
            .ok()?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();
        if headers.len() < 2 || headers.iter().any(|h| h.is_empty()) {
            return None;
        }

        let mut rows = Vec::new();
        for row in reader.records() {
            rows.push(row.ok()?.iter().map(str::to_string).collect::<Vec<_>>());
        }

        if !fragment.is_empty() && !open_quote {
            let mut tail = ::csv::ReaderBuilder::new()
                .has_headers(false)
                .from_reader(fragment);
            if let Some(Ok(row)) = tail.records().next() {
                if row.len() == headers.len() {
                    rows.push(row.iter().map(str::to_string).collect());
                }
            }
        }

        Some(Table { headers, rows })
    }
}

/// Split after the last newline outside a quoted field
///
/// The flag reports whether the content ends inside an open quote.
fn split_rows(content: &[u8]) -> (&[u8], &[u8], bool) {
    let mut in_quotes = false;
    let mut boundary = None;

    for (idx, &byte) in content.iter().enumerate() {
        match byte {
            b'"' => in_quotes = !in_quotes,
            b'\n' if !in_quotes => boundary = Some(idx + 1),
            _ => {},
        }
    }

    let (complete, fragment) = match boundary {
        Some(idx) => content.split_at(idx),
        None => (&content[..0], content),
    };
    (complete, fragment, in_quotes)
}

impl IncrementalReader for CsvReader {
    fn format(&self) -> FileFormat {
        FileFormat::Csv
    }

    fn accepts(&self, content: &[u8]) -> bool {
        Self::parse(content).is_some()
    }

    fn read(&self, content: &[u8], offset: u64) -> ReadOutcome {
        let Some(table) = Self::parse(content) else {
            return ReadOutcome::rejected();
        };

        let total = table.rows.len() as u64;
        if offset >= total {
            return ReadOutcome::unchanged(offset);
        }

        let records = table
            .rows
            .into_iter()
            .skip(offset as usize)
            .map(|row| {
                table
                    .headers
                    .iter()
                    .cloned()
                    .zip(row.into_iter().map(Value::String))
                    .collect::<Record>()
            })
            .collect();

        ReadOutcome::new(records, FileOffset::Resume(total))
    }
}

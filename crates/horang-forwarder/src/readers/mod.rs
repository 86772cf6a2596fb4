//! Incremental readers, one per supported format
//!
//! A reader takes the current content of a file and the offset recorded after
//! the previous cycle, and returns only the records added since then together
//! with the offset to resume from next time.
//!
//! A file is classified once, on the first cycle that finds it non-blank. The
//! format is then pinned and later cycles go straight to that reader, so an
//! offset is always interpreted in the unit it was recorded in.
//!
//! # Contract
//!
//! - Content that fails detection on first sight yields no records and
//!   [`FileOffset::Skip`], which removes the file from rotation.
//! - Content that no longer satisfies its pinned reader yields no records and
//!   the same offset; the file waits for the writer to finish.
//! - An offset at (or past) the end of the content yields no records and the
//!   same offset.
//! - Gzip content is consumed whole on the first read and always returns
//!   [`FileOffset::Skip`].

mod csv;
mod gzip;
mod json;
mod plaintext;

pub use self::csv::CsvReader;
pub use self::gzip::GzipReader;
pub use self::json::JsonReader;
pub use self::plaintext::PlaintextReader;

use horang_common::{FileOffset, Record, Result};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use tracing::warn;

use crate::detect::FileFormat;

/// Records read from a file plus the offset to resume from
#[derive(Debug, Clone, PartialEq)]
pub struct ReadOutcome {
    pub records: Vec<Record>,
    pub next: FileOffset,
}

impl ReadOutcome {
    pub fn new(records: Vec<Record>, next: FileOffset) -> Self {
        Self { records, next }
    }

    /// Content failed validation; the file leaves rotation
    pub fn rejected() -> Self {
        Self::new(Vec::new(), FileOffset::Skip)
    }

    /// Nothing new since `offset`
    pub fn unchanged(offset: u64) -> Self {
        Self::new(Vec::new(), FileOffset::Resume(offset))
    }

    pub fn is_rejected(&self) -> bool {
        self.records.is_empty() && self.next.is_skip()
    }
}

/// A format-specific incremental reader
pub trait IncrementalReader: Send + Sync {
    /// Format this reader handles
    fn format(&self) -> FileFormat;

    /// Structural check used by format detection
    fn accepts(&self, content: &[u8]) -> bool;

    /// Records after `offset` and the offset to resume from
    fn read(&self, content: &[u8], offset: u64) -> ReadOutcome;
}

static JSON: JsonReader = JsonReader;
static CSV: CsvReader = CsvReader;
static PLAINTEXT: PlaintextReader = PlaintextReader;
static GZIP: GzipReader = GzipReader;

/// Readers in detection order
pub fn ordered() -> [&'static dyn IncrementalReader; 4] {
    [&JSON, &CSV, &PLAINTEXT, &GZIP]
}

/// Formats a gzip payload may contain
pub(crate) fn inner_formats() -> [&'static dyn IncrementalReader; 3] {
    [&JSON, &CSV, &PLAINTEXT]
}

/// Reader for a classified format, `None` for [`FileFormat::Unsupported`]
pub fn reader_for(format: FileFormat) -> Option<&'static dyn IncrementalReader> {
    ordered().into_iter().find(|reader| reader.format() == format)
}

/// Read `path` from `offset`, classifying it first unless a format is pinned
///
/// The returned format is the one the file should be pinned to unless the
/// outcome is a rejection. Blank content comes back as
/// [`FileFormat::Unsupported`] and stays unclassified.
pub fn read_path(
    path: &Path,
    pinned: Option<FileFormat>,
    offset: u64,
) -> Result<(FileFormat, ReadOutcome)> {
    match pinned.and_then(|format| reader_for(format).map(|reader| (format, reader))) {
        Some((FileFormat::PlaintextLog, _)) => {
            let outcome = read_plaintext_tail(path, offset)?;
            Ok((FileFormat::PlaintextLog, outcome))
        },
        Some((format, reader)) => {
            let content = std::fs::read(path)?;
            let outcome = reader.read(&content, offset);
            if outcome.is_rejected() {
                warn!(
                    path = %path.display(),
                    format = %format,
                    offset,
                    "Content no longer parses as its format, waiting"
                );
                return Ok((format, ReadOutcome::unchanged(offset)));
            }
            Ok((format, outcome))
        },
        None => {
            let content = std::fs::read(path)?;
            Ok(read_content(&content, offset))
        },
    }
}

/// Classify and read in-memory content starting from `offset`
///
/// Blank content is left unclassified so a file created empty is not pinned
/// before its writer decides what it holds.
pub fn read_content(content: &[u8], offset: u64) -> (FileFormat, ReadOutcome) {
    if content.iter().all(u8::is_ascii_whitespace) {
        return (FileFormat::Unsupported, ReadOutcome::unchanged(offset));
    }

    let format = crate::detect::detect(content);
    let outcome = match reader_for(format) {
        Some(reader) => reader.read(content, offset),
        None => ReadOutcome::rejected(),
    };
    (format, outcome)
}

/// Read only the bytes after `offset` of a plaintext log
fn read_plaintext_tail(path: &Path, offset: u64) -> Result<ReadOutcome> {
    let mut file = File::open(path)?;
    if offset >= file.metadata()?.len() {
        return Ok(ReadOutcome::unchanged(offset));
    }

    file.seek(SeekFrom::Start(offset))?;
    let mut unread = Vec::new();
    file.read_to_end(&mut unread)?;
    Ok(PlaintextReader::read_region(&unread, offset))
}

/// Split content into the newline-terminated part and a trailing fragment
pub(crate) fn split_complete(content: &[u8]) -> (&[u8], &[u8]) {
    match content.iter().rposition(|&b| b == b'\n') {
        Some(idx) => content.split_at(idx + 1),
        None => (&[], content),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_reader_for_every_format() {
        assert_eq!(reader_for(FileFormat::Json).unwrap().format(), FileFormat::Json);
        assert_eq!(reader_for(FileFormat::Csv).unwrap().format(), FileFormat::Csv);
        assert_eq!(reader_for(FileFormat::Gzip).unwrap().format(), FileFormat::Gzip);
        assert!(reader_for(FileFormat::Unsupported).is_none());
    }

    #[test]
    fn test_split_complete() {
        assert_eq!(split_complete(b"a\nb\nc"), (&b"a\nb\n"[..], &b"c"[..]));
        assert_eq!(split_complete(b"a\n"), (&b"a\n"[..], &b""[..]));
        assert_eq!(split_complete(b"partial"), (&b""[..], &b"partial"[..]));
    }

    #[test]
    fn test_unsupported_content_is_rejected() {
        let (format, outcome) = read_content(&[0x00, 0x9f, 0x92, 0x00], 0);
        assert_eq!(format, FileFormat::Unsupported);
        assert!(outcome.is_rejected());
    }

    #[test]
    fn test_read_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");
        std::fs::write(&path, "one\ntwo\n").unwrap();

        let (format, outcome) = read_path(&path, None, 0).unwrap();
        assert_eq!(format, FileFormat::PlaintextLog);
        assert_eq!(outcome.records.len(), 2);
        assert_eq!(outcome.next, FileOffset::Resume(8));
    }

    #[test]
    fn test_blank_content_stays_unclassified() {
        let (format, outcome) = read_content(b"", 0);
        assert_eq!(format, FileFormat::Unsupported);
        assert_eq!(outcome, ReadOutcome::unchanged(0));

        let (_, outcome) = read_content(b"\n  \n", 0);
        assert!(!outcome.is_rejected());
    }

    #[test]
    fn test_pinned_plaintext_reads_from_offset() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");
        std::fs::write(&path, "one\ntwo\nthr").unwrap();

        let (_, outcome) = read_path(&path, Some(FileFormat::PlaintextLog), 4).unwrap();
        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.records[0]["message"], "two");
        assert_eq!(outcome.next, FileOffset::Resume(8));

        let (_, outcome) = read_path(&path, Some(FileFormat::PlaintextLog), 40).unwrap();
        assert_eq!(outcome, ReadOutcome::unchanged(40));
    }

    #[test]
    fn test_pinned_csv_that_stops_parsing_waits() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("status.txt");
        std::fs::write(&path, "Started, ok\nLoaded, ok\nListening on 80\n").unwrap();

        let (format, outcome) = read_path(&path, Some(FileFormat::Csv), 1).unwrap();
        assert_eq!(format, FileFormat::Csv);
        assert_eq!(outcome, ReadOutcome::unchanged(1));
    }
}

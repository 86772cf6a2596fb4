//! Common types used across Horang

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// One normalized log entry.
///
/// Field order is the order in which fields were read from the source file.
pub type Record = serde_json::Map<String, serde_json::Value>;

/// Resume position of a file, or the permanent-skip sentinel.
///
/// The unit of `Resume` depends on the file's format: records consumed for
/// JSON and CSV, bytes consumed for plaintext logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FileOffset {
    /// Resume reading from this position next cycle
    Resume(u64),
    /// Never read this file again during this run
    Skip,
}

impl FileOffset {
    /// Raw sentinel value used when an offset is rendered as an integer
    pub const SKIP_SENTINEL: i64 = -1;

    /// Offset of a file that has never been read
    pub fn start() -> Self {
        FileOffset::Resume(0)
    }

    pub fn is_skip(self) -> bool {
        matches!(self, FileOffset::Skip)
    }

    /// Integer form, `-1` for the skip sentinel
    pub fn as_raw(self) -> i64 {
        match self {
            FileOffset::Resume(pos) => i64::try_from(pos).unwrap_or(i64::MAX),
            FileOffset::Skip => Self::SKIP_SENTINEL,
        }
    }
}

impl Default for FileOffset {
    fn default() -> Self {
        Self::start()
    }
}

impl std::fmt::Display for FileOffset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_raw())
    }
}

/// Records produced by one incremental read of one file, forwarded as a unit
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    /// File the records were read from
    pub source: PathBuf,

    /// Offset the read started from
    pub start_offset: u64,

    /// Records in file order
    pub records: Vec<Record>,
}

impl Batch {
    pub fn new(source: impl Into<PathBuf>, start_offset: u64, records: Vec<Record>) -> Self {
        Self {
            source: source.into(),
            start_offset,
            records,
        }
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_file_offset_raw_form() {
        assert_eq!(FileOffset::Resume(42).as_raw(), 42);
        assert_eq!(FileOffset::Skip.as_raw(), -1);
    }

    #[test]
    fn test_file_offset_display() {
        assert_eq!(FileOffset::Skip.to_string(), "-1");
        assert_eq!(FileOffset::start().to_string(), "0");
    }

    #[test]
    fn test_batch_accessors() {
        let batch = Batch::new("/tmp/a.log", 10, Vec::new());
        assert!(batch.is_empty());
        assert_eq!(batch.source(), Path::new("/tmp/a.log"));
        assert_eq!(batch.start_offset, 10);
    }
}

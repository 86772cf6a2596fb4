//! Per-file offset tracking across poll cycles.
//!
//! The store holds one [`FileOffset`] per normalized absolute path. An entry is
//! created the first time a path is looked up and lives for the rest of the
//! process. Updates obey two rules:
//!
//! - a `Resume` position never moves backward;
//! - `Skip` is terminal: once a file is excluded it stays excluded.
//!
//! Alongside the offset the store keeps the format a file was first classified
//! as. Offsets are counted in that format's unit, so the format is pinned and
//! never re-detected.
//!
//! The store is owned by the single poll loop, so it needs no locking. A
//! multi-worker variant would have to serialize `get`/`set` per path.

use crate::detect::FileFormat;
use horang_common::FileOffset;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Resume positions of every file observed during this run
#[derive(Debug, Default)]
pub struct OffsetStore {
    files: HashMap<PathBuf, FileOffset>,
    formats: HashMap<PathBuf, FileFormat>,
}

impl OffsetStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Offset for `path`, creating a fresh entry at position 0 on first sighting
    pub fn get(&mut self, path: &Path) -> FileOffset {
        if let Some(offset) = self.files.get(path) {
            return *offset;
        }

        debug!(path = %path.display(), "Tracking new file");
        self.files.insert(path.to_path_buf(), FileOffset::start());
        FileOffset::start()
    }

    /// Offset for `path` without creating an entry
    pub fn peek(&self, path: &Path) -> Option<FileOffset> {
        self.files.get(path).copied()
    }

    /// Record a new offset for `path`
    ///
    /// Returns `false`, leaving the stored value untouched, when the update
    /// would move a position backward or revive a skipped file.
    pub fn set(&mut self, path: &Path, offset: FileOffset) -> bool {
        let current = self.files.entry(path.to_path_buf()).or_default();

        let allowed = match (*current, offset) {
            (FileOffset::Skip, _) => false,
            (_, FileOffset::Skip) => true,
            (FileOffset::Resume(old), FileOffset::Resume(new)) => new >= old,
        };

        if allowed {
            *current = offset;
        } else {
            warn!(
                path = %path.display(),
                current = %current,
                requested = %offset,
                "Refusing offset update that would move backward"
            );
        }

        allowed
    }

    /// Format `path` was pinned to, if it has been classified
    pub fn format(&self, path: &Path) -> Option<FileFormat> {
        self.formats.get(path).copied()
    }

    /// Pin the format of `path`; the first pin wins
    pub fn pin_format(&mut self, path: &Path, format: FileFormat) -> FileFormat {
        *self.formats.entry(path.to_path_buf()).or_insert_with(|| {
            debug!(path = %path.display(), ?format, "Pinned file format");
            format
        })
    }

    /// Number of tracked files
    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Number of files permanently excluded from reading
    pub fn skipped(&self) -> usize {
        self.files.values().filter(|offset| offset.is_skip()).count()
    }
}

//! Deterministic document identifiers for forwarded records
//!
//! A record is identified by the file it came from, the offset its batch
//! started at, and its index inside that batch. Re-reading the same file
//! from the same offset yields the same identifiers, so a sink that indexes
//! by id overwrites a re-sent batch instead of duplicating it.

use sha2::{Digest, Sha256};
use std::path::Path;

/// Compute the identifier of the `index`-th record of a batch
pub fn document_id(source: &Path, start_offset: u64, index: usize) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source.to_string_lossy().as_bytes());
    hasher.update([0u8]);
    hasher.update(start_offset.to_be_bytes());
    hasher.update((index as u64).to_be_bytes());
    hex::encode(hasher.finalize())
}

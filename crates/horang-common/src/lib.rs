//! Horang Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types, utilities, and error handling for the Horang log forwarder.
//!
//! # Overview
//!
//! This crate provides common functionality used across all Horang workspace members:
//!
//! - **Error Handling**: The [`HorangError`] type and [`Result`] alias
//! - **Logging**: `tracing` subscriber bootstrap (console, rolling file, JSON)
//! - **Types**: Records, batches and file offsets shared by the pipeline
//! - **Document IDs**: Deterministic identifiers for forwarded records
//!
//! # Example
//!
//! ```no_run
//! use horang_common::types::{Batch, Record};
//!
//! let mut record = Record::new();
//! record.insert("message".into(), "hello".into());
//! let batch = Batch::new("/var/log/app.log", 0, vec![record]);
//! assert_eq!(batch.len(), 1);
//! ```

pub mod document_id;
pub mod error;
pub mod logging;
pub mod types;

// Re-export commonly used types
pub use error::{HorangError, Result};
pub use types::{Batch, FileOffset, Record};

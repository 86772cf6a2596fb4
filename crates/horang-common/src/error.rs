//! Error types for Horang

use thiserror::Error;

/// Result type alias for Horang operations
pub type Result<T> = std::result::Result<T, HorangError>;

/// Main error type for Horang
#[derive(Error, Debug)]
pub enum HorangError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Directory walk failed: {0}")]
    Walk(String),

    #[error("Geo database error: {0}")]
    GeoDatabase(String),

    #[error("Sink error: {0}")]
    Sink(String),
}

impl HorangError {
    /// Create a geo database error
    pub fn geo_database(msg: impl Into<String>) -> Self {
        Self::GeoDatabase(msg.into())
    }

    /// Create a sink error
    pub fn sink(msg: impl Into<String>) -> Self {
        Self::Sink(msg.into())
    }
}

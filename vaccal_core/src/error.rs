//! Error types for the vaccal_core library.

use std::io;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for vaccal_core operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// IO error occurred
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// TOML parsing error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Configuration validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// No catalog resource matches the (normalized) country code
    #[error("No vaccination catalog for country '{0}'")]
    CatalogNotFound(String),

    /// A catalog resource exists but could not be decoded or failed validation
    #[error("Catalog for country '{country}' could not be decoded: {reason}")]
    CatalogDecodeFailed { country: String, reason: String },

    /// A persisted record exists but is malformed
    #[error("Stored record '{key}' is corrupt: {reason}")]
    PersistenceReadCorrupt { key: String, reason: String },

    /// Date could not be parsed or is out of range
    #[error("Invalid date: {0}")]
    InvalidDate(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

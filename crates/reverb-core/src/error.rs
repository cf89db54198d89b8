//! Error types for reverb-core

use thiserror::Error;

/// Core error type
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid registration: duplicate names, unknown dependencies, or a
    /// dependency cycle. Fatal at startup.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A path segment, field, or handler does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// A compute function failed during read or flush
    #[error("recompute of {field} failed: {reason}")]
    Recompute { field: String, reason: String },

    /// A computed field cannot be written
    #[error("field is computed and read-only: {0}")]
    ReadOnly(String),

    /// A compute function received an unexpected value type
    #[error("type error: expected {expected}, got {got}")]
    TypeError { expected: String, got: String },
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

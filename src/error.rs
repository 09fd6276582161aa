// In: src/error.rs

//! This module defines the single, unified error type for the entire coldata library.
//! It uses the `thiserror` crate to provide ergonomic, context-aware error handling.
//!
//! Every variant except the external wrappers describes a violated caller contract
//! (wrong schema, unsupported type, append after transfer). None of them are transient,
//! so nothing in this crate retries; the surrounding execution layer decides how to
//! present them.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ColumnDataError {
    // =========================================================================
    // === Contract Violations (raised by the collection engine)
    // =========================================================================
    #[error("Unsupported data type for column data collection: {0}")]
    UnsupportedType(String),

    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("Cannot append to a collection whose storage has been transferred (finished)")]
    AppendAfterFinish,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Internal logic error (this is a bug): {0}")]
    InternalError(String),

    // =========================================================================
    // === External Error Wrappers (Using #[from] for automatic conversion)
    // =========================================================================
    /// An error originating from the Arrow library, typically while materializing
    /// a scanned chunk back into arrays.
    #[error("Arrow operation failed: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    /// An error from the Serde JSON library, raised by config parsing and `describe`.
    #[error("Serde JSON error: {0}")]
    SerdeJson(#[from] serde_json::Error),
}

impl ColumnDataError {
    /// Shorthand used by the storage layer for bounds and invariant failures.
    pub(crate) fn internal(msg: impl Into<String>) -> Self {
        ColumnDataError::InternalError(msg.into())
    }
}

//! Error types for the store.

use thiserror::Error;

/// Result type alias for fallible store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Recoverable errors surfaced by the public API.
///
/// Contract violations (out-of-range record index, an oversized record
/// reaching the node layer, a split that cannot satisfy its invariants)
/// are not represented here: they indicate a bug or a corrupted page and
/// abort via panic instead.
#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("empty keys are reserved")]
    EmptyKey,

    #[error("key too long: {0} bytes")]
    KeyTooLong(usize),

    #[error("value too long: {0} bytes")]
    ValueTooLong(usize),

    #[error("corrupt index file: {0}")]
    Corrupt(String),
}

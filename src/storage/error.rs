//! Domain errors reported by the storage layer.
//!
//! This is a deliberately small, closed vocabulary. The command layer maps
//! each variant onto protocol-visible text (see `Command::describe_error`).

use thiserror::Error;

/// Errors raised by the storage repositories.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The key (or list index, or hash field) does not exist
    #[error("key not found")]
    NotFound,

    /// The key exists but holds a value of another type
    #[error("key type mismatch")]
    KeyType,

    /// The stored value cannot be used for this operation (e.g. INCR on text)
    #[error("invalid value type")]
    ValueType,

    /// The operation is not allowed in the current state
    #[error("operation not allowed")]
    NotAllowed,
}

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, Error>;

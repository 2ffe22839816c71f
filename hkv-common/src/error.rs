//! Shared error type for the storage engine and dispatcher.
//!
//! `HkvError` never crosses the wire directly; the dispatcher maps each
//! variant to one of the status codes in [`crate::protocol::Status`].

use thiserror::Error;

/// Result alias used throughout the engine and server crates.
pub type HkvResult<T> = Result<T, HkvError>;

/// Errors surfaced by keyspace operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HkvError {
    /// The key does not exist (or has lazily expired).
    #[error("key not found")]
    NotFound,

    /// The key exists but holds a value of the wrong type for this command
    /// (e.g. `ZADD` against a STRING entry).
    #[error("wrong type for key")]
    WrongType,

    /// A command argument failed to parse (e.g. a non-numeric TTL or score).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

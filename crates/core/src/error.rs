//! Crate-wide error type and result alias.

use thiserror::Error;

/// Errors produced by index construction, persistence, and search.
#[derive(Debug, Error)]
pub enum Error {
    /// File missing, short read, or write failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed binary header, label token, or corrupted artifact.
    #[error("format error: {0}")]
    Format(String),

    /// Unknown scenario, data type, metric, or incompatible load request.
    #[error("config error: {0}")]
    Config(String),

    /// Empty storage, dimension mismatch, or inconsistent index data.
    #[error("data error: {0}")]
    Data(String),

    /// Invariant violation; indicates a bug rather than bad input.
    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

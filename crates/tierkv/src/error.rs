//! Error types for tierkv

use std::io;

use thiserror::Error;

/// Result type alias for tierkv operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for store operations
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Log or header could not be parsed
    #[error("Parse error: {0}")]
    Parse(String),

    /// Value exceeds the configured maximum size
    #[error("Value too large: {size} bytes (max {max} bytes)")]
    ValueTooLarge {
        /// Size of the rejected value
        size: usize,
        /// Configured limit
        max: usize,
    },

    /// Log file would exceed the configured maximum size
    #[error("Database full: {0} bytes")]
    DatabaseFull(u64),

    /// Store is closed
    #[error("Database is closed")]
    Closed,
}

impl From<nom::Err<nom::error::Error<&[u8]>>> for Error {
    fn from(err: nom::Err<nom::error::Error<&[u8]>>) -> Self {
        Error::Parse(format!("{:?}", err))
    }
}

//! Error types for tiercache

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for tiercache operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for cache chain operations
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid chain layout or configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// The embedded store path exists but is not a directory
    #[error("open {0}: not a directory")]
    NotADirectory(PathBuf),

    /// Filesystem error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Embedded store error
    #[error("storage error: {0}")]
    Storage(#[from] tierkv::Error),

    /// Networked store error
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// No connection could be taken from the pool
    #[error("connection pool error: {0}")]
    Pool(#[from] deadpool_redis::PoolError),

    /// The pool could not be built from its configuration
    #[error("failed to create connection pool: {0}")]
    CreatePool(#[from] deadpool_redis::CreatePoolError),

    /// Envelope or value (de)serialization failed
    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),

    /// A counter operation hit a value that is not a number
    #[error("value at '{0}' is not a number")]
    NotANumber(String),

    /// No level up the chain supports publish/subscribe
    #[error("unsupported publish/subscribe messages")]
    UnsupportedPubSub,
}

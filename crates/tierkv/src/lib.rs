//! # tierkv
//!
//! Embedded, disk-resident, ordered key/value store.
//!
//! ## Design
//! - Append-only log of put/delete records
//! - In-memory ordered index rebuilt by replaying the log on open
//! - Readers and the writer coordinate through `parking_lot` locks
//! - Configurable value and log size limits

#![warn(missing_docs)]

mod error;
mod parser;
mod storage;

pub use error::{Error, Result};
pub use storage::{StoreOptions, TierStore, DATA_FILE, DEFAULT_MAX_DB_SIZE, DEFAULT_MAX_VALUE_SIZE};

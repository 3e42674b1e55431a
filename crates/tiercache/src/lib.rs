//! # tiercache
//!
//! Tiered read-through/write-through cache chain.
//!
//! ## Architecture
//! - **Chain**: ordered levels, nearest first; the last level is the root
//! - **Embedded tier**: on-disk `tierkv` store with envelope-encoded expiry
//! - **Networked tier**: Redis-protocol server behind a `deadpool_redis` pool
//! - **Invalidation**: deletes at the root are published so nearer tiers in
//!   other processes drop their copies
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use tiercache::{Backend, Chain, EmbeddedBackend, StoreOptions, TypedGetter};
//!
//! # async fn demo() -> tiercache::Result<()> {
//! let near: Arc<dyn Backend> = Arc::new(EmbeddedBackend::open("/tmp/near", StoreOptions::default())?);
//! let far: Arc<dyn Backend> = Arc::new(EmbeddedBackend::open("/tmp/far", StoreOptions::default())?);
//! let cache = Chain::build(vec![near, far])?;
//!
//! cache.set("answer", &42, Some(Duration::from_secs(60))).await?;
//! assert_eq!(cache.get_i64("answer").await, 42);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

mod backend;
mod chain;
mod config;
mod embedded;
mod envelope;
mod error;
mod getter;
mod networked;
mod pubsub;
mod stats;

pub use backend::{Backend, KeyPattern, Lifetime, MessageHandler};
pub use chain::{Cache, Chain, LevelLink};
pub use config::{ChainConfig, EmbeddedConfig, LevelConfig, NetworkedConfig};
pub use embedded::EmbeddedBackend;
pub use envelope::{ttl_seconds, Envelope, NEVER_EXPIRES};
pub use error::{Error, Result};
pub use getter::{coerce_bool, coerce_f64, coerce_i64, coerce_string, coerce_time, coerce_u64, Getter, TypedGetter};
pub use networked::{NetworkedBackend, INVALIDATION_CHANNEL};
pub use pubsub::Subscription;
pub use stats::{LevelStats, StatsSnapshot};
pub use tierkv::StoreOptions;

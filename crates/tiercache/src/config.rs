//! Declarative chain configuration
//!
//! A [`ChainConfig`] lists levels nearest first and builds the whole chain:
//!
//! ```json
//! {
//!   "levels": [
//!     { "kind": "embedded", "path": "/var/cache/app" },
//!     { "kind": "networked", "url": "redis://127.0.0.1:6379", "pool_size": 8 }
//!   ]
//! }
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use deadpool_redis::{Pool, PoolConfig, Runtime};
use serde::{Deserialize, Serialize};
use tierkv::StoreOptions;
use tracing::info;

use crate::backend::Backend;
use crate::chain::{Cache, Chain};
use crate::embedded::EmbeddedBackend;
use crate::error::Result;
use crate::networked::NetworkedBackend;

const DEFAULT_POOL_SIZE: usize = 16;
const DEFAULT_TIMEOUT_MS: u64 = 5000;

/// Levels of a chain, nearest first
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfig {
    /// At least two levels
    pub levels: Vec<LevelConfig>,
}

/// One level of a chain
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LevelConfig {
    /// Local `tierkv` store
    Embedded(EmbeddedConfig),
    /// Redis-protocol server
    Networked(NetworkedConfig),
}

/// Settings for an [`EmbeddedBackend`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddedConfig {
    /// Store directory, wiped on open
    pub path: PathBuf,
    /// Store tuning
    #[serde(default)]
    pub options: StoreOptions,
}

/// Settings for a [`NetworkedBackend`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkedConfig {
    /// Server URL, e.g. `redis://127.0.0.1:6379`
    pub url: String,
    /// Maximum pooled connections
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
    /// Wait, create and recycle timeout for pooled connections
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_pool_size() -> usize {
    DEFAULT_POOL_SIZE
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

impl NetworkedConfig {
    /// Config for `url` with default pool settings
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            pool_size: DEFAULT_POOL_SIZE,
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }

    /// Build the connection pool
    pub fn create_pool(&self) -> Result<Pool> {
        let timeout = Duration::from_millis(self.timeout_ms);

        let mut pool_config = PoolConfig::new(self.pool_size);
        pool_config.timeouts.wait = Some(timeout);
        pool_config.timeouts.create = Some(timeout);
        pool_config.timeouts.recycle = Some(timeout);

        let mut redis_config = deadpool_redis::Config::from_url(&self.url);
        redis_config.pool = Some(pool_config);

        Ok(redis_config.create_pool(Some(Runtime::Tokio1))?)
    }

    /// Create a pool and connect a backend on it
    pub async fn connect(&self) -> Result<NetworkedBackend> {
        let pool = self.create_pool()?;
        let client = redis::Client::open(self.url.as_str())?;
        NetworkedBackend::connect(pool, client).await
    }
}

impl LevelConfig {
    /// Open the backend this level describes
    pub async fn open(&self) -> Result<Arc<dyn Backend>> {
        let backend: Arc<dyn Backend> = match self {
            LevelConfig::Embedded(cfg) => Arc::new(EmbeddedBackend::open(&cfg.path, cfg.options.clone())?),
            LevelConfig::Networked(cfg) => Arc::new(cfg.connect().await?),
        };
        Ok(backend)
    }
}

impl ChainConfig {
    /// Open every level and link them into a chain
    pub async fn build(&self) -> Result<Cache> {
        let mut backends = Vec::with_capacity(self.levels.len());
        for level in &self.levels {
            backends.push(level.open().await?);
        }
        let head = Chain::build(backends)?;
        info!(levels = head.chain().len(), "cache chain ready");
        Ok(head)
    }
}

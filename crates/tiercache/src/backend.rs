//! The seam every cache tier implements
//!
//! A [`Backend`] only knows about its own store. Cascading reads, promotion,
//! write-through and invalidation are driven by the chain in [`crate::chain`].

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::chain::LevelLink;
use crate::error::{Error, Result};
use crate::pubsub::Subscription;

/// Callback invoked as `handler(channel, payload)` for every received message
pub type MessageHandler = Arc<dyn Fn(&str, &str) + Send + Sync>;

/// Remaining lifetime of a stored key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifetime {
    /// The key never expires
    Persistent,
    /// The key expires after this long
    Remaining(Duration),
}

impl Lifetime {
    /// TTL to write when copying the key elsewhere
    ///
    /// Truncated to whole seconds so the copy never outlives the source
    /// once the store rounds it up.
    pub fn as_ttl(self) -> Option<Duration> {
        match self {
            Lifetime::Persistent => None,
            Lifetime::Remaining(remaining) => Some(Duration::from_secs(remaining.as_secs())),
        }
    }

    /// Whether enough lifetime is left to copy the key into a nearer tier
    ///
    /// Stores count TTLs in whole seconds, so less than one second left
    /// would be written as already expired.
    pub fn is_promotable(self) -> bool {
        match self {
            Lifetime::Persistent => true,
            Lifetime::Remaining(remaining) => remaining.as_secs() >= 1,
        }
    }
}

/// Key filter used by the scan operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyPattern {
    /// Keys starting with the text
    Prefix(String),
    /// Keys ending with the text
    Suffix(String),
    /// Keys containing the text
    Substring(String),
}

impl KeyPattern {
    /// Whether `key` passes the filter
    pub fn matches(&self, key: &str) -> bool {
        match self {
            KeyPattern::Prefix(p) => key.starts_with(p.as_str()),
            KeyPattern::Suffix(p) => key.ends_with(p.as_str()),
            KeyPattern::Substring(p) => key.contains(p.as_str()),
        }
    }

    /// Redis glob equivalent, with metacharacters in the text escaped
    pub fn to_glob(&self) -> String {
        match self {
            KeyPattern::Prefix(p) => format!("{}*", escape_glob(p)),
            KeyPattern::Suffix(p) => format!("*{}", escape_glob(p)),
            KeyPattern::Substring(p) => format!("*{}*", escape_glob(p)),
        }
    }
}

fn escape_glob(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        if matches!(ch, '*' | '?' | '[' | ']' | '\\') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

/// Whether a scan holding `len` entries is full; `None` and `Some(0)` are unbounded
pub(crate) fn limit_reached(len: usize, limit: Option<usize>) -> bool {
    matches!(limit, Some(max) if max > 0 && len >= max)
}

/// Local operations of one cache tier
///
/// Implementations must not touch other tiers; the chain composes them.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Short name used in logs
    fn kind(&self) -> &'static str;

    /// Whether `key` is present locally
    async fn contains(&self, key: &str) -> Result<bool>;

    /// Stored value of `key`
    async fn fetch(&self, key: &str) -> Result<Option<Value>>;

    /// Remaining lifetime of `key`, `None` when absent
    async fn lifetime(&self, key: &str) -> Result<Option<Lifetime>>;

    /// Store `value` with an optional TTL (`None` never expires)
    async fn store(&self, key: &str, value: &Value, ttl: Option<Duration>) -> Result<()>;

    /// Remove keys locally
    async fn remove(&self, keys: &[String]) -> Result<()>;

    /// Keys matching `pattern`, mapped to their data rendered as strings
    async fn scan(&self, pattern: &KeyPattern, limit: Option<usize>) -> Result<BTreeMap<String, String>>;

    /// Add `step` to the integer at `key`, missing counts as 0
    async fn increment_by(&self, key: &str, step: i64) -> Result<i64>;

    /// Add `step` to the number at `key`, missing counts as 0
    async fn increment_by_float(&self, key: &str, step: f64) -> Result<f64>;

    /// Whether this tier carries publish/subscribe itself
    fn native_pubsub(&self) -> bool {
        false
    }

    /// Publish `message` on `channel`
    async fn publish(&self, _channel: &str, _message: &str) -> Result<()> {
        Err(Error::UnsupportedPubSub)
    }

    /// Listen on exact channel names
    async fn subscribe(&self, _channels: &[String], _handler: MessageHandler) -> Result<Subscription> {
        Err(Error::UnsupportedPubSub)
    }

    /// Listen on glob patterns
    async fn psubscribe(&self, _patterns: &[String], _handler: MessageHandler) -> Result<Subscription> {
        Err(Error::UnsupportedPubSub)
    }

    /// Tell other processes that `keys` were deleted at the root
    async fn broadcast_invalidation(&self, _keys: &[String]) -> Result<()> {
        Ok(())
    }

    /// Called once when the backend is placed in a chain
    fn attach(&self, _link: LevelLink) {}

    /// Release the store handle
    async fn close(&self) -> Result<()>;
}

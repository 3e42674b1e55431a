//! Networked cache tier speaking the Redis protocol
//!
//! Commands go through a caller-owned `deadpool_redis` pool; pub/sub uses
//! dedicated connections opened from the `redis::Client`.
//!
//! Expiry is native (`SETEX` / `TTL`). At the root of a chain, deletes are
//! published on [`INVALIDATION_CHANNEL`]; every networked level listens on
//! that channel and drops the keys from its nearer levels.

use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::{Connection, Pool};
use parking_lot::Mutex;
use redis::AsyncCommands;
use serde_json::Value;
use tracing::{debug, info, trace, warn};

use crate::backend::{limit_reached, Backend, KeyPattern, Lifetime, MessageHandler};
use crate::chain::LevelLink;
use crate::envelope::{ttl_seconds, Envelope};
use crate::error::Result;
use crate::getter::coerce_string;
use crate::pubsub::{listen, Subscription, Topic};

/// Channel carrying keys deleted at the root, as a JSON array
pub const INVALIDATION_CHANNEL: &str = "__TIERCACHE_DEL_KEYS_CHANNEL__";

/// `SCAN` page size hint
const SCAN_BATCH: usize = 100;

/// Cache tier backed by a Redis-protocol server
pub struct NetworkedBackend {
    pool: Pool,
    client: redis::Client,
    link: Arc<OnceLock<LevelLink>>,
    listener: Mutex<Option<Subscription>>,
}

impl NetworkedBackend {
    /// Ping the server and start the invalidation listener
    ///
    /// Returns once the listener is subscribed.
    pub async fn connect(pool: Pool, client: redis::Client) -> Result<Self> {
        let mut conn = pool.get().await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        drop(conn);

        let link: Arc<OnceLock<LevelLink>> = Arc::new(OnceLock::new());
        let listener = {
            let link = Arc::clone(&link);
            listen(
                &client,
                Topic::Channels,
                &[INVALIDATION_CHANNEL.to_string()],
                move |_channel, payload| {
                    let link = Arc::clone(&link);
                    async move { on_invalidation(&link, &payload).await }
                },
            )
            .await?
        };

        info!("networked cache connected");

        Ok(Self {
            pool,
            client,
            link,
            listener: Mutex::new(Some(listener)),
        })
    }

    async fn conn(&self) -> Result<Connection> {
        Ok(self.pool.get().await?)
    }
}

async fn on_invalidation(link: &OnceLock<LevelLink>, payload: &str) {
    let keys: Vec<String> = match serde_json::from_str(payload) {
        Ok(keys) => keys,
        Err(e) => {
            warn!(error = %e, "ignoring malformed invalidation message");
            return;
        }
    };
    if keys.is_empty() {
        return;
    }

    match link.get() {
        Some(link) => {
            debug!(keys = ?keys, level = link.index(), "invalidating nearer levels");
            link.invalidate_nearer(&keys).await;
        }
        None => trace!("invalidation received before the level joined a chain"),
    }
}

/// Stored payload as JSON: the envelope's data, or a bare scalar written by
/// native commands such as `INCRBY`
fn decode_stored(raw: &str) -> Result<Value> {
    let value: Value = serde_json::from_str(raw)?;
    match value {
        Value::Object(ref map) if map.contains_key("data") && map.contains_key("created_at") => {
            Ok(serde_json::from_value::<Envelope>(value)?.data)
        }
        other => Ok(other),
    }
}

#[async_trait]
impl Backend for NetworkedBackend {
    fn kind(&self) -> &'static str {
        "networked"
    }

    /// Present only when `EXISTS` reports more than one key
    async fn contains(&self, key: &str) -> Result<bool> {
        let mut conn = self.conn().await?;
        let count: i64 = conn.exists(key).await?;
        Ok(count > 1)
    }

    async fn fetch(&self, key: &str) -> Result<Option<Value>> {
        let mut conn = self.conn().await?;
        let raw: Option<String> = conn.get(key).await?;
        raw.as_deref().map(decode_stored).transpose()
    }

    async fn lifetime(&self, key: &str) -> Result<Option<Lifetime>> {
        let mut conn = self.conn().await?;
        let ttl: i64 = conn.ttl(key).await?;
        Ok(match ttl {
            -1 => Some(Lifetime::Persistent),
            secs if secs >= 0 => Some(Lifetime::Remaining(Duration::from_secs(secs as u64))),
            _ => None,
        })
    }

    async fn store(&self, key: &str, value: &Value, ttl: Option<Duration>) -> Result<()> {
        let envelope = Envelope::new(value.clone(), ttl);
        let payload = serde_json::to_string(&envelope)?;
        let mut conn = self.conn().await?;

        // A zero TTL sets no native expiry
        match ttl.map(ttl_seconds) {
            Some(secs) if secs > 0 => conn.set_ex::<_, _, ()>(key, payload, secs).await?,
            _ => conn.set::<_, _, ()>(key, payload).await?,
        }
        trace!(key = %key, ?ttl, "networked set");
        Ok(())
    }

    async fn remove(&self, keys: &[String]) -> Result<()> {
        if keys.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn().await?;
        conn.del::<_, ()>(keys.to_vec()).await?;
        Ok(())
    }

    async fn scan(&self, pattern: &KeyPattern, limit: Option<usize>) -> Result<BTreeMap<String, String>> {
        let glob = pattern.to_glob();
        let mut conn = self.conn().await?;
        let mut found = BTreeMap::new();
        let mut cursor: u64 = 0;

        'pages: loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&glob)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await?;

            for key in keys {
                if limit_reached(found.len(), limit) {
                    break 'pages;
                }
                let raw: Option<String> = conn.get(&key).await?;
                let Some(raw) = raw else {
                    continue;
                };
                match decode_stored(&raw) {
                    Ok(data) => {
                        found.insert(key, coerce_string(&data).unwrap_or_default());
                    }
                    Err(e) => debug!(key = %key, error = %e, "skipping undecodable entry"),
                }
            }

            cursor = next;
            if cursor == 0 {
                break;
            }
        }

        Ok(found)
    }

    async fn increment_by(&self, key: &str, step: i64) -> Result<i64> {
        let mut conn = self.conn().await?;
        Ok(conn.incr(key, step).await?)
    }

    async fn increment_by_float(&self, key: &str, step: f64) -> Result<f64> {
        let mut conn = self.conn().await?;
        Ok(conn.incr(key, step).await?)
    }

    fn native_pubsub(&self) -> bool {
        true
    }

    async fn publish(&self, channel: &str, message: &str) -> Result<()> {
        let mut conn = self.conn().await?;
        conn.publish::<_, _, ()>(channel, message).await?;
        Ok(())
    }

    async fn subscribe(&self, channels: &[String], handler: MessageHandler) -> Result<Subscription> {
        listen(&self.client, Topic::Channels, channels, move |channel, payload| {
            handler(&channel, &payload);
            std::future::ready(())
        })
        .await
    }

    async fn psubscribe(&self, patterns: &[String], handler: MessageHandler) -> Result<Subscription> {
        listen(&self.client, Topic::Patterns, patterns, move |channel, payload| {
            handler(&channel, &payload);
            std::future::ready(())
        })
        .await
    }

    async fn broadcast_invalidation(&self, keys: &[String]) -> Result<()> {
        let payload = serde_json::to_string(keys)?;
        self.publish(INVALIDATION_CHANNEL, &payload).await?;
        debug!(keys = ?keys, "invalidation broadcast");
        Ok(())
    }

    fn attach(&self, link: LevelLink) {
        if self.link.set(link).is_err() {
            warn!("networked cache is already part of a chain, keeping the first");
        }
    }

    /// Stops the invalidation listener; the pool stays with its owner
    async fn close(&self) -> Result<()> {
        if let Some(listener) = self.listener.lock().take() {
            listener.cancel();
        }
        info!("networked cache closed");
        Ok(())
    }
}

impl Drop for NetworkedBackend {
    fn drop(&mut self) {
        if let Some(listener) = self.listener.get_mut().take() {
            listener.cancel();
        }
    }
}

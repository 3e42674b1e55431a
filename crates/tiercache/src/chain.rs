//! Cache chain coordinator
//!
//! A [`Chain`] owns an ordered arena of levels. Level 0 is the nearest,
//! fastest tier; the last level is the root. Each level holds write-once
//! links to its `parent` (farther) and `children` (nearer) by index.
//!
//! Reads cascade toward the root and promote hits back into the levels that
//! missed. Writes and deletes run locally first and then toward the root.
//! Deletes reaching the root are broadcast so nearer tiers of other
//! processes can drop the keys too.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, OnceLock, Weak};
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, trace, warn};

use crate::backend::{Backend, KeyPattern, Lifetime, MessageHandler};
use crate::error::{Error, Result};
use crate::getter::Getter;
use crate::pubsub::Subscription;
use crate::stats::LevelStats;

struct Level {
    backend: Arc<dyn Backend>,
    parent: OnceLock<usize>,
    children: OnceLock<usize>,
    stats: LevelStats,
}

/// Arena of linked cache levels
pub struct Chain {
    levels: Vec<Level>,
}

impl Chain {
    /// Link `backends` into a chain and return its nearest level
    ///
    /// Backend `i` gets `i + 1` as parent and `i - 1` as children.
    pub fn build(backends: Vec<Arc<dyn Backend>>) -> Result<Cache> {
        if backends.len() < 2 {
            return Err(Error::Config(format!(
                "a cache chain needs at least 2 levels, got {}",
                backends.len()
            )));
        }

        let count = backends.len();
        let levels = backends
            .into_iter()
            .enumerate()
            .map(|(i, backend)| {
                let level = Level {
                    backend,
                    parent: OnceLock::new(),
                    children: OnceLock::new(),
                    stats: LevelStats::new(),
                };
                if i + 1 < count {
                    let _ = level.parent.set(i + 1);
                }
                if i > 0 {
                    let _ = level.children.set(i - 1);
                }
                level
            })
            .collect();

        let chain = Arc::new(Chain { levels });
        for (index, level) in chain.levels.iter().enumerate() {
            level.backend.attach(LevelLink {
                chain: Arc::downgrade(&chain),
                index,
            });
        }

        debug!(chain = ?chain, "cache chain built");

        Ok(Cache { chain, index: 0 })
    }

    /// Number of levels
    pub fn len(&self) -> usize {
        self.levels.len()
    }

    /// Always false, a chain has at least 2 levels
    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    fn level(&self, index: usize) -> &Level {
        &self.levels[index]
    }

    fn parent_of(&self, index: usize) -> Option<usize> {
        self.level(index).parent.get().copied()
    }

    fn children_of(&self, index: usize) -> Option<usize> {
        self.level(index).children.get().copied()
    }

    /// Remove `keys` from every level nearer than `index`
    ///
    /// Removal is local to each level and never travels back toward the root.
    pub(crate) async fn invalidate_nearer(&self, index: usize, keys: &[String]) {
        let mut current = self.children_of(index);
        while let Some(i) = current {
            let level = self.level(i);
            match level.backend.remove(keys).await {
                Ok(()) => {
                    level.stats.record_deletes(keys.len());
                    trace!(level = i, keys = ?keys, "invalidated nearer level");
                }
                Err(e) => warn!(level = i, error = %e, "failed to invalidate nearer level"),
            }
            current = self.children_of(i);
        }
    }
}

impl fmt::Debug for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.levels.iter().map(|l| l.backend.kind()))
            .finish()
    }
}

/// Weak back-reference from a backend to its place in a chain
#[derive(Debug, Clone)]
pub struct LevelLink {
    chain: Weak<Chain>,
    index: usize,
}

impl LevelLink {
    /// Index of the level this backend occupies
    pub fn index(&self) -> usize {
        self.index
    }

    /// Remove `keys` from the levels nearer than this one
    ///
    /// Does nothing once the chain has been dropped.
    pub async fn invalidate_nearer(&self, keys: &[String]) {
        if let Some(chain) = self.chain.upgrade() {
            chain.invalidate_nearer(self.index, keys).await;
        }
    }
}

/// Handle to one level of a chain
///
/// Cheap to clone. Every operation starts at this level and walks toward
/// the root as needed.
#[derive(Clone)]
pub struct Cache {
    chain: Arc<Chain>,
    index: usize,
}

impl fmt::Debug for Cache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cache")
            .field("index", &self.index)
            .field("kind", &self.backend().kind())
            .finish()
    }
}

impl Cache {
    fn at(&self, index: usize) -> Cache {
        Cache {
            chain: Arc::clone(&self.chain),
            index,
        }
    }

    fn root_index(&self) -> usize {
        let mut index = self.index;
        while let Some(parent) = self.chain.parent_of(index) {
            index = parent;
        }
        index
    }

    /// Position of this level, 0 is the nearest
    pub fn index(&self) -> usize {
        self.index
    }

    /// The chain this level belongs to
    pub fn chain(&self) -> &Arc<Chain> {
        &self.chain
    }

    /// Backend of this level
    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.chain.level(self.index).backend
    }

    /// Counters of this level
    pub fn stats(&self) -> &LevelStats {
        &self.chain.level(self.index).stats
    }

    /// Farther level, if any
    pub fn parent(&self) -> Option<Cache> {
        self.chain.parent_of(self.index).map(|i| self.at(i))
    }

    /// Nearer level, if any
    pub fn children(&self) -> Option<Cache> {
        self.chain.children_of(self.index).map(|i| self.at(i))
    }

    /// Level at `index` of the same chain
    pub fn level(&self, index: usize) -> Option<Cache> {
        (index < self.chain.len()).then(|| self.at(index))
    }

    /// Farthest level
    pub fn root(&self) -> Cache {
        self.at(self.root_index())
    }

    /// Link `parent` as this level's parent if none is set yet
    ///
    /// Returns whether the link was stored. The parent must be a farther
    /// level of the same chain.
    pub fn set_parent(&self, parent: &Cache) -> Result<bool> {
        let level = self.chain.level(self.index);
        if level.parent.get().is_some() {
            return Ok(false);
        }
        self.check_link(parent)?;
        if parent.index <= self.index {
            return Err(Error::Config(format!(
                "level {} cannot be the parent of level {}",
                parent.index, self.index
            )));
        }
        Ok(level.parent.set(parent.index).is_ok())
    }

    /// Link `children` as this level's nearer level if none is set yet
    ///
    /// Returns whether the link was stored. The children must be a nearer
    /// level of the same chain.
    pub fn set_children(&self, children: &Cache) -> Result<bool> {
        let level = self.chain.level(self.index);
        if level.children.get().is_some() {
            return Ok(false);
        }
        self.check_link(children)?;
        if children.index >= self.index {
            return Err(Error::Config(format!(
                "level {} cannot be the children of level {}",
                children.index, self.index
            )));
        }
        Ok(level.children.set(children.index).is_ok())
    }

    fn check_link(&self, other: &Cache) -> Result<()> {
        if Arc::ptr_eq(&self.chain, &other.chain) {
            Ok(())
        } else {
            Err(Error::Config(
                "cannot link levels of different chains".to_string(),
            ))
        }
    }

    /// Whether `key` is present here or at any farther level
    pub async fn has(&self, key: &str) -> Result<bool> {
        let mut current = Some(self.index);
        while let Some(i) = current {
            if self.chain.level(i).backend.contains(key).await? {
                return Ok(true);
            }
            current = self.chain.parent_of(i);
        }
        Ok(false)
    }

    /// Read-through lookup
    ///
    /// Levels that missed receive the value with the lifetime reported by
    /// their parent, as long as at least one whole second of it is left.
    pub async fn get_value(&self, key: &str) -> Result<Option<Value>> {
        let mut missed = Vec::new();
        let mut current = Some(self.index);

        while let Some(i) = current {
            let level = self.chain.level(i);
            if let Some(value) = level.backend.fetch(key).await? {
                level.stats.record_hit();
                trace!(key = %key, level = i, "cache hit");
                self.promote(key, &value, &missed, i).await?;
                return Ok(Some(value));
            }
            level.stats.record_miss();
            missed.push(i);
            current = self.chain.parent_of(i);
        }

        trace!(key = %key, "cache miss");
        Ok(None)
    }

    async fn promote(&self, key: &str, value: &Value, missed: &[usize], hit: usize) -> Result<()> {
        let mut source = hit;
        for &target in missed.iter().rev() {
            let lifetime = self.chain.level(source).backend.lifetime(key).await?;
            match lifetime {
                Some(lifetime) if lifetime.is_promotable() => {
                    let level = self.chain.level(target);
                    level.backend.store(key, value, lifetime.as_ttl()).await?;
                    level.stats.record_promotion();
                    debug!(key = %key, from = source, to = target, ?lifetime, "promoted");
                }
                _ => {
                    debug!(key = %key, from = source, to = target, "not promoted, lifetime too short");
                    return Ok(());
                }
            }
            source = target;
        }
        Ok(())
    }

    /// Remaining lifetime of `key` at this level only
    pub async fn ttl(&self, key: &str) -> Result<Option<Lifetime>> {
        self.backend().lifetime(key).await
    }

    /// Write `value` here and at every farther level
    ///
    /// `ttl = None` stores a key that never expires.
    pub async fn set<T>(&self, key: &str, value: &T, ttl: Option<Duration>) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        let value = serde_json::to_value(value)?;
        self.set_value(key, &value, ttl).await
    }

    /// Write a JSON value here and at every farther level
    pub async fn set_value(&self, key: &str, value: &Value, ttl: Option<Duration>) -> Result<()> {
        let mut current = Some(self.index);
        while let Some(i) = current {
            let level = self.chain.level(i);
            level.backend.store(key, value, ttl).await?;
            level.stats.record_write();
            current = self.chain.parent_of(i);
        }
        trace!(key = %key, ?ttl, "cache set");
        Ok(())
    }

    /// Delete keys here and at every farther level, then broadcast from the root
    pub async fn del<K: AsRef<str>>(&self, keys: &[K]) -> Result<()> {
        let keys: Vec<String> = keys.iter().map(|k| k.as_ref().to_string()).collect();
        if keys.is_empty() {
            return Ok(());
        }

        let mut i = self.index;
        loop {
            let level = self.chain.level(i);
            level.backend.remove(&keys).await?;
            level.stats.record_deletes(keys.len());
            match self.chain.parent_of(i) {
                Some(parent) => i = parent,
                None => break,
            }
        }

        self.chain.level(i).backend.broadcast_invalidation(&keys).await?;
        debug!(keys = ?keys, "cache delete");
        Ok(())
    }

    async fn scan(&self, pattern: KeyPattern, limit: Option<usize>) -> Result<BTreeMap<String, String>> {
        let mut current = Some(self.index);
        while let Some(i) = current {
            let found = self.chain.level(i).backend.scan(&pattern, limit).await?;
            if !found.is_empty() {
                return Ok(found);
            }
            current = self.chain.parent_of(i);
        }
        Ok(BTreeMap::new())
    }

    /// Keys starting with `prefix`; the first level with any match wins
    pub async fn has_prefix(&self, prefix: &str, limit: Option<usize>) -> Result<BTreeMap<String, String>> {
        self.scan(KeyPattern::Prefix(prefix.to_string()), limit).await
    }

    /// Keys ending with `suffix`; the first level with any match wins
    pub async fn has_suffix(&self, suffix: &str, limit: Option<usize>) -> Result<BTreeMap<String, String>> {
        self.scan(KeyPattern::Suffix(suffix.to_string()), limit).await
    }

    /// Keys containing `needle`; the first level with any match wins
    pub async fn contains(&self, needle: &str, limit: Option<usize>) -> Result<BTreeMap<String, String>> {
        self.scan(KeyPattern::Substring(needle.to_string()), limit).await
    }

    /// Add 1 to the counter at `key`
    pub async fn incr(&self, key: &str) -> Result<i64> {
        self.incr_by(key, 1).await
    }

    /// Add `step` to the counter at `key`
    ///
    /// Counters live at the root. Copies promoted into nearer levels by
    /// earlier reads are dropped after every increment.
    pub async fn incr_by(&self, key: &str, step: i64) -> Result<i64> {
        let root = self.root_index();
        let value = self.chain.level(root).backend.increment_by(key, step).await?;
        self.chain.invalidate_nearer(root, &[key.to_string()]).await;
        Ok(value)
    }

    /// Add `step` to the floating point counter at `key`, at the root
    pub async fn incr_by_float(&self, key: &str, step: f64) -> Result<f64> {
        let root = self.root_index();
        let value = self.chain.level(root).backend.increment_by_float(key, step).await?;
        self.chain.invalidate_nearer(root, &[key.to_string()]).await;
        Ok(value)
    }

    fn pubsub_backend(&self) -> Result<&Arc<dyn Backend>> {
        let mut current = Some(self.index);
        while let Some(i) = current {
            let backend = &self.chain.level(i).backend;
            if backend.native_pubsub() {
                return Ok(backend);
            }
            current = self.chain.parent_of(i);
        }
        Err(Error::UnsupportedPubSub)
    }

    /// Publish on the nearest level with pub/sub support
    pub async fn publish(&self, channel: &str, message: &str) -> Result<()> {
        self.pubsub_backend()?.publish(channel, message).await
    }

    /// Subscribe on the nearest level with pub/sub support
    pub async fn subscribe<F>(&self, channels: &[&str], handler: F) -> Result<Subscription>
    where
        F: Fn(&str, &str) + Send + Sync + 'static,
    {
        let channels: Vec<String> = channels.iter().map(|c| c.to_string()).collect();
        let handler: MessageHandler = Arc::new(handler);
        self.pubsub_backend()?.subscribe(&channels, handler).await
    }

    /// Pattern-subscribe on the nearest level with pub/sub support
    pub async fn psubscribe<F>(&self, patterns: &[&str], handler: F) -> Result<Subscription>
    where
        F: Fn(&str, &str) + Send + Sync + 'static,
    {
        let patterns: Vec<String> = patterns.iter().map(|p| p.to_string()).collect();
        let handler: MessageHandler = Arc::new(handler);
        self.pubsub_backend()?.psubscribe(&patterns, handler).await
    }

    /// Close this level's store; other levels stay open
    pub async fn close(&self) -> Result<()> {
        self.backend().close().await
    }
}

#[async_trait]
impl Getter for Cache {
    async fn has(&self, key: &str) -> Result<bool> {
        Cache::has(self, key).await
    }

    async fn get_value(&self, key: &str) -> Result<Option<Value>> {
        Cache::get_value(self, key).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::collections::HashMap;

    /// Map-backed level recording what reached it
    #[derive(Default)]
    struct MemoryBackend {
        entries: Mutex<HashMap<String, (Value, Option<Duration>)>>,
        broadcasts: Mutex<Vec<Vec<String>>>,
    }

    #[async_trait]
    impl Backend for MemoryBackend {
        fn kind(&self) -> &'static str {
            "memory"
        }

        async fn contains(&self, key: &str) -> Result<bool> {
            Ok(self.entries.lock().contains_key(key))
        }

        async fn fetch(&self, key: &str) -> Result<Option<Value>> {
            Ok(self.entries.lock().get(key).map(|(v, _)| v.clone()))
        }

        async fn lifetime(&self, key: &str) -> Result<Option<Lifetime>> {
            Ok(self.entries.lock().get(key).map(|(_, ttl)| match ttl {
                None => Lifetime::Persistent,
                Some(ttl) => Lifetime::Remaining(*ttl),
            }))
        }

        async fn store(&self, key: &str, value: &Value, ttl: Option<Duration>) -> Result<()> {
            self.entries.lock().insert(key.to_string(), (value.clone(), ttl));
            Ok(())
        }

        async fn remove(&self, keys: &[String]) -> Result<()> {
            let mut entries = self.entries.lock();
            for key in keys {
                entries.remove(key);
            }
            Ok(())
        }

        async fn scan(&self, pattern: &KeyPattern, _limit: Option<usize>) -> Result<BTreeMap<String, String>> {
            Ok(self
                .entries
                .lock()
                .iter()
                .filter(|(k, _)| pattern.matches(k))
                .map(|(k, (v, _))| (k.clone(), v.to_string()))
                .collect())
        }

        async fn increment_by(&self, key: &str, step: i64) -> Result<i64> {
            let mut entries = self.entries.lock();
            let current = entries.get(key).and_then(|(v, _)| v.as_i64()).unwrap_or(0);
            entries.insert(key.to_string(), (json!(current + step), None));
            Ok(current + step)
        }

        async fn increment_by_float(&self, key: &str, step: f64) -> Result<f64> {
            let mut entries = self.entries.lock();
            let current = entries.get(key).and_then(|(v, _)| v.as_f64()).unwrap_or(0.0);
            entries.insert(key.to_string(), (json!(current + step), None));
            Ok(current + step)
        }

        async fn broadcast_invalidation(&self, keys: &[String]) -> Result<()> {
            self.broadcasts.lock().push(keys.to_vec());
            Ok(())
        }

        async fn close(&self) -> Result<()> {
            Ok(())
        }
    }

    fn chain_of(n: usize) -> (Cache, Vec<Arc<MemoryBackend>>) {
        let backends: Vec<Arc<MemoryBackend>> = (0..n).map(|_| Arc::new(MemoryBackend::default())).collect();
        let dyns: Vec<Arc<dyn Backend>> = backends.iter().map(|b| Arc::clone(b) as Arc<dyn Backend>).collect();
        (Chain::build(dyns).unwrap(), backends)
    }

    #[test]
    fn test_build_requires_two_levels() {
        let one: Vec<Arc<dyn Backend>> = vec![Arc::new(MemoryBackend::default())];
        assert!(matches!(Chain::build(one), Err(Error::Config(_))));
        assert!(matches!(Chain::build(Vec::new()), Err(Error::Config(_))));
    }

    #[test]
    fn test_links() {
        let (head, _) = chain_of(3);

        assert_eq!(head.index(), 0);
        assert!(head.children().is_none());
        let mid = head.parent().unwrap();
        assert_eq!(mid.index(), 1);
        assert_eq!(mid.children().unwrap().index(), 0);
        let root = mid.parent().unwrap();
        assert_eq!(root.index(), 2);
        assert!(root.parent().is_none());
        assert_eq!(head.root().index(), 2);
    }

    #[test]
    fn test_links_are_write_once() {
        let (head, _) = chain_of(3);
        let root = head.root();

        assert!(!head.set_parent(&root).unwrap());
        assert_eq!(head.parent().unwrap().index(), 1);
        assert!(!root.set_children(&head).unwrap());
        assert_eq!(root.children().unwrap().index(), 1);
    }

    #[test]
    fn test_links_reject_cycles_and_foreign_chains() {
        let (head, _) = chain_of(2);
        let (other, _) = chain_of(2);
        let root = head.root();

        assert!(matches!(root.set_parent(&head), Err(Error::Config(_))));
        assert!(matches!(root.set_parent(&other.root()), Err(Error::Config(_))));
        assert!(matches!(head.set_children(&other), Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_write_through() {
        let (head, backends) = chain_of(3);

        head.set("k", &42, Some(Duration::from_secs(60))).await.unwrap();

        for backend in &backends {
            assert_eq!(backend.fetch("k").await.unwrap(), Some(json!(42)));
            assert_eq!(
                backend.lifetime("k").await.unwrap(),
                Some(Lifetime::Remaining(Duration::from_secs(60)))
            );
        }
        assert_eq!(head.stats().writes(), 1);
    }

    #[tokio::test]
    async fn test_read_through_promotes_every_missed_level() {
        let (head, backends) = chain_of(3);
        backends[2]
            .store("k", &json!("v"), Some(Duration::from_secs(30)))
            .await
            .unwrap();

        assert_eq!(head.get_value("k").await.unwrap(), Some(json!("v")));

        assert_eq!(backends[1].fetch("k").await.unwrap(), Some(json!("v")));
        assert_eq!(backends[0].fetch("k").await.unwrap(), Some(json!("v")));
        assert_eq!(
            backends[0].lifetime("k").await.unwrap(),
            Some(Lifetime::Remaining(Duration::from_secs(30)))
        );
        assert_eq!(head.stats().misses(), 1);
        assert_eq!(head.stats().promotions(), 1);
        assert_eq!(head.root().stats().hits(), 1);
    }

    #[tokio::test]
    async fn test_short_lifetime_is_not_promoted() {
        let (head, backends) = chain_of(2);
        backends[1]
            .store("k", &json!(1), Some(Duration::from_millis(400)))
            .await
            .unwrap();

        assert_eq!(head.get_value("k").await.unwrap(), Some(json!(1)));
        assert_eq!(backends[0].fetch("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_has_cascades_without_promoting() {
        let (head, backends) = chain_of(2);
        backends[1].store("k", &json!(1), None).await.unwrap();

        assert!(head.has("k").await.unwrap());
        assert!(!head.has("missing").await.unwrap());
        assert!(!backends[0].contains("k").await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_reaches_root_and_broadcasts() {
        let (head, backends) = chain_of(2);
        head.set("a", &1, None).await.unwrap();
        head.set("b", &2, None).await.unwrap();

        head.del(&["a", "b"]).await.unwrap();

        for backend in &backends {
            assert!(!backend.contains("a").await.unwrap());
            assert!(!backend.contains("b").await.unwrap());
        }
        assert!(backends[0].broadcasts.lock().is_empty());
        assert_eq!(*backends[1].broadcasts.lock(), vec![vec!["a".to_string(), "b".to_string()]]);
    }

    #[tokio::test]
    async fn test_invalidate_nearer_stays_below() {
        let (head, backends) = chain_of(3);
        head.set("k", &1, None).await.unwrap();

        head.chain().invalidate_nearer(2, &["k".to_string()]).await;

        assert!(!backends[0].contains("k").await.unwrap());
        assert!(!backends[1].contains("k").await.unwrap());
        assert!(backends[2].contains("k").await.unwrap());
    }

    #[tokio::test]
    async fn test_counters_live_at_root() {
        let (head, backends) = chain_of(3);

        assert_eq!(head.incr("hits").await.unwrap(), 1);
        assert_eq!(head.incr_by("hits", 4).await.unwrap(), 5);
        assert_eq!(head.root().incr("hits").await.unwrap(), 6);

        assert!(!backends[0].contains("hits").await.unwrap());
        assert!(!backends[1].contains("hits").await.unwrap());
        assert_eq!(backends[2].fetch("hits").await.unwrap(), Some(json!(6)));
    }

    #[tokio::test]
    async fn test_increment_drops_promoted_copies() {
        let (head, backends) = chain_of(3);

        head.incr_by("n", 2).await.unwrap();
        assert_eq!(head.get_value("n").await.unwrap(), Some(json!(2)));
        assert!(backends[0].contains("n").await.unwrap());
        assert!(backends[1].contains("n").await.unwrap());

        head.incr("n").await.unwrap();
        assert!(!backends[0].contains("n").await.unwrap());
        assert!(!backends[1].contains("n").await.unwrap());
        assert_eq!(head.get_value("n").await.unwrap(), Some(json!(3)));

        head.incr_by_float("n", 0.5).await.unwrap();
        assert!(!backends[0].contains("n").await.unwrap());
        assert_eq!(head.get_value("n").await.unwrap(), Some(json!(3.5)));
    }

    #[tokio::test]
    async fn test_scan_falls_back_to_parent_when_empty() {
        let (head, backends) = chain_of(2);
        backends[1].store("user:1", &json!("a"), None).await.unwrap();

        let found = head.has_prefix("user:", None).await.unwrap();
        assert_eq!(found.len(), 1);

        backends[0].store("user:2", &json!("b"), None).await.unwrap();
        let found = head.has_prefix("user:", None).await.unwrap();
        assert_eq!(found.keys().collect::<Vec<_>>(), vec!["user:2"]);
    }

    #[tokio::test]
    async fn test_pubsub_unsupported_without_native_level() {
        let (head, _) = chain_of(2);

        assert!(matches!(head.publish("c", "m").await, Err(Error::UnsupportedPubSub)));
        assert!(matches!(
            head.subscribe(&["c"], |_, _| {}).await,
            Err(Error::UnsupportedPubSub)
        ));
    }
}

//! Embedded cache tier on top of `tierkv`
//!
//! Values are stored as JSON [`Envelope`]s. Expiry is checked on read;
//! expired entries are deleted when they are seen.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use serde_json::Value;
use tierkv::{StoreOptions, TierStore};
use tracing::{debug, info, trace};

use crate::backend::{limit_reached, Backend, KeyPattern, Lifetime};
use crate::envelope::Envelope;
use crate::error::{Error, Result};
use crate::getter::{coerce_f64, coerce_i64, coerce_string};

/// Cache tier backed by an on-disk `tierkv` store
pub struct EmbeddedBackend {
    store: TierStore,
    path: PathBuf,
    /// Serializes read-modify-write counter updates
    counter_lock: Mutex<()>,
}

impl EmbeddedBackend {
    /// Open a fresh store at `path`
    ///
    /// An existing directory at `path` is wiped; an existing file is an error.
    pub fn open<P: AsRef<Path>>(path: P, options: StoreOptions) -> Result<Self> {
        let path = path.as_ref();
        match std::fs::metadata(path) {
            Ok(meta) if !meta.is_dir() => return Err(Error::NotADirectory(path.to_path_buf())),
            Ok(_) => {
                debug!(path = %path.display(), "clearing previous embedded cache");
                std::fs::remove_dir_all(path)?;
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        let store = TierStore::open_with(path, options)?;
        info!(path = %path.display(), "embedded cache opened");

        Ok(Self {
            store,
            path: path.to_path_buf(),
            counter_lock: Mutex::new(()),
        })
    }

    /// Directory of the underlying store
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The underlying store
    pub fn kv(&self) -> &TierStore {
        &self.store
    }

    /// Live envelope at `key`, deleting it if expired
    fn read_envelope(&self, key: &str) -> Result<Option<Envelope>> {
        let Some(raw) = self.store.get(key.as_bytes())? else {
            return Ok(None);
        };

        let envelope = Envelope::decode(&raw)?;
        if envelope.is_expired(Utc::now()) {
            trace!(key = %key, "expired entry removed on read");
            // A concurrent reader may have removed it already
            self.store.delete(key.as_bytes())?;
            return Ok(None);
        }
        Ok(Some(envelope))
    }

    fn write(&self, key: &str, value: Value, ttl: Option<Duration>) -> Result<()> {
        let envelope = Envelope::new(value, ttl);
        self.store.put(key.as_bytes(), &envelope.encode()?)?;
        Ok(())
    }
}

#[async_trait]
impl Backend for EmbeddedBackend {
    fn kind(&self) -> &'static str {
        "embedded"
    }

    async fn contains(&self, key: &str) -> Result<bool> {
        Ok(self.read_envelope(key)?.is_some())
    }

    async fn fetch(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.read_envelope(key)?.map(|envelope| envelope.data))
    }

    async fn lifetime(&self, key: &str) -> Result<Option<Lifetime>> {
        Ok(self
            .read_envelope(key)?
            .and_then(|envelope| envelope.lifetime(Utc::now())))
    }

    async fn store(&self, key: &str, value: &Value, ttl: Option<Duration>) -> Result<()> {
        self.write(key, value.clone(), ttl)
    }

    async fn remove(&self, keys: &[String]) -> Result<()> {
        for key in keys {
            self.store.delete(key.as_bytes())?;
        }
        Ok(())
    }

    async fn scan(&self, pattern: &KeyPattern, limit: Option<usize>) -> Result<BTreeMap<String, String>> {
        let entries: Box<dyn Iterator<Item = tierkv::Result<(Vec<u8>, Vec<u8>)>> + Send + '_> = match pattern {
            KeyPattern::Prefix(prefix) => Box::new(self.store.scan_prefix(prefix.as_bytes())),
            _ => Box::new(self.store.iter()),
        };

        let now = Utc::now();
        let mut found = BTreeMap::new();
        let mut expired = Vec::new();

        for entry in entries {
            if limit_reached(found.len(), limit) {
                break;
            }
            let (key, raw) = entry?;
            let Ok(key) = String::from_utf8(key) else {
                continue;
            };
            if !pattern.matches(&key) {
                continue;
            }

            let envelope = Envelope::decode(&raw)?;
            if envelope.is_expired(now) {
                expired.push(key);
                continue;
            }
            found.insert(key, coerce_string(&envelope.data).unwrap_or_default());
        }

        for key in &expired {
            self.store.delete(key.as_bytes())?;
        }
        if !expired.is_empty() {
            trace!(count = expired.len(), "expired entries reclaimed during scan");
        }

        Ok(found)
    }

    async fn increment_by(&self, key: &str, step: i64) -> Result<i64> {
        let _guard = self.counter_lock.lock();
        let current = match self.read_envelope(key)? {
            Some(envelope) => {
                coerce_i64(&envelope.data).ok_or_else(|| Error::NotANumber(key.to_string()))?
            }
            None => 0,
        };
        let next = current
            .checked_add(step)
            .ok_or_else(|| Error::NotANumber(key.to_string()))?;
        self.write(key, Value::from(next), None)?;
        Ok(next)
    }

    async fn increment_by_float(&self, key: &str, step: f64) -> Result<f64> {
        let _guard = self.counter_lock.lock();
        let current = match self.read_envelope(key)? {
            Some(envelope) => {
                coerce_f64(&envelope.data).ok_or_else(|| Error::NotANumber(key.to_string()))?
            }
            None => 0.0,
        };
        let next = current + step;
        if !next.is_finite() {
            return Err(Error::NotANumber(key.to_string()));
        }
        self.write(key, Value::from(next), None)?;
        Ok(next)
    }

    async fn close(&self) -> Result<()> {
        self.store.close()?;
        info!(path = %self.path.display(), "embedded cache closed");
        Ok(())
    }
}

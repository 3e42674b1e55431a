//! In-memory string keyspace with lazy expiry

use std::time::{Duration, Instant};

use ahash::AHashMap;
use parking_lot::Mutex;

use crate::glob;

/// Default `SCAN` page size
pub const DEFAULT_SCAN_COUNT: usize = 10;

#[derive(Debug, Clone)]
struct Entry {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Why a counter update was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterError {
    /// Stored value is not a number of the requested kind
    NotANumber,
    /// Result does not fit
    Overflow,
}

/// All keys held by the server
#[derive(Debug, Default)]
pub struct Keyspace {
    entries: Mutex<AHashMap<Vec<u8>, Entry>>,
}

impl Keyspace {
    /// Create an empty keyspace
    pub fn new() -> Self {
        Self::default()
    }

    /// Value of a live key
    pub fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        let mut entries = self.entries.lock();
        live(&mut entries, key, Instant::now()).map(|entry| entry.value.clone())
    }

    /// Store `value`, replacing any previous value and expiry
    pub fn set(&self, key: &[u8], value: Vec<u8>, ttl: Option<Duration>) {
        let expires_at = ttl.map(|ttl| Instant::now() + ttl);
        self.entries
            .lock()
            .insert(key.to_vec(), Entry { value, expires_at });
    }

    /// Remove keys, returning how many were live
    pub fn del(&self, keys: &[&[u8]]) -> i64 {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        keys.iter()
            .filter(|key| match entries.remove(**key) {
                Some(entry) => !entry.is_expired(now),
                None => false,
            })
            .count() as i64
    }

    /// Count live keys among `keys` (duplicates count twice, like Redis)
    pub fn exists(&self, keys: &[&[u8]]) -> i64 {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        keys.iter()
            .filter(|key| live(&mut entries, key, now).is_some())
            .count() as i64
    }

    /// Remaining lifetime: -2 when missing, -1 without expiry, else seconds
    pub fn ttl(&self, key: &[u8]) -> i64 {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        match live(&mut entries, key, now) {
            None => -2,
            Some(Entry { expires_at: None, .. }) => -1,
            Some(Entry {
                expires_at: Some(at),
                ..
            }) => {
                let remaining = at.saturating_duration_since(now).as_millis() as i64;
                (remaining + 500) / 1000
            }
        }
    }

    /// Add `step` to the integer stored at `key` (missing counts as 0)
    pub fn incr_by(&self, key: &[u8], step: i64) -> Result<i64, CounterError> {
        let now = Instant::now();
        let mut entries = self.entries.lock();

        let (current, expires_at) = match live(&mut entries, key, now) {
            Some(entry) => (
                parse_number::<i64>(&entry.value).ok_or(CounterError::NotANumber)?,
                entry.expires_at,
            ),
            None => (0, None),
        };

        let next = current.checked_add(step).ok_or(CounterError::Overflow)?;
        entries.insert(
            key.to_vec(),
            Entry {
                value: next.to_string().into_bytes(),
                expires_at,
            },
        );
        Ok(next)
    }

    /// Add `step` to the float stored at `key` (missing counts as 0)
    pub fn incr_by_float(&self, key: &[u8], step: f64) -> Result<f64, CounterError> {
        let now = Instant::now();
        let mut entries = self.entries.lock();

        let (current, expires_at) = match live(&mut entries, key, now) {
            Some(entry) => (
                parse_number::<f64>(&entry.value).ok_or(CounterError::NotANumber)?,
                entry.expires_at,
            ),
            None => (0.0, None),
        };

        let next = current + step;
        if !next.is_finite() {
            return Err(CounterError::Overflow);
        }

        entries.insert(
            key.to_vec(),
            Entry {
                value: next.to_string().into_bytes(),
                expires_at,
            },
        );
        Ok(next)
    }

    /// One page of a cursor scan over the key set in byte order
    ///
    /// The cursor is an offset into the sorted live keys; `0` ends the scan.
    pub fn scan(&self, cursor: usize, pattern: Option<&[u8]>, count: usize) -> (usize, Vec<Vec<u8>>) {
        let now = Instant::now();
        let mut keys: Vec<Vec<u8>> = {
            let mut entries = self.entries.lock();
            entries.retain(|_, entry| !entry.is_expired(now));
            entries.keys().cloned().collect()
        };
        keys.sort();

        let count = count.max(1);
        let end = (cursor + count).min(keys.len());
        let page = keys
            .get(cursor..end)
            .unwrap_or_default()
            .iter()
            .filter(|key| pattern.map_or(true, |p| glob::matches(p, key)))
            .cloned()
            .collect();

        let next = if end >= keys.len() { 0 } else { end };
        (next, page)
    }

    /// Number of live keys
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .lock()
            .values()
            .filter(|entry| !entry.is_expired(now))
            .count()
    }

    /// Whether no live keys remain
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every key
    pub fn flush(&self) {
        self.entries.lock().clear();
    }
}

fn live<'a>(
    entries: &'a mut AHashMap<Vec<u8>, Entry>,
    key: &[u8],
    now: Instant,
) -> Option<&'a Entry> {
    if entries.get(key).is_some_and(|entry| entry.is_expired(now)) {
        entries.remove(key);
        return None;
    }
    entries.get(key)
}

fn parse_number<T: std::str::FromStr>(raw: &[u8]) -> Option<T> {
    std::str::from_utf8(raw).ok()?.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_get_del() {
        let ks = Keyspace::new();
        ks.set(b"k", b"v".to_vec(), None);

        let probe: [&[u8]; 3] = [b"k", b"k", b"missing"];
        let doomed: [&[u8]; 2] = [b"k", b"missing"];

        assert_eq!(ks.get(b"k"), Some(b"v".to_vec()));
        assert_eq!(ks.exists(&probe), 2);
        assert_eq!(ks.del(&doomed), 1);
        assert_eq!(ks.get(b"k"), None);
    }

    #[test]
    fn test_expiry() {
        let ks = Keyspace::new();
        ks.set(b"gone", b"v".to_vec(), Some(Duration::from_millis(0)));
        ks.set(b"kept", b"v".to_vec(), Some(Duration::from_secs(60)));

        assert_eq!(ks.get(b"gone"), None);
        assert_eq!(ks.ttl(b"gone"), -2);
        assert_eq!(ks.ttl(b"kept"), 60);
        assert_eq!(ks.len(), 1);
    }

    #[test]
    fn test_ttl_without_expiry() {
        let ks = Keyspace::new();
        ks.set(b"k", b"v".to_vec(), None);
        assert_eq!(ks.ttl(b"k"), -1);
    }

    #[test]
    fn test_counters() {
        let ks = Keyspace::new();

        assert_eq!(ks.incr_by(b"n", 1), Ok(1));
        assert_eq!(ks.incr_by(b"n", 41), Ok(42));
        assert_eq!(ks.incr_by_float(b"n", 0.5), Ok(42.5));
        assert_eq!(ks.incr_by(b"n", 1), Err(CounterError::NotANumber));

        ks.set(b"text", b"abc".to_vec(), None);
        assert_eq!(ks.incr_by(b"text", 1), Err(CounterError::NotANumber));

        ks.set(b"max", i64::MAX.to_string().into_bytes(), None);
        assert_eq!(ks.incr_by(b"max", 1), Err(CounterError::Overflow));
    }

    #[test]
    fn test_scan_pages_until_zero_cursor() {
        let ks = Keyspace::new();
        for i in 0..25 {
            ks.set(format!("user:{:02}", i).as_bytes(), b"v".to_vec(), None);
        }
        ks.set(b"other", b"v".to_vec(), None);

        let mut cursor = 0;
        let mut found = Vec::new();
        loop {
            let (next, page) = ks.scan(cursor, Some(&b"user:*"[..]), 10);
            found.extend(page);
            if next == 0 {
                break;
            }
            cursor = next;
        }

        assert_eq!(found.len(), 25);
        assert_eq!(found[0], b"user:00".to_vec());
    }
}

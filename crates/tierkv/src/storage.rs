//! Storage engine implementation
//!
//! File layout:
//! - `data.tkv`: append-only log with a header followed by put/delete records
//!
//! The ordered index (key -> value location) lives in memory and is rebuilt by
//! replaying the log on open.

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use parking_lot::RwLock;

use crate::error::{Error, Result};
use crate::parser::{
    create_header, encode_record, parse_header, parse_record, RecordOp, FORMAT_VERSION,
    HEADER_LEN, RECORD_HEADER_LEN,
};

/// Name of the log file inside the store directory
pub const DATA_FILE: &str = "data.tkv";

/// Default maximum value size (1 MB)
pub const DEFAULT_MAX_VALUE_SIZE: usize = 1024 * 1024;

/// Default maximum log size (1 GB)
pub const DEFAULT_MAX_DB_SIZE: u64 = 1024 * 1024 * 1024;

/// Store tuning options
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct StoreOptions {
    /// Largest value accepted by `put`
    pub max_value_size: usize,
    /// Largest size the log file may grow to
    pub max_db_size: u64,
    /// fsync the log after every write
    pub sync_writes: bool,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            max_value_size: DEFAULT_MAX_VALUE_SIZE,
            max_db_size: DEFAULT_MAX_DB_SIZE,
            sync_writes: false,
        }
    }
}

/// Location of a live value inside the log
#[derive(Debug, Clone, Copy)]
struct ValueSlot {
    offset: u64,
    len: u32,
}

/// TierStore is the main database handle
pub struct TierStore {
    /// Path to the database directory
    path: PathBuf,

    /// Tuning options
    options: StoreOptions,

    /// Log file handle
    data_file: RwLock<File>,

    /// In-memory ordered index: key -> value location
    index: RwLock<BTreeMap<Vec<u8>, ValueSlot>>,

    /// Current log size
    db_size: RwLock<u64>,

    /// Is the database closed?
    closed: RwLock<bool>,
}

impl TierStore {
    /// Open or create a store at the given directory with default options
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with(path, StoreOptions::default())
    }

    /// Open or create a store at the given directory
    ///
    /// # Arguments
    /// * `path` - Directory path for the store files
    /// * `options` - Size limits and sync behavior
    pub fn open_with<P: AsRef<Path>>(path: P, options: StoreOptions) -> Result<Self> {
        let path = path.as_ref();
        std::fs::create_dir_all(path)?;

        let data_path = path.join(DATA_FILE);

        let (data_file, index, db_size) = if data_path.exists() {
            Self::open_existing(&data_path)?
        } else {
            Self::create_new(&data_path)?
        };

        Ok(TierStore {
            path: path.to_path_buf(),
            options,
            data_file: RwLock::new(data_file),
            index: RwLock::new(index),
            db_size: RwLock::new(db_size),
            closed: RwLock::new(false),
        })
    }

    fn open_existing(data_path: &Path) -> Result<(File, BTreeMap<Vec<u8>, ValueSlot>, u64)> {
        let mut data_file = OpenOptions::new().read(true).write(true).open(data_path)?;

        let mut buf = Vec::new();
        data_file.read_to_end(&mut buf)?;
        parse_header(&buf)?;

        let mut index = BTreeMap::new();
        let mut offset = HEADER_LEN;

        while offset < buf.len() {
            match parse_record(&buf[offset..]) {
                Ok((rest, record)) => {
                    let consumed = buf.len() - offset - rest.len();
                    match record.op {
                        RecordOp::Put => {
                            let value_offset = offset + RECORD_HEADER_LEN + record.key.len();
                            index.insert(
                                record.key.to_vec(),
                                ValueSlot {
                                    offset: value_offset as u64,
                                    len: record.value.len() as u32,
                                },
                            );
                        }
                        RecordOp::Delete => {
                            index.remove(record.key);
                        }
                    }
                    offset += consumed;
                }
                // Torn tail from an interrupted write, drop it
                Err(nom::Err::Incomplete(_)) => break,
                Err(e) => return Err(e.into()),
            }
        }

        if offset < buf.len() {
            data_file.set_len(offset as u64)?;
        }

        Ok((data_file, index, offset as u64))
    }

    fn create_new(data_path: &Path) -> Result<(File, BTreeMap<Vec<u8>, ValueSlot>, u64)> {
        let mut data_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(data_path)?;

        let header = create_header(FORMAT_VERSION);
        data_file.write_all(&header)?;

        Ok((data_file, BTreeMap::new(), header.len() as u64))
    }

    fn ensure_open(&self) -> Result<()> {
        if *self.closed.read() {
            return Err(Error::Closed);
        }
        Ok(())
    }

    fn append(&self, record: &[u8]) -> Result<u64> {
        let mut db_size = self.db_size.write();
        if *db_size + record.len() as u64 > self.options.max_db_size {
            return Err(Error::DatabaseFull(*db_size));
        }

        let mut data_file = self.data_file.write();
        let offset = data_file.seek(SeekFrom::End(0))?;
        data_file.write_all(record)?;
        if self.options.sync_writes {
            data_file.sync_data()?;
        }

        *db_size = offset + record.len() as u64;
        Ok(offset)
    }

    /// Put a value under `key`, replacing any previous value
    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.ensure_open()?;

        if value.len() > self.options.max_value_size {
            return Err(Error::ValueTooLarge {
                size: value.len(),
                max: self.options.max_value_size,
            });
        }

        let record = encode_record(RecordOp::Put, key, value);

        // Log order and index order must agree for the same key
        let mut index = self.index.write();
        let offset = self.append(&record)?;
        index.insert(
            key.to_vec(),
            ValueSlot {
                offset: offset + (RECORD_HEADER_LEN + key.len()) as u64,
                len: value.len() as u32,
            },
        );

        Ok(())
    }

    /// Get the value stored under `key`
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.ensure_open()?;

        let slot = match self.index.read().get(key) {
            Some(slot) => *slot,
            None => return Ok(None),
        };

        self.read_slot(slot).map(Some)
    }

    fn read_slot(&self, slot: ValueSlot) -> Result<Vec<u8>> {
        let mut data_file = self.data_file.write();
        data_file.seek(SeekFrom::Start(slot.offset))?;

        let mut value = vec![0u8; slot.len as usize];
        data_file.read_exact(&mut value)?;

        Ok(value)
    }

    /// Check whether `key` holds a value
    pub fn contains(&self, key: &[u8]) -> Result<bool> {
        self.ensure_open()?;
        Ok(self.index.read().contains_key(key))
    }

    /// Delete `key`
    ///
    /// Returns `false` when the key was not present. Deleting a missing key is
    /// not an error, so concurrent deletes of the same key both succeed.
    pub fn delete(&self, key: &[u8]) -> Result<bool> {
        self.ensure_open()?;

        let mut index = self.index.write();
        if !index.contains_key(key) {
            return Ok(false);
        }

        let record = encode_record(RecordOp::Delete, key, &[]);
        self.append(&record)?;

        Ok(index.remove(key).is_some())
    }

    /// Snapshot of all keys in order
    pub fn keys(&self) -> Result<Vec<Vec<u8>>> {
        self.ensure_open()?;
        Ok(self.index.read().keys().cloned().collect())
    }

    /// Iterate over all live entries in key order
    ///
    /// The key set is snapshotted up front; values are read lazily.
    pub fn iter(&self) -> impl Iterator<Item = Result<(Vec<u8>, Vec<u8>)>> + '_ {
        let entries: Vec<(Vec<u8>, ValueSlot)> = if *self.closed.read() {
            Vec::new()
        } else {
            self.index
                .read()
                .iter()
                .map(|(key, slot)| (key.clone(), *slot))
                .collect()
        };

        entries
            .into_iter()
            .map(move |(key, slot)| self.read_slot(slot).map(|value| (key, value)))
    }

    /// Iterate over live entries whose key starts with `prefix`
    pub fn scan_prefix<'a>(
        &'a self,
        prefix: &[u8],
    ) -> impl Iterator<Item = Result<(Vec<u8>, Vec<u8>)>> + 'a {
        let entries: Vec<(Vec<u8>, ValueSlot)> = if *self.closed.read() {
            Vec::new()
        } else {
            self.index
                .read()
                .range(prefix.to_vec()..)
                .take_while(|(key, _)| key.starts_with(prefix))
                .map(|(key, slot)| (key.clone(), *slot))
                .collect()
        };

        entries
            .into_iter()
            .map(move |(key, slot)| self.read_slot(slot).map(|value| (key, value)))
    }

    /// Get the number of live keys
    pub fn len(&self) -> usize {
        self.index.read().len()
    }

    /// Check if the store is empty
    pub fn is_empty(&self) -> bool {
        self.index.read().is_empty()
    }

    /// Directory backing this store
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Size of the log file in bytes
    pub fn size(&self) -> u64 {
        *self.db_size.read()
    }

    /// fsync the log
    pub fn sync(&self) -> Result<()> {
        self.ensure_open()?;
        self.data_file.write().sync_all()?;
        Ok(())
    }

    /// Close the store and fsync all changes
    pub fn close(&self) -> Result<()> {
        let mut closed = self.closed.write();
        if *closed {
            return Ok(());
        }

        self.data_file.write().sync_all()?;
        *closed = true;

        Ok(())
    }
}

impl Drop for TierStore {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_create_and_open() {
        let dir = TempDir::new().unwrap();
        let db = TierStore::open(dir.path()).unwrap();

        assert_eq!(db.len(), 0);
        assert!(db.is_empty());

        db.close().unwrap();

        let db = TierStore::open(dir.path()).unwrap();
        assert_eq!(db.len(), 0);
    }

    #[test]
    fn test_put_and_get() {
        let dir = TempDir::new().unwrap();
        let db = TierStore::open(dir.path()).unwrap();

        db.put(b"user:1", b"Alice").unwrap();

        assert_eq!(db.len(), 1);
        assert_eq!(db.get(b"user:1").unwrap().unwrap(), b"Alice");
        assert!(db.get(b"user:2").unwrap().is_none());
    }

    #[test]
    fn test_overwrite() {
        let dir = TempDir::new().unwrap();
        let db = TierStore::open(dir.path()).unwrap();

        db.put(b"k", b"first").unwrap();
        db.put(b"k", b"second value").unwrap();

        assert_eq!(db.len(), 1);
        assert_eq!(db.get(b"k").unwrap().unwrap(), b"second value");
    }

    #[test]
    fn test_delete() {
        let dir = TempDir::new().unwrap();
        let db = TierStore::open(dir.path()).unwrap();

        db.put(b"k", b"v").unwrap();
        assert!(db.delete(b"k").unwrap());
        assert!(!db.delete(b"k").unwrap());
        assert!(!db.contains(b"k").unwrap());
        assert!(db.is_empty());
    }

    #[test]
    fn test_concurrent_put_and_delete_replay_to_same_state() {
        let dir = TempDir::new().unwrap();
        let db = TierStore::open(dir.path()).unwrap();

        std::thread::scope(|scope| {
            for writer in 0..4u8 {
                let db = &db;
                scope.spawn(move || {
                    for round in 0..200u32 {
                        let key = format!("k{}", round % 8);
                        if (round + writer as u32) % 3 == 0 {
                            db.delete(key.as_bytes()).unwrap();
                        } else {
                            db.put(key.as_bytes(), &[writer]).unwrap();
                        }
                    }
                });
            }
        });

        let live: Vec<(Vec<u8>, Vec<u8>)> = db.iter().map(|entry| entry.unwrap()).collect();
        db.close().unwrap();
        drop(db);

        let reopened = TierStore::open(dir.path()).unwrap();
        let replayed: Vec<(Vec<u8>, Vec<u8>)> = reopened.iter().map(|entry| entry.unwrap()).collect();
        assert_eq!(replayed, live);
    }

    #[test]
    fn test_ordered_iteration() {
        let dir = TempDir::new().unwrap();
        let db = TierStore::open(dir.path()).unwrap();

        db.put(b"b", b"2").unwrap();
        db.put(b"a", b"1").unwrap();
        db.put(b"c", b"3").unwrap();

        let entries: Vec<_> = db.iter().map(|e| e.unwrap()).collect();
        assert_eq!(
            entries,
            vec![
                (b"a".to_vec(), b"1".to_vec()),
                (b"b".to_vec(), b"2".to_vec()),
                (b"c".to_vec(), b"3".to_vec()),
            ]
        );
    }

    #[test]
    fn test_scan_prefix() {
        let dir = TempDir::new().unwrap();
        let db = TierStore::open(dir.path()).unwrap();

        db.put(b"user:1", b"a").unwrap();
        db.put(b"user:2", b"b").unwrap();
        db.put(b"session:1", b"c").unwrap();

        let keys: Vec<_> = db.scan_prefix(b"user:").map(|e| e.unwrap().0).collect();
        assert_eq!(keys, vec![b"user:1".to_vec(), b"user:2".to_vec()]);
    }

    #[test]
    fn test_value_too_large() {
        let dir = TempDir::new().unwrap();
        let options = StoreOptions {
            max_value_size: 16,
            ..StoreOptions::default()
        };
        let db = TierStore::open_with(dir.path(), options).unwrap();

        let result = db.put(b"k", &[b'x'; 17]);
        assert!(matches!(result, Err(Error::ValueTooLarge { size: 17, max: 16 })));
    }

    #[test]
    fn test_database_full() {
        let dir = TempDir::new().unwrap();
        let options = StoreOptions {
            max_db_size: 64,
            ..StoreOptions::default()
        };
        let db = TierStore::open_with(dir.path(), options).unwrap();

        let result = db.put(b"k", &[b'x'; 60]);
        assert!(matches!(result, Err(Error::DatabaseFull(_))));
    }

    #[test]
    fn test_persistence() {
        let dir = TempDir::new().unwrap();

        {
            let db = TierStore::open(dir.path()).unwrap();
            db.put(b"a", b"line 1").unwrap();
            db.put(b"b", b"line 2").unwrap();
            db.put(b"a", b"line 3").unwrap();
            db.delete(b"b").unwrap();
            db.close().unwrap();
        }

        {
            let db = TierStore::open(dir.path()).unwrap();
            assert_eq!(db.len(), 1);
            assert_eq!(db.get(b"a").unwrap().unwrap(), b"line 3");
            assert!(db.get(b"b").unwrap().is_none());
        }
    }

    #[test]
    fn test_torn_tail_is_dropped() {
        let dir = TempDir::new().unwrap();

        {
            let db = TierStore::open(dir.path()).unwrap();
            db.put(b"a", b"kept").unwrap();
            db.close().unwrap();
        }

        let data_path = dir.path().join(DATA_FILE);
        let intact = std::fs::metadata(&data_path).unwrap().len();
        {
            let mut file = OpenOptions::new().append(true).open(&data_path).unwrap();
            let record = encode_record(RecordOp::Put, b"b", b"lost");
            file.write_all(&record[..record.len() - 2]).unwrap();
        }

        let db = TierStore::open(dir.path()).unwrap();
        assert_eq!(db.len(), 1);
        assert_eq!(db.get(b"a").unwrap().unwrap(), b"kept");
        assert_eq!(db.size(), intact);
    }

    #[test]
    fn test_close_twice() {
        let dir = TempDir::new().unwrap();
        let db = TierStore::open(dir.path()).unwrap();

        db.close().unwrap();
        db.close().unwrap();
    }

    #[test]
    fn test_put_after_close() {
        let dir = TempDir::new().unwrap();
        let db = TierStore::open(dir.path()).unwrap();

        db.close().unwrap();

        assert!(matches!(db.put(b"k", b"v"), Err(Error::Closed)));
        assert!(matches!(db.get(b"k"), Err(Error::Closed)));
    }
}

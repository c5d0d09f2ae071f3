//! Embedded key-value storage using RocksDB
//!
//! Backs the persistent ledger, spin-limit counters and game log. Multi-key
//! updates go through one `WriteBatch` so they land atomically.

use crate::errors::StorageError;
use rocksdb::{Direction, IteratorMode, Options, WriteBatch, DB};
use serde::{de::DeserializeOwned, Serialize};
use std::path::Path;
use std::sync::Arc;

#[derive(Clone)]
pub struct KvStore {
    db: Arc<DB>,
}

impl KvStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);

        let db = DB::open(&opts, path.as_ref()).map_err(|e| {
            StorageError::DatabaseOpenFailed(format!("{}: {}", path.as_ref().display(), e))
        })?;
        Ok(Self { db: Arc::new(db) })
    }

    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        self.db
            .get(key)
            .map_err(|e| StorageError::ReadFailed(e.to_string()))
    }

    pub fn get_json<T: DeserializeOwned>(&self, key: &[u8]) -> Result<Option<T>, StorageError> {
        match self.get(key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn write(&self, batch: KvBatch) -> Result<(), StorageError> {
        self.db.write(batch.inner).map_err(StorageError::from)
    }

    /// Up to `limit` entries whose key starts with `prefix`, in key order
    pub fn scan_prefix(&self, prefix: &[u8], limit: usize) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StorageError> {
        let mut rows = Vec::new();
        for item in self.db.iterator(IteratorMode::From(prefix, Direction::Forward)) {
            let (key, value) = item.map_err(|e| StorageError::ReadFailed(e.to_string()))?;
            if !key.starts_with(prefix) || rows.len() >= limit {
                break;
            }
            rows.push((key.to_vec(), value.to_vec()));
        }
        Ok(rows)
    }

    /// Keys in `[prefix, end)` that still start with `prefix`
    pub fn keys_before(&self, prefix: &[u8], end: &[u8]) -> Result<Vec<Vec<u8>>, StorageError> {
        let mut keys = Vec::new();
        for item in self.db.iterator(IteratorMode::From(prefix, Direction::Forward)) {
            let (key, _) = item.map_err(|e| StorageError::ReadFailed(e.to_string()))?;
            if !key.starts_with(prefix) || &key[..] >= end {
                break;
            }
            keys.push(key.to_vec());
        }
        Ok(keys)
    }
}

/// Pending set of writes applied in one atomic commit
#[derive(Default)]
pub struct KvBatch {
    inner: WriteBatch,
}

impl KvBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, key: &[u8], value: &[u8]) {
        self.inner.put(key, value);
    }

    pub fn put_json<T: Serialize>(&mut self, key: &[u8], value: &T) -> Result<(), StorageError> {
        let bytes = serde_json::to_vec(value)
            .map_err(|e| StorageError::WriteFailed(format!("Failed to encode value: {}", e)))?;
        self.inner.put(key, bytes);
        Ok(())
    }

    pub fn delete(&mut self, key: &[u8]) {
        self.inner.delete(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_and_prefix_scan() {
        let dir = tempfile::tempdir().unwrap();
        let store = KvStore::open(dir.path()).unwrap();

        let mut batch = KvBatch::new();
        batch.put(b"a:1", b"one");
        batch.put(b"a:2", b"two");
        batch.put(b"b:1", b"other");
        store.write(batch).unwrap();

        let rows = store.scan_prefix(b"a:", 10).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].1, b"one".to_vec());

        assert_eq!(store.scan_prefix(b"a:", 1).unwrap().len(), 1);
        assert_eq!(store.keys_before(b"a:", b"a:2").unwrap(), vec![b"a:1".to_vec()]);
    }

    #[test]
    fn test_json_round_trip_and_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = KvStore::open(dir.path()).unwrap();

        let mut batch = KvBatch::new();
        batch.put_json(b"k", &vec![1u32, 2, 3]).unwrap();
        store.write(batch).unwrap();
        assert_eq!(store.get_json::<Vec<u32>>(b"k").unwrap(), Some(vec![1, 2, 3]));

        let mut batch = KvBatch::new();
        batch.delete(b"k");
        store.write(batch).unwrap();
        assert_eq!(store.get(b"k").unwrap(), None);
    }
}

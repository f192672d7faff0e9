use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use entmap_types::{KeyId, RawKey};
use tracing::trace;

use crate::error::{StoreError, StoreResult};
use crate::record::Record;
use crate::traits::Datastore;

/// In-memory, HashMap-based datastore.
///
/// Intended for tests and embedding. Records are held behind a `RwLock` and
/// cloned on read and write. Numeric ids are allocated from a counter shared
/// by all kinds. Call counters and write failure injection support tests of
/// the layers above.
pub struct InMemoryDatastore {
    records: RwLock<HashMap<RawKey, Record>>,
    next_id: AtomicI64,
    puts: AtomicUsize,
    gets: AtomicUsize,
    deletes: AtomicUsize,
    fail_puts: AtomicBool,
    fail_deletes: AtomicBool,
}

impl InMemoryDatastore {
    /// Create a new empty datastore.
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            next_id: AtomicI64::new(1),
            puts: AtomicUsize::new(0),
            gets: AtomicUsize::new(0),
            deletes: AtomicUsize::new(0),
            fail_puts: AtomicBool::new(false),
            fail_deletes: AtomicBool::new(false),
        }
    }

    fn read_lock(&self) -> StoreResult<RwLockReadGuard<'_, HashMap<RawKey, Record>>> {
        self.records
            .read()
            .map_err(|_| StoreError::Backend("lock poisoned".into()))
    }

    fn write_lock(&self) -> StoreResult<RwLockWriteGuard<'_, HashMap<RawKey, Record>>> {
        self.records
            .write()
            .map_err(|_| StoreError::Backend("lock poisoned".into()))
    }

    /// Number of records currently stored.
    pub fn len(&self) -> usize {
        self.read_lock().map(|m| m.len()).unwrap_or(0)
    }

    /// Returns `true` if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether a record exists under `key`.
    pub fn contains(&self, key: &RawKey) -> bool {
        self.read_lock().is_ok_and(|m| m.contains_key(key))
    }

    /// A copy of the record under `key`, bypassing the call counters.
    pub fn peek(&self, key: &RawKey) -> Option<Record> {
        self.read_lock().ok().and_then(|m| m.get(key).cloned())
    }

    /// All stored keys, sorted.
    pub fn keys(&self) -> Vec<RawKey> {
        let mut keys: Vec<RawKey> = self
            .read_lock()
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        keys
    }

    /// Remove every record. The id counter keeps running.
    pub fn clear(&self) {
        if let Ok(mut map) = self.write_lock() {
            map.clear();
        }
    }

    /// Number of `put` calls served so far.
    pub fn put_calls(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    pub fn get_calls(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    pub fn delete_calls(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }

    /// Make subsequent `put` calls fail with [`StoreError::Unavailable`].
    pub fn fail_puts(&self, fail: bool) {
        self.fail_puts.store(fail, Ordering::SeqCst);
    }

    /// Make subsequent `delete` calls fail with [`StoreError::Unavailable`].
    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    fn allocate(&self, key: &RawKey) -> RawKey {
        if key.is_complete() {
            return key.clone();
        }
        key.with_id(KeyId::Long(self.next_id.fetch_add(1, Ordering::SeqCst)))
    }
}

impl Default for InMemoryDatastore {
    fn default() -> Self {
        Self::new()
    }
}

fn require_complete(keys: &[RawKey]) -> StoreResult<()> {
    match keys.iter().find(|k| !k.is_complete()) {
        Some(key) => Err(StoreError::IncompleteKey(key.clone())),
        None => Ok(()),
    }
}

#[async_trait]
impl Datastore for InMemoryDatastore {
    async fn put(&self, records: Vec<Record>) -> StoreResult<Vec<RawKey>> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("writes disabled".into()));
        }
        let mut map = self.write_lock()?;
        let mut keys = Vec::with_capacity(records.len());
        for mut record in records {
            let key = self.allocate(&record.key);
            record.key = key.clone();
            trace!(key = %key, "put");
            map.insert(key.clone(), record);
            keys.push(key);
        }
        Ok(keys)
    }

    async fn get(&self, keys: &[RawKey]) -> StoreResult<Vec<Option<Record>>> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        require_complete(keys)?;
        let map = self.read_lock()?;
        trace!(count = keys.len(), "get");
        Ok(keys.iter().map(|k| map.get(k).cloned()).collect())
    }

    async fn delete(&self, keys: &[RawKey]) -> StoreResult<()> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("deletes disabled".into()));
        }
        require_complete(keys)?;
        let mut map = self.write_lock()?;
        for key in keys {
            trace!(key = %key, "delete");
            map.remove(key);
        }
        Ok(())
    }
}

impl std::fmt::Debug for InMemoryDatastore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryDatastore")
            .field("record_count", &self.len())
            .finish()
    }
}

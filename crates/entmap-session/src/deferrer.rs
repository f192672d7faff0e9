use std::collections::BTreeMap;
use std::mem;
use std::sync::Arc;

use entmap_types::RawKey;
use tracing::debug;

use crate::deferred::{Deferred, UndeferTarget};
use crate::error::FlushError;
use crate::session::Session;
use crate::traits::{BatchWriter, KeyDerivation};

/// Counts of what a flush wrote.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushSummary {
    pub saved: usize,
    pub deleted: usize,
}

impl FlushSummary {
    pub fn is_empty(&self) -> bool {
        self.saved == 0 && self.deleted == 0
    }
}

/// Pending writes of one unit of work.
///
/// Operations on values with a known key are coalesced per key: the last
/// deferred save or delete wins. Values that need an auto-allocated id have
/// no key yet and are kept in order, each one saved exactly once.
pub struct Deferrer<K> {
    keys: K,
    /// `None` marks a pending delete.
    operations: BTreeMap<RawKey, Option<Deferred>>,
    autogenerated_id_saves: Vec<Deferred>,
}

impl<K: KeyDerivation> Deferrer<K> {
    pub fn new(keys: K) -> Self {
        Self {
            keys,
            operations: BTreeMap::new(),
            autogenerated_id_saves: Vec::new(),
        }
    }

    pub fn keys(&self) -> &K {
        &self.keys
    }

    /// Queue `value` for saving and make it the session's object for its key.
    pub fn defer_save(&mut self, session: &mut Session, value: Deferred) -> Result<(), K::Error> {
        match &value {
            Deferred::Record(record) => {
                if !record.key.is_complete() {
                    self.autogenerated_id_saves.push(value);
                    return Ok(());
                }
                let key = record.key.clone();
                session.add_value(key.clone(), Arc::new(record.clone()));
                self.operations.insert(key, Some(value));
            }
            Deferred::Entity(entity) => {
                if self.keys.requires_autogenerated_id(&**entity) {
                    self.autogenerated_id_saves.push(value);
                    return Ok(());
                }
                let key = self.keys.key_of(&**entity)?;
                session.add_value(key.clone(), entity.clone());
                self.operations.insert(key, Some(value));
            }
        }
        Ok(())
    }

    /// Queue a delete of `key`, replacing any pending save of it.
    pub fn defer_delete(&mut self, session: &mut Session, key: RawKey) {
        session.mark_deleted(key.clone());
        self.operations.insert(key, None);
    }

    /// Cancel the pending operation for `target`. The session is left as is.
    pub fn undefer(&mut self, target: impl Into<UndeferTarget>) -> Result<(), K::Error> {
        let target = target.into();
        match &target {
            UndeferTarget::Key(key) => {
                self.operations.remove(key);
            }
            UndeferTarget::Record(record) if !record.key.is_complete() => {
                self.remove_autogenerated(&target);
            }
            UndeferTarget::Record(record) => {
                self.operations.remove(&record.key);
            }
            UndeferTarget::Entity(entity) => {
                if self.keys.requires_autogenerated_id(&**entity) {
                    self.remove_autogenerated(&target);
                } else {
                    let key = self.keys.key_of(&**entity)?;
                    self.operations.remove(&key);
                }
            }
        }
        Ok(())
    }

    fn remove_autogenerated(&mut self, target: &UndeferTarget) {
        if let Some(pos) = self
            .autogenerated_id_saves
            .iter()
            .position(|d| d.is_same(target))
        {
            self.autogenerated_id_saves.remove(pos);
        }
    }

    /// Number of pending operations.
    pub fn len(&self) -> usize {
        self.operations.len() + self.autogenerated_id_saves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty() && self.autogenerated_id_saves.is_empty()
    }

    /// Whether an operation is pending for `key`, and whether it is a save.
    pub fn pending(&self, key: &RawKey) -> Option<bool> {
        self.operations.get(key).map(Option::is_some)
    }

    /// Drop every pending operation without writing.
    pub fn clear(&mut self) {
        self.operations.clear();
        self.autogenerated_id_saves.clear();
    }

    /// Write every pending operation.
    ///
    /// The pending set is taken before anything is issued, so it is empty
    /// afterwards whether or not the writes succeed. The save batch and the
    /// delete batch are issued concurrently and both are awaited.
    pub async fn flush<W: BatchWriter>(&mut self, writer: &W) -> Result<FlushSummary, FlushError<W::Error>> {
        if self.is_empty() {
            return Ok(FlushSummary::default());
        }

        let operations = mem::take(&mut self.operations);
        let mut saves = Vec::with_capacity(operations.len() + self.autogenerated_id_saves.len());
        let mut deletes = Vec::new();
        for (key, op) in operations {
            match op {
                Some(value) => saves.push(value),
                None => deletes.push(key),
            }
        }
        saves.append(&mut self.autogenerated_id_saves);

        let summary = FlushSummary {
            saved: saves.len(),
            deleted: deletes.len(),
        };
        debug!(saves = summary.saved, deletes = summary.deleted, "flushing deferred operations");

        let save = async {
            if saves.is_empty() {
                Ok(())
            } else {
                writer.save_batch(saves).await
            }
        };
        let delete = async {
            if deletes.is_empty() {
                Ok(())
            } else {
                writer.delete_batch(deletes).await
            }
        };
        let (saved, deleted) = tokio::join!(save, delete);
        saved.map_err(FlushError::Save)?;
        deleted.map_err(FlushError::Delete)?;
        Ok(summary)
    }
}

impl<K> std::fmt::Debug for Deferrer<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Deferrer")
            .field("operations", &self.operations.len())
            .field("autogenerated_id_saves", &self.autogenerated_id_saves.len())
            .finish()
    }
}

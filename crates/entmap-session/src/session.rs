use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use entmap_types::{RawKey, Shared};

/// What the session knows about a key.
#[derive(Clone)]
pub enum SessionEntry {
    /// The object most recently loaded or saved under the key.
    Present(Shared),
    /// The key was deleted in this unit of work.
    Deleted,
}

impl SessionEntry {
    pub fn value(&self) -> Option<&Shared> {
        match self {
            Self::Present(v) => Some(v),
            Self::Deleted => None,
        }
    }

    pub fn is_deleted(&self) -> bool {
        matches!(self, Self::Deleted)
    }
}

impl std::fmt::Debug for SessionEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Present(_) => f.write_str("Present"),
            Self::Deleted => f.write_str("Deleted"),
        }
    }
}

/// Per-unit-of-work identity cache.
///
/// Loading a key twice within one unit of work yields the same instance. A
/// deleted key stays in the session so later loads see it as absent without
/// touching the store.
#[derive(Default)]
pub struct Session {
    entries: HashMap<RawKey, SessionEntry>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `value` as the current object for `key`.
    pub fn add_value(&mut self, key: RawKey, value: Shared) {
        self.entries.insert(key, SessionEntry::Present(value));
    }

    pub fn mark_deleted(&mut self, key: RawKey) {
        self.entries.insert(key, SessionEntry::Deleted);
    }

    pub fn get(&self, key: &RawKey) -> Option<&SessionEntry> {
        self.entries.get(key)
    }

    /// The cached object for `key` as a `T`, if present and of that type.
    pub fn get_as<T: Any + Send + Sync>(&self, key: &RawKey) -> Option<Arc<T>> {
        self.entries
            .get(key)
            .and_then(SessionEntry::value)
            .and_then(|v| v.clone().downcast::<T>().ok())
    }

    pub fn contains(&self, key: &RawKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn is_deleted(&self, key: &RawKey) -> bool {
        self.entries.get(key).is_some_and(SessionEntry::is_deleted)
    }

    /// Forget `key` entirely.
    pub fn remove(&mut self, key: &RawKey) -> Option<SessionEntry> {
        self.entries.remove(key)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &RawKey> {
        self.entries.keys()
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("entries", &self.entries.len())
            .finish()
    }
}

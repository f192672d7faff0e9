use std::any::Any;
use std::fmt;
use std::sync::Arc;

use entmap_store::Record;
use entmap_types::{Key, RawKey, Shared};

/// A value waiting in the deferrer to be saved.
#[derive(Clone)]
pub enum Deferred {
    /// A registered entity instance.
    Entity(Shared),
    /// An already translated record.
    Record(Record),
}

impl Deferred {
    pub fn entity<T: Any + Send + Sync>(value: T) -> Self {
        Self::Entity(Arc::new(value))
    }

    /// The record's key, if this is a record.
    pub fn record_key(&self) -> Option<&RawKey> {
        match self {
            Self::Record(r) => Some(&r.key),
            Self::Entity(_) => None,
        }
    }

    /// Whether `self` is the same deferred value as `other`: the same
    /// allocation for entities, equal contents for records.
    pub fn is_same(&self, other: &UndeferTarget) -> bool {
        match (self, other) {
            (Self::Entity(a), UndeferTarget::Entity(b)) => same_allocation(a, b),
            (Self::Record(a), UndeferTarget::Record(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Debug for Deferred {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Entity(_) => f.write_str("Deferred::Entity"),
            Self::Record(r) => write!(f, "Deferred::Record({})", r.key),
        }
    }
}

impl From<Record> for Deferred {
    fn from(record: Record) -> Self {
        Self::Record(record)
    }
}

impl<T: Any + Send + Sync> From<Arc<T>> for Deferred {
    fn from(value: Arc<T>) -> Self {
        Self::Entity(value)
    }
}

/// What to cancel a pending operation by.
#[derive(Clone)]
pub enum UndeferTarget {
    Key(RawKey),
    Record(Record),
    /// An entity instance. Objects needing an auto-allocated id are matched
    /// by identity, everything else by its derived key.
    Entity(Shared),
}

impl fmt::Debug for UndeferTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Key(k) => write!(f, "UndeferTarget::Key({k})"),
            Self::Record(r) => write!(f, "UndeferTarget::Record({})", r.key),
            Self::Entity(_) => f.write_str("UndeferTarget::Entity"),
        }
    }
}

impl From<RawKey> for UndeferTarget {
    fn from(key: RawKey) -> Self {
        Self::Key(key)
    }
}

impl<T: ?Sized> From<Key<T>> for UndeferTarget {
    fn from(key: Key<T>) -> Self {
        Self::Key(key.into_raw())
    }
}

impl From<Record> for UndeferTarget {
    fn from(record: Record) -> Self {
        Self::Record(record)
    }
}

impl<T: Any + Send + Sync> From<Arc<T>> for UndeferTarget {
    fn from(value: Arc<T>) -> Self {
        Self::Entity(value)
    }
}

impl From<&Deferred> for UndeferTarget {
    fn from(value: &Deferred) -> Self {
        match value {
            Deferred::Entity(e) => Self::Entity(e.clone()),
            Deferred::Record(r) => Self::Record(r.clone()),
        }
    }
}

fn same_allocation(a: &Shared, b: &Shared) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

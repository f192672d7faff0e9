use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

use serde::{Deserialize, Serialize};

/// The id portion of a logical key.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum KeyId {
    /// Numeric id, usually allocated by the store.
    Long(i64),
    /// Application-chosen string id.
    Name(String),
    /// No id yet; the store allocates one on first save.
    Unassigned,
}

impl KeyId {
    pub fn is_assigned(&self) -> bool {
        !matches!(self, Self::Unassigned)
    }
}

impl From<i64> for KeyId {
    fn from(id: i64) -> Self {
        Self::Long(id)
    }
}

impl From<&str> for KeyId {
    fn from(name: &str) -> Self {
        Self::Name(name.to_string())
    }
}

impl From<String> for KeyId {
    fn from(name: String) -> Self {
        Self::Name(name)
    }
}

impl From<Option<i64>> for KeyId {
    fn from(id: Option<i64>) -> Self {
        id.map_or(Self::Unassigned, Self::Long)
    }
}

/// Untyped logical key: the kind of record plus its id.
///
/// This is the identifier used to deduplicate pending operations and to
/// index the session cache.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RawKey {
    kind: String,
    id: KeyId,
}

impl RawKey {
    pub fn new(kind: impl Into<String>, id: impl Into<KeyId>) -> Self {
        Self {
            kind: kind.into(),
            id: id.into(),
        }
    }

    /// A key whose id will be allocated by the store.
    pub fn incomplete(kind: impl Into<String>) -> Self {
        Self::new(kind, KeyId::Unassigned)
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn id(&self) -> &KeyId {
        &self.id
    }

    /// Returns `true` once the key carries an id.
    pub fn is_complete(&self) -> bool {
        self.id.is_assigned()
    }

    /// The same kind with a different id.
    pub fn with_id(&self, id: impl Into<KeyId>) -> Self {
        Self::new(self.kind.clone(), id)
    }
}

impl fmt::Display for RawKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.id {
            KeyId::Long(id) => write!(f, "{}({id})", self.kind),
            KeyId::Name(name) => write!(f, "{}(\"{name}\")", self.kind),
            KeyId::Unassigned => write!(f, "{}(?)", self.kind),
        }
    }
}

/// Typed logical key for entities of type `T`.
pub struct Key<T: ?Sized> {
    raw: RawKey,
    _marker: PhantomData<fn() -> T>,
}

impl<T: ?Sized> Key<T> {
    pub fn from_raw(raw: RawKey) -> Self {
        Self {
            raw,
            _marker: PhantomData,
        }
    }

    pub fn raw(&self) -> &RawKey {
        &self.raw
    }

    pub fn into_raw(self) -> RawKey {
        self.raw
    }

    pub fn kind(&self) -> &str {
        self.raw.kind()
    }

    pub fn id(&self) -> &KeyId {
        self.raw.id()
    }
}

impl<T: ?Sized> Clone for Key<T> {
    fn clone(&self) -> Self {
        Self::from_raw(self.raw.clone())
    }
}

impl<T: ?Sized> PartialEq for Key<T> {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl<T: ?Sized> Eq for Key<T> {}

impl<T: ?Sized> Hash for Key<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.raw.hash(state);
    }
}

impl<T: ?Sized> PartialOrd for Key<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T: ?Sized> Ord for Key<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.raw.cmp(&other.raw)
    }
}

impl<T: ?Sized> fmt::Debug for Key<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Key({})", self.raw)
    }
}

impl<T: ?Sized> fmt::Display for Key<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.raw, f)
    }
}

impl<T: ?Sized> From<Key<T>> for RawKey {
    fn from(key: Key<T>) -> Self {
        key.raw
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Thing;

    #[test]
    fn completeness() {
        assert!(RawKey::new("Thing", 7).is_complete());
        assert!(RawKey::new("Thing", "alpha").is_complete());
        assert!(!RawKey::incomplete("Thing").is_complete());
        assert!(!RawKey::new("Thing", None::<i64>).is_complete());
    }

    #[test]
    fn display_formats() {
        assert_eq!(RawKey::new("Thing", 7).to_string(), "Thing(7)");
        assert_eq!(RawKey::new("Thing", "a").to_string(), "Thing(\"a\")");
        assert_eq!(RawKey::incomplete("Thing").to_string(), "Thing(?)");
    }

    #[test]
    fn typed_key_equality_follows_raw() {
        let a: Key<Thing> = Key::from_raw(RawKey::new("Thing", 1));
        let b: Key<Thing> = Key::from_raw(RawKey::new("Thing", 1));
        assert_eq!(a, b);
        assert_eq!(a.clone().into_raw(), RawKey::new("Thing", 1));
        assert_ne!(a, Key::from_raw(RawKey::new("Thing", 2)));
    }

    #[test]
    fn with_id_keeps_kind() {
        let key = RawKey::incomplete("Thing").with_id(42);
        assert_eq!(key, RawKey::new("Thing", 42));
    }
}

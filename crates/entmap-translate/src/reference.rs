use std::any::Any;
use std::fmt;
use std::sync::Arc;

use entmap_types::{Dynamic, Key, RawKey, Shared, TypeInfo};

use crate::entity::Entity;
use crate::shape::{FieldType, ReferenceShape, Shape, Translatable};

/// A reference to another entity that may carry the loaded target.
///
/// Stored as the target's key. When the holding field is marked for eager
/// loading, the target is fetched before the holder is translated and is
/// available through [`Ref::get`].
pub struct Ref<T> {
    key: Key<T>,
    value: Option<Arc<T>>,
}

impl<T: Entity> Ref<T> {
    pub fn to(key: Key<T>) -> Self {
        Self { key, value: None }
    }

    /// A reference to `entity`, which must already have an id.
    pub fn of(entity: &T) -> Option<Self> {
        entity.key().map(Self::to)
    }

    /// A reference that already carries its target.
    pub fn resolved(key: Key<T>, value: Arc<T>) -> Self {
        Self {
            key,
            value: Some(value),
        }
    }

    pub fn key(&self) -> &Key<T> {
        &self.key
    }

    /// The loaded target, if it was loaded.
    pub fn get(&self) -> Option<&T> {
        self.value.as_deref()
    }

    pub fn value(&self) -> Option<&Arc<T>> {
        self.value.as_ref()
    }

    pub fn is_loaded(&self) -> bool {
        self.value.is_some()
    }
}

/// An unset reference; saving it fails until it is pointed somewhere.
impl<T: Entity> Default for Ref<T> {
    fn default() -> Self {
        Self::to(Key::from_raw(RawKey::incomplete(T::KIND)))
    }
}

impl<T> Clone for Ref<T> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            value: self.value.clone(),
        }
    }
}

/// References are equal when they point at the same key.
impl<T> PartialEq for Ref<T> {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl<T> fmt::Debug for Ref<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ref")
            .field("key", &self.key)
            .field("loaded", &self.value.is_some())
            .finish()
    }
}

fn ref_key<T: Entity>(value: &dyn Any) -> Option<&RawKey> {
    value.downcast_ref::<Ref<T>>().map(|r| r.key.raw())
}

fn ref_build<T: Entity>(key: RawKey, value: Option<Shared>) -> Dynamic {
    let value = value.and_then(|v| v.downcast::<T>().ok());
    Box::new(Ref::<T> {
        key: Key::from_raw(key),
        value,
    })
}

impl<T: Entity> Translatable for Ref<T> {
    fn field_type() -> FieldType {
        FieldType::new(
            TypeInfo::of::<Self>(),
            Shape::Reference(ReferenceShape {
                target: TypeInfo::of::<T>(),
                key: ref_key::<T>,
                build: ref_build::<T>,
                holds_value: true,
            }),
        )
    }
}

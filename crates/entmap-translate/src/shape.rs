//! Static type descriptors.
//!
//! Every type that can appear as a field implements [`Translatable`], which
//! describes its shape to the translator factories: a plain value, a
//! sequence, an optional, a reference, or an embedded class. Shapes carry
//! monomorphized function pointers so the factories can walk and rebuild
//! values without knowing their static type.

use std::any::Any;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use entmap_types::{Dynamic, Key, Path, RawKey, Shared, TypeInfo};

use crate::error::RegistrationResult;
use crate::factory::CreateContext;
use crate::translator::ObjectCodec;

/// A type that can be stored in a field.
pub trait Translatable: Any + Send {
    fn field_type() -> FieldType;
}

/// Runtime description of a field's static type.
#[derive(Clone, Copy, Debug)]
pub struct FieldType {
    info: TypeInfo,
    shape: Shape,
}

impl FieldType {
    pub fn new(info: TypeInfo, shape: Shape) -> Self {
        Self { info, shape }
    }

    /// A leaf type handled by a value translator.
    pub fn plain<T: Any>() -> Self {
        Self::new(TypeInfo::of::<T>(), Shape::Plain)
    }

    pub fn of<T: Translatable>() -> Self {
        T::field_type()
    }

    pub fn info(&self) -> TypeInfo {
        self.info
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }
}

#[derive(Clone, Copy, Debug)]
pub enum Shape {
    Plain,
    Sequence(SequenceShape),
    Optional(OptionalShape),
    Reference(ReferenceShape),
    Class(ClassShape),
}

/// Element access for list-like containers.
#[derive(Clone, Copy)]
pub struct SequenceShape {
    pub component: fn() -> FieldType,
    /// Exact element count for fixed-size arrays.
    pub fixed_len: Option<usize>,
    pub elements: for<'a> fn(&'a dyn Any) -> Option<Vec<&'a dyn Any>>,
    /// Rebuild the container. `None` means an element had the wrong type.
    pub collect: fn(Vec<Dynamic>) -> Option<Dynamic>,
}

/// Access for `Option<T>`.
#[derive(Clone, Copy)]
pub struct OptionalShape {
    pub inner: fn() -> FieldType,
    pub get: for<'a> fn(&'a dyn Any) -> Option<Option<&'a dyn Any>>,
    pub some: fn(Dynamic) -> Option<Dynamic>,
    pub none: fn() -> Dynamic,
}

/// Access for key-valued fields.
#[derive(Clone, Copy)]
pub struct ReferenceShape {
    pub target: TypeInfo,
    pub key: for<'a> fn(&'a dyn Any) -> Option<&'a RawKey>,
    /// Build the field value from the stored key and, if it was loaded
    /// eagerly, the referenced object.
    pub build: fn(RawKey, Option<Shared>) -> Dynamic,
    /// Whether the field can hold a loaded object.
    pub holds_value: bool,
}

/// Builder for embedded classes.
#[derive(Clone, Copy)]
pub struct ClassShape {
    pub build: fn(&Path, &mut CreateContext<'_>) -> RegistrationResult<Arc<dyn ObjectCodec>>,
}

macro_rules! opaque_debug {
    ($($ty:ident),*) => {
        $(impl std::fmt::Debug for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(stringify!($ty))
            }
        })*
    };
}

opaque_debug!(SequenceShape, OptionalShape, ReferenceShape, ClassShape);

// ---------------------------------------------------------------------------
// Plain values
// ---------------------------------------------------------------------------

macro_rules! plain {
    ($($ty:ty),* $(,)?) => {
        $(impl Translatable for $ty {
            fn field_type() -> FieldType {
                FieldType::plain::<$ty>()
            }
        })*
    };
}

plain!(
    bool,
    i8,
    i16,
    i32,
    i64,
    u8,
    u16,
    u32,
    f32,
    f64,
    String,
    DateTime<Utc>,
    RawKey,
    chrono_tz::Tz,
);

// ---------------------------------------------------------------------------
// Sequences
// ---------------------------------------------------------------------------

fn downcast_all<T: Any>(values: Vec<Dynamic>) -> Option<Vec<T>> {
    values
        .into_iter()
        .map(|v| v.downcast::<T>().ok().map(|b| *b))
        .collect()
}

fn vec_elements<T: Any>(value: &dyn Any) -> Option<Vec<&dyn Any>> {
    value
        .downcast_ref::<Vec<T>>()
        .map(|v| v.iter().map(|e| e as &dyn Any).collect())
}

fn vec_collect<T: Any + Send>(values: Vec<Dynamic>) -> Option<Dynamic> {
    downcast_all::<T>(values).map(|v| Box::new(v) as Dynamic)
}

impl<T: Translatable> Translatable for Vec<T> {
    fn field_type() -> FieldType {
        FieldType::new(
            TypeInfo::of::<Self>(),
            Shape::Sequence(SequenceShape {
                component: T::field_type,
                fixed_len: None,
                elements: vec_elements::<T>,
                collect: vec_collect::<T>,
            }),
        )
    }
}

fn boxed_elements<T: Any>(value: &dyn Any) -> Option<Vec<&dyn Any>> {
    value
        .downcast_ref::<Box<[T]>>()
        .map(|v| v.iter().map(|e| e as &dyn Any).collect())
}

fn boxed_collect<T: Any + Send>(values: Vec<Dynamic>) -> Option<Dynamic> {
    downcast_all::<T>(values).map(|v| Box::new(v.into_boxed_slice()) as Dynamic)
}

/// A boxed slice is sized by the stored list on load.
impl<T: Translatable> Translatable for Box<[T]> {
    fn field_type() -> FieldType {
        FieldType::new(
            TypeInfo::of::<Self>(),
            Shape::Sequence(SequenceShape {
                component: T::field_type,
                fixed_len: None,
                elements: boxed_elements::<T>,
                collect: boxed_collect::<T>,
            }),
        )
    }
}

fn array_elements<T: Any, const N: usize>(value: &dyn Any) -> Option<Vec<&dyn Any>> {
    value
        .downcast_ref::<[T; N]>()
        .map(|v| v.iter().map(|e| e as &dyn Any).collect())
}

fn array_collect<T: Any + Send, const N: usize>(values: Vec<Dynamic>) -> Option<Dynamic> {
    let items = downcast_all::<T>(values)?;
    <[T; N]>::try_from(items).ok().map(|a| Box::new(a) as Dynamic)
}

impl<T: Translatable, const N: usize> Translatable for [T; N] {
    fn field_type() -> FieldType {
        FieldType::new(
            TypeInfo::of::<Self>(),
            Shape::Sequence(SequenceShape {
                component: T::field_type,
                fixed_len: Some(N),
                elements: array_elements::<T, N>,
                collect: array_collect::<T, N>,
            }),
        )
    }
}

// ---------------------------------------------------------------------------
// Optionals
// ---------------------------------------------------------------------------

fn option_get<T: Any>(value: &dyn Any) -> Option<Option<&dyn Any>> {
    value
        .downcast_ref::<Option<T>>()
        .map(|o| o.as_ref().map(|v| v as &dyn Any))
}

fn option_some<T: Any + Send>(value: Dynamic) -> Option<Dynamic> {
    value.downcast::<T>().ok().map(|v| Box::new(Some(*v)) as Dynamic)
}

fn option_none<T: Any + Send>() -> Dynamic {
    Box::new(None::<T>)
}

impl<T: Translatable> Translatable for Option<T> {
    fn field_type() -> FieldType {
        FieldType::new(
            TypeInfo::of::<Self>(),
            Shape::Optional(OptionalShape {
                inner: T::field_type,
                get: option_get::<T>,
                some: option_some::<T>,
                none: option_none::<T>,
            }),
        )
    }
}

// ---------------------------------------------------------------------------
// Keys
// ---------------------------------------------------------------------------

fn key_raw<T: ?Sized + 'static>(value: &dyn Any) -> Option<&RawKey> {
    value.downcast_ref::<Key<T>>().map(Key::raw)
}

fn key_build<T: ?Sized + 'static>(key: RawKey, _value: Option<Shared>) -> Dynamic {
    Box::new(Key::<T>::from_raw(key))
}

impl<T: ?Sized + 'static> Translatable for Key<T> {
    fn field_type() -> FieldType {
        FieldType::new(
            TypeInfo::of::<Self>(),
            Shape::Reference(ReferenceShape {
                target: TypeInfo::of::<T>(),
                key: key_raw::<T>,
                build: key_build::<T>,
                holds_value: false,
            }),
        )
    }
}

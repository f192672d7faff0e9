//! Condition predicates.
//!
//! A condition decides, per field value, whether an indexing or save rule
//! applies. Conditions are declared on fields as [`ConditionClass`]es:
//! descriptors that name the value and enclosing types the predicate can
//! handle and how to construct it. Each class is instantiated once per field
//! at registration time, after its declared types are checked against the
//! field.

use std::any::Any;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use entmap_types::TypeInfo;

use crate::error::{RegistrationError, RegistrationResult};

/// A boolean test over a field value and the object that holds it.
pub trait Predicate: Send + Sync {
    fn matches(&self, value: &dyn Any, enclosing: &dyn Any) -> bool;
}

/// Type constraint declared by a condition class.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TypeMatch {
    /// Any type is acceptable.
    Any,
    /// Only this exact type.
    Exactly(TypeInfo),
}

impl TypeMatch {
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self::Exactly(TypeInfo::of::<T>())
    }

    pub fn accepts(&self, ty: &TypeInfo) -> bool {
        match self {
            Self::Any => true,
            Self::Exactly(expected) => expected == ty,
        }
    }
}

impl fmt::Display for TypeMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => f.write_str("any"),
            Self::Exactly(ty) => fmt::Display::fmt(ty, f),
        }
    }
}

/// The field a condition is being instantiated for.
#[derive(Clone, Debug)]
pub struct ConditionTarget {
    pub enclosing: TypeInfo,
    pub field: String,
    pub field_type: TypeInfo,
}

impl ConditionTarget {
    /// `Type::field`, as used in error messages.
    pub fn label(&self) -> String {
        format!("{}::{}", self.enclosing, self.field)
    }
}

type TargetConstructor = Arc<dyn Fn(&ConditionTarget) -> Box<dyn Predicate> + Send + Sync>;
type NoArgConstructor = Arc<dyn Fn() -> Box<dyn Predicate> + Send + Sync>;

/// Descriptor for a family of predicates.
#[derive(Clone)]
pub struct ConditionClass {
    name: String,
    value_type: TypeMatch,
    enclosing_type: TypeMatch,
    with_target: Option<TargetConstructor>,
    no_arg: Option<NoArgConstructor>,
    unconditional: bool,
}

impl ConditionClass {
    /// A class with no constructors yet.
    pub fn declare(name: impl Into<String>, value_type: TypeMatch, enclosing_type: TypeMatch) -> Self {
        Self {
            name: name.into(),
            value_type,
            enclosing_type,
            with_target: None,
            no_arg: None,
            unconditional: false,
        }
    }

    /// A class over values of type `V` held by objects of type `E`.
    pub fn typed<V: Any, E: Any>(name: impl Into<String>) -> Self {
        Self::declare(name, TypeMatch::of::<V>(), TypeMatch::of::<E>())
    }

    /// Add a constructor that receives the target field. Preferred over the
    /// no-arg constructor when both exist.
    pub fn with_target_constructor(
        mut self,
        ctor: impl Fn(&ConditionTarget) -> Box<dyn Predicate> + Send + Sync + 'static,
    ) -> Self {
        self.with_target = Some(Arc::new(ctor));
        self
    }

    pub fn with_no_arg_constructor(
        mut self,
        ctor: impl Fn() -> Box<dyn Predicate> + Send + Sync + 'static,
    ) -> Self {
        self.no_arg = Some(Arc::new(ctor));
        self
    }

    /// A class backed by a plain function over the value and its owner.
    pub fn when<V: Any, E: Any>(name: impl Into<String>, test: fn(&V, &E) -> bool) -> Self {
        Self::typed::<V, E>(name).with_no_arg_constructor(move || {
            Box::new(FnPredicate {
                test,
                _marker: PhantomData,
            })
        })
    }

    /// A class backed by a plain function over the value only. Accepts any
    /// enclosing type.
    pub fn when_value<V: Any>(name: impl Into<String>, test: fn(&V) -> bool) -> Self {
        Self::declare(name, TypeMatch::of::<V>(), TypeMatch::Any)
            .with_no_arg_constructor(move || Box::new(ValuePredicate { test }))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value_type(&self) -> TypeMatch {
        self.value_type
    }

    pub fn enclosing_type(&self) -> TypeMatch {
        self.enclosing_type
    }

    /// Returns `true` for the class produced by [`always`].
    pub fn is_unconditional(&self) -> bool {
        self.unconditional
    }

    /// Construct the predicate for `target`, checking the declared types.
    pub fn instantiate(&self, target: &ConditionTarget) -> RegistrationResult<Box<dyn Predicate>> {
        let predicate = if let Some(ctor) = &self.with_target {
            ctor(target)
        } else if let Some(ctor) = &self.no_arg {
            ctor()
        } else {
            return Err(RegistrationError::MissingConditionConstructor {
                condition: self.name.clone(),
            });
        };

        if !self.value_type.accepts(&target.field_type) {
            return Err(RegistrationError::ConditionValueMismatch {
                condition: self.name.clone(),
                field: target.label(),
                actual: target.field_type.to_string(),
                expected: self.value_type.to_string(),
            });
        }

        if !self.enclosing_type.accepts(&target.enclosing) {
            return Err(RegistrationError::ConditionEnclosingMismatch {
                condition: self.name.clone(),
                field: target.label(),
                actual: target.enclosing.to_string(),
                expected: self.enclosing_type.to_string(),
            });
        }

        Ok(predicate)
    }
}

impl fmt::Debug for ConditionClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConditionClass")
            .field("name", &self.name)
            .field("value_type", &self.value_type)
            .field("enclosing_type", &self.enclosing_type)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Predicate implementations
// ---------------------------------------------------------------------------

struct FnPredicate<V, E> {
    test: fn(&V, &E) -> bool,
    _marker: PhantomData<fn(&V, &E)>,
}

impl<V: Any, E: Any> Predicate for FnPredicate<V, E> {
    fn matches(&self, value: &dyn Any, enclosing: &dyn Any) -> bool {
        match (value.downcast_ref::<V>(), enclosing.downcast_ref::<E>()) {
            (Some(value), Some(enclosing)) => (self.test)(value, enclosing),
            _ => false,
        }
    }
}

struct ValuePredicate<V> {
    test: fn(&V) -> bool,
}

impl<V: Any> Predicate for ValuePredicate<V> {
    fn matches(&self, value: &dyn Any, _enclosing: &dyn Any) -> bool {
        value.downcast_ref::<V>().is_some_and(|v| (self.test)(v))
    }
}

struct Always;

impl Predicate for Always {
    fn matches(&self, _value: &dyn Any, _enclosing: &dyn Any) -> bool {
        true
    }
}

// ---------------------------------------------------------------------------
// Built-in condition classes
// ---------------------------------------------------------------------------

/// Matches every value. A field whose only ignore-save condition is `always`
/// is never saved.
pub fn always() -> ConditionClass {
    ConditionClass {
        unconditional: true,
        ..ConditionClass::declare("always", TypeMatch::Any, TypeMatch::Any)
            .with_no_arg_constructor(|| Box::new(Always))
    }
}

/// Matches values equal to `V::default()`.
pub fn if_default<V: Any + Default + PartialEq>() -> ConditionClass {
    fn is_default<V: Default + PartialEq>(value: &V) -> bool {
        *value == V::default()
    }
    ConditionClass::when_value::<V>("if_default", is_default::<V>)
}

pub fn if_true() -> ConditionClass {
    ConditionClass::when_value::<bool>("if_true", |v| *v)
}

pub fn if_false() -> ConditionClass {
    ConditionClass::when_value::<bool>("if_false", |v| !*v)
}

/// Matches `None` in an `Option<V>` field.
pub fn if_none<V: Any>() -> ConditionClass {
    ConditionClass::when_value::<Option<V>>("if_none", Option::is_none)
}

/// Matches empty strings.
pub fn if_empty_text() -> ConditionClass {
    ConditionClass::when_value::<String>("if_empty_text", String::is_empty)
}

/// Matches empty `Vec<V>` fields.
pub fn if_empty<V: Any>() -> ConditionClass {
    ConditionClass::when_value::<Vec<V>>("if_empty", Vec::is_empty)
}

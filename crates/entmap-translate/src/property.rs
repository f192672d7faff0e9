//! Field properties.
//!
//! A [`Property`] is the validated, immutable descriptor of one declared
//! field: its names, its typed accessor, and the predicates that decide its
//! indexing and whether it is saved. Properties are built from the
//! [`FieldPolicy`] a class declares for the field.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use entmap_types::{Dynamic, TypeInfo};

use crate::condition::{always, ConditionClass, ConditionTarget, Predicate};
use crate::error::{FieldError, RegistrationError, RegistrationResult};
use crate::shape::FieldType;

// ---------------------------------------------------------------------------
// FieldPolicy
// ---------------------------------------------------------------------------

/// Declared persistence rules for a field.
///
/// Returned by [`crate::ClassBuilder::field`] so that rules chain onto the
/// declaration:
///
/// ```ignore
/// class.field("email", |p: &Person| &p.email, |p| &mut p.email)
///     .index()
///     .also_load(["mail"]);
/// ```
#[derive(Clone, Debug, Default)]
pub struct FieldPolicy {
    also_load: Option<Vec<String>>,
    index: Option<Vec<ConditionClass>>,
    unindex: Option<Vec<ConditionClass>>,
    ignore_save: Option<Vec<ConditionClass>>,
    eager: bool,
}

impl FieldPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Additional stored names accepted on load.
    pub fn also_load<I, S>(&mut self, names: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.also_load
            .get_or_insert_with(Vec::new)
            .extend(names.into_iter().map(Into::into));
        self
    }

    /// Always index.
    pub fn index(&mut self) -> &mut Self {
        self.index_if(always())
    }

    /// Index when `condition` matches.
    pub fn index_if(&mut self, condition: ConditionClass) -> &mut Self {
        self.index.get_or_insert_with(Vec::new).push(condition);
        self
    }

    /// Never index.
    pub fn unindex(&mut self) -> &mut Self {
        self.unindex_if(always())
    }

    pub fn unindex_if(&mut self, condition: ConditionClass) -> &mut Self {
        self.unindex.get_or_insert_with(Vec::new).push(condition);
        self
    }

    /// Never save. The field is still loaded.
    pub fn ignore_save(&mut self) -> &mut Self {
        self.ignore_save_if(always())
    }

    pub fn ignore_save_if(&mut self, condition: ConditionClass) -> &mut Self {
        self.ignore_save.get_or_insert_with(Vec::new).push(condition);
        self
    }

    /// Load the referenced object together with its holder.
    pub fn load(&mut self) -> &mut Self {
        self.eager = true;
        self
    }

    pub fn is_eager(&self) -> bool {
        self.eager
    }
}

// ---------------------------------------------------------------------------
// Accessors
// ---------------------------------------------------------------------------

/// Reads and writes one field of `E` without naming its type.
pub(crate) trait Accessor<E>: Send + Sync {
    fn get<'a>(&self, entity: &'a E) -> &'a dyn Any;

    /// Store `value`, handing it back if it has the wrong type.
    fn set(&self, entity: &mut E, value: Dynamic) -> Result<(), Dynamic>;

    /// The object that directly declares the field.
    fn owner<'a>(&self, entity: &'a E) -> &'a dyn Any;
}

pub(crate) struct FieldAccessor<E, F> {
    pub(crate) get: fn(&E) -> &F,
    pub(crate) get_mut: fn(&mut E) -> &mut F,
}

impl<E: Any, F: Any> Accessor<E> for FieldAccessor<E, F> {
    fn get<'a>(&self, entity: &'a E) -> &'a dyn Any {
        (self.get)(entity)
    }

    fn set(&self, entity: &mut E, value: Dynamic) -> Result<(), Dynamic> {
        let value = value.downcast::<F>()?;
        *(self.get_mut)(entity) = *value;
        Ok(())
    }

    fn owner<'a>(&self, entity: &'a E) -> &'a dyn Any {
        entity
    }
}

/// Reaches a base-class field through the derived object.
struct Projected<D, B> {
    inner: Arc<dyn Accessor<B>>,
    up: fn(&D) -> &B,
    up_mut: fn(&mut D) -> &mut B,
}

impl<D: Any, B: Any> Accessor<D> for Projected<D, B> {
    fn get<'a>(&self, entity: &'a D) -> &'a dyn Any {
        self.inner.get((self.up)(entity))
    }

    fn set(&self, entity: &mut D, value: Dynamic) -> Result<(), Dynamic> {
        self.inner.set((self.up_mut)(entity), value)
    }

    fn owner<'a>(&self, entity: &'a D) -> &'a dyn Any {
        self.inner.owner((self.up)(entity))
    }
}

// ---------------------------------------------------------------------------
// Property
// ---------------------------------------------------------------------------

type Predicates = Arc<[Arc<dyn Predicate>]>;

/// Validated descriptor of one field of `E`.
pub struct Property<E> {
    name: String,
    names: Vec<String>,
    field_type: FieldType,
    declaring: TypeInfo,
    accessor: Arc<dyn Accessor<E>>,
    policy: FieldPolicy,
    index: Option<Predicates>,
    unindex: Option<Predicates>,
    ignore_save: Option<Predicates>,
    has_ignore_save_conditions: bool,
}

impl<E: Any> Property<E> {
    pub(crate) fn new(
        declaring: TypeInfo,
        name: &str,
        field_type: FieldType,
        accessor: Arc<dyn Accessor<E>>,
        policy: FieldPolicy,
    ) -> RegistrationResult<Self> {
        let label = format!("{declaring}::{name}");

        let mut names = vec![name.to_string()];
        if let Some(alternates) = &policy.also_load {
            if alternates.is_empty() {
                return Err(RegistrationError::EmptyAlternateNames { field: label });
            }
            for alternate in alternates {
                if alternate.trim().is_empty() {
                    return Err(RegistrationError::BlankAlternateName {
                        field: label,
                        name: alternate.clone(),
                    });
                }
                if !names.contains(alternate) {
                    names.push(alternate.clone());
                }
            }
        }

        if policy.index.is_some() && policy.unindex.is_some() {
            return Err(RegistrationError::ConflictingIndexPolicy { field: label });
        }

        let target = ConditionTarget {
            enclosing: declaring,
            field: name.to_string(),
            field_type: field_type.info(),
        };

        let has_ignore_save_conditions = match &policy.ignore_save {
            Some(classes) => !(classes.len() == 1 && classes[0].is_unconditional()),
            None => false,
        };

        Ok(Self {
            name: name.to_string(),
            names,
            field_type,
            declaring,
            accessor,
            index: instantiate_all(policy.index.as_deref(), &target)?,
            unindex: instantiate_all(policy.unindex.as_deref(), &target)?,
            ignore_save: instantiate_all(policy.ignore_save.as_deref(), &target)?,
            has_ignore_save_conditions,
            policy,
        })
    }

    /// The canonical stored name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The canonical name followed by every alternate load name.
    pub fn all_names(&self) -> &[String] {
        &self.names
    }

    pub fn accepts_name(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    pub fn field_type(&self) -> &FieldType {
        &self.field_type
    }

    /// The class that declared the field. Differs from `E` for inherited
    /// fields.
    pub fn declaring_type(&self) -> TypeInfo {
        self.declaring
    }

    pub fn policy(&self) -> &FieldPolicy {
        &self.policy
    }

    pub fn get<'a>(&self, entity: &'a E) -> &'a dyn Any {
        self.accessor.get(entity)
    }

    pub fn set(&self, entity: &mut E, value: Dynamic) -> Result<(), FieldError> {
        self.accessor.set(entity, value).map_err(|_| FieldError::Access {
            expected: self.field_type.info().name(),
        })
    }

    /// Returns `false` only when the field's sole ignore-save condition is
    /// the unconditional one.
    pub fn has_ignore_save_conditions(&self) -> bool {
        self.has_ignore_save_conditions
    }

    /// Whether the field's current value in `entity` should be written.
    pub fn is_saved(&self, entity: &E) -> bool {
        match &self.ignore_save {
            Some(predicates) => !self.any_matches(predicates, entity),
            None => true,
        }
    }

    /// `Some(true)` to force indexing, `Some(false)` to force no index,
    /// `None` to use the inherited default.
    pub fn index_instruction(&self, entity: &E) -> Option<bool> {
        if let Some(predicates) = &self.index {
            if self.any_matches(predicates, entity) {
                return Some(true);
            }
        }
        if let Some(predicates) = &self.unindex {
            if self.any_matches(predicates, entity) {
                return Some(false);
            }
        }
        None
    }

    fn any_matches(&self, predicates: &[Arc<dyn Predicate>], entity: &E) -> bool {
        let value = self.accessor.get(entity);
        let owner = self.accessor.owner(entity);
        predicates.iter().any(|p| p.matches(value, owner))
    }

    /// Re-root the property on a type that embeds `E` as its base.
    pub(crate) fn lift<D: Any>(self, up: fn(&D) -> &E, up_mut: fn(&mut D) -> &mut E) -> Property<D> {
        Property {
            name: self.name,
            names: self.names,
            field_type: self.field_type,
            declaring: self.declaring,
            accessor: Arc::new(Projected {
                inner: self.accessor,
                up,
                up_mut,
            }),
            policy: self.policy,
            index: self.index,
            unindex: self.unindex,
            ignore_save: self.ignore_save,
            has_ignore_save_conditions: self.has_ignore_save_conditions,
        }
    }
}

fn instantiate_all(
    classes: Option<&[ConditionClass]>,
    target: &ConditionTarget,
) -> RegistrationResult<Option<Predicates>> {
    classes
        .map(|classes| {
            classes
                .iter()
                .map(|class| class.instantiate(target).map(Arc::from))
                .collect::<RegistrationResult<Vec<Arc<dyn Predicate>>>>()
                .map(Predicates::from)
        })
        .transpose()
}

impl<E> fmt::Debug for Property<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Property")
            .field("name", &self.name)
            .field("names", &self.names)
            .field("field_type", &self.field_type.info())
            .field("declaring", &self.declaring)
            .finish_non_exhaustive()
    }
}

//! Translator factories.
//!
//! Translators are created by an ordered chain of factories. For every field
//! path, each factory in turn inspects the field's static type and policy;
//! the first one to return a translator wins. User factories are pushed to
//! the front of the chain so they take precedence over the built-ins.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use entmap_types::{Path, RawKey, TypeInfo};
use tracing::trace;

use crate::config::TranslateConfig;
use crate::error::{RegistrationError, RegistrationResult};
use crate::property::FieldPolicy;
use crate::shape::{FieldType, Shape};
use crate::translator::{
    ObjectTranslator, OptionalTranslator, ReferenceTranslator, SequenceTranslator, Translator, ValueTranslator,
};
use crate::value::{ScalarConverter, ScalarValue, TimeZoneConverter, ValueConverter};

// ---------------------------------------------------------------------------
// CreateContext
// ---------------------------------------------------------------------------

/// Registration-time state shared by the factories of one class tree.
pub struct CreateContext<'a> {
    translators: &'a Translators,
    config: &'a TranslateConfig,
    in_collection: bool,
    building: Vec<TypeInfo>,
}

impl<'a> CreateContext<'a> {
    pub fn new(translators: &'a Translators, config: &'a TranslateConfig) -> Self {
        Self {
            translators,
            config,
            in_collection: false,
            building: Vec::new(),
        }
    }

    pub fn config(&self) -> &'a TranslateConfig {
        self.config
    }

    /// Whether the translator being created sits directly inside a
    /// collection.
    pub fn in_collection(&self) -> bool {
        self.in_collection
    }

    /// Run `f` with the in-collection flag set to `value`, restoring the
    /// previous value afterwards whether or not `f` succeeds.
    pub fn with_in_collection<T>(&mut self, value: bool, f: impl FnOnce(&mut Self) -> T) -> T {
        let previous = std::mem::replace(&mut self.in_collection, value);
        let result = f(self);
        self.in_collection = previous;
        result
    }

    /// Create a translator through the full factory chain.
    pub fn create(&mut self, path: &Path, policy: &FieldPolicy, field_type: &FieldType) -> RegistrationResult<Translator> {
        let translators = self.translators;
        translators.create(path, policy, field_type, self)
    }

    /// Mark `class` as under construction. Fails if it already is, which
    /// means the class embeds itself.
    pub(crate) fn enter_class(&mut self, class: TypeInfo, path: &Path) -> RegistrationResult<()> {
        if self.building.contains(&class) {
            return Err(RegistrationError::RecursiveClass {
                type_name: class.name().to_string(),
                path: path.clone(),
            });
        }
        self.building.push(class);
        Ok(())
    }

    pub(crate) fn exit_class(&mut self, class: TypeInfo) {
        if let Some(index) = self.building.iter().rposition(|c| *c == class) {
            self.building.remove(index);
        }
    }
}

// ---------------------------------------------------------------------------
// TranslatorFactory
// ---------------------------------------------------------------------------

/// Produces translators for the field types it recognizes.
pub trait TranslatorFactory: Send + Sync {
    fn name(&self) -> &str;

    /// Return `Ok(None)` to let the next factory try.
    fn create(
        &self,
        path: &Path,
        policy: &FieldPolicy,
        field_type: &FieldType,
        ctx: &mut CreateContext<'_>,
    ) -> RegistrationResult<Option<Translator>>;
}

/// The ordered factory chain.
pub struct Translators {
    factories: Vec<Box<dyn TranslatorFactory>>,
}

impl Translators {
    /// A chain with no factories.
    pub fn empty() -> Self {
        Self { factories: Vec::new() }
    }

    /// Add a factory ahead of every existing one.
    pub fn push_front(&mut self, factory: Box<dyn TranslatorFactory>) {
        self.factories.insert(0, factory);
    }

    /// Add a factory behind every existing one.
    pub fn push_back(&mut self, factory: Box<dyn TranslatorFactory>) {
        self.factories.push(factory);
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    /// Factory names in consultation order.
    pub fn names(&self) -> Vec<&str> {
        self.factories.iter().map(|f| f.name()).collect()
    }

    pub fn create(
        &self,
        path: &Path,
        policy: &FieldPolicy,
        field_type: &FieldType,
        ctx: &mut CreateContext<'_>,
    ) -> RegistrationResult<Translator> {
        for factory in &self.factories {
            if let Some(translator) = factory.create(path, policy, field_type, ctx)? {
                trace!(
                    factory = factory.name(),
                    path = %path,
                    variant = translator.variant_name(),
                    "translator created"
                );
                return Ok(translator);
            }
        }
        Err(RegistrationError::NoTranslator {
            type_name: field_type.info().name().to_string(),
            path: path.clone(),
        })
    }
}

impl Default for Translators {
    /// The built-in chain: references, optionals, sequences and classes,
    /// then the leaf value types.
    fn default() -> Self {
        let mut chain = Self::empty();
        chain.push_back(Box::new(ReferenceFactory));
        chain.push_back(Box::new(OptionalFactory));
        chain.push_back(Box::new(SequenceFactory));
        chain.push_back(Box::new(ClassFactory));
        chain.push_back(Box::new(scalar_factory::<bool>()));
        chain.push_back(Box::new(scalar_factory::<i8>()));
        chain.push_back(Box::new(scalar_factory::<i16>()));
        chain.push_back(Box::new(scalar_factory::<i32>()));
        chain.push_back(Box::new(scalar_factory::<i64>()));
        chain.push_back(Box::new(scalar_factory::<u8>()));
        chain.push_back(Box::new(scalar_factory::<u16>()));
        chain.push_back(Box::new(scalar_factory::<u32>()));
        chain.push_back(Box::new(scalar_factory::<f32>()));
        chain.push_back(Box::new(scalar_factory::<f64>()));
        chain.push_back(Box::new(scalar_factory::<String>()));
        chain.push_back(Box::new(scalar_factory::<DateTime<Utc>>()));
        chain.push_back(Box::new(scalar_factory::<RawKey>()));
        chain.push_back(Box::new(ValueFactory::new("time_zone", TimeZoneConverter)));
        chain
    }
}

// ---------------------------------------------------------------------------
// Built-in factories
// ---------------------------------------------------------------------------

/// `Key<T>` and `Ref<T>` fields.
pub struct ReferenceFactory;

impl TranslatorFactory for ReferenceFactory {
    fn name(&self) -> &str {
        "reference"
    }

    fn create(
        &self,
        path: &Path,
        policy: &FieldPolicy,
        field_type: &FieldType,
        _ctx: &mut CreateContext<'_>,
    ) -> RegistrationResult<Option<Translator>> {
        let Shape::Reference(shape) = field_type.shape() else {
            return Ok(None);
        };
        Ok(Some(Translator::Reference(ReferenceTranslator::new(
            path.clone(),
            *shape,
            policy.is_eager(),
        ))))
    }
}

/// `Option<T>` fields. The inner translator shares the field's path.
pub struct OptionalFactory;

impl TranslatorFactory for OptionalFactory {
    fn name(&self) -> &str {
        "optional"
    }

    fn create(
        &self,
        path: &Path,
        policy: &FieldPolicy,
        field_type: &FieldType,
        ctx: &mut CreateContext<'_>,
    ) -> RegistrationResult<Option<Translator>> {
        let Shape::Optional(shape) = field_type.shape() else {
            return Ok(None);
        };
        let inner = ctx.create(path, policy, &(shape.inner)())?;
        Ok(Some(Translator::Optional(OptionalTranslator::new(
            path.clone(),
            inner,
            *shape,
        ))))
    }
}

/// Lists, boxed slices and fixed-size arrays.
pub struct SequenceFactory;

impl TranslatorFactory for SequenceFactory {
    fn name(&self) -> &str {
        "sequence"
    }

    fn create(
        &self,
        path: &Path,
        policy: &FieldPolicy,
        field_type: &FieldType,
        ctx: &mut CreateContext<'_>,
    ) -> RegistrationResult<Option<Translator>> {
        let Shape::Sequence(shape) = field_type.shape() else {
            return Ok(None);
        };
        if ctx.in_collection() {
            return Err(RegistrationError::NestedCollection { path: path.clone() });
        }
        let component_type = (shape.component)();
        let component = ctx.with_in_collection(true, |ctx| ctx.create(path, policy, &component_type))?;
        Ok(Some(Translator::Sequence(SequenceTranslator::new(
            path.clone(),
            component,
            *shape,
            field_type.info(),
        ))))
    }
}

/// Embedded classes.
pub struct ClassFactory;

impl TranslatorFactory for ClassFactory {
    fn name(&self) -> &str {
        "class"
    }

    fn create(
        &self,
        path: &Path,
        _policy: &FieldPolicy,
        field_type: &FieldType,
        ctx: &mut CreateContext<'_>,
    ) -> RegistrationResult<Option<Translator>> {
        let Shape::Class(shape) = field_type.shape() else {
            return Ok(None);
        };
        let codec = (shape.build)(path, ctx)?;
        Ok(Some(Translator::Object(ObjectTranslator::new(path.clone(), codec))))
    }
}

/// Leaf values of exactly `C::Value`.
pub struct ValueFactory<C> {
    name: String,
    converter: Arc<C>,
}

impl<C: ValueConverter> ValueFactory<C> {
    pub fn new(name: impl Into<String>, converter: C) -> Self {
        Self {
            name: name.into(),
            converter: Arc::new(converter),
        }
    }
}

/// A factory for the plain scalar type `T`, named after `T`.
pub fn scalar_factory<T: ScalarValue>() -> ValueFactory<ScalarConverter<T>> {
    ValueFactory::new(short_type_name::<T>(), ScalarConverter::<T>::new())
}

fn short_type_name<T>() -> String {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base).to_string()
}

impl<C: ValueConverter> TranslatorFactory for ValueFactory<C> {
    fn name(&self) -> &str {
        &self.name
    }

    fn create(
        &self,
        path: &Path,
        _policy: &FieldPolicy,
        field_type: &FieldType,
        _ctx: &mut CreateContext<'_>,
    ) -> RegistrationResult<Option<Translator>> {
        if !field_type.info().is::<C::Value>() {
            return Ok(None);
        }
        Ok(Some(Translator::Value(ValueTranslator::new(
            path.clone(),
            self.converter.clone(),
        ))))
    }
}

/// Wraps a converter for a type the built-in chain does not know, keeping
/// the type parameter out of user signatures.
pub fn value_factory<C: ValueConverter>(name: &str, converter: C) -> Box<dyn TranslatorFactory> {
    Box::new(ValueFactory::new(name, converter))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{LoadContext, SaveContext};
    use crate::error::FieldError;
    use entmap_types::{EntityNode, Scalar};

    fn create(field_type: FieldType) -> RegistrationResult<Translator> {
        let translators = Translators::default();
        let config = TranslateConfig::default();
        let mut ctx = CreateContext::new(&translators, &config);
        ctx.create(&Path::of("field"), &FieldPolicy::new(), &field_type)
    }

    // -----------------------------------------------------------------------
    // Chain order
    // -----------------------------------------------------------------------

    #[test]
    fn default_chain_order() {
        let names = Translators::default().names().join(",");
        assert!(names.starts_with("reference,optional,sequence,class,bool,i8"));
        assert!(names.ends_with("DateTime,RawKey,time_zone"));
    }

    #[test]
    fn scalar_factories_are_named_after_their_type() {
        assert_eq!(scalar_factory::<i64>().name(), "i64");
        assert_eq!(scalar_factory::<DateTime<Utc>>().name(), "DateTime");

        let mut translators = Translators::empty();
        translators.push_back(Box::new(scalar_factory::<String>()));
        let config = TranslateConfig::default();
        let mut ctx = CreateContext::new(&translators, &config);
        let translator = ctx
            .create(&Path::of("name"), &FieldPolicy::new(), &FieldType::of::<String>())
            .unwrap();
        assert_eq!(translator.variant_name(), "value");
        assert!(ctx
            .create(&Path::of("count"), &FieldPolicy::new(), &FieldType::of::<i64>())
            .is_err());
    }

    #[test]
    fn push_front_takes_precedence() {
        struct Upper;
        impl ValueConverter for Upper {
            type Value = String;
            fn save_value(&self, value: &String) -> Result<Scalar, FieldError> {
                Ok(Scalar::Text(value.to_uppercase()))
            }
            fn load_value(&self, scalar: &Scalar) -> Result<String, FieldError> {
                String::from_scalar(scalar)
            }
        }

        let mut translators = Translators::default();
        translators.push_front(value_factory("upper", Upper));
        assert_eq!(translators.names()[0], "upper");

        let config = TranslateConfig::default();
        let mut ctx = CreateContext::new(&translators, &config);
        let translator = ctx
            .create(&Path::of("name"), &FieldPolicy::new(), &FieldType::plain::<String>())
            .unwrap();
        let node = translator
            .save(&"ada".to_string(), false, &SaveContext::detached())
            .unwrap();
        assert_eq!(node, EntityNode::leaf(Scalar::Text("ADA".into()), false));
    }

    #[test]
    fn unknown_type_has_no_translator() {
        struct Opaque;
        let err = create(FieldType::plain::<Opaque>()).err().unwrap();
        match err {
            RegistrationError::NoTranslator { type_name, path } => {
                assert!(type_name.ends_with("Opaque"));
                assert_eq!(path.to_string(), "field");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    // -----------------------------------------------------------------------
    // In-collection flag
    // -----------------------------------------------------------------------

    #[test]
    fn nested_collection_rejected_and_flag_restored() {
        let translators = Translators::default();
        let config = TranslateConfig::default();
        let mut ctx = CreateContext::new(&translators, &config);
        let err = ctx
            .create(&Path::of("grid"), &FieldPolicy::new(), &FieldType::of::<Vec<Vec<i64>>>())
            .err()
            .unwrap();
        assert!(matches!(err, RegistrationError::NestedCollection { .. }));
        assert!(!ctx.in_collection());
    }

    #[test]
    fn option_inside_list_is_allowed() {
        assert!(create(FieldType::of::<Vec<Option<i64>>>()).is_ok());
        assert!(matches!(
            create(FieldType::of::<Vec<Option<Vec<i64>>>>()).err(),
            Some(RegistrationError::NestedCollection { .. })
        ));
    }

    // -----------------------------------------------------------------------
    // Sequences
    // -----------------------------------------------------------------------

    #[test]
    fn fixed_array_checks_size_on_load() {
        let translator = create(FieldType::of::<[i64; 3]>()).unwrap();
        let node = translator
            .save(&[1i64, 2, 3], true, &SaveContext::detached())
            .unwrap();
        let back = translator.load(&node, &LoadContext::detached()).unwrap();
        assert_eq!(*back.downcast::<[i64; 3]>().unwrap(), [1, 2, 3]);

        let short: EntityNode = EntityNode::List([EntityNode::leaf(Scalar::Integer(1), true)].into_iter().collect());
        let err = translator
            .load(&short, &LoadContext::detached())
            .err()
            .unwrap();
        assert!(err.to_string().contains("expected exactly 3 elements, found 1"));
    }

    #[test]
    fn element_errors_carry_their_index() {
        let translator = create(FieldType::of::<Vec<i64>>()).unwrap();
        let node = EntityNode::List(
            [
                EntityNode::leaf(Scalar::Integer(1), false),
                EntityNode::leaf(Scalar::Integer(2), false),
                EntityNode::leaf(Scalar::Text("three".into()), false),
            ]
            .into_iter()
            .collect(),
        );
        let err = translator.load(&node, &LoadContext::detached()).err().unwrap();
        assert_eq!(err.path().map(ToString::to_string).as_deref(), Some("field.2"));
        assert!(err.to_string().starts_with("error translating field.2:"));
    }

    #[test]
    fn nested_element_errors_keep_the_inner_path() {
        #[derive(Clone, Default)]
        struct Tag {
            weight: i32,
        }
        impl crate::class::Class for Tag {
            fn describe(class: &mut crate::class::ClassBuilder<Self>) {
                class.field("weight", |t| &t.weight, |t| &mut t.weight);
            }
        }

        let translator = create(FieldType::of::<Vec<Tag>>()).unwrap();
        let mut good = entmap_types::MapNode::new();
        good.insert("weight", EntityNode::leaf(Scalar::Integer(1), false));
        let mut bad = entmap_types::MapNode::new();
        bad.insert("weight", EntityNode::leaf(Scalar::Integer(i64::MAX), false));
        let node = EntityNode::List([EntityNode::Map(good), EntityNode::Map(bad)].into_iter().collect());
        let err = translator.load(&node, &LoadContext::detached()).err().unwrap();
        assert_eq!(err.path().map(ToString::to_string).as_deref(), Some("field.1.weight"));
    }

    #[test]
    fn boxed_slice_is_sized_by_stored_list() {
        let translator = create(FieldType::of::<Box<[String]>>()).unwrap();
        let value: Box<[String]> = vec!["a".to_string(), "b".to_string()].into_boxed_slice();
        let node = translator.save(&value, false, &SaveContext::detached()).unwrap();
        let back = translator.load(&node, &LoadContext::detached()).unwrap();
        assert_eq!(back.downcast::<Box<[String]>>().unwrap().len(), 2);
    }

    #[test]
    fn none_is_a_null_leaf() {
        let translator = create(FieldType::of::<Option<i64>>()).unwrap();
        let node = translator
            .save(&None::<i64>, true, &SaveContext::detached())
            .unwrap();
        assert_eq!(node, EntityNode::null(true));
        let back = translator.load(&node, &LoadContext::detached()).unwrap();
        assert_eq!(*back.downcast::<Option<i64>>().unwrap(), None);
    }
}

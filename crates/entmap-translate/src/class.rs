//! Class descriptors and the class translator.
//!
//! A class declares its fields, inherited bases and lifecycle callbacks once
//! through [`Class::describe`]. Registration turns that declaration into a
//! [`ClassLayout`] (validated properties plus callbacks) and then into a
//! [`ClassTranslator`] holding one translator per property.

use std::any::Any;
use std::sync::Arc;

use entmap_types::{Dynamic, MapNode, Path, RawKey, TypeInfo};
use tracing::debug;

use crate::context::{LoadContext, SaveContext, UnitOfWorkHandle};
use crate::error::{
    CallbackResult, FieldError, RegistrationError, RegistrationResult, TranslateError, TranslateResult,
};
use crate::factory::CreateContext;
use crate::lifecycle::Lifecycle;
use crate::property::{Accessor, FieldAccessor, FieldPolicy, Property};
use crate::shape::{ClassShape, FieldType, Shape, Translatable};
use crate::translator::{ObjectCodec, Translator};

/// A struct whose fields are translated to and from a map node.
///
/// ```ignore
/// #[derive(Clone, Default)]
/// struct Address { city: String, zip: Option<String> }
///
/// impl Class for Address {
///     fn describe(class: &mut ClassBuilder<Self>) {
///         class.field("city", |a| &a.city, |a| &mut a.city).index();
///         class.field("zip", |a| &a.zip, |a| &mut a.zip);
///     }
/// }
/// ```
pub trait Class: Default + Clone + Send + Sync + 'static {
    fn describe(class: &mut ClassBuilder<Self>);
}

impl<E: Class> Translatable for E {
    fn field_type() -> FieldType {
        FieldType::new(
            TypeInfo::of::<E>(),
            Shape::Class(ClassShape {
                build: build_object::<E>,
            }),
        )
    }
}

fn build_object<E: Class>(path: &Path, ctx: &mut CreateContext<'_>) -> RegistrationResult<Arc<dyn ObjectCodec>> {
    Ok(Arc::new(ClassTranslator::<E>::build(path, ctx)?))
}

// ---------------------------------------------------------------------------
// ClassBuilder
// ---------------------------------------------------------------------------

struct FieldDecl<E> {
    name: String,
    field_type: FieldType,
    accessor: Arc<dyn Accessor<E>>,
    policy: FieldPolicy,
}

type ParentDecl<E> = Box<dyn FnOnce() -> RegistrationResult<ClassLayout<E>>>;

/// Collects the declaration of a class.
pub struct ClassBuilder<E> {
    fields: Vec<FieldDecl<E>>,
    parents: Vec<ParentDecl<E>>,
    lifecycle: Lifecycle<E>,
    default_indexed: Option<bool>,
}

impl<E: Any> ClassBuilder<E> {
    fn new() -> Self {
        Self {
            fields: Vec::new(),
            parents: Vec::new(),
            lifecycle: Lifecycle::default(),
            default_indexed: None,
        }
    }

    /// Declare a persisted field and return its policy for further rules.
    pub fn field<F: Translatable>(
        &mut self,
        name: &str,
        get: fn(&E) -> &F,
        get_mut: fn(&mut E) -> &mut F,
    ) -> &mut FieldPolicy {
        let index = self.fields.len();
        self.fields.push(FieldDecl {
            name: name.to_string(),
            field_type: F::field_type(),
            accessor: Arc::new(FieldAccessor { get, get_mut }),
            policy: FieldPolicy::new(),
        });
        &mut self.fields[index].policy
    }

    /// Inherit the fields and callbacks of `B`, embedded in `E`.
    ///
    /// Inherited fields come before declared ones. A declared field hides an
    /// inherited field of the same name.
    pub fn inherit<B: Class>(&mut self, up: fn(&E) -> &B, up_mut: fn(&mut E) -> &mut B) -> &mut Self {
        self.parents
            .push(Box::new(move || Ok(ClassLayout::<B>::describe()?.lift(up, up_mut))));
        self
    }

    /// Index flag for fields that do not set their own.
    pub fn index_by_default(&mut self, indexed: bool) -> &mut Self {
        self.default_indexed = Some(indexed);
        self
    }

    pub fn on_save(&mut self, f: fn(&mut E) -> CallbackResult) -> &mut Self {
        self.lifecycle.add_save(f);
        self
    }

    pub fn on_save_with_unit(&mut self, f: fn(&mut E, &dyn UnitOfWorkHandle) -> CallbackResult) -> &mut Self {
        self.lifecycle.add_save_with_unit(f);
        self
    }

    pub fn on_load(&mut self, f: fn(&mut E) -> CallbackResult) -> &mut Self {
        self.lifecycle.add_load(f);
        self
    }

    pub fn on_load_with_unit(&mut self, f: fn(&mut E, &dyn UnitOfWorkHandle) -> CallbackResult) -> &mut Self {
        self.lifecycle.add_load_with_unit(f);
        self
    }

    pub fn on_load_with_context(&mut self, f: fn(&mut E, &LoadContext<'_>) -> CallbackResult) -> &mut Self {
        self.lifecycle.add_load_with_context(f);
        self
    }

    fn finish(self) -> RegistrationResult<ClassLayout<E>> {
        let declaring = TypeInfo::of::<E>();

        let mut declared: Vec<Property<E>> = Vec::with_capacity(self.fields.len());
        for decl in self.fields {
            if declared.iter().any(|p| p.name() == decl.name) {
                return Err(RegistrationError::DuplicateProperty {
                    type_name: declaring.to_string(),
                    name: decl.name,
                });
            }
            declared.push(Property::new(
                declaring,
                &decl.name,
                decl.field_type,
                decl.accessor,
                decl.policy,
            )?);
        }

        let mut properties: Vec<Property<E>> = Vec::new();
        let mut inherited_lifecycle = Lifecycle::default();
        let mut default_indexed = self.default_indexed;
        for parent in self.parents {
            let layout = parent()?;
            default_indexed = default_indexed.or(layout.default_indexed);
            for property in layout.properties {
                let hidden = declared.iter().any(|d| d.name() == property.name())
                    || properties.iter().any(|p| p.name() == property.name());
                if !hidden {
                    properties.push(property);
                }
            }
            inherited_lifecycle.extend(layout.lifecycle);
        }
        properties.extend(declared);

        let mut lifecycle = self.lifecycle;
        lifecycle.extend(inherited_lifecycle);

        Ok(ClassLayout {
            properties,
            lifecycle,
            default_indexed,
        })
    }
}

// ---------------------------------------------------------------------------
// ClassLayout
// ---------------------------------------------------------------------------

/// Validated properties and callbacks of a class, before translators are
/// attached.
pub struct ClassLayout<E> {
    properties: Vec<Property<E>>,
    lifecycle: Lifecycle<E>,
    default_indexed: Option<bool>,
}

impl<E: Class> ClassLayout<E> {
    pub fn describe() -> RegistrationResult<Self> {
        let mut builder = ClassBuilder::new();
        E::describe(&mut builder);
        builder.finish()
    }
}

impl<E: Any> ClassLayout<E> {
    pub fn properties(&self) -> &[Property<E>] {
        &self.properties
    }

    pub fn lifecycle(&self) -> &Lifecycle<E> {
        &self.lifecycle
    }

    fn lift<D: Any>(self, up: fn(&D) -> &E, up_mut: fn(&mut D) -> &mut E) -> ClassLayout<D> {
        ClassLayout {
            properties: self.properties.into_iter().map(|p| p.lift(up, up_mut)).collect(),
            lifecycle: self.lifecycle.lift(up_mut),
            default_indexed: self.default_indexed,
        }
    }
}

// ---------------------------------------------------------------------------
// ClassTranslator
// ---------------------------------------------------------------------------

/// Translates a class to and from a map node, one property at a time.
pub struct ClassTranslator<E> {
    path: Path,
    fields: Vec<(Property<E>, Translator)>,
    lifecycle: Lifecycle<E>,
    default_indexed: Option<bool>,
    ignore_unknown: bool,
}

impl<E: Class> ClassTranslator<E> {
    pub fn build(path: &Path, ctx: &mut CreateContext<'_>) -> RegistrationResult<Self> {
        let info = TypeInfo::of::<E>();
        ctx.enter_class(info, path)?;
        let result = Self::build_fields(path, ctx);
        ctx.exit_class(info);
        result
    }

    fn build_fields(path: &Path, ctx: &mut CreateContext<'_>) -> RegistrationResult<Self> {
        let ClassLayout {
            properties,
            lifecycle,
            default_indexed,
        } = ClassLayout::<E>::describe()?;

        let fields = ctx.with_in_collection(false, |ctx| {
            properties
                .into_iter()
                .map(|property| {
                    let translator =
                        ctx.create(&path.extend(property.name()), property.policy(), property.field_type())?;
                    Ok((property, translator))
                })
                .collect::<RegistrationResult<Vec<_>>>()
        })?;

        debug!(
            class = std::any::type_name::<E>(),
            path = %path,
            fields = fields.len(),
            "class translator built"
        );

        Ok(Self {
            path: path.clone(),
            fields,
            lifecycle,
            default_indexed,
            ignore_unknown: ctx.config().ignore_unknown_properties,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn properties(&self) -> impl Iterator<Item = &Property<E>> {
        self.fields.iter().map(|(p, _)| p)
    }

    /// The translator of the property stored under `name`.
    pub fn translator(&self, name: &str) -> Option<&Translator> {
        self.fields.iter().find(|(p, _)| p.name() == name).map(|(_, t)| t)
    }

    pub fn lifecycle(&self) -> &Lifecycle<E> {
        &self.lifecycle
    }

    /// Run the save callbacks on `entity`, then translate its fields.
    pub fn save_entity(&self, entity: &mut E, indexed: bool, ctx: &SaveContext<'_>) -> TranslateResult<MapNode> {
        self.lifecycle.run_save(entity, ctx.unit())?;
        self.save_fields(entity, indexed, ctx)
    }

    /// Translate the fields of `entity` without running callbacks.
    pub fn save_fields(&self, entity: &E, indexed: bool, ctx: &SaveContext<'_>) -> TranslateResult<MapNode> {
        let indexed = self.default_indexed.unwrap_or(indexed);
        let mut map = MapNode::new();
        for (property, translator) in &self.fields {
            if !property.is_saved(entity) {
                continue;
            }
            let field_indexed = property.index_instruction(entity).unwrap_or(indexed);
            let node = translator.save(property.get(entity), field_indexed, ctx)?;
            map.insert(property.name(), node);
        }
        Ok(map)
    }

    pub fn load_entity(&self, node: &MapNode, ctx: &LoadContext<'_>) -> TranslateResult<E> {
        self.load_with(node, ctx, |_| {})
    }

    /// Load an instance; `prepare` runs after the fields are set and before
    /// the load callbacks.
    pub fn load_with(
        &self,
        node: &MapNode,
        ctx: &LoadContext<'_>,
        prepare: impl FnOnce(&mut E),
    ) -> TranslateResult<E> {
        let mut entity = E::default();
        for (name, child) in node.iter() {
            match self.find(name) {
                Some((property, translator)) => {
                    let value = translator.load(child, ctx)?;
                    property
                        .set(&mut entity, value)
                        .map_err(|e| TranslateError::field(translator.path(), e))?;
                }
                None if self.ignore_unknown => {
                    debug!(path = %self.path, property = name, "ignoring unknown property");
                }
                None => {
                    return Err(TranslateError::field(
                        &self.path.extend(name),
                        FieldError::UnknownProperty(name.to_string()),
                    ));
                }
            }
        }
        prepare(&mut entity);
        self.lifecycle.run_load(&mut entity, ctx)?;
        Ok(entity)
    }

    pub fn collect_references(&self, node: &MapNode, out: &mut Vec<RawKey>) {
        for (name, child) in node.iter() {
            if let Some((_, translator)) = self.find(name) {
                translator.collect_references(child, out);
            }
        }
    }

    /// The first property in declaration order that accepts `name`.
    fn find(&self, name: &str) -> Option<&(Property<E>, Translator)> {
        self.fields.iter().find(|(p, _)| p.accepts_name(name))
    }
}

impl<E: Class> ObjectCodec for ClassTranslator<E> {
    fn type_info(&self) -> TypeInfo {
        TypeInfo::of::<E>()
    }

    /// Embedded values are reached by shared reference, so save callbacks
    /// run on a copy.
    fn save(&self, value: &dyn Any, indexed: bool, ctx: &SaveContext<'_>) -> TranslateResult<MapNode> {
        let entity = value
            .downcast_ref::<E>()
            .ok_or_else(|| TranslateError::field(&self.path, FieldError::access::<E>()))?;
        if self.lifecycle.has_save_callbacks() {
            let mut copy = entity.clone();
            self.save_entity(&mut copy, indexed, ctx)
        } else {
            self.save_fields(entity, indexed, ctx)
        }
    }

    fn load(&self, node: &MapNode, ctx: &LoadContext<'_>) -> TranslateResult<Dynamic> {
        Ok(Box::new(self.load_entity(node, ctx)?))
    }

    fn collect_references(&self, node: &MapNode, out: &mut Vec<RawKey>) {
        ClassTranslator::collect_references(self, node, out);
    }
}

//! Translators: bidirectional converters between typed values and nodes.
//!
//! A translator is created once per field path at registration time and is
//! immutable afterwards. The variants mirror the field shapes in
//! [`crate::shape`]; every variant records the path it was built for so that
//! failures deep inside nested structures report where they happened.

use std::any::Any;
use std::sync::Arc;

use entmap_types::{Dynamic, EntityNode, ListNode, MapNode, Path, RawKey, Scalar, TypeInfo};

use crate::context::{LoadContext, SaveContext};
use crate::error::{FieldError, TranslateError, TranslateResult};
use crate::shape::{OptionalShape, ReferenceShape, SequenceShape};
use crate::value::ValueCodec;

/// Type-erased translator for an embedded class.
pub trait ObjectCodec: Send + Sync {
    fn type_info(&self) -> TypeInfo;

    fn save(&self, value: &dyn Any, indexed: bool, ctx: &SaveContext<'_>) -> TranslateResult<MapNode>;

    fn load(&self, node: &MapNode, ctx: &LoadContext<'_>) -> TranslateResult<Dynamic>;

    /// Append the keys of every eagerly loaded reference below `node`.
    fn collect_references(&self, node: &MapNode, out: &mut Vec<RawKey>);
}

/// A translator for one field path.
pub enum Translator {
    Value(ValueTranslator),
    Optional(OptionalTranslator),
    Sequence(SequenceTranslator),
    Object(ObjectTranslator),
    Reference(ReferenceTranslator),
}

impl Translator {
    pub fn path(&self) -> &Path {
        match self {
            Self::Value(t) => &t.path,
            Self::Optional(t) => &t.path,
            Self::Sequence(t) => &t.path,
            Self::Object(t) => &t.path,
            Self::Reference(t) => &t.path,
        }
    }

    /// Short name of the variant, for diagnostics.
    pub fn variant_name(&self) -> &'static str {
        match self {
            Self::Value(_) => "value",
            Self::Optional(_) => "optional",
            Self::Sequence(_) => "sequence",
            Self::Object(_) => "object",
            Self::Reference(_) => "reference",
        }
    }

    pub fn save(&self, value: &dyn Any, indexed: bool, ctx: &SaveContext<'_>) -> TranslateResult<EntityNode> {
        match self {
            Self::Value(t) => t.save(value, indexed),
            Self::Optional(t) => t.save(value, indexed, ctx),
            Self::Sequence(t) => t.save(value, indexed, ctx),
            Self::Object(t) => t.codec.save(value, indexed, ctx).map(EntityNode::Map),
            Self::Reference(t) => t.save(value, indexed),
        }
    }

    pub fn load(&self, node: &EntityNode, ctx: &LoadContext<'_>) -> TranslateResult<Dynamic> {
        match self {
            Self::Value(t) => t.load(node),
            Self::Optional(t) => t.load(node, ctx),
            Self::Sequence(t) => t.load(node, ctx),
            Self::Object(t) => {
                let map = node.as_map().map_err(|e| TranslateError::field(&t.path, e))?;
                t.codec.load(map, ctx)
            }
            Self::Reference(t) => t.load(node, ctx),
        }
    }

    /// Append the keys of every eagerly loaded reference below `node`.
    /// Nodes of the wrong shape are skipped; `load` reports them.
    pub fn collect_references(&self, node: &EntityNode, out: &mut Vec<RawKey>) {
        match (self, node) {
            (Self::Value(_), _) => {}
            (Self::Optional(t), node) if !node.is_null() => t.inner.collect_references(node, out),
            (Self::Optional(_), _) => {}
            (Self::Sequence(t), EntityNode::List(list)) => {
                for item in list {
                    t.component.collect_references(item, out);
                }
            }
            (Self::Object(t), EntityNode::Map(map)) => t.codec.collect_references(map, out),
            (Self::Reference(t), EntityNode::Leaf(leaf)) if t.eager && t.shape.holds_value => {
                if let Scalar::Key(key) = &leaf.value {
                    out.push(key.clone());
                }
            }
            _ => {}
        }
    }
}

// ---------------------------------------------------------------------------
// Value
// ---------------------------------------------------------------------------

/// Converts a single value to and from a leaf.
pub struct ValueTranslator {
    path: Path,
    codec: Arc<dyn ValueCodec>,
}

impl ValueTranslator {
    pub fn new(path: Path, codec: Arc<dyn ValueCodec>) -> Self {
        Self { path, codec }
    }

    fn save(&self, value: &dyn Any, indexed: bool) -> TranslateResult<EntityNode> {
        self.codec
            .save(value)
            .map(|scalar| EntityNode::leaf(scalar, indexed))
            .map_err(|e| TranslateError::field(&self.path, e))
    }

    fn load(&self, node: &EntityNode) -> TranslateResult<Dynamic> {
        let leaf = node.as_leaf().map_err(|e| TranslateError::field(&self.path, e))?;
        self.codec
            .load(&leaf.value)
            .map_err(|e| TranslateError::field(&self.path, e))
    }
}

// ---------------------------------------------------------------------------
// Optional
// ---------------------------------------------------------------------------

/// `None` is stored as a null leaf; `Some` delegates to the inner translator.
pub struct OptionalTranslator {
    path: Path,
    inner: Box<Translator>,
    shape: OptionalShape,
}

impl OptionalTranslator {
    pub fn new(path: Path, inner: Translator, shape: OptionalShape) -> Self {
        Self {
            path,
            inner: Box::new(inner),
            shape,
        }
    }

    fn save(&self, value: &dyn Any, indexed: bool, ctx: &SaveContext<'_>) -> TranslateResult<EntityNode> {
        match (self.shape.get)(value) {
            Some(Some(inner)) => self.inner.save(inner, indexed, ctx),
            Some(None) => Ok(EntityNode::null(indexed)),
            None => Err(self.access_error()),
        }
    }

    fn load(&self, node: &EntityNode, ctx: &LoadContext<'_>) -> TranslateResult<Dynamic> {
        if node.is_null() {
            return Ok((self.shape.none)());
        }
        let inner = self.inner.load(node, ctx)?;
        (self.shape.some)(inner).ok_or_else(|| self.access_error())
    }

    fn access_error(&self) -> TranslateError {
        TranslateError::field(
            &self.path,
            FieldError::Access {
                expected: (self.shape.inner)().info().name(),
            },
        )
    }
}

// ---------------------------------------------------------------------------
// Sequence
// ---------------------------------------------------------------------------

/// Lists, boxed slices and fixed-size arrays. The element translator is
/// built for the same path as the container; element errors are reported
/// under `container.<index>`.
pub struct SequenceTranslator {
    path: Path,
    component: Box<Translator>,
    shape: SequenceShape,
    container: TypeInfo,
}

impl SequenceTranslator {
    pub fn new(path: Path, component: Translator, shape: SequenceShape, container: TypeInfo) -> Self {
        Self {
            path,
            component: Box::new(component),
            shape,
            container,
        }
    }

    fn save(&self, value: &dyn Any, indexed: bool, ctx: &SaveContext<'_>) -> TranslateResult<EntityNode> {
        let elements = (self.shape.elements)(value).ok_or_else(|| self.access_error())?;
        let mut list = ListNode::with_capacity(elements.len());
        for (index, element) in elements.into_iter().enumerate() {
            let node = self
                .component
                .save(element, indexed, ctx)
                .map_err(|e| self.element_error(index, e))?;
            list.push(node);
        }
        Ok(EntityNode::List(list))
    }

    fn load(&self, node: &EntityNode, ctx: &LoadContext<'_>) -> TranslateResult<Dynamic> {
        let list = node.as_list().map_err(|e| TranslateError::field(&self.path, e))?;
        if let Some(expected) = self.shape.fixed_len {
            if list.len() != expected {
                return Err(TranslateError::field(
                    &self.path,
                    FieldError::SizeMismatch {
                        expected,
                        actual: list.len(),
                    },
                ));
            }
        }
        let values = list
            .iter()
            .enumerate()
            .map(|(index, item)| {
                self.component
                    .load(item, ctx)
                    .map_err(|e| self.element_error(index, e))
            })
            .collect::<TranslateResult<Vec<_>>>()?;
        (self.shape.collect)(values).ok_or_else(|| self.access_error())
    }

    fn element_error(&self, index: usize, err: TranslateError) -> TranslateError {
        match err {
            TranslateError::Field { path, source } => {
                let element = self.path.extend(index.to_string());
                TranslateError::Field {
                    path: path.rebase(&self.path, &element).unwrap_or(path),
                    source,
                }
            }
            other => other,
        }
    }

    fn access_error(&self) -> TranslateError {
        TranslateError::field(
            &self.path,
            FieldError::Access {
                expected: self.container.name(),
            },
        )
    }
}

// ---------------------------------------------------------------------------
// Object
// ---------------------------------------------------------------------------

/// An embedded class, stored as a nested map.
pub struct ObjectTranslator {
    path: Path,
    codec: Arc<dyn ObjectCodec>,
}

impl ObjectTranslator {
    pub fn new(path: Path, codec: Arc<dyn ObjectCodec>) -> Self {
        Self { path, codec }
    }

    pub fn codec(&self) -> &Arc<dyn ObjectCodec> {
        &self.codec
    }
}

// ---------------------------------------------------------------------------
// Reference
// ---------------------------------------------------------------------------

/// Key-valued fields. Stored as a key leaf; on load an eager reference picks
/// up the object resolved for its key.
pub struct ReferenceTranslator {
    path: Path,
    shape: ReferenceShape,
    eager: bool,
}

impl ReferenceTranslator {
    pub fn new(path: Path, shape: ReferenceShape, eager: bool) -> Self {
        Self { path, shape, eager }
    }

    pub fn is_eager(&self) -> bool {
        self.eager
    }

    fn save(&self, value: &dyn Any, indexed: bool) -> TranslateResult<EntityNode> {
        let key = (self.shape.key)(value).ok_or_else(|| {
            TranslateError::field(
                &self.path,
                FieldError::Access {
                    expected: self.shape.target.name(),
                },
            )
        })?;
        if !key.is_complete() {
            return Err(TranslateError::field(
                &self.path,
                FieldError::Conversion {
                    target: "key",
                    reason: format!("reference {key} has no id"),
                },
            ));
        }
        Ok(EntityNode::leaf(Scalar::Key(key.clone()), indexed))
    }

    fn load(&self, node: &EntityNode, ctx: &LoadContext<'_>) -> TranslateResult<Dynamic> {
        let leaf = node.as_leaf().map_err(|e| TranslateError::field(&self.path, e))?;
        let Scalar::Key(key) = &leaf.value else {
            return Err(TranslateError::field(
                &self.path,
                FieldError::unexpected_scalar("key", &leaf.value),
            ));
        };
        let value = if self.eager && self.shape.holds_value {
            ctx.resolved(key).cloned()
        } else {
            None
        };
        Ok((self.shape.build)(key.clone(), value))
    }
}

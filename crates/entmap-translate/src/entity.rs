//! Root entities.

use std::any::Any;
use std::sync::Arc;

use entmap_types::{Key, KeyId, MapNode, RawKey, Shared, TypeInfo};

use crate::class::{Class, ClassTranslator};
use crate::context::{LoadContext, SaveContext};
use crate::error::{FieldError, TranslateError, TranslateResult};

/// A class stored as its own record, identified by a key of kind
/// [`Entity::KIND`].
pub trait Entity: Class {
    const KIND: &'static str;

    /// Whether a missing id is allocated by the store on save.
    const AUTO_ID: bool = true;

    fn key_id(&self) -> KeyId;

    fn set_key_id(&mut self, id: KeyId);

    /// The key of this instance, complete or not.
    fn raw_key(&self) -> RawKey {
        RawKey::new(Self::KIND, self.key_id())
    }

    /// The key of this instance, if its id is set.
    fn key(&self) -> Option<Key<Self>> {
        let raw = self.raw_key();
        raw.is_complete().then(|| Key::from_raw(raw))
    }

    fn key_for(id: impl Into<KeyId>) -> Key<Self> {
        Key::from_raw(RawKey::new(Self::KIND, id))
    }
}

/// Type-erased entity translator, used where only a `dyn Any` is at hand.
pub trait EntityCodec: Send + Sync {
    fn kind(&self) -> &'static str;

    fn type_info(&self) -> TypeInfo;

    /// The key of `entity`. May be incomplete.
    fn raw_key_of(&self, entity: &dyn Any) -> TranslateResult<RawKey>;

    /// The key of `entity`, which must be complete.
    fn key_of(&self, entity: &dyn Any) -> TranslateResult<RawKey> {
        let key = self.raw_key_of(entity)?;
        if !key.is_complete() {
            return Err(TranslateError::IncompleteKey {
                kind: key.kind().to_string(),
            });
        }
        Ok(key)
    }

    /// Whether saving `entity` needs the store to allocate an id.
    fn requires_autogenerated_id(&self, entity: &dyn Any) -> bool;

    /// Translate `entity` into its key and property map. Save callbacks run
    /// on a copy.
    fn save(&self, entity: &dyn Any, ctx: &SaveContext<'_>) -> TranslateResult<(RawKey, MapNode)>;

    fn load(&self, key: &RawKey, node: &MapNode, ctx: &LoadContext<'_>) -> TranslateResult<Shared>;

    fn collect_references(&self, node: &MapNode, out: &mut Vec<RawKey>);
}

/// Translator for a root entity of type `E`.
pub struct EntityTranslator<E> {
    class: ClassTranslator<E>,
    default_indexed: bool,
}

impl<E: Entity> EntityTranslator<E> {
    pub(crate) fn new(class: ClassTranslator<E>, default_indexed: bool) -> Self {
        Self { class, default_indexed }
    }

    pub fn class(&self) -> &ClassTranslator<E> {
        &self.class
    }

    /// Run the save callbacks on `entity` in place, then translate it.
    pub fn save(&self, entity: &mut E, ctx: &SaveContext<'_>) -> TranslateResult<MapNode> {
        self.class.save_entity(entity, self.default_indexed, ctx)
    }

    /// Load an instance and assign it the id of `key`.
    pub fn load(&self, key: &RawKey, node: &MapNode, ctx: &LoadContext<'_>) -> TranslateResult<E> {
        self.class
            .load_with(node, ctx, |entity| entity.set_key_id(key.id().clone()))
    }

    fn downcast<'a>(&self, entity: &'a dyn Any) -> TranslateResult<&'a E> {
        entity.downcast_ref::<E>().ok_or_else(|| {
            TranslateError::field(self.class.path(), FieldError::access::<E>())
        })
    }
}

impl<E: Entity> EntityCodec for EntityTranslator<E> {
    fn kind(&self) -> &'static str {
        E::KIND
    }

    fn type_info(&self) -> TypeInfo {
        TypeInfo::of::<E>()
    }

    fn raw_key_of(&self, entity: &dyn Any) -> TranslateResult<RawKey> {
        Ok(self.downcast(entity)?.raw_key())
    }

    fn requires_autogenerated_id(&self, entity: &dyn Any) -> bool {
        E::AUTO_ID
            && self
                .downcast(entity)
                .is_ok_and(|e| !e.key_id().is_assigned())
    }

    fn save(&self, entity: &dyn Any, ctx: &SaveContext<'_>) -> TranslateResult<(RawKey, MapNode)> {
        let mut copy = self.downcast(entity)?.clone();
        let node = EntityTranslator::save(self, &mut copy, ctx)?;
        Ok((copy.raw_key(), node))
    }

    fn load(&self, key: &RawKey, node: &MapNode, ctx: &LoadContext<'_>) -> TranslateResult<Shared> {
        let entity = EntityTranslator::load(self, key, node, ctx)?;
        Ok(Arc::new(entity))
    }

    fn collect_references(&self, node: &MapNode, out: &mut Vec<RawKey>) {
        self.class.collect_references(node, out);
    }
}

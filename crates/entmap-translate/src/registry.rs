use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use entmap_types::{MapNode, Path, RawKey, Shared, TypeInfo};
use tracing::debug;

use crate::class::ClassTranslator;
use crate::config::TranslateConfig;
use crate::context::{LoadContext, SaveContext};
use crate::entity::{Entity, EntityCodec, EntityTranslator};
use crate::error::{RegistrationError, RegistrationResult, TranslateError, TranslateResult};
use crate::factory::{CreateContext, TranslatorFactory, Translators};

struct Registered {
    info: TypeInfo,
    codec: Arc<dyn EntityCodec>,
    typed: Shared,
}

/// Registered entity types and the factory chain used to build them.
///
/// Registration is the only mutating operation; once every type is
/// registered the registry is shared read-only.
pub struct Registry {
    translators: Translators,
    config: TranslateConfig,
    entities: HashMap<TypeId, Registered>,
    kinds: HashMap<&'static str, TypeId>,
}

impl Registry {
    pub fn new(config: TranslateConfig) -> Self {
        Self::with_translators(Translators::default(), config)
    }

    pub fn with_translators(translators: Translators, config: TranslateConfig) -> Self {
        Self {
            translators,
            config,
            entities: HashMap::new(),
            kinds: HashMap::new(),
        }
    }

    pub fn config(&self) -> &TranslateConfig {
        &self.config
    }

    pub fn translators(&self) -> &Translators {
        &self.translators
    }

    /// Add a factory ahead of the built-ins. Only affects types registered
    /// afterwards.
    pub fn add_factory(&mut self, factory: Box<dyn TranslatorFactory>) {
        debug!(factory = factory.name(), "translator factory added");
        self.translators.push_front(factory);
    }

    /// Register `E`, building its translator. Registering the same type
    /// twice returns the existing translator.
    pub fn register<E: Entity>(&mut self) -> RegistrationResult<Arc<EntityTranslator<E>>> {
        if let Some(existing) = self.entities.get(&TypeId::of::<E>()) {
            if let Ok(typed) = existing.typed.clone().downcast::<EntityTranslator<E>>() {
                return Ok(typed);
            }
        }
        if let Some(existing) = self.kinds.get(E::KIND).and_then(|id| self.entities.get(id)) {
            return Err(RegistrationError::DuplicateKind {
                kind: E::KIND.to_string(),
                existing: existing.info.name().to_string(),
            });
        }

        let class = {
            let mut ctx = CreateContext::new(&self.translators, &self.config);
            ClassTranslator::<E>::build(&Path::root(), &mut ctx)?
        };
        let translator = Arc::new(EntityTranslator::new(class, self.config.default_indexed));

        self.entities.insert(
            TypeId::of::<E>(),
            Registered {
                info: TypeInfo::of::<E>(),
                codec: translator.clone(),
                typed: translator.clone(),
            },
        );
        self.kinds.insert(E::KIND, TypeId::of::<E>());
        debug!(
            kind = E::KIND,
            type_name = std::any::type_name::<E>(),
            properties = translator.class().properties().count(),
            "entity registered"
        );
        Ok(translator)
    }

    pub fn is_registered<E: Entity>(&self) -> bool {
        self.entities.contains_key(&TypeId::of::<E>())
    }

    pub fn translator<E: Entity>(&self) -> TranslateResult<Arc<EntityTranslator<E>>> {
        self.entities
            .get(&TypeId::of::<E>())
            .and_then(|r| r.typed.clone().downcast::<EntityTranslator<E>>().ok())
            .ok_or_else(|| TranslateError::Unregistered(std::any::type_name::<E>().to_string()))
    }

    pub fn codec_for_type(&self, id: TypeId) -> Option<&Arc<dyn EntityCodec>> {
        self.entities.get(&id).map(|r| &r.codec)
    }

    pub fn codec_for_kind(&self, kind: &str) -> Option<&Arc<dyn EntityCodec>> {
        self.kinds.get(kind).and_then(|id| self.codec_for_type(*id))
    }

    /// The codec for the concrete type behind `value`.
    pub fn codec_for_value(&self, value: &dyn Any) -> TranslateResult<&Arc<dyn EntityCodec>> {
        self.codec_for_type(value.type_id())
            .ok_or_else(|| TranslateError::Unregistered(format!("{:?}", value.type_id())))
    }

    /// Translate `entity`, running its save callbacks in place.
    pub fn save<E: Entity>(&self, entity: &mut E, ctx: &SaveContext<'_>) -> TranslateResult<MapNode> {
        self.translator::<E>()?.save(entity, ctx)
    }

    pub fn load<E: Entity>(&self, key: &RawKey, node: &MapNode, ctx: &LoadContext<'_>) -> TranslateResult<E> {
        self.translator::<E>()?.load(key, node, ctx)
    }

    /// Kinds of every registered entity, sorted.
    pub fn kinds(&self) -> Vec<&'static str> {
        let mut kinds: Vec<_> = self.kinds.keys().copied().collect();
        kinds.sort_unstable();
        kinds
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new(TranslateConfig::default())
    }
}

use std::sync::Arc;

use entmap_store::Datastore;
use entmap_translate::{Entity, EntityTranslator, Registry, TranslatorFactory};
use tracing::debug;

use crate::config::EntmapConfig;
use crate::error::EntmapResult;
use crate::unit::UnitOfWork;

/// Entry point: owns the entity registry and the datastore handle.
///
/// Register every entity type up front, then open units of work with
/// [`EntityFactory::begin`]. Registration needs `&mut self`, so the registry
/// cannot change while a unit of work is open.
pub struct EntityFactory {
    registry: Registry,
    store: Arc<dyn Datastore>,
    config: EntmapConfig,
}

impl EntityFactory {
    pub fn new(store: Arc<dyn Datastore>) -> Self {
        Self::with_config(store, EntmapConfig::default())
    }

    pub fn with_config(store: Arc<dyn Datastore>, config: EntmapConfig) -> Self {
        Self {
            registry: Registry::new(config.translate.clone()),
            store,
            config,
        }
    }

    /// Register `E`. Registering a type twice is a no-op.
    pub fn register<E: Entity>(&mut self) -> EntmapResult<Arc<EntityTranslator<E>>> {
        Ok(self.registry.register::<E>()?)
    }

    /// Add a translator factory ahead of the built-ins. Affects only types
    /// registered afterwards.
    pub fn add_factory(&mut self, factory: Box<dyn TranslatorFactory>) {
        self.registry.add_factory(factory);
    }

    /// Open a new unit of work.
    pub fn begin(&self) -> UnitOfWork<'_> {
        let unit = UnitOfWork::new(self);
        debug!(unit = %unit.id(), "unit of work started");
        unit
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn store(&self) -> &Arc<dyn Datastore> {
        &self.store
    }

    pub fn config(&self) -> &EntmapConfig {
        &self.config
    }
}

impl std::fmt::Debug for EntityFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityFactory")
            .field("kinds", &self.registry.kinds())
            .field("config", &self.config)
            .finish()
    }
}

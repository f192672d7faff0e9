//! Glue between the deferrer and the registry and datastore.

use std::any::Any;

use async_trait::async_trait;
use entmap_session::{BatchWriter, Deferred, KeyDerivation};
use entmap_store::Record;
use entmap_translate::{Registry, SaveContext};
use entmap_types::RawKey;
use tracing::trace;

use crate::error::{EntmapError, EntmapResult};
use crate::factory::EntityFactory;
use crate::unit::UnitHandle;

/// Derives keys through the codec registered for the value's type.
pub(crate) struct FactoryKeys<'f> {
    registry: &'f Registry,
}

impl<'f> FactoryKeys<'f> {
    pub(crate) fn new(registry: &'f Registry) -> Self {
        Self { registry }
    }
}

impl KeyDerivation for FactoryKeys<'_> {
    type Error = EntmapError;

    fn key_of(&self, value: &dyn Any) -> EntmapResult<RawKey> {
        Ok(self.registry.codec_for_value(value)?.key_of(value)?)
    }

    fn requires_autogenerated_id(&self, value: &dyn Any) -> bool {
        self.registry
            .codec_for_value(value)
            .is_ok_and(|codec| codec.requires_autogenerated_id(value))
    }
}

/// Writes flushed batches to the factory's datastore.
pub(crate) struct FactoryWriter<'a> {
    factory: &'a EntityFactory,
    unit: &'a UnitHandle,
}

impl<'a> FactoryWriter<'a> {
    pub(crate) fn new(factory: &'a EntityFactory, unit: &'a UnitHandle) -> Self {
        Self { factory, unit }
    }

    /// Translate every deferred value. Entity save callbacks run here, on
    /// copies of the deferred instances.
    fn records(&self, values: Vec<Deferred>) -> EntmapResult<Vec<Record>> {
        let ctx = SaveContext::new(self.unit);
        values
            .into_iter()
            .map(|value| match value {
                Deferred::Record(record) => Ok(record),
                Deferred::Entity(entity) => {
                    let codec = self.factory.registry().codec_for_value(&*entity)?;
                    let (key, properties) = codec.save(&*entity, &ctx)?;
                    Ok(Record::new(key, properties))
                }
            })
            .collect()
    }
}

#[async_trait]
impl BatchWriter for FactoryWriter<'_> {
    type Error = EntmapError;

    async fn save_batch(&self, values: Vec<Deferred>) -> EntmapResult<()> {
        let records = self.records(values)?;
        trace!(unit = %self.unit.id(), count = records.len(), "writing deferred saves");
        self.factory.store().put(records).await?;
        Ok(())
    }

    async fn delete_batch(&self, keys: Vec<RawKey>) -> EntmapResult<()> {
        trace!(unit = %self.unit.id(), count = keys.len(), "writing deferred deletes");
        self.factory.store().delete(&keys).await?;
        Ok(())
    }
}

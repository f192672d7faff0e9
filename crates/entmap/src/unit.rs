use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use entmap_session::{Deferred, Deferrer, FlushSummary, Session, SessionEntry, UndeferTarget};
use entmap_store::Record;
use entmap_translate::{Entity, EntityCodec, LoadContext, Registry, SaveContext, TranslateError, UnitOfWorkHandle};
use entmap_types::{Key, RawKey, Shared};
use tracing::{debug, trace};
use uuid::Uuid;

use crate::adapters::{FactoryKeys, FactoryWriter};
use crate::error::{EntmapError, EntmapResult};
use crate::factory::EntityFactory;

/// Identity of a unit of work, handed to lifecycle callbacks.
///
/// Callbacks that take the unit of work receive a `&dyn UnitOfWorkHandle`;
/// downcast it to `UnitHandle` to read the id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct UnitHandle {
    id: Uuid,
}

impl UnitHandle {
    fn new() -> Self {
        Self { id: Uuid::now_v7() }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }
}

impl UnitOfWorkHandle for UnitHandle {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A single logical caller's view of the datastore.
///
/// Owns an identity [`Session`] and a [`Deferrer`]. Direct operations hit the
/// store immediately; deferred ones are coalesced per key and written by
/// [`UnitOfWork::flush`].
pub struct UnitOfWork<'f> {
    factory: &'f EntityFactory,
    handle: UnitHandle,
    session: Session,
    deferrer: Deferrer<FactoryKeys<'f>>,
}

impl<'f> UnitOfWork<'f> {
    pub(crate) fn new(factory: &'f EntityFactory) -> Self {
        Self {
            factory,
            handle: UnitHandle::new(),
            session: Session::new(),
            deferrer: Deferrer::new(FactoryKeys::new(factory.registry())),
        }
    }

    pub fn id(&self) -> Uuid {
        self.handle.id
    }

    pub fn handle(&self) -> &UnitHandle {
        &self.handle
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Number of deferred operations waiting for a flush.
    pub fn pending(&self) -> usize {
        self.deferrer.len()
    }

    // ---- Direct operations ----

    /// Save `entity` now.
    ///
    /// Save callbacks run on `entity` itself before it is translated. When
    /// the store allocates an id it is written back into `entity`. Any
    /// deferred operation on the same key is cancelled.
    pub async fn save<E: Entity>(&mut self, entity: &mut E) -> EntmapResult<Key<E>> {
        let translator = self.factory.registry().translator::<E>()?;
        let properties = translator.save(entity, &SaveContext::new(&self.handle))?;
        let key = entity.raw_key();
        if !key.is_complete() && !E::AUTO_ID {
            return Err(TranslateError::IncompleteKey {
                kind: E::KIND.to_string(),
            }
            .into());
        }

        let stored = self
            .factory
            .store()
            .put(vec![Record::new(key.clone(), properties)])
            .await?
            .into_iter()
            .next()
            .ok_or(EntmapError::MissingKey(key))?;
        if !entity.key_id().is_assigned() {
            entity.set_key_id(stored.id().clone());
        }

        self.session.add_value(stored.clone(), Arc::new(entity.clone()));
        self.deferrer.undefer(stored.clone())?;
        debug!(unit = %self.handle.id, key = %stored, "entity saved");
        Ok(Key::from_raw(stored))
    }

    /// Load the entity under `key`, with its eager references.
    ///
    /// Keys already in the session are served from it without touching the
    /// store, so repeated loads yield the same instance.
    pub async fn load<E: Entity>(&mut self, key: &Key<E>) -> EntmapResult<Option<Arc<E>>> {
        let Some(value) = self.load_raw(key.raw()).await? else {
            return Ok(None);
        };
        value
            .downcast::<E>()
            .map(Some)
            .map_err(|_| TranslateError::Unregistered(std::any::type_name::<E>().to_string()).into())
    }

    /// Load by untyped key. The entity type is found from the key's kind.
    ///
    /// Eager references are fetched level by level, then every record is
    /// materialized after the records it eagerly references, so load
    /// callbacks always see their eager targets loaded. A reference cycle is
    /// broken at the key that closes it.
    pub async fn load_raw(&mut self, key: &RawKey) -> EntmapResult<Option<Shared>> {
        match self.session.get(key) {
            Some(SessionEntry::Present(value)) => return Ok(Some(value.clone())),
            Some(SessionEntry::Deleted) => return Ok(None),
            None => {}
        }
        let factory = self.factory;
        let Some(root) = factory.store().get_one(key).await? else {
            return Ok(None);
        };

        let mut records = HashMap::from([(key.clone(), root)]);
        let mut edges: HashMap<RawKey, Vec<RawKey>> = HashMap::new();
        let mut seen = HashSet::from([key.clone()]);
        let mut cached: Vec<(RawKey, Shared)> = Vec::new();
        let mut level = vec![key.clone()];
        for depth in 0..factory.config().eager_load_depth {
            let mut wanted = Vec::new();
            for source in &level {
                let Some(record) = records.get(source) else {
                    continue;
                };
                let mut refs = Vec::new();
                codec_for(factory.registry(), &record.key)?.collect_references(&record.properties, &mut refs);
                for target in &refs {
                    if !seen.insert(target.clone()) {
                        continue;
                    }
                    match self.session.get(target) {
                        Some(SessionEntry::Present(value)) => cached.push((target.clone(), value.clone())),
                        Some(SessionEntry::Deleted) => {}
                        None => wanted.push(target.clone()),
                    }
                }
                edges.insert(source.clone(), refs);
            }
            if wanted.is_empty() {
                break;
            }
            trace!(unit = %self.handle.id, depth, count = wanted.len(), "fetching eager references");
            level = Vec::with_capacity(wanted.len());
            for record in factory.store().get(&wanted).await?.into_iter().flatten() {
                level.push(record.key.clone());
                records.insert(record.key.clone(), record);
            }
        }

        let mut ctx = LoadContext::new(&self.handle);
        for (target, value) in cached {
            ctx.resolve(target, value);
        }
        let mut loaded = None;
        for current in dependency_order(key, &edges) {
            let Some(record) = records.get(&current) else {
                continue;
            };
            let value = codec_for(factory.registry(), &record.key)?.load(&record.key, &record.properties, &ctx)?;
            ctx.resolve(current.clone(), value.clone());
            self.session.add_value(current.clone(), value.clone());
            if current == *key {
                loaded = Some(value);
            }
        }
        debug!(unit = %self.handle.id, key = %key, records = records.len(), "entity loaded");
        Ok(loaded)
    }

    /// Delete `key` now. Any deferred operation on it is cancelled.
    pub async fn delete(&mut self, key: impl Into<RawKey>) -> EntmapResult<()> {
        let key = key.into();
        self.factory.store().delete(std::slice::from_ref(&key)).await?;
        self.deferrer.undefer(key.clone())?;
        debug!(unit = %self.handle.id, key = %key, "entity deleted");
        self.session.mark_deleted(key);
        Ok(())
    }

    // ---- Deferred operations ----

    /// Queue `entity` for the next flush.
    ///
    /// Returns the shared instance now held by the unit of work; an entity
    /// still waiting for an allocated id can only be undeferred through it.
    pub fn defer_save<E: Entity>(&mut self, entity: E) -> EntmapResult<Arc<E>> {
        self.factory.registry().translator::<E>()?;
        let entity = Arc::new(entity);
        self.deferrer
            .defer_save(&mut self.session, Deferred::Entity(entity.clone()))?;
        Ok(entity)
    }

    /// Queue an already translated record for the next flush.
    pub fn defer_save_record(&mut self, record: Record) -> EntmapResult<()> {
        self.deferrer.defer_save(&mut self.session, Deferred::Record(record))
    }

    pub fn defer_delete(&mut self, key: impl Into<RawKey>) {
        self.deferrer.defer_delete(&mut self.session, key.into());
    }

    /// Cancel the deferred operation for `target`.
    pub fn undefer(&mut self, target: impl Into<UndeferTarget>) -> EntmapResult<()> {
        self.deferrer.undefer(target)
    }

    /// Write every deferred operation. The queue is empty afterwards even
    /// when a batch fails.
    pub async fn flush(&mut self) -> EntmapResult<FlushSummary> {
        let writer = FactoryWriter::new(self.factory, &self.handle);
        let summary = self.deferrer.flush(&writer).await?;
        if !summary.is_empty() {
            debug!(
                unit = %self.handle.id,
                saved = summary.saved,
                deleted = summary.deleted,
                "unit of work flushed"
            );
        }
        Ok(summary)
    }

    /// Forget every cached object. Deferred operations are kept.
    pub fn clear_session(&mut self) {
        self.session.clear();
    }

    /// Flush and close the unit of work.
    pub async fn finish(mut self) -> EntmapResult<FlushSummary> {
        self.flush().await
    }
}

impl std::fmt::Debug for UnitOfWork<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnitOfWork")
            .field("id", &self.handle.id)
            .field("session", &self.session)
            .field("deferrer", &self.deferrer)
            .finish()
    }
}

/// Keys reachable from `root` in post-order: every key comes after the keys
/// it references. An edge back to a key still being visited is skipped.
fn dependency_order(root: &RawKey, edges: &HashMap<RawKey, Vec<RawKey>>) -> Vec<RawKey> {
    fn visit(key: &RawKey, edges: &HashMap<RawKey, Vec<RawKey>>, visited: &mut HashSet<RawKey>, out: &mut Vec<RawKey>) {
        if !visited.insert(key.clone()) {
            return;
        }
        for target in edges.get(key).into_iter().flatten() {
            visit(target, edges, visited, out);
        }
        out.push(key.clone());
    }

    let mut visited = HashSet::new();
    let mut out = Vec::new();
    visit(root, edges, &mut visited, &mut out);
    out
}

fn codec_for<'r>(registry: &'r Registry, key: &RawKey) -> EntmapResult<&'r Arc<dyn EntityCodec>> {
    registry
        .codec_for_kind(key.kind())
        .ok_or_else(|| EntmapError::UnknownKind(key.kind().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(id: i64) -> RawKey {
        RawKey::new("Node", id)
    }

    #[test]
    fn targets_come_before_their_holders() {
        // 1 -> [2, 3], 3 -> [2]: 2 is reached first from 1 and again from 3.
        let edges = HashMap::from([(key(1), vec![key(2), key(3)]), (key(3), vec![key(2)])]);
        assert_eq!(dependency_order(&key(1), &edges), vec![key(2), key(3), key(1)]);

        let edges = HashMap::from([(key(1), vec![key(3), key(2)]), (key(3), vec![key(2)])]);
        assert_eq!(dependency_order(&key(1), &edges), vec![key(2), key(3), key(1)]);
    }

    #[test]
    fn cycles_are_broken_at_the_closing_edge() {
        let edges = HashMap::from([(key(1), vec![key(2)]), (key(2), vec![key(1)])]);
        assert_eq!(dependency_order(&key(1), &edges), vec![key(2), key(1)]);
    }

    #[test]
    fn unit_handles_are_distinct() {
        assert_ne!(UnitHandle::new(), UnitHandle::new());
    }
}

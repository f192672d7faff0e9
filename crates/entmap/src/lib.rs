//! Typed entity mapping over a schemaless datastore.
//!
//! Ties the translation engine, the datastore, and the unit-of-work session
//! together behind one entry point.
//!
//! # Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use entmap::{Class, ClassBuilder, Entity, EntityFactory, InMemoryDatastore, KeyId};
//!
//! #[derive(Clone, Default)]
//! struct Task {
//!     id: Option<i64>,
//!     title: String,
//! }
//!
//! impl Class for Task {
//!     fn describe(class: &mut ClassBuilder<Self>) {
//!         class.field("title", |t| &t.title, |t| &mut t.title).index();
//!     }
//! }
//!
//! impl Entity for Task {
//!     const KIND: &'static str = "Task";
//!     fn key_id(&self) -> KeyId { self.id.into() }
//!     fn set_key_id(&mut self, id: KeyId) {
//!         if let KeyId::Long(id) = id { self.id = Some(id) }
//!     }
//! }
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let mut factory = EntityFactory::new(Arc::new(InMemoryDatastore::new()));
//! factory.register::<Task>().unwrap();
//!
//! let mut unit = factory.begin();
//! let mut task = Task { id: None, title: "write docs".into() };
//! let key = unit.save(&mut task).await.unwrap();
//! assert!(task.id.is_some());
//!
//! let mut other = factory.begin();
//! let loaded = other.load(&key).await.unwrap().unwrap();
//! assert_eq!(loaded.title, "write docs");
//! # });
//! ```
//!
//! # Modules
//!
//! - [`factory`] — [`EntityFactory`]: registration and units of work
//! - [`unit`] — [`UnitOfWork`]: direct and deferred operations
//! - [`config`] — [`EntmapConfig`], loadable from TOML
//! - [`error`] — [`EntmapError`]

mod adapters;
pub mod config;
pub mod error;
pub mod factory;
pub mod unit;

pub use config::EntmapConfig;
pub use error::{EntmapError, EntmapResult};
pub use factory::EntityFactory;
pub use unit::{UnitHandle, UnitOfWork};

// Re-export the types needed to declare and use entities.
pub use entmap_session::{Deferred, FlushSummary, Session, SessionEntry, UndeferTarget};
pub use entmap_store::{Datastore, InMemoryDatastore, Record, StoreError};
pub use entmap_translate::{
    BoxError, CallbackResult, Class, ClassBuilder, ConditionClass, Entity, LoadContext, Ref, RegistrationError,
    SaveContext, TranslateConfig, TranslateError, UnitOfWorkHandle,
};
pub use entmap_types::{EntityNode, Key, KeyId, MapNode, Path, RawKey, Scalar};

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[derive(Clone, Debug, Default)]
    struct Author {
        id: Option<i64>,
        name: String,
    }

    impl Class for Author {
        fn describe(class: &mut ClassBuilder<Self>) {
            class.field("name", |a| &a.name, |a| &mut a.name).index();
        }
    }

    impl Entity for Author {
        const KIND: &'static str = "Author";

        fn key_id(&self) -> KeyId {
            self.id.into()
        }

        fn set_key_id(&mut self, id: KeyId) {
            if let KeyId::Long(id) = id {
                self.id = Some(id);
            }
        }
    }

    #[derive(Clone, Debug, Default)]
    struct Book {
        isbn: String,
        title: String,
        author: Ref<Author>,
        saved_by: String,
        author_on_load: Option<String>,
    }

    impl Class for Book {
        fn describe(class: &mut ClassBuilder<Self>) {
            class.field("title", |b| &b.title, |b| &mut b.title);
            class.field("author", |b| &b.author, |b| &mut b.author).load();
            class.field("savedBy", |b| &b.saved_by, |b| &mut b.saved_by);
            class.on_save_with_unit(|b, unit| {
                if let Some(handle) = unit.as_any().downcast_ref::<UnitHandle>() {
                    b.saved_by = handle.id().to_string();
                }
                Ok(())
            });
            class.on_load(|b| {
                b.author_on_load = b.author.get().map(|a| a.name.clone());
                Ok(())
            });
        }
    }

    impl Entity for Book {
        const KIND: &'static str = "Book";
        const AUTO_ID: bool = false;

        fn key_id(&self) -> KeyId {
            if self.isbn.is_empty() {
                KeyId::Unassigned
            } else {
                KeyId::Name(self.isbn.clone())
            }
        }

        fn set_key_id(&mut self, id: KeyId) {
            if let KeyId::Name(isbn) = id {
                self.isbn = isbn;
            }
        }
    }

    #[derive(Debug, thiserror::Error)]
    #[error("guarded entity refused to save")]
    struct Refused;

    #[derive(Clone, Debug, Default)]
    struct Guarded {
        id: Option<i64>,
        refuse: bool,
    }

    impl Class for Guarded {
        fn describe(class: &mut ClassBuilder<Self>) {
            class.field("refuse", |g| &g.refuse, |g| &mut g.refuse);
            class.on_save(|g| if g.refuse { Err(Box::new(Refused)) } else { Ok(()) });
        }
    }

    impl Entity for Guarded {
        const KIND: &'static str = "Guarded";

        fn key_id(&self) -> KeyId {
            self.id.into()
        }

        fn set_key_id(&mut self, id: KeyId) {
            if let KeyId::Long(id) = id {
                self.id = Some(id);
            }
        }
    }

    fn setup(config: EntmapConfig) -> (EntityFactory, Arc<InMemoryDatastore>) {
        let store = Arc::new(InMemoryDatastore::new());
        let mut factory = EntityFactory::with_config(store.clone(), config);
        factory.register::<Author>().unwrap();
        factory.register::<Book>().unwrap();
        factory.register::<Guarded>().unwrap();
        (factory, store)
    }

    fn book(isbn: &str, title: &str, author: &Author) -> Book {
        Book {
            isbn: isbn.into(),
            title: title.into(),
            author: Ref::of(author).unwrap(),
            ..Default::default()
        }
    }

    // -----------------------------------------------------------------------
    // Direct save / load / delete
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn save_assigns_id_and_caches() {
        let (factory, store) = setup(EntmapConfig::default());
        let mut unit = factory.begin();
        let mut author = Author {
            id: None,
            name: "Le Guin".into(),
        };
        let key = unit.save(&mut author).await.unwrap();
        assert_eq!(author.id, Some(1));
        assert_eq!(key.raw(), &RawKey::new("Author", 1));

        let loaded = unit.load(&key).await.unwrap().unwrap();
        assert_eq!(loaded.name, "Le Guin");
        assert_eq!(store.get_calls(), 0);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn load_resolves_eager_reference_before_callbacks() {
        let (factory, store) = setup(EntmapConfig::default());
        let mut writer = factory.begin();
        let mut author = Author {
            id: None,
            name: "Herbert".into(),
        };
        writer.save(&mut author).await.unwrap();
        let mut dune = book("978-0441013593", "Dune", &author);
        let key = writer.save(&mut dune).await.unwrap();
        assert_eq!(dune.saved_by, writer.id().to_string());

        let mut reader = factory.begin();
        let loaded = reader.load(&key).await.unwrap().unwrap();
        assert_eq!(loaded.title, "Dune");
        assert_eq!(loaded.author_on_load.as_deref(), Some("Herbert"));
        assert_eq!(loaded.author.get().map(|a| a.name.as_str()), Some("Herbert"));
        assert!(reader.session().contains(&author.raw_key()));

        // Same unit, same instance, no further reads.
        let gets = store.get_calls();
        let again = reader.load(&key).await.unwrap().unwrap();
        assert!(Arc::ptr_eq(&loaded, &again));
        let cached_author = reader.load(&Author::key_for(1)).await.unwrap().unwrap();
        assert!(Arc::ptr_eq(&cached_author, loaded.author.value().unwrap()));
        assert_eq!(store.get_calls(), gets);
    }

    #[tokio::test]
    async fn eager_depth_limit_leaves_reference_unloaded() {
        let config = EntmapConfig {
            eager_load_depth: 0,
            ..Default::default()
        };
        let (factory, _store) = setup(config);
        let mut unit = factory.begin();
        let mut author = Author {
            id: Some(7),
            name: "Banks".into(),
        };
        unit.save(&mut author).await.unwrap();
        let key = unit.save(&mut book("1", "Excession", &author)).await.unwrap();

        let mut reader = factory.begin();
        let loaded = reader.load(&key).await.unwrap().unwrap();
        assert!(!loaded.author.is_loaded());
        assert_eq!(loaded.author.key(), &Author::key_for(7));
        assert!(loaded.author_on_load.is_none());
    }

    #[tokio::test]
    async fn missing_record_loads_as_none() {
        let (factory, _store) = setup(EntmapConfig::default());
        let mut unit = factory.begin();
        assert!(unit.load(&Author::key_for(99)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_is_remembered_by_the_session() {
        let (factory, store) = setup(EntmapConfig::default());
        let mut unit = factory.begin();
        let mut author = Author {
            id: None,
            name: "x".into(),
        };
        let key = unit.save(&mut author).await.unwrap();
        unit.delete(key.clone()).await.unwrap();
        assert!(store.is_empty());

        let gets = store.get_calls();
        assert!(unit.load(&key).await.unwrap().is_none());
        assert_eq!(store.get_calls(), gets);
    }

    #[tokio::test]
    async fn clear_session_forces_a_reload() {
        let (factory, store) = setup(EntmapConfig::default());
        let mut unit = factory.begin();
        let key = unit
            .save(&mut Author {
                id: None,
                name: "y".into(),
            })
            .await
            .unwrap();
        let first = unit.load(&key).await.unwrap().unwrap();
        unit.clear_session();
        assert!(unit.session().is_empty());
        let second = unit.load(&key).await.unwrap().unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(store.get_calls(), 1);
    }

    // -----------------------------------------------------------------------
    // Eager loading order
    // -----------------------------------------------------------------------

    #[derive(Clone, Debug, Default)]
    struct Leaf {
        id: Option<i64>,
        label: String,
    }

    impl Class for Leaf {
        fn describe(class: &mut ClassBuilder<Self>) {
            class.field("label", |l| &l.label, |l| &mut l.label);
        }
    }

    impl Entity for Leaf {
        const KIND: &'static str = "Leaf";

        fn key_id(&self) -> KeyId {
            self.id.into()
        }

        fn set_key_id(&mut self, id: KeyId) {
            if let KeyId::Long(id) = id {
                self.id = Some(id);
            }
        }
    }

    #[derive(Clone, Debug, Default)]
    struct Branch {
        id: Option<i64>,
        leaf: Ref<Leaf>,
        saw_leaf: bool,
    }

    impl Class for Branch {
        fn describe(class: &mut ClassBuilder<Self>) {
            class.field("leaf", |b| &b.leaf, |b| &mut b.leaf).load();
            class.on_load(|b| {
                b.saw_leaf = b.leaf.is_loaded();
                Ok(())
            });
        }
    }

    impl Entity for Branch {
        const KIND: &'static str = "Branch";

        fn key_id(&self) -> KeyId {
            self.id.into()
        }

        fn set_key_id(&mut self, id: KeyId) {
            if let KeyId::Long(id) = id {
                self.id = Some(id);
            }
        }
    }

    /// References a leaf directly and again through a branch.
    #[derive(Clone, Debug, Default)]
    struct Trunk {
        id: Option<i64>,
        first: Ref<Leaf>,
        second: Ref<Branch>,
        saw_both: bool,
    }

    impl Class for Trunk {
        fn describe(class: &mut ClassBuilder<Self>) {
            class.field("first", |t| &t.first, |t| &mut t.first).load();
            class.field("second", |t| &t.second, |t| &mut t.second).load();
            class.on_load(|t| {
                t.saw_both = t.first.is_loaded() && t.second.get().is_some_and(|b| b.saw_leaf);
                Ok(())
            });
        }
    }

    impl Entity for Trunk {
        const KIND: &'static str = "Trunk";

        fn key_id(&self) -> KeyId {
            self.id.into()
        }

        fn set_key_id(&mut self, id: KeyId) {
            if let KeyId::Long(id) = id {
                self.id = Some(id);
            }
        }
    }

    #[tokio::test]
    async fn shared_eager_target_is_loaded_before_every_holder() {
        let (mut factory, _store) = setup(EntmapConfig::default());
        factory.register::<Leaf>().unwrap();
        factory.register::<Branch>().unwrap();
        factory.register::<Trunk>().unwrap();

        let mut unit = factory.begin();
        let mut leaf = Leaf {
            id: None,
            label: "shared".into(),
        };
        unit.save(&mut leaf).await.unwrap();
        let mut branch = Branch {
            id: None,
            leaf: Ref::of(&leaf).unwrap(),
            ..Default::default()
        };
        unit.save(&mut branch).await.unwrap();
        let mut trunk = Trunk {
            id: None,
            first: Ref::of(&leaf).unwrap(),
            second: Ref::of(&branch).unwrap(),
            ..Default::default()
        };
        let key = unit.save(&mut trunk).await.unwrap();

        let mut reader = factory.begin();
        let loaded = reader.load(&key).await.unwrap().unwrap();
        let loaded_branch = loaded.second.get().unwrap();
        assert!(loaded_branch.leaf.is_loaded());
        assert!(loaded_branch.saw_leaf);
        assert!(loaded.saw_both);
        assert!(Arc::ptr_eq(
            loaded.first.value().unwrap(),
            loaded_branch.leaf.value().unwrap()
        ));

        let cached = reader.load(branch.key().as_ref().unwrap()).await.unwrap().unwrap();
        assert!(cached.saw_leaf);
    }

    // -----------------------------------------------------------------------
    // Load callback shapes
    // -----------------------------------------------------------------------

    #[derive(Clone, Debug, Default)]
    struct Watched {
        id: Option<i64>,
        label: String,
        loaded: bool,
        unit_on_load: Option<uuid::Uuid>,
        context_on_load: Option<uuid::Uuid>,
    }

    impl Class for Watched {
        fn describe(class: &mut ClassBuilder<Self>) {
            class.field("label", |w| &w.label, |w| &mut w.label);
            class.on_load(|w| {
                w.loaded = true;
                Ok(())
            });
            class.on_load_with_unit(|w, unit| {
                w.unit_on_load = unit.as_any().downcast_ref::<UnitHandle>().map(UnitHandle::id);
                Ok(())
            });
            class.on_load_with_context(|w, ctx| {
                w.context_on_load = ctx.unit().as_any().downcast_ref::<UnitHandle>().map(UnitHandle::id);
                Ok(())
            });
        }
    }

    impl Entity for Watched {
        const KIND: &'static str = "Watched";

        fn key_id(&self) -> KeyId {
            self.id.into()
        }

        fn set_key_id(&mut self, id: KeyId) {
            if let KeyId::Long(id) = id {
                self.id = Some(id);
            }
        }
    }

    #[derive(Clone, Debug, Default)]
    struct WatchedChild {
        base: Watched,
        extra: String,
        child_loaded: bool,
    }

    impl Class for WatchedChild {
        fn describe(class: &mut ClassBuilder<Self>) {
            class.inherit::<Watched>(|c| &c.base, |c| &mut c.base);
            class.field("extra", |c| &c.extra, |c| &mut c.extra);
            class.on_load(|c| {
                c.child_loaded = true;
                Ok(())
            });
        }
    }

    impl Entity for WatchedChild {
        const KIND: &'static str = "WatchedChild";

        fn key_id(&self) -> KeyId {
            self.base.id.into()
        }

        fn set_key_id(&mut self, id: KeyId) {
            if let KeyId::Long(id) = id {
                self.base.id = Some(id);
            }
        }
    }

    #[tokio::test]
    async fn every_load_callback_shape_runs_with_the_loading_unit() {
        let (mut factory, _store) = setup(EntmapConfig::default());
        factory.register::<Watched>().unwrap();
        factory.register::<WatchedChild>().unwrap();

        let mut writer = factory.begin();
        let watched_key = writer
            .save(&mut Watched {
                label: "parent".into(),
                ..Default::default()
            })
            .await
            .unwrap();
        let child_key = writer
            .save(&mut WatchedChild {
                base: Watched {
                    label: "child".into(),
                    ..Default::default()
                },
                extra: "more".into(),
                ..Default::default()
            })
            .await
            .unwrap();

        let mut reader = factory.begin();
        let id = Some(reader.id());

        let watched = reader.load(&watched_key).await.unwrap().unwrap();
        assert!(watched.loaded);
        assert_eq!(watched.unit_on_load, id);
        assert_eq!(watched.context_on_load, id);

        let child = reader.load(&child_key).await.unwrap().unwrap();
        assert!(child.child_loaded);
        assert!(child.base.loaded);
        assert_eq!(child.base.unit_on_load, id);
        assert_eq!(child.base.context_on_load, id);
        assert_eq!(child.base.label, "child");
        assert_eq!(child.extra, "more");
        assert_ne!(id, Some(writer.id()));
    }

    // -----------------------------------------------------------------------
    // Errors
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn callback_error_reaches_caller_and_nothing_is_written() {
        let (factory, store) = setup(EntmapConfig::default());
        let mut unit = factory.begin();
        let err = unit
            .save(&mut Guarded {
                id: None,
                refuse: true,
            })
            .await
            .unwrap_err();
        assert!(err.callback_error::<Refused>().is_some());
        assert_eq!(err.to_string(), "guarded entity refused to save");
        assert!(store.is_empty());
        assert_eq!(store.put_calls(), 0);
    }

    #[tokio::test]
    async fn missing_manual_id_is_rejected() {
        let (factory, store) = setup(EntmapConfig::default());
        let mut unit = factory.begin();
        let author = Author {
            id: Some(1),
            name: "z".into(),
        };
        let err = unit.save(&mut book("", "untitled", &author)).await.unwrap_err();
        assert!(matches!(err, EntmapError::Translate(TranslateError::IncompleteKey { .. })));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn unregistered_type_is_rejected() {
        #[derive(Clone, Default)]
        struct Stray {
            id: Option<i64>,
        }
        impl Class for Stray {
            fn describe(_class: &mut ClassBuilder<Self>) {}
        }
        impl Entity for Stray {
            const KIND: &'static str = "Stray";
            fn key_id(&self) -> KeyId {
                self.id.into()
            }
            fn set_key_id(&mut self, _id: KeyId) {}
        }

        let (factory, _store) = setup(EntmapConfig::default());
        let mut unit = factory.begin();
        let err = unit.save(&mut Stray::default()).await.unwrap_err();
        assert!(matches!(err, EntmapError::Translate(TranslateError::Unregistered(_))));
        assert!(unit.defer_save(Stray { id: Some(1) }).is_err());
    }

    // -----------------------------------------------------------------------
    // Deferred operations
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn deferred_saves_coalesce_per_key() {
        let (factory, store) = setup(EntmapConfig::default());
        let mut unit = factory.begin();
        unit.defer_save(Author {
            id: Some(3),
            name: "draft".into(),
        })
        .unwrap();
        unit.defer_save(Author {
            id: Some(3),
            name: "final".into(),
        })
        .unwrap();
        unit.defer_save(Author {
            id: Some(4),
            name: "gone".into(),
        })
        .unwrap();
        unit.defer_delete(Author::key_for(4));
        assert_eq!(unit.pending(), 2);

        let summary = unit.flush().await.unwrap();
        assert_eq!(summary, FlushSummary { saved: 1, deleted: 1 });
        assert_eq!(store.put_calls(), 1);
        let record = store.peek(&RawKey::new("Author", 3)).unwrap();
        assert_eq!(
            record.properties.get("name").and_then(|n| n.as_leaf().ok()).map(|l| &l.value),
            Some(&Scalar::Text("final".into()))
        );
        assert!(!store.contains(&RawKey::new("Author", 4)));
        assert_eq!(unit.pending(), 0);
    }

    #[tokio::test]
    async fn deferred_entity_is_visible_in_session() {
        let (factory, store) = setup(EntmapConfig::default());
        let mut unit = factory.begin();
        let queued = unit
            .defer_save(Author {
                id: Some(5),
                name: "queued".into(),
            })
            .unwrap();
        let loaded = unit.load(&Author::key_for(5)).await.unwrap().unwrap();
        assert!(Arc::ptr_eq(&queued, &loaded));
        assert_eq!(store.get_calls(), 0);
    }

    #[tokio::test]
    async fn auto_id_saves_undefer_by_identity() {
        let (factory, store) = setup(EntmapConfig::default());
        let mut unit = factory.begin();
        let kept = unit
            .defer_save(Author {
                id: None,
                name: "kept".into(),
            })
            .unwrap();
        let dropped = unit
            .defer_save(Author {
                id: None,
                name: "dropped".into(),
            })
            .unwrap();
        assert!(unit.session().is_empty());

        unit.undefer(Arc::new(Author {
            id: None,
            name: "dropped".into(),
        }))
        .unwrap();
        assert_eq!(unit.pending(), 2);
        unit.undefer(dropped).unwrap();
        assert_eq!(unit.pending(), 1);

        unit.flush().await.unwrap();
        assert_eq!(store.len(), 1);
        let key = store.keys().remove(0);
        assert!(key.is_complete());
        assert!(kept.id.is_none());
    }

    #[tokio::test]
    async fn direct_operations_cancel_deferred_ones() {
        let (factory, store) = setup(EntmapConfig::default());
        let mut unit = factory.begin();
        unit.defer_delete(Author::key_for(1));
        let mut author = Author {
            id: Some(1),
            name: "direct".into(),
        };
        unit.save(&mut author).await.unwrap();
        assert_eq!(unit.pending(), 0);
        assert!(unit.flush().await.unwrap().is_empty());
        assert!(store.contains(&RawKey::new("Author", 1)));
    }

    #[tokio::test]
    async fn deferred_save_runs_callbacks_at_flush() {
        let (factory, store) = setup(EntmapConfig::default());
        let mut unit = factory.begin();
        let author = Author {
            id: Some(2),
            name: "a".into(),
        };
        unit.defer_save(author.clone()).unwrap();
        unit.defer_save(book("42", "later", &author)).unwrap();
        unit.defer_save_record(Record::new(RawKey::new("Loose", "r"), MapNode::new()))
            .unwrap();
        let id = unit.id();
        let summary = unit.finish().await.unwrap();
        assert_eq!(summary.saved, 3);

        let record = store.peek(&RawKey::new("Book", "42")).unwrap();
        assert_eq!(
            record.properties.get("savedBy").and_then(|n| n.as_leaf().ok()).map(|l| &l.value),
            Some(&Scalar::Text(id.to_string()))
        );
        assert!(store.contains(&RawKey::new("Loose", "r")));
    }

    #[tokio::test]
    async fn failed_flush_reports_store_error_and_empties_queue() {
        let (factory, store) = setup(EntmapConfig::default());
        let mut unit = factory.begin();
        unit.defer_save(Author {
            id: Some(1),
            name: "a".into(),
        })
        .unwrap();
        store.fail_puts(true);
        let err = unit.flush().await.unwrap_err();
        assert!(matches!(err, EntmapError::Store(StoreError::Unavailable(_))));
        assert_eq!(unit.pending(), 0);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn deferred_callback_error_surfaces_from_flush() {
        let (factory, store) = setup(EntmapConfig::default());
        let mut unit = factory.begin();
        unit.defer_save(Guarded {
            id: Some(1),
            refuse: true,
        })
        .unwrap();
        let err = unit.flush().await.unwrap_err();
        assert!(err.callback_error::<Refused>().is_some());
        assert_eq!(store.put_calls(), 0);
    }
}

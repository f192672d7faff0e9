//! Translation engine for entmap.
//!
//! Converts typed Rust objects to and from the schemaless [`EntityNode`]
//! tree. Each entity type is registered once; registration walks the
//! declared fields, validates their persistence rules, and asks an ordered
//! chain of [`TranslatorFactory`]s for a translator per field path. The
//! resulting translators are immutable and shared.
//!
//! # Quick Start
//!
//! ```rust
//! use entmap_translate::{Class, ClassBuilder, Entity, LoadContext, Registry, SaveContext};
//! use entmap_types::KeyId;
//!
//! #[derive(Clone, Default)]
//! struct Note {
//!     id: Option<i64>,
//!     text: String,
//! }
//!
//! impl Class for Note {
//!     fn describe(class: &mut ClassBuilder<Self>) {
//!         class.field("text", |n| &n.text, |n| &mut n.text).index();
//!     }
//! }
//!
//! impl Entity for Note {
//!     const KIND: &'static str = "Note";
//!     fn key_id(&self) -> KeyId { self.id.into() }
//!     fn set_key_id(&mut self, id: KeyId) {
//!         if let KeyId::Long(id) = id { self.id = Some(id) }
//!     }
//! }
//!
//! let mut registry = Registry::default();
//! registry.register::<Note>().unwrap();
//!
//! let mut note = Note { id: Some(1), text: "hello".into() };
//! let node = registry.save(&mut note, &SaveContext::detached()).unwrap();
//! let key = note.raw_key();
//! let back: Note = registry.load(&key, &node, &LoadContext::detached()).unwrap();
//! assert_eq!(back.text, "hello");
//! assert_eq!(back.id, Some(1));
//! ```
//!
//! [`EntityNode`]: entmap_types::EntityNode

pub mod class;
pub mod condition;
pub mod config;
pub mod context;
pub mod entity;
pub mod error;
pub mod factory;
pub mod lifecycle;
pub mod property;
pub mod reference;
pub mod registry;
pub mod shape;
pub mod translator;
pub mod value;

// Re-exports for convenience.
pub use class::{Class, ClassBuilder, ClassLayout, ClassTranslator};
pub use condition::{ConditionClass, ConditionTarget, Predicate, TypeMatch};
pub use config::TranslateConfig;
pub use context::{Detached, LoadContext, SaveContext, UnitOfWorkHandle};
pub use entity::{Entity, EntityCodec, EntityTranslator};
pub use error::{
    BoxError, CallbackResult, FieldError, RegistrationError, RegistrationResult, TranslateError, TranslateResult,
};
pub use factory::{scalar_factory, value_factory, CreateContext, TranslatorFactory, Translators, ValueFactory};
pub use lifecycle::{CallbackArgs, Lifecycle};
pub use property::{FieldPolicy, Property};
pub use reference::Ref;
pub use registry::Registry;
pub use shape::{FieldType, Shape, Translatable};
pub use translator::{ObjectCodec, Translator};
pub use value::{ScalarConverter, ScalarValue, TimeZoneConverter, ValueCodec, ValueConverter};

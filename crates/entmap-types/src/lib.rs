//! Foundation types for entmap.
//!
//! This crate provides the structural vocabulary shared by every other entmap
//! crate: the schemaless document shape that typed objects are translated
//! into, the paths used to locate fields inside that shape, and the logical
//! keys that identify stored records.
//!
//! # Key Types
//!
//! - [`Path`] — Immutable cons-list of segment names from the translation root
//! - [`EntityNode`] — Leaf / list / map node of the entity node tree
//! - [`Scalar`] — Opaque scalar value carried by a leaf
//! - [`RawKey`] — Untyped logical key (kind + id)
//! - [`Key`] — Typed wrapper over a [`RawKey`]
//! - [`Dynamic`] / [`Shared`] — Type-erased owned and shared values

pub mod error;
pub mod key;
pub mod node;
pub mod path;
pub mod value;

pub use error::TypeError;
pub use key::{Key, KeyId, RawKey};
pub use node::{EntityNode, Leaf, ListNode, MapNode, Scalar};
pub use path::Path;
pub use value::{Dynamic, Shared, TypeInfo};

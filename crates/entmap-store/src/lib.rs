//! Record storage for entmap.
//!
//! The engine never talks to a database directly. It hands translated
//! [`Record`]s to a [`Datastore`], which owns id allocation and persistence.
//!
//! # Storage Backends
//!
//! - [`InMemoryDatastore`] -- `HashMap`-based store for tests and embedding
//!
//! # Design Rules
//!
//! 1. `put` allocates ids for incomplete keys and returns every key in input order.
//! 2. `get` returns one slot per requested key, `None` for missing records.
//! 3. `delete` of a missing key is not an error.
//! 4. The store never interprets record properties.

pub mod error;
pub mod memory;
pub mod record;
pub mod traits;

pub use error::{StoreError, StoreResult};
pub use memory::InMemoryDatastore;
pub use record::Record;
pub use traits::Datastore;

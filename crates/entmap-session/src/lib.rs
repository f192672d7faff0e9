//! Session cache and write deferrer for entmap.
//!
//! A unit of work owns one [`Session`] and one [`Deferrer`]. The session
//! caches every object the unit of work has loaded, saved or deleted, keyed
//! by logical key. The deferrer coalesces pending writes so that each key is
//! written at most once per flush, with the last intent winning.
//!
//! # Modules
//!
//! - [`session`] — The [`Session`] cache
//! - [`deferred`] — Pending values and undefer targets
//! - [`traits`] — [`KeyDerivation`] and [`BatchWriter`] collaborators
//! - [`deferrer`] — The [`Deferrer`] itself
//! - [`error`] — [`FlushError`]

pub mod deferred;
pub mod deferrer;
pub mod error;
pub mod session;
pub mod traits;

pub use deferred::{Deferred, UndeferTarget};
pub use deferrer::{Deferrer, FlushSummary};
pub use error::FlushError;
pub use session::{Session, SessionEntry};
pub use traits::{BatchWriter, KeyDerivation};

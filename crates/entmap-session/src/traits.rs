use std::any::Any;

use async_trait::async_trait;
use entmap_types::RawKey;

use crate::deferred::Deferred;

/// Derives logical keys from in-memory objects.
pub trait KeyDerivation {
    type Error;

    /// The complete key of `value`. Fails when the id is unset.
    fn key_of(&self, value: &dyn Any) -> Result<RawKey, Self::Error>;

    /// Whether saving `value` needs the store to allocate its id.
    fn requires_autogenerated_id(&self, value: &dyn Any) -> bool;
}

/// Issues the two batches of a flush.
#[async_trait]
pub trait BatchWriter: Send + Sync {
    type Error: Send;

    async fn save_batch(&self, values: Vec<Deferred>) -> Result<(), Self::Error>;

    async fn delete_batch(&self, keys: Vec<RawKey>) -> Result<(), Self::Error>;
}

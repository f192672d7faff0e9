use async_trait::async_trait;
use entmap_types::RawKey;

use crate::error::StoreResult;
use crate::record::Record;

/// Record persistence used by a unit of work.
///
/// Implementations must be safe to share across tasks; a flush issues a
/// `put` and a `delete` at the same time.
#[async_trait]
pub trait Datastore: Send + Sync {
    /// Write records and return their keys in input order. Records with an
    /// incomplete key receive a freshly allocated numeric id.
    async fn put(&self, records: Vec<Record>) -> StoreResult<Vec<RawKey>>;

    /// Read records by key. The result has one slot per requested key.
    async fn get(&self, keys: &[RawKey]) -> StoreResult<Vec<Option<Record>>>;

    /// Remove records. Missing keys are ignored.
    async fn delete(&self, keys: &[RawKey]) -> StoreResult<()>;

    /// Read a single record.
    async fn get_one(&self, key: &RawKey) -> StoreResult<Option<Record>> {
        Ok(self
            .get(std::slice::from_ref(key))
            .await?
            .into_iter()
            .next()
            .flatten())
    }
}

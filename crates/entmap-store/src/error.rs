use entmap_types::RawKey;

/// Errors from datastore operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// A read or delete named a key without an id.
    #[error("key {0} has no id")]
    IncompleteKey(RawKey),

    /// The backend failed while serving the request.
    #[error("backend error: {0}")]
    Backend(String),

    /// The backend is not accepting requests.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// A flush failure, tagged with the batch that failed.
///
/// When both batches fail the save failure is the one reported.
#[derive(Debug, thiserror::Error)]
pub enum FlushError<E> {
    #[error("deferred save batch failed: {0}")]
    Save(#[source] E),

    #[error("deferred delete batch failed: {0}")]
    Delete(#[source] E),
}

impl<E> FlushError<E> {
    /// Name of the failed batch.
    pub fn batch(&self) -> &'static str {
        match self {
            Self::Save(_) => "save",
            Self::Delete(_) => "delete",
        }
    }

    pub fn into_inner(self) -> E {
        match self {
            Self::Save(e) | Self::Delete(e) => e,
        }
    }
}

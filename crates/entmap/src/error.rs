use entmap_session::FlushError;
use entmap_store::StoreError;
use entmap_translate::{RegistrationError, TranslateError};
use entmap_types::RawKey;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EntmapError {
    #[error("registration failed: {0}")]
    Registration(#[from] RegistrationError),

    /// Translation failures pass through unchanged so that callback errors
    /// keep their own message.
    #[error(transparent)]
    Translate(#[from] TranslateError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("no entity is registered for kind '{0}'")]
    UnknownKind(String),

    #[error("store returned no key for {0}")]
    MissingKey(RawKey),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl EntmapError {
    /// The lifecycle callback error behind this failure, if it is a `T`.
    pub fn callback_error<T: std::error::Error + 'static>(&self) -> Option<&T> {
        match self {
            Self::Translate(e) => e.callback_error::<T>(),
            _ => None,
        }
    }
}

impl From<FlushError<EntmapError>> for EntmapError {
    fn from(err: FlushError<EntmapError>) -> Self {
        err.into_inner()
    }
}

pub type EntmapResult<T> = Result<T, EntmapError>;

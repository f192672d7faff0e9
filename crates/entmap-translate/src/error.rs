use entmap_types::{Path, TypeError};

/// Error type returned by lifecycle callbacks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result of a lifecycle callback.
pub type CallbackResult = Result<(), BoxError>;

/// Errors raised while registering a type. These are always fatal and are
/// surfaced before any object is translated.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistrationError {
    #[error("alternate names for {field} must name at least one value")]
    EmptyAlternateNames { field: String },

    #[error("illegal alternate name '{name}' for {field}")]
    BlankAlternateName { field: String, name: String },

    #[error("cannot have both index and unindex conditions on {field}")]
    ConflictingIndexPolicy { field: String },

    #[error(
        "condition {condition} must have a no-arg constructor or a constructor that takes the enclosing type and field"
    )]
    MissingConditionConstructor { condition: String },

    #[error("cannot use condition {condition} on {field} because you cannot assign {actual} to {expected}")]
    ConditionValueMismatch {
        condition: String,
        field: String,
        actual: String,
        expected: String,
    },

    #[error(
        "cannot use condition {condition} on {field} because the containing class {actual} is not compatible with {expected}"
    )]
    ConditionEnclosingMismatch {
        condition: String,
        field: String,
        actual: String,
        expected: String,
    },

    #[error("no translator for type {type_name} at path {path}")]
    NoTranslator { type_name: String, path: Path },

    #[error("collections cannot be nested directly inside collections at path {path}")]
    NestedCollection { path: Path },

    #[error("class {type_name} embeds itself at path {path}")]
    RecursiveClass { type_name: String, path: Path },

    #[error("property '{name}' is declared more than once on {type_name}")]
    DuplicateProperty { type_name: String, name: String },

    #[error("kind '{kind}' is already registered to {existing}")]
    DuplicateKind { kind: String, existing: String },
}

/// Result alias for registration.
pub type RegistrationResult<T> = Result<T, RegistrationError>;

/// The reason a single field failed to translate.
#[derive(Debug, thiserror::Error)]
pub enum FieldError {
    #[error(transparent)]
    Node(#[from] TypeError),

    #[error("expected exactly {expected} elements, found {actual}")]
    SizeMismatch { expected: usize, actual: usize },

    #[error("cannot convert to {target}: {reason}")]
    Conversion { target: &'static str, reason: String },

    #[error("field access failed: expected a value of type {expected}")]
    Access { expected: &'static str },

    #[error("no property accepts the name '{0}'")]
    UnknownProperty(String),
}

impl FieldError {
    /// A scalar of the wrong variant was found.
    pub fn unexpected_scalar(expected: &'static str, found: &entmap_types::Scalar) -> Self {
        Self::Node(TypeError::UnexpectedScalar {
            expected,
            found: found.type_name(),
        })
    }

    pub fn access<T: ?Sized>() -> Self {
        Self::Access {
            expected: std::any::type_name::<T>(),
        }
    }
}

/// Errors raised while saving or loading an object.
#[derive(Debug, thiserror::Error)]
pub enum TranslateError {
    /// A field failed; `path` locates it from the translation root.
    #[error("error translating {path}: {source}")]
    Field { path: Path, source: FieldError },

    /// A lifecycle callback failed. The callback's own error is carried
    /// as-is so callers can downcast to it.
    #[error(transparent)]
    Callback(BoxError),

    #[error("cannot derive a key for {kind}: id is not set")]
    IncompleteKey { kind: String },

    #[error("type {0} is not registered")]
    Unregistered(String),
}

impl TranslateError {
    pub fn field(path: &Path, source: impl Into<FieldError>) -> Self {
        Self::Field {
            path: path.clone(),
            source: source.into(),
        }
    }

    /// Path of the failing field, if this is a field error.
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::Field { path, .. } => Some(path),
            _ => None,
        }
    }

    /// The callback error, if it is of type `T`.
    pub fn callback_error<T: std::error::Error + 'static>(&self) -> Option<&T> {
        match self {
            Self::Callback(err) => err.downcast_ref::<T>(),
            _ => None,
        }
    }

    /// Unwrap the callback error, or give back `self`.
    pub fn into_callback_error(self) -> Result<BoxError, Self> {
        match self {
            Self::Callback(err) => Ok(err),
            other => Err(other),
        }
    }
}

/// Result alias for translation.
pub type TranslateResult<T> = Result<T, TranslateError>;

use std::sync::Arc;

use thiserror::Error;

/// Result type used by fallible operations of this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by registration, synchronization and lifecycle operations.
///
/// Evaluation itself never returns an error: storage faults encountered while evaluating are
/// logged and degrade to defaults.
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum Error {
    /// The underlying persistent key-value store could not be reached.
    #[error("persistent store unavailable")]
    StorageUnavailable(#[source] Arc<dyn std::error::Error + Send + Sync>),

    /// A flag or experiment definition was rejected at registration time.
    #[error(transparent)]
    MalformedDefinition(#[from] DefinitionError),

    /// A value could not be serialized for the store.
    #[error("serialization error")]
    Serialization(#[source] Arc<serde_json::Error>),

    // std::io::Error is not clonable, so we're wrapping it in an Arc.
    #[error(transparent)]
    Io(Arc<std::io::Error>),

    /// The persistence thread has exited and no longer accepts writes.
    #[error("persistence thread is not running")]
    PersistenceUnavailable,

    /// The persistence thread panicked. This should normally never happen.
    #[error("persistence thread panicked")]
    PersistenceThreadPanicked,
}

impl Error {
    /// Wrap an arbitrary store failure into [`Error::StorageUnavailable`].
    ///
    /// Intended for [`KeyValueStore`](crate::KeyValueStore) implementors.
    pub fn storage(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Error {
        Error::StorageUnavailable(Arc::from(err.into()))
    }
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::Io(Arc::new(value))
    }
}

impl From<serde_json::Error> for Error {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization(Arc::new(value))
    }
}

/// Registration-time faults in a flag or experiment definition.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum DefinitionError {
    #[error("definition key must not be empty")]
    EmptyKey,

    #[error("flag {key:?}: rollout percentage {percentage} is outside of [0, 100]")]
    RolloutOutOfRange { key: String, percentage: u32 },

    #[error("experiment {key:?} has no variants")]
    NoVariants { key: String },

    #[error("experiment {key:?}: variant {variant:?} percentage {percentage} is outside of [0, 100]")]
    VariantPercentageOutOfRange {
        key: String,
        variant: String,
        percentage: u32,
    },

    #[error("experiment {key:?}: variant {variant:?} is declared more than once")]
    DuplicateVariant { key: String, variant: String },

    /// Stored assignments only keep the value, so values must tell variants apart.
    #[error("experiment {key:?}: variant {variant:?} has the same value as another variant")]
    DuplicateVariantValue { key: String, variant: String },

    #[error("experiment {key:?}: default variant {variant:?} is not one of its variants")]
    UnknownDefaultVariant { key: String, variant: String },

    /// Definitions document could not be parsed.
    #[error("unable to parse definitions: {0}")]
    Parse(String),
}

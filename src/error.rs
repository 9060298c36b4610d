use crate::services::store::StoreError;
use thiserror::Error;

/// Errors surfaced by the persistence engine's public methods.
///
/// Automatic saves never return these to a caller; they are folded into
/// `saveError` / `loadError` on the persistence state instead. Manual and
/// forced saves return them in addition to updating state.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PersistenceError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Save validation failed: {0}")]
    Validation(String),

    #[error("Failed to serialize draft: {0}")]
    Serialization(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Conflict {0} not found")]
    ConflictNotFound(String),

    #[error("Save was abandoned before it completed")]
    Cancelled,

    #[error("Persistence engine has been disposed")]
    Disposed,

    #[error("No tokio runtime available to schedule saves")]
    NoRuntime,
}

impl PersistenceError {
    /// Whether repeating the same operation later could succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Store(e) => e.is_transient(),
            _ => false,
        }
    }
}

impl From<serde_json::Error> for PersistenceError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

//! Error types for planstore core.

use crate::registry::ModelKind;
use thiserror::Error;

/// Result type for persistence operations.
pub type PersistenceResult<T> = Result<T, PersistenceError>;

/// The kind of write rejected by the save gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOperation {
    /// A value save.
    Save,
    /// A key removal.
    Remove,
    /// A full store wipe.
    Clear,
}

impl std::fmt::Display for WriteOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Save => f.write_str("saving"),
            Self::Remove => f.write_str("removing"),
            Self::Clear => f.write_str("clearing"),
        }
    }
}

/// Errors that can occur in planstore core operations.
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// Key-value store error, propagated untouched.
    #[error("store error: {0}")]
    Store(#[from] planstore_storage::StoreError),

    /// Compression codec error.
    #[error("codec error: {0}")]
    Codec(#[from] planstore_codec::CodecError),

    /// A value could not be serialized or deserialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The project collection cannot be loaded or yields no project ids.
    #[error("project index is broken: {message}")]
    BrokenIndex {
        /// Description of the breakage.
        message: String,
    },

    /// A write was attempted while an import holds the save gate.
    #[error("data import in progress: {operation} {key:?} disabled")]
    WriteBlocked {
        /// The logical key of the rejected write.
        key: String,
        /// What kind of write was rejected.
        operation: WriteOperation,
    },

    /// An import was started while another one holds the save gate.
    #[error("data import already in progress")]
    ImportInProgress,

    /// A reducer rejected an action.
    #[error("reducer for {key:?} failed: {message}")]
    Reducer {
        /// The model whose reducer failed.
        key: String,
        /// Reducer message.
        message: String,
    },

    /// A migration step failed.
    #[error("migration of {key:?} failed: {message}")]
    Migration {
        /// The model being migrated.
        key: String,
        /// Migration message.
        message: String,
    },

    /// No model is registered under the key.
    #[error("no model registered for {key:?}")]
    UnknownModel {
        /// The requested logical key.
        key: String,
    },

    /// A model was requested as the wrong kind.
    #[error("model {key:?} is {actual:?}, expected {expected:?}")]
    WrongModelKind {
        /// The requested logical key.
        key: String,
        /// The kind the caller asked for.
        expected: ModelKind,
        /// The registered kind.
        actual: ModelKind,
    },

    /// Two models were registered under the same key.
    #[error("model {key:?} registered twice")]
    DuplicateModel {
        /// The duplicated logical key.
        key: String,
    },

    /// A fan-out task panicked or was cancelled.
    #[error("background task failed: {message}")]
    Task {
        /// Join error description.
        message: String,
    },
}

impl PersistenceError {
    /// Creates a broken index error.
    pub fn broken_index(message: impl Into<String>) -> Self {
        Self::BrokenIndex {
            message: message.into(),
        }
    }

    /// Creates a write blocked error.
    pub fn write_blocked(key: impl Into<String>, operation: WriteOperation) -> Self {
        Self::WriteBlocked {
            key: key.into(),
            operation,
        }
    }

    /// Creates a reducer error.
    pub fn reducer(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Reducer {
            key: key.into(),
            message: message.into(),
        }
    }

    /// Creates a migration error.
    pub fn migration(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Migration {
            key: key.into(),
            message: message.into(),
        }
    }

    /// Creates an unknown model error.
    pub fn unknown_model(key: impl Into<String>) -> Self {
        Self::UnknownModel { key: key.into() }
    }

    /// Returns true if retrying the same operation later can succeed.
    ///
    /// Only operations rejected by an import in progress qualify; everything
    /// else needs intervention or different input.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::WriteBlocked { .. } | Self::ImportInProgress)
    }
}

impl From<tokio::task::JoinError> for PersistenceError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Task {
            message: err.to_string(),
        }
    }
}

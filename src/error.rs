//! Error types for axiomsync.
//!
//! All errors are strongly typed using thiserror. Store-level failures live in
//! [`crate::storage::StorageError`]; this module layers the protocol and
//! validation errors on top and gathers them under [`AxiomError`].
//!
//! Note that reconciliation calls (`read_axioms` / `write_axioms`) never
//! return these errors: they fold them into `Failed` mapping intents. The
//! error types surface from local operations such as name resolution and
//! configuration loading, and are carried as text inside failed intents.

use thiserror::Error;

use crate::entity::{EntityKind, EntityRef};
use crate::fact::{AxiomValue, FactKind, ValueShape};
use crate::ground::ContextId;
use crate::storage::StorageError;

/// Validation errors that occur while checking caller input.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Entity name cannot be empty")]
    EmptyEntityName,

    #[error("Invalid entity name '{name}': {reason}")]
    InvalidEntityName {
        name: String,
        reason: String,
    },

    #[error("Fact kind '{kind}' does not apply to {subject} entities")]
    FactKindNotApplicable {
        kind: FactKind,
        subject: EntityKind,
    },

    #[error("Fact kind '{kind}' holds {expected} values, not {actual}")]
    ValueShapeMismatch {
        kind: FactKind,
        expected: ValueShape,
        actual: ValueShape,
    },

    #[error("Descriptor already has a '{kind}' capability")]
    DuplicateCapability {
        kind: FactKind,
    },

    #[error("Capability grounded on {actual} cannot join descriptor of {expected}")]
    GroundMismatch {
        expected: String,
        actual: String,
    },

    #[error("Invalid configuration: {reason}")]
    InvalidConfig {
        reason: String,
    },
}

/// Failures of the reconciliation protocol itself.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Querying '{kind}' facts of {subject} failed: {source}")]
    StoreQueryFailure {
        kind: FactKind,
        subject: EntityRef,
        source: StorageError,
    },

    #[error("Applying '{kind}' change {value} to {subject} failed: {source}")]
    StoreMutationFailure {
        kind: FactKind,
        subject: EntityRef,
        value: AxiomValue,
        source: StorageError,
    },

    #[error("Singleton '{kind}' of {subject} has {candidates} candidates and no tie-break policy")]
    CardinalityViolation {
        kind: FactKind,
        subject: EntityRef,
        candidates: usize,
    },

    #[error("Session lock of store context {context} is poisoned")]
    SessionPoisoned {
        context: ContextId,
    },
}

/// Top-level error type for axiomsync.
#[derive(Debug, Error)]
pub enum AxiomError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Synchronisation error: {0}")]
    Sync(#[from] SyncError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Internal error: {message}")]
    Internal {
        message: String,
    },
}

impl AxiomError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true if this is a validation error.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns true if this is a synchronisation error.
    #[must_use]
    pub const fn is_sync(&self) -> bool {
        matches!(self, Self::Sync(_))
    }

    /// Returns true if this is a storage error.
    #[must_use]
    pub const fn is_storage(&self) -> bool {
        matches!(self, Self::Storage(_))
    }

    /// Returns true if this error is retryable.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Validation(_) | Self::Internal { .. } => false,
            Self::Sync(e) => match e {
                SyncError::StoreQueryFailure { source, .. }
                | SyncError::StoreMutationFailure { source, .. } => source.is_transient(),
                SyncError::CardinalityViolation { .. } | SyncError::SessionPoisoned { .. } => false,
            },
            Self::Storage(e) => e.is_transient(),
        }
    }
}

/// Result type alias for axiomsync operations.
pub type AxiomResult<T> = Result<T, AxiomError>;

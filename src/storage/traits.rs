//! Abstract fact store contract.
//!
//! The fact store is opaque: axiomsync only ever asks it for the current
//! truth of one fact kind and asks it to add or remove one primitive fact.
//! By keeping the contract this narrow we can plug in:
//! - the in-memory backend for tests and embedded use
//! - adapters over real ontology or triple stores

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::entity::{EntityKind, EntityRef};
use crate::fact::{AxiomValue, Characteristic, FactKind, RestrictionKind, ValueShape};

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The entity is not known to the store.
    #[error("Unknown entity: {0}")]
    UnknownEntity(EntityRef),

    /// The name cannot identify an entity.
    #[error("Invalid entity name: {0}")]
    InvalidName(String),

    /// The value has the wrong shape for the fact kind.
    #[error("Fact kind '{kind}' cannot hold {actual} values")]
    ShapeMismatch {
        /// Fact kind addressed.
        kind: FactKind,
        /// Shape that was supplied.
        actual: ValueShape,
    },

    /// The fact kind does not apply to the subject.
    #[error("Fact kind '{kind}' does not apply to {subject} entities")]
    NotApplicable {
        /// Fact kind addressed.
        kind: FactKind,
        /// Kind of the subject.
        subject: EntityKind,
    },

    /// The store does not implement the operation.
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    /// Backend error.
    #[error("Storage backend error: {0}")]
    BackendError(String),

    /// Connection failed.
    #[error("Connection error: {0}")]
    ConnectionError(String),
}

impl StorageError {
    /// Returns true if retrying the same call may succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::ConnectionError(_))
    }
}

/// Direction of a primitive store mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeOp {
    /// The fact was asserted.
    Add,
    /// The fact was retracted.
    Remove,
}

impl ChangeOp {
    /// The operation that undoes this one.
    #[must_use]
    pub const fn inverse(self) -> Self {
        match self {
            Self::Add => Self::Remove,
            Self::Remove => Self::Add,
        }
    }
}

impl fmt::Display for ChangeOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Add => write!(f, "add"),
            Self::Remove => write!(f, "remove"),
        }
    }
}

/// What a store reports back for one primitive mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRecord {
    /// Add or remove.
    pub op: ChangeOp,
    /// Entity the fact is about.
    pub subject: EntityRef,
    /// Fact kind changed.
    pub fact_kind: FactKind,
    /// Related value.
    pub value: AxiomValue,
    /// False when the store already held the requested state.
    pub applied: bool,
    /// Stable BLAKE3 digest (hex) of `(op, subject, fact_kind, value)`.
    pub fingerprint: String,
}

impl ChangeRecord {
    /// Builds a record and computes its fingerprint.
    #[must_use]
    pub fn new(
        op: ChangeOp,
        subject: EntityRef,
        fact_kind: FactKind,
        value: AxiomValue,
        applied: bool,
    ) -> Self {
        let fingerprint = fingerprint(op, &subject, fact_kind, &value);
        Self {
            op,
            subject,
            fact_kind,
            value,
            applied,
            fingerprint,
        }
    }
}

fn feed_str(hasher: &mut blake3::Hasher, s: &str) {
    hasher.update(&(s.len() as u64).to_le_bytes());
    hasher.update(s.as_bytes());
}

fn feed_entity(hasher: &mut blake3::Hasher, e: &EntityRef) {
    feed_str(hasher, &e.kind.to_string());
    feed_str(hasher, &e.name);
}

/// Stable digest of one primitive fact change.
///
/// The encoding is length-prefixed so that no two distinct changes share a
/// byte stream.
#[must_use]
pub fn fingerprint(op: ChangeOp, subject: &EntityRef, kind: FactKind, value: &AxiomValue) -> String {
    let mut hasher = blake3::Hasher::new();
    feed_str(&mut hasher, &op.to_string());
    feed_entity(&mut hasher, subject);
    feed_str(&mut hasher, &kind.to_string());
    match value {
        AxiomValue::Entity(e) => {
            feed_str(&mut hasher, "entity");
            feed_entity(&mut hasher, e);
        }
        AxiomValue::Restriction(r) => {
            feed_str(&mut hasher, "restriction");
            let (tag, n) = match r.kind {
                RestrictionKind::Class => ("class", 0),
                RestrictionKind::Some => ("some", 0),
                RestrictionKind::Only => ("only", 0),
                RestrictionKind::Min(n) => ("min", n),
                RestrictionKind::Max(n) => ("max", n),
                RestrictionKind::Exact(n) => ("exact", n),
            };
            feed_str(&mut hasher, tag);
            hasher.update(&n.to_le_bytes());
            match &r.property {
                Some(p) => feed_entity(&mut hasher, p),
                None => feed_str(&mut hasher, ""),
            }
            feed_entity(&mut hasher, &r.filler);
        }
    }
    hasher.finalize().to_hex().to_string()
}

/// Storage trait for fact operations.
///
/// # Safety Considerations
/// - Implementations must be safe to share across threads; mutations go
///   through `&self` and rely on interior mutability
/// - A single `apply_*` call is one primitive change; callers compose
///   several calls for facts that must be recorded on both sides
pub trait FactStore: Send + Sync {
    /// The store's current values for one fact kind of `subject`.
    fn query_related(
        &self,
        subject: &EntityRef,
        kind: FactKind,
    ) -> Result<BTreeSet<AxiomValue>, StorageError>;

    /// Assert `subject -[kind]-> value`.
    fn apply_add(
        &self,
        subject: &EntityRef,
        kind: FactKind,
        value: &AxiomValue,
    ) -> Result<ChangeRecord, StorageError>;

    /// Retract `subject -[kind]-> value`.
    fn apply_remove(
        &self,
        subject: &EntityRef,
        kind: FactKind,
        value: &AxiomValue,
    ) -> Result<ChangeRecord, StorageError>;

    /// Resolve a human-readable name to an entity of the given kind.
    fn resolve(&self, name: &str, kind: EntityKind) -> Result<EntityRef, StorageError>;

    /// Set or clear a property characteristic.
    fn set_characteristic(
        &self,
        property: &EntityRef,
        characteristic: Characteristic,
        enabled: bool,
    ) -> Result<bool, StorageError> {
        let _ = (property, enabled);
        Err(StorageError::Unsupported(format!(
            "set_characteristic({characteristic})"
        )))
    }

    /// The characteristics a property currently carries.
    fn characteristics(
        &self,
        property: &EntityRef,
    ) -> Result<BTreeSet<Characteristic>, StorageError> {
        let _ = property;
        Err(StorageError::Unsupported("characteristics".to_string()))
    }
}

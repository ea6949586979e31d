//! Grounds: binding an entity to a store context.
//!
//! A [`StoreContext`] is the explicitly passed handle to one fact store. It
//! is cheap to clone and may be shared by many unrelated descriptors. Every
//! query-diff-apply sequence runs under the context's session lock, so two
//! capabilities never interleave partial diffs against the same store.
//!
//! A [`Ground`] pairs one entity with one context. It is immutable, and it is
//! the sole identity of a descriptor.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entity::{EntityKind, EntityRef};
use crate::error::{AxiomResult, SyncError};
use crate::storage::FactStore;

/// Unique identifier of a store context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContextId(Uuid);

impl ContextId {
    /// Creates a new random context ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ContextId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Shared handle to one fact store.
///
/// Equality and hashing use the context ID only. Cloning shares the store
/// and the session lock.
///
/// Poisoning is terminal: if a store call panics while the session is held,
/// the store may hold a half-applied change, so every later session request
/// on this context (and its clones) fails with
/// [`SyncError::SessionPoisoned`]. Build a new context over the store once
/// it has been checked.
#[derive(Clone)]
pub struct StoreContext {
    id: ContextId,
    label: Arc<str>,
    store: Arc<dyn FactStore>,
    session: Arc<Mutex<()>>,
}

impl StoreContext {
    /// Wraps a store in a new context.
    pub fn new(label: impl Into<String>, store: Arc<dyn FactStore>) -> Self {
        Self {
            id: ContextId::new(),
            label: Arc::from(label.into()),
            store,
            session: Arc::new(Mutex::new(())),
        }
    }

    /// The context ID.
    #[must_use]
    pub const fn id(&self) -> ContextId {
        self.id
    }

    /// Human-readable label, used in logs.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// The underlying store.
    #[must_use]
    pub fn store(&self) -> &dyn FactStore {
        self.store.as_ref()
    }

    /// Acquire the session lock for one query-diff-apply sequence.
    ///
    /// The lock is not re-entrant; never hold it across a call that may
    /// reconcile another descriptor on the same context.
    pub fn session(&self) -> Result<MutexGuard<'_, ()>, SyncError> {
        self.session.lock().map_err(|_| {
            tracing::warn!(context = %self.id, label = %self.label, "store session is poisoned");
            SyncError::SessionPoisoned { context: self.id }
        })
    }

    /// True once a store call has panicked under the session lock.
    #[must_use]
    pub fn is_poisoned(&self) -> bool {
        self.session.is_poisoned()
    }

    /// Resolve a name to an entity through the store.
    pub fn resolve(&self, name: &str, kind: EntityKind) -> AxiomResult<EntityRef> {
        Ok(self.store.resolve(name, kind)?)
    }

    /// Ground `entity` on this context.
    #[must_use]
    pub fn ground(&self, entity: EntityRef) -> Ground {
        Ground::new(entity, self.clone())
    }
}

impl fmt::Debug for StoreContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreContext")
            .field("id", &self.id)
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

impl PartialEq for StoreContext {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for StoreContext {}

impl Hash for StoreContext {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// Arena key of a ground: `(entity, context id)`.
pub type GroundKey = (EntityRef, ContextId);

/// Identity binding of one entity to one store context.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Ground {
    entity: EntityRef,
    context: StoreContext,
}

impl Ground {
    /// Creates a ground.
    #[must_use]
    pub const fn new(entity: EntityRef, context: StoreContext) -> Self {
        Self { entity, context }
    }

    /// The grounded entity.
    #[must_use]
    pub const fn entity(&self) -> &EntityRef {
        &self.entity
    }

    /// The store context.
    #[must_use]
    pub const fn context(&self) -> &StoreContext {
        &self.context
    }

    /// A new ground for `entity` on the same context.
    #[must_use]
    pub fn regrounded(&self, entity: EntityRef) -> Self {
        Self::new(entity, self.context.clone())
    }

    /// The arena key of this ground.
    #[must_use]
    pub fn key(&self) -> GroundKey {
        (self.entity.clone(), self.context.id())
    }
}

impl fmt::Display for Ground {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.entity, self.context.label())
    }
}

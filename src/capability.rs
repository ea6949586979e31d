//! Capabilities: one fact kind, reconciled against the store.
//!
//! A [`Capability`] owns the local [`EntitySet`] of one fact kind for one
//! ground and implements the read/write lifecycle:
//!
//! 1. take the context's session lock
//! 2. query the store for the current values
//! 3. diff (local as baseline for read, store snapshot as baseline for write)
//! 4. apply the delta to the local set (read) or to the store (write)
//! 5. report one [`MappingIntent`] per value
//!
//! Store failures never escape a capability. They come back as `Failed`
//! intents, and a failed read leaves the local set untouched.
//!
//! Capabilities compose through two small traits: [`Reconcile`] is what a
//! composite descriptor drives, [`Descriptor`] is what callers drive.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::SyncConfig;
use crate::entity::{EntityKind, EntityRef};
use crate::entity_set::EntitySet;
use crate::error::{AxiomError, AxiomResult, SyncError, ValidationError};
use crate::fact::{AxiomValue, FactKind, FactValue, Restriction};
use crate::ground::Ground;
use crate::intent::{MappingIntent, SyncDirection, SynchronisationIntent};
use crate::storage::{ChangeOp, ChangeRecord, FactStore, StorageError};

/// Anything bound to a ground that can be synchronised with its store.
pub trait Descriptor {
    /// The identity of this descriptor.
    fn ground(&self) -> &Ground;

    /// Update local state from the store.
    fn read_axioms(&mut self) -> Vec<MappingIntent>;

    /// Update the store from local state.
    fn write_axioms(&mut self) -> Vec<MappingIntent>;

    /// Write, then read back.
    fn write_read_axioms(&mut self) -> Vec<MappingIntent> {
        let mut intents = self.write_axioms();
        intents.extend(self.read_axioms());
        intents
    }
}

/// A single fact-kind reconciliation unit, as driven by a composite.
pub trait Reconcile: fmt::Debug + Send {
    /// The fact kind this unit reconciles.
    fn fact_kind(&self) -> FactKind;

    /// The ground this unit is bound to.
    fn ground(&self) -> &Ground;

    /// Read direction; see [`Descriptor::read_axioms`].
    fn read_axioms(&mut self) -> Vec<MappingIntent>;

    /// Write direction; see [`Descriptor::write_axioms`].
    fn write_axioms(&mut self) -> Vec<MappingIntent>;

    /// Sets the singleton flag of the local set.
    fn set_singleton(&mut self, singleton: bool);

    /// Renders the local set.
    fn local_summary(&self) -> String;

    /// Upcast for typed access.
    fn as_any(&self) -> &dyn Any;

    /// Upcast for typed mutable access.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

fn apply_op(
    store: &dyn FactStore,
    op: ChangeOp,
    subject: &EntityRef,
    kind: FactKind,
    value: &AxiomValue,
) -> Result<ChangeRecord, StorageError> {
    match op {
        ChangeOp::Add => store.apply_add(subject, kind, value),
        ChangeOp::Remove => store.apply_remove(subject, kind, value),
    }
}

/// Reconciliation unit for one fact kind of one ground.
#[derive(Debug)]
pub struct Capability<T: FactValue> {
    kind: FactKind,
    ground: Arc<Ground>,
    config: Arc<SyncConfig>,
    local: EntitySet<T>,
}

impl<T: FactValue> Capability<T> {
    /// Creates a capability with an empty local set.
    ///
    /// Fails if `kind` does not hold values of type `T`, or does not apply
    /// to the ground's entity kind.
    pub fn new(
        kind: FactKind,
        ground: Arc<Ground>,
        config: Arc<SyncConfig>,
    ) -> Result<Self, ValidationError> {
        if kind.shape() != T::SHAPE {
            return Err(ValidationError::ValueShapeMismatch {
                kind,
                expected: kind.shape(),
                actual: T::SHAPE,
            });
        }
        let subject = ground.entity().kind;
        if !kind.applies_to(subject) {
            return Err(ValidationError::FactKindNotApplicable { kind, subject });
        }
        Ok(Self {
            kind,
            ground,
            config,
            local: EntitySet::new(),
        })
    }

    /// Creates a capability with the default configuration.
    pub fn with_defaults(kind: FactKind, ground: Ground) -> Result<Self, ValidationError> {
        Self::new(kind, Arc::new(ground), Arc::new(SyncConfig::default()))
    }

    /// Switches the local set to singleton mode.
    #[must_use]
    pub fn into_singleton(mut self) -> Self {
        self.local.set_singleton(true);
        self
    }

    /// The ground.
    #[must_use]
    pub fn ground(&self) -> &Ground {
        &self.ground
    }

    /// The fact kind.
    #[must_use]
    pub const fn kind(&self) -> FactKind {
        self.kind
    }

    /// The local set.
    #[must_use]
    pub const fn get(&self) -> &EntitySet<T> {
        &self.local
    }

    /// The local set, for local edits. Nothing reaches the store until the
    /// next write.
    pub fn get_mut(&mut self) -> &mut EntitySet<T> {
        &mut self.local
    }

    /// Adds a value locally.
    pub fn add(&mut self, value: T) -> bool {
        self.local.add(value)
    }

    /// Removes a value locally.
    pub fn remove(&mut self, value: &T) -> bool {
        self.local.remove(value)
    }

    /// A fresh snapshot of the store's values, taken under the session lock.
    ///
    /// The snapshot carries the local singleton flag.
    pub fn query(&self) -> Result<EntitySet<T>, SyncError> {
        let _session = self.ground.context().session()?;
        self.fetch()
    }

    /// Compute (without applying) the changes a read would make locally.
    pub fn synchronise_from_store(&self) -> Result<SynchronisationIntent<T>, SyncError> {
        let _session = self.ground.context().session()?;
        let snapshot = self.fetch()?;
        self.local
            .diff_with_policy(&snapshot, self.config.singleton_policy)
            .map_err(|e| self.cardinality(e.candidates))
    }

    /// Compute (without applying) the changes a write would make in the store.
    pub fn synchronise_to_store(&self) -> Result<SynchronisationIntent<T>, SyncError> {
        let _session = self.ground.context().session()?;
        let snapshot = self.fetch()?;
        snapshot
            .diff_with_policy(&self.comparable_local(), self.config.singleton_policy)
            .map_err(|e| self.cardinality(e.candidates))
    }

    fn subject(&self) -> &EntityRef {
        self.ground.entity()
    }

    fn is_subject(&self, value: &AxiomValue) -> bool {
        self.kind.excludes_subject() && value.as_entity() == Some(self.subject())
    }

    fn cardinality(&self, candidates: usize) -> SyncError {
        SyncError::CardinalityViolation {
            kind: self.kind,
            subject: self.subject().clone(),
            candidates,
        }
    }

    /// Query without locking; callers hold the session.
    fn fetch(&self) -> Result<EntitySet<T>, SyncError> {
        let subject = self.subject();
        let query_failure = |source: StorageError| SyncError::StoreQueryFailure {
            kind: self.kind,
            subject: subject.clone(),
            source,
        };

        let raw = self
            .ground
            .context()
            .store()
            .query_related(subject, self.kind)
            .map_err(&query_failure)?;

        let mut snapshot = EntitySet::new();
        snapshot.set_singleton(self.local.is_singleton());
        for value in raw {
            if self.is_subject(&value) {
                continue;
            }
            let actual = value.shape();
            let typed = T::from_axiom(value).ok_or_else(|| {
                query_failure(StorageError::ShapeMismatch {
                    kind: self.kind,
                    actual,
                })
            })?;
            snapshot.add(typed);
        }
        Ok(snapshot)
    }

    /// The local set minus values the store never reports.
    fn comparable_local(&self) -> EntitySet<T> {
        let mut local = self.local.clone();
        if self.kind.excludes_subject() {
            let subject = self.subject();
            let own: Vec<T> = local
                .iter()
                .filter(|v| v.to_axiom().as_entity() == Some(subject))
                .cloned()
                .collect();
            for v in &own {
                local.remove(v);
            }
        }
        local
    }

    fn failed(
        &self,
        direction: SyncDirection,
        value: Option<AxiomValue>,
        error: &SyncError,
    ) -> MappingIntent {
        warn!(
            subject = %self.subject(),
            kind = %self.kind,
            context = self.ground.context().label(),
            %direction,
            error = %error,
            "axiom synchronisation failed"
        );
        MappingIntent::failed(direction, self.kind, self.subject(), value, error)
    }

    fn unchanged_intents(
        &self,
        direction: SyncDirection,
        intent: &SynchronisationIntent<T>,
    ) -> Vec<MappingIntent> {
        if !self.config.report_unchanged {
            return Vec::new();
        }
        intent
            .unchanged()
            .iter()
            .map(|v| MappingIntent::unchanged(direction, self.kind, self.subject(), v.to_axiom()))
            .collect()
    }

    /// Update the local set from the store.
    ///
    /// On any failure the local set is left untouched and a single `Failed`
    /// intent is returned.
    pub fn read_axioms(&mut self) -> Vec<MappingIntent> {
        let direction = SyncDirection::Read;
        let ground = Arc::clone(&self.ground);
        let _session = match ground.context().session() {
            Ok(guard) => guard,
            Err(e) => return vec![self.failed(direction, None, &e)],
        };

        let snapshot = match self.fetch() {
            Ok(snapshot) => snapshot,
            Err(e) => return vec![self.failed(direction, None, &e)],
        };
        let intent = match self
            .local
            .diff_with_policy(&snapshot, self.config.singleton_policy)
        {
            Ok(intent) => intent,
            Err(e) => {
                let err = self.cardinality(e.candidates);
                return vec![self.failed(direction, None, &err)];
            }
        };

        self.local.apply(&intent);

        let subject = ground.entity();
        let mut intents: Vec<MappingIntent> = intent
            .to_add()
            .iter()
            .map(|v| MappingIntent::added(direction, self.kind, subject, v.to_axiom()))
            .collect();
        intents.extend(
            intent
                .to_remove()
                .iter()
                .map(|v| MappingIntent::removed(direction, self.kind, subject, v.to_axiom())),
        );
        intents.extend(self.unchanged_intents(direction, &intent));

        debug!(
            subject = %subject,
            kind = %self.kind,
            added = intent.to_add().len(),
            removed = intent.to_remove().len(),
            "read axioms"
        );
        intents
    }

    /// Update the store from the local set.
    ///
    /// Each value is pushed independently; a failing value yields a `Failed`
    /// intent and does not stop the others.
    pub fn write_axioms(&mut self) -> Vec<MappingIntent> {
        let direction = SyncDirection::Write;
        let ground = Arc::clone(&self.ground);
        let _session = match ground.context().session() {
            Ok(guard) => guard,
            Err(e) => return vec![self.failed(direction, None, &e)],
        };

        let snapshot = match self.fetch() {
            Ok(snapshot) => snapshot,
            Err(e) => return vec![self.failed(direction, None, &e)],
        };
        let intent = match snapshot
            .diff_with_policy(&self.comparable_local(), self.config.singleton_policy)
        {
            Ok(intent) => intent,
            Err(e) => {
                let err = self.cardinality(e.candidates);
                return vec![self.failed(direction, None, &err)];
            }
        };

        let mut intents = Vec::with_capacity(intent.change_count());
        for value in intent.to_add() {
            intents.push(self.push_change(ChangeOp::Add, value));
        }
        for value in intent.to_remove() {
            intents.push(self.push_change(ChangeOp::Remove, value));
        }
        intents.extend(self.unchanged_intents(direction, &intent));

        debug!(
            subject = %ground.entity(),
            kind = %self.kind,
            added = intent.to_add().len(),
            removed = intent.to_remove().len(),
            failed = intents.iter().filter(|i| i.is_failure()).count(),
            "wrote axioms"
        );
        intents
    }

    /// Push one value to the store, mirrored if the fact kind has a mirror.
    ///
    /// If the mirrored change fails after the primary one was applied, the
    /// primary change is reverted so the store never holds half a fact.
    fn push_change(&self, op: ChangeOp, value: &T) -> MappingIntent {
        let direction = SyncDirection::Write;
        let store = self.ground.context().store();
        let subject = self.subject();
        let erased = value.to_axiom();

        let mutation_failure = |source: StorageError| SyncError::StoreMutationFailure {
            kind: self.kind,
            subject: subject.clone(),
            value: erased.clone(),
            source,
        };

        let primary = match apply_op(store, op, subject, self.kind, &erased) {
            Ok(record) => record,
            Err(source) => {
                return self.failed(direction, Some(erased.clone()), &mutation_failure(source));
            }
        };
        let mut applied = primary.applied;

        if let (Some(mirror), Some(other)) = (self.kind.mirror(), erased.as_entity()) {
            let reflexive = other == subject && mirror == self.kind;
            if !reflexive {
                let back = AxiomValue::Entity(subject.clone());
                match apply_op(store, op, other, mirror, &back) {
                    Ok(record) => applied |= record.applied,
                    Err(source) => {
                        if primary.applied {
                            if let Err(undo) =
                                apply_op(store, op.inverse(), subject, self.kind, &erased)
                            {
                                warn!(
                                    subject = %subject,
                                    kind = %self.kind,
                                    value = %erased,
                                    error = %undo,
                                    "could not revert half-applied fact"
                                );
                            }
                        }
                        let err = SyncError::StoreMutationFailure {
                            kind: mirror,
                            subject: other.clone(),
                            value: back,
                            source,
                        };
                        return self.failed(direction, Some(erased.clone()), &err);
                    }
                }
            }
        }

        match (applied, op) {
            (false, _) => MappingIntent::unchanged(direction, self.kind, subject, erased),
            (true, ChangeOp::Add) => MappingIntent::added(direction, self.kind, subject, erased),
            (true, ChangeOp::Remove) => MappingIntent::removed(direction, self.kind, subject, erased),
        }
    }
}

impl Capability<EntityRef> {
    fn related_kind(&self) -> AxiomResult<EntityKind> {
        self.kind
            .related_kind(self.subject().kind)
            .ok_or_else(|| AxiomError::internal(format!("'{}' does not relate entities", self.kind)))
    }

    /// Resolves `name` through the store and adds it locally.
    pub fn add_named(&mut self, name: &str) -> AxiomResult<bool> {
        let entity = self.ground.context().resolve(name, self.related_kind()?)?;
        Ok(self.local.add(entity))
    }

    /// Resolves `name` through the store and removes it locally.
    pub fn remove_named(&mut self, name: &str) -> AxiomResult<bool> {
        let entity = self.ground.context().resolve(name, self.related_kind()?)?;
        Ok(self.local.remove(&entity))
    }

    /// Builds one new descriptor per related entity and reads it once.
    ///
    /// This is a single level of expansion: nothing is cached, repeated
    /// calls allocate new descriptors, and cycles are not detected. Use
    /// [`crate::expand::DescriptorArena`] for bounded multi-level expansion.
    pub fn build_related<D, F>(&self, mut factory: F) -> Vec<D>
    where
        D: Descriptor,
        F: FnMut(Ground) -> D,
    {
        self.local
            .iter()
            .map(|entity| {
                let mut built = factory(self.ground.regrounded(entity.clone()));
                built.read_axioms();
                built
            })
            .collect()
    }
}

impl Capability<Restriction> {
    fn filler_kind(&self) -> EntityKind {
        match (self.kind, self.subject().kind) {
            (FactKind::Range, EntityKind::DataProperty) => EntityKind::Datatype,
            _ => EntityKind::Class,
        }
    }

    /// Resolves `name` and adds a plain class (or datatype) restriction.
    pub fn add_class_restriction(&mut self, name: &str) -> AxiomResult<bool> {
        let filler = self.ground.context().resolve(name, self.filler_kind())?;
        Ok(self.local.add(Restriction::class(filler)))
    }

    /// Resolves `name` and removes the plain class (or datatype) restriction.
    pub fn remove_class_restriction(&mut self, name: &str) -> AxiomResult<bool> {
        let filler = self.ground.context().resolve(name, self.filler_kind())?;
        Ok(self.local.remove(&Restriction::class(filler)))
    }
}

impl<T: FactValue> Descriptor for Capability<T> {
    fn ground(&self) -> &Ground {
        Capability::ground(self)
    }

    fn read_axioms(&mut self) -> Vec<MappingIntent> {
        Capability::read_axioms(self)
    }

    fn write_axioms(&mut self) -> Vec<MappingIntent> {
        Capability::write_axioms(self)
    }
}

impl<T: FactValue> Reconcile for Capability<T> {
    fn fact_kind(&self) -> FactKind {
        self.kind
    }

    fn ground(&self) -> &Ground {
        Capability::ground(self)
    }

    fn read_axioms(&mut self) -> Vec<MappingIntent> {
        Capability::read_axioms(self)
    }

    fn write_axioms(&mut self) -> Vec<MappingIntent> {
        Capability::write_axioms(self)
    }

    fn set_singleton(&mut self, singleton: bool) {
        self.local.set_singleton(singleton);
    }

    fn local_summary(&self) -> String {
        self.local.to_string()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

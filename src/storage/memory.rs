//! In-memory fact store.
//!
//! This module provides a thread-safe in-memory implementation of
//! [`FactStore`]. It is intended for embedded usage, tests, and as a
//! reference implementation of the store contract.
//!
//! Facts are stored as directed edges `(subject, kind) -> values`. The store
//! does no reasoning: writing `A sub B` does not make `B super A` visible.
//! Keeping both sides consistent is the caller's job (capabilities do it by
//! writing the mirrored edge).

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::RwLock;

use crate::entity::{validate_name, EntityKind, EntityRef};
use crate::fact::{AxiomValue, Characteristic, FactKind};
use crate::storage::traits::{ChangeOp, ChangeRecord, FactStore, StorageError};

fn lock_err(context: &'static str) -> StorageError {
    StorageError::BackendError(format!("poisoned lock: {context}"))
}

#[derive(Debug, Default)]
struct FactState {
    entities: HashSet<EntityRef>,
    edges: HashMap<(EntityRef, FactKind), BTreeSet<AxiomValue>>,
    characteristics: HashMap<EntityRef, BTreeSet<Characteristic>>,
}

impl FactState {
    fn check_subject(
        &self,
        subject: &EntityRef,
        kind: FactKind,
        strict: bool,
    ) -> Result<(), StorageError> {
        if !kind.applies_to(subject.kind) {
            return Err(StorageError::NotApplicable {
                kind,
                subject: subject.kind,
            });
        }
        if strict && !self.entities.contains(subject) {
            return Err(StorageError::UnknownEntity(subject.clone()));
        }
        Ok(())
    }

    fn check_value(
        &self,
        subject: &EntityRef,
        kind: FactKind,
        value: &AxiomValue,
        strict: bool,
    ) -> Result<(), StorageError> {
        if value.shape() != kind.shape() {
            return Err(StorageError::ShapeMismatch {
                kind,
                actual: value.shape(),
            });
        }
        if let Some(e) = value.as_entity() {
            if kind.related_kind(subject.kind) != Some(e.kind) {
                return Err(StorageError::BackendError(format!(
                    "'{kind}' of {subject} cannot relate to {e}"
                )));
            }
            if strict && !self.entities.contains(e) {
                return Err(StorageError::UnknownEntity(e.clone()));
            }
        }
        Ok(())
    }

    fn declare_value(&mut self, value: &AxiomValue) {
        match value {
            AxiomValue::Entity(e) => {
                self.entities.insert(e.clone());
            }
            AxiomValue::Restriction(r) => {
                if let Some(p) = &r.property {
                    self.entities.insert(p.clone());
                }
                self.entities.insert(r.filler.clone());
            }
        }
    }
}

/// Thread-safe in-memory fact store.
///
/// By default unknown entities are declared on first use, mirroring how
/// ontology factories hand out entities by name. A strict store instead
/// rejects anything that was not declared up front.
#[derive(Debug, Default)]
pub struct InMemoryFactStore {
    state: RwLock<FactState>,
    strict: bool,
}

impl InMemoryFactStore {
    /// Create a new empty store that declares entities on demand.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new empty store that only accepts declared entities.
    #[must_use]
    pub fn strict() -> Self {
        Self {
            state: RwLock::default(),
            strict: true,
        }
    }

    /// Declare an entity. Returns false if it was already known.
    pub fn declare(&self, entity: EntityRef) -> Result<bool, StorageError> {
        let mut state = self.state.write().map_err(|_| lock_err("fact.declare"))?;
        Ok(state.entities.insert(entity))
    }

    /// Returns true if the store holds `subject -[kind]-> value`.
    pub fn contains(
        &self,
        subject: &EntityRef,
        kind: FactKind,
        value: &AxiomValue,
    ) -> Result<bool, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("fact.contains"))?;
        Ok(state
            .edges
            .get(&(subject.clone(), kind))
            .is_some_and(|values| values.contains(value)))
    }

    /// Total number of stored edges.
    pub fn fact_count(&self) -> Result<usize, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("fact.count"))?;
        Ok(state.edges.values().map(BTreeSet::len).sum())
    }

    /// Number of known entities.
    pub fn entity_count(&self) -> Result<usize, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("entity.count"))?;
        Ok(state.entities.len())
    }

    fn mutate(
        &self,
        op: ChangeOp,
        subject: &EntityRef,
        kind: FactKind,
        value: &AxiomValue,
    ) -> Result<ChangeRecord, StorageError> {
        let mut state = self.state.write().map_err(|_| lock_err("fact.mutate"))?;
        state.check_subject(subject, kind, self.strict)?;
        state.check_value(subject, kind, value, self.strict)?;

        let key = (subject.clone(), kind);
        let applied = match op {
            ChangeOp::Add => {
                state.entities.insert(subject.clone());
                state.declare_value(value);
                state.edges.entry(key).or_default().insert(value.clone())
            }
            ChangeOp::Remove => {
                let removed = state
                    .edges
                    .get_mut(&key)
                    .is_some_and(|values| values.remove(value));
                if state.edges.get(&key).is_some_and(BTreeSet::is_empty) {
                    state.edges.remove(&key);
                }
                removed
            }
        };

        Ok(ChangeRecord::new(
            op,
            subject.clone(),
            kind,
            value.clone(),
            applied,
        ))
    }
}

impl FactStore for InMemoryFactStore {
    fn query_related(
        &self,
        subject: &EntityRef,
        kind: FactKind,
    ) -> Result<BTreeSet<AxiomValue>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("fact.query"))?;
        state.check_subject(subject, kind, self.strict)?;
        Ok(state
            .edges
            .get(&(subject.clone(), kind))
            .cloned()
            .unwrap_or_default())
    }

    fn apply_add(
        &self,
        subject: &EntityRef,
        kind: FactKind,
        value: &AxiomValue,
    ) -> Result<ChangeRecord, StorageError> {
        self.mutate(ChangeOp::Add, subject, kind, value)
    }

    fn apply_remove(
        &self,
        subject: &EntityRef,
        kind: FactKind,
        value: &AxiomValue,
    ) -> Result<ChangeRecord, StorageError> {
        self.mutate(ChangeOp::Remove, subject, kind, value)
    }

    fn resolve(&self, name: &str, kind: EntityKind) -> Result<EntityRef, StorageError> {
        let name = name.trim();
        validate_name(name).map_err(|e| StorageError::InvalidName(e.to_string()))?;
        let entity = EntityRef {
            kind,
            name: name.to_string(),
        };

        if self.strict {
            let state = self.state.read().map_err(|_| lock_err("entity.resolve"))?;
            return if state.entities.contains(&entity) {
                Ok(entity)
            } else {
                Err(StorageError::UnknownEntity(entity))
            };
        }

        let mut state = self.state.write().map_err(|_| lock_err("entity.resolve"))?;
        state.entities.insert(entity.clone());
        Ok(entity)
    }

    fn set_characteristic(
        &self,
        property: &EntityRef,
        characteristic: Characteristic,
        enabled: bool,
    ) -> Result<bool, StorageError> {
        if !characteristic.applies_to(property.kind) {
            return Err(StorageError::Unsupported(format!(
                "{characteristic} on {} entities",
                property.kind
            )));
        }
        let mut state = self
            .state
            .write()
            .map_err(|_| lock_err("characteristic.set"))?;
        if self.strict && !state.entities.contains(property) {
            return Err(StorageError::UnknownEntity(property.clone()));
        }
        state.entities.insert(property.clone());
        let flags = state.characteristics.entry(property.clone()).or_default();
        Ok(if enabled {
            flags.insert(characteristic)
        } else {
            flags.remove(&characteristic)
        })
    }

    fn characteristics(
        &self,
        property: &EntityRef,
    ) -> Result<BTreeSet<Characteristic>, StorageError> {
        let state = self
            .state
            .read()
            .map_err(|_| lock_err("characteristic.get"))?;
        Ok(state
            .characteristics
            .get(property)
            .cloned()
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::fact::Restriction;

    fn class(name: &str) -> EntityRef {
        EntityRef::class(name).unwrap()
    }

    #[test]
    fn fact_add_query_remove() {
        let store = InMemoryFactStore::new();
        let cube = class("Cube");
        let shape: AxiomValue = class("Shape").into();

        let rec = store.apply_add(&cube, FactKind::Super, &shape).unwrap();
        assert!(rec.applied);
        assert_eq!(rec.op, ChangeOp::Add);

        // Second add is a no-op but still succeeds.
        let rec = store.apply_add(&cube, FactKind::Super, &shape).unwrap();
        assert!(!rec.applied);

        let got = store.query_related(&cube, FactKind::Super).unwrap();
        assert_eq!(got.into_iter().collect::<Vec<_>>(), vec![shape.clone()]);

        // No reasoning: the other side is not visible.
        let shape_ref = class("Shape");
        assert!(store.query_related(&shape_ref, FactKind::Sub).unwrap().is_empty());

        let rec = store.apply_remove(&cube, FactKind::Super, &shape).unwrap();
        assert!(rec.applied);
        assert!(store.query_related(&cube, FactKind::Super).unwrap().is_empty());
        assert_eq!(store.fact_count().unwrap(), 0);

        let rec = store.apply_remove(&cube, FactKind::Super, &shape).unwrap();
        assert!(!rec.applied);
    }

    #[test]
    fn fact_add_declares_entities() {
        let store = InMemoryFactStore::new();
        let cube = class("Cube");
        store
            .apply_add(&cube, FactKind::Super, &class("Shape").into())
            .unwrap();
        assert_eq!(store.entity_count().unwrap(), 2);
    }

    #[test]
    fn fact_rejects_wrong_shape_and_kind() {
        let store = InMemoryFactStore::new();
        let prop = EntityRef::object_property("hasPart").unwrap();
        let cube = class("Cube");

        let r: AxiomValue = Restriction::class(cube.clone()).into();
        assert!(matches!(
            store.apply_add(&prop, FactKind::Sub, &r),
            Err(StorageError::ShapeMismatch { .. })
        ));

        assert!(matches!(
            store.apply_add(&cube, FactKind::Inverse, &prop.clone().into()),
            Err(StorageError::NotApplicable { .. })
        ));

        // A class cannot be the sub-property of a property.
        assert!(matches!(
            store.apply_add(&prop, FactKind::Sub, &cube.into()),
            Err(StorageError::BackendError(_))
        ));
    }

    #[test]
    fn resolve_declares_on_demand() {
        let store = InMemoryFactStore::new();
        let e = store.resolve("  Sphere ", EntityKind::Class).unwrap();
        assert_eq!(e, class("Sphere"));
        assert_eq!(store.entity_count().unwrap(), 1);

        assert!(matches!(
            store.resolve("bad name", EntityKind::Class),
            Err(StorageError::InvalidName(_))
        ));
    }

    #[test]
    fn strict_store_rejects_undeclared() {
        let store = InMemoryFactStore::strict();
        assert!(matches!(
            store.resolve("Sphere", EntityKind::Class),
            Err(StorageError::UnknownEntity(_))
        ));

        let sphere = class("Sphere");
        let shape = class("Shape");
        assert!(store.declare(sphere.clone()).unwrap());
        assert!(!store.declare(sphere.clone()).unwrap());
        assert_eq!(store.resolve("Sphere", EntityKind::Class).unwrap(), sphere);

        assert!(matches!(
            store.apply_add(&sphere, FactKind::Super, &shape.clone().into()),
            Err(StorageError::UnknownEntity(e)) if e == shape
        ));
        assert!(matches!(
            store.query_related(&shape, FactKind::Sub),
            Err(StorageError::UnknownEntity(_))
        ));
    }

    #[test]
    fn characteristics_roundtrip() {
        let store = InMemoryFactStore::new();
        let has_time = EntityRef::data_property("has_time").unwrap();

        assert!(store
            .set_characteristic(&has_time, Characteristic::Functional, true)
            .unwrap());
        assert!(!store
            .set_characteristic(&has_time, Characteristic::Functional, true)
            .unwrap());
        assert!(store
            .characteristics(&has_time)
            .unwrap()
            .contains(&Characteristic::Functional));

        assert!(matches!(
            store.set_characteristic(&has_time, Characteristic::Transitive, true),
            Err(StorageError::Unsupported(_))
        ));

        assert!(store
            .set_characteristic(&has_time, Characteristic::Functional, false)
            .unwrap());
        assert!(store.characteristics(&has_time).unwrap().is_empty());
    }
}

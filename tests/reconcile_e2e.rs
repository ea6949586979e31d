use axiomsync::{
    AxiomValue, ChangeRecord, CompositeDescriptor, Descriptor, EntityKind, EntityRef, EntitySet,
    FactKind, FactStore, InMemoryFactStore, IntentKind, MappingIntent, MappingReport,
    StorageError, StoreContext, SyncDirection,
};
use std::collections::{BTreeSet, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

/// In-memory store that can be told to fail queries of some kinds and
/// mutations of some subjects, or to panic on the next query.
#[derive(Default)]
struct FlakyStore {
    inner: InMemoryFactStore,
    failing_queries: Mutex<HashSet<FactKind>>,
    failing_subjects: Mutex<HashSet<String>>,
    panic_on_query: AtomicBool,
}

impl FlakyStore {
    fn fail_queries(&self, kind: FactKind) {
        self.failing_queries.lock().unwrap().insert(kind);
    }

    fn fail_mutations_of(&self, name: &str) {
        self.failing_subjects.lock().unwrap().insert(name.to_string());
    }

    fn heal(&self) {
        self.failing_queries.lock().unwrap().clear();
        self.failing_subjects.lock().unwrap().clear();
    }

    fn check_mutation(&self, subject: &EntityRef) -> Result<(), StorageError> {
        if self.failing_subjects.lock().unwrap().contains(&subject.name) {
            return Err(StorageError::ConnectionError(format!("{subject} unreachable")));
        }
        Ok(())
    }
}

impl FactStore for FlakyStore {
    fn query_related(
        &self,
        subject: &EntityRef,
        kind: FactKind,
    ) -> Result<BTreeSet<AxiomValue>, StorageError> {
        if self.panic_on_query.swap(false, Ordering::SeqCst) {
            panic!("backend crashed mid-query");
        }
        if self.failing_queries.lock().unwrap().contains(&kind) {
            return Err(StorageError::ConnectionError("query timed out".to_string()));
        }
        self.inner.query_related(subject, kind)
    }

    fn apply_add(
        &self,
        subject: &EntityRef,
        kind: FactKind,
        value: &AxiomValue,
    ) -> Result<ChangeRecord, StorageError> {
        self.check_mutation(subject)?;
        self.inner.apply_add(subject, kind, value)
    }

    fn apply_remove(
        &self,
        subject: &EntityRef,
        kind: FactKind,
        value: &AxiomValue,
    ) -> Result<ChangeRecord, StorageError> {
        self.check_mutation(subject)?;
        self.inner.apply_remove(subject, kind, value)
    }

    fn resolve(&self, name: &str, kind: EntityKind) -> Result<EntityRef, StorageError> {
        self.inner.resolve(name, kind)
    }
}

fn class(name: &str) -> EntityRef {
    EntityRef::class(name).unwrap()
}

fn summary(intents: &[MappingIntent]) -> Vec<(IntentKind, Option<String>)> {
    intents
        .iter()
        .map(|i| (i.kind, i.value.as_ref().map(ToString::to_string)))
        .collect()
}

#[test]
fn diff_of_integer_sets() {
    let a: EntitySet<u32> = [1, 2, 3].into_iter().collect();
    let b: EntitySet<u32> = [2, 3, 4].into_iter().collect();
    let intent = a.diff_against(&b);
    assert_eq!(intent.to_add(), &BTreeSet::from([4]));
    assert_eq!(intent.to_remove(), &BTreeSet::from([1]));
    assert_eq!(intent.unchanged(), &BTreeSet::from([2, 3]));
}

#[test]
fn read_reports_added_then_removed_and_write_is_then_empty() {
    let store = Arc::new(InMemoryFactStore::new());
    let subject = class("Thing");
    for name in ["B", "C"] {
        store
            .apply_add(&subject, FactKind::Equivalent, &class(name).into())
            .unwrap();
    }
    let ctx = StoreContext::new("onto", store.clone());

    let mut desc = CompositeDescriptor::new(ctx.ground(subject))
        .with_kinds(&[FactKind::Equivalent])
        .unwrap();
    let equivalents = desc.links_mut(FactKind::Equivalent).unwrap();
    equivalents.add_named("A").unwrap();
    equivalents.add_named("B").unwrap();

    let intents = desc.read_axioms();
    assert_eq!(
        summary(&intents),
        vec![
            (IntentKind::Added, Some("class:C".to_string())),
            (IntentKind::Removed, Some("class:A".to_string())),
        ]
    );
    assert!(intents.iter().all(|i| i.direction == SyncDirection::Read));

    assert!(desc.write_axioms().is_empty());
    assert!(desc.read_axioms().is_empty());
}

#[test]
fn write_then_read_round_trips_through_a_fresh_descriptor() {
    let store = Arc::new(InMemoryFactStore::new());
    let ctx = StoreContext::new("onto", store.clone());

    let mut writer = CompositeDescriptor::full(ctx.ground(class("Cube")));
    writer.links_mut(FactKind::Super).unwrap().add_named("Shape").unwrap();
    writer.links_mut(FactKind::Super).unwrap().add_named("Solid").unwrap();
    writer.links_mut(FactKind::Disjoint).unwrap().add_named("Sphere").unwrap();
    let report = MappingReport::from(writer.write_axioms());
    assert_eq!(report.added, 3);
    assert!(!report.has_failures());

    let mut reader = CompositeDescriptor::full(ctx.ground(class("Cube")));
    let report = MappingReport::from(reader.read_axioms());
    assert_eq!(report.added, 3);
    assert_eq!(
        reader.links(FactKind::Super).unwrap().get(),
        writer.links(FactKind::Super).unwrap().get()
    );

    // Mirrored edges are visible from the other side.
    let mut sphere = CompositeDescriptor::full(ctx.ground(class("Sphere")));
    sphere.read_axioms();
    assert!(sphere
        .links(FactKind::Disjoint)
        .unwrap()
        .get()
        .contains(&class("Cube")));
    let mut shape = CompositeDescriptor::full(ctx.ground(class("Shape")));
    shape.read_axioms();
    assert!(shape.links(FactKind::Sub).unwrap().get().contains(&class("Cube")));
}

#[test]
fn removals_are_written_and_mirrored() {
    let store = Arc::new(InMemoryFactStore::new());
    let ctx = StoreContext::new("onto", store.clone());

    let mut desc = CompositeDescriptor::hierarchical(ctx.ground(class("Cube"))).unwrap();
    desc.links_mut(FactKind::Super).unwrap().add_named("Shape").unwrap();
    desc.write_axioms();
    assert_eq!(store.fact_count().unwrap(), 2);

    desc.links_mut(FactKind::Super).unwrap().remove_named("Shape").unwrap();
    let intents = desc.write_axioms();
    assert_eq!(
        summary(&intents),
        vec![(IntentKind::Removed, Some("class:Shape".to_string()))]
    );
    assert_eq!(store.fact_count().unwrap(), 0);
}

#[test]
fn failing_capability_does_not_block_the_others() {
    let store = Arc::new(FlakyStore::default());
    let cube = class("Cube");
    store
        .inner
        .apply_add(&cube, FactKind::Super, &class("Shape").into())
        .unwrap();
    let ctx = StoreContext::new("flaky", store.clone());

    let mut desc = CompositeDescriptor::hierarchical(ctx.ground(cube)).unwrap();
    desc.links_mut(FactKind::Sub).unwrap().add(class("SmallCube"));
    store.fail_queries(FactKind::Sub);

    let intents = desc.read_axioms();
    assert_eq!(intents.len(), 2);
    assert_eq!(intents[0].kind, IntentKind::Failed);
    assert_eq!(intents[0].fact_kind, FactKind::Sub);
    assert!(intents[0].value.is_none());
    assert!(intents[0].description.contains("query timed out"));
    assert_eq!(intents[1].kind, IntentKind::Added);

    // The failed read left the local set alone.
    assert!(desc
        .links(FactKind::Sub)
        .unwrap()
        .get()
        .contains(&class("SmallCube")));

    store.heal();
    let intents = desc.read_axioms();
    assert_eq!(
        summary(&intents),
        vec![(IntentKind::Removed, Some("class:SmallCube".to_string()))]
    );
}

#[test]
fn write_failures_are_reported_per_value_and_retried_next_time() {
    let store = Arc::new(FlakyStore::default());
    let ctx = StoreContext::new("flaky", store.clone());

    let mut desc = CompositeDescriptor::hierarchical(ctx.ground(class("Cube"))).unwrap();
    let supers = desc.links_mut(FactKind::Super).unwrap();
    supers.add_named("Shape").unwrap();
    supers.add_named("Solid").unwrap();

    // The mirrored edge `Solid sub Cube` cannot be written.
    store.fail_mutations_of("Solid");
    let intents = desc.write_axioms();
    assert_eq!(
        summary(&intents),
        vec![
            (IntentKind::Added, Some("class:Shape".to_string())),
            (IntentKind::Failed, Some("class:Solid".to_string())),
        ]
    );

    // The half-applied `Cube super Solid` was reverted.
    let solid: AxiomValue = class("Solid").into();
    assert!(!store.inner.contains(&class("Cube"), FactKind::Super, &solid).unwrap());
    assert_eq!(store.inner.fact_count().unwrap(), 2);

    store.heal();
    let intents = desc.write_axioms();
    assert_eq!(
        summary(&intents),
        vec![(IntentKind::Added, Some("class:Solid".to_string()))]
    );
    assert_eq!(store.inner.fact_count().unwrap(), 4);
}

#[test]
fn write_query_failure_yields_single_failed_intent() {
    let store = Arc::new(FlakyStore::default());
    let ctx = StoreContext::new("flaky", store.clone());

    let mut desc = CompositeDescriptor::hierarchical(ctx.ground(class("Cube"))).unwrap();
    desc.links_mut(FactKind::Sub).unwrap().add(class("A"));
    desc.links_mut(FactKind::Sub).unwrap().add(class("B"));
    desc.links_mut(FactKind::Super).unwrap().add(class("C"));
    store.fail_queries(FactKind::Sub);

    let intents = desc.write_axioms();
    assert_eq!(intents.len(), 2);
    assert!(intents[0].is_failure());
    assert_eq!(intents[0].direction, SyncDirection::Write);
    assert_eq!(intents[1].kind, IntentKind::Added);
    assert_eq!(store.inner.fact_count().unwrap(), 2, "only the super edge and its mirror");
}

#[test]
fn names_resolve_through_the_store() {
    let store = Arc::new(InMemoryFactStore::strict());
    store.declare(class("Cube")).unwrap();
    store.declare(class("Shape")).unwrap();
    let ctx = StoreContext::new("strict", store.clone());

    let mut desc = CompositeDescriptor::hierarchical(ctx.ground(class("Cube"))).unwrap();
    let supers = desc.links_mut(FactKind::Super).unwrap();
    assert!(supers.add_named(" Shape ").unwrap());
    assert!(!supers.add_named("Shape").unwrap());

    let err = supers.add_named("Unknown").unwrap_err();
    assert!(err.is_storage());
    let err = supers.add_named("not a name").unwrap_err();
    assert!(err.is_storage());
    assert_eq!(supers.get().len(), 1);

    assert_eq!(summary(&desc.write_axioms()).len(), 1);
}

#[test]
fn individual_types_and_class_instances_mirror() {
    let store = Arc::new(InMemoryFactStore::new());
    let ctx = StoreContext::new("onto", store.clone());

    let obj = EntityRef::individual("cube_1").unwrap();
    let mut individual = CompositeDescriptor::full(ctx.ground(obj.clone()));
    individual.links_mut(FactKind::Type).unwrap().add_named("Cube").unwrap();
    individual.write_axioms();

    let mut cube = CompositeDescriptor::full(ctx.ground(class("Cube")));
    let intents = cube.read_axioms();
    assert_eq!(intents.len(), 1);
    assert_eq!(intents[0].fact_kind, FactKind::Instance);
    assert!(cube.links(FactKind::Instance).unwrap().get().contains(&obj));
}

#[test]
fn report_serialises_to_json() {
    let store = Arc::new(InMemoryFactStore::new());
    let ctx = StoreContext::new("onto", store);
    let mut desc = CompositeDescriptor::hierarchical(ctx.ground(class("Cube"))).unwrap();
    desc.links_mut(FactKind::Super).unwrap().add_named("Shape").unwrap();

    let report = MappingReport::new(desc.write_read_axioms());
    assert_eq!(report.change_count(), 1);
    let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
    assert_eq!(json["intents"][0]["value"]["entity"]["name"], "Shape");
}

#[test]
fn concurrent_writers_never_interleave_on_one_context() {
    let store = Arc::new(InMemoryFactStore::new());
    let ctx = StoreContext::new("shared", store.clone());
    let cube = class("Cube");

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let ctx = ctx.clone();
            let cube = cube.clone();
            thread::spawn(move || {
                let mut desc = CompositeDescriptor::new(ctx.ground(cube))
                    .with_kinds(&[FactKind::Super])
                    .unwrap();
                for _ in 0..200 {
                    let supers = desc.links_mut(FactKind::Super).unwrap();
                    supers.get_mut().clear();
                    supers.add(class(&format!("S{t}")));
                    let intents = desc.write_axioms();
                    assert!(intents.iter().all(|i| !i.is_failure()));
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    // Every write replaced the single super; interleaved diffs would leave
    // several behind.
    let supers = store.query_related(&cube, FactKind::Super).unwrap();
    assert_eq!(supers.len(), 1);
    assert_eq!(store.fact_count().unwrap(), 2, "one super edge and its mirror");
    let winner = supers.iter().next().unwrap().as_entity().unwrap();
    assert!(store
        .contains(winner, FactKind::Sub, &cube.clone().into())
        .unwrap());
}

#[test]
fn poisoned_session_fails_every_capability_without_mutation() {
    let store = Arc::new(FlakyStore::default());
    let cube = class("Cube");
    store
        .inner
        .apply_add(&cube, FactKind::Super, &class("Shape").into())
        .unwrap();
    let ctx = StoreContext::new("flaky", store.clone());

    store.panic_on_query.store(true, Ordering::SeqCst);
    let crashing = ctx.clone();
    let crashed = thread::spawn(move || {
        let mut desc = CompositeDescriptor::hierarchical(crashing.ground(class("Cube"))).unwrap();
        desc.read_axioms()
    })
    .join();
    assert!(crashed.is_err());
    assert!(ctx.is_poisoned());

    let mut desc = CompositeDescriptor::hierarchical(ctx.ground(cube.clone())).unwrap();
    desc.links_mut(FactKind::Sub).unwrap().add(class("SmallCube"));

    let intents = desc.read_axioms();
    assert_eq!(intents.len(), 2, "one failure per capability");
    assert!(intents.iter().all(MappingIntent::is_failure));
    assert!(intents.iter().all(|i| i.value.is_none()));
    assert!(intents[0].description.contains("poisoned"));
    assert!(desc.links(FactKind::Super).unwrap().get().is_empty());
    assert!(desc
        .links(FactKind::Sub)
        .unwrap()
        .get()
        .contains(&class("SmallCube")));

    let intents = desc.write_axioms();
    assert_eq!(intents.len(), 2);
    assert!(intents.iter().all(MappingIntent::is_failure));
    assert_eq!(store.inner.fact_count().unwrap(), 1, "nothing was written");
}

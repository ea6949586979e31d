//! Change intents and audit records.
//!
//! - [`SynchronisationIntent`] is the pure add/remove/unchanged partition
//!   computed by diffing two entity sets. It is never stored.
//! - [`MappingIntent`] is the audit record of one change a capability applied
//!   or attempted. Lists of them are what `read_axioms` / `write_axioms`
//!   return.
//! - [`MappingReport`] summarises such a list for logging and export.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entity::EntityRef;
use crate::error::{AxiomError, AxiomResult};
use crate::fact::{AxiomValue, FactKind};

/// The partition between a baseline set and a comparison set.
///
/// Invariants: the three sets are pairwise disjoint,
/// `to_add ∪ unchanged = comparison` and `to_remove ∪ unchanged = baseline`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynchronisationIntent<T: Ord> {
    pub(crate) to_add: BTreeSet<T>,
    pub(crate) to_remove: BTreeSet<T>,
    pub(crate) unchanged: BTreeSet<T>,
}

impl<T: Ord> SynchronisationIntent<T> {
    /// Values the baseline lacks.
    #[must_use]
    pub const fn to_add(&self) -> &BTreeSet<T> {
        &self.to_add
    }

    /// Values only the baseline has.
    #[must_use]
    pub const fn to_remove(&self) -> &BTreeSet<T> {
        &self.to_remove
    }

    /// Values both sides share.
    #[must_use]
    pub const fn unchanged(&self) -> &BTreeSet<T> {
        &self.unchanged
    }

    /// True if applying this intent would change nothing.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty()
    }

    /// Number of values to add or remove.
    #[must_use]
    pub fn change_count(&self) -> usize {
        self.to_add.len() + self.to_remove.len()
    }
}

impl<T: Ord> Default for SynchronisationIntent<T> {
    fn default() -> Self {
        Self {
            to_add: BTreeSet::new(),
            to_remove: BTreeSet::new(),
            unchanged: BTreeSet::new(),
        }
    }
}

/// Outcome of one mapping step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentKind {
    /// The value was added on the target side.
    Added,
    /// The value was removed from the target side.
    Removed,
    /// The value was already in sync.
    Unchanged,
    /// The change (or the whole call) failed.
    Failed,
}

impl fmt::Display for IntentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Added => write!(f, "added"),
            Self::Removed => write!(f, "removed"),
            Self::Unchanged => write!(f, "unchanged"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Which side converged on the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncDirection {
    /// Local state was updated from the store.
    Read,
    /// The store was updated from local state.
    Write,
}

impl fmt::Display for SyncDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read => write!(f, "read"),
            Self::Write => write!(f, "write"),
        }
    }
}

/// Audit record of one applied or attempted change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingIntent {
    /// What happened.
    pub kind: IntentKind,
    /// Read or write.
    pub direction: SyncDirection,
    /// Fact kind of the capability that produced the record.
    pub fact_kind: FactKind,
    /// The grounded entity.
    pub subject: EntityRef,
    /// The value concerned; `None` for failures of the whole call.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<AxiomValue>,
    /// Human-readable description.
    pub description: String,
    /// When the record was produced.
    pub recorded_at: DateTime<Utc>,
}

impl MappingIntent {
    fn build(
        kind: IntentKind,
        direction: SyncDirection,
        fact_kind: FactKind,
        subject: &EntityRef,
        value: Option<AxiomValue>,
        description: String,
    ) -> Self {
        Self {
            kind,
            direction,
            fact_kind,
            subject: subject.clone(),
            value,
            description,
            recorded_at: Utc::now(),
        }
    }

    /// A value was added.
    #[must_use]
    pub fn added(
        direction: SyncDirection,
        fact_kind: FactKind,
        subject: &EntityRef,
        value: AxiomValue,
    ) -> Self {
        let description = format!("{direction}: added {value} to {fact_kind} of {subject}");
        Self::build(IntentKind::Added, direction, fact_kind, subject, Some(value), description)
    }

    /// A value was removed.
    #[must_use]
    pub fn removed(
        direction: SyncDirection,
        fact_kind: FactKind,
        subject: &EntityRef,
        value: AxiomValue,
    ) -> Self {
        let description = format!("{direction}: removed {value} from {fact_kind} of {subject}");
        Self::build(IntentKind::Removed, direction, fact_kind, subject, Some(value), description)
    }

    /// A value was already in sync.
    #[must_use]
    pub fn unchanged(
        direction: SyncDirection,
        fact_kind: FactKind,
        subject: &EntityRef,
        value: AxiomValue,
    ) -> Self {
        let description = format!("{direction}: {value} already in {fact_kind} of {subject}");
        Self::build(IntentKind::Unchanged, direction, fact_kind, subject, Some(value), description)
    }

    /// A change, or the whole call, failed.
    #[must_use]
    pub fn failed(
        direction: SyncDirection,
        fact_kind: FactKind,
        subject: &EntityRef,
        value: Option<AxiomValue>,
        error: &dyn fmt::Display,
    ) -> Self {
        let description = match &value {
            Some(v) => format!("{direction}: {fact_kind} of {subject} failed for {v}: {error}"),
            None => format!("{direction}: {fact_kind} of {subject} failed: {error}"),
        };
        Self::build(IntentKind::Failed, direction, fact_kind, subject, value, description)
    }

    /// True for `Failed` records.
    #[must_use]
    pub const fn is_failure(&self) -> bool {
        matches!(self.kind, IntentKind::Failed)
    }

    /// True for `Added` and `Removed` records.
    #[must_use]
    pub const fn is_change(&self) -> bool {
        matches!(self.kind, IntentKind::Added | IntentKind::Removed)
    }
}

impl fmt::Display for MappingIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind, self.description)
    }
}

/// Summary of a list of mapping intents.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingReport {
    /// Number of `Added` records.
    pub added: usize,
    /// Number of `Removed` records.
    pub removed: usize,
    /// Number of `Unchanged` records.
    pub unchanged: usize,
    /// Number of `Failed` records.
    pub failed: usize,
    /// The records themselves, in production order.
    pub intents: Vec<MappingIntent>,
}

impl MappingReport {
    /// Summarise a list of intents.
    #[must_use]
    pub fn new(intents: Vec<MappingIntent>) -> Self {
        let mut report = Self::default();
        for intent in &intents {
            match intent.kind {
                IntentKind::Added => report.added += 1,
                IntentKind::Removed => report.removed += 1,
                IntentKind::Unchanged => report.unchanged += 1,
                IntentKind::Failed => report.failed += 1,
            }
        }
        report.intents = intents;
        report
    }

    /// True if any record failed.
    #[must_use]
    pub const fn has_failures(&self) -> bool {
        self.failed > 0
    }

    /// Number of applied changes.
    #[must_use]
    pub const fn change_count(&self) -> usize {
        self.added + self.removed
    }

    /// Failed records only.
    pub fn failures(&self) -> impl Iterator<Item = &MappingIntent> {
        self.intents.iter().filter(|i| i.is_failure())
    }

    /// Serialise the report as JSON for audit logs.
    pub fn to_json(&self) -> AxiomResult<String> {
        serde_json::to_string(self)
            .map_err(|e| AxiomError::internal(format!("cannot serialise mapping report: {e}")))
    }
}

impl From<Vec<MappingIntent>> for MappingReport {
    fn from(intents: Vec<MappingIntent>) -> Self {
        Self::new(intents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn class(name: &str) -> EntityRef {
        EntityRef::class(name).unwrap()
    }

    #[test]
    fn test_intent_descriptions() {
        let a = class("A");
        let added = MappingIntent::added(SyncDirection::Read, FactKind::Sub, &a, class("C").into());
        assert_eq!(added.description, "read: added class:C to sub of class:A");
        assert!(added.is_change());
        assert!(!added.is_failure());

        let failed = MappingIntent::failed(
            SyncDirection::Write,
            FactKind::Super,
            &a,
            None,
            &"connection reset",
        );
        assert!(failed.is_failure());
        assert!(failed.value.is_none());
        assert!(failed.to_string().starts_with("[failed] write: super of class:A failed"));
    }

    #[test]
    fn test_report_counts() {
        let a = class("A");
        let intents = vec![
            MappingIntent::added(SyncDirection::Read, FactKind::Sub, &a, class("B").into()),
            MappingIntent::removed(SyncDirection::Read, FactKind::Sub, &a, class("C").into()),
            MappingIntent::unchanged(SyncDirection::Read, FactKind::Sub, &a, class("D").into()),
            MappingIntent::failed(SyncDirection::Read, FactKind::Super, &a, None, &"boom"),
        ];
        let report = MappingReport::from(intents);
        assert_eq!(report.added, 1);
        assert_eq!(report.removed, 1);
        assert_eq!(report.unchanged, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(report.change_count(), 2);
        assert!(report.has_failures());
        assert_eq!(report.failures().count(), 1);
    }

    #[test]
    fn test_report_json_export() {
        let a = class("A");
        let report = MappingReport::new(vec![MappingIntent::added(
            SyncDirection::Write,
            FactKind::Equivalent,
            &a,
            class("B").into(),
        )]);
        let json = report.to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["added"], 1);
        assert_eq!(value["intents"][0]["kind"], "added");
        assert_eq!(value["intents"][0]["direction"], "write");
        assert_eq!(value["intents"][0]["fact_kind"], "equivalent");
    }

    #[test]
    fn test_synchronisation_intent_noop() {
        let intent: SynchronisationIntent<u32> = SynchronisationIntent::default();
        assert!(intent.is_noop());
        assert_eq!(intent.change_count(), 0);
    }
}

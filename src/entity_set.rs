//! Duplicate-free sets of related values and their diff.
//!
//! [`EntitySet::diff_against`] is the single operation both sync directions
//! reuse; only the choice of which set plays the baseline changes:
//!
//! - read: `local.diff_against(store_snapshot)`, applied to `local`
//! - write: `store_snapshot.diff_against(local)`, applied to the store
//!
//! Singleton sets hold at most one value once reconciled. When a singleton
//! baseline is compared with a multi-valued set, only the smallest value of
//! the comparison set (under `T: Ord`) is considered.

use std::collections::btree_set;
use std::collections::BTreeSet;
use std::cmp::Ordering;
use std::fmt;

use thiserror::Error;

use crate::config::SingletonPolicy;
use crate::intent::SynchronisationIntent;

/// A singleton set was compared with several candidates under
/// [`SingletonPolicy::Reject`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("singleton set offered {candidates} candidates")]
pub struct CardinalityExceeded {
    /// Size of the comparison set.
    pub candidates: usize,
}

/// An unordered, duplicate-free set of related values.
///
/// Equality compares elements only; the singleton flag is policy, not data.
#[derive(Debug, Clone)]
pub struct EntitySet<T: Ord> {
    elements: BTreeSet<T>,
    singleton: bool,
}

impl<T: Ord> EntitySet<T> {
    /// An empty, unbounded set.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            elements: BTreeSet::new(),
            singleton: false,
        }
    }

    /// An empty set holding at most one value once reconciled.
    #[must_use]
    pub const fn singleton() -> Self {
        Self {
            elements: BTreeSet::new(),
            singleton: true,
        }
    }

    /// Inserts `value`. Returns whether the set changed.
    ///
    /// Singleton sets accept extra values here; the next reconciliation
    /// brings them back down to one.
    pub fn add(&mut self, value: T) -> bool {
        self.elements.insert(value)
    }

    /// Removes `value`. Returns whether the set changed.
    pub fn remove(&mut self, value: &T) -> bool {
        self.elements.remove(value)
    }

    /// Returns true if `value` is present.
    #[must_use]
    pub fn contains(&self, value: &T) -> bool {
        self.elements.contains(value)
    }

    /// Number of values.
    #[must_use]
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// Returns true if the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Removes every value.
    pub fn clear(&mut self) {
        self.elements.clear();
    }

    /// Iterates values in ascending order.
    pub fn iter(&self) -> btree_set::Iter<'_, T> {
        self.elements.iter()
    }

    /// The smallest value.
    #[must_use]
    pub fn first(&self) -> Option<&T> {
        self.elements.first()
    }

    /// Returns true if the set holds at most one value once reconciled.
    #[must_use]
    pub const fn is_singleton(&self) -> bool {
        self.singleton
    }

    /// Switches singleton mode on or off.
    pub fn set_singleton(&mut self, singleton: bool) {
        self.singleton = singleton;
    }

    /// The underlying ordered set.
    #[must_use]
    pub const fn as_set(&self) -> &BTreeSet<T> {
        &self.elements
    }
}

impl<T: Ord + Clone> EntitySet<T> {
    /// Partition `self` (baseline) against `other` (comparison).
    ///
    /// `to_add = other \ self`, `to_remove = self \ other`,
    /// `unchanged = self ∩ other`. If `self` is a singleton and `other` has
    /// several values, only the smallest one is considered.
    #[must_use]
    pub fn diff_against(&self, other: &Self) -> SynchronisationIntent<T> {
        match self.comparison(other, SingletonPolicy::Smallest) {
            Ok(target) => partition(&self.elements, target),
            // Smallest never rejects.
            Err(_) => partition(&self.elements, other.elements.iter()),
        }
    }

    /// Like [`Self::diff_against`], with an explicit singleton policy.
    pub fn diff_with_policy(
        &self,
        other: &Self,
        policy: SingletonPolicy,
    ) -> Result<SynchronisationIntent<T>, CardinalityExceeded> {
        let target = self.comparison(other, policy)?;
        Ok(partition(&self.elements, target))
    }

    /// Apply an intent to this set: add `to_add`, remove `to_remove`.
    pub fn apply(&mut self, intent: &SynchronisationIntent<T>) {
        for value in &intent.to_remove {
            self.elements.remove(value);
        }
        self.elements.extend(intent.to_add.iter().cloned());
    }

    fn comparison<'a>(
        &self,
        other: &'a Self,
        policy: SingletonPolicy,
    ) -> Result<Box<dyn Iterator<Item = &'a T> + 'a>, CardinalityExceeded> {
        if !self.singleton || other.elements.len() <= 1 {
            return Ok(Box::new(other.elements.iter()));
        }
        match policy {
            SingletonPolicy::Smallest => {
                tracing::warn!(
                    candidates = other.elements.len(),
                    "singleton entity set offered several candidates, keeping the smallest"
                );
                Ok(Box::new(other.elements.iter().take(1)))
            }
            SingletonPolicy::Reject => Err(CardinalityExceeded {
                candidates: other.elements.len(),
            }),
        }
    }
}

/// Linear merge walk over two ascending sequences.
fn partition<'a, T, I>(baseline: &'a BTreeSet<T>, target: I) -> SynchronisationIntent<T>
where
    T: Ord + Clone + 'a,
    I: Iterator<Item = &'a T>,
{
    let mut to_add = Vec::new();
    let mut to_remove = Vec::new();
    let mut unchanged = Vec::new();

    let mut base = baseline.iter().peekable();
    let mut target = target.peekable();
    loop {
        match (base.peek(), target.peek()) {
            (Some(b), Some(t)) => match b.cmp(t) {
                Ordering::Less => {
                    to_remove.push((*b).clone());
                    base.next();
                }
                Ordering::Greater => {
                    to_add.push((*t).clone());
                    target.next();
                }
                Ordering::Equal => {
                    unchanged.push((*b).clone());
                    base.next();
                    target.next();
                }
            },
            (Some(_), None) => to_remove.extend(base.by_ref().cloned()),
            (None, Some(_)) => to_add.extend(target.by_ref().cloned()),
            (None, None) => break,
        }
    }

    SynchronisationIntent {
        to_add: to_add.into_iter().collect(),
        to_remove: to_remove.into_iter().collect(),
        unchanged: unchanged.into_iter().collect(),
    }
}

impl<T: Ord> Default for EntitySet<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Ord> PartialEq for EntitySet<T> {
    fn eq(&self, other: &Self) -> bool {
        self.elements == other.elements
    }
}

impl<T: Ord> Eq for EntitySet<T> {}

impl<T: Ord> FromIterator<T> for EntitySet<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self {
            elements: iter.into_iter().collect(),
            singleton: false,
        }
    }
}

impl<T: Ord> Extend<T> for EntitySet<T> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        self.elements.extend(iter);
    }
}

impl<'a, T: Ord> IntoIterator for &'a EntitySet<T> {
    type Item = &'a T;
    type IntoIter = btree_set::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.elements.iter()
    }
}

impl<T: Ord + fmt::Display> fmt::Display for EntitySet<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, value) in self.elements.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{value}")?;
        }
        f.write_str("}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(values: &[u32]) -> EntitySet<u32> {
        values.iter().copied().collect()
    }

    fn sorted(s: &BTreeSet<u32>) -> Vec<u32> {
        s.iter().copied().collect()
    }

    #[test]
    fn diff_partitions_two_sets() {
        let a = set(&[1, 2, 3]);
        let b = set(&[2, 3, 4]);
        let intent = a.diff_against(&b);
        assert_eq!(sorted(intent.to_add()), vec![4]);
        assert_eq!(sorted(intent.to_remove()), vec![1]);
        assert_eq!(sorted(intent.unchanged()), vec![2, 3]);
    }

    #[test]
    fn diff_partition_laws_hold() {
        let a = set(&[1, 5, 7, 9, 12]);
        let b = set(&[0, 5, 8, 9, 13, 20]);
        let intent = a.diff_against(&b);

        let target: BTreeSet<u32> = intent.to_add().union(intent.unchanged()).copied().collect();
        let source: BTreeSet<u32> = intent.to_remove().union(intent.unchanged()).copied().collect();
        assert_eq!(&target, b.as_set());
        assert_eq!(&source, a.as_set());
        assert!(intent.to_add().is_disjoint(intent.to_remove()));
        assert!(intent.to_add().is_disjoint(intent.unchanged()));
        assert!(intent.to_remove().is_disjoint(intent.unchanged()));
    }

    #[test]
    fn diff_against_empty_sides() {
        let empty = EntitySet::<u32>::new();
        let full = set(&[1, 2]);

        let intent = empty.diff_against(&full);
        assert_eq!(sorted(intent.to_add()), vec![1, 2]);
        assert!(intent.to_remove().is_empty());

        let intent = full.diff_against(&empty);
        assert_eq!(sorted(intent.to_remove()), vec![1, 2]);
        assert!(intent.to_add().is_empty());

        assert!(empty.diff_against(&empty).is_noop());
    }

    #[test]
    fn apply_converges_baseline_to_comparison() {
        let mut local = set(&[1, 2, 3]);
        let remote = set(&[3, 4]);
        let intent = local.diff_against(&remote);
        local.apply(&intent);
        assert_eq!(local, remote);
        assert!(local.diff_against(&remote).is_noop());
    }

    #[test]
    fn singleton_keeps_smallest_candidate() {
        let mut local = EntitySet::<u32>::singleton();
        let remote = set(&[9, 4, 7]);
        let intent = local.diff_against(&remote);
        assert_eq!(sorted(intent.to_add()), vec![4]);
        local.apply(&intent);
        assert_eq!(local.len(), 1);
        assert!(local.contains(&4));
    }

    #[test]
    fn singleton_transient_extra_values_are_removed() {
        let mut local = EntitySet::<u32>::singleton();
        local.add(1);
        local.add(2);
        assert_eq!(local.len(), 2);

        let remote = set(&[3]);
        let intent = local.diff_against(&remote);
        assert_eq!(sorted(intent.to_remove()), vec![1, 2]);
        local.apply(&intent);
        assert_eq!(sorted(local.as_set()), vec![3]);
    }

    #[test]
    fn singleton_reject_policy_refuses_multiple_candidates() {
        let local = EntitySet::<u32>::singleton();
        let remote = set(&[1, 2]);
        let err = local
            .diff_with_policy(&remote, SingletonPolicy::Reject)
            .unwrap_err();
        assert_eq!(err.candidates, 2);

        let one = set(&[1]);
        assert!(local.diff_with_policy(&one, SingletonPolicy::Reject).is_ok());
    }

    #[test]
    fn equality_ignores_singleton_flag() {
        let mut a = set(&[1]);
        let b = set(&[1]);
        a.set_singleton(true);
        assert!(a.is_singleton());
        assert_eq!(a, b);
    }

    #[test]
    fn add_remove_report_changes() {
        let mut s = EntitySet::new();
        assert!(s.add(1));
        assert!(!s.add(1));
        assert!(s.remove(&1));
        assert!(!s.remove(&1));
        assert!(s.is_empty());
    }

    #[test]
    fn display_lists_values_in_order() {
        let s = set(&[3, 1, 2]);
        assert_eq!(s.to_string(), "{1, 2, 3}");
    }
}

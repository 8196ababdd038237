use smallvec::SmallVec;

use crate::types::LabelId;

/// Sorted, duplicate-free set of label ids.
///
/// Nodes rarely carry more than a handful of labels, so the set lives inline
/// until it grows past four entries.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct LabelSet {
    labels: SmallVec<[LabelId; 4]>,
}

impl LabelSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a set from arbitrary (possibly unsorted, duplicated) labels.
    pub fn from_slice(labels: &[LabelId]) -> Self {
        labels.iter().copied().collect()
    }

    /// Number of labels in the set.
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// Returns true when the set has no labels.
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Membership test.
    pub fn contains(&self, label: LabelId) -> bool {
        self.labels.binary_search(&label).is_ok()
    }

    /// Inserts `label`, returning false if it was already present.
    pub fn insert(&mut self, label: LabelId) -> bool {
        match self.labels.binary_search(&label) {
            Ok(_) => false,
            Err(pos) => {
                self.labels.insert(pos, label);
                true
            }
        }
    }

    /// Removes `label`, returning false if it was absent.
    pub fn remove(&mut self, label: LabelId) -> bool {
        match self.labels.binary_search(&label) {
            Ok(pos) => {
                self.labels.remove(pos);
                true
            }
            Err(_) => false,
        }
    }

    /// Removes every label.
    pub fn clear(&mut self) {
        self.labels.clear();
    }

    /// Adds every label of `other`.
    pub fn union_with(&mut self, other: &LabelSet) {
        for label in other.iter() {
            self.insert(label);
        }
    }

    /// Removes every label of `other`.
    pub fn subtract(&mut self, other: &LabelSet) {
        if other.is_empty() {
            return;
        }
        self.labels.retain(|label| !other.contains(*label));
    }

    /// Returns true when the two sets share a label.
    pub fn intersects(&self, other: &LabelSet) -> bool {
        self.iter().any(|label| other.contains(label))
    }

    /// Replaces the contents with `other`, keeping the allocation.
    pub fn copy_from(&mut self, other: &LabelSet) {
        self.labels.clear();
        self.labels.extend_from_slice(&other.labels);
    }

    /// Iterates labels in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = LabelId> + '_ {
        self.labels.iter().copied()
    }

    /// Labels in ascending order.
    pub fn as_slice(&self) -> &[LabelId] {
        &self.labels
    }
}

impl FromIterator<LabelId> for LabelSet {
    fn from_iter<I: IntoIterator<Item = LabelId>>(iter: I) -> Self {
        let mut labels: SmallVec<[LabelId; 4]> = iter.into_iter().collect();
        labels.sort_unstable();
        labels.dedup();
        Self { labels }
    }
}

impl<'a> IntoIterator for &'a LabelSet {
    type Item = LabelId;
    type IntoIter = std::iter::Copied<std::slice::Iter<'a, LabelId>>;

    fn into_iter(self) -> Self::IntoIter {
        self.labels.iter().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::BTreeSet;

    fn set(ids: &[u32]) -> LabelSet {
        ids.iter().map(|id| LabelId(*id)).collect()
    }

    #[test]
    fn from_slice_normalizes() {
        let labels = LabelSet::from_slice(&[LabelId(5), LabelId(1), LabelId(5)]);
        assert_eq!(labels.as_slice(), &[LabelId(1), LabelId(5)]);
    }

    #[test]
    fn insert_remove_report_changes() {
        let mut labels = set(&[2]);
        assert!(labels.insert(LabelId(1)));
        assert!(!labels.insert(LabelId(2)));
        assert!(labels.remove(LabelId(2)));
        assert!(!labels.remove(LabelId(2)));
        assert_eq!(labels, set(&[1]));
    }

    proptest! {
        #[test]
        fn union_then_subtract_matches_btreeset(
            base in prop::collection::btree_set(0u32..32, 0..8),
            added in prop::collection::btree_set(0u32..32, 0..8),
            removed in prop::collection::btree_set(0u32..32, 0..8),
        ) {
            let mut labels: LabelSet = base.iter().map(|id| LabelId(*id)).collect();
            labels.union_with(&added.iter().map(|id| LabelId(*id)).collect());
            labels.subtract(&removed.iter().map(|id| LabelId(*id)).collect());

            let expected: BTreeSet<u32> = base
                .union(&added)
                .copied()
                .filter(|id| !removed.contains(id))
                .collect();
            let actual: BTreeSet<u32> = labels.iter().map(|label| label.0).collect();
            prop_assert_eq!(actual, expected);
            prop_assert!(labels.as_slice().windows(2).all(|pair| pair[0] < pair[1]));
        }
    }
}

use std::collections::{BTreeMap, BTreeSet};

use crate::storage::{LabelSet, PropValue, PropertyMap};
use crate::types::{LabelId, PropId};

/// Labels added to and removed from one node by a transaction.
///
/// Adding a label that is pending removal cancels the removal and vice
/// versa, so the two sets stay disjoint when built through
/// [`LabelDiff::add`] and [`LabelDiff::remove`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LabelDiff {
    added: LabelSet,
    removed: LabelSet,
}

impl LabelDiff {
    /// Builds a diff from raw sets without cancelling overlaps.
    pub fn from_sets(added: LabelSet, removed: LabelSet) -> Self {
        Self { added, removed }
    }

    /// Records `label` as added.
    pub fn add(&mut self, label: LabelId) {
        if !self.removed.remove(label) {
            self.added.insert(label);
        }
    }

    /// Records `label` as removed.
    pub fn remove(&mut self, label: LabelId) {
        if !self.added.remove(label) {
            self.removed.insert(label);
        }
    }

    /// Labels added by the transaction.
    pub fn added(&self) -> &LabelSet {
        &self.added
    }

    /// Labels removed by the transaction.
    pub fn removed(&self) -> &LabelSet {
        &self.removed
    }

    /// Returns true when the diff changes nothing.
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }

    /// Applies the diff to `base`: `(base ∪ added) \ removed`.
    pub fn apply_to(&self, base: &mut LabelSet) {
        base.union_with(&self.added);
        base.subtract(&self.removed);
    }

    pub(crate) fn overlaps(&self) -> bool {
        self.added.intersects(&self.removed)
    }
}

/// Property values set on and removed from one node by a transaction.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PropertyDiff {
    changed: BTreeMap<PropId, PropValue>,
    removed: BTreeSet<PropId>,
}

impl PropertyDiff {
    /// Records `prop` as set to `value`.
    pub fn set(&mut self, prop: PropId, value: PropValue) {
        self.removed.remove(&prop);
        self.changed.insert(prop, value);
    }

    /// Records `prop` as removed.
    pub fn remove(&mut self, prop: PropId) {
        self.changed.remove(&prop);
        self.removed.insert(prop);
    }

    /// Values added or changed by the transaction.
    pub fn changed(&self) -> &BTreeMap<PropId, PropValue> {
        &self.changed
    }

    /// Keys removed by the transaction.
    pub fn removed(&self) -> &BTreeSet<PropId> {
        &self.removed
    }

    /// Returns true when the diff changes nothing.
    pub fn is_empty(&self) -> bool {
        self.changed.is_empty() && self.removed.is_empty()
    }

    /// Resolves a single property against its persisted value.
    pub fn resolve<'a>(
        &'a self,
        prop: PropId,
        persisted: Option<&'a PropValue>,
    ) -> Option<&'a PropValue> {
        if let Some(value) = self.changed.get(&prop) {
            return Some(value);
        }
        if self.removed.contains(&prop) {
            return None;
        }
        persisted
    }

    /// Applies the diff to a persisted property map.
    pub fn apply_to(&self, base: &mut PropertyMap) {
        for prop in &self.removed {
            base.remove(prop);
        }
        for (prop, value) in &self.changed {
            base.insert(*prop, value.clone());
        }
    }
}

/// Every change a transaction made to one node.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NodeState {
    /// Label changes.
    pub labels: LabelDiff,
    /// Property changes.
    pub props: PropertyDiff,
}

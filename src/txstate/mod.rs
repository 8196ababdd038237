//! Per-transaction record of uncommitted node changes.
//!
//! A [`TxState`] is owned by exactly one transaction and mutated only by the
//! statements it executes. Readers consult it through [`ReadableTxState`],
//! which never mutates.

mod diff;

use std::collections::BTreeSet;

use rustc_hash::FxHashMap;

use crate::storage::{LabelSet, PropValue};
use crate::types::{LabelId, NodeId, PenumbraError, PropId, Result};

pub use diff::{LabelDiff, NodeState, PropertyDiff};

/// Read-only queries the merge engine issues against a transaction diff.
///
/// A node without recorded changes answers as "no change".
pub trait ReadableTxState {
    /// Returns true when the diff holds any change at all.
    fn has_changes(&self) -> bool;

    /// Whether `id` was created by this transaction.
    fn is_created(&self, id: NodeId) -> bool;

    /// Whether `id` was deleted by this transaction.
    fn is_deleted(&self, id: NodeId) -> bool;

    /// Label changes recorded for `id`.
    fn label_diff(&self, id: NodeId) -> Option<&LabelDiff>;

    /// Property changes recorded for `id`.
    fn property_diff(&self, id: NodeId) -> Option<&PropertyDiff>;

    /// Ids created by this transaction, ascending.
    fn created_nodes(&self) -> Box<dyn Iterator<Item = NodeId> + '_>;

    /// Applies `id`'s label changes to `labels` in place.
    fn augment_labels(&self, labels: &mut LabelSet, id: NodeId) {
        if let Some(diff) = self.label_diff(id) {
            diff.apply_to(labels);
        }
    }

    /// Returns `base` with `id`'s label changes applied.
    fn augmented_labels(&self, base: &LabelSet, id: NodeId) -> LabelSet {
        let mut labels = base.clone();
        self.augment_labels(&mut labels, id);
        labels
    }
}

/// A diff with no changes, for reads outside any transaction.
#[derive(Clone, Copy, Debug, Default)]
pub struct EmptyTxState;

impl ReadableTxState for EmptyTxState {
    fn has_changes(&self) -> bool {
        false
    }

    fn is_created(&self, _id: NodeId) -> bool {
        false
    }

    fn is_deleted(&self, _id: NodeId) -> bool {
        false
    }

    fn label_diff(&self, _id: NodeId) -> Option<&LabelDiff> {
        None
    }

    fn property_diff(&self, _id: NodeId) -> Option<&PropertyDiff> {
        None
    }

    fn created_nodes(&self) -> Box<dyn Iterator<Item = NodeId> + '_> {
        Box::new(std::iter::empty())
    }
}

/// Mutable record of a transaction's uncommitted node changes.
#[derive(Clone, Debug, Default)]
pub struct TxState {
    created: BTreeSet<NodeId>,
    deleted: BTreeSet<NodeId>,
    nodes: FxHashMap<NodeId, NodeState>,
}

impl TxState {
    /// Creates an empty diff.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a diff from raw sets, rejecting contradictions.
    pub fn from_parts(
        created: impl IntoIterator<Item = NodeId>,
        deleted: impl IntoIterator<Item = NodeId>,
        label_diffs: impl IntoIterator<Item = (NodeId, LabelDiff)>,
    ) -> Result<Self> {
        let mut state = Self {
            created: created.into_iter().collect(),
            deleted: deleted.into_iter().collect(),
            nodes: FxHashMap::default(),
        };
        for (id, labels) in label_diffs {
            state.nodes.entry(id).or_default().labels = labels;
        }
        state.validate()?;
        Ok(state)
    }

    /// Checks the diff's invariants.
    ///
    /// Created and deleted ids must be disjoint and no label may be both
    /// added and removed on the same node.
    pub fn validate(&self) -> Result<()> {
        if let Some(id) = self.created.intersection(&self.deleted).next() {
            return Err(PenumbraError::DiffContradiction {
                node: *id,
                reason: "node both created and deleted",
            });
        }
        let mut ids: Vec<&NodeId> = self.nodes.keys().collect();
        ids.sort_unstable();
        for id in ids {
            if self.nodes[id].labels.overlaps() {
                return Err(PenumbraError::DiffContradiction {
                    node: *id,
                    reason: "label both added and removed",
                });
            }
        }
        Ok(())
    }

    /// Records the creation of `id`.
    pub fn node_do_create(&mut self, id: NodeId) -> Result<()> {
        if self.deleted.contains(&id) {
            return Err(PenumbraError::DiffContradiction {
                node: id,
                reason: "node id reused after deletion",
            });
        }
        self.created.insert(id);
        Ok(())
    }

    /// Records the deletion of `id`.
    ///
    /// Deleting a node created in this transaction cancels the creation and
    /// drops its changes; it never reaches the deleted set.
    pub fn node_do_delete(&mut self, id: NodeId) {
        if self.created.remove(&id) {
            self.nodes.remove(&id);
            return;
        }
        self.deleted.insert(id);
    }

    /// Records `label` as added to `id`.
    pub fn node_do_add_label(&mut self, label: LabelId, id: NodeId) {
        self.nodes.entry(id).or_default().labels.add(label);
    }

    /// Records `label` as removed from `id`.
    pub fn node_do_remove_label(&mut self, label: LabelId, id: NodeId) {
        self.nodes.entry(id).or_default().labels.remove(label);
    }

    /// Records `prop` set to `value` on `id`.
    pub fn node_do_set_property(&mut self, id: NodeId, prop: PropId, value: PropValue) {
        self.nodes.entry(id).or_default().props.set(prop, value);
    }

    /// Records `prop` removed from `id`.
    pub fn node_do_remove_property(&mut self, id: NodeId, prop: PropId) {
        self.nodes.entry(id).or_default().props.remove(prop);
    }

    /// Changes recorded for `id`.
    pub fn node_state(&self, id: NodeId) -> Option<&NodeState> {
        self.nodes.get(&id)
    }

    /// Ids deleted by this transaction, ascending.
    pub fn deleted_nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.deleted.iter().copied()
    }

    /// Every id this transaction touched, ascending and without duplicates.
    pub fn touched_nodes(&self) -> Vec<NodeId> {
        let mut ids: BTreeSet<NodeId> = self.created.clone();
        ids.extend(self.deleted.iter().copied());
        ids.extend(self.nodes.keys().copied());
        ids.into_iter().collect()
    }
}

impl ReadableTxState for TxState {
    fn has_changes(&self) -> bool {
        !self.created.is_empty() || !self.deleted.is_empty() || !self.nodes.is_empty()
    }

    fn is_created(&self, id: NodeId) -> bool {
        self.created.contains(&id)
    }

    fn is_deleted(&self, id: NodeId) -> bool {
        self.deleted.contains(&id)
    }

    fn label_diff(&self, id: NodeId) -> Option<&LabelDiff> {
        self.nodes.get(&id).map(|state| &state.labels)
    }

    fn property_diff(&self, id: NodeId) -> Option<&PropertyDiff> {
        self.nodes.get(&id).map(|state| &state.props)
    }

    fn created_nodes(&self) -> Box<dyn Iterator<Item = NodeId> + '_> {
        Box::new(self.created.iter().copied())
    }
}

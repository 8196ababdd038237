use std::fmt;
use std::sync::Arc;

use crate::storage::{LabelSet, NodeRecord, NodeStore, PropValue, PropertyMap};
use crate::txstate::PropertyDiff;
use crate::types::{LabelId, NodeId, PenumbraError, PropId, RecordPtr, Result};

use super::lock::{LockService, LockType, NodeLock};

/// Merged view of one node, valid until the cursor advances or closes.
///
/// Labels are the effective set: persisted labels with the transaction's
/// label diff applied. Pointers come from the persisted record, or are
/// [`RecordPtr::NONE`] for a node created in the current transaction.
pub struct NodeView<'c> {
    pub(crate) record: &'c NodeRecord,
    pub(crate) labels: &'c LabelSet,
    pub(crate) created: bool,
    pub(crate) props: Option<&'c PropertyDiff>,
    pub(crate) store: &'c dyn NodeStore,
    pub(crate) locks: &'c Arc<dyn LockService>,
}

impl<'c> NodeView<'c> {
    /// Node id.
    pub fn id(&self) -> NodeId {
        self.record.id
    }

    /// Effective label set.
    pub fn labels(&self) -> &'c LabelSet {
        self.labels
    }

    /// Whether `label` is in the effective label set.
    pub fn has_label(&self, label: LabelId) -> bool {
        self.labels.contains(label)
    }

    /// Whether the node was created by the current transaction.
    pub fn is_created(&self) -> bool {
        self.created
    }

    /// First property record of the persisted node.
    pub fn next_property_pointer(&self) -> RecordPtr {
        self.record.next_prop
    }

    /// Whether relationships are reached through a group record.
    pub fn is_dense(&self) -> bool {
        self.record.dense
    }

    /// First relationship; only meaningful for sparse nodes.
    pub fn next_relationship_pointer(&self) -> Result<RecordPtr> {
        if self.record.dense {
            return Err(PenumbraError::Invalid(
                "dense node has no direct relationship pointer",
            ));
        }
        Ok(self.record.next_rel)
    }

    /// First relationship group; only meaningful for dense nodes.
    pub fn next_group_pointer(&self) -> Result<RecordPtr> {
        if !self.record.dense {
            return Err(PenumbraError::Invalid("sparse node has no group pointer"));
        }
        Ok(self.record.next_rel)
    }

    /// Effective property values: the persisted chain with the transaction's
    /// property diff applied.
    pub fn properties(&self) -> Result<PropertyMap> {
        let mut values = self.store.property_chain(self.record.next_prop)?;
        if let Some(diff) = self.props {
            diff.apply_to(&mut values);
        }
        Ok(values)
    }

    /// Effective value of a single property.
    pub fn property(&self, prop: PropId) -> Result<Option<PropValue>> {
        let persisted = self.store.property_chain(self.record.next_prop)?;
        let value = match self.props {
            Some(diff) => diff.resolve(prop, persisted.get(&prop)),
            None => persisted.get(&prop),
        };
        Ok(value.cloned())
    }

    /// Acquires a lock on this node through the cursor's lock service.
    pub fn lock(&self, ty: LockType) -> Result<NodeLock> {
        NodeLock::acquire(self.locks, self.record.id, ty)
    }
}

impl fmt::Debug for NodeView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeView")
            .field("id", &self.record.id)
            .field("labels", self.labels)
            .field("created", &self.created)
            .field("dense", &self.record.dense)
            .field("next_prop", &self.record.next_prop)
            .field("next_rel", &self.record.next_rel)
            .finish()
    }
}

use std::collections::BTreeSet;

use tracing::{debug, info, trace};

use crate::cursor::{FetchProgression, LockType, NodeLock, NodeView, ScanProgression};
use crate::index::{IndexUpdate, NodeProjection, NodeUpdates};
use crate::storage::{LabelSet, NodeRecord, NodeStore, PropValue, PropertyMap, RecordWrite};
use crate::txstate::{ReadableTxState, TxState};
use crate::types::{LabelId, NodeId, PenumbraError, PropId, RecordPtr, Result};

use super::Graph;

/// A unit of work against a [`Graph`].
///
/// Reads see committed nodes merged with this transaction's own changes;
/// nothing becomes visible to other transactions before [`commit`]. A
/// transaction dropped without committing is rolled back.
///
/// [`commit`]: Transaction::commit
pub struct Transaction<'g> {
    graph: &'g Graph,
    id: u64,
    state: TxState,
    finished: bool,
}

impl<'g> Transaction<'g> {
    pub(crate) fn new(graph: &'g Graph, id: u64) -> Self {
        debug!(tx = id, "graph.tx.begin");
        Self {
            graph,
            id,
            state: TxState::new(),
            finished: false,
        }
    }

    /// Transaction id.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Uncommitted changes recorded so far.
    pub fn state(&self) -> &TxState {
        &self.state
    }

    /// Creates a node with no labels or properties.
    pub fn create_node(&mut self) -> Result<NodeId> {
        let id = self.graph.store().allocate_node_id();
        self.state.node_do_create(id)?;
        trace!(tx = self.id, node = id.0, "graph.tx.create_node");
        Ok(id)
    }

    /// Deletes a visible node.
    pub fn delete_node(&mut self, id: NodeId) -> Result<()> {
        self.require(id)?;
        self.state.node_do_delete(id);
        trace!(tx = self.id, node = id.0, "graph.tx.delete_node");
        Ok(())
    }

    /// Whether `id` is visible to this transaction.
    pub fn exists(&self, id: NodeId) -> Result<bool> {
        if self.state.is_deleted(id) {
            return Ok(false);
        }
        if self.state.is_created(id) {
            return Ok(true);
        }
        Ok(self.graph.store().lookup(id)?.is_some())
    }

    /// Adds `label` to `id`. Returns `false` if the node already has it.
    pub fn add_label(&mut self, id: NodeId, label: LabelId) -> Result<bool> {
        if self.node_labels(id)?.contains(label) {
            return Ok(false);
        }
        self.state.node_do_add_label(label, id);
        Ok(true)
    }

    /// Removes `label` from `id`. Returns `false` if the node lacks it.
    pub fn remove_label(&mut self, id: NodeId, label: LabelId) -> Result<bool> {
        if !self.node_labels(id)?.contains(label) {
            return Ok(false);
        }
        self.state.node_do_remove_label(label, id);
        Ok(true)
    }

    /// Sets `prop` on `id`.
    pub fn set_property(&mut self, id: NodeId, prop: PropId, value: PropValue) -> Result<()> {
        self.require(id)?;
        self.state.node_do_set_property(id, prop, value);
        Ok(())
    }

    /// Removes `prop` from `id`, returning the previous value.
    pub fn remove_property(&mut self, id: NodeId, prop: PropId) -> Result<Option<PropValue>> {
        let previous = self.node_property(id, prop)?;
        if previous.is_some() {
            self.state.node_do_remove_property(id, prop);
        }
        Ok(previous)
    }

    /// Effective labels of `id`.
    pub fn node_labels(&self, id: NodeId) -> Result<LabelSet> {
        self.with_view(id, |view| Ok(view.labels().clone()))
    }

    /// Effective value of `prop` on `id`.
    pub fn node_property(&self, id: NodeId, prop: PropId) -> Result<Option<PropValue>> {
        self.with_view(id, |view| view.property(prop))
    }

    /// Effective property values of `id`.
    pub fn node_properties(&self, id: NodeId) -> Result<PropertyMap> {
        self.with_view(id, |view| view.properties())
    }

    /// Locks `id` through the graph's lock service.
    pub fn lock_node(&self, id: NodeId, ty: LockType) -> Result<NodeLock> {
        self.with_view(id, |view| view.lock(ty))
    }

    /// Every visible node: committed ones in id order, then the ones this
    /// transaction created.
    pub fn nodes(&self) -> Result<Vec<NodeId>> {
        self.scan(|_| Ok(true))
    }

    /// Visible nodes carrying `label`.
    pub fn nodes_with_label(&self, label: LabelId) -> Result<Vec<NodeId>> {
        self.scan(|view| Ok(view.has_label(label)))
    }

    /// Visible nodes with `label` whose `prop` equals `value`.
    ///
    /// Uses the index on `(label, prop)` when it admits `value`, rechecking its
    /// committed hits and this transaction's own nodes against the merged
    /// view; otherwise scans.
    pub fn find_nodes(
        &self,
        label: LabelId,
        prop: PropId,
        value: &PropValue,
    ) -> Result<Vec<NodeId>> {
        let hits = {
            let indexes = self.graph.index_store().read();
            match indexes.get(label, prop) {
                Some(def) if def.admits(value) => Some(indexes.lookup(label, prop, value)?),
                _ => None,
            }
        };
        let matches = |view: &NodeView<'_>| -> Result<bool> {
            Ok(view.has_label(label) && view.property(prop)?.as_ref() == Some(value))
        };
        let Some(hits) = hits else {
            return self.scan(matches);
        };
        let mut candidates: BTreeSet<NodeId> = hits.into_iter().collect();
        candidates.extend(self.state.touched_nodes());
        let mut visible = Vec::with_capacity(candidates.len());
        for id in candidates {
            if self.exists(id)? {
                visible.push(id);
            }
        }
        let mut cursor = self.graph.cursor();
        cursor.init(FetchProgression::new(visible), &self.state);
        let mut out = Vec::new();
        while cursor.advance()? {
            let view = cursor.current_view()?;
            if matches(&view)? {
                out.push(view.id());
            }
        }
        Ok(out)
    }

    /// Makes the transaction's changes durable and updates the indexes.
    ///
    /// A uniqueness violation or an inconsistent diff aborts the commit and
    /// leaves both the store and the indexes untouched.
    pub fn commit(mut self) -> Result<()> {
        if !self.state.has_changes() {
            self.finished = true;
            debug!(tx = self.id, "graph.tx.commit.empty");
            return Ok(());
        }
        let graph = self.graph;
        let _commit = graph.commit_lock().lock();
        if graph.options().validate_diffs {
            self.state.validate()?;
        }
        let touched = self.state.touched_nodes();
        let mut indexes = graph.index_store().write();
        let defs = indexes.defs();
        let mut updates: Vec<IndexUpdate> = Vec::new();
        let mut writes = Vec::new();
        for id in &touched {
            let before = graph.committed_projection(*id)?;
            let after = self.merged_projection(*id)?;
            updates.extend(NodeUpdates::new(*id, before, after.clone()).for_indexes(&defs)?);
            self.record_writes(*id, after, &mut writes)?;
        }
        indexes.check(&updates)?;
        graph.store().apply(writes)?;
        indexes.apply(&updates);
        graph.record_commit(&updates);
        self.finished = true;
        info!(
            tx = self.id,
            nodes = touched.len(),
            index_updates = updates.len(),
            "graph.tx.committed"
        );
        Ok(())
    }

    /// Discards the transaction's changes.
    pub fn rollback(mut self) {
        self.finished = true;
        debug!(tx = self.id, "graph.tx.rolled_back");
    }

    fn require(&self, id: NodeId) -> Result<()> {
        if self.exists(id)? {
            Ok(())
        } else {
            Err(PenumbraError::NotFound)
        }
    }

    fn with_view<T>(&self, id: NodeId, f: impl FnOnce(&NodeView<'_>) -> Result<T>) -> Result<T> {
        self.require(id)?;
        let mut cursor = self.graph.cursor();
        cursor.init(FetchProgression::single(id), &self.state);
        if !cursor.advance()? {
            return Err(PenumbraError::NotFound);
        }
        let view = cursor.current_view()?;
        f(&view)
    }

    fn scan(&self, mut keep: impl FnMut(&NodeView<'_>) -> Result<bool>) -> Result<Vec<NodeId>> {
        let progression = ScanProgression::new(self.graph.store().as_ref())?;
        let mut cursor = self.graph.cursor();
        cursor.init(progression, &self.state);
        let mut out = Vec::new();
        while cursor.advance()? {
            let view = cursor.current_view()?;
            if keep(&view)? {
                out.push(view.id());
            }
        }
        Ok(out)
    }

    fn merged_projection(&self, id: NodeId) -> Result<Option<NodeProjection>> {
        if !self.exists(id)? {
            return Ok(None);
        }
        self.with_view(id, |view| {
            Ok(Some(NodeProjection {
                labels: view.labels().clone(),
                props: view.properties()?,
            }))
        })
    }

    fn record_writes(
        &self,
        id: NodeId,
        after: Option<NodeProjection>,
        writes: &mut Vec<RecordWrite>,
    ) -> Result<()> {
        let store = self.graph.store();
        let committed = store.lookup(id)?;
        let Some(after) = after else {
            if let Some(record) = committed {
                writes.push(RecordWrite::RemoveNode(id));
                writes.push(RecordWrite::FreeProperties(record.next_prop));
            }
            return Ok(());
        };
        let mut record = committed.unwrap_or_else(|| {
            let mut record = NodeRecord::new(id);
            record.in_use = true;
            record
        });
        let props_changed = self
            .state
            .property_diff(id)
            .is_some_and(|diff| !diff.is_empty());
        if props_changed {
            writes.push(RecordWrite::FreeProperties(record.next_prop));
            record.next_prop = if after.props.is_empty() {
                RecordPtr::NONE
            } else {
                let ptr = store.allocate_prop_ptr();
                writes.push(RecordWrite::PutProperties {
                    ptr,
                    owner: id,
                    values: after.props,
                });
                ptr
            };
        }
        record.labels = after.labels;
        writes.push(RecordWrite::PutNode(record));
        Ok(())
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if !self.finished {
            debug!(tx = self.id, "graph.tx.rolled_back");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn created_node_is_visible_only_after_commit() -> Result<()> {
        let graph = Graph::default();
        let mut tx = graph.begin();
        let id = tx.create_node()?;
        assert!(tx.add_label(id, LabelId(2))?);
        assert!(!tx.add_label(id, LabelId(2))?);
        assert_eq!(tx.nodes()?, vec![id]);

        let other = graph.begin();
        assert!(other.nodes()?.is_empty());
        drop(other);

        tx.commit()?;
        let reader = graph.begin();
        assert_eq!(reader.node_labels(id)?.as_slice(), &[LabelId(2)]);
        Ok(())
    }

    #[test]
    fn unknown_node_is_not_found() {
        let graph = Graph::default();
        let mut tx = graph.begin();
        assert!(matches!(
            tx.add_label(NodeId(42), LabelId(1)),
            Err(PenumbraError::NotFound)
        ));
    }
}

//! In-memory graph engine wiring the store, cursors and indexes together.
//!
//! A [`Graph`] owns the committed node store and the index postings.
//! Mutations happen inside a [`Transaction`], whose reads go through node
//! cursors merging the committed records with the transaction's own diff.

mod transaction;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::info;

use crate::cursor::{NodeCursor, NodeCursorPool, ScanProgression};
use crate::index::{IndexDef, IndexStore, IndexUpdate, NodeProjection, NodeUpdates};
use crate::storage::{GraphOptions, MemNodeStore, NodeStore, PropValue, ViewMetrics};
use crate::txstate::EmptyTxState;
use crate::types::{LabelId, NodeId, PropId, Result};

pub use transaction::Transaction;

/// Graph engine handle.
pub struct Graph {
    store: Arc<MemNodeStore>,
    indexes: RwLock<IndexStore>,
    pool: NodeCursorPool,
    options: GraphOptions,
    commit_lock: Mutex<()>,
    next_tx: AtomicU64,
}

impl Graph {
    /// Opens an empty graph.
    pub fn open(options: GraphOptions) -> Self {
        Self::with_store(Arc::new(MemNodeStore::new()), options)
    }

    /// Opens a graph over an existing store.
    pub fn with_store(store: Arc<MemNodeStore>, options: GraphOptions) -> Self {
        info!(
            validate_diffs = options.validate_diffs,
            cursor_pool_size = options.cursor_pool_size,
            nodes = store.node_count(),
            "graph.open"
        );
        Self {
            store,
            indexes: RwLock::new(IndexStore::new()),
            pool: NodeCursorPool::new(options.cursor_pool_size),
            options,
            commit_lock: Mutex::new(()),
            next_tx: AtomicU64::new(1),
        }
    }

    /// Committed node store.
    pub fn store(&self) -> &Arc<MemNodeStore> {
        &self.store
    }

    /// Options the graph was opened with.
    pub fn options(&self) -> &GraphOptions {
        &self.options
    }

    /// Pool recycling cursor buffers.
    pub fn cursor_pool(&self) -> &NodeCursorPool {
        &self.pool
    }

    /// Metrics sink.
    pub fn metrics(&self) -> &Arc<dyn ViewMetrics> {
        &self.options.metrics
    }

    /// Starts a transaction.
    pub fn begin(&self) -> Transaction<'_> {
        let id = self.next_tx.fetch_add(1, Ordering::Relaxed);
        Transaction::new(self, id)
    }

    /// Registers an index and back-fills it from committed nodes.
    ///
    /// Creating an identical index again is a no-op. A unique index whose
    /// back-fill finds two holders of one value is not created.
    pub fn create_index(&self, def: IndexDef) -> Result<()> {
        let _commit = self.commit_lock.lock();
        let mut indexes = self.indexes.write();
        if !indexes.create(def)? {
            return Ok(());
        }
        let mut updates = Vec::new();
        for id in self.store.scan_ids()? {
            let projection = self.committed_projection(id)?;
            updates.extend(NodeUpdates::new(id, None, projection).for_indexes([&def])?);
        }
        if let Err(err) = indexes.check(&updates) {
            indexes.drop_index(def.label, def.prop);
            return Err(err);
        }
        indexes.apply(&updates);
        info!(
            label = def.label.0,
            prop = def.prop.0,
            unique = def.unique,
            entries = updates.len(),
            "graph.index.backfilled"
        );
        Ok(())
    }

    /// Removes an index. Returns whether it existed.
    pub fn drop_index(&self, label: LabelId, prop: PropId) -> bool {
        let _commit = self.commit_lock.lock();
        self.indexes.write().drop_index(label, prop)
    }

    /// Registered index definitions.
    pub fn indexes(&self) -> Vec<IndexDef> {
        self.indexes.read().defs()
    }

    /// Committed nodes with `label` whose `prop` equals `value`.
    ///
    /// Uses the index on `(label, prop)` when it admits `value`; otherwise
    /// scans.
    pub fn find_nodes(&self, label: LabelId, prop: PropId, value: &PropValue) -> Result<Vec<NodeId>> {
        {
            let indexes = self.indexes.read();
            if indexes.get(label, prop).is_some_and(|def| def.admits(value)) {
                return indexes.lookup(label, prop, value);
            }
        }
        let empty = EmptyTxState;
        let progression = ScanProgression::new(self.store.as_ref())?;
        let mut cursor = self.cursor();
        cursor.init(progression, &empty);
        let mut out = Vec::new();
        while cursor.advance()? {
            let view = cursor.current_view()?;
            if view.has_label(label) && view.property(prop)?.as_ref() == Some(value) {
                out.push(view.id());
            }
        }
        Ok(out)
    }

    pub(crate) fn cursor<'a>(&self) -> NodeCursor<'a> {
        let store: Arc<dyn NodeStore> = self.store.clone();
        self.pool.cursor(
            store,
            Arc::clone(&self.options.lock_service),
            Arc::clone(&self.options.metrics),
        )
    }

    pub(crate) fn committed_projection(&self, id: NodeId) -> Result<Option<NodeProjection>> {
        let Some(record) = self.store.lookup(id)? else {
            return Ok(None);
        };
        Ok(Some(NodeProjection {
            props: self.store.property_chain(record.next_prop)?,
            labels: record.labels,
        }))
    }

    pub(crate) fn commit_lock(&self) -> &Mutex<()> {
        &self.commit_lock
    }

    pub(crate) fn index_store(&self) -> &RwLock<IndexStore> {
        &self.indexes
    }

    pub(crate) fn record_commit(&self, updates: &[IndexUpdate]) {
        self.options.metrics.committed(updates.len());
    }
}

impl Default for Graph {
    fn default() -> Self {
        Self::open(GraphOptions::default())
    }
}

use std::fmt;
use std::mem;
use std::sync::Arc;

use tracing::{trace, warn};

use crate::storage::{default_metrics, NodeStore, ViewMetrics};
use crate::txstate::ReadableTxState;
use crate::types::{NodeId, PenumbraError, Result};

use super::lock::{LockService, NoLockService};
use super::pool::CursorBuffers;
use super::progression::{Mode, Progression};
use super::view::NodeView;

/// Callback invoked with the cursor's buffers when it closes.
pub type ReleaseFn<'a> = Box<dyn FnMut(CursorBuffers) + 'a>;

/// Supplies fresh buffers each time a closed or new cursor is initialized.
pub type AcquireFn<'a> = Box<dyn FnMut() -> CursorBuffers + 'a>;

/// Lifecycle state of a [`NodeCursor`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CursorState {
    /// Never initialized.
    Uninitialized,
    /// Initialized, no view yet.
    Ready,
    /// A view is available.
    Advanced,
    /// The progression and the appended created ids are used up.
    Exhausted,
    /// Closed; only a fresh `init` makes the cursor usable again.
    Closed,
}

enum Phase<'a> {
    Progression,
    Appending(Box<dyn Iterator<Item = NodeId> + 'a>),
}

/// Reusable cursor merging durable node records with a transaction diff.
///
/// Ids come from a [`Progression`]. Deleted ids are skipped. Ids created by
/// the transaction are synthesized from the diff; in APPEND mode they are
/// surfaced after the progression runs out, in ascending id order, whatever
/// the progression itself yields for them.
pub struct NodeCursor<'a> {
    store: Arc<dyn NodeStore>,
    locks: Arc<dyn LockService>,
    metrics: Arc<dyn ViewMetrics>,
    acquire: Option<AcquireFn<'a>>,
    release: ReleaseFn<'a>,
    buffers: CursorBuffers,
    progression: Option<Box<dyn Progression + 'a>>,
    tx: Option<&'a dyn ReadableTxState>,
    phase: Phase<'a>,
    created: bool,
    state: CursorState,
}

impl<'a> NodeCursor<'a> {
    /// Creates a cursor that hands its buffers to `release` on close.
    pub fn new(
        store: Arc<dyn NodeStore>,
        locks: Arc<dyn LockService>,
        metrics: Arc<dyn ViewMetrics>,
        release: ReleaseFn<'a>,
    ) -> Self {
        Self::build(store, locks, metrics, None, release)
    }

    /// Creates a cursor that takes its buffers from `acquire` in
    /// [`init`](Self::init) and hands them to `release` on close.
    ///
    /// Nothing is acquired until the cursor is initialized, so dropping a
    /// cursor that never ran holds nothing back from the source.
    pub fn pooled(
        store: Arc<dyn NodeStore>,
        locks: Arc<dyn LockService>,
        metrics: Arc<dyn ViewMetrics>,
        acquire: AcquireFn<'a>,
        release: ReleaseFn<'a>,
    ) -> Self {
        Self::build(store, locks, metrics, Some(acquire), release)
    }

    fn build(
        store: Arc<dyn NodeStore>,
        locks: Arc<dyn LockService>,
        metrics: Arc<dyn ViewMetrics>,
        acquire: Option<AcquireFn<'a>>,
        release: ReleaseFn<'a>,
    ) -> Self {
        Self {
            store,
            locks,
            metrics,
            acquire,
            release,
            buffers: CursorBuffers::default(),
            progression: None,
            tx: None,
            phase: Phase::Progression,
            created: false,
            state: CursorState::Uninitialized,
        }
    }

    /// Creates a standalone cursor with no locking, metrics or release hook.
    pub fn unpooled(store: Arc<dyn NodeStore>) -> Self {
        Self::new(
            store,
            Arc::new(NoLockService),
            default_metrics(),
            Box::new(|_| {}),
        )
    }

    /// Current lifecycle state.
    pub fn state(&self) -> CursorState {
        self.state
    }

    /// Starts a new iteration, discarding everything from the previous one.
    pub fn init<P>(&mut self, progression: P, tx: &'a dyn ReadableTxState)
    where
        P: Progression + 'a,
    {
        let mode = progression.mode();
        if matches!(
            self.state,
            CursorState::Uninitialized | CursorState::Closed
        ) {
            if let Some(acquire) = self.acquire.as_mut() {
                self.buffers = acquire();
            }
        }
        self.progression = Some(Box::new(progression));
        self.tx = Some(tx);
        self.phase = Phase::Progression;
        self.created = false;
        self.buffers.reset();
        self.state = CursorState::Ready;
        trace!(?mode, "cursor.node.init");
    }

    /// Moves to the next visible node.
    ///
    /// Returns `Ok(false)` once exhausted and on a closed cursor. Faults
    /// leave the cursor exhausted.
    pub fn advance(&mut self) -> Result<bool> {
        match self.state {
            CursorState::Uninitialized => {
                return Err(PenumbraError::InvalidCursorState(
                    "advance on uninitialized cursor",
                ))
            }
            CursorState::Exhausted | CursorState::Closed => return Ok(false),
            CursorState::Ready | CursorState::Advanced => {}
        }
        match self.step() {
            Ok(true) => {
                self.state = CursorState::Advanced;
                Ok(true)
            }
            Ok(false) => {
                self.state = CursorState::Exhausted;
                trace!("cursor.node.exhausted");
                Ok(false)
            }
            Err(err) => {
                self.state = CursorState::Exhausted;
                Err(err)
            }
        }
    }

    fn step(&mut self) -> Result<bool> {
        let Some(tx) = self.tx else {
            return Ok(false);
        };
        loop {
            let Some((id, appended)) = self.next_candidate(tx) else {
                return Ok(false);
            };
            if tx.is_deleted(id) {
                self.metrics.deleted_skipped();
                trace!(node = id.0, "cursor.node.skip_deleted");
                continue;
            }
            if tx.is_created(id) {
                if !appended && self.mode() == Some(Mode::Append) {
                    continue;
                }
                self.load_created(tx, id)?;
            } else {
                self.load_persisted(tx, id)?;
            }
            return Ok(true);
        }
    }

    fn mode(&self) -> Option<Mode> {
        self.progression.as_ref().map(|p| p.mode())
    }

    fn next_candidate(&mut self, tx: &'a dyn ReadableTxState) -> Option<(NodeId, bool)> {
        loop {
            if let Phase::Appending(created) = &mut self.phase {
                return created.next().map(|id| (id, true));
            }
            let progression = self.progression.as_mut()?;
            if let Some(id) = progression.next_id() {
                return Some((id, false));
            }
            if progression.mode() != Mode::Append {
                return None;
            }
            trace!("cursor.node.append_created");
            self.phase = Phase::Appending(tx.created_nodes());
        }
    }

    fn load_created(&mut self, tx: &dyn ReadableTxState, id: NodeId) -> Result<()> {
        self.metrics.record_loaded();
        if self.store.load(id, &mut self.buffers.record)? {
            return Err(self.fault(id, "created node already has a durable record"));
        }
        let buffers = &mut self.buffers;
        buffers.record.clear(id);
        buffers.record.in_use = true;
        buffers.labels.clear();
        tx.augment_labels(&mut buffers.labels, id);
        self.created = true;
        self.metrics.node_surfaced("tx");
        Ok(())
    }

    fn load_persisted(&mut self, tx: &dyn ReadableTxState, id: NodeId) -> Result<()> {
        self.metrics.record_loaded();
        if !self.store.load(id, &mut self.buffers.record)? {
            return Err(self.fault(id, "no durable record for pre-existing node"));
        }
        let buffers = &mut self.buffers;
        buffers.labels.copy_from(&buffers.record.labels);
        tx.augment_labels(&mut buffers.labels, id);
        self.created = false;
        self.metrics.node_surfaced("disk");
        Ok(())
    }

    fn fault(&self, id: NodeId, reason: &'static str) -> PenumbraError {
        warn!(node = id.0, reason, "cursor.node.inconsistent");
        PenumbraError::Inconsistent { node: id, reason }
    }

    /// The node the cursor is positioned on.
    pub fn current_view(&self) -> Result<NodeView<'_>> {
        let reason = match self.state {
            CursorState::Advanced => {
                let tx = self.tx.ok_or(PenumbraError::InvalidCursorState(
                    "cursor has no transaction state",
                ))?;
                let id = self.buffers.record.id;
                return Ok(NodeView {
                    record: &self.buffers.record,
                    labels: &self.buffers.labels,
                    created: self.created,
                    props: tx.property_diff(id),
                    store: self.store.as_ref(),
                    locks: &self.locks,
                });
            }
            CursorState::Uninitialized => "cursor not initialized",
            CursorState::Ready => "cursor not advanced",
            CursorState::Exhausted => "cursor exhausted",
            CursorState::Closed => "cursor closed",
        };
        Err(PenumbraError::InvalidCursorState(reason))
    }

    /// Ends the current iteration and hands the buffers to the release
    /// callback. Closing again, or closing a cursor that was never
    /// initialized, does nothing.
    pub fn close(&mut self) {
        if matches!(
            self.state,
            CursorState::Uninitialized | CursorState::Closed
        ) {
            return;
        }
        self.progression = None;
        self.tx = None;
        self.phase = Phase::Progression;
        self.created = false;
        self.state = CursorState::Closed;
        let buffers = mem::take(&mut self.buffers);
        (self.release)(buffers);
        self.metrics.cursor_released();
        trace!("cursor.node.close");
    }
}

impl fmt::Debug for NodeCursor<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeCursor")
            .field("state", &self.state)
            .field("mode", &self.mode())
            .finish()
    }
}

impl Drop for NodeCursor<'_> {
    fn drop(&mut self) {
        self.close();
    }
}

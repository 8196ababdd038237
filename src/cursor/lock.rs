use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tracing::trace;

use crate::types::{NodeId, PenumbraError, Result};

/// Kind of node lock.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum LockType {
    /// Shared with other readers.
    Read,
    /// Excludes every other holder.
    Write,
}

/// Lock manager consulted through node views.
///
/// Cursors never take locks on their own; they only hand the service to
/// callers through [`crate::cursor::NodeView::lock`].
pub trait LockService: Send + Sync {
    /// Acquires `ty` on `node`, failing instead of blocking on conflict.
    fn acquire(&self, node: NodeId, ty: LockType) -> Result<()>;

    /// Releases a lock previously granted by [`LockService::acquire`].
    fn release(&self, node: NodeId, ty: LockType);
}

/// Lock service granting every request.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoLockService;

impl LockService for NoLockService {
    fn acquire(&self, _node: NodeId, _ty: LockType) -> Result<()> {
        Ok(())
    }

    fn release(&self, _node: NodeId, _ty: LockType) {}
}

#[derive(Default)]
struct Holders {
    readers: usize,
    writer: bool,
}

/// Table-backed lock service with per-node reader/writer state.
#[derive(Default)]
pub struct TableLockService {
    table: Mutex<FxHashMap<NodeId, Holders>>,
    acquired: AtomicU64,
    released: AtomicU64,
}

impl TableLockService {
    /// Creates an empty lock table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Locks granted so far.
    pub fn acquired(&self) -> u64 {
        self.acquired.load(Ordering::Relaxed)
    }

    /// Locks released so far.
    pub fn released(&self) -> u64 {
        self.released.load(Ordering::Relaxed)
    }

    /// Number of nodes currently holding any lock.
    pub fn held(&self) -> usize {
        self.table.lock().len()
    }
}

impl LockService for TableLockService {
    fn acquire(&self, node: NodeId, ty: LockType) -> Result<()> {
        let mut table = self.table.lock();
        let holders = table.entry(node).or_default();
        match ty {
            LockType::Read if holders.writer => {
                return Err(PenumbraError::Invalid("node is write locked"));
            }
            LockType::Read => holders.readers += 1,
            LockType::Write if holders.writer || holders.readers > 0 => {
                return Err(PenumbraError::Invalid("node is locked"));
            }
            LockType::Write => holders.writer = true,
        }
        self.acquired.fetch_add(1, Ordering::Relaxed);
        trace!(node = node.0, ?ty, "lock.acquired");
        Ok(())
    }

    fn release(&self, node: NodeId, ty: LockType) {
        let mut table = self.table.lock();
        let Some(holders) = table.get_mut(&node) else {
            return;
        };
        match ty {
            LockType::Read => holders.readers = holders.readers.saturating_sub(1),
            LockType::Write => holders.writer = false,
        }
        if holders.readers == 0 && !holders.writer {
            table.remove(&node);
        }
        self.released.fetch_add(1, Ordering::Relaxed);
        trace!(node = node.0, ?ty, "lock.released");
    }
}

/// A granted node lock, released on drop.
pub struct NodeLock {
    service: Arc<dyn LockService>,
    node: NodeId,
    ty: LockType,
}

impl NodeLock {
    pub(crate) fn acquire(
        service: &Arc<dyn LockService>,
        node: NodeId,
        ty: LockType,
    ) -> Result<Self> {
        service.acquire(node, ty)?;
        Ok(Self {
            service: Arc::clone(service),
            node,
            ty,
        })
    }

    /// Locked node.
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// Lock kind.
    pub fn lock_type(&self) -> LockType {
        self.ty
    }
}

impl fmt::Debug for NodeLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeLock")
            .field("node", &self.node)
            .field("ty", &self.ty)
            .finish()
    }
}

impl Drop for NodeLock {
    fn drop(&mut self) {
        self.service.release(self.node, self.ty);
    }
}

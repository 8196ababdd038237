use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::storage::{LabelSet, NodeRecord, NodeStore, ViewMetrics};

use super::lock::LockService;
use super::node_cursor::{AcquireFn, NodeCursor, ReleaseFn};

/// Reusable per-cursor allocations, handed to the release callback on close.
#[derive(Debug, Default)]
pub struct CursorBuffers {
    pub(crate) record: NodeRecord,
    pub(crate) labels: LabelSet,
}

impl CursorBuffers {
    pub(crate) fn reset(&mut self) {
        self.record.clear(self.record.id);
        self.labels.clear();
    }
}

struct PoolInner {
    free: Mutex<Vec<CursorBuffers>>,
    capacity: usize,
    acquired: AtomicU64,
    released: AtomicU64,
}

/// Bounded pool of cursor buffers recycled through cursor release callbacks.
#[derive(Clone)]
pub struct NodeCursorPool {
    inner: Arc<PoolInner>,
}

impl NodeCursorPool {
    /// Creates a pool keeping at most `capacity` idle buffer sets.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                free: Mutex::new(Vec::with_capacity(capacity)),
                capacity,
                acquired: AtomicU64::new(0),
                released: AtomicU64::new(0),
            }),
        }
    }

    /// Takes an idle buffer set, or a fresh one when the pool is empty.
    pub fn acquire(&self) -> CursorBuffers {
        self.inner.acquired.fetch_add(1, Ordering::Relaxed);
        self.inner.free.lock().pop().unwrap_or_default()
    }

    /// Returns a buffer set; dropped when the pool is full.
    pub fn release(&self, mut buffers: CursorBuffers) {
        self.inner.released.fetch_add(1, Ordering::Relaxed);
        let mut free = self.inner.free.lock();
        if free.len() < self.inner.capacity {
            buffers.reset();
            free.push(buffers);
        }
    }

    /// Callback taking buffers from this pool.
    pub fn acquirer<'a>(&self) -> AcquireFn<'a> {
        let pool = self.clone();
        Box::new(move || pool.acquire())
    }

    /// Release callback feeding buffers back into this pool.
    pub fn releaser<'a>(&self) -> ReleaseFn<'a> {
        let pool = self.clone();
        Box::new(move |buffers| pool.release(buffers))
    }

    /// Builds a cursor that takes pooled buffers on `init` and returns them
    /// on close.
    pub fn cursor<'a>(
        &self,
        store: Arc<dyn NodeStore>,
        locks: Arc<dyn LockService>,
        metrics: Arc<dyn ViewMetrics>,
    ) -> NodeCursor<'a> {
        NodeCursor::pooled(store, locks, metrics, self.acquirer(), self.releaser())
    }

    /// Idle buffer sets.
    pub fn idle(&self) -> usize {
        self.inner.free.lock().len()
    }

    /// Buffer sets handed out so far.
    pub fn acquired(&self) -> u64 {
        self.inner.acquired.load(Ordering::Relaxed)
    }

    /// Buffer sets returned so far.
    pub fn released(&self) -> u64 {
        self.inner.released.load(Ordering::Relaxed)
    }
}

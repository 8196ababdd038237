use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Trait for tracking read-view and commit activity.
///
/// Implementations collect statistics about record loads, merged views
/// surfaced by cursors and the index work done at commit. The information is
/// intended for monitoring and for asserting cursor behaviour in tests.
pub trait ViewMetrics: Send + Sync {
    /// Records a durable record loaded by a cursor.
    fn record_loaded(&self);

    /// Records a merged node view surfaced by a cursor.
    ///
    /// # Parameters
    /// * `origin` - `"disk"` for persisted nodes, `"tx"` for nodes created in
    ///   the current transaction.
    fn node_surfaced(&self, origin: &'static str);

    /// Records an id skipped because the transaction deleted it.
    fn deleted_skipped(&self);

    /// Records a cursor close that released its buffers.
    fn cursor_released(&self);

    /// Records a committed transaction and the index updates it produced.
    fn committed(&self, index_updates: usize);
}

/// A no-op implementation of [`ViewMetrics`] that discards all recorded metrics.
#[derive(Default)]
pub struct NoopMetrics;

impl ViewMetrics for NoopMetrics {
    fn record_loaded(&self) {}
    fn node_surfaced(&self, _origin: &'static str) {}
    fn deleted_skipped(&self) {}
    fn cursor_released(&self) {}
    fn committed(&self, _index_updates: usize) {}
}

/// A thread-safe counter-based implementation of [`ViewMetrics`].
#[derive(Default)]
pub struct CounterMetrics {
    /// Durable records loaded.
    pub records_loaded: AtomicU64,

    /// Persisted nodes surfaced by cursors.
    pub disk_nodes_surfaced: AtomicU64,

    /// Transaction-created nodes surfaced by cursors.
    pub tx_nodes_surfaced: AtomicU64,

    /// Ids skipped because they were deleted in the transaction.
    pub deleted_skipped: AtomicU64,

    /// Cursor closes that released buffers.
    pub cursors_released: AtomicU64,

    /// Committed transactions.
    pub commits: AtomicU64,

    /// Index entries added, removed or changed by commits.
    pub index_updates: AtomicU64,
}

impl ViewMetrics for CounterMetrics {
    fn record_loaded(&self) {
        self.records_loaded.fetch_add(1, Ordering::Relaxed);
    }

    fn node_surfaced(&self, origin: &'static str) {
        match origin {
            "disk" => {
                self.disk_nodes_surfaced.fetch_add(1, Ordering::Relaxed);
            }
            "tx" => {
                self.tx_nodes_surfaced.fetch_add(1, Ordering::Relaxed);
            }
            _ => {}
        }
    }

    fn deleted_skipped(&self) {
        self.deleted_skipped.fetch_add(1, Ordering::Relaxed);
    }

    fn cursor_released(&self) {
        self.cursors_released.fetch_add(1, Ordering::Relaxed);
    }

    fn committed(&self, index_updates: usize) {
        self.commits.fetch_add(1, Ordering::Relaxed);
        self.index_updates
            .fetch_add(index_updates as u64, Ordering::Relaxed);
    }
}

/// Returns the default metrics implementation wrapped in an [`Arc`].
///
/// The default implementation is [`NoopMetrics`].
pub fn default_metrics() -> Arc<dyn ViewMetrics> {
    Arc::new(NoopMetrics)
}

//! Node cursors merging durable records with transaction diffs.
//!
//! A [`NodeCursor`] walks the ids handed out by a [`Progression`] and
//! publishes a [`NodeView`] per visible node. Cursors are reusable: `init`
//! starts a fresh iteration and `close` hands the cursor's buffers to a
//! release callback, which [`NodeCursorPool`] uses for recycling.

mod lock;
mod node_cursor;
mod pool;
mod progression;
mod view;

pub use lock::{LockService, LockType, NoLockService, NodeLock, TableLockService};
pub use node_cursor::{AcquireFn, CursorState, NodeCursor, ReleaseFn};
pub use pool::{CursorBuffers, NodeCursorPool};
pub use progression::{FetchProgression, Mode, Progression, ScanProgression};
pub use view::NodeView;

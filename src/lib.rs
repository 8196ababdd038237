//! Transactional node views for a graph storage engine.
//!
//! A transaction's uncommitted changes live in a [`txstate::TxState`].
//! [`cursor::NodeCursor`] merges them with durable node records so that
//! every read inside the transaction sees one consistent view per node, and
//! commits feed the same merged view into the property indexes.

#![warn(missing_docs)]

pub mod cursor;
pub mod graph;
pub mod index;
pub mod storage;
pub mod txstate;
pub mod types;

pub use cursor::{
    FetchProgression, Mode, NodeCursor, NodeCursorPool, NodeView, Progression, ScanProgression,
};
pub use graph::{Graph, Transaction};
pub use index::{IndexDef, TypeTag};
pub use storage::{GraphOptions, LabelSet, MemNodeStore, NodeRecord, NodeStore, PropValue};
pub use txstate::{EmptyTxState, ReadableTxState, TxState};
pub use types::{LabelId, NodeId, PenumbraError, PropId, RecordPtr, Result};

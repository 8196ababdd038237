//! Identifiers, record pointers and the crate-wide error type.

use std::fmt;

/// Identifier of a node in the node id-space.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct NodeId(pub u64);

/// Identifier of a label.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct LabelId(pub u32);

/// Identifier of a property key.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct PropId(pub u32);

/// Pointer to another record (property, relationship or relationship group),
/// or [`RecordPtr::NONE`].
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct RecordPtr(pub u64);

impl RecordPtr {
    /// Sentinel for "no such record".
    pub const NONE: RecordPtr = RecordPtr(u64::MAX);

    /// Returns true when this pointer is the [`RecordPtr::NONE`] sentinel.
    pub const fn is_none(self) -> bool {
        self.0 == u64::MAX
    }

    /// Returns the raw pointer, or `None` for the sentinel.
    pub const fn get(self) -> Option<u64> {
        if self.is_none() {
            None
        } else {
            Some(self.0)
        }
    }
}

impl Default for RecordPtr {
    fn default() -> Self {
        RecordPtr::NONE
    }
}

/// Errors raised by the storage, transaction and cursor layers.
#[derive(thiserror::Error, Debug)]
pub enum PenumbraError {
    /// Underlying I/O failure.
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),
    /// Encoded data failed validation.
    #[error("corruption: {0}")]
    Corruption(&'static str),
    /// Invalid argument or violated precondition.
    #[error("invalid argument: {0}")]
    Invalid(&'static str),
    /// Requested entity does not exist.
    #[error("not found")]
    NotFound,
    /// A cursor operation was attempted outside the state that allows it.
    #[error("invalid cursor state: {0}")]
    InvalidCursorState(&'static str),
    /// The durable store and the transaction diff disagree about a node.
    #[error("inconsistent node {node}: {reason}")]
    Inconsistent {
        /// Node the disagreement was detected on.
        node: NodeId,
        /// What disagreed.
        reason: &'static str,
    },
    /// A transaction diff violates its own invariants.
    #[error("contradictory transaction diff for node {node}: {reason}")]
    DiffContradiction {
        /// Node carrying the contradiction.
        node: NodeId,
        /// Which invariant is violated.
        reason: &'static str,
    },
    /// A uniqueness constraint would be violated by a commit.
    #[error("node {node} violates uniqueness of ({label}, {prop}); already owned by node {existing}")]
    ConstraintViolation {
        /// Constrained label.
        label: LabelId,
        /// Constrained property key.
        prop: PropId,
        /// Node already holding the value.
        existing: NodeId,
        /// Node that attempted to take the value.
        node: NodeId,
    },
    /// Options could not be loaded.
    #[error("config: {0}")]
    Config(String),
}

/// Result alias using [`PenumbraError`].
pub type Result<T> = std::result::Result<T, PenumbraError>;

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for LabelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for PropId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for RecordPtr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.get() {
            Some(raw) => write!(f, "{raw}"),
            None => write!(f, "none"),
        }
    }
}

impl From<u32> for LabelId {
    fn from(value: u32) -> Self {
        LabelId(value)
    }
}

impl From<LabelId> for u32 {
    fn from(value: LabelId) -> Self {
        value.0
    }
}

impl From<u32> for PropId {
    fn from(value: u32) -> Self {
        PropId(value)
    }
}

impl From<PropId> for u32 {
    fn from(value: PropId) -> Self {
        value.0
    }
}

impl From<u64> for NodeId {
    fn from(value: u64) -> Self {
        NodeId(value)
    }
}

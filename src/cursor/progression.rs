use std::collections::VecDeque;

use crate::storage::NodeStore;
use crate::types::{NodeId, Result};

/// Iteration discipline of a [`Progression`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Mode {
    /// Resolves a predetermined set of ids.
    Fetch,
    /// Open-ended forward scan that also surfaces transaction-created ids.
    Append,
}

/// Produces the ids a node cursor visits.
///
/// Ids come out strictly forward and never repeat within one
/// initialization. `None` means exhausted.
pub trait Progression {
    /// Next id to visit.
    fn next_id(&mut self) -> Option<NodeId>;

    /// Mode, fixed for the lifetime of the progression.
    fn mode(&self) -> Mode;
}

/// FETCH progression over a fixed, ordered list of ids.
#[derive(Clone, Debug, Default)]
pub struct FetchProgression {
    ids: VecDeque<NodeId>,
}

impl FetchProgression {
    /// Visits `ids` in order.
    pub fn new(ids: impl IntoIterator<Item = NodeId>) -> Self {
        Self {
            ids: ids.into_iter().collect(),
        }
    }

    /// Visits a single id.
    pub fn single(id: NodeId) -> Self {
        Self::new([id])
    }

    /// Ids not yet handed out.
    pub fn remaining(&self) -> usize {
        self.ids.len()
    }
}

impl Progression for FetchProgression {
    fn next_id(&mut self) -> Option<NodeId> {
        self.ids.pop_front()
    }

    fn mode(&self) -> Mode {
        Mode::Fetch
    }
}

/// APPEND progression over the live ids of a store.
///
/// The id list is a snapshot taken at construction; ids created by the
/// transaction are appended by the cursor, not by the progression.
#[derive(Clone, Debug)]
pub struct ScanProgression {
    ids: std::vec::IntoIter<NodeId>,
}

impl ScanProgression {
    /// Snapshots the live ids of `store`.
    pub fn new(store: &dyn NodeStore) -> Result<Self> {
        Ok(Self::from_ids(store.scan_ids()?))
    }

    /// Scans an explicit ascending id list.
    pub fn from_ids(ids: Vec<NodeId>) -> Self {
        Self {
            ids: ids.into_iter(),
        }
    }
}

impl Progression for ScanProgression {
    fn next_id(&mut self) -> Option<NodeId> {
        self.ids.next()
    }

    fn mode(&self) -> Mode {
        Mode::Append
    }
}

impl<P: Progression + ?Sized> Progression for Box<P> {
    fn next_id(&mut self) -> Option<NodeId> {
        (**self).next_id()
    }

    fn mode(&self) -> Mode {
        (**self).mode()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{LabelSet, MemNodeStore, NodeRecord};
    use crate::types::RecordPtr;

    #[test]
    fn fetch_yields_in_order_then_exhausts() {
        let mut progression = FetchProgression::new([NodeId(3), NodeId(1)]);
        assert_eq!(progression.mode(), Mode::Fetch);
        assert_eq!(progression.next_id(), Some(NodeId(3)));
        assert_eq!(progression.remaining(), 1);
        assert_eq!(progression.next_id(), Some(NodeId(1)));
        assert_eq!(progression.next_id(), None);
        assert_eq!(progression.next_id(), None);
    }

    #[test]
    fn empty_fetch_is_exhausted() {
        let mut progression = FetchProgression::default();
        assert_eq!(progression.next_id(), None);
    }

    #[test]
    fn scan_snapshots_live_ids() -> Result<()> {
        let store = MemNodeStore::new();
        for id in [4, 1, 2] {
            let mut record = NodeRecord::new(NodeId(id));
            record.initialize(true, RecordPtr::NONE, false, RecordPtr::NONE, &LabelSet::new());
            store.put_record(&record)?;
        }
        let mut scan = ScanProgression::new(&store)?;
        store.remove_record(NodeId(2));
        assert_eq!(scan.mode(), Mode::Append);
        let ids: Vec<_> = std::iter::from_fn(|| scan.next_id()).collect();
        assert_eq!(ids, vec![NodeId(1), NodeId(2), NodeId(4)]);
        Ok(())
    }
}

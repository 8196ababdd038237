use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use tracing::trace;

use crate::types::{NodeId, PenumbraError, PropId, RecordPtr, Result};

use super::node::{self, NodeRecord};
use super::types::PropValue;

/// Property values of one node, keyed by property id.
pub type PropertyMap = BTreeMap<PropId, PropValue>;

/// Read access to durable node records.
///
/// Implementations must tolerate concurrent lookups and never expose a
/// partially written record.
pub trait NodeStore: Send + Sync {
    /// Loads the live record for `id` into `record`.
    ///
    /// Returns `Ok(false)` when no live record exists for `id`; `record` is
    /// left cleared in that case.
    fn load(&self, id: NodeId, record: &mut NodeRecord) -> Result<bool>;

    /// Ids of every live record, ascending, as of the call.
    fn scan_ids(&self) -> Result<Vec<NodeId>>;

    /// One past the highest id ever allocated or written.
    fn high_id(&self) -> NodeId;

    /// Reads the property record referenced by a node's property pointer.
    fn property_chain(&self, ptr: RecordPtr) -> Result<PropertyMap>;

    /// Returns the live record for `id`, if any.
    fn lookup(&self, id: NodeId) -> Result<Option<NodeRecord>> {
        let mut record = NodeRecord::new(id);
        if self.load(id, &mut record)? {
            Ok(Some(record))
        } else {
            Ok(None)
        }
    }
}

/// A single write applied by [`MemNodeStore::apply`].
#[derive(Clone, Debug)]
pub enum RecordWrite {
    /// Inserts or replaces a node record.
    PutNode(NodeRecord),
    /// Removes a node record.
    RemoveNode(NodeId),
    /// Inserts or replaces a property record.
    PutProperties {
        /// Pointer the record is stored under.
        ptr: RecordPtr,
        /// Node owning the record.
        owner: NodeId,
        /// Property values.
        values: PropertyMap,
    },
    /// Frees a property record.
    FreeProperties(RecordPtr),
}

#[derive(Clone, Debug)]
struct PropertyRecord {
    owner: NodeId,
    values: PropertyMap,
}

enum EncodedWrite {
    PutNode(u64, Vec<u8>),
    RemoveNode(u64),
    PutProperties(u64, PropertyRecord),
    FreeProperties(u64),
}

/// In-memory node store holding encoded node rows and property records.
#[derive(Default)]
pub struct MemNodeStore {
    rows: RwLock<BTreeMap<u64, Vec<u8>>>,
    props: RwLock<FxHashMap<u64, PropertyRecord>>,
    next_node_id: AtomicU64,
    next_prop_id: AtomicU64,
}

impl MemNodeStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserves a fresh node id.
    pub fn allocate_node_id(&self) -> NodeId {
        NodeId(self.next_node_id.fetch_add(1, Ordering::SeqCst))
    }

    /// Reserves a fresh property record pointer.
    pub fn allocate_prop_ptr(&self) -> RecordPtr {
        RecordPtr(self.next_prop_id.fetch_add(1, Ordering::SeqCst))
    }

    /// Writes a single node record.
    pub fn put_record(&self, record: &NodeRecord) -> Result<()> {
        self.apply(vec![RecordWrite::PutNode(record.clone())])
    }

    /// Removes a node record, returning whether it existed.
    pub fn remove_record(&self, id: NodeId) -> bool {
        self.rows.write().remove(&id.0).is_some()
    }

    /// Returns the owner recorded on a property record.
    pub fn property_owner(&self, ptr: RecordPtr) -> Option<NodeId> {
        let raw = ptr.get()?;
        self.props.read().get(&raw).map(|record| record.owner)
    }

    /// Number of stored node rows.
    pub fn node_count(&self) -> usize {
        self.rows.read().len()
    }

    /// Applies `writes` atomically with respect to readers.
    ///
    /// Every write is validated and encoded before any lock is taken, so a
    /// failing write leaves the store untouched.
    pub fn apply(&self, writes: Vec<RecordWrite>) -> Result<()> {
        let mut encoded = Vec::with_capacity(writes.len());
        let mut max_node = None;
        let mut max_prop = None;
        for write in writes {
            match write {
                RecordWrite::PutNode(record) => {
                    if record.id.0 == u64::MAX {
                        return Err(PenumbraError::Invalid("node id reserved for sentinel"));
                    }
                    max_node = max_node.max(Some(record.id.0));
                    encoded.push(EncodedWrite::PutNode(record.id.0, node::encode(&record)?));
                }
                RecordWrite::RemoveNode(id) => encoded.push(EncodedWrite::RemoveNode(id.0)),
                RecordWrite::PutProperties { ptr, owner, values } => {
                    let Some(raw) = ptr.get() else {
                        return Err(PenumbraError::Invalid("property write without pointer"));
                    };
                    max_prop = max_prop.max(Some(raw));
                    encoded.push(EncodedWrite::PutProperties(
                        raw,
                        PropertyRecord { owner, values },
                    ));
                }
                RecordWrite::FreeProperties(ptr) => {
                    if let Some(raw) = ptr.get() {
                        encoded.push(EncodedWrite::FreeProperties(raw));
                    }
                }
            }
        }
        let mut rows = self.rows.write();
        let mut props = self.props.write();
        for write in encoded {
            match write {
                EncodedWrite::PutNode(id, bytes) => {
                    rows.insert(id, bytes);
                }
                EncodedWrite::RemoveNode(id) => {
                    rows.remove(&id);
                }
                EncodedWrite::PutProperties(ptr, record) => {
                    props.insert(ptr, record);
                }
                EncodedWrite::FreeProperties(ptr) => {
                    props.remove(&ptr);
                }
            }
        }
        if let Some(id) = max_node {
            self.next_node_id.fetch_max(id + 1, Ordering::SeqCst);
        }
        if let Some(ptr) = max_prop {
            self.next_prop_id.fetch_max(ptr + 1, Ordering::SeqCst);
        }
        Ok(())
    }
}

impl NodeStore for MemNodeStore {
    fn load(&self, id: NodeId, record: &mut NodeRecord) -> Result<bool> {
        let rows = self.rows.read();
        let Some(bytes) = rows.get(&id.0) else {
            record.clear(id);
            return Ok(false);
        };
        node::decode_into(id, bytes, record)?;
        if !record.in_use {
            trace!(node = id.0, "store.load.not_in_use");
            record.clear(id);
            return Ok(false);
        }
        Ok(true)
    }

    fn scan_ids(&self) -> Result<Vec<NodeId>> {
        let rows = self.rows.read();
        let mut ids = Vec::with_capacity(rows.len());
        let mut record = NodeRecord::default();
        for (id, bytes) in rows.iter() {
            node::decode_into(NodeId(*id), bytes, &mut record)?;
            if record.in_use {
                ids.push(NodeId(*id));
            }
        }
        Ok(ids)
    }

    fn high_id(&self) -> NodeId {
        NodeId(self.next_node_id.load(Ordering::SeqCst))
    }

    fn property_chain(&self, ptr: RecordPtr) -> Result<PropertyMap> {
        let Some(raw) = ptr.get() else {
            return Ok(PropertyMap::new());
        };
        let props = self.props.read();
        match props.get(&raw) {
            Some(record) => Ok(record.values.clone()),
            None => Err(PenumbraError::Corruption("dangling property pointer")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::LabelSet;
    use crate::types::LabelId;

    fn live(id: u64, labels: &[u32]) -> NodeRecord {
        let mut record = NodeRecord::new(NodeId(id));
        let labels: LabelSet = labels.iter().map(|l| LabelId(*l)).collect();
        record.initialize(true, RecordPtr::NONE, false, RecordPtr(id + 100), &labels);
        record
    }

    #[test]
    fn lookup_distinguishes_absent_and_unused() -> Result<()> {
        let store = MemNodeStore::new();
        store.put_record(&live(2, &[1]))?;
        let mut unused = live(3, &[]);
        unused.in_use = false;
        store.put_record(&unused)?;

        assert_eq!(store.lookup(NodeId(2))?, Some(live(2, &[1])));
        assert!(store.lookup(NodeId(3))?.is_none());
        assert!(store.lookup(NodeId(9))?.is_none());
        assert_eq!(store.scan_ids()?, vec![NodeId(2)]);
        assert_eq!(store.high_id(), NodeId(4));
        Ok(())
    }

    #[test]
    fn allocation_never_collides_with_written_ids() -> Result<()> {
        let store = MemNodeStore::new();
        store.put_record(&live(5, &[]))?;
        assert_eq!(store.allocate_node_id(), NodeId(6));
        Ok(())
    }

    #[test]
    fn apply_is_all_or_nothing() {
        let store = MemNodeStore::new();
        let too_many: LabelSet = (0..300).map(LabelId).collect();
        let mut bad = live(1, &[]);
        bad.labels = too_many;
        let result = store.apply(vec![RecordWrite::PutNode(live(0, &[])), RecordWrite::PutNode(bad)]);
        assert!(matches!(result, Err(PenumbraError::Invalid(_))));
        assert_eq!(store.node_count(), 0);
    }

    #[test]
    fn property_records_roundtrip() -> Result<()> {
        let store = MemNodeStore::new();
        let ptr = store.allocate_prop_ptr();
        let mut values = PropertyMap::new();
        values.insert(PropId(1), PropValue::from("value1"));
        store.apply(vec![RecordWrite::PutProperties {
            ptr,
            owner: NodeId(4),
            values: values.clone(),
        }])?;
        assert_eq!(store.property_chain(ptr)?, values);
        assert_eq!(store.property_owner(ptr), Some(NodeId(4)));
        assert!(store.property_chain(RecordPtr::NONE)?.is_empty());
        store.apply(vec![RecordWrite::FreeProperties(ptr)])?;
        assert!(matches!(
            store.property_chain(ptr),
            Err(PenumbraError::Corruption(_))
        ));
        Ok(())
    }
}

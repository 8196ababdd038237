use crate::types::{LabelId, NodeId, PenumbraError, RecordPtr, Result};

use super::labels::LabelSet;

const FLAG_IN_USE: u8 = 0x01;
const FLAG_DENSE: u8 = 0x02;
const KNOWN_FLAGS: u8 = FLAG_IN_USE | FLAG_DENSE;

const ROW_FIXED_LEN: usize = 1 + 8 + 8 + 8;

const LABEL_SPILL_FLAG: u64 = 1 << 63;
const LABEL_COUNT_SHIFT: u32 = 60;
const LABEL_COUNT_MASK: u64 = 0x7;
const LABEL_PAYLOAD_BITS: u32 = 60;
const MAX_INLINE_LABELS: usize = 7;

/// Persisted node record, decoded.
///
/// `next_rel` holds the first relationship for sparse nodes and the first
/// relationship group for dense nodes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeRecord {
    /// Record id.
    pub id: NodeId,
    /// Whether the record slot holds a live node.
    pub in_use: bool,
    /// Whether relationships are reached through a group record.
    pub dense: bool,
    /// First property record.
    pub next_prop: RecordPtr,
    /// First relationship, or first relationship group when dense.
    pub next_rel: RecordPtr,
    /// Label ids stored on the record.
    pub labels: LabelSet,
}

impl NodeRecord {
    /// Creates an unused record for `id`.
    pub fn new(id: NodeId) -> Self {
        Self {
            id,
            in_use: false,
            dense: false,
            next_prop: RecordPtr::NONE,
            next_rel: RecordPtr::NONE,
            labels: LabelSet::new(),
        }
    }

    /// Overwrites every field, keeping the label allocation.
    pub fn initialize(
        &mut self,
        in_use: bool,
        next_prop: RecordPtr,
        dense: bool,
        next_rel: RecordPtr,
        labels: &LabelSet,
    ) -> &mut Self {
        self.in_use = in_use;
        self.next_prop = next_prop;
        self.dense = dense;
        self.next_rel = next_rel;
        self.labels.copy_from(labels);
        self
    }

    /// Resets the record to an unused slot for `id`.
    pub fn clear(&mut self, id: NodeId) {
        self.id = id;
        self.in_use = false;
        self.dense = false;
        self.next_prop = RecordPtr::NONE;
        self.next_rel = RecordPtr::NONE;
        self.labels.clear();
    }
}

impl Default for NodeRecord {
    fn default() -> Self {
        Self::new(NodeId(u64::MAX))
    }
}

/// Encodes `record` as a node row.
pub fn encode(record: &NodeRecord) -> Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(ROW_FIXED_LEN);
    encode_into(record, &mut buf)?;
    Ok(buf)
}

/// Encodes `record` into `buf`, replacing its contents.
pub fn encode_into(record: &NodeRecord, buf: &mut Vec<u8>) -> Result<()> {
    if record.labels.len() > u8::MAX as usize {
        return Err(PenumbraError::Invalid("too many labels for node"));
    }
    buf.clear();
    let mut flags = 0u8;
    if record.in_use {
        flags |= FLAG_IN_USE;
    }
    if record.dense {
        flags |= FLAG_DENSE;
    }
    buf.push(flags);
    buf.extend_from_slice(&record.next_prop.0.to_be_bytes());
    buf.extend_from_slice(&record.next_rel.0.to_be_bytes());
    match inline_label_field(&record.labels) {
        Some(field) => buf.extend_from_slice(&field.to_be_bytes()),
        None => {
            buf.extend_from_slice(&LABEL_SPILL_FLAG.to_be_bytes());
            buf.push(record.labels.len() as u8);
            for label in record.labels.iter() {
                buf.extend_from_slice(&label.0.to_be_bytes());
            }
        }
    }
    Ok(())
}

/// Decodes a node row into a fresh record.
pub fn decode(id: NodeId, data: &[u8]) -> Result<NodeRecord> {
    let mut record = NodeRecord::new(id);
    decode_into(id, data, &mut record)?;
    Ok(record)
}

/// Decodes a node row into `record`, reusing its label buffer.
pub fn decode_into(id: NodeId, data: &[u8], record: &mut NodeRecord) -> Result<()> {
    if data.len() < ROW_FIXED_LEN {
        return Err(PenumbraError::Corruption("node row truncated"));
    }
    let flags = data[0];
    if flags & !KNOWN_FLAGS != 0 {
        return Err(PenumbraError::Corruption("unknown node row flags"));
    }
    record.id = id;
    record.in_use = flags & FLAG_IN_USE != 0;
    record.dense = flags & FLAG_DENSE != 0;
    record.next_prop = RecordPtr(u64_from_be(&data[1..9]));
    record.next_rel = RecordPtr(u64_from_be(&data[9..17]));
    let field = u64_from_be(&data[17..25]);
    record.labels.clear();
    if field & LABEL_SPILL_FLAG == 0 {
        if data.len() != ROW_FIXED_LEN {
            return Err(PenumbraError::Corruption("trailing bytes after inline labels"));
        }
        return decode_inline_labels(field, &mut record.labels);
    }
    let mut offset = ROW_FIXED_LEN;
    if offset >= data.len() {
        return Err(PenumbraError::Corruption("spilled label count missing"));
    }
    let count = data[offset] as usize;
    offset += 1;
    if data.len() != offset + count * 4 {
        return Err(PenumbraError::Corruption("spilled labels truncated"));
    }
    for _ in 0..count {
        let label = LabelId(u32_from_be(&data[offset..offset + 4]));
        offset += 4;
        if !record.labels.insert(label) {
            return Err(PenumbraError::Corruption("duplicate label in node row"));
        }
    }
    Ok(())
}

/// Packs `labels` into a single field when every label fits the per-slot width.
fn inline_label_field(labels: &LabelSet) -> Option<u64> {
    let count = labels.len();
    if count == 0 {
        return Some(0);
    }
    if count > MAX_INLINE_LABELS {
        return None;
    }
    let bits = LABEL_PAYLOAD_BITS / count as u32;
    let max = (1u64 << bits) - 1;
    let mut payload = 0u64;
    for (slot, label) in labels.iter().enumerate() {
        let raw = u64::from(label.0);
        if raw > max {
            return None;
        }
        payload |= raw << (slot as u32 * bits);
    }
    Some(((count as u64) << LABEL_COUNT_SHIFT) | payload)
}

fn decode_inline_labels(field: u64, out: &mut LabelSet) -> Result<()> {
    let count = ((field >> LABEL_COUNT_SHIFT) & LABEL_COUNT_MASK) as u32;
    let payload = field & ((1u64 << LABEL_PAYLOAD_BITS) - 1);
    if count == 0 {
        if payload != 0 {
            return Err(PenumbraError::Corruption("label payload without count"));
        }
        return Ok(());
    }
    let bits = LABEL_PAYLOAD_BITS / count;
    let mask = (1u64 << bits) - 1;
    for slot in 0..count {
        let raw = (payload >> (slot * bits)) & mask;
        if !out.insert(LabelId(raw as u32)) {
            return Err(PenumbraError::Corruption("duplicate label in node row"));
        }
    }
    Ok(())
}

fn u64_from_be(bytes: &[u8]) -> u64 {
    let mut arr = [0u8; 8];
    arr.copy_from_slice(&bytes[..8]);
    u64::from_be_bytes(arr)
}

fn u32_from_be(bytes: &[u8]) -> u32 {
    let mut arr = [0u8; 4];
    arr.copy_from_slice(&bytes[..4]);
    u32::from_be_bytes(arr)
}

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, warn};

use crate::storage::PropValue;
use crate::types::{LabelId, NodeId, PenumbraError, PropId, Result};

use super::types::{encode_value_key, IndexDef};
use super::updates::IndexUpdate;

type Postings = BTreeMap<Vec<u8>, BTreeSet<NodeId>>;

#[derive(Debug)]
struct IndexEntry {
    def: IndexDef,
    postings: Postings,
}

/// Committed property index postings keyed by `(label, prop)`.
#[derive(Debug, Default)]
pub struct IndexStore {
    indexes: BTreeMap<(LabelId, PropId), IndexEntry>,
}

impl IndexStore {
    /// Creates an empty index store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an empty index. Returns `false` when an identical index
    /// already exists.
    pub fn create(&mut self, def: IndexDef) -> Result<bool> {
        if let Some(existing) = self.indexes.get(&def.key()) {
            if existing.def == def {
                return Ok(false);
            }
            return Err(PenumbraError::Invalid(
                "conflicting index already exists for label and property",
            ));
        }
        self.indexes.insert(
            def.key(),
            IndexEntry {
                def,
                postings: Postings::new(),
            },
        );
        debug!(label = def.label.0, prop = def.prop.0, unique = def.unique, "index.created");
        Ok(true)
    }

    /// Removes an index. Returns whether it existed.
    pub fn drop_index(&mut self, label: LabelId, prop: PropId) -> bool {
        self.indexes.remove(&(label, prop)).is_some()
    }

    /// Definition of the index on `(label, prop)`.
    pub fn get(&self, label: LabelId, prop: PropId) -> Option<IndexDef> {
        self.indexes.get(&(label, prop)).map(|entry| entry.def)
    }

    /// Every registered definition.
    pub fn defs(&self) -> Vec<IndexDef> {
        self.indexes.values().map(|entry| entry.def).collect()
    }

    /// Nodes listed under `value`, ascending.
    ///
    /// Values the index does not admit match nothing; callers needing those
    /// must scan.
    pub fn lookup(&self, label: LabelId, prop: PropId, value: &PropValue) -> Result<Vec<NodeId>> {
        let entry = self
            .indexes
            .get(&(label, prop))
            .ok_or(PenumbraError::NotFound)?;
        if !entry.def.admits(value) {
            return Ok(Vec::new());
        }
        let key = encode_value_key(entry.def.ty, value)?;
        Ok(entry
            .postings
            .get(&key)
            .map(|nodes| nodes.iter().copied().collect())
            .unwrap_or_default())
    }

    /// Total entries across all indexes.
    pub fn entry_count(&self) -> usize {
        self.indexes
            .values()
            .flat_map(|entry| entry.postings.values())
            .map(BTreeSet::len)
            .sum()
    }

    /// Rejects `updates` if applying them would give two nodes the same
    /// value under a unique index.
    pub fn check(&self, updates: &[IndexUpdate]) -> Result<()> {
        let mut leaving: BTreeMap<(LabelId, PropId, &[u8]), BTreeSet<NodeId>> = BTreeMap::new();
        let mut arriving: BTreeMap<(LabelId, PropId, &[u8]), Vec<NodeId>> = BTreeMap::new();
        for update in updates.iter().filter(|u| u.index().unique) {
            let (label, prop) = update.index().key();
            match update {
                IndexUpdate::Added { node, key, .. } => {
                    arriving.entry((label, prop, key.as_slice())).or_default().push(*node);
                }
                IndexUpdate::Removed { node, key, .. } => {
                    leaving.entry((label, prop, key.as_slice())).or_default().insert(*node);
                }
                IndexUpdate::Changed {
                    node,
                    before,
                    after,
                    ..
                } => {
                    leaving
                        .entry((label, prop, before.as_slice()))
                        .or_default()
                        .insert(*node);
                    arriving
                        .entry((label, prop, after.as_slice()))
                        .or_default()
                        .push(*node);
                }
            }
        }
        for ((label, prop, key), nodes) in arriving {
            let gone = leaving.get(&(label, prop, key));
            let mut holders: BTreeSet<NodeId> = self
                .indexes
                .get(&(label, prop))
                .and_then(|entry| entry.postings.get(key))
                .into_iter()
                .flatten()
                .copied()
                .filter(|node| !gone.is_some_and(|gone| gone.contains(node)))
                .collect();
            for node in nodes {
                if let Some(existing) = holders.iter().copied().find(|held| *held != node) {
                    warn!(
                        label = label.0,
                        prop = prop.0,
                        existing = existing.0,
                        node = node.0,
                        "index.unique.violation"
                    );
                    return Err(PenumbraError::ConstraintViolation {
                        label,
                        prop,
                        existing,
                        node,
                    });
                }
                holders.insert(node);
            }
        }
        Ok(())
    }

    /// Applies updates produced for committed nodes.
    pub fn apply(&mut self, updates: &[IndexUpdate]) {
        for update in updates {
            let Some(entry) = self.indexes.get_mut(&update.index().key()) else {
                continue;
            };
            match update {
                IndexUpdate::Added { node, key, .. } => {
                    entry.postings.entry(key.clone()).or_default().insert(*node);
                }
                IndexUpdate::Removed { node, key, .. } => remove(&mut entry.postings, key, *node),
                IndexUpdate::Changed {
                    node,
                    before,
                    after,
                    ..
                } => {
                    remove(&mut entry.postings, before, *node);
                    entry.postings.entry(after.clone()).or_default().insert(*node);
                }
            }
        }
    }
}

fn remove(postings: &mut Postings, key: &[u8], node: NodeId) {
    if let Some(nodes) = postings.get_mut(key) {
        nodes.remove(&node);
        if nodes.is_empty() {
            postings.remove(key);
        }
    }
}

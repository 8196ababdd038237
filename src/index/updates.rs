use crate::storage::{LabelSet, PropertyMap};
use crate::types::{NodeId, Result};

use super::types::{encode_value_key, IndexDef};

/// Index-relevant state of one node: its labels and property values.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NodeProjection {
    /// Effective labels.
    pub labels: LabelSet,
    /// Effective property values.
    pub props: PropertyMap,
}

impl NodeProjection {
    /// Value key this node contributes to `def`, if it qualifies.
    ///
    /// A node qualifies when it carries the label and holds a value the
    /// index admits for the key.
    pub fn entry_for(&self, def: &IndexDef) -> Result<Option<Vec<u8>>> {
        if !self.labels.contains(def.label) {
            return Ok(None);
        }
        match self.props.get(&def.prop) {
            Some(value) if def.admits(value) => encode_value_key(def.ty, value).map(Some),
            _ => Ok(None),
        }
    }
}

/// Net change to one index entry produced by a commit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IndexUpdate {
    /// The node starts qualifying under `key`.
    Added {
        /// Affected index.
        index: IndexDef,
        /// Node.
        node: NodeId,
        /// Encoded value.
        key: Vec<u8>,
    },
    /// The node stops qualifying.
    Removed {
        /// Affected index.
        index: IndexDef,
        /// Node.
        node: NodeId,
        /// Encoded value the node was listed under.
        key: Vec<u8>,
    },
    /// The node's value moved.
    Changed {
        /// Affected index.
        index: IndexDef,
        /// Node.
        node: NodeId,
        /// Previous encoded value.
        before: Vec<u8>,
        /// New encoded value.
        after: Vec<u8>,
    },
}

impl IndexUpdate {
    /// Index the update applies to.
    pub fn index(&self) -> &IndexDef {
        match self {
            IndexUpdate::Added { index, .. }
            | IndexUpdate::Removed { index, .. }
            | IndexUpdate::Changed { index, .. } => index,
        }
    }

    /// Node the update applies to.
    pub fn node(&self) -> NodeId {
        match self {
            IndexUpdate::Added { node, .. }
            | IndexUpdate::Removed { node, .. }
            | IndexUpdate::Changed { node, .. } => *node,
        }
    }
}

/// Before/after projections of one node across a commit.
///
/// `before` is the committed state (absent for new nodes); `after` is the
/// merged view at commit (absent for deleted nodes). Only the two end
/// states matter, so the way the transaction's operations were ordered
/// or grouped never shows up in the produced updates.
#[derive(Clone, Debug)]
pub struct NodeUpdates {
    node: NodeId,
    before: Option<NodeProjection>,
    after: Option<NodeProjection>,
}

impl NodeUpdates {
    /// Pairs the committed and merged state of `node`.
    pub fn new(node: NodeId, before: Option<NodeProjection>, after: Option<NodeProjection>) -> Self {
        Self {
            node,
            before,
            after,
        }
    }

    /// Node described.
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// At most one update per index in `defs`.
    pub fn for_indexes<'d>(
        &self,
        defs: impl IntoIterator<Item = &'d IndexDef>,
    ) -> Result<Vec<IndexUpdate>> {
        let mut out = Vec::new();
        for def in defs {
            let before = entry(self.before.as_ref(), def)?;
            let after = entry(self.after.as_ref(), def)?;
            let index = *def;
            let node = self.node;
            match (before, after) {
                (None, None) => {}
                (None, Some(key)) => out.push(IndexUpdate::Added { index, node, key }),
                (Some(key), None) => out.push(IndexUpdate::Removed { index, node, key }),
                (Some(before), Some(after)) if before != after => {
                    out.push(IndexUpdate::Changed {
                        index,
                        node,
                        before,
                        after,
                    })
                }
                (Some(_), Some(_)) => {}
            }
        }
        Ok(out)
    }
}

fn entry(projection: Option<&NodeProjection>, def: &IndexDef) -> Result<Option<Vec<u8>>> {
    match projection {
        Some(projection) => projection.entry_for(def),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::TypeTag;
    use crate::storage::PropValue;
    use crate::types::{LabelId, PropId};

    fn projection(labels: &[u32], value: Option<&str>) -> NodeProjection {
        let mut props = PropertyMap::new();
        if let Some(value) = value {
            props.insert(PropId(1), PropValue::from(value));
        }
        NodeProjection {
            labels: labels.iter().map(|l| LabelId(*l)).collect(),
            props,
        }
    }

    #[test]
    fn label_and_property_together_add_one_entry() -> Result<()> {
        let def = IndexDef::unique(LabelId(1), PropId(1), TypeTag::String);
        let created = NodeUpdates::new(NodeId(0), None, Some(projection(&[1], Some("value1"))));
        let updates = created.for_indexes([&def])?;
        assert_eq!(updates.len(), 1);
        assert!(matches!(updates[0], IndexUpdate::Added { .. }));

        let label_only = NodeUpdates::new(
            NodeId(0),
            Some(projection(&[], Some("value1"))),
            Some(projection(&[1], Some("value1"))),
        );
        assert_eq!(label_only.for_indexes([&def])?.len(), 1);

        let unchanged = NodeUpdates::new(
            NodeId(0),
            Some(projection(&[1], Some("value1"))),
            Some(projection(&[1, 2], Some("value1"))),
        );
        assert!(unchanged.for_indexes([&def])?.is_empty());
        Ok(())
    }

    #[test]
    fn value_moves_and_deletes() -> Result<()> {
        let def = IndexDef::plain(LabelId(1), PropId(1), TypeTag::String);
        let moved = NodeUpdates::new(
            NodeId(3),
            Some(projection(&[1], Some("a"))),
            Some(projection(&[1], Some("b"))),
        );
        assert!(matches!(
            moved.for_indexes([&def])?.as_slice(),
            [IndexUpdate::Changed { .. }]
        ));
        let deleted = NodeUpdates::new(NodeId(3), Some(projection(&[1], Some("a"))), None);
        let updates = deleted.for_indexes([&def])?;
        assert_eq!(updates[0].node(), NodeId(3));
        assert!(matches!(updates[0], IndexUpdate::Removed { .. }));
        Ok(())
    }

    #[test]
    fn wrong_type_does_not_qualify() -> Result<()> {
        let def = IndexDef::plain(LabelId(1), PropId(1), TypeTag::Int);
        let node = NodeUpdates::new(NodeId(0), None, Some(projection(&[1], Some("x"))));
        assert!(node.for_indexes([&def])?.is_empty());
        Ok(())
    }
}

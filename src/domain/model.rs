//! Root trees laid out on a grid of coordinates.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;
use ulid::Ulid;

use crate::domain::identity::{self, Identity};
use crate::domain::node::CanvasNode;
use crate::domain::node_ref::NodeRef;
use crate::domain::path::CanvasPath;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Coordinate {
    pub row: u32,
    pub column: u32,
}

impl Coordinate {
    pub fn new(row: u32, column: u32) -> Self {
        Self { row, column }
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.row, self.column)
    }
}

/// Every root of a model, captured for undo and redo.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Snapshot {
    pub roots: Vec<(Coordinate, CanvasNode)>,
}

/// Holds root trees by coordinate. Every node added is stamped with an
/// identity unique to this model.
#[derive(Debug, Clone)]
pub struct CanvasNodeModel {
    model_id: Ulid,
    next_node_id: u64,
    roots: BTreeMap<Coordinate, CanvasNode>,
}

impl Default for CanvasNodeModel {
    fn default() -> Self {
        Self::new()
    }
}

impl CanvasNodeModel {
    pub fn new() -> Self {
        Self::with_model_id(Ulid::new())
    }

    pub fn with_model_id(model_id: Ulid) -> Self {
        Self {
            model_id,
            next_node_id: 0,
            roots: BTreeMap::new(),
        }
    }

    pub fn model_id(&self) -> Ulid {
        self.model_id
    }

    /// Place `node` at `coordinate`, replacing whatever root was there.
    pub fn add_root(&mut self, coordinate: Coordinate, node: &CanvasNode) -> &CanvasNode {
        let (stamped, next) = identity::stamp(node, self.model_id, self.next_node_id);
        debug!(%coordinate, nodes = next - self.next_node_id, "root added");
        self.next_node_id = next;
        self.roots.insert(coordinate, stamped);
        &self.roots[&coordinate]
    }

    pub fn remove(&mut self, coordinate: Coordinate) -> Option<CanvasNode> {
        self.roots.remove(&coordinate)
    }

    pub fn get_node(&self, coordinate: Coordinate) -> Option<&CanvasNode> {
        self.roots.get(&coordinate)
    }

    pub fn roots(&self) -> impl Iterator<Item = (Coordinate, &CanvasNode)> {
        self.roots.iter().map(|(c, n)| (*c, n))
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// Where the node carrying `identity` currently sits.
    pub fn find_identity(&self, identity: &Identity) -> Option<(Coordinate, CanvasPath)> {
        if identity.model_id != self.model_id {
            return None;
        }
        self.roots.iter().find_map(|(coordinate, root)| {
            NodeRef::root(root)
                .breadth_first()
                .into_iter()
                .find(|node| identity::find_identity(node.node()).as_ref() == Some(identity))
                .map(|node| (*coordinate, node.path()))
        })
    }

    /// A copy of `node` without any identities, ready to be stored elsewhere.
    pub fn strip_identity(&self, node: &CanvasNode) -> CanvasNode {
        identity::strip_identity(node)
    }

    pub fn save_snapshot(&self) -> Snapshot {
        Snapshot {
            roots: self.roots.iter().map(|(c, n)| (*c, n.clone())).collect(),
        }
    }

    /// Replace every root with those in `snapshot`. Identities are kept as
    /// captured.
    pub fn restore(&mut self, snapshot: &Snapshot) {
        self.roots = snapshot.roots.iter().cloned().collect();
        debug!(roots = self.roots.len(), "snapshot restored");
    }
}

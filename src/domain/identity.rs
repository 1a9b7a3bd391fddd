//! Stable node identities kept in node metadata.
//!
//! Identities live under a reserved metadata key. Nothing outside this
//! module reads or writes that key.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::domain::node::CanvasNode;
use crate::domain::node_ref::NodeRef;
use crate::domain::reference::replace_at_indices;
use crate::domain::value::Value;

const IDENTITY_KEY: &str = "@identity";
const ENTRY_KEY: &str = "@catalog_uid";

/// Identifies one node within one model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity {
    pub model_id: Ulid,
    pub node_id: u64,
}

impl Identity {
    pub fn new(model_id: Ulid, node_id: u64) -> Self {
        Self { model_id, node_id }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.model_id, self.node_id)
    }
}

impl FromStr for Identity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (model, node) = s
            .split_once(':')
            .ok_or_else(|| format!("malformed identity: {s}"))?;
        let model_id = Ulid::from_string(model).map_err(|e| format!("malformed identity: {e}"))?;
        let node_id = node
            .parse::<u64>()
            .map_err(|e| format!("malformed identity: {e}"))?;
        Ok(Self { model_id, node_id })
    }
}

pub fn find_identity(node: &CanvasNode) -> Option<Identity> {
    match node.find_metadata(IDENTITY_KEY)? {
        Value::Text(text) => text.parse().ok(),
        _ => None,
    }
}

pub fn set_identity(node: &CanvasNode, identity: Identity) -> CanvasNode {
    node.set_metadata(IDENTITY_KEY, Value::Text(identity.to_string()))
}

/// The catalog entry a tree was saved as, if any.
pub fn find_entry_uid(node: &CanvasNode) -> Option<Ulid> {
    match node.find_metadata(ENTRY_KEY)? {
        Value::Text(text) => Ulid::from_string(text).ok(),
        _ => None,
    }
}

pub fn set_entry_uid(node: &CanvasNode, uid: Ulid) -> CanvasNode {
    node.set_metadata(ENTRY_KEY, Value::Text(uid.to_string()))
}

/// Remove identities from `node` and all its descendants.
pub fn strip_identity(node: &CanvasNode) -> CanvasNode {
    node.map_metadata(&|metadata| {
        metadata.remove(IDENTITY_KEY);
    })
}

/// Give every node of `root` a fresh identity in breadth-first order,
/// numbering from `next`. Returns the stamped tree and the next free number.
pub fn stamp(root: &CanvasNode, model_id: Ulid, mut next: u64) -> (CanvasNode, u64) {
    let order: Vec<Vec<usize>> = NodeRef::root(root)
        .breadth_first()
        .iter()
        .map(|node| node.indices().to_vec())
        .collect();
    let mut result = root.clone();
    for indices in order {
        let Some(current) = result.at_indices(&indices) else {
            continue;
        };
        let stamped = set_identity(current, Identity::new(model_id, next));
        next += 1;
        if let Some(updated) = replace_at_indices(&result, &indices, stamped) {
            result = updated;
        }
    }
    (result, next)
}

//! Named, reusable trees.
//!
//! An entry is stored as JSON. The entry's uid is also written into the
//! metadata of its tree so that a tree copied out of an entry can be traced
//! back to it. When the two disagree on load, the tree is re-stamped with the
//! entry's uid.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use ulid::Ulid;

use crate::domain::canvas_type::CanvasType;
use crate::domain::error::CanvasError;
use crate::domain::function::FunctionOp;
use crate::domain::identity::{find_entry_uid, set_entry_uid};
use crate::domain::node::{CanvasNode, ReadErrorPolicy};
use crate::domain::order::Security;
use crate::domain::order_tasks::OrderPreset;
use crate::domain::value::Value;

const ENTRY_EXTENSION: &str = "json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub uid: Ulid,
    pub name: String,
    #[serde(default)]
    pub icon_path: String,
    #[serde(default)]
    pub description: String,
    pub node: CanvasNode,
}

impl CatalogEntry {
    /// A new entry with a fresh uid.
    pub fn new(
        name: impl Into<String>,
        icon_path: impl Into<String>,
        description: impl Into<String>,
        node: &CanvasNode,
    ) -> Self {
        Self::with_uid(Ulid::new(), name, icon_path, description, node)
    }

    pub fn with_uid(
        uid: Ulid,
        name: impl Into<String>,
        icon_path: impl Into<String>,
        description: impl Into<String>,
        node: &CanvasNode,
    ) -> Self {
        Self {
            uid,
            name: name.into(),
            icon_path: icon_path.into(),
            description: description.into(),
            node: set_entry_uid(node, uid),
        }
    }

    pub fn to_json(&self) -> Result<String, CanvasError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(text: &str) -> Result<Self, CanvasError> {
        let mut entry: CatalogEntry = serde_json::from_str(text)?;
        if entry.name.trim().is_empty() {
            return Err(CanvasError::Catalog {
                reason: format!("entry {} has no name", entry.uid),
            });
        }
        if find_entry_uid(&entry.node) != Some(entry.uid) {
            warn!(uid = %entry.uid, name = entry.name.as_str(), "catalog entry uid mismatch, re-stamping");
            entry.node = set_entry_uid(&entry.node, entry.uid);
        }
        Ok(entry)
    }

    /// Write the entry to `<directory>/<uid>.json`.
    pub fn save(&self, directory: &Path) -> Result<(), CanvasError> {
        fs::create_dir_all(directory)?;
        let path = directory.join(format!("{}.{ENTRY_EXTENSION}", self.uid));
        fs::write(&path, self.to_json()?)?;
        debug!(path = %path.display(), "catalog entry saved");
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, CanvasError> {
        let text = fs::read_to_string(path)?;
        Self::from_json(&text).map_err(|e| CanvasError::Catalog {
            reason: format!("{}: {e}", path.display()),
        })
    }
}

/// Every entry stored in `directory`, sorted by name. Files that fail to
/// load are skipped with a warning.
pub fn load_directory(directory: &Path) -> Result<Vec<CatalogEntry>, CanvasError> {
    let mut entries = Vec::new();
    for item in fs::read_dir(directory)? {
        let path = item?.path();
        if path.extension().and_then(|e| e.to_str()) != Some(ENTRY_EXTENSION) {
            continue;
        }
        match CatalogEntry::load(&path) {
            Ok(entry) => entries.push(entry),
            Err(err) => warn!(error = %err, "skipping catalog entry"),
        }
    }
    entries.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(entries)
}

/// Entries for the stock node kinds. Their uids never change between runs.
pub fn builtin_entries() -> Vec<CatalogEntry> {
    let mut nodes: Vec<(String, CanvasNode)> = vec![
        ("Integer".into(), CanvasNode::constant(Value::Integer(0))),
        ("Decimal".into(), CanvasNode::constant(Value::Decimal(0.0))),
        ("Money".into(), CanvasNode::constant(Value::Money(0.0))),
        ("Boolean".into(), CanvasNode::constant(Value::Boolean(false))),
        ("Text".into(), CanvasNode::constant(Value::Text(String::new()))),
        ("Chain".into(), CanvasNode::chain(Vec::new())),
        ("Aggregate".into(), CanvasNode::aggregate(Vec::new())),
        (
            "Spawn".into(),
            CanvasNode::spawn(CanvasNode::none(CanvasType::Unknown), CanvasNode::none(CanvasType::Task)),
        ),
        (
            "Until".into(),
            CanvasNode::until(CanvasNode::none(CanvasType::Boolean), CanvasNode::none(CanvasType::Task)),
        ),
        (
            "When".into(),
            CanvasNode::when(CanvasNode::none(CanvasType::Boolean), CanvasNode::none(CanvasType::Task)),
        ),
        ("File Path".into(), CanvasNode::file_path("")),
        (
            "File Reader".into(),
            CanvasNode::file_reader(CanvasType::Text, ReadErrorPolicy::default(), CanvasNode::file_path("")),
        ),
        (
            "Time And Sale Query".into(),
            CanvasNode::time_and_sale_query(CanvasNode::constant(Value::Security(Security::default()))),
        ),
        (
            "Execution Report Monitor".into(),
            CanvasNode::execution_report_monitor(CanvasNode::none(CanvasType::Task)),
        ),
        ("Interactions".into(), CanvasNode::interactions()),
        ("Static".into(), CanvasNode::static_value(CanvasNode::none(CanvasType::Unknown))),
        (
            "Filter".into(),
            CanvasNode::filter(CanvasNode::none(CanvasType::Boolean), CanvasNode::none(CanvasType::Unknown)),
        ),
    ];
    nodes.extend(
        FunctionOp::ALL
            .iter()
            .map(|op| (op.name().to_string(), CanvasNode::function_default(*op))),
    );
    nodes.extend(
        OrderPreset::ALL
            .iter()
            .filter_map(|preset| preset.node().ok().map(|node| (preset.name().to_string(), node))),
    );
    nodes
        .into_iter()
        .zip(1u64..)
        .map(|((name, node), n)| {
            CatalogEntry::with_uid(Ulid::from_parts(0, u128::from(n)), name, "", "", &node)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn builtin_uids_are_stable_and_unique() {
        let first = builtin_entries();
        let second = builtin_entries();
        assert_eq!(
            first.iter().map(|e| e.uid).collect::<Vec<_>>(),
            second.iter().map(|e| e.uid).collect::<Vec<_>>()
        );
        let unique: HashSet<Ulid> = first.iter().map(|e| e.uid).collect();
        assert_eq!(unique.len(), first.len());
        assert!(first.iter().any(|e| e.name == "Market Bid Order"));
        for name in ["Static", "Filter", "Round", "Is Terminal"] {
            assert!(first.iter().any(|e| e.name == name), "missing {name}");
        }
    }

    #[test]
    fn json_round_trip_keeps_entry() {
        let entry = CatalogEntry::new(
            "Seven",
            "icons/seven.png",
            "the number seven",
            &CanvasNode::constant(Value::Integer(7)),
        );
        let loaded = CatalogEntry::from_json(&entry.to_json().unwrap()).unwrap();
        assert_eq!(loaded, entry);
        assert_eq!(find_entry_uid(&loaded.node), Some(entry.uid));
    }

    #[test]
    fn mismatched_uid_is_restamped() {
        let entry = CatalogEntry::new("Seven", "", "", &CanvasNode::constant(Value::Integer(7)));
        let other = Ulid::from_parts(1, 1);
        let tampered = CatalogEntry {
            node: set_entry_uid(&entry.node, other),
            ..entry.clone()
        };
        let loaded = CatalogEntry::from_json(&tampered.to_json().unwrap()).unwrap();
        assert_eq!(find_entry_uid(&loaded.node), Some(entry.uid));
    }

    #[test]
    fn unnamed_entry_is_rejected() {
        let entry = CatalogEntry::new(" ", "", "", &CanvasNode::constant(Value::Integer(1)));
        assert!(matches!(
            CatalogEntry::from_json(&entry.to_json().unwrap()),
            Err(CanvasError::Catalog { .. })
        ));
    }

    #[test]
    fn directory_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let b = CatalogEntry::new("B", "", "", &CanvasNode::constant(Value::Integer(2)));
        let a = CatalogEntry::new("A", "", "", &CanvasNode::constant(Value::Integer(1)));
        b.save(dir.path()).unwrap();
        a.save(dir.path()).unwrap();
        fs::write(dir.path().join("broken.json"), "{").unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();
        let loaded = load_directory(dir.path()).unwrap();
        assert_eq!(loaded, vec![a, b]);
    }
}

//! Resolution of linked nodes.
//!
//! A reference names its target relative to itself: each leading `<` steps
//! the anchor one level up, and the remaining name is looked up among the
//! descendants of the anchor's parent, then followed child by child if it
//! carries a `/` path. Task monitors act as a terminal anchor
//! so that monitor expressions can refer to the task they watch.

use std::collections::HashSet;

use tracing::{debug, warn};

use crate::domain::node::{CanvasNode, NodeKind};
use crate::domain::node_ref::NodeRef;
use crate::domain::path::{CanvasPath, ReferenceString};

/// The escape string stored in a linked node, if the node is one.
pub fn referent_string<'a>(node: &'a CanvasNode) -> Option<&'a str> {
    match node.kind() {
        NodeKind::Reference(referent) => Some(referent),
        _ => None,
    }
}

pub fn is_task_monitor(node: &CanvasNode) -> bool {
    matches!(node.kind(), NodeKind::TaskMonitor)
}

/// Walk up one level per escape.
pub fn find_anchor<'a>(reference: &NodeRef<'a>) -> Option<NodeRef<'a>> {
    let referent = referent_string(reference.node())?;
    let parsed = ReferenceString::split(referent);
    let mut anchor = reference.clone();
    for _ in 0..parsed.escapes {
        let parent = anchor.parent()?;
        if is_task_monitor(parent.node()) {
            return Some(parent);
        }
        anchor = parent;
    }
    Some(anchor)
}

/// The node a reference resolves to. A name with `/` separators descends
/// from the named node through its children.
pub fn find_referent<'a>(reference: &NodeRef<'a>) -> Option<NodeRef<'a>> {
    let referent = referent_string(reference.node())?;
    let parsed = ReferenceString::split(referent);
    let (head, rest) = parsed.head_and_rest();
    let anchor = find_anchor(reference)?;
    if head.is_empty() {
        if !rest.is_root() {
            return None;
        }
        if is_task_monitor(anchor.node()) {
            return anchor.parent()?.child(0);
        }
        return Some(anchor);
    }
    let named = anchor.parent()?.find_node(head)?;
    rest.segments()
        .iter()
        .try_fold(named, |node, name| node.find_child(name))
}

/// Re-anchor the references of a subtree that was moved.
///
/// `before` is the subtree at its old position and `after` the same subtree
/// at its new position, usually in another tree. A reference whose lookup
/// starts above the subtree gets one extra escape per level the subtree moved
/// down (or one fewer per level up). The new string is kept only if it still
/// resolves to the node the reference resolved to before the move. Returns
/// the tree of `after` with the relinked references in place.
pub fn relink(before: &NodeRef<'_>, after: &NodeRef<'_>) -> CanvasNode {
    let shift = after.depth() as isize - before.depth() as isize;
    let mut result = after.tree_root().clone();
    if shift == 0 {
        return result;
    }
    for reference in before.depth_first() {
        let Some(referent) = referent_string(reference.node()) else {
            continue;
        };
        let Some(anchor) = find_anchor(&reference) else {
            continue;
        };
        if anchor.depth() > before.depth() && anchor.is_within(before) {
            continue;
        }
        let Some(original) = find_referent(&reference) else {
            continue;
        };
        let parsed = ReferenceString::split(referent);
        let Some(escapes) = parsed.escapes.checked_add_signed(shift) else {
            warn!(path = %reference.path(), referent, "reference cannot be relinked");
            continue;
        };
        let candidate = parsed.with_escapes(escapes).to_string();
        let mut indices = after.indices().to_vec();
        indices.extend_from_slice(&reference.indices()[before.depth()..]);
        let Some(current) = result.at_indices(&indices) else {
            continue;
        };
        let Some(updated) = replace_at_indices(&result, &indices, with_referent(current, &candidate)) else {
            continue;
        };
        let keeps_referent = NodeRef::from_indices(&updated, indices)
            .and_then(|moved| find_referent(&moved))
            .is_some_and(|relinked| corresponds(&original, before, &relinked, after.indices()));
        if keeps_referent {
            debug!(path = %reference.path(), from = referent, to = %candidate, "relinked reference");
            result = updated;
        } else {
            warn!(path = %reference.path(), referent, "reference loses its referent after the move");
        }
    }
    result
}

/// Whether `relinked` is the node `original` was before the move: the same
/// position relative to the subtree if it lay inside it, otherwise the same
/// path.
fn corresponds(original: &NodeRef<'_>, before: &NodeRef<'_>, relinked: &NodeRef<'_>, after: &[usize]) -> bool {
    if original.is_within(before) {
        let inside = &original.indices()[before.depth()..];
        return relinked.indices().strip_prefix(after) == Some(inside);
    }
    original.path() == relinked.path()
}

/// Rebuild the spine of `root` with the node at `indices` swapped out.
pub(crate) fn replace_at_indices(root: &CanvasNode, indices: &[usize], node: CanvasNode) -> Option<CanvasNode> {
    match indices.split_first() {
        None => Some(node),
        Some((&first, rest)) => {
            let child = root.child(first)?;
            let updated = replace_at_indices(child, rest, node)?;
            Some(root.replace_unchecked(first, updated))
        }
    }
}

pub fn is_self_reference(reference: &NodeRef<'_>) -> bool {
    find_referent(reference).is_some_and(|r| r.same_node(reference))
}

/// Whether following `reference` eventually leads back to itself.
pub fn has_cycle(reference: &NodeRef<'_>) -> bool {
    let mut on_path = HashSet::new();
    visit(reference, &mut on_path)
}

fn visit(reference: &NodeRef<'_>, on_path: &mut HashSet<CanvasPath>) -> bool {
    let path = reference.path();
    if !on_path.insert(path.clone()) {
        return true;
    }
    let cyclic = match find_referent(reference) {
        None => false,
        Some(referent) if referent.same_node(reference) => false,
        Some(referent) => {
            if reference.is_within(&referent) {
                !(referent.canvas_type().is_task() && reference.canvas_type().is_task())
            } else if referent_string(referent.node()).is_some() {
                visit(&referent, on_path)
            } else if referent.canvas_type().is_task() {
                referent
                    .breadth_first()
                    .iter()
                    .filter(|n| referent_string(n.node()).is_some())
                    .any(|n| visit(n, on_path))
            } else {
                false
            }
        }
    };
    on_path.remove(&path);
    cyclic
}

/// A copy of a linked node pointing somewhere else.
fn with_referent(node: &CanvasNode, referent: &str) -> CanvasNode {
    let mut relinked = CanvasNode::reference(referent, node.canvas_type().clone())
        .set_visible(node.is_visible())
        .set_read_only(node.is_read_only());
    for (key, value) in node.metadata() {
        relinked = relinked.set_metadata(key.clone(), value.clone());
    }
    relinked.renamed(node.name().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::canvas_type::CanvasType;
    use crate::domain::function::FunctionOp;
    use crate::domain::node::Slot;
    use crate::domain::value::Value;

    fn integer(i: i64) -> CanvasNode {
        CanvasNode::constant(Value::Integer(i))
    }

    fn at<'a>(root: &'a CanvasNode, path: &str) -> NodeRef<'a> {
        NodeRef::resolve(root, &CanvasPath::parse(path).unwrap()).unwrap()
    }

    #[test]
    fn sibling_reference_resolves_without_escapes() {
        let root = CanvasNode::chain(vec![CanvasNode::reference("i1", CanvasType::Integer), integer(456)]);
        let referent = find_referent(&at(&root, "i0")).unwrap();
        assert_eq!(referent.path().to_string(), "i1");
    }

    #[test]
    fn escapes_walk_up() {
        let price = CanvasNode::function(
            FunctionOp::Max,
            vec![
                CanvasNode::reference("<<quantity", CanvasType::Money),
                CanvasNode::constant(Value::Money(1.0)),
            ],
        )
        .unwrap();
        let root = CanvasNode::single_order_task().replace("price", &price).unwrap();
        let reference = at(&root, "price/left");
        let anchor = find_anchor(&reference).unwrap();
        assert!(anchor.is_root());
        assert!(find_referent(&reference).is_none());

        let root = CanvasNode::single_order_task()
            .replace(
                "price",
                &CanvasNode::function(
                    FunctionOp::Max,
                    vec![
                        CanvasNode::reference("<price", CanvasType::Money),
                        CanvasNode::constant(Value::Money(1.0)),
                    ],
                )
                .unwrap(),
            )
            .unwrap();
        let referent = find_referent(&at(&root, "price/left")).unwrap();
        assert_eq!(referent.path().to_string(), "price");
    }

    #[test]
    fn single_escape_reaches_parent_siblings() {
        let root = CanvasNode::custom(
            "Pair",
            CanvasType::Integer,
            vec![
                (Slot::new("value", CanvasType::Integer), integer(5)),
                (
                    Slot::new("wrapped", CanvasType::Integer),
                    CanvasNode::chain(vec![CanvasNode::reference("<value", CanvasType::Integer)]),
                ),
            ],
        );
        let referent = find_referent(&at(&root, "wrapped/i0")).unwrap();
        assert_eq!(referent.path().to_string(), "value");
    }

    #[test]
    fn escaping_past_root_fails() {
        let root = CanvasNode::chain(vec![CanvasNode::reference("<<<x", CanvasType::Integer)]);
        assert!(find_anchor(&at(&root, "i0")).is_none());
        assert!(find_referent(&at(&root, "i0")).is_none());
    }

    #[test]
    fn bare_escape_refers_to_anchor() {
        let root = CanvasNode::chain(vec![CanvasNode::reference("<", CanvasType::Integer)]);
        let referent = find_referent(&at(&root, "i0")).unwrap();
        assert!(referent.is_root());
    }

    #[test]
    fn task_monitor_anchor_refers_to_first_sibling() {
        let root = CanvasNode::custom(
            "Observer",
            CanvasType::Task,
            vec![
                (Slot::new("target", CanvasType::Task), CanvasNode::single_order_task()),
                (
                    Slot::new("observer", CanvasType::Unknown),
                    CanvasNode::task_monitor(CanvasNode::reference("<", CanvasType::Task)),
                ),
            ],
        );
        let reference = at(&root, "observer/monitor");
        let anchor = find_anchor(&reference).unwrap();
        assert_eq!(anchor.path().to_string(), "observer");
        let referent = find_referent(&reference).unwrap();
        assert_eq!(referent.path().to_string(), "target");
    }

    #[test]
    fn self_reference_detected() {
        let root = CanvasNode::chain(vec![CanvasNode::reference("i0", CanvasType::Integer)]);
        let reference = at(&root, "i0");
        assert!(is_self_reference(&reference));
        assert!(!has_cycle(&reference));
    }

    #[test]
    fn mutual_references_form_a_cycle() {
        let root = CanvasNode::chain(vec![
            CanvasNode::reference("i1", CanvasType::Integer),
            CanvasNode::reference("i0", CanvasType::Integer),
        ]);
        assert!(has_cycle(&at(&root, "i0")));
        assert!(has_cycle(&at(&root, "i1")));
    }

    #[test]
    fn reference_to_containing_value_is_a_cycle() {
        let root = CanvasNode::custom(
            "Holder",
            CanvasType::Integer,
            vec![(
                Slot::new("value", CanvasType::Integer),
                CanvasNode::chain(vec![CanvasNode::reference("<", CanvasType::Integer)]),
            )],
        );
        assert!(has_cycle(&at(&root, "value/i0")));
    }

    #[test]
    fn reference_to_containing_task_is_allowed() {
        let root = CanvasNode::aggregate(vec![
            CanvasNode::single_order_task(),
            CanvasNode::execution_report_monitor(CanvasNode::reference("<<", CanvasType::Task)),
        ]);
        let reference = at(&root, "i1/task");
        assert!(find_referent(&reference).unwrap().is_root());
        assert!(!has_cycle(&reference));
    }

    fn sizes(copy: CanvasNode) -> CanvasNode {
        CanvasNode::custom(
            "Sizes",
            CanvasType::Integer,
            vec![
                (Slot::new("quantity", CanvasType::Integer), integer(100)),
                (Slot::new("copy", CanvasType::Integer), copy),
            ],
        )
    }

    #[test]
    fn nested_name_descends_below_custom_slots() {
        let root = CanvasNode::custom(
            "Observer",
            CanvasType::Integer,
            vec![
                (
                    Slot::new("target", CanvasType::Integer),
                    CanvasNode::function(FunctionOp::Addition, vec![integer(1), integer(2)]).unwrap(),
                ),
                (
                    Slot::new("observer", CanvasType::Integer),
                    CanvasNode::reference("target/left", CanvasType::Integer),
                ),
            ],
        );
        let referent = find_referent(&at(&root, "observer")).unwrap();
        assert_eq!(referent.path().to_string(), "target/left");

        let missing = root
            .replace("observer", &CanvasNode::reference("target/middle", CanvasType::Integer))
            .unwrap();
        assert!(find_referent(&at(&missing, "observer")).is_none());
    }

    #[test]
    fn relink_adds_escapes_after_moving_deeper() {
        let original = sizes(CanvasNode::reference("quantity", CanvasType::Integer));
        let moved = sizes(CanvasNode::chain(vec![CanvasNode::chain(vec![CanvasNode::reference(
            "quantity",
            CanvasType::Integer,
        )])]));
        assert!(find_referent(&at(&moved, "copy/i0/i0")).is_none());

        let relinked = relink(&at(&original, "copy"), &at(&moved, "copy/i0/i0"));
        let reference = at(&relinked, "copy/i0/i0");
        assert_eq!(referent_string(reference.node()), Some("<<quantity"));
        assert_eq!(find_referent(&reference).unwrap().path().to_string(), "quantity");
    }

    #[test]
    fn relink_does_not_settle_for_a_nearer_namesake() {
        let original = sizes(CanvasNode::reference("quantity", CanvasType::Integer));
        let moved = sizes(CanvasNode::spawn(
            CanvasNode::reference("quantity", CanvasType::Integer),
            CanvasNode::single_order_task(),
        ));
        // Before relinking the moved reference finds the order's own field.
        let stale = find_referent(&at(&moved, "copy/trigger")).unwrap();
        assert_eq!(stale.path().to_string(), "copy/task/quantity");

        let relinked = relink(&at(&original, "copy"), &at(&moved, "copy/trigger"));
        let reference = at(&relinked, "copy/trigger");
        assert_eq!(referent_string(reference.node()), Some("<quantity"));
        assert_eq!(find_referent(&reference).unwrap().path().to_string(), "quantity");
    }

    #[test]
    fn relink_keeps_references_inside_the_moved_subtree() {
        let pair = CanvasNode::chain(vec![CanvasNode::reference("i1", CanvasType::Integer), integer(1)]);
        let original = sizes(pair.clone());
        let moved = sizes(CanvasNode::chain(vec![pair]));
        let relinked = relink(&at(&original, "copy"), &at(&moved, "copy/i0"));
        assert_eq!(relinked, moved);
        assert_eq!(
            find_referent(&at(&relinked, "copy/i0/i0")).unwrap().path().to_string(),
            "copy/i0/i1"
        );
    }

    #[test]
    fn relink_removes_escapes_after_moving_up() {
        let original = sizes(CanvasNode::chain(vec![CanvasNode::reference("<quantity", CanvasType::Integer)]));
        let moved = sizes(CanvasNode::reference("<quantity", CanvasType::Integer));
        let relinked = relink(&at(&original, "copy/i0"), &at(&moved, "copy"));
        let reference = at(&relinked, "copy");
        assert_eq!(referent_string(reference.node()), Some("quantity"));
        assert_eq!(find_referent(&reference).unwrap().path().to_string(), "quantity");
    }

    #[test]
    fn relink_leaves_a_reference_it_cannot_repair() {
        let original = sizes(CanvasNode::reference("quantity", CanvasType::Integer));
        let moved = CanvasNode::chain(vec![CanvasNode::chain(vec![CanvasNode::reference(
            "quantity",
            CanvasType::Integer,
        )])]);
        let relinked = relink(&at(&original, "copy"), &at(&moved, "i0/i0"));
        assert_eq!(relinked, moved);
    }

    #[test]
    fn task_referents_are_followed_into_their_subtree() {
        let root = CanvasNode::aggregate(vec![
            CanvasNode::reference("i1", CanvasType::Task),
            CanvasNode::spawn(integer(1), CanvasNode::reference("<i0", CanvasType::Task)),
        ]);
        assert!(has_cycle(&at(&root, "i0")));
        assert!(has_cycle(&at(&root, "i1/task")));
        assert!(!is_self_reference(&at(&root, "i0")));
    }
}

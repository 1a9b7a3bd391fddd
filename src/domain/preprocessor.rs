//! Rewrites applied to a validated tree before translation.

use crate::domain::node::{CanvasNode, FoldOperand, NodeKind};

/// Replace each fold combiner's parameters with operand placeholders.
///
/// Returns `None` when the tree contains nothing to rewrite, in which case the
/// caller translates the original tree.
pub fn preprocess(node: &CanvasNode) -> Option<CanvasNode> {
    let rewritten: Vec<Option<CanvasNode>> = node.children().map(preprocess).collect();
    let children_changed = rewritten.iter().any(Option::is_some);
    let current = if children_changed {
        let children = rewritten
            .into_iter()
            .zip(node.children())
            .map(|(new, old)| new.unwrap_or_else(|| old.clone()))
            .collect();
        node.with_children(children)
    } else {
        node.clone()
    };
    match current.kind() {
        NodeKind::Fold => Some(rewrite_fold(&current)),
        _ if children_changed => Some(current),
        _ => None,
    }
}

fn rewrite_fold(fold: &CanvasNode) -> CanvasNode {
    let (Some(combiner), Some(source)) = (fold.child(0), fold.child(1)) else {
        return fold.clone();
    };
    let left = CanvasNode::fold_operand(FoldOperand::Left, fold.canvas_type().clone());
    let right = CanvasNode::fold_operand(FoldOperand::Right, source.canvas_type().clone());
    let combiner = combiner
        .replace_unchecked(0, left)
        .replace_unchecked(1, right);
    fold.replace_unchecked(0, combiner)
}

//! Whole-tree well-formedness checks.
//!
//! Validation never stops at the first problem: every node is visited and
//! every error is reported with the path of the node that caused it.

use std::fmt;

use tracing::debug;

use crate::domain::canvas_type::{CanvasType, Compatibility};
use crate::domain::node::{CanvasNode, NodeKind};
use crate::domain::node_ref::NodeRef;
use crate::domain::path::CanvasPath;
use crate::domain::reference::{find_referent, has_cycle, is_self_reference, is_task_monitor};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub path: CanvasPath,
    pub message: String,
}

impl ValidationError {
    fn new(node: &NodeRef<'_>, message: impl Into<String>) -> Self {
        Self {
            path: node.path(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

pub fn validate(root: &CanvasNode) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    for node in NodeRef::root(root).depth_first() {
        validate_node(&node, &mut errors);
    }
    debug!(errors = errors.len(), "validated canvas");
    errors
}

fn validate_node(node: &NodeRef<'_>, errors: &mut Vec<ValidationError>) {
    if !node.canvas_type().is_native() && !is_task_monitor(node.node()) {
        errors.push(ValidationError::new(node, "Type is not complete."));
    }
    match node.kind() {
        NodeKind::FilePath(path) if path.trim().is_empty() => {
            errors.push(ValidationError::new(node, "File path is empty."));
        }
        NodeKind::Query(field) if field.trim().is_empty() => {
            errors.push(ValidationError::new(node, "Query field is empty."));
        }
        NodeKind::Fold => validate_fold(node, errors),
        NodeKind::Reference(referent) => validate_reference(node, referent, errors),
        NodeKind::Custom(slots) if slots.len() != node.child_count() => {
            errors.push(ValidationError::new(
                node,
                format!(
                    "Expected {} children, found {}.",
                    slots.len(),
                    node.child_count()
                ),
            ));
        }
        NodeKind::Filter
            if node
                .child(0)
                .is_some_and(|c| c.canvas_type() != &CanvasType::Boolean) =>
        {
            errors.push(ValidationError::new(node, "Filter condition must be Boolean."));
        }
        NodeKind::Chain | NodeKind::Aggregate if node.child_count() == 0 => {
            errors.push(ValidationError::new(node, "At least one element is required."));
        }
        _ => {}
    }
}

fn validate_fold(node: &NodeRef<'_>, errors: &mut Vec<ValidationError>) {
    let (Some(combiner), Some(source)) = (node.child(0), node.child(1)) else {
        errors.push(ValidationError::new(node, "Fold requires a combiner and a source."));
        return;
    };
    if combiner.child_count() != 2 {
        errors.push(ValidationError::new(
            node,
            "Fold combiner must take exactly two parameters.",
        ));
        return;
    }
    let (Some(left), Some(right)) = (combiner.child(0), combiner.child(1)) else {
        return;
    };
    if left.canvas_type() != node.canvas_type() {
        errors.push(ValidationError::new(
            node,
            format!(
                "Left operand of type {} does not match the fold type {}.",
                left.canvas_type(),
                node.canvas_type()
            ),
        ));
    }
    if right.canvas_type() != source.canvas_type() {
        errors.push(ValidationError::new(
            node,
            format!(
                "Right operand of type {} does not match the source type {}.",
                right.canvas_type(),
                source.canvas_type()
            ),
        ));
    }
}

fn validate_reference(node: &NodeRef<'_>, referent: &str, errors: &mut Vec<ValidationError>) {
    if referent.is_empty() {
        errors.push(ValidationError::new(node, "Reference is empty."));
        return;
    }
    let Some(target) = find_referent(node) else {
        errors.push(ValidationError::new(
            node,
            format!("Reference \"{referent}\" not found."),
        ));
        return;
    };
    if is_self_reference(node) {
        errors.push(ValidationError::new(node, "Reference refers to itself."));
        return;
    }
    if has_cycle(node) {
        errors.push(ValidationError::new(node, "Reference is cyclic."));
        return;
    }
    if is_task_monitor(target.node()) {
        return;
    }
    if node.canvas_type().compatibility(target.canvas_type()) == Compatibility::None {
        errors.push(ValidationError::new(
            node,
            format!(
                "Reference of type {} is not compatible with {}.",
                node.canvas_type(),
                target.canvas_type()
            ),
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::function::FunctionOp;
    use crate::domain::node::Slot;
    use crate::domain::value::Value;

    fn integer(i: i64) -> CanvasNode {
        CanvasNode::constant(Value::Integer(i))
    }

    fn messages(errors: &[ValidationError]) -> Vec<String> {
        errors.iter().map(|e| e.message.clone()).collect()
    }

    #[test]
    fn valid_chain_with_forward_reference() {
        let root = CanvasNode::chain(vec![CanvasNode::reference("i1", CanvasType::Integer), integer(456)]);
        assert!(validate(&root).is_empty());
    }

    #[test]
    fn incomplete_type_is_reported() {
        let root = CanvasNode::chain(vec![CanvasNode::none(CanvasType::Unknown)]);
        let errors = validate(&root);
        assert_eq!(errors.len(), 2);
        assert!(errors.iter().all(|e| e.message == "Type is not complete."));
        assert_eq!(errors[1].path.to_string(), "i0");
    }

    #[test]
    fn all_errors_are_collected() {
        let root = CanvasNode::custom(
            "Mixed",
            CanvasType::Integer,
            vec![
                (Slot::new("file", CanvasType::Text), CanvasNode::file_path("")),
                (Slot::new("missing", CanvasType::Integer), CanvasNode::reference("nowhere", CanvasType::Integer)),
                (Slot::new("empty", CanvasType::Integer), CanvasNode::reference("", CanvasType::Integer)),
            ],
        );
        let errors = messages(&validate(&root));
        assert!(errors.contains(&"File path is empty.".to_string()));
        assert!(errors.contains(&"Reference \"nowhere\" not found.".to_string()));
        assert!(errors.contains(&"Reference is empty.".to_string()));
    }

    #[test]
    fn self_reference_is_distinct_from_cycle() {
        let root = CanvasNode::chain(vec![CanvasNode::reference("i0", CanvasType::Integer)]);
        assert_eq!(messages(&validate(&root)), ["Reference refers to itself."]);
    }

    #[test]
    fn cyclic_references_are_reported() {
        let root = CanvasNode::chain(vec![
            CanvasNode::reference("i1", CanvasType::Integer),
            CanvasNode::reference("i0", CanvasType::Integer),
        ]);
        let errors = validate(&root);
        assert_eq!(errors.len(), 2);
        assert!(errors.iter().all(|e| e.message == "Reference is cyclic."));
    }

    #[test]
    fn incompatible_reference_type() {
        let root = CanvasNode::chain(vec![
            CanvasNode::reference("i1", CanvasType::Integer),
            CanvasNode::reference("<x", CanvasType::Integer),
        ]);
        let root = CanvasNode::custom(
            "Holder",
            CanvasType::Integer,
            vec![
                (Slot::new("x", CanvasType::Text), CanvasNode::constant(Value::Text("a".into()))),
                (Slot::new("values", CanvasType::Integer), root),
            ],
        );
        let errors = messages(&validate(&root));
        assert!(errors
            .iter()
            .any(|m| m == "Reference of type Integer is not compatible with Text."));
    }

    #[test]
    fn fold_operands_must_match() {
        let combiner = CanvasNode::function(FunctionOp::Addition, vec![integer(0), integer(0)]).unwrap();
        let good = CanvasNode::fold(combiner.clone(), integer(5));
        assert!(validate(&good).is_empty());

        let bad = CanvasNode::fold(combiner, CanvasNode::constant(Value::Money(1.0)));
        let errors = messages(&validate(&bad));
        assert_eq!(
            errors,
            ["Right operand of type Integer does not match the source type Money."]
        );

        let unary = CanvasNode::fold(
            CanvasNode::function(FunctionOp::Abs, vec![integer(1)]).unwrap(),
            integer(5),
        );
        assert_eq!(
            messages(&validate(&unary)),
            ["Fold combiner must take exactly two parameters."]
        );
    }

    #[test]
    fn task_monitor_is_exempt_from_completeness() {
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
        assert!(validate(&root).is_empty());
    }

    #[test]
    fn filter_condition_must_be_boolean() {
        let good = CanvasNode::filter(CanvasNode::constant(Value::Boolean(true)), integer(1));
        assert!(validate(&good).is_empty());
        let bad = CanvasNode::filter(integer(0), integer(1));
        assert_eq!(messages(&validate(&bad)), ["Filter condition must be Boolean."]);
    }

    #[test]
    fn nested_reference_must_exist() {
        let root = CanvasNode::chain(vec![
            CanvasNode::function(FunctionOp::Abs, vec![integer(-3)]).unwrap(),
            CanvasNode::reference("i0/operand", CanvasType::Integer),
            CanvasNode::reference("i0/left", CanvasType::Integer),
        ]);
        let errors = validate(&root);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].path.to_string(), "i2");
        assert_eq!(errors[0].message, "Reference \"i0/left\" not found.");
    }
}

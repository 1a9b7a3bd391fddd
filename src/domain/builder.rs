//! Copy-on-write editing of a canvas tree.

use crate::domain::canvas_type::CanvasType;
use crate::domain::error::CanvasOperationError;
use crate::domain::node::CanvasNode;
use crate::domain::path::CanvasPath;
use crate::domain::value::Value;

/// Applies a series of edits to a working copy of a tree.
///
/// Every operation addresses its target by a path relative to the root of
/// the working tree and fails without changing anything when the path does
/// not resolve or the edit is not type-compatible with the surrounding slots.
/// The base tree passed to [`CanvasNodeBuilder::new`] is never modified.
#[derive(Debug, Clone)]
pub struct CanvasNodeBuilder {
    node: CanvasNode,
}

impl CanvasNodeBuilder {
    pub fn new(base: &CanvasNode) -> Self {
        Self { node: base.clone() }
    }

    /// The current working tree.
    pub fn node(&self) -> &CanvasNode {
        &self.node
    }

    pub fn make(self) -> CanvasNode {
        self.node
    }

    pub fn replace(&mut self, path: &CanvasPath, replacement: &CanvasNode) -> Result<(), CanvasOperationError> {
        self.apply(path, |_| Ok(replacement.clone()))
    }

    pub fn convert(&mut self, path: &CanvasPath, target: &CanvasType) -> Result<(), CanvasOperationError> {
        self.apply(path, |node| node.convert(target))
    }

    pub fn force_convert(&mut self, path: &CanvasPath, target: &CanvasType) -> Result<(), CanvasOperationError> {
        self.apply(path, |node| Ok(node.force_convert(target)))
    }

    pub fn set_visible(&mut self, path: &CanvasPath, visible: bool) -> Result<(), CanvasOperationError> {
        self.apply(path, |node| Ok(node.set_visible(visible)))
    }

    pub fn set_read_only(&mut self, path: &CanvasPath, read_only: bool) -> Result<(), CanvasOperationError> {
        self.apply(path, |node| Ok(node.set_read_only(read_only)))
    }

    pub fn set_metadata(
        &mut self,
        path: &CanvasPath,
        key: &str,
        value: Value,
    ) -> Result<(), CanvasOperationError> {
        self.apply(path, |node| Ok(node.set_metadata(key, value)))
    }

    pub fn delete_metadata(&mut self, path: &CanvasPath, key: &str) -> Result<(), CanvasOperationError> {
        self.apply(path, |node| Ok(node.delete_metadata(key)))
    }

    pub fn reset(&mut self, path: &CanvasPath) -> Result<(), CanvasOperationError> {
        self.apply(path, |node| Ok(node.reset()))
    }

    fn apply(
        &mut self,
        path: &CanvasPath,
        edit: impl FnOnce(&CanvasNode) -> Result<CanvasNode, CanvasOperationError>,
    ) -> Result<(), CanvasOperationError> {
        let not_found = || CanvasOperationError::NodeNotFound { path: path.clone() };
        let indices = self.node.indices_of(path).ok_or_else(not_found)?;
        let target = self.node.at_indices(&indices).ok_or_else(not_found)?;
        let edited = edit(target)?.renamed(target.name().to_string());
        self.node = rebuild(&self.node, &indices, edited)?;
        Ok(())
    }
}

/// Swap the node at `indices`, re-checking each slot on the way back up.
fn rebuild(root: &CanvasNode, indices: &[usize], node: CanvasNode) -> Result<CanvasNode, CanvasOperationError> {
    match indices.split_first() {
        None => Ok(node),
        Some((&first, rest)) => {
            let child = root.child(first).ok_or_else(|| CanvasOperationError::ChildNotFound {
                name: first.to_string(),
            })?;
            let updated = rebuild(child, rest, node)?;
            root.replace_at(first, updated)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::function::FunctionOp;
    use crate::domain::node::NodeKind;
    use crate::domain::order::Side;

    fn path(text: &str) -> CanvasPath {
        CanvasPath::parse(text).unwrap()
    }

    fn program() -> CanvasNode {
        CanvasNode::spawn(
            CanvasNode::constant(Value::Boolean(true)),
            CanvasNode::single_order_task(),
        )
    }

    #[test]
    fn make_without_edits_equals_base() {
        let base = program();
        let builder = CanvasNodeBuilder::new(&base);
        assert_eq!(builder.make(), base);
    }

    #[test]
    fn replace_nested_child() {
        let base = program();
        let mut builder = CanvasNodeBuilder::new(&base);
        builder
            .replace(&path("task/side"), &CanvasNode::constant(Value::Side(Side::Ask)))
            .unwrap();
        let result = builder.make();
        let side = result.get(&path("task/side")).unwrap();
        assert_eq!(side.kind(), &NodeKind::Constant(Value::Side(Side::Ask)));
        assert_eq!(side.name(), "side");
        assert_eq!(
            base.get(&path("task/side")).unwrap().kind(),
            &NodeKind::Constant(Value::Side(Side::Bid))
        );
    }

    #[test]
    fn unresolvable_path_leaves_tree_unchanged() {
        let base = program();
        let mut builder = CanvasNodeBuilder::new(&base);
        let err = builder
            .replace(&path("task/volume"), &CanvasNode::constant(Value::Integer(1)))
            .unwrap_err();
        assert!(matches!(err, CanvasOperationError::NodeNotFound { .. }));
        assert_eq!(builder.make(), base);
    }

    #[test]
    fn incompatible_replacement_is_rejected() {
        let base = program();
        let mut builder = CanvasNodeBuilder::new(&base);
        let err = builder
            .replace(&path("task"), &CanvasNode::constant(Value::Integer(1)))
            .unwrap_err();
        assert!(matches!(err, CanvasOperationError::IncompatibleType { .. }));
    }

    #[test]
    fn convert_propagates_to_parent_type() {
        let base = CanvasNode::chain(vec![CanvasNode::function_default(FunctionOp::Addition)]);
        let mut builder = CanvasNodeBuilder::new(&base);
        builder.convert(&path("i0"), &CanvasType::Money).unwrap();
        let result = builder.make();
        assert_eq!(result.canvas_type(), &CanvasType::Money);
        assert_eq!(result.get(&path("i0/left")).unwrap().canvas_type(), &CanvasType::Money);
    }

    #[test]
    fn flags_and_metadata() {
        let base = program();
        let mut builder = CanvasNodeBuilder::new(&base);
        builder.set_visible(&path("task/currency"), false).unwrap();
        builder.set_read_only(&path("task/currency"), true).unwrap();
        builder
            .set_metadata(&path("task"), "label", Value::Text("entry".into()))
            .unwrap();
        let result = builder.make();
        let currency = result.get(&path("task/currency")).unwrap();
        assert!(!currency.is_visible());
        assert!(currency.is_read_only());
        assert!(result.get(&path("task")).unwrap().find_metadata("label").is_some());

        let mut builder = CanvasNodeBuilder::new(&result);
        builder.delete_metadata(&path("task"), "label").unwrap();
        assert!(builder.make().get(&path("task")).unwrap().find_metadata("label").is_none());
    }

    #[test]
    fn reset_and_force_convert() {
        let base = CanvasNode::chain(vec![CanvasNode::constant(Value::Integer(7))]);
        let mut builder = CanvasNodeBuilder::new(&base);
        builder.reset(&path("i0")).unwrap();
        assert_eq!(
            builder.node().get(&path("i0")).unwrap().kind(),
            &NodeKind::Constant(Value::Integer(0))
        );
        builder.force_convert(&path(""), &CanvasType::Text).unwrap();
        let result = builder.make();
        assert_eq!(result.canvas_type(), &CanvasType::Text);
        assert_eq!(
            result.get(&path("i0")).unwrap().kind(),
            &NodeKind::Constant(Value::Text(String::new()))
        );
    }
}

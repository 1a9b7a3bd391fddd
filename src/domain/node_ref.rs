//! Cursor into a tree that knows the way back up.

use std::collections::VecDeque;
use std::fmt;
use std::ops::Deref;

use crate::domain::node::CanvasNode;
use crate::domain::path::CanvasPath;

/// A node together with the root it was reached from and the child indices
/// leading to it. Equality is positional: two refs are the same node when they
/// share a root object and index path.
#[derive(Clone)]
pub struct NodeRef<'a> {
    root: &'a CanvasNode,
    indices: Vec<usize>,
    node: &'a CanvasNode,
}

impl<'a> NodeRef<'a> {
    pub fn root(root: &'a CanvasNode) -> Self {
        Self {
            root,
            indices: Vec::new(),
            node: root,
        }
    }

    pub fn resolve(root: &'a CanvasNode, path: &CanvasPath) -> Option<Self> {
        let indices = root.indices_of(path)?;
        Self::from_indices(root, indices)
    }

    pub(crate) fn from_indices(root: &'a CanvasNode, indices: Vec<usize>) -> Option<Self> {
        let node = root.at_indices(&indices)?;
        Some(Self {
            root,
            indices,
            node,
        })
    }

    pub fn node(&self) -> &'a CanvasNode {
        self.node
    }

    pub fn tree_root(&self) -> &'a CanvasNode {
        self.root
    }

    pub(crate) fn indices(&self) -> &[usize] {
        &self.indices
    }

    pub fn is_root(&self) -> bool {
        self.indices.is_empty()
    }

    /// Number of ancestors.
    pub fn depth(&self) -> usize {
        self.indices.len()
    }

    pub fn parent(&self) -> Option<NodeRef<'a>> {
        let (_, rest) = self.indices.split_last()?;
        Self::from_indices(self.root, rest.to_vec())
    }

    pub fn child(&self, index: usize) -> Option<NodeRef<'a>> {
        let node = self.node.child(index)?;
        let mut indices = self.indices.clone();
        indices.push(index);
        Some(Self {
            root: self.root,
            indices,
            node,
        })
    }

    pub fn find_child(&self, name: &str) -> Option<NodeRef<'a>> {
        self.child(self.node.child_index(name)?)
    }

    pub fn find_node(&self, name: &str) -> Option<NodeRef<'a>> {
        let relative = self.node.find_node_indices(name)?;
        let mut indices = self.indices.clone();
        indices.extend(relative);
        Self::from_indices(self.root, indices)
    }

    pub fn children(&self) -> impl Iterator<Item = NodeRef<'a>> + '_ {
        (0..self.node.child_count()).filter_map(move |i| self.child(i))
    }

    pub fn path(&self) -> CanvasPath {
        let mut node = self.root;
        let mut names = Vec::with_capacity(self.indices.len());
        for &i in &self.indices {
            if let Some(child) = node.child(i) {
                names.push(child.name().to_string());
                node = child;
            }
        }
        CanvasPath::from_segments(names)
    }

    pub fn same_node(&self, other: &NodeRef<'_>) -> bool {
        std::ptr::eq(self.root, other.root) && self.indices == other.indices
    }

    /// Whether `ancestor` is this node or lies above it.
    pub fn is_within(&self, ancestor: &NodeRef<'_>) -> bool {
        std::ptr::eq(self.root, ancestor.root) && self.indices.starts_with(&ancestor.indices)
    }

    /// Pre-order walk of this node's subtree, starting with the node itself.
    pub fn depth_first(&self) -> Vec<NodeRef<'a>> {
        let mut result = Vec::new();
        let mut stack = vec![self.clone()];
        while let Some(node) = stack.pop() {
            let children: Vec<NodeRef<'a>> = node.children().collect();
            result.push(node);
            stack.extend(children.into_iter().rev());
        }
        result
    }

    pub fn breadth_first(&self) -> Vec<NodeRef<'a>> {
        let mut result = Vec::new();
        let mut queue = VecDeque::from([self.clone()]);
        while let Some(node) = queue.pop_front() {
            queue.extend(node.children());
            result.push(node);
        }
        result
    }
}

impl<'a> Deref for NodeRef<'a> {
    type Target = CanvasNode;

    fn deref(&self) -> &CanvasNode {
        self.node
    }
}

impl fmt::Debug for NodeRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeRef")
            .field("path", &self.path().to_string())
            .field("text", &self.node.text())
            .finish()
    }
}

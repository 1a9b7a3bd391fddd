//! The immutable canvas node tree.
//!
//! A [`CanvasNode`] owns its children through `Arc`s, so every edit produces a
//! new node that shares all untouched subtrees with its source. Nodes never
//! store a parent link; upward navigation goes through
//! [`NodeRef`](crate::domain::node_ref::NodeRef).

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::domain::canvas_type::{CanvasType, Compatibility, RecordField, RecordType};
use crate::domain::error::CanvasOperationError;
use crate::domain::function::FunctionOp;
use crate::domain::order::{ExecutionReport, TimeAndSale};
use crate::domain::path::CanvasPath;
use crate::domain::value::Value;

/// Which side of a fold's combiner a placeholder stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FoldOperand {
    Left,
    Right,
}

/// What a file reader does with a line it cannot parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ReadErrorPolicy {
    /// Drop the line and keep reading.
    Skip,
    /// Treat the line as the end of the file.
    Stop,
    /// Fail the evaluation.
    #[default]
    Fail,
}

/// A named, typed child position of a custom node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Slot {
    pub name: String,
    pub slot_type: CanvasType,
}

impl Slot {
    pub fn new(name: impl Into<String>, slot_type: CanvasType) -> Self {
        Self {
            name: name.into(),
            slot_type,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NodeKind {
    Constant(Value),
    None,
    Chain,
    Spawn,
    Until,
    When,
    Aggregate,
    Function(FunctionOp),
    /// Holds the first value of its source.
    Static,
    /// Passes source values through while its condition is true.
    Filter,
    Fold,
    FoldOperand(FoldOperand),
    FilePath(String),
    FileReader(ReadErrorPolicy),
    Record(RecordType),
    Query(String),
    TimeAndSaleQuery,
    SingleOrderTask,
    ExecutionReportMonitor,
    TaskMonitor,
    Interactions,
    /// Stores the escape string of its target.
    Reference(String),
    Custom(Vec<Slot>),
}

/// Field slots of a single order task, in child order.
pub const ORDER_FIELDS: [(&str, CanvasType); 8] = [
    ("security", CanvasType::Security),
    ("order_type", CanvasType::OrderType),
    ("side", CanvasType::Side),
    ("destination", CanvasType::Destination),
    ("quantity", CanvasType::Integer),
    ("price", CanvasType::Money),
    ("currency", CanvasType::Currency),
    ("time_in_force", CanvasType::TimeInForce),
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanvasNode {
    kind: NodeKind,
    #[serde(rename = "type")]
    canvas_type: CanvasType,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    text: String,
    #[serde(default)]
    name: String,
    visible: bool,
    read_only: bool,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    metadata: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    children: Vec<Arc<CanvasNode>>,
}

impl CanvasNode {
    fn with_kind(kind: NodeKind, canvas_type: CanvasType, children: Vec<(String, CanvasNode)>) -> Self {
        Self {
            kind,
            canvas_type,
            text: String::new(),
            name: String::new(),
            visible: true,
            read_only: false,
            metadata: BTreeMap::new(),
            children: children
                .into_iter()
                .map(|(name, child)| Arc::new(child.renamed(name)))
                .collect(),
        }
    }

    pub fn constant(value: Value) -> Self {
        let canvas_type = value.native_type().unwrap_or(CanvasType::Unknown);
        Self::with_kind(NodeKind::Constant(value), canvas_type, Vec::new())
    }

    /// A record constant needs its record type spelled out.
    pub fn record_constant(record_type: RecordType, value: Value) -> Self {
        Self::with_kind(
            NodeKind::Constant(value),
            CanvasType::Record(record_type),
            Vec::new(),
        )
    }

    pub fn none(canvas_type: CanvasType) -> Self {
        Self::with_kind(NodeKind::None, canvas_type, Vec::new())
    }

    /// Sequential composition; elements are named `i0`, `i1`, ...
    pub fn chain(elements: Vec<CanvasNode>) -> Self {
        let canvas_type = elements
            .iter()
            .try_fold(CanvasType::Unknown, |t, e| t.intersect(&e.canvas_type))
            .unwrap_or(CanvasType::Unknown);
        let children = elements
            .into_iter()
            .enumerate()
            .map(|(i, e)| (format!("i{i}"), e))
            .collect();
        Self::with_kind(NodeKind::Chain, canvas_type, children)
    }

    pub fn spawn(trigger: CanvasNode, task: CanvasNode) -> Self {
        Self::with_kind(
            NodeKind::Spawn,
            CanvasType::Task,
            vec![("trigger".into(), trigger), ("task".into(), task)],
        )
    }

    pub fn until(condition: CanvasNode, task: CanvasNode) -> Self {
        Self::with_kind(
            NodeKind::Until,
            CanvasType::Task,
            vec![("condition".into(), condition), ("task".into(), task)],
        )
    }

    pub fn when(condition: CanvasNode, task: CanvasNode) -> Self {
        Self::with_kind(
            NodeKind::When,
            CanvasType::Task,
            vec![("condition".into(), condition), ("task".into(), task)],
        )
    }

    pub fn aggregate(tasks: Vec<CanvasNode>) -> Self {
        let children = tasks
            .into_iter()
            .enumerate()
            .map(|(i, t)| (format!("i{i}"), t))
            .collect();
        Self::with_kind(NodeKind::Aggregate, CanvasType::Task, children)
    }

    /// A function whose parameters are untyped placeholders.
    pub fn function_default(op: FunctionOp) -> Self {
        let signatures = op.signatures();
        let arguments = op
            .parameter_names()
            .iter()
            .enumerate()
            .map(|(i, _)| {
                let members = signatures.iter().map(|s| s.parameters[i].clone()).collect();
                CanvasNode::none(CanvasType::from_members(members).unwrap_or(CanvasType::Unknown))
            })
            .collect();
        Self::function_unchecked(op, arguments)
    }

    pub fn function(op: FunctionOp, arguments: Vec<CanvasNode>) -> Result<Self, CanvasOperationError> {
        let names = op.parameter_names();
        if arguments.len() != names.len() {
            return Err(CanvasOperationError::Invalid {
                reason: format!(
                    "{} takes {} argument(s), {} given",
                    op.name(),
                    names.len(),
                    arguments.len()
                ),
            });
        }
        Self::function_unchecked(op, arguments).rederive()
    }

    fn function_unchecked(op: FunctionOp, arguments: Vec<CanvasNode>) -> Self {
        let children = op
            .parameter_names()
            .iter()
            .zip(arguments)
            .map(|(n, a)| (n.to_string(), a))
            .collect();
        let mut node = Self::with_kind(NodeKind::Function(op), CanvasType::Unknown, children);
        node.canvas_type = node.function_result_type().unwrap_or(CanvasType::Unknown);
        node
    }

    pub fn static_value(source: CanvasNode) -> Self {
        let canvas_type = source.canvas_type.clone();
        Self::with_kind(NodeKind::Static, canvas_type, vec![("source".into(), source)])
    }

    pub fn filter(condition: CanvasNode, source: CanvasNode) -> Self {
        let canvas_type = source.canvas_type.clone();
        Self::with_kind(
            NodeKind::Filter,
            canvas_type,
            vec![("filter".into(), condition), ("source".into(), source)],
        )
    }

    /// Accumulates `source` through `combiner`, whose two parameters stand
    /// for the running value and the next source value.
    pub fn fold(combiner: CanvasNode, source: CanvasNode) -> Self {
        let canvas_type = combiner.canvas_type.clone();
        Self::with_kind(
            NodeKind::Fold,
            canvas_type,
            vec![("combiner".into(), combiner), ("source".into(), source)],
        )
    }

    pub fn fold_operand(side: FoldOperand, canvas_type: CanvasType) -> Self {
        Self::with_kind(NodeKind::FoldOperand(side), canvas_type, Vec::new())
    }

    pub fn file_path(path: impl Into<String>) -> Self {
        Self::with_kind(NodeKind::FilePath(path.into()), CanvasType::Text, Vec::new())
    }

    pub fn file_reader(read_type: CanvasType, policy: ReadErrorPolicy, path: CanvasNode) -> Self {
        Self::with_kind(
            NodeKind::FileReader(policy),
            read_type,
            vec![("path".into(), path)],
        )
    }

    pub fn record(record_type: RecordType, fields: Vec<CanvasNode>) -> Self {
        let children = record_type
            .fields
            .iter()
            .zip(fields)
            .map(|(f, n)| (f.name.clone(), n))
            .collect();
        Self::with_kind(
            NodeKind::Record(record_type.clone()),
            CanvasType::Record(record_type),
            children,
        )
    }

    pub fn query(field: impl Into<String>, record: CanvasNode) -> Self {
        let mut node = Self::with_kind(
            NodeKind::Query(field.into()),
            CanvasType::Unknown,
            vec![("record".into(), record)],
        );
        if let Some(field_type) = node.query_field_type() {
            node.canvas_type = field_type;
        }
        node
    }

    pub fn time_and_sale_query(security: CanvasNode) -> Self {
        Self::with_kind(
            NodeKind::TimeAndSaleQuery,
            CanvasType::Record(TimeAndSale::record_type()),
            vec![("security".into(), security)],
        )
    }

    /// An order task whose fields hold default constants.
    pub fn single_order_task() -> Self {
        let children = ORDER_FIELDS
            .iter()
            .map(|(name, field_type)| {
                let field = Value::default_for(field_type)
                    .map(CanvasNode::constant)
                    .unwrap_or_else(|| CanvasNode::none(field_type.clone()));
                (name.to_string(), field)
            })
            .collect();
        Self::with_kind(NodeKind::SingleOrderTask, CanvasType::Task, children)
    }

    pub fn execution_report_monitor(task: CanvasNode) -> Self {
        Self::with_kind(
            NodeKind::ExecutionReportMonitor,
            CanvasType::Record(ExecutionReport::record_type()),
            vec![("task".into(), task)],
        )
    }

    pub fn task_monitor(monitor: CanvasNode) -> Self {
        let canvas_type = monitor.canvas_type.clone();
        Self::with_kind(
            NodeKind::TaskMonitor,
            canvas_type,
            vec![("monitor".into(), monitor)],
        )
    }

    pub fn interactions_record_type() -> RecordType {
        RecordType::new(
            "Interactions",
            vec![
                RecordField::new("default_quantity", CanvasType::Integer),
                RecordField::new("quantity_increment", CanvasType::Integer),
                RecordField::new("price_increment", CanvasType::Money),
                RecordField::new("cancel_on_fill", CanvasType::Boolean),
            ],
        )
    }

    pub fn interactions() -> Self {
        Self::with_kind(
            NodeKind::Interactions,
            CanvasType::Record(Self::interactions_record_type()),
            vec![
                ("default_quantity".into(), CanvasNode::constant(Value::Integer(100))),
                ("quantity_increment".into(), CanvasNode::constant(Value::Integer(100))),
                ("price_increment".into(), CanvasNode::constant(Value::Money(0.01))),
                ("cancel_on_fill".into(), CanvasNode::constant(Value::Boolean(false))),
            ],
        )
    }

    pub fn reference(referent: impl Into<String>, canvas_type: CanvasType) -> Self {
        Self::with_kind(NodeKind::Reference(referent.into()), canvas_type, Vec::new())
    }

    /// A node with a fixed schema of named, typed slots.
    pub fn custom(
        text: impl Into<String>,
        canvas_type: CanvasType,
        slots: Vec<(Slot, CanvasNode)>,
    ) -> Self {
        let (schema, children): (Vec<Slot>, Vec<(String, CanvasNode)>) = slots
            .into_iter()
            .map(|(slot, child)| {
                let name = slot.name.clone();
                (slot, (name, child))
            })
            .unzip();
        let mut node = Self::with_kind(NodeKind::Custom(schema), canvas_type, children);
        node.text = text.into();
        node
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    pub fn canvas_type(&self) -> &CanvasType {
        &self.canvas_type
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn metadata(&self) -> &BTreeMap<String, Value> {
        &self.metadata
    }

    pub fn find_metadata(&self, key: &str) -> Option<&Value> {
        self.metadata.get(key)
    }

    /// Display text: the explicit text if one was set, otherwise derived
    /// from the node's kind.
    pub fn text(&self) -> String {
        if !self.text.is_empty() {
            return self.text.clone();
        }
        match &self.kind {
            NodeKind::Constant(value) => value.to_string(),
            NodeKind::None => "None".to_string(),
            NodeKind::Chain => "Chain".to_string(),
            NodeKind::Spawn => "Spawn".to_string(),
            NodeKind::Until => "Until".to_string(),
            NodeKind::When => "When".to_string(),
            NodeKind::Aggregate => "Aggregate".to_string(),
            NodeKind::Function(op) => op.name().to_string(),
            NodeKind::Static => "Static".to_string(),
            NodeKind::Filter => "Filter".to_string(),
            NodeKind::Fold => "Fold".to_string(),
            NodeKind::FoldOperand(FoldOperand::Left) => "Left Operand".to_string(),
            NodeKind::FoldOperand(FoldOperand::Right) => "Right Operand".to_string(),
            NodeKind::FilePath(path) => path.clone(),
            NodeKind::FileReader(_) => "File Reader".to_string(),
            NodeKind::Record(record) => record.name.clone(),
            NodeKind::Query(field) => field.clone(),
            NodeKind::TimeAndSaleQuery => "Time And Sales".to_string(),
            NodeKind::SingleOrderTask => "Single Order".to_string(),
            NodeKind::ExecutionReportMonitor => "Execution Report Monitor".to_string(),
            NodeKind::TaskMonitor => "Task Monitor".to_string(),
            NodeKind::Interactions => "Interactions".to_string(),
            NodeKind::Reference(referent) => referent.clone(),
            NodeKind::Custom(_) => "Custom".to_string(),
        }
    }

    pub fn children(&self) -> impl ExactSizeIterator<Item = &CanvasNode> {
        self.children.iter().map(|c| c.as_ref())
    }

    pub fn child(&self, index: usize) -> Option<&CanvasNode> {
        self.children.get(index).map(|c| c.as_ref())
    }

    pub fn child_count(&self) -> usize {
        self.children.len()
    }

    pub fn child_index(&self, name: &str) -> Option<usize> {
        self.children.iter().position(|c| c.name == name)
    }

    pub fn find_child(&self, name: &str) -> Option<&CanvasNode> {
        self.children.iter().find(|c| c.name == name).map(|c| c.as_ref())
    }

    /// Descendant lookup by name: direct children first, then each child's
    /// subtree in order. Custom, chain and aggregate nodes only look at their
    /// direct children.
    pub fn find_node(&self, name: &str) -> Option<&CanvasNode> {
        let indices = self.find_node_indices(name)?;
        self.at_indices(&indices)
    }

    pub(crate) fn find_node_indices(&self, name: &str) -> Option<Vec<usize>> {
        if let Some(index) = self.child_index(name) {
            return Some(vec![index]);
        }
        if matches!(
            self.kind,
            NodeKind::Custom(_) | NodeKind::Chain | NodeKind::Aggregate
        ) {
            return None;
        }
        self.children.iter().enumerate().find_map(|(i, child)| {
            child.find_node_indices(name).map(|mut rest| {
                rest.insert(0, i);
                rest
            })
        })
    }

    pub(crate) fn at_indices(&self, indices: &[usize]) -> Option<&CanvasNode> {
        indices
            .iter()
            .try_fold(self, |node, &i| node.child(i))
    }

    pub(crate) fn indices_of(&self, path: &CanvasPath) -> Option<Vec<usize>> {
        let mut node = self;
        let mut indices = Vec::with_capacity(path.len());
        for name in path.segments() {
            let index = node.child_index(name)?;
            indices.push(index);
            node = node.child(index)?;
        }
        Some(indices)
    }

    /// The node at `path`, relative to this node.
    pub fn get(&self, path: &CanvasPath) -> Option<&CanvasNode> {
        let indices = self.indices_of(path)?;
        self.at_indices(&indices)
    }

    /// The type a child at `index` may take.
    pub fn slot_type(&self, index: usize) -> CanvasType {
        match &self.kind {
            NodeKind::Chain => self
                .children
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != index)
                .try_fold(CanvasType::Unknown, |t, (_, c)| t.intersect(&c.canvas_type))
                .unwrap_or(CanvasType::Unknown),
            NodeKind::Spawn => match index {
                0 => CanvasType::Unknown,
                _ => CanvasType::Task,
            },
            NodeKind::Until | NodeKind::When => match index {
                0 => CanvasType::Boolean,
                _ => CanvasType::Task,
            },
            NodeKind::Aggregate | NodeKind::ExecutionReportMonitor => CanvasType::Task,
            NodeKind::Function(op) => {
                let mut arguments: Vec<CanvasType> =
                    self.children.iter().map(|c| c.canvas_type.clone()).collect();
                if let Some(argument) = arguments.get_mut(index) {
                    *argument = CanvasType::Unknown;
                }
                let members = op
                    .matching_signatures(&arguments, &CanvasType::Unknown)
                    .into_iter()
                    .filter_map(|s| s.parameters.get(index).cloned())
                    .collect();
                CanvasType::from_members(members).unwrap_or(CanvasType::Unknown)
            }
            NodeKind::Fold => match index {
                0 => self.canvas_type.clone(),
                _ => CanvasType::Unknown,
            },
            NodeKind::FileReader(_) => CanvasType::Text,
            NodeKind::Static => self.canvas_type.clone(),
            NodeKind::Filter => match index {
                0 => CanvasType::Boolean,
                _ => self.canvas_type.clone(),
            },
            NodeKind::Record(record) => record
                .fields
                .get(index)
                .map(|f| f.field_type.clone())
                .unwrap_or(CanvasType::Unknown),
            NodeKind::TimeAndSaleQuery => CanvasType::Security,
            NodeKind::SingleOrderTask => ORDER_FIELDS
                .get(index)
                .map(|(_, t)| t.clone())
                .unwrap_or(CanvasType::Unknown),
            NodeKind::Interactions => Self::interactions_record_type()
                .fields
                .get(index)
                .map(|f| f.field_type.clone())
                .unwrap_or(CanvasType::Unknown),
            NodeKind::Custom(slots) => slots
                .get(index)
                .map(|s| s.slot_type.clone())
                .unwrap_or(CanvasType::Unknown),
            _ => CanvasType::Unknown,
        }
    }

    fn function_result_type(&self) -> Option<CanvasType> {
        let NodeKind::Function(op) = &self.kind else {
            return None;
        };
        let arguments: Vec<CanvasType> = self.children.iter().map(|c| c.canvas_type.clone()).collect();
        let results = op
            .matching_signatures(&arguments, &CanvasType::Unknown)
            .into_iter()
            .map(|s| s.result)
            .collect();
        CanvasType::from_members(results)
    }

    fn query_field_type(&self) -> Option<CanvasType> {
        let NodeKind::Query(field) = &self.kind else {
            return None;
        };
        match self.child(0).map(|r| &r.canvas_type) {
            Some(CanvasType::Record(record)) => record.field(field).map(|f| f.field_type.clone()),
            _ => None,
        }
    }

    /// Recompute a type that depends on the children.
    fn rederive(mut self) -> Result<Self, CanvasOperationError> {
        match &self.kind {
            NodeKind::Chain => {
                self.canvas_type = self
                    .children
                    .iter()
                    .try_fold(CanvasType::Unknown, |t, c| t.intersect(&c.canvas_type))
                    .ok_or_else(|| CanvasOperationError::Invalid {
                        reason: "chain elements have no common type".to_string(),
                    })?;
            }
            NodeKind::Function(op) => {
                let op = *op;
                self.canvas_type = self.function_result_type().ok_or_else(|| {
                    CanvasOperationError::Invalid {
                        reason: format!("no signature of {} matches its arguments", op.name()),
                    }
                })?;
            }
            NodeKind::Fold => {
                if let Some(combiner) = self.child(0) {
                    self.canvas_type = combiner.canvas_type.clone();
                }
            }
            NodeKind::Query(_) => {
                if let Some(field_type) = self.query_field_type() {
                    self.canvas_type = field_type;
                }
            }
            NodeKind::TaskMonitor | NodeKind::Static => {
                if let Some(source) = self.child(0) {
                    self.canvas_type = source.canvas_type.clone();
                }
            }
            NodeKind::Filter => {
                if let Some(source) = self.child(1) {
                    self.canvas_type = source.canvas_type.clone();
                }
            }
            _ => {}
        }
        Ok(self)
    }

    pub(crate) fn renamed(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// A copy carrying explicit display text.
    pub fn with_text(&self, text: impl Into<String>) -> Self {
        let mut node = self.clone();
        node.text = text.into();
        node
    }

    /// A copy coerced to `target`, which must be compatible with this node's type.
    pub fn convert(&self, target: &CanvasType) -> Result<CanvasNode, CanvasOperationError> {
        if &self.canvas_type == target {
            return Ok(self.clone());
        }
        if self.canvas_type.compatibility(target) == Compatibility::None {
            return Err(CanvasOperationError::IncompatibleType {
                from: self.canvas_type.clone(),
                to: target.clone(),
            });
        }
        let mut node = self.clone();
        match &self.kind {
            NodeKind::Chain => {
                node.children = self
                    .children
                    .iter()
                    .map(|c| c.convert(target).map(Arc::new))
                    .collect::<Result<_, _>>()?;
                node.canvas_type = target.clone();
            }
            NodeKind::Function(op) => {
                let parameters: Vec<CanvasType> = (0..self.children.len())
                    .map(|i| {
                        let members = op
                            .signatures()
                            .into_iter()
                            .filter(|s| target.accepts(&s.result))
                            .filter_map(|s| s.parameters.get(i).cloned())
                            .collect();
                        CanvasType::from_members(members).unwrap_or(CanvasType::Unknown)
                    })
                    .collect();
                for (i, parameter) in parameters.iter().enumerate() {
                    let child = &self.children[i];
                    if let Some(narrowed) = child.canvas_type.intersect(parameter) {
                        if child.canvas_type.accepts(&narrowed) {
                            node.children[i] = Arc::new(child.convert(&narrowed)?);
                        }
                    }
                }
                node = node.rederive()?;
                if !target.accepts(&node.canvas_type) {
                    return Err(CanvasOperationError::IncompatibleType {
                        from: self.canvas_type.clone(),
                        to: target.clone(),
                    });
                }
                if node.canvas_type != *target {
                    node.canvas_type = target.clone();
                }
            }
            NodeKind::Fold => {
                if let Some(combiner) = self.children.first() {
                    node.children[0] = Arc::new(combiner.convert(target)?);
                }
                node.canvas_type = target.clone();
            }
            NodeKind::TaskMonitor | NodeKind::Static => {
                if let Some(source) = self.children.first() {
                    node.children[0] = Arc::new(source.convert(target)?);
                }
                node.canvas_type = target.clone();
            }
            NodeKind::Filter => {
                if let Some(source) = self.children.get(1) {
                    node.children[1] = Arc::new(source.convert(target)?);
                }
                node.canvas_type = target.clone();
            }
            _ => node.canvas_type = target.clone(),
        }
        Ok(node)
    }

    /// A copy with the child `name` swapped for `replacement`.
    pub fn replace(&self, name: &str, replacement: &CanvasNode) -> Result<CanvasNode, CanvasOperationError> {
        let index = self
            .child_index(name)
            .ok_or_else(|| CanvasOperationError::ChildNotFound {
                name: name.to_string(),
            })?;
        self.replace_at(index, replacement.clone())
    }

    pub(crate) fn replace_at(&self, index: usize, replacement: CanvasNode) -> Result<CanvasNode, CanvasOperationError> {
        let Some(current) = self.children.get(index) else {
            return Err(CanvasOperationError::ChildNotFound {
                name: index.to_string(),
            });
        };
        let slot = self.slot_type(index);
        if slot.compatibility(&replacement.canvas_type) == Compatibility::None {
            return Err(CanvasOperationError::IncompatibleType {
                from: replacement.canvas_type.clone(),
                to: slot,
            });
        }
        let mut node = self.clone();
        node.children[index] = Arc::new(replacement.renamed(current.name.clone()));
        node.rederive()
    }

    /// Swap a child without any type checking. Only for rewrites that run
    /// after validation.
    pub(crate) fn replace_unchecked(&self, index: usize, replacement: CanvasNode) -> CanvasNode {
        let mut node = self.clone();
        if let Some(current) = node.children.get(index) {
            let name = current.name.clone();
            node.children[index] = Arc::new(replacement.renamed(name));
        }
        node
    }

    pub fn set_visible(&self, visible: bool) -> CanvasNode {
        let mut node = self.clone();
        node.visible = visible;
        node
    }

    pub fn set_read_only(&self, read_only: bool) -> CanvasNode {
        let mut node = self.clone();
        node.read_only = read_only;
        node
    }

    pub fn set_metadata(&self, key: impl Into<String>, value: Value) -> CanvasNode {
        let mut node = self.clone();
        node.metadata.insert(key.into(), value);
        node
    }

    pub fn delete_metadata(&self, key: &str) -> CanvasNode {
        let mut node = self.clone();
        node.metadata.remove(key);
        node
    }

    /// Constants return to their type's default value; other nodes are
    /// returned as they are.
    pub fn reset(&self) -> CanvasNode {
        match (&self.kind, Value::default_for(&self.canvas_type)) {
            (NodeKind::Constant(_), Some(value)) => {
                let mut node = self.clone();
                node.kind = NodeKind::Constant(value);
                node
            }
            _ => self.clone(),
        }
    }

    /// Rebuild this node at an arbitrary type: the node's default form at
    /// `target`, keeping every child that still fits its slot.
    pub fn force_convert(&self, target: &CanvasType) -> CanvasNode {
        if let Ok(node) = self.convert(target) {
            return node;
        }
        let base = match &self.kind {
            NodeKind::Constant(_) => Value::default_for(target).map(CanvasNode::constant),
            NodeKind::Function(op) => CanvasNode::function_default(*op).convert(target).ok(),
            NodeKind::Chain => Some(CanvasNode::chain(
                self.children().map(|c| c.force_convert(target)).collect(),
            )),
            NodeKind::Reference(referent) => Some(CanvasNode::reference(referent.clone(), target.clone())),
            NodeKind::FileReader(policy) => {
                Some(CanvasNode::file_reader(target.clone(), *policy, CanvasNode::file_path("")))
            }
            NodeKind::FoldOperand(side) => Some(CanvasNode::fold_operand(*side, target.clone())),
            NodeKind::Static => Some(CanvasNode::static_value(CanvasNode::none(target.clone()))),
            NodeKind::Filter => Some(CanvasNode::filter(
                CanvasNode::none(CanvasType::Boolean),
                CanvasNode::none(target.clone()),
            )),
            _ => None,
        };
        let mut node = base.unwrap_or_else(|| CanvasNode::none(target.clone()));
        if !matches!(self.kind, NodeKind::Chain) {
            for child in self.children() {
                let Some(index) = node.child_index(&child.name) else {
                    continue;
                };
                let slot = node.slot_type(index);
                let Some(fitted) = child.canvas_type.intersect(&slot) else {
                    continue;
                };
                if let Ok(converted) = child.convert(&fitted) {
                    if let Ok(replaced) = node.replace_at(index, converted) {
                        node = replaced;
                    }
                }
            }
        }
        node.name = self.name.clone();
        node.visible = self.visible;
        node.read_only = self.read_only;
        node.metadata = self.metadata.clone();
        node
    }

    /// Rebuild the same node with a new list of children.
    pub(crate) fn with_children(&self, children: Vec<CanvasNode>) -> CanvasNode {
        let mut node = self.clone();
        node.children = self
            .children
            .iter()
            .zip(children)
            .map(|(old, new)| Arc::new(new.renamed(old.name.clone())))
            .collect();
        node
    }

    /// Apply `f` to the metadata of this node and all its descendants.
    pub(crate) fn map_metadata(&self, f: &dyn Fn(&mut BTreeMap<String, Value>)) -> CanvasNode {
        let mut node = self.clone();
        f(&mut node.metadata);
        node.children = self
            .children
            .iter()
            .map(|c| Arc::new(c.map_metadata(f)))
            .collect();
        node
    }
}

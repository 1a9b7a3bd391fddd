//! Lowers a validated, preprocessed tree into a graph of reactors.
//!
//! Translation is keyed by path: each node is translated at most once per
//! [`TranslationContext`], and references resolve to the translation of
//! their referent. Task instances that are created at run time (by spawn,
//! until and when) get a child context scoped to the task's subtree, so
//! everything outside the subtree is shared with the enclosing graph.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::debug;

use crate::domain::canvas_type::CanvasType;
use crate::domain::error::{CanvasError, ReactorError};
use crate::domain::node::{CanvasNode, NodeKind};
use crate::domain::node_ref::NodeRef;
use crate::domain::order_channel::{OrderChannel, OrderPublisher};
use crate::domain::path::CanvasPath;
use crate::domain::reactor::task::{
    AggregateReactor, ExecutionReportMonitorReactor, SingleOrderReactor, SpawnReactor, TaskFactory,
    UntilReactor, WhenReactor,
};
use crate::domain::reactor::value::{
    ChainReactor, ConstantReactor, FileReaderReactor, FilterReactor, FirstValueReactor,
    FoldParameterReactor, FoldReactor, FoldSlot, FunctionReactor, MirrorReactor, NoneReactor,
    QueryReactor, RecordReactor, StaticReactor, TimeAndSalesReactor,
};
use crate::domain::reactor::{CancelToken, Reactor, ReactorHandle};
use crate::domain::reference::find_referent;
use crate::domain::value::Value;
use crate::ports::market_data_port::MarketDataPort;

/// A node lowered into the graph.
#[derive(Debug, Clone)]
pub struct Translation {
    pub reactor: ReactorHandle,
    pub result_type: CanvasType,
    /// Orders submitted by the translated task, if the node is a task.
    pub orders: Option<OrderPublisher>,
}

impl Translation {
    pub fn new(reactor: ReactorHandle, result_type: CanvasType) -> Self {
        Self {
            reactor,
            result_type,
            orders: None,
        }
    }
}

/// The services a graph connects to.
#[derive(Clone)]
pub struct TranslationEnvironment {
    pub channel: OrderChannel,
    pub market_data: Option<Rc<dyn MarketDataPort>>,
}

pub struct TranslationContext {
    root: Rc<CanvasNode>,
    environment: TranslationEnvironment,
    cancel: CancelToken,
    parent: Option<Rc<TranslationContext>>,
    scope: CanvasPath,
    translations: RefCell<HashMap<CanvasPath, Translation>>,
    in_progress: RefCell<HashSet<CanvasPath>>,
}

impl TranslationContext {
    pub fn new(root: Rc<CanvasNode>, environment: TranslationEnvironment, cancel: CancelToken) -> Rc<Self> {
        Rc::new(Self {
            root,
            environment,
            cancel,
            parent: None,
            scope: CanvasPath::root(),
            translations: RefCell::new(HashMap::new()),
            in_progress: RefCell::new(HashSet::new()),
        })
    }

    /// A context that translates the subtree at `scope` afresh and defers
    /// everything else to this one.
    pub fn child(self: &Rc<Self>, scope: CanvasPath, cancel: CancelToken) -> Rc<Self> {
        Rc::new(Self {
            root: self.root.clone(),
            environment: self.environment.clone(),
            cancel,
            parent: Some(self.clone()),
            scope,
            translations: RefCell::new(HashMap::new()),
            in_progress: RefCell::new(HashSet::new()),
        })
    }

    pub fn root(&self) -> &CanvasNode {
        &self.root
    }

    pub fn environment(&self) -> &TranslationEnvironment {
        &self.environment
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// The translation of the node at `path`, if this context already made one.
    pub fn find_translation(&self, path: &CanvasPath) -> Option<Translation> {
        self.translations.borrow().get(path).cloned()
    }

    pub fn add(&self, path: CanvasPath, translation: Translation) {
        self.translations.borrow_mut().insert(path, translation);
    }
}

impl fmt::Debug for TranslationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TranslationContext")
            .field("scope", &self.scope.to_string())
            .field("translations", &self.translations.borrow().len())
            .finish()
    }
}

pub fn translate(context: &Rc<TranslationContext>, path: &CanvasPath) -> Result<Translation, CanvasError> {
    if let Some(translation) = context.find_translation(path) {
        return Ok(translation);
    }
    if !path.starts_with(&context.scope) {
        if let Some(parent) = &context.parent {
            return translate(parent, path);
        }
    }
    if !context.in_progress.borrow_mut().insert(path.clone()) {
        return Err(CanvasError::translation(path, "reference is cyclic"));
    }
    let result = build(context, path);
    context.in_progress.borrow_mut().remove(path);
    let translation = result?;
    context.add(path.clone(), translation.clone());
    Ok(translation)
}

fn build(context: &Rc<TranslationContext>, path: &CanvasPath) -> Result<Translation, CanvasError> {
    let root = context.root.clone();
    let node = NodeRef::resolve(&root, path)
        .ok_or_else(|| CanvasError::translation(path, "node not found"))?;
    debug!(path = %path, node = %node.text(), "translating");
    if !node.canvas_type().is_native() && !matches!(node.kind(), NodeKind::TaskMonitor) {
        return Err(CanvasError::translation(path, "type is not complete"));
    }
    match node.kind() {
        NodeKind::Reference(_) => translate_reference(context, &node, path),
        NodeKind::TaskMonitor | NodeKind::Custom(_) => {
            let last = node
                .child_count()
                .checked_sub(1)
                .ok_or_else(|| CanvasError::translation(path, "node has no children"))?;
            translate_child(context, &node, path, last)
        }
        _ if node.canvas_type().is_task() => {
            // Registered up front so that nodes inside the task can refer
            // back to it.
            let handle = ReactorHandle::pending();
            let orders = OrderPublisher::new();
            let translation = Translation {
                reactor: handle.clone(),
                result_type: CanvasType::Task,
                orders: Some(orders.clone()),
            };
            context.add(path.clone(), translation.clone());
            let reactor = match build_task(context, &node, path, &orders) {
                Ok(reactor) => reactor,
                Err(err) => {
                    context.translations.borrow_mut().remove(path);
                    return Err(err);
                }
            };
            handle.install(reactor)?;
            Ok(translation)
        }
        _ => {
            let reactor = build_value(context, &node, path)?;
            Ok(Translation::new(
                ReactorHandle::new(reactor),
                node.canvas_type().clone(),
            ))
        }
    }
}

fn child_path(node: &NodeRef<'_>, path: &CanvasPath, index: usize) -> Result<CanvasPath, CanvasError> {
    let child = node
        .child(index)
        .ok_or_else(|| CanvasError::translation(path, format!("missing child {index}")))?;
    Ok(path.child(child.name()))
}

fn translate_child(
    context: &Rc<TranslationContext>,
    node: &NodeRef<'_>,
    path: &CanvasPath,
    index: usize,
) -> Result<Translation, CanvasError> {
    translate(context, &child_path(node, path, index)?)
}

fn translate_children(
    context: &Rc<TranslationContext>,
    node: &NodeRef<'_>,
    path: &CanvasPath,
) -> Result<Vec<Translation>, CanvasError> {
    (0..node.child_count())
        .map(|i| translate_child(context, node, path, i))
        .collect()
}

fn handles(translations: &[Translation]) -> Vec<ReactorHandle> {
    translations.iter().map(|t| t.reactor.clone()).collect()
}

fn translate_reference(
    context: &Rc<TranslationContext>,
    node: &NodeRef<'_>,
    path: &CanvasPath,
) -> Result<Translation, CanvasError> {
    let referent = find_referent(node)
        .ok_or_else(|| CanvasError::translation(path, "reference does not resolve"))?;
    if referent.same_node(node) {
        return Err(CanvasError::translation(path, "reference refers to itself"));
    }
    let target = translate(context, &referent.path())?;
    if node.is_within(&referent) {
        // The referent is an enclosing task, which commits this node itself.
        return Ok(Translation {
            reactor: ReactorHandle::new(MirrorReactor::new(target.reactor)),
            result_type: node.canvas_type().clone(),
            orders: target.orders,
        });
    }
    Ok(Translation {
        result_type: node.canvas_type().clone(),
        ..target
    })
}

fn build_value(
    context: &Rc<TranslationContext>,
    node: &NodeRef<'_>,
    path: &CanvasPath,
) -> Result<Box<dyn Reactor>, CanvasError> {
    let reactor: Box<dyn Reactor> = match node.kind() {
        NodeKind::Constant(value) => Box::new(ConstantReactor::new(value.clone())),
        NodeKind::None => Box::new(NoneReactor),
        NodeKind::FilePath(file) => Box::new(ConstantReactor::new(Value::Text(file.clone()))),
        NodeKind::Chain => {
            let elements = translate_children(context, node, path)?;
            Box::new(ChainReactor::new(handles(&elements)))
        }
        NodeKind::Function(op) => {
            let arguments = translate_children(context, node, path)?;
            Box::new(FunctionReactor::new(*op, handles(&arguments)))
        }
        NodeKind::Static => {
            let source = translate_child(context, node, path, 0)?;
            Box::new(FirstValueReactor::new(source.reactor))
        }
        NodeKind::Filter => {
            let condition = translate_child(context, node, path, 0)?;
            let source = translate_child(context, node, path, 1)?;
            Box::new(FilterReactor::new(condition.reactor, source.reactor))
        }
        NodeKind::Record(_) | NodeKind::Interactions => {
            let fields = translate_children(context, node, path)?;
            Box::new(RecordReactor::new(handles(&fields)))
        }
        NodeKind::Query(field) => {
            let record = node
                .child(0)
                .ok_or_else(|| CanvasError::translation(path, "query has no record"))?;
            let CanvasType::Record(record_type) = record.canvas_type() else {
                return Err(CanvasError::translation(path, "query source is not a record"));
            };
            let index = record_type.field_index(field).ok_or_else(|| {
                CanvasError::translation(path, format!("record has no field {field}"))
            })?;
            let source = translate_child(context, node, path, 0)?;
            Box::new(QueryReactor::new(source.reactor, index))
        }
        NodeKind::Fold => build_fold(context, node, path)?,
        NodeKind::FoldOperand(_) => {
            return Err(CanvasError::translation(path, "fold operand outside of a fold"));
        }
        NodeKind::FileReader(policy) => {
            let file = translate_child(context, node, path, 0)?;
            Box::new(FileReaderReactor::new(
                file.reactor,
                node.canvas_type().clone(),
                *policy,
            ))
        }
        NodeKind::TimeAndSaleQuery => {
            let security = translate_child(context, node, path, 0)?;
            Box::new(TimeAndSalesReactor::new(
                security.reactor,
                context.environment.market_data.clone(),
            ))
        }
        NodeKind::ExecutionReportMonitor => {
            let task = translate_child(context, node, path, 0)?;
            let orders = task
                .orders
                .ok_or_else(|| CanvasError::translation(path, "monitored node is not a task"))?;
            Box::new(ExecutionReportMonitorReactor::new(
                task.reactor,
                orders,
                context.environment.channel.clone(),
            ))
        }
        other => {
            return Err(CanvasError::translation(
                path,
                format!("{other:?} cannot produce a value of type {}", node.canvas_type()),
            ));
        }
    };
    Ok(reactor)
}

fn build_fold(
    context: &Rc<TranslationContext>,
    node: &NodeRef<'_>,
    path: &CanvasPath,
) -> Result<Box<dyn Reactor>, CanvasError> {
    let combiner = node
        .child(0)
        .ok_or_else(|| CanvasError::translation(path, "fold has no combiner"))?;
    let combiner_path = path.child(combiner.name());
    let left = FoldSlot::new();
    let right = FoldSlot::new();
    for (index, slot) in [(0, &left), (1, &right)] {
        let operand = child_path(&combiner, &combiner_path, index)?;
        let operand_type = combiner
            .child(index)
            .map(|c| c.canvas_type().clone())
            .unwrap_or(CanvasType::Unknown);
        context.add(
            operand,
            Translation::new(
                ReactorHandle::new(FoldParameterReactor::new(slot.clone())),
                operand_type,
            ),
        );
    }
    let combiner = translate(context, &combiner_path)?;
    let source = translate_child(context, node, path, 1)?;
    Ok(Box::new(FoldReactor::new(
        node.canvas_type().clone(),
        combiner.reactor,
        source.reactor,
        left,
        right,
    )))
}

fn build_task(
    context: &Rc<TranslationContext>,
    node: &NodeRef<'_>,
    path: &CanvasPath,
    orders: &OrderPublisher,
) -> Result<Box<dyn Reactor>, CanvasError> {
    let cancel = context.cancel.clone();
    let reactor: Box<dyn Reactor> = match node.kind() {
        NodeKind::None => Box::new(NoneReactor),
        NodeKind::SingleOrderTask => {
            let fields = translate_children(context, node, path)?;
            Box::new(SingleOrderReactor::new(
                handles(&fields),
                context.environment.channel.clone(),
                orders.clone(),
                cancel,
            ))
        }
        NodeKind::Chain | NodeKind::Aggregate => {
            let tasks = translate_children(context, node, path)?;
            for task in &tasks {
                if let Some(source) = &task.orders {
                    orders.add_source(source.clone());
                }
            }
            if matches!(node.kind(), NodeKind::Chain) {
                Box::new(ChainReactor::new(handles(&tasks)))
            } else {
                Box::new(AggregateReactor::new(handles(&tasks), cancel))
            }
        }
        NodeKind::Spawn => {
            let trigger_path = child_path(node, path, 0)?;
            let trigger = translate(context, &trigger_path)?;
            let frozen = (trigger_path, trigger.result_type, trigger.reactor.clone());
            let factory = instance_factory(context, child_path(node, path, 1)?, Some(frozen), orders);
            Box::new(SpawnReactor::new(trigger.reactor, factory, cancel))
        }
        NodeKind::Until | NodeKind::When => {
            let condition = translate_child(context, node, path, 0)?;
            let factory = instance_factory(context, child_path(node, path, 1)?, None, orders);
            if matches!(node.kind(), NodeKind::Until) {
                Box::new(UntilReactor::new(condition.reactor, factory, cancel))
            } else {
                Box::new(WhenReactor::new(condition.reactor, factory, cancel))
            }
        }
        other => {
            return Err(CanvasError::translation(
                path,
                format!("{other:?} cannot run as a task"),
            ));
        }
    };
    Ok(reactor)
}

/// Builds fresh instances of the task at `task_path`. A spawn passes its
/// trigger so that references to it inside the task see the value the
/// trigger had when the instance started.
fn instance_factory(
    context: &Rc<TranslationContext>,
    task_path: CanvasPath,
    frozen: Option<(CanvasPath, CanvasType, ReactorHandle)>,
    orders: &OrderPublisher,
) -> TaskFactory {
    let context: Weak<TranslationContext> = Rc::downgrade(context);
    let orders = orders.clone();
    Box::new(move |token: &CancelToken| {
        let context = context.upgrade().ok_or_else(|| ReactorError::Translation {
            reason: "translation context is gone".to_string(),
        })?;
        let instance = context.child(task_path.clone(), token.clone());
        if let Some((trigger_path, trigger_type, trigger)) = &frozen {
            instance.add(
                trigger_path.clone(),
                Translation::new(
                    ReactorHandle::new(StaticReactor::new(trigger.value())),
                    trigger_type.clone(),
                ),
            );
        }
        let translation = translate(&instance, &task_path).map_err(|e| ReactorError::Translation {
            reason: e.to_string(),
        })?;
        if let Some(source) = translation.orders {
            orders.add_source(source);
        }
        Ok(translation.reactor)
    })
}

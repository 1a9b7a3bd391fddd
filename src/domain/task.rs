//! Task execution: drives a translated tree tick by tick and publishes its
//! state transitions.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::domain::node::CanvasNode;
use crate::domain::order_channel::OrderChannel;
use crate::domain::path::CanvasPath;
use crate::domain::preprocessor::preprocess;
use crate::domain::publisher::Publisher;
use crate::domain::reactor::{CancelToken, ReactorHandle};
use crate::domain::translator::{translate, TranslationContext, TranslationEnvironment};
use crate::domain::validator::validate;
use crate::domain::value::Value;
use crate::ports::market_data_port::MarketDataPort;
use crate::ports::order_execution_port::OrderExecutionPort;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TaskState {
    #[default]
    Ready,
    Initializing,
    Active,
    PendingCancel,
    Canceled,
    Failed,
    Expired,
    Complete,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskState::Canceled | TaskState::Failed | TaskState::Expired | TaskState::Complete
        )
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            TaskState::Ready => "Ready",
            TaskState::Initializing => "Initializing",
            TaskState::Active => "Active",
            TaskState::PendingCancel => "Pending Cancel",
            TaskState::Canceled => "Canceled",
            TaskState::Failed => "Failed",
            TaskState::Expired => "Expired",
            TaskState::Complete => "Complete",
        };
        write!(f, "{text}")
    }
}

/// One published state transition.
#[derive(Debug, Clone, PartialEq)]
pub struct StateEntry {
    pub state: TaskState,
    pub message: Option<String>,
}

/// The services a task runs against.
#[derive(Clone)]
pub struct TaskEnvironment {
    pub execution: Rc<dyn OrderExecutionPort>,
    pub account: String,
    pub market_data: Option<Rc<dyn MarketDataPort>>,
}

pub struct Task {
    node: Rc<CanvasNode>,
    channel: OrderChannel,
    market_data: Option<Rc<dyn MarketDataPort>>,
    cancel: CancelToken,
    publisher: Publisher<StateEntry>,
    state: Cell<TaskState>,
    executed: Cell<bool>,
    canceling: Cell<bool>,
    committing: Cell<bool>,
    sequence: Cell<u64>,
    context: RefCell<Option<Rc<TranslationContext>>>,
    graph: RefCell<Option<ReactorHandle>>,
    attached: RefCell<Vec<ReactorHandle>>,
}

impl Task {
    /// A task over `node`. The tree is preprocessed here; validation and
    /// translation happen on [`execute`](Self::execute).
    pub fn new(node: &CanvasNode, environment: TaskEnvironment) -> Self {
        let node = preprocess(node).unwrap_or_else(|| node.clone());
        Self {
            node: Rc::new(node),
            channel: OrderChannel::new(environment.execution, environment.account),
            market_data: environment.market_data,
            cancel: CancelToken::new(),
            publisher: Publisher::new(),
            state: Cell::new(TaskState::Ready),
            executed: Cell::new(false),
            canceling: Cell::new(false),
            committing: Cell::new(false),
            sequence: Cell::new(0),
            context: RefCell::new(None),
            graph: RefCell::new(None),
            attached: RefCell::new(Vec::new()),
        }
    }

    /// The preprocessed tree this task runs.
    pub fn node(&self) -> &CanvasNode {
        &self.node
    }

    pub fn state(&self) -> TaskState {
        self.state.get()
    }

    pub fn publisher(&self) -> &Publisher<StateEntry> {
        &self.publisher
    }

    pub fn channel(&self) -> &OrderChannel {
        &self.channel
    }

    /// The translation context, once the task has been translated.
    pub fn context(&self) -> Option<Rc<TranslationContext>> {
        self.context.borrow().clone()
    }

    /// Number of ticks committed so far.
    pub fn sequence(&self) -> u64 {
        self.sequence.get()
    }

    /// The current value of the task's root node.
    pub fn value(&self) -> Option<Value> {
        self.graph.borrow().as_ref().and_then(ReactorHandle::value)
    }

    /// Commit `reactor` after the task's own graph on every tick.
    pub fn attach(&self, reactor: ReactorHandle) {
        self.attached.borrow_mut().push(reactor);
    }

    pub fn execute(&self) {
        if self.executed.replace(true) || self.state.get() != TaskState::Ready {
            return;
        }
        let errors = validate(&self.node);
        if let Some(first) = errors.first() {
            self.channel.break_channel(false);
            self.transition(
                TaskState::Failed,
                Some(format!("{} validation error(s), first: {first}", errors.len())),
            );
            return;
        }
        let environment = TranslationEnvironment {
            channel: self.channel.clone(),
            market_data: self.market_data.clone(),
        };
        let context = TranslationContext::new(self.node.clone(), environment, self.cancel.clone());
        match translate(&context, &CanvasPath::root()) {
            Ok(translation) => {
                *self.graph.borrow_mut() = Some(translation.reactor);
                *self.context.borrow_mut() = Some(context);
                self.transition(TaskState::Initializing, None);
            }
            Err(err) => {
                self.channel.break_channel(false);
                self.transition(TaskState::Failed, Some(err.to_string()));
            }
        }
    }

    pub fn cancel(&self) {
        if !self.executed.replace(true) {
            self.transition(TaskState::PendingCancel, None);
            self.transition(TaskState::Canceled, None);
            return;
        }
        if self.state.get().is_terminal() || self.canceling.replace(true) {
            return;
        }
        self.cancel.cancel();
        self.transition(TaskState::PendingCancel, None);
    }

    /// Run one tick. Calls made while a tick is in progress do nothing.
    pub fn commit(&self) -> TaskState {
        if self.committing.replace(true) {
            return self.state.get();
        }
        self.tick();
        self.committing.set(false);
        self.state.get()
    }

    /// Execute and tick until the task ends or `max_ticks` ticks have run.
    pub fn run(&self, max_ticks: u64) -> TaskState {
        self.execute();
        for _ in 0..max_ticks {
            if self.state.get().is_terminal() {
                break;
            }
            self.commit();
        }
        self.state.get()
    }

    fn tick(&self) {
        let Some(graph) = self.graph.borrow().clone() else {
            return;
        };
        if self.state.get().is_terminal() {
            return;
        }
        if self.state.get() == TaskState::Initializing {
            self.transition(TaskState::Active, None);
        }
        let sequence = self.sequence.get() + 1;
        self.sequence.set(sequence);
        self.channel.advance();
        let result = graph.commit(sequence);
        let attached = self.attached.borrow().clone();
        for reactor in attached {
            if let Err(err) = reactor.commit(sequence) {
                warn!(error = %err, "attached reactor failed");
            }
        }
        match result {
            Ok(update) if update.is_complete() => self.finish(graph.value()),
            // Plain values do not watch the cancel token.
            Ok(_) if self.canceling.get() && !self.node.canvas_type().is_task() => self.finish(None),
            Ok(_) => {}
            Err(err) => {
                self.channel.break_channel(true);
                self.transition(TaskState::Failed, Some(err.to_string()));
            }
        }
    }

    fn finish(&self, value: Option<Value>) {
        let canceling = self.canceling.get();
        self.channel.break_channel(canceling);
        let state = match value.and_then(|v| v.as_task_state()) {
            _ if canceling => TaskState::Canceled,
            Some(state @ (TaskState::Failed | TaskState::Canceled | TaskState::Expired)) => state,
            _ => TaskState::Complete,
        };
        self.transition(state, None);
    }

    fn transition(&self, state: TaskState, message: Option<String>) {
        self.state.set(state);
        match &message {
            Some(message) => info!(%state, message = message.as_str(), "task state"),
            None => info!(%state, "task state"),
        }
        self.publisher.push(StateEntry { state, message });
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("state", &self.state.get())
            .field("sequence", &self.sequence.get())
            .field("channel", &self.channel)
            .finish()
    }
}

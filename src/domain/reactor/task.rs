//! Reactors that run tasks. Their value is the task's current
//! [`TaskState`], and each cooperates with a [`CancelToken`].

use std::collections::{HashMap, VecDeque};

use tracing::debug;

use crate::domain::error::{CanvasError, ReactorError};
use crate::domain::order::{ExecutionReport, OrderFields, OrderId, OrderStatus};
use crate::domain::order_channel::{OrderChannel, OrderPublisher};
use crate::domain::reactor::value::{commit_all, input_values};
use crate::domain::reactor::{CancelToken, Reactor, ReactorHandle, Update};
use crate::domain::task::TaskState;
use crate::domain::value::Value;

/// Builds a fresh instance of a task, observing the given token.
pub type TaskFactory = Box<dyn FnMut(&CancelToken) -> Result<ReactorHandle, ReactorError>>;

fn order_error(err: CanvasError) -> ReactorError {
    ReactorError::Order {
        reason: err.to_string(),
    }
}

/// Tracks a task state and whether it changed since it was last reported.
struct Status {
    state: TaskState,
    reported: Option<TaskState>,
}

impl Status {
    fn new() -> Self {
        Self {
            state: TaskState::Ready,
            reported: None,
        }
    }

    fn set(&mut self, state: TaskState) {
        self.state = state;
    }

    fn update(&mut self, complete: bool) -> Update {
        let changed = self.reported != Some(self.state);
        self.reported = Some(self.state);
        Update::new(changed, complete)
    }

    fn value(&self) -> Option<Value> {
        self.reported.map(Value::TaskState)
    }
}

fn finished_state(cancel: &CancelToken, children: &[ReactorHandle]) -> TaskState {
    let failed = children
        .iter()
        .any(|c| c.value().and_then(|v| v.as_task_state()) == Some(TaskState::Failed));
    if failed {
        TaskState::Failed
    } else if cancel.is_canceled() {
        TaskState::Canceled
    } else {
        TaskState::Complete
    }
}

fn order_fields(values: &[Value]) -> Result<OrderFields, ReactorError> {
    let mismatch = |expected: &str, found: &Value| ReactorError::TypeMismatch {
        expected: expected.to_string(),
        found: found.to_string(),
    };
    match values {
        [
            Value::Security(security),
            Value::OrderType(order_type),
            Value::Side(side),
            Value::Destination(destination),
            Value::Integer(quantity),
            Value::Money(price),
            Value::Currency(currency),
            Value::TimeInForce(time_in_force),
        ] => Ok(OrderFields {
            security: security.clone(),
            order_type: *order_type,
            side: *side,
            destination: destination.clone(),
            quantity: *quantity,
            price: *price,
            currency: currency.clone(),
            time_in_force: *time_in_force,
        }),
        [first, ..] => Err(mismatch("order fields", first)),
        [] => Err(ReactorError::Order {
            reason: "order has no fields".to_string(),
        }),
    }
}

/// Submits one order once every field has a value, then follows its
/// execution reports.
pub struct SingleOrderReactor {
    fields: Vec<ReactorHandle>,
    channel: OrderChannel,
    publisher: OrderPublisher,
    cancel: CancelToken,
    order_id: Option<OrderId>,
    cancel_sent: bool,
    status: Status,
}

impl SingleOrderReactor {
    pub fn new(
        fields: Vec<ReactorHandle>,
        channel: OrderChannel,
        publisher: OrderPublisher,
        cancel: CancelToken,
    ) -> Self {
        Self {
            fields,
            channel,
            publisher,
            cancel,
            order_id: None,
            cancel_sent: false,
            status: Status::new(),
        }
    }

    fn submit(&mut self, sequence: u64) -> Result<Update, ReactorError> {
        if self.cancel.is_canceled() {
            self.status.set(TaskState::Canceled);
            return Ok(self.status.update(true));
        }
        let (_, complete) = commit_all(&self.fields, sequence)?;
        match input_values(&self.fields) {
            Some(values) => {
                let fields = order_fields(&values)?;
                let order_id = self.channel.submit(&fields).map_err(order_error)?;
                self.publisher.push(order_id);
                self.order_id = Some(order_id);
                self.status.set(TaskState::Active);
            }
            None if complete => {
                return Err(ReactorError::Order {
                    reason: "an order field completed without a value".to_string(),
                });
            }
            None => self.status.set(TaskState::Initializing),
        }
        Ok(self.status.update(false))
    }
}

impl Reactor for SingleOrderReactor {
    fn commit(&mut self, sequence: u64) -> Result<Update, ReactorError> {
        let Some(order_id) = self.order_id else {
            return self.submit(sequence);
        };
        if self.cancel.is_canceled() && !self.cancel_sent {
            self.channel.cancel(order_id).map_err(order_error)?;
            self.cancel_sent = true;
            self.status.set(TaskState::PendingCancel);
        }
        let reports = self.channel.execution_reports(order_id).map_err(order_error)?;
        if let Some(report) = reports.last() {
            match report.status {
                OrderStatus::Filled => self.status.set(TaskState::Complete),
                OrderStatus::Canceled => self.status.set(TaskState::Canceled),
                OrderStatus::Expired => self.status.set(TaskState::Expired),
                OrderStatus::Rejected => self.status.set(TaskState::Failed),
                _ => {}
            }
        }
        let complete = self.status.state.is_terminal();
        if complete {
            debug!(order_id, state = %self.status.state, "order finished");
        }
        Ok(self.status.update(complete))
    }

    fn value(&self) -> Option<Value> {
        self.status.value()
    }
}

/// Starts a new instance of its task every time the trigger evaluates.
pub struct SpawnReactor {
    trigger: ReactorHandle,
    factory: TaskFactory,
    cancel: CancelToken,
    running: Vec<ReactorHandle>,
    finished: Vec<ReactorHandle>,
    trigger_done: bool,
    status: Status,
}

impl SpawnReactor {
    pub fn new(trigger: ReactorHandle, factory: TaskFactory, cancel: CancelToken) -> Self {
        Self {
            trigger,
            factory,
            cancel,
            running: Vec::new(),
            finished: Vec::new(),
            trigger_done: false,
            status: Status::new(),
        }
    }
}

impl Reactor for SpawnReactor {
    fn commit(&mut self, sequence: u64) -> Result<Update, ReactorError> {
        if !self.trigger_done {
            if self.cancel.is_canceled() {
                self.trigger_done = true;
            } else {
                let update = self.trigger.commit(sequence)?;
                if update.has_evaluation() {
                    let instance = (self.factory)(&self.cancel.child())?;
                    debug!(instances = self.running.len() + 1, "spawned task");
                    self.running.push(instance);
                }
                self.trigger_done = update.is_complete();
            }
        }
        for instance in &self.running {
            instance.commit(sequence)?;
        }
        let (finished, running): (Vec<_>, Vec<_>) =
            self.running.drain(..).partition(ReactorHandle::is_complete);
        self.running = running;
        self.finished.extend(finished);
        let complete = self.trigger_done && self.running.is_empty();
        self.status.set(if complete {
            finished_state(&self.cancel, &self.finished)
        } else {
            TaskState::Active
        });
        Ok(self.status.update(complete))
    }

    fn value(&self) -> Option<Value> {
        self.status.value()
    }
}

/// Repeats its task until the condition holds, then cancels the running
/// instance and completes once it has wound down.
pub struct UntilReactor {
    condition: ReactorHandle,
    factory: TaskFactory,
    cancel: CancelToken,
    current: Option<(ReactorHandle, CancelToken)>,
    stopping: bool,
    status: Status,
}

impl UntilReactor {
    pub fn new(condition: ReactorHandle, factory: TaskFactory, cancel: CancelToken) -> Self {
        Self {
            condition,
            factory,
            cancel,
            current: None,
            stopping: false,
            status: Status::new(),
        }
    }
}

impl Reactor for UntilReactor {
    fn commit(&mut self, sequence: u64) -> Result<Update, ReactorError> {
        if !self.stopping {
            self.condition.commit(sequence)?;
            let holds = self.condition.value() == Some(Value::Boolean(true));
            if holds || self.cancel.is_canceled() {
                self.stopping = true;
                if let Some((_, token)) = &self.current {
                    token.cancel();
                }
            }
        }
        if !self.stopping && self.current.is_none() {
            let token = self.cancel.child();
            let instance = (self.factory)(&token)?;
            self.current = Some((instance, token));
        }
        if let Some((instance, _)) = &self.current {
            if instance.commit(sequence)?.is_complete() {
                self.current = None;
            }
        }
        let complete = self.stopping && self.current.is_none();
        self.status.set(match (complete, self.cancel.is_canceled()) {
            (true, true) => TaskState::Canceled,
            (true, false) => TaskState::Complete,
            (false, _) => TaskState::Active,
        });
        Ok(self.status.update(complete))
    }

    fn value(&self) -> Option<Value> {
        self.status.value()
    }
}

/// Waits for the condition to hold, then runs its task once. Completes
/// without running the task if the condition finishes without holding.
pub struct WhenReactor {
    condition: ReactorHandle,
    factory: TaskFactory,
    cancel: CancelToken,
    task: Option<ReactorHandle>,
    status: Status,
}

impl WhenReactor {
    pub fn new(condition: ReactorHandle, factory: TaskFactory, cancel: CancelToken) -> Self {
        Self {
            condition,
            factory,
            cancel,
            task: None,
            status: Status::new(),
        }
    }
}

impl Reactor for WhenReactor {
    fn commit(&mut self, sequence: u64) -> Result<Update, ReactorError> {
        if self.task.is_none() {
            if self.cancel.is_canceled() {
                self.status.set(TaskState::Canceled);
                return Ok(self.status.update(true));
            }
            let update = self.condition.commit(sequence)?;
            if self.condition.value() == Some(Value::Boolean(true)) {
                self.task = Some((self.factory)(&self.cancel.child())?);
            } else if update.is_complete() {
                self.status.set(TaskState::Complete);
                return Ok(self.status.update(true));
            } else {
                self.status.set(TaskState::Active);
                return Ok(self.status.update(false));
            }
        }
        let Some(task) = &self.task else {
            return Ok(self.status.update(false));
        };
        let complete = task.commit(sequence)?.is_complete();
        self.status.set(if complete {
            finished_state(&self.cancel, std::slice::from_ref(task))
        } else {
            TaskState::Active
        });
        Ok(self.status.update(complete))
    }

    fn value(&self) -> Option<Value> {
        self.status.value()
    }
}

/// Runs all of its tasks side by side.
pub struct AggregateReactor {
    tasks: Vec<ReactorHandle>,
    cancel: CancelToken,
    status: Status,
}

impl AggregateReactor {
    pub fn new(tasks: Vec<ReactorHandle>, cancel: CancelToken) -> Self {
        Self {
            tasks,
            cancel,
            status: Status::new(),
        }
    }
}

impl Reactor for AggregateReactor {
    fn commit(&mut self, sequence: u64) -> Result<Update, ReactorError> {
        let (_, complete) = commit_all(&self.tasks, sequence)?;
        self.status.set(if complete {
            finished_state(&self.cancel, &self.tasks)
        } else {
            TaskState::Active
        });
        Ok(self.status.update(complete))
    }

    fn value(&self) -> Option<Value> {
        self.status.value()
    }
}

/// Emits every execution report of the orders a task submits, one report
/// per tick.
pub struct ExecutionReportMonitorReactor {
    task: ReactorHandle,
    orders: OrderPublisher,
    channel: OrderChannel,
    seen: HashMap<OrderId, usize>,
    queue: VecDeque<ExecutionReport>,
    value: Option<Value>,
}

impl ExecutionReportMonitorReactor {
    pub fn new(task: ReactorHandle, orders: OrderPublisher, channel: OrderChannel) -> Self {
        Self {
            task,
            orders,
            channel,
            seen: HashMap::new(),
            queue: VecDeque::new(),
            value: None,
        }
    }
}

impl Reactor for ExecutionReportMonitorReactor {
    fn commit(&mut self, sequence: u64) -> Result<Update, ReactorError> {
        let update = self.task.commit(sequence)?;
        for order_id in self.orders.orders() {
            let reports = self.channel.execution_reports(order_id).map_err(order_error)?;
            let seen = self.seen.entry(order_id).or_default();
            self.queue.extend(reports.iter().skip(*seen).cloned());
            *seen = reports.len();
        }
        let next = self.queue.pop_front();
        let evaluated = next.is_some();
        if let Some(report) = next {
            self.value = Some(report.to_value());
        }
        Ok(Update::new(
            evaluated,
            update.is_complete() && self.queue.is_empty(),
        ))
    }

    fn value(&self) -> Option<Value> {
        self.value.clone()
    }
}

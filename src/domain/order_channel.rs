//! Order submission on behalf of a running task.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use tracing::{info, warn};

use crate::domain::error::CanvasError;
use crate::domain::order::{ExecutionReport, OrderFields, OrderId};
use crate::ports::order_execution_port::OrderExecutionPort;

struct ChannelState {
    broken: Cell<bool>,
    submitted: RefCell<Vec<OrderId>>,
}

/// The task-owned sink through which order nodes reach the execution
/// service. Once broken, no further orders can be submitted.
#[derive(Clone)]
pub struct OrderChannel {
    port: Rc<dyn OrderExecutionPort>,
    account: String,
    state: Rc<ChannelState>,
}

impl OrderChannel {
    pub fn new(port: Rc<dyn OrderExecutionPort>, account: impl Into<String>) -> Self {
        Self {
            port,
            account: account.into(),
            state: Rc::new(ChannelState {
                broken: Cell::new(false),
                submitted: RefCell::new(Vec::new()),
            }),
        }
    }

    pub fn account(&self) -> &str {
        &self.account
    }

    pub fn submit(&self, fields: &OrderFields) -> Result<OrderId, CanvasError> {
        if self.state.broken.get() {
            return Err(CanvasError::OrderExecution {
                reason: "order channel is closed".to_string(),
            });
        }
        let order_id = self.port.submit(&self.account, fields)?;
        info!(
            order_id,
            security = %fields.security,
            side = %fields.side,
            quantity = fields.quantity,
            price = fields.price,
            "submitted order"
        );
        self.state.submitted.borrow_mut().push(order_id);
        Ok(order_id)
    }

    pub fn cancel(&self, order_id: OrderId) -> Result<(), CanvasError> {
        self.port.cancel(order_id)
    }

    pub fn execution_reports(&self, order_id: OrderId) -> Result<Vec<ExecutionReport>, CanvasError> {
        self.port.execution_reports(order_id)
    }

    pub fn advance(&self) {
        self.port.advance();
    }

    pub fn submitted(&self) -> Vec<OrderId> {
        self.state.submitted.borrow().clone()
    }

    /// Orders whose latest report is not terminal.
    pub fn outstanding(&self) -> Vec<OrderId> {
        self.submitted()
            .into_iter()
            .filter(|id| match self.port.execution_reports(*id) {
                Ok(reports) => !reports.last().is_some_and(|r| r.status.is_terminal()),
                Err(_) => false,
            })
            .collect()
    }

    /// Close the channel, optionally canceling every outstanding order.
    pub fn break_channel(&self, cancel_outstanding: bool) {
        if self.state.broken.replace(true) {
            return;
        }
        if cancel_outstanding {
            for order_id in self.outstanding() {
                if let Err(err) = self.port.cancel(order_id) {
                    warn!(order_id, error = %err, "failed to cancel outstanding order");
                }
            }
        }
    }

    pub fn is_broken(&self) -> bool {
        self.state.broken.get()
    }
}

impl fmt::Debug for OrderChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrderChannel")
            .field("account", &self.account)
            .field("broken", &self.state.broken.get())
            .finish()
    }
}

/// Orders submitted by one task translation, including those of its
/// sub-tasks.
#[derive(Clone, Default)]
pub struct OrderPublisher {
    inner: Rc<PublisherState>,
}

#[derive(Default)]
struct PublisherState {
    orders: RefCell<Vec<OrderId>>,
    sources: RefCell<Vec<OrderPublisher>>,
}

impl OrderPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, order_id: OrderId) {
        self.inner.orders.borrow_mut().push(order_id);
    }

    /// Include every order published by `source`.
    pub fn add_source(&self, source: OrderPublisher) {
        if Rc::ptr_eq(&self.inner, &source.inner) {
            return;
        }
        self.inner.sources.borrow_mut().push(source);
    }

    pub fn orders(&self) -> Vec<OrderId> {
        let mut result = Vec::new();
        self.collect(&mut result, 0);
        result
    }

    fn collect(&self, result: &mut Vec<OrderId>, depth: usize) {
        // Self-referencing tasks can make sources circular.
        if depth > 64 {
            return;
        }
        for id in self.inner.orders.borrow().iter() {
            if !result.contains(id) {
                result.push(*id);
            }
        }
        for source in self.inner.sources.borrow().iter() {
            source.collect(result, depth + 1);
        }
    }
}

impl fmt::Debug for OrderPublisher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("OrderPublisher").field(&self.orders()).finish()
    }
}

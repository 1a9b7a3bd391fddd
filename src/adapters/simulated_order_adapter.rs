//! In-process order execution for dry runs.
//!
//! Orders are acknowledged on submission and filled in full once the
//! scheduler has advanced `fill_delay` times. Cancels take effect on the next
//! advance.

use std::cell::{Cell, RefCell};

use chrono::Utc;
use tracing::{debug, info};

use crate::domain::error::CanvasError;
use crate::domain::order::{ExecutionReport, OrderFields, OrderId, OrderStatus};
use crate::ports::order_execution_port::OrderExecutionPort;

struct SimulatedOrder {
    id: OrderId,
    account: String,
    fields: OrderFields,
    age: u32,
    cancel_requested: bool,
    reports: Vec<ExecutionReport>,
}

impl SimulatedOrder {
    fn is_open(&self) -> bool {
        self.reports.last().is_none_or(|r| !r.status.is_terminal())
    }

    fn report(&mut self, status: OrderStatus, last_quantity: i64, text: &str) {
        let sequence = self.reports.len() as u32;
        self.reports.push(ExecutionReport {
            order_id: self.id,
            sequence,
            status,
            last_quantity,
            last_price: if last_quantity > 0 { self.fields.price } else { 0.0 },
            timestamp: Utc::now().naive_utc(),
            text: text.to_string(),
        });
    }
}

pub struct SimulatedOrderAdapter {
    fill_delay: u32,
    reject_above_quantity: Option<i64>,
    next_id: Cell<OrderId>,
    orders: RefCell<Vec<SimulatedOrder>>,
}

impl SimulatedOrderAdapter {
    pub fn new(fill_delay: u32, reject_above_quantity: Option<i64>) -> Self {
        Self {
            fill_delay,
            reject_above_quantity,
            next_id: Cell::new(1),
            orders: RefCell::new(Vec::new()),
        }
    }

    /// Fields and account of every order submitted so far.
    pub fn submitted(&self) -> Vec<(String, OrderFields)> {
        self.orders
            .borrow()
            .iter()
            .map(|o| (o.account.clone(), o.fields.clone()))
            .collect()
    }
}

impl OrderExecutionPort for SimulatedOrderAdapter {
    fn submit(&self, account: &str, fields: &OrderFields) -> Result<OrderId, CanvasError> {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        let mut order = SimulatedOrder {
            id,
            account: account.to_string(),
            fields: fields.clone(),
            age: 0,
            cancel_requested: false,
            reports: Vec::new(),
        };
        order.report(OrderStatus::PendingNew, 0, "");
        match self.reject_above_quantity {
            Some(limit) if fields.quantity > limit => {
                info!(order_id = id, quantity = fields.quantity, limit, "simulated order rejected");
                order.report(OrderStatus::Rejected, 0, "quantity above limit");
            }
            _ if fields.quantity <= 0 => {
                order.report(OrderStatus::Rejected, 0, "quantity must be positive");
            }
            _ => {
                debug!(order_id = id, security = %fields.security, side = %fields.side, "simulated order accepted");
                order.report(OrderStatus::New, 0, "");
            }
        }
        self.orders.borrow_mut().push(order);
        Ok(id)
    }

    fn cancel(&self, order_id: OrderId) -> Result<(), CanvasError> {
        let mut orders = self.orders.borrow_mut();
        let order = orders
            .iter_mut()
            .find(|o| o.id == order_id)
            .ok_or_else(|| CanvasError::OrderExecution {
                reason: format!("unknown order {order_id}"),
            })?;
        if order.is_open() && !order.cancel_requested {
            order.cancel_requested = true;
            order.report(OrderStatus::PendingCancel, 0, "");
        }
        Ok(())
    }

    fn execution_reports(&self, order_id: OrderId) -> Result<Vec<ExecutionReport>, CanvasError> {
        self.orders
            .borrow()
            .iter()
            .find(|o| o.id == order_id)
            .map(|o| o.reports.clone())
            .ok_or_else(|| CanvasError::OrderExecution {
                reason: format!("unknown order {order_id}"),
            })
    }

    fn advance(&self) {
        for order in self.orders.borrow_mut().iter_mut() {
            if !order.is_open() {
                continue;
            }
            order.age += 1;
            if order.cancel_requested {
                order.report(OrderStatus::Canceled, 0, "");
            } else if order.age >= self.fill_delay {
                let quantity = order.fields.quantity;
                order.report(OrderStatus::Filled, quantity, "");
            }
        }
    }
}

#![allow(dead_code)]

use std::cell::RefCell;
use std::io::Write;
use std::rc::Rc;

use chrono::NaiveDate;
use tradecanvas::domain::error::CanvasError;
use tradecanvas::domain::node::CanvasNode;
use tradecanvas::domain::order::{
    ExecutionReport, OrderFields, OrderId, OrderStatus, OrderType, Security, Side, TimeInForce,
};
use tradecanvas::domain::path::CanvasPath;
use tradecanvas::domain::preprocessor::preprocess;
use tradecanvas::domain::reactor::CancelToken;
use tradecanvas::domain::task::{StateEntry, Task, TaskEnvironment, TaskState};
use tradecanvas::domain::translator::{translate, TranslationContext, TranslationEnvironment};
use tradecanvas::domain::order_channel::OrderChannel;
use tradecanvas::domain::value::Value;
use tradecanvas::ports::order_execution_port::OrderExecutionPort;

/// Order execution stub that reports a single status for every order.
pub struct MockExecutionPort {
    pub submitted: RefCell<Vec<OrderFields>>,
    pub canceled: RefCell<Vec<OrderId>>,
    pub status: OrderStatus,
    pub submit_error: Option<String>,
}

impl MockExecutionPort {
    pub fn new() -> Self {
        Self::with_status(OrderStatus::Filled)
    }

    pub fn with_status(status: OrderStatus) -> Self {
        Self {
            submitted: RefCell::new(Vec::new()),
            canceled: RefCell::new(Vec::new()),
            status,
            submit_error: None,
        }
    }

    pub fn with_submit_error(mut self, reason: &str) -> Self {
        self.submit_error = Some(reason.to_string());
        self
    }
}

impl OrderExecutionPort for MockExecutionPort {
    fn submit(&self, _account: &str, fields: &OrderFields) -> Result<OrderId, CanvasError> {
        if let Some(reason) = &self.submit_error {
            return Err(CanvasError::OrderExecution {
                reason: reason.clone(),
            });
        }
        self.submitted.borrow_mut().push(fields.clone());
        Ok(self.submitted.borrow().len() as OrderId)
    }

    fn cancel(&self, order_id: OrderId) -> Result<(), CanvasError> {
        self.canceled.borrow_mut().push(order_id);
        Ok(())
    }

    fn execution_reports(&self, order_id: OrderId) -> Result<Vec<ExecutionReport>, CanvasError> {
        let status = if self.canceled.borrow().contains(&order_id) {
            OrderStatus::Canceled
        } else {
            self.status
        };
        Ok(vec![ExecutionReport {
            order_id,
            sequence: 0,
            status,
            last_quantity: 0,
            last_price: 0.0,
            timestamp: NaiveDate::from_ymd_opt(2024, 1, 15)
                .unwrap()
                .and_hms_opt(10, 0, 0)
                .unwrap(),
            text: String::new(),
        }])
    }
}

pub fn integer(i: i64) -> CanvasNode {
    CanvasNode::constant(Value::Integer(i))
}

pub fn path(text: &str) -> CanvasPath {
    CanvasPath::parse(text).unwrap()
}

pub fn make_fields(quantity: i64) -> OrderFields {
    OrderFields {
        security: Security::new("BHP", "ASX"),
        order_type: OrderType::Limit,
        side: Side::Bid,
        destination: "ASXT".to_string(),
        quantity,
        price: 45.5,
        currency: "AUD".to_string(),
        time_in_force: TimeInForce::Day,
    }
}

/// A task over `port` plus the states it publishes.
pub fn make_task(node: &CanvasNode, port: Rc<MockExecutionPort>) -> (Rc<Task>, Rc<RefCell<Vec<TaskState>>>) {
    let task = Rc::new(Task::new(
        node,
        TaskEnvironment {
            execution: port,
            account: "ACC1".to_string(),
            market_data: None,
        },
    ));
    let states = Rc::new(RefCell::new(Vec::new()));
    let sink = states.clone();
    task.publisher()
        .monitor(move |entry: &StateEntry| sink.borrow_mut().push(entry.state));
    (task, states)
}

/// Translate `root` and commit it `ticks` times, collecting its value after
/// every tick.
pub fn tick_values(root: &CanvasNode, ticks: u64) -> Vec<Option<Value>> {
    let root = preprocess(root).unwrap_or_else(|| root.clone());
    let context = TranslationContext::new(
        Rc::new(root),
        TranslationEnvironment {
            channel: OrderChannel::new(Rc::new(MockExecutionPort::new()), "ACC1"),
            market_data: None,
        },
        CancelToken::new(),
    );
    let translation = translate(&context, &CanvasPath::root()).unwrap();
    (1..=ticks)
        .map(|sequence| {
            translation.reactor.commit(sequence).unwrap();
            translation.reactor.value()
        })
        .collect()
}

pub fn write_temp_file(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

//! Order execution port trait.

use crate::domain::error::CanvasError;
use crate::domain::order::{ExecutionReport, OrderFields, OrderId};

pub trait OrderExecutionPort {
    fn submit(&self, account: &str, fields: &OrderFields) -> Result<OrderId, CanvasError>;

    fn cancel(&self, order_id: OrderId) -> Result<(), CanvasError>;

    /// All reports received for an order so far, in sequence order.
    fn execution_reports(&self, order_id: OrderId) -> Result<Vec<ExecutionReport>, CanvasError>;

    /// Called once per scheduler tick before any task commits.
    fn advance(&self) {}
}

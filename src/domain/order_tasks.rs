//! Ready-made single order task nodes.

use crate::domain::builder::CanvasNodeBuilder;
use crate::domain::error::CanvasOperationError;
use crate::domain::node::CanvasNode;
use crate::domain::order::{OrderFields, OrderType, Side};
use crate::domain::path::CanvasPath;
use crate::domain::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OrderPreset {
    Single,
    Ask,
    Bid,
    Limit,
    LimitAsk,
    LimitBid,
    Market,
    MarketAsk,
    MarketBid,
    Pegged,
    PeggedAsk,
    PeggedBid,
}

impl OrderPreset {
    pub const ALL: [OrderPreset; 12] = [
        OrderPreset::Single,
        OrderPreset::Ask,
        OrderPreset::Bid,
        OrderPreset::Limit,
        OrderPreset::LimitAsk,
        OrderPreset::LimitBid,
        OrderPreset::Market,
        OrderPreset::MarketAsk,
        OrderPreset::MarketBid,
        OrderPreset::Pegged,
        OrderPreset::PeggedAsk,
        OrderPreset::PeggedBid,
    ];

    pub fn name(self) -> &'static str {
        match self {
            OrderPreset::Single => "Single Order",
            OrderPreset::Ask => "Ask Order",
            OrderPreset::Bid => "Bid Order",
            OrderPreset::Limit => "Limit Order",
            OrderPreset::LimitAsk => "Limit Ask Order",
            OrderPreset::LimitBid => "Limit Bid Order",
            OrderPreset::Market => "Market Order",
            OrderPreset::MarketAsk => "Market Ask Order",
            OrderPreset::MarketBid => "Market Bid Order",
            OrderPreset::Pegged => "Pegged Order",
            OrderPreset::PeggedAsk => "Pegged Ask Order",
            OrderPreset::PeggedBid => "Pegged Bid Order",
        }
    }

    fn order_type(self) -> Option<OrderType> {
        match self {
            OrderPreset::Limit | OrderPreset::LimitAsk | OrderPreset::LimitBid => Some(OrderType::Limit),
            OrderPreset::Market | OrderPreset::MarketAsk | OrderPreset::MarketBid => Some(OrderType::Market),
            OrderPreset::Pegged | OrderPreset::PeggedAsk | OrderPreset::PeggedBid => Some(OrderType::Pegged),
            _ => None,
        }
    }

    fn side(self) -> Option<Side> {
        match self {
            OrderPreset::Ask | OrderPreset::LimitAsk | OrderPreset::MarketAsk | OrderPreset::PeggedAsk => {
                Some(Side::Ask)
            }
            OrderPreset::Bid | OrderPreset::LimitBid | OrderPreset::MarketBid | OrderPreset::PeggedBid => {
                Some(Side::Bid)
            }
            _ => None,
        }
    }

    /// A single order task with this preset's fields fixed. Fixed fields are
    /// read-only and hidden. Market orders also hide their price.
    pub fn node(self) -> Result<CanvasNode, CanvasOperationError> {
        let mut builder = CanvasNodeBuilder::new(&CanvasNode::single_order_task().with_text(self.name()));
        if let Some(order_type) = self.order_type() {
            fix(&mut builder, "order_type", Value::OrderType(order_type))?;
        }
        if let Some(side) = self.side() {
            fix(&mut builder, "side", Value::Side(side))?;
        }
        if self.order_type() == Some(OrderType::Market) {
            hide(&mut builder, "price")?;
        }
        Ok(builder.make())
    }
}

fn fix(builder: &mut CanvasNodeBuilder, field: &str, value: Value) -> Result<(), CanvasOperationError> {
    let path = CanvasPath::root().child(field);
    builder.replace(&path, &CanvasNode::constant(value))?;
    hide(builder, field)
}

fn hide(builder: &mut CanvasNodeBuilder, field: &str) -> Result<(), CanvasOperationError> {
    let path = CanvasPath::root().child(field);
    builder.set_read_only(&path, true)?;
    builder.set_visible(&path, false)
}

/// A single order task whose fields are constants taken from `fields`.
pub fn order_task(fields: &OrderFields) -> Result<CanvasNode, CanvasOperationError> {
    let values = [
        ("security", Value::Security(fields.security.clone())),
        ("order_type", Value::OrderType(fields.order_type)),
        ("side", Value::Side(fields.side)),
        ("destination", Value::Destination(fields.destination.clone())),
        ("quantity", Value::Integer(fields.quantity)),
        ("price", Value::Money(fields.price)),
        ("currency", Value::Currency(fields.currency.clone())),
        ("time_in_force", Value::TimeInForce(fields.time_in_force)),
    ];
    let mut builder = CanvasNodeBuilder::new(&CanvasNode::single_order_task());
    for (field, value) in values {
        builder.replace(&CanvasPath::root().child(field), &CanvasNode::constant(value))?;
    }
    Ok(builder.make())
}

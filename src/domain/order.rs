//! Order fields, execution reports and their enumerations.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::domain::canvas_type::{CanvasType, RecordField, RecordType};
use crate::domain::value::Value;

/// Identifier assigned to an order by the execution service.
pub type OrderId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Side {
    #[default]
    Bid,
    Ask,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum OrderType {
    #[default]
    Limit,
    Market,
    Pegged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TimeInForce {
    #[default]
    Day,
    Gtc,
    Ioc,
    Fok,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum OrderStatus {
    #[default]
    PendingNew,
    New,
    PartiallyFilled,
    Filled,
    PendingCancel,
    Canceled,
    Rejected,
    Expired,
}

impl OrderStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OrderStatus::Filled | OrderStatus::Canceled | OrderStatus::Rejected | OrderStatus::Expired
        )
    }
}

/// A tradable instrument: symbol plus market code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Security {
    pub symbol: String,
    pub market: String,
}

impl Security {
    pub fn new(symbol: impl Into<String>, market: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            market: market.into(),
        }
    }
}

impl fmt::Display for Security {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.market.is_empty() {
            write!(f, "{}", self.symbol)
        } else {
            write!(f, "{}.{}", self.symbol, self.market)
        }
    }
}

impl FromStr for Security {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err("empty security".to_string());
        }
        match s.rsplit_once('.') {
            Some((symbol, market)) if !symbol.is_empty() => Ok(Security::new(symbol, market)),
            _ => Ok(Security::new(s, "")),
        }
    }
}

macro_rules! text_enum {
    ($ty:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                let text = match self {
                    $($ty::$variant => $text,)+
                };
                write!(f, "{text}")
            }
        }

        impl FromStr for $ty {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_ascii_uppercase().as_str() {
                    $(t if t == $text.to_ascii_uppercase() => Ok($ty::$variant),)+
                    other => Err(format!("unknown {}: {}", stringify!($ty), other)),
                }
            }
        }
    };
}

text_enum!(Side { Bid => "Bid", Ask => "Ask" });
text_enum!(OrderType { Limit => "Limit", Market => "Market", Pegged => "Pegged" });
text_enum!(TimeInForce { Day => "Day", Gtc => "GTC", Ioc => "IOC", Fok => "FOK" });
text_enum!(OrderStatus {
    PendingNew => "Pending New",
    New => "New",
    PartiallyFilled => "Partially Filled",
    Filled => "Filled",
    PendingCancel => "Pending Cancel",
    Canceled => "Canceled",
    Rejected => "Rejected",
    Expired => "Expired",
});

/// Everything needed to submit a single order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderFields {
    pub security: Security,
    pub order_type: OrderType,
    pub side: Side,
    pub destination: String,
    pub quantity: i64,
    pub price: f64,
    pub currency: String,
    pub time_in_force: TimeInForce,
}

/// One update on the life of a submitted order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub order_id: OrderId,
    pub sequence: u32,
    pub status: OrderStatus,
    pub last_quantity: i64,
    pub last_price: f64,
    pub timestamp: NaiveDateTime,
    pub text: String,
}

impl ExecutionReport {
    pub fn record_type() -> RecordType {
        RecordType::new(
            "Execution Report",
            vec![
                RecordField::new("order_id", CanvasType::Integer),
                RecordField::new("sequence", CanvasType::Integer),
                RecordField::new("status", CanvasType::OrderStatus),
                RecordField::new("last_quantity", CanvasType::Integer),
                RecordField::new("last_price", CanvasType::Money),
                RecordField::new("timestamp", CanvasType::DateTime),
                RecordField::new("text", CanvasType::Text),
            ],
        )
    }

    pub fn to_value(&self) -> Value {
        Value::Record(vec![
            Value::Integer(self.order_id as i64),
            Value::Integer(i64::from(self.sequence)),
            Value::OrderStatus(self.status),
            Value::Integer(self.last_quantity),
            Value::Money(self.last_price),
            Value::DateTime(self.timestamp),
            Value::Text(self.text.clone()),
        ])
    }
}

/// A single print from the time and sales feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeAndSale {
    pub timestamp: NaiveDateTime,
    pub price: f64,
    pub size: i64,
    pub market_center: String,
}

impl TimeAndSale {
    pub fn record_type() -> RecordType {
        RecordType::new(
            "Time And Sale",
            vec![
                RecordField::new("timestamp", CanvasType::DateTime),
                RecordField::new("price", CanvasType::Money),
                RecordField::new("size", CanvasType::Integer),
                RecordField::new("market_center", CanvasType::Text),
            ],
        )
    }

    pub fn to_value(&self) -> Value {
        Value::Record(vec![
            Value::DateTime(self.timestamp),
            Value::Money(self.price),
            Value::Integer(self.size),
            Value::Text(self.market_center.clone()),
        ])
    }
}

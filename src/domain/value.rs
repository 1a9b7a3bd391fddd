//! Runtime values carried by constants, metadata and reactors.

use std::fmt;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::domain::canvas_type::CanvasType;
use crate::domain::order::{OrderStatus, OrderType, Security, Side, TimeInForce};
use crate::domain::task::TaskState;

const DATE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Boolean(bool),
    Integer(i64),
    Decimal(f64),
    Money(f64),
    Text(String),
    DateTime(NaiveDateTime),
    /// Milliseconds.
    Duration(i64),
    Time(NaiveTime),
    Side(Side),
    OrderType(OrderType),
    OrderStatus(OrderStatus),
    TimeInForce(TimeInForce),
    Security(Security),
    Currency(String),
    Destination(String),
    TaskState(TaskState),
    Record(Vec<Value>),
}

impl Value {
    /// The concrete type of a scalar. Records carry no type name and return `None`.
    pub fn native_type(&self) -> Option<CanvasType> {
        Some(match self {
            Value::Boolean(_) => CanvasType::Boolean,
            Value::Integer(_) => CanvasType::Integer,
            Value::Decimal(_) => CanvasType::Decimal,
            Value::Money(_) => CanvasType::Money,
            Value::Text(_) => CanvasType::Text,
            Value::DateTime(_) => CanvasType::DateTime,
            Value::Duration(_) => CanvasType::Duration,
            Value::Time(_) => CanvasType::Time,
            Value::Side(_) => CanvasType::Side,
            Value::OrderType(_) => CanvasType::OrderType,
            Value::OrderStatus(_) => CanvasType::OrderStatus,
            Value::TimeInForce(_) => CanvasType::TimeInForce,
            Value::Security(_) => CanvasType::Security,
            Value::Currency(_) => CanvasType::Currency,
            Value::Destination(_) => CanvasType::Destination,
            Value::TaskState(_) => CanvasType::TaskState,
            Value::Record(_) => return None,
        })
    }

    pub fn matches_type(&self, canvas_type: &CanvasType) -> bool {
        match (self, canvas_type) {
            (_, CanvasType::Unknown) => true,
            (_, CanvasType::Union(members)) => members.iter().any(|m| self.matches_type(m)),
            (Value::TaskState(_), CanvasType::Task) => true,
            (Value::Record(values), CanvasType::Record(record)) => {
                values.len() == record.fields.len()
                    && values
                        .iter()
                        .zip(&record.fields)
                        .all(|(v, f)| v.matches_type(&f.field_type))
            }
            (value, expected) => value.native_type().as_ref() == Some(expected),
        }
    }

    /// The value a freshly created constant of this type starts with.
    pub fn default_for(canvas_type: &CanvasType) -> Option<Value> {
        Some(match canvas_type {
            CanvasType::Boolean => Value::Boolean(false),
            CanvasType::Integer => Value::Integer(0),
            CanvasType::Decimal => Value::Decimal(0.0),
            CanvasType::Money => Value::Money(0.0),
            CanvasType::Text => Value::Text(String::new()),
            CanvasType::DateTime => {
                Value::DateTime(NaiveDate::from_ymd_opt(1970, 1, 1)?.and_hms_opt(0, 0, 0)?)
            }
            CanvasType::Duration => Value::Duration(0),
            CanvasType::Time => Value::Time(NaiveTime::from_hms_opt(0, 0, 0)?),
            CanvasType::Side => Value::Side(Side::default()),
            CanvasType::OrderType => Value::OrderType(OrderType::default()),
            CanvasType::OrderStatus => Value::OrderStatus(OrderStatus::default()),
            CanvasType::TimeInForce => Value::TimeInForce(TimeInForce::default()),
            CanvasType::Security => Value::Security(Security::default()),
            CanvasType::Currency => Value::Currency(String::new()),
            CanvasType::Destination => Value::Destination(String::new()),
            CanvasType::TaskState => Value::TaskState(TaskState::Ready),
            CanvasType::Record(record) => Value::Record(
                record
                    .fields
                    .iter()
                    .map(|f| Value::default_for(&f.field_type))
                    .collect::<Option<Vec<_>>>()?,
            ),
            CanvasType::Unknown | CanvasType::Union(_) | CanvasType::Task => return None,
        })
    }

    /// Parse text as a value of the given native type.
    pub fn parse(canvas_type: &CanvasType, text: &str) -> Result<Value, String> {
        let text = text.trim();
        let invalid = |reason: &dyn fmt::Display| format!("invalid {canvas_type} '{text}': {reason}");
        Ok(match canvas_type {
            CanvasType::Boolean => match text.to_ascii_lowercase().as_str() {
                "true" | "yes" | "1" => Value::Boolean(true),
                "false" | "no" | "0" => Value::Boolean(false),
                _ => return Err(invalid(&"expected true or false")),
            },
            CanvasType::Integer => Value::Integer(text.parse::<i64>().map_err(|e| invalid(&e))?),
            CanvasType::Decimal => Value::Decimal(text.parse::<f64>().map_err(|e| invalid(&e))?),
            CanvasType::Money => Value::Money(text.parse::<f64>().map_err(|e| invalid(&e))?),
            CanvasType::Text => Value::Text(text.to_string()),
            CanvasType::DateTime => Value::DateTime(
                NaiveDateTime::parse_from_str(text, DATE_TIME_FORMAT).map_err(|e| invalid(&e))?,
            ),
            CanvasType::Duration => Value::Duration(parse_duration(text).ok_or_else(|| {
                invalid(&"expected HH:MM:SS[.mmm]")
            })?),
            CanvasType::Time => {
                Value::Time(NaiveTime::parse_from_str(text, "%H:%M:%S").map_err(|e| invalid(&e))?)
            }
            CanvasType::Side => Value::Side(text.parse::<Side>().map_err(|e| invalid(&e))?),
            CanvasType::OrderType => {
                Value::OrderType(text.parse::<OrderType>().map_err(|e| invalid(&e))?)
            }
            CanvasType::OrderStatus => {
                Value::OrderStatus(text.parse::<OrderStatus>().map_err(|e| invalid(&e))?)
            }
            CanvasType::TimeInForce => {
                Value::TimeInForce(text.parse::<TimeInForce>().map_err(|e| invalid(&e))?)
            }
            CanvasType::Security => Value::Security(text.parse::<Security>().map_err(|e| invalid(&e))?),
            CanvasType::Currency => Value::Currency(text.to_ascii_uppercase()),
            CanvasType::Destination => Value::Destination(text.to_string()),
            other => return Err(format!("values of type {other} cannot be parsed")),
        })
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) | Value::Duration(i) => Some(*i),
            _ => None,
        }
    }

    /// Numeric view used by arithmetic and comparisons.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(i) | Value::Duration(i) => Some(*i as f64),
            Value::Decimal(d) | Value::Money(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) | Value::Currency(s) | Value::Destination(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_task_state(&self) -> Option<TaskState> {
        match self {
            Value::TaskState(state) => Some(*state),
            _ => None,
        }
    }
}

fn parse_duration(text: &str) -> Option<i64> {
    let (clock, millis) = match text.split_once('.') {
        Some((clock, millis)) => (clock, millis.parse::<i64>().ok()?),
        None => (text, 0),
    };
    let parts: Vec<&str> = clock.split(':').collect();
    if parts.len() != 3 {
        return None;
    }
    let hours: i64 = parts[0].parse().ok()?;
    let minutes: i64 = parts[1].parse().ok()?;
    let seconds: i64 = parts[2].parse().ok()?;
    Some(((hours * 60 + minutes) * 60 + seconds) * 1000 + millis)
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Boolean(b) => write!(f, "{b}"),
            Value::Integer(i) => write!(f, "{i}"),
            Value::Decimal(d) => write!(f, "{d}"),
            Value::Money(m) => write!(f, "{m:.2}"),
            Value::Text(s) | Value::Currency(s) | Value::Destination(s) => write!(f, "{s}"),
            Value::DateTime(dt) => write!(f, "{}", dt.format(DATE_TIME_FORMAT)),
            Value::Duration(ms) => {
                let seconds = ms / 1000;
                write!(
                    f,
                    "{:02}:{:02}:{:02}",
                    seconds / 3600,
                    (seconds / 60) % 60,
                    seconds % 60
                )?;
                if ms % 1000 != 0 {
                    write!(f, ".{:03}", ms % 1000)?;
                }
                Ok(())
            }
            Value::Time(t) => write!(f, "{}", t.format("%H:%M:%S")),
            Value::Side(s) => write!(f, "{s}"),
            Value::OrderType(t) => write!(f, "{t}"),
            Value::OrderStatus(s) => write!(f, "{s}"),
            Value::TimeInForce(t) => write!(f, "{t}"),
            Value::Security(s) => write!(f, "{s}"),
            Value::TaskState(s) => write!(f, "{s}"),
            Value::Record(values) => {
                let fields: Vec<String> = values.iter().map(ToString::to_string).collect();
                write!(f, "({})", fields.join(", "))
            }
        }
    }
}

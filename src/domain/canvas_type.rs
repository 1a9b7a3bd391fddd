//! The type model of canvas nodes.
//!
//! Every node declares the type it evaluates to. `Unknown` and `Union` are
//! incomplete: they mark a slot that still accepts several concrete types and
//! must be narrowed before the tree can be translated.

use std::fmt;

use serde::{Deserialize, Serialize};

/// How well one type can stand in for another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Compatibility {
    None,
    Compatible,
    Equal,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordField {
    pub name: String,
    pub field_type: CanvasType,
}

impl RecordField {
    pub fn new(name: impl Into<String>, field_type: CanvasType) -> Self {
        Self {
            name: name.into(),
            field_type,
        }
    }
}

/// A named, ordered collection of typed fields.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordType {
    pub name: String,
    pub fields: Vec<RecordField>,
}

impl RecordType {
    pub fn new(name: impl Into<String>, fields: Vec<RecordField>) -> Self {
        Self {
            name: name.into(),
            fields,
        }
    }

    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    pub fn field(&self, name: &str) -> Option<&RecordField> {
        self.fields.iter().find(|f| f.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CanvasType {
    Unknown,
    Union(Vec<CanvasType>),
    Boolean,
    Integer,
    Decimal,
    Money,
    Text,
    DateTime,
    Duration,
    Time,
    Side,
    OrderType,
    OrderStatus,
    TimeInForce,
    Security,
    Currency,
    Destination,
    TaskState,
    Task,
    Record(RecordType),
}

impl CanvasType {
    /// Native types that carry a plain value.
    pub const SCALARS: [CanvasType; 16] = [
        CanvasType::Boolean,
        CanvasType::Integer,
        CanvasType::Decimal,
        CanvasType::Money,
        CanvasType::Text,
        CanvasType::DateTime,
        CanvasType::Duration,
        CanvasType::Time,
        CanvasType::Side,
        CanvasType::OrderType,
        CanvasType::OrderStatus,
        CanvasType::TimeInForce,
        CanvasType::Security,
        CanvasType::Currency,
        CanvasType::Destination,
        CanvasType::TaskState,
    ];

    pub fn numeric() -> CanvasType {
        CanvasType::Union(vec![
            CanvasType::Integer,
            CanvasType::Decimal,
            CanvasType::Money,
            CanvasType::Duration,
        ])
    }

    pub fn comparable() -> CanvasType {
        CanvasType::Union(vec![
            CanvasType::Integer,
            CanvasType::Decimal,
            CanvasType::Money,
            CanvasType::Duration,
            CanvasType::DateTime,
            CanvasType::Time,
            CanvasType::Text,
        ])
    }

    /// Any scalar value type.
    pub fn any_value() -> CanvasType {
        CanvasType::Union(Self::SCALARS.to_vec())
    }

    /// A type is native once it names exactly one concrete type.
    pub fn is_native(&self) -> bool {
        !matches!(self, CanvasType::Unknown | CanvasType::Union(_))
    }

    pub fn is_task(&self) -> bool {
        matches!(self, CanvasType::Task)
    }

    /// Compatibility of `other` flowing into a slot of type `self`.
    pub fn compatibility(&self, other: &CanvasType) -> Compatibility {
        if self == other {
            return Compatibility::Equal;
        }
        match self {
            CanvasType::Unknown => Compatibility::Compatible,
            CanvasType::Union(members) => match other {
                CanvasType::Unknown => Compatibility::None,
                CanvasType::Union(others) => {
                    if others.iter().all(|o| members.contains(o)) {
                        Compatibility::Compatible
                    } else {
                        Compatibility::None
                    }
                }
                native => {
                    if members.contains(native) {
                        Compatibility::Compatible
                    } else {
                        Compatibility::None
                    }
                }
            },
            _ => Compatibility::None,
        }
    }

    pub fn accepts(&self, other: &CanvasType) -> bool {
        self.compatibility(other) != Compatibility::None
    }

    /// The narrowest type accepted by both, if any.
    pub fn intersect(&self, other: &CanvasType) -> Option<CanvasType> {
        if self.accepts(other) {
            return Some(other.clone());
        }
        if other.accepts(self) {
            return Some(self.clone());
        }
        if let (CanvasType::Union(a), CanvasType::Union(b)) = (self, other) {
            let common: Vec<CanvasType> = a.iter().filter(|t| b.contains(t)).cloned().collect();
            return Self::from_members(common);
        }
        None
    }

    /// Collapse a member list: empty is `None`, one member is that member.
    pub fn from_members(mut members: Vec<CanvasType>) -> Option<CanvasType> {
        let mut unique: Vec<CanvasType> = Vec::new();
        for member in members.drain(..) {
            if !unique.contains(&member) {
                unique.push(member);
            }
        }
        match unique.len() {
            0 => None,
            1 => unique.pop(),
            _ => Some(CanvasType::Union(unique)),
        }
    }
}

impl fmt::Display for CanvasType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CanvasType::Unknown => write!(f, "Unknown"),
            CanvasType::Union(members) => {
                let names: Vec<String> = members.iter().map(ToString::to_string).collect();
                write!(f, "{}", names.join(" | "))
            }
            CanvasType::Boolean => write!(f, "Boolean"),
            CanvasType::Integer => write!(f, "Integer"),
            CanvasType::Decimal => write!(f, "Decimal"),
            CanvasType::Money => write!(f, "Money"),
            CanvasType::Text => write!(f, "Text"),
            CanvasType::DateTime => write!(f, "Date/Time"),
            CanvasType::Duration => write!(f, "Duration"),
            CanvasType::Time => write!(f, "Time"),
            CanvasType::Side => write!(f, "Side"),
            CanvasType::OrderType => write!(f, "Order Type"),
            CanvasType::OrderStatus => write!(f, "Order Status"),
            CanvasType::TimeInForce => write!(f, "Time In Force"),
            CanvasType::Security => write!(f, "Security"),
            CanvasType::Currency => write!(f, "Currency"),
            CanvasType::Destination => write!(f, "Destination"),
            CanvasType::TaskState => write!(f, "Task State"),
            CanvasType::Task => write!(f, "Task"),
            CanvasType::Record(record) => write!(f, "{}", record.name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_types() {
        assert_eq!(
            CanvasType::Money.compatibility(&CanvasType::Money),
            Compatibility::Equal
        );
    }

    #[test]
    fn unknown_accepts_everything() {
        assert_eq!(
            CanvasType::Unknown.compatibility(&CanvasType::Task),
            Compatibility::Compatible
        );
        assert!(!CanvasType::Unknown.is_native());
    }

    #[test]
    fn union_accepts_members_only() {
        let numeric = CanvasType::numeric();
        assert!(numeric.accepts(&CanvasType::Integer));
        assert!(!numeric.accepts(&CanvasType::Text));
        assert!(!CanvasType::Integer.accepts(&numeric));
    }

    #[test]
    fn union_accepts_sub_union() {
        let sub = CanvasType::Union(vec![CanvasType::Integer, CanvasType::Money]);
        assert!(CanvasType::numeric().accepts(&sub));
        assert!(!sub.accepts(&CanvasType::numeric()));
    }

    #[test]
    fn intersect_unions() {
        let a = CanvasType::Union(vec![CanvasType::Integer, CanvasType::Text]);
        let b = CanvasType::Union(vec![CanvasType::Text, CanvasType::Money]);
        assert_eq!(a.intersect(&b), Some(CanvasType::Text));
        assert_eq!(CanvasType::Integer.intersect(&CanvasType::Text), None);
    }

    #[test]
    fn record_field_lookup() {
        let record = RecordType::new(
            "Quote",
            vec![
                RecordField::new("price", CanvasType::Money),
                RecordField::new("size", CanvasType::Integer),
            ],
        );
        assert_eq!(record.field_index("size"), Some(1));
        assert!(record.field("volume").is_none());
        assert_eq!(CanvasType::Record(record).to_string(), "Quote");
    }
}

//! Built-in functions and their signature tables.
//!
//! A function node's type is narrowed by matching the types of its arguments
//! against the signatures of its operation.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::domain::canvas_type::CanvasType;
use crate::domain::error::ReactorError;
use crate::domain::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FunctionOp {
    Addition,
    Subtraction,
    Multiplication,
    Division,
    Equals,
    NotEquals,
    Greater,
    GreaterOrEqual,
    Lesser,
    LesserOrEqual,
    Max,
    Min,
    Abs,
    Not,
    If,
    IsTerminal,
    Round,
    Floor,
    Ceil,
}

/// One admissible combination of parameter types and result type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub parameters: Vec<CanvasType>,
    pub result: CanvasType,
}

impl Signature {
    fn new(parameters: Vec<CanvasType>, result: CanvasType) -> Self {
        Self { parameters, result }
    }
}

impl FunctionOp {
    pub const ALL: [FunctionOp; 19] = [
        FunctionOp::Addition,
        FunctionOp::Subtraction,
        FunctionOp::Multiplication,
        FunctionOp::Division,
        FunctionOp::Equals,
        FunctionOp::NotEquals,
        FunctionOp::Greater,
        FunctionOp::GreaterOrEqual,
        FunctionOp::Lesser,
        FunctionOp::LesserOrEqual,
        FunctionOp::Max,
        FunctionOp::Min,
        FunctionOp::Abs,
        FunctionOp::Not,
        FunctionOp::If,
        FunctionOp::IsTerminal,
        FunctionOp::Round,
        FunctionOp::Floor,
        FunctionOp::Ceil,
    ];

    pub fn name(self) -> &'static str {
        match self {
            FunctionOp::Addition => "Addition",
            FunctionOp::Subtraction => "Subtraction",
            FunctionOp::Multiplication => "Multiplication",
            FunctionOp::Division => "Division",
            FunctionOp::Equals => "Equals",
            FunctionOp::NotEquals => "Not Equals",
            FunctionOp::Greater => "Greater",
            FunctionOp::GreaterOrEqual => "Greater Or Equal",
            FunctionOp::Lesser => "Lesser",
            FunctionOp::LesserOrEqual => "Lesser Or Equal",
            FunctionOp::Max => "Max",
            FunctionOp::Min => "Min",
            FunctionOp::Abs => "Abs",
            FunctionOp::Not => "Not",
            FunctionOp::If => "If",
            FunctionOp::IsTerminal => "Is Terminal",
            FunctionOp::Round => "Round",
            FunctionOp::Floor => "Floor",
            FunctionOp::Ceil => "Ceil",
        }
    }

    /// Names of the parameter slots, in order.
    pub fn parameter_names(self) -> &'static [&'static str] {
        match self {
            FunctionOp::Abs | FunctionOp::Not | FunctionOp::IsTerminal => &["operand"],
            FunctionOp::Round | FunctionOp::Floor | FunctionOp::Ceil => &["value", "places"],
            FunctionOp::If => &["condition", "consequent", "alternative"],
            _ => &["left", "right"],
        }
    }

    pub fn signatures(self) -> Vec<Signature> {
        use CanvasType::*;
        let numeric = [Integer, Decimal, Money, Duration];
        match self {
            FunctionOp::Addition | FunctionOp::Subtraction => {
                let mut signatures: Vec<Signature> = numeric
                    .iter()
                    .map(|t| Signature::new(vec![t.clone(), t.clone()], t.clone()))
                    .collect();
                signatures.push(Signature::new(vec![DateTime, Duration], DateTime));
                if self == FunctionOp::Addition {
                    signatures.push(Signature::new(vec![Text, Text], Text));
                }
                signatures
            }
            FunctionOp::Multiplication => vec![
                Signature::new(vec![Integer, Integer], Integer),
                Signature::new(vec![Decimal, Decimal], Decimal),
                Signature::new(vec![Money, Integer], Money),
                Signature::new(vec![Money, Decimal], Money),
                Signature::new(vec![Duration, Integer], Duration),
            ],
            FunctionOp::Division => vec![
                Signature::new(vec![Integer, Integer], Integer),
                Signature::new(vec![Decimal, Decimal], Decimal),
                Signature::new(vec![Money, Integer], Money),
                Signature::new(vec![Money, Money], Decimal),
                Signature::new(vec![Duration, Integer], Duration),
            ],
            FunctionOp::Equals | FunctionOp::NotEquals => CanvasType::SCALARS
                .iter()
                .map(|t| Signature::new(vec![t.clone(), t.clone()], Boolean))
                .collect(),
            FunctionOp::Greater
            | FunctionOp::GreaterOrEqual
            | FunctionOp::Lesser
            | FunctionOp::LesserOrEqual => [Integer, Decimal, Money, Duration, DateTime, Time, Text]
                .iter()
                .map(|t| Signature::new(vec![t.clone(), t.clone()], Boolean))
                .collect(),
            FunctionOp::Max | FunctionOp::Min => [Integer, Decimal, Money, Duration, DateTime, Time]
                .iter()
                .map(|t| Signature::new(vec![t.clone(), t.clone()], t.clone()))
                .collect(),
            FunctionOp::Abs => numeric
                .iter()
                .map(|t| Signature::new(vec![t.clone()], t.clone()))
                .collect(),
            FunctionOp::Not => vec![Signature::new(vec![Boolean], Boolean)],
            FunctionOp::If => CanvasType::SCALARS
                .iter()
                .map(|t| Signature::new(vec![Boolean, t.clone(), t.clone()], t.clone()))
                .collect(),
            FunctionOp::IsTerminal => vec![
                Signature::new(vec![TaskState], Boolean),
                Signature::new(vec![Task], Boolean),
            ],
            FunctionOp::Round | FunctionOp::Floor | FunctionOp::Ceil => vec![
                Signature::new(vec![Decimal, Integer], Decimal),
                Signature::new(vec![Money, Integer], Money),
            ],
        }
    }

    /// Signatures whose parameters accept the given argument types and whose
    /// result is accepted by `result`.
    pub fn matching_signatures(self, arguments: &[CanvasType], result: &CanvasType) -> Vec<Signature> {
        self.signatures()
            .into_iter()
            .filter(|s| {
                s.parameters.len() == arguments.len()
                    && s.parameters.iter().zip(arguments).all(|(p, a)| a.accepts(p))
                    && result.accepts(&s.result)
            })
            .collect()
    }

    pub fn apply(self, arguments: &[Value]) -> Result<Value, ReactorError> {
        match self {
            FunctionOp::Addition => arithmetic(arguments, |a, b| a.checked_add(b), |a, b| a + b),
            FunctionOp::Subtraction => arithmetic(arguments, |a, b| a.checked_sub(b), |a, b| a - b),
            FunctionOp::Multiplication => {
                arithmetic(arguments, |a, b| a.checked_mul(b), |a, b| a * b)
            }
            FunctionOp::Division => division(arguments),
            FunctionOp::Equals => {
                let (left, right) = binary(arguments)?;
                Ok(Value::Boolean(left == right))
            }
            FunctionOp::NotEquals => {
                let (left, right) = binary(arguments)?;
                Ok(Value::Boolean(left != right))
            }
            FunctionOp::Greater => comparison(arguments, |o| o == Ordering::Greater),
            FunctionOp::GreaterOrEqual => comparison(arguments, |o| o != Ordering::Less),
            FunctionOp::Lesser => comparison(arguments, |o| o == Ordering::Less),
            FunctionOp::LesserOrEqual => comparison(arguments, |o| o != Ordering::Greater),
            FunctionOp::Max => {
                let (left, right) = binary(arguments)?;
                let ordering = compare(left, right)?;
                Ok(if ordering == Ordering::Less { right.clone() } else { left.clone() })
            }
            FunctionOp::Min => {
                let (left, right) = binary(arguments)?;
                let ordering = compare(left, right)?;
                Ok(if ordering == Ordering::Greater { right.clone() } else { left.clone() })
            }
            FunctionOp::Abs => match arguments {
                [Value::Integer(i)] => Ok(Value::Integer(i.abs())),
                [Value::Duration(d)] => Ok(Value::Duration(d.abs())),
                [Value::Decimal(d)] => Ok(Value::Decimal(d.abs())),
                [Value::Money(m)] => Ok(Value::Money(m.abs())),
                other => Err(mismatch("numeric", other)),
            },
            FunctionOp::Not => match arguments {
                [Value::Boolean(b)] => Ok(Value::Boolean(!b)),
                other => Err(mismatch("Boolean", other)),
            },
            FunctionOp::If => match arguments {
                [Value::Boolean(condition), consequent, alternative] => Ok(if *condition {
                    consequent.clone()
                } else {
                    alternative.clone()
                }),
                other => Err(mismatch("Boolean, value, value", other)),
            },
            FunctionOp::IsTerminal => match arguments {
                [Value::TaskState(state)] => Ok(Value::Boolean(state.is_terminal())),
                other => Err(mismatch("TaskState", other)),
            },
            FunctionOp::Round => rounding(arguments, f64::round),
            FunctionOp::Floor => rounding(arguments, f64::floor),
            FunctionOp::Ceil => rounding(arguments, f64::ceil),
        }
    }
}

fn mismatch(expected: &str, found: &[Value]) -> ReactorError {
    let found: Vec<String> = found
        .iter()
        .map(|v| {
            v.native_type()
                .map(|t| t.to_string())
                .unwrap_or_else(|| "Record".to_string())
        })
        .collect();
    ReactorError::TypeMismatch {
        expected: expected.to_string(),
        found: found.join(", "),
    }
}

fn binary(arguments: &[Value]) -> Result<(&Value, &Value), ReactorError> {
    match arguments {
        [left, right] => Ok((left, right)),
        other => Err(mismatch("two arguments", other)),
    }
}

fn arithmetic(
    arguments: &[Value],
    integer: impl Fn(i64, i64) -> Option<i64>,
    real: impl Fn(f64, f64) -> f64,
) -> Result<Value, ReactorError> {
    let overflow = || ReactorError::Arithmetic {
        reason: "integer overflow".to_string(),
    };
    match binary(arguments)? {
        (Value::Integer(a), Value::Integer(b)) => Ok(Value::Integer(integer(*a, *b).ok_or_else(overflow)?)),
        (Value::Duration(a), Value::Duration(b)) | (Value::Duration(a), Value::Integer(b)) => {
            Ok(Value::Duration(integer(*a, *b).ok_or_else(overflow)?))
        }
        (Value::Decimal(a), Value::Decimal(b)) => Ok(Value::Decimal(real(*a, *b))),
        (Value::Money(a), Value::Money(b)) | (Value::Money(a), Value::Decimal(b)) => {
            Ok(Value::Money(real(*a, *b)))
        }
        (Value::Money(a), Value::Integer(b)) => Ok(Value::Money(real(*a, *b as f64))),
        (Value::Text(a), Value::Text(b)) => Ok(Value::Text(format!("{a}{b}"))),
        (Value::DateTime(a), Value::Duration(b)) => {
            let delta = chrono::Duration::milliseconds(integer(0, *b).ok_or_else(overflow)?);
            a.checked_add_signed(delta)
                .map(Value::DateTime)
                .ok_or_else(overflow)
        }
        (left, right) => Err(mismatch("matching numeric operands", &[left.clone(), right.clone()])),
    }
}

fn division(arguments: &[Value]) -> Result<Value, ReactorError> {
    let by_zero = || ReactorError::Arithmetic {
        reason: "division by zero".to_string(),
    };
    match binary(arguments)? {
        (Value::Integer(a), Value::Integer(b)) => a.checked_div(*b).map(Value::Integer).ok_or_else(by_zero),
        (Value::Duration(a), Value::Integer(b)) => a.checked_div(*b).map(Value::Duration).ok_or_else(by_zero),
        (Value::Decimal(a), Value::Decimal(b)) if *b != 0.0 => Ok(Value::Decimal(a / b)),
        (Value::Money(a), Value::Integer(b)) if *b != 0 => Ok(Value::Money(a / *b as f64)),
        (Value::Money(a), Value::Money(b)) if *b != 0.0 => Ok(Value::Decimal(a / b)),
        (Value::Decimal(_), Value::Decimal(_))
        | (Value::Money(_), Value::Integer(_))
        | (Value::Money(_), Value::Money(_)) => Err(by_zero()),
        (left, right) => Err(mismatch("numeric operands", &[left.clone(), right.clone()])),
    }
}

/// Applies `mode` at `places` digits after the decimal point. Negative
/// places round to tens, hundreds and so on.
fn rounding(arguments: &[Value], mode: impl Fn(f64) -> f64) -> Result<Value, ReactorError> {
    let at = |value: f64, places: i64| -> Result<f64, ReactorError> {
        let places = i32::try_from(places).map_err(|_| ReactorError::Arithmetic {
            reason: format!("cannot round to {places} places"),
        })?;
        let scale = 10f64.powi(places);
        Ok(mode(value * scale) / scale)
    };
    match binary(arguments)? {
        (Value::Decimal(value), Value::Integer(places)) => Ok(Value::Decimal(at(*value, *places)?)),
        (Value::Money(value), Value::Integer(places)) => Ok(Value::Money(at(*value, *places)?)),
        (left, right) => Err(mismatch("Decimal or Money, Integer", &[left.clone(), right.clone()])),
    }
}

fn compare(left: &Value, right: &Value) -> Result<Ordering, ReactorError> {
    let ordering = match (left, right) {
        (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
        (Value::DateTime(a), Value::DateTime(b)) => Some(a.cmp(b)),
        (Value::Time(a), Value::Time(b)) => Some(a.cmp(b)),
        (Value::Integer(a), Value::Integer(b)) | (Value::Duration(a), Value::Duration(b)) => {
            Some(a.cmp(b))
        }
        (a, b) => match (a.as_f64(), b.as_f64()) {
            (Some(a), Some(b)) => a.partial_cmp(&b),
            _ => None,
        },
    };
    ordering.ok_or_else(|| mismatch("comparable operands", &[left.clone(), right.clone()]))
}

fn comparison(arguments: &[Value], test: impl Fn(Ordering) -> bool) -> Result<Value, ReactorError> {
    let (left, right) = binary(arguments)?;
    Ok(Value::Boolean(test(compare(left, right)?)))
}

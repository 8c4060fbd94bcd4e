//! Runtime values shared by the virtual machine and the reference evaluator

use crate::ast::{BinaryOp, Literal, UnaryOp};
use crate::types::{AtomicKind, Type};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Runtime value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Integer(i64),
    Real(f64),
    Character(char),
    Logical(bool),
    /// Strings and packed array output
    Array(Vec<Value>),
}

/// Failure while applying an operator
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ArithmeticError {
    #[error("division by zero")]
    DivisionByZero,

    #[error("integer overflow in `{op}`")]
    Overflow { op: String },

    #[error("operator `{op}` cannot be applied to {operands}")]
    Operands { op: String, operands: String },
}

impl Value {
    /// Character array holding `text`
    pub fn text(text: &str) -> Value {
        Value::Array(text.chars().map(Value::Character).collect())
    }

    /// Value of a source literal; a one-character string is a `caracter`
    pub fn from_literal(lit: &Literal) -> Value {
        match lit {
            Literal::Integer(n) => Value::Integer(*n),
            Literal::Real(x) => Value::Real(*x),
            Literal::Logical(b) => Value::Logical(*b),
            Literal::Text(text) => {
                let mut chars = text.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Value::Character(c),
                    _ => Value::text(text),
                }
            }
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Integer(_) => "entero",
            Value::Real(_) => "real",
            Value::Character(_) => "caracter",
            Value::Logical(_) => "logico",
            Value::Array(_) => "arreglo",
        }
    }

    pub fn kind(&self) -> Option<AtomicKind> {
        match self {
            Value::Integer(_) => Some(AtomicKind::Integer),
            Value::Real(_) => Some(AtomicKind::Real),
            Value::Character(_) => Some(AtomicKind::Character),
            Value::Logical(_) => Some(AtomicKind::Logical),
            Value::Array(_) => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_real(&self) -> Option<f64> {
        match self {
            Value::Real(x) => Some(*x),
            Value::Integer(n) => Some(*n as f64),
            _ => None,
        }
    }

    pub fn as_logical(&self) -> Option<bool> {
        match self {
            Value::Logical(b) => Some(*b),
            _ => None,
        }
    }

    /// Characters of a string value, `None` for anything else
    pub fn as_text(&self) -> Option<String> {
        match self {
            Value::Array(cells) => cells
                .iter()
                .map(|cell| match cell {
                    Value::Character(c) => Some(*c),
                    _ => None,
                })
                .collect(),
            _ => None,
        }
    }

    /// Convert an integer into a real when stored into a real slot
    pub fn coerce(self, kind: AtomicKind) -> Value {
        match (self, kind) {
            (Value::Integer(n), AtomicKind::Real) => Value::Real(n as f64),
            (value, _) => value,
        }
    }

    /// Whether a value supplied at run time may be stored into `target`
    pub fn fits(&self, target: &Type) -> bool {
        match (self, target) {
            (Value::Array(_), _) => match (self.as_text(), target.text_capacity()) {
                (Some(text), Some(capacity)) => text.chars().count() <= capacity,
                _ => false,
            },
            (Value::Character(_), Type::Array { .. }) => target.is_text(),
            (scalar, Type::Atomic(kind)) => scalar.kind().is_some_and(|k| kind.accepts(k)),
            _ => false,
        }
    }

    /// Apply a binary operator
    pub fn binary(op: BinaryOp, lhs: &Value, rhs: &Value) -> Result<Value, ArithmeticError> {
        use Value::*;

        let mismatch = || ArithmeticError::Operands {
            op: op.to_string(),
            operands: format!("{} and {}", lhs.type_name(), rhs.type_name()),
        };
        let overflow = || ArithmeticError::Overflow { op: op.to_string() };

        match op {
            BinaryOp::Plus | BinaryOp::Minus | BinaryOp::Times | BinaryOp::Power => {
                if let (Integer(a), Integer(b)) = (lhs, rhs) {
                    let result = match op {
                        BinaryOp::Plus => a.checked_add(*b),
                        BinaryOp::Minus => a.checked_sub(*b),
                        BinaryOp::Times => a.checked_mul(*b),
                        _ => integer_power(*a, *b),
                    };
                    return result.map(Integer).ok_or_else(overflow);
                }
                let (a, b) = lhs.as_real().zip(rhs.as_real()).ok_or_else(mismatch)?;
                Ok(Real(match op {
                    BinaryOp::Plus => a + b,
                    BinaryOp::Minus => a - b,
                    BinaryOp::Times => a * b,
                    _ => a.powf(b),
                }))
            }
            BinaryOp::Slash => {
                let (a, b) = lhs.as_real().zip(rhs.as_real()).ok_or_else(mismatch)?;
                Ok(Real(a / b))
            }
            BinaryOp::Div | BinaryOp::Mod => {
                let (Integer(a), Integer(b)) = (lhs, rhs) else {
                    return Err(mismatch());
                };
                if *b == 0 {
                    return Err(ArithmeticError::DivisionByZero);
                }
                let result = if op == BinaryOp::Div {
                    a.checked_div(*b)
                } else {
                    a.checked_rem(*b)
                };
                result.map(Integer).ok_or_else(overflow)
            }
            BinaryOp::And | BinaryOp::Or => {
                let (Logical(a), Logical(b)) = (lhs, rhs) else {
                    return Err(mismatch());
                };
                Ok(Logical(if op == BinaryOp::And {
                    *a && *b
                } else {
                    *a || *b
                }))
            }
            _ => {
                let ordering = match (lhs, rhs) {
                    (Integer(a), Integer(b)) => a.partial_cmp(b),
                    (Character(a), Character(b)) => a.partial_cmp(b),
                    (Logical(a), Logical(b)) => a.partial_cmp(b),
                    _ => {
                        let (a, b) = lhs.as_real().zip(rhs.as_real()).ok_or_else(mismatch)?;
                        a.partial_cmp(&b)
                    }
                };
                // NaN compares unequal to everything
                let Some(ordering) = ordering else {
                    return Ok(Logical(op == BinaryOp::Different));
                };
                Ok(Logical(match op {
                    BinaryOp::Minor => ordering.is_lt(),
                    BinaryOp::MinorEq => ordering.is_le(),
                    BinaryOp::Major => ordering.is_gt(),
                    BinaryOp::MajorEq => ordering.is_ge(),
                    BinaryOp::Equal => ordering.is_eq(),
                    _ => ordering.is_ne(),
                }))
            }
        }
    }

    /// Apply a unary operator
    pub fn unary(op: UnaryOp, operand: &Value) -> Result<Value, ArithmeticError> {
        match (op, operand) {
            (UnaryOp::Not, Value::Logical(b)) => Ok(Value::Logical(!b)),
            (UnaryOp::Neg, Value::Integer(n)) => {
                n.checked_neg()
                    .map(Value::Integer)
                    .ok_or_else(|| ArithmeticError::Overflow {
                        op: op.to_string(),
                    })
            }
            (UnaryOp::Neg, Value::Real(x)) => Ok(Value::Real(-x)),
            _ => Err(ArithmeticError::Operands {
                op: op.to_string(),
                operands: operand.type_name().to_string(),
            }),
        }
    }
}

/// Integer exponentiation; negative exponents truncate toward zero
fn integer_power(base: i64, exp: i64) -> Option<i64> {
    if exp >= 0 {
        let exp = u32::try_from(exp).ok()?;
        return base.checked_pow(exp);
    }
    match base {
        0 => None,
        1 => Some(1),
        -1 => Some(if exp % 2 == 0 { 1 } else { -1 }),
        _ => Some(0),
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Integer(n) => write!(f, "{}", n),
            Value::Real(x) if x.is_finite() && x.fract() == 0.0 => write!(f, "{:.1}", x),
            Value::Real(x) => write!(f, "{}", x),
            Value::Character('\0') => Ok(()),
            Value::Character(c) => write!(f, "{}", c),
            Value::Logical(true) => f.write_str("verdadero"),
            Value::Logical(false) => f.write_str("falso"),
            Value::Array(cells) => match self.as_text() {
                // padding cells end the string
                Some(text) => f.write_str(text.split('\0').next().unwrap_or_default()),
                None => {
                    for (i, cell) in cells.iter().enumerate() {
                        if i > 0 {
                            write!(f, " ")?;
                        }
                        write!(f, "{}", cell)?;
                    }
                    Ok(())
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_arithmetic_stays_integer() {
        let v = Value::binary(BinaryOp::Plus, &Value::Integer(2), &Value::Integer(3));
        assert_eq!(v, Ok(Value::Integer(5)));
        let v = Value::binary(BinaryOp::Power, &Value::Integer(2), &Value::Integer(10));
        assert_eq!(v, Ok(Value::Integer(1024)));
    }

    #[test]
    fn test_mixed_arithmetic_is_real() {
        let v = Value::binary(BinaryOp::Times, &Value::Integer(2), &Value::Real(1.5));
        assert_eq!(v, Ok(Value::Real(3.0)));
    }

    #[test]
    fn test_integer_division_by_zero() {
        let v = Value::binary(BinaryOp::Div, &Value::Integer(1), &Value::Integer(0));
        assert_eq!(v, Err(ArithmeticError::DivisionByZero));
        let v = Value::binary(BinaryOp::Mod, &Value::Integer(7), &Value::Integer(3));
        assert_eq!(v, Ok(Value::Integer(1)));
    }

    #[test]
    fn test_overflow_is_reported() {
        let v = Value::binary(BinaryOp::Plus, &Value::Integer(i64::MAX), &Value::Integer(1));
        assert!(matches!(v, Err(ArithmeticError::Overflow { .. })));
    }

    #[test]
    fn test_comparisons() {
        let v = Value::binary(BinaryOp::Minor, &Value::Integer(2), &Value::Real(2.5));
        assert_eq!(v, Ok(Value::Logical(true)));
        let v = Value::binary(
            BinaryOp::Different,
            &Value::Character('a'),
            &Value::Character('b'),
        );
        assert_eq!(v, Ok(Value::Logical(true)));
    }

    #[test]
    fn test_fits() {
        assert!(Value::Integer(3).fits(&Type::REAL));
        assert!(!Value::Real(3.0).fits(&Type::INTEGER));
        assert!(Value::text("hola").fits(&Type::string(4)));
        assert!(!Value::text("hola!").fits(&Type::string(4)));
        assert!(Value::Character('x').fits(&Type::string(4)));
    }

    #[test]
    fn test_display() {
        assert_eq!(Value::Real(2.0).to_string(), "2.0");
        assert_eq!(Value::Real(0.25).to_string(), "0.25");
        assert_eq!(Value::Logical(true).to_string(), "verdadero");
        let padded = Value::Array(vec![
            Value::Character('o'),
            Value::Character('k'),
            Value::Character('\0'),
        ]);
        assert_eq!(padded.to_string(), "ok");
        let numbers = Value::Array(vec![Value::Integer(1), Value::Integer(2)]);
        assert_eq!(numbers.to_string(), "1 2");
    }
}

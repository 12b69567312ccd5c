use std::cmp::Ordering;
use std::fmt;

use crate::error::{Error, Result};

// ============================================================================
// Numeric Type System
// ============================================================================

/// Page-level numbers: exact integers that overflow into doubles, and doubles.
#[derive(Debug, Clone, Copy)]
pub enum Number {
    /// Exact integer - becomes Float on overflow
    Int(i64),

    /// IEEE 754 double precision floating point
    Float(f64),
}

// ============================================================================
// Display Implementation
// ============================================================================

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Number::Int(n) => write!(f, "{n}"),
            Number::Float(x) => {
                if x.is_nan() {
                    write!(f, "+nan.0")
                } else if x.is_infinite() {
                    write!(f, "{}", if *x > 0.0 { "+inf.0" } else { "-inf.0" })
                } else if x.fract() == 0.0 && x.abs() < 1e16 {
                    write!(f, "{x:.1}")
                } else {
                    write!(f, "{x}")
                }
            }
        }
    }
}

// ============================================================================
// Equality and Comparison
// ============================================================================

impl PartialEq for Number {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Number::Int(a), Number::Int(b)) => a == b,
            _ => self.to_float() == other.to_float(),
        }
    }
}

impl PartialOrd for Number {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Number::Int(a), Number::Int(b)) => a.partial_cmp(b),
            _ => self.to_float().partial_cmp(&other.to_float()),
        }
    }
}

impl Number {
    pub fn to_float(self) -> f64 {
        match self {
            Number::Int(n) => n as f64,
            Number::Float(x) => x,
        }
    }

    pub fn is_exact(self) -> bool {
        matches!(self, Number::Int(_))
    }

    pub fn is_integer(self) -> bool {
        match self {
            Number::Int(_) => true,
            Number::Float(x) => x.is_finite() && x.fract() == 0.0,
        }
    }

    pub fn is_zero(self) -> bool {
        match self {
            Number::Int(n) => n == 0,
            Number::Float(x) => x == 0.0,
        }
    }

    /// `eqv?` on numbers: same exactness and same value.
    pub fn eqv(self, other: Number) -> bool {
        match (self, other) {
            (Number::Int(a), Number::Int(b)) => a == b,
            (Number::Float(a), Number::Float(b)) => a == b || (a.is_nan() && b.is_nan()),
            _ => false,
        }
    }

    /// Exact integer view, accepting integral floats.
    pub fn as_index(self) -> Option<i64> {
        match self {
            Number::Int(n) => Some(n),
            Number::Float(x) if x.is_finite() && x.fract() == 0.0 => Some(x as i64),
            Number::Float(_) => None,
        }
    }

    /// Exact conversion; integral floats become Int, others stay inexact.
    pub fn to_exact(self) -> Number {
        match self {
            Number::Float(x) if x.is_finite() && x.fract() == 0.0 && x.abs() < 9.2e18 => {
                Number::Int(x as i64)
            }
            other => other,
        }
    }
}

// ============================================================================
// Arithmetic Operations
// ============================================================================

impl Number {
    pub fn add(self, other: Number) -> Number {
        match (self, other) {
            (Number::Int(a), Number::Int(b)) => a
                .checked_add(b)
                .map_or_else(|| Number::Float(a as f64 + b as f64), Number::Int),
            _ => Number::Float(self.to_float() + other.to_float()),
        }
    }

    pub fn sub(self, other: Number) -> Number {
        match (self, other) {
            (Number::Int(a), Number::Int(b)) => a
                .checked_sub(b)
                .map_or_else(|| Number::Float(a as f64 - b as f64), Number::Int),
            _ => Number::Float(self.to_float() - other.to_float()),
        }
    }

    pub fn mul(self, other: Number) -> Number {
        match (self, other) {
            (Number::Int(a), Number::Int(b)) => a
                .checked_mul(b)
                .map_or_else(|| Number::Float(a as f64 * b as f64), Number::Int),
            _ => Number::Float(self.to_float() * other.to_float()),
        }
    }

    /// Exact when the quotient is exact, otherwise a double.
    pub fn div(self, other: Number) -> Result<Number> {
        match (self, other) {
            (Number::Int(_), Number::Int(0)) => Err(Error::DivisionByZero),
            (Number::Int(a), Number::Int(b)) if a.checked_rem(b) == Some(0) => Ok(a
                .checked_div(b)
                .map_or_else(|| Number::Float(a as f64 / b as f64), Number::Int)),
            _ => Ok(Number::Float(self.to_float() / other.to_float())),
        }
    }

    pub fn neg(self) -> Number {
        match self {
            Number::Int(n) => n
                .checked_neg()
                .map_or_else(|| Number::Float(-(n as f64)), Number::Int),
            Number::Float(x) => Number::Float(-x),
        }
    }

    /// Integer division family: `quotient`, `remainder`, `modulo`.
    pub fn integer_op(self, other: Number, op: IntegerOp) -> Result<Number> {
        match (self, other) {
            (Number::Int(_), Number::Int(0)) => Err(Error::DivisionByZero),
            // Only `i64::MIN` by -1 fails the checked ops; its remainder is 0.
            (Number::Int(a), Number::Int(b)) => Ok(match op {
                IntegerOp::Quotient => a
                    .checked_div(b)
                    .map_or_else(|| Number::Float(a as f64 / b as f64), Number::Int),
                IntegerOp::Remainder => Number::Int(a.checked_rem(b).unwrap_or(0)),
                IntegerOp::Modulo => {
                    let r = a.checked_rem(b).unwrap_or(0);
                    Number::Int(if r != 0 && (r < 0) != (b < 0) { r + b } else { r })
                }
            }),
            _ => {
                let (a, b) = (self.to_float(), other.to_float());
                if b == 0.0 {
                    return Err(Error::DivisionByZero);
                }
                Ok(Number::Float(match op {
                    IntegerOp::Quotient => (a / b).trunc(),
                    IntegerOp::Remainder => a % b,
                    IntegerOp::Modulo => ((a % b) + b) % b,
                }))
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntegerOp {
    Quotient,
    Remainder,
    Modulo,
}

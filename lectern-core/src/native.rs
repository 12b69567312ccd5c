//! Native function utilities and helpers
//!
//! Argument extraction for primitives written in Rust. Each helper takes the
//! primitive's name so type errors point at the procedure that rejected the
//! value.

use std::cell::RefCell;
use std::rc::Rc;

use crate::error::{Error, Result};
use crate::interner::Symbol;
use crate::language::Value;
use crate::numeric::Number;

// ============================================================================
// Value Extraction Helpers
// ============================================================================

pub fn expect_number(name: &str, value: &Value) -> Result<Number> {
    match value {
        Value::Number(n) => Ok(*n),
        other => Err(Error::wrong_type(name, "number", other)),
    }
}

/// An exact integer (integral floats are accepted).
pub fn expect_integer(name: &str, value: &Value) -> Result<i64> {
    match value {
        Value::Number(n) => n
            .as_index()
            .ok_or_else(|| Error::wrong_type(name, "integer", value)),
        other => Err(Error::wrong_type(name, "integer", other)),
    }
}

/// A non-negative integer usable as an index or length.
pub fn expect_index(name: &str, value: &Value) -> Result<usize> {
    let n = expect_integer(name, value)?;
    usize::try_from(n).map_err(|_| Error::IndexOutOfRange {
        name: name.to_string(),
        index: n,
    })
}

pub fn expect_string(name: &str, value: &Value) -> Result<Rc<str>> {
    match value {
        Value::Str(s) => Ok(s.clone()),
        other => Err(Error::wrong_type(name, "string", other)),
    }
}

pub fn expect_symbol(name: &str, value: &Value) -> Result<Symbol> {
    match value {
        Value::Symbol(s) => Ok(s.clone()),
        other => Err(Error::wrong_type(name, "symbol", other)),
    }
}

pub fn expect_char(name: &str, value: &Value) -> Result<char> {
    match value {
        Value::Char(c) => Ok(*c),
        other => Err(Error::wrong_type(name, "character", other)),
    }
}

pub fn expect_vector(name: &str, value: &Value) -> Result<Rc<RefCell<Vec<Value>>>> {
    match value {
        Value::Vector(items) => Ok(items.clone()),
        other => Err(Error::wrong_type(name, "vector", other)),
    }
}

pub fn expect_procedure(name: &str, value: &Value) -> Result<Value> {
    if value.is_procedure() {
        Ok(value.clone())
    } else {
        Err(Error::wrong_type(name, "procedure", value))
    }
}

// ============================================================================
// List Manipulation Helpers
// ============================================================================

/// Elements of a proper list.
pub fn expect_list(name: &str, value: &Value) -> Result<Vec<Value>> {
    value
        .to_vec()
        .ok_or_else(|| Error::wrong_type(name, "proper list", value))
}

/// `(apply f a ... rest)` as a callee and a flat argument vector.
pub fn spread_arguments(name: &str, mut args: Vec<Value>) -> Result<(Value, Vec<Value>)> {
    let last = args.pop().unwrap_or_default();
    let spread = expect_list(name, &last)?;
    if args.is_empty() {
        return Err(Error::Arity {
            name: name.to_string(),
            expected: "at least 2 arguments".to_string(),
            got: 1,
        });
    }
    let f = args.remove(0);
    args.extend(spread);
    Ok((f, args))
}

/// Bounds-checked position in a sequence of `len` elements.
pub fn checked_index(name: &str, value: &Value, len: usize) -> Result<usize> {
    let index = expect_integer(name, value)?;
    match usize::try_from(index) {
        Ok(i) if i < len => Ok(i),
        _ => Err(Error::IndexOutOfRange {
            name: name.to_string(),
            index,
        }),
    }
}

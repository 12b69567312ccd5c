//! Runtime error taxonomy.
//!
//! Every failure a program can observe is an [`Error`]. Two variants are
//! internal: `CompilationUnsupported` never leaves `Apply`, and
//! `ContinuationInvoked` is a control transfer that travels up through host
//! frames until a driver that owns the continuation installs it.

use std::rc::Rc;

use thiserror::Error;

use crate::interpreter::continuation::ContinuationValue;
use crate::language::Value;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("unbound variable: {0}")]
    UnboundVariable(String),

    #[error("not applicable: {0}")]
    NotApplicable(String),

    /// Raised by `(error msg irritant ...)`.
    #[error("{0}")]
    UserRaised(String),

    #[error("{name}: expected {expected}, got {got}")]
    WrongType {
        name: String,
        expected: &'static str,
        got: String,
    },

    /// `expected` reads as a phrase, e.g. "2 arguments" or "at least 1 argument".
    #[error("{name}: expected {expected}, got {got}")]
    Arity {
        name: String,
        expected: String,
        got: usize,
    },

    #[error("bad syntax in {form}: {reason}")]
    BadSyntax { form: String, reason: String },

    #[error("division by zero")]
    DivisionByZero,

    #[error("{name}: index {index} out of range")]
    IndexOutOfRange { name: String, index: i64 },

    #[error("host: {0}")]
    Host(String),

    #[error("compilation unsupported: {0}")]
    CompilationUnsupported(String),

    #[error("continuation invoked outside of its evaluation")]
    ContinuationInvoked(Rc<ContinuationValue>, Value),
}

impl Error {
    pub fn wrong_type(name: impl Into<String>, expected: &'static str, got: &Value) -> Self {
        Error::WrongType {
            name: name.into(),
            expected,
            got: got.to_string(),
        }
    }

    pub fn bad_syntax(form: &Value, reason: impl Into<String>) -> Self {
        Error::BadSyntax {
            form: form.to_string(),
            reason: reason.into(),
        }
    }

    /// True for the internal control transfer rather than a real failure.
    pub fn is_jump(&self) -> bool {
        matches!(self, Error::ContinuationInvoked(..))
    }
}

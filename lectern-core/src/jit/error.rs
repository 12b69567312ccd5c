//! Compiler error types.

use std::fmt;

use crate::error::Error;
use crate::language::Value;

/// Why a Lambda could not be compiled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompileErrorKind {
    /// A form the compiler leaves to the interpreter
    UnsupportedForm,
    /// Malformed expression structure
    InvalidSyntax,
    /// A macro use that failed to expand at compile time
    MacroExpansion,
}

/// A compilation failure with context.
#[derive(Debug, Clone)]
pub struct CompileError {
    pub kind: CompileErrorKind,
    pub message: String,
    /// The expression that caused the error (if available)
    pub expression: Option<String>,
}

impl CompileError {
    pub fn new(kind: CompileErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            expression: None,
        }
    }

    pub fn with_expression(mut self, expr: &Value) -> Self {
        self.expression = Some(expr.to_string());
        self
    }

    pub fn unsupported(what: impl Into<String>) -> Self {
        Self::new(CompileErrorKind::UnsupportedForm, what)
    }

    pub fn syntax(err: Error) -> Self {
        Self::new(CompileErrorKind::InvalidSyntax, err.to_string())
    }

    pub fn expansion(err: Error) -> Self {
        Self::new(CompileErrorKind::MacroExpansion, err.to_string())
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(ref expr) = self.expression {
            // Truncate long expressions
            if expr.chars().count() > 60 {
                let head: String = expr.chars().take(57).collect();
                write!(f, " in: {head}...")?;
            } else {
                write!(f, " in: {expr}")?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for CompileError {}

impl From<CompileError> for Error {
    fn from(err: CompileError) -> Error {
        Error::CompilationUnsupported(err.to_string())
    }
}

pub type CompileResult<T> = std::result::Result<T, CompileError>;

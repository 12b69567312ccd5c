//! Lazy closure compiler.
//!
//! A Lambda's body is translated into a tree of boxed Rust closures the first
//! time it is applied. The outcome is memoized on the Lambda and never changes:
//! a body containing any form the compiler refuses stays interpreted for good.
//!
//! Compiled code runs on the host stack. Calls in tail position do not
//! recurse; they park `{callee, args}` in the runtime's trampoline slot and
//! return [`Flow::Bounce`], and [`run_native`] loops on the parked call.

pub mod analysis;
pub mod compiler;
pub mod error;
pub mod locals;

use std::rc::Rc;

use log::debug;

use crate::environment::Env;
use crate::error::{Error, Result};
use crate::interner::Symbol;
use crate::language::{LambdaCell, Value};
use crate::runtime::Runtime;

pub use error::{CompileError, CompileErrorKind};

/// What a compiled expression in tail position hands back.
pub enum Flow {
    Value(Value),
    /// The call parked in the trampoline slot is still to be made.
    Bounce,
}

pub(crate) type ValueCode = Box<dyn Fn(&Runtime, &Env) -> Result<Value>>;
pub(crate) type TailCode = Box<dyn Fn(&Runtime, &Env) -> Result<Flow>>;

/// The compiled form of a Lambda body, shared by every closure instantiated
/// from the same source lambda.
pub struct CompiledBody {
    /// Frame slots: parameters, then internal defines.
    pub(crate) layout: Rc<Vec<Symbol>>,
    /// No closure created by the body can capture its frame.
    pub(crate) private: bool,
    pub(crate) code: TailCode,
}

impl CompiledBody {
    /// A fresh frame for a call of `lambda`.
    fn frame(&self, lambda: &LambdaCell, args: Vec<Value>) -> Result<Env> {
        let values = self.slot_values(lambda, args)?;
        Ok(lambda.env.extend_with_layout(self.layout.clone(), values, self.private))
    }

    fn slot_values(&self, lambda: &LambdaCell, args: Vec<Value>) -> Result<Vec<Value>> {
        let mut values = lambda.params.bind_values(args, || lambda.display_name())?;
        values.resize(self.layout.len(), Value::Unassigned);
        Ok(values)
    }

    pub fn is_private(&self) -> bool {
        self.private
    }

    pub fn slot_count(&self) -> usize {
        self.layout.len()
    }
}

/// Result of running compiled code.
pub(crate) enum Native {
    Done(Value),
    /// A tail call to something that is not compiled; the caller makes it.
    Pending(Value, Vec<Value>),
}

/// The memoized compiled body of `lambda`, compiling on first request.
pub(crate) fn compiled(rt: &Runtime, lambda: &LambdaCell) -> Option<Rc<CompiledBody>> {
    if !rt.config().jit {
        return None;
    }
    lambda.compiled_or_init(|| match compiler::compile_lambda(rt, lambda) {
        Ok(body) => {
            debug!(
                "compiled {} ({} slots{})",
                lambda.display_name(),
                body.slot_count(),
                if body.private { ", private frame" } else { "" }
            );
            Some(Rc::new(body))
        }
        Err(err) => {
            let err = Error::from(err);
            debug!("{} stays interpreted: {err}", lambda.display_name());
            None
        }
    })
}

/// Compiled body to run `lambda` natively, or `None` when it must be
/// interpreted (compilation refused, JIT off, or native nesting too deep).
pub(crate) fn native_body(rt: &Runtime, lambda: &LambdaCell) -> Option<Rc<CompiledBody>> {
    if rt.native_depth() >= rt.config().native_depth_limit {
        return None;
    }
    compiled(rt, lambda)
}

/// Run a compiled Lambda, following tail calls between compiled Lambdas
/// without growing the host stack.
pub(crate) fn run_native(
    rt: &Runtime,
    lambda: &Rc<LambdaCell>,
    body: &Rc<CompiledBody>,
    args: Vec<Value>,
) -> Result<Native> {
    let _depth = rt.enter_native();
    let mut lambda = lambda.clone();
    let mut body = body.clone();
    let mut env = body.frame(&lambda, args)?;
    loop {
        match (body.code)(rt, &env)? {
            Flow::Value(value) => return Ok(Native::Done(value)),
            Flow::Bounce => {
                let (callee, args) = rt.take_bounce()?;
                if let Value::Lambda(next) = &callee {
                    if Rc::ptr_eq(next, &lambda) && env.is_private() && env.is_unshared() {
                        env.refill(body.slot_values(&lambda, args)?);
                        continue;
                    }
                    if let Some(next_body) = compiled(rt, next) {
                        env = next_body.frame(next, args)?;
                        lambda = next.clone();
                        body = next_body;
                        continue;
                    }
                }
                return Ok(Native::Pending(callee, args));
            }
        }
    }
}

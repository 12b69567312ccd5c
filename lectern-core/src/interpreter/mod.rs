//! Trampolined evaluator.
//!
//! A [`State`] holds the pending expression (or, once `ready`, the value just
//! computed), its environment and the current continuation. The driver loop
//! alternates [`State::eval`], which makes one step of progress on the
//! expression, and [`State::resume`], which hands a finished value to the
//! continuation. Every suspension is a heap [`Continuation`] frame, so the
//! host stack does not grow with the program's recursion depth.

pub mod continuation;

use std::rc::Rc;

use crate::environment::Env;
use crate::error::{Error, Result};
use crate::expander::{self, SyntaxCell, SyntaxRules};
use crate::jit::{self, Native};
use crate::language::{Control, LambdaCell, PrimitiveBody, Value, copy_tree};
use crate::native::spread_arguments;
use crate::runtime::Runtime;
use crate::syntax::{self, Special};

use continuation::{Continuation, ContinuationValue, Frame, RunId};

pub struct State<'rt> {
    rt: &'rt Runtime,
    expr: Value,
    env: Env,
    cont: Rc<Continuation>,
    ready: bool,
    run: RunId,
    /// A top-level driver installs every continuation it is handed; a nested
    /// one only installs its own.
    toplevel: bool,
    halt: Rc<Continuation>,
}

impl<'rt> State<'rt> {
    pub(crate) fn new(rt: &'rt Runtime, env: Env, toplevel: bool) -> Self {
        let run = rt.next_run();
        let halt = Continuation::halt(env.clone(), run);
        State {
            rt,
            expr: Value::Unspecified,
            env,
            cont: halt.clone(),
            ready: true,
            run,
            toplevel,
            halt,
        }
    }

    /// Evaluate `expr` to completion.
    pub(crate) fn eval_expr(mut self, expr: Value) -> Result<Value> {
        let rt = self.rt;
        let _entry = rt.enter();
        self.expr = expr;
        self.ready = false;
        self.drive(Ok(()))
    }

    /// Apply `f` to `args` to completion.
    pub(crate) fn call(mut self, f: Value, args: Vec<Value>) -> Result<Value> {
        let rt = self.rt;
        let _entry = rt.enter();
        let entered = self.call_f(f, args);
        self.drive(entered)
    }

    fn owns(&self, k: &ContinuationValue) -> bool {
        self.toplevel || k.run() == self.run
    }

    /// Run until the halt frame. The caller holds the runtime entry guard.
    fn drive(&mut self, entered: Result<()>) -> Result<Value> {
        let mut pending = entered.err();
        loop {
            let step = match pending.take() {
                Some(err) => Err(err),
                None => self.step(),
            };
            match step {
                Ok(Some(value)) => return Ok(value),
                Ok(None) => {}
                Err(Error::ContinuationInvoked(k, value)) if self.owns(&k) => {
                    pending = self.jump(k, value).err();
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn step(&mut self) -> Result<Option<Value>> {
        if self.eval()? {
            self.resume()
        } else {
            Ok(None)
        }
    }

    fn finish(&mut self, value: Value) {
        self.expr = value;
        self.ready = true;
    }

    fn continue_with(&mut self, expr: Value, env: Env) {
        self.expr = expr;
        self.env = env;
        self.ready = false;
    }

    // ========================================================================
    // Eval
    // ========================================================================

    /// One step of progress on the pending expression. Returns `ready`.
    pub fn eval(&mut self) -> Result<bool> {
        if self.ready {
            return Ok(true);
        }
        match std::mem::take(&mut self.expr) {
            Value::Symbol(name) => {
                let value = self.env.get(&name)?;
                self.finish(value);
            }
            form @ Value::Pair(_) => self.eval_pair(form)?,
            other => self.finish(other),
        }
        Ok(self.ready)
    }

    fn eval_pair(&mut self, form: Value) -> Result<()> {
        let head = form.car().unwrap_or_default();
        let operands = form.cdr().unwrap_or_default();
        let Value::Symbol(name) = &head else {
            self.cont = Continuation::push(
                Frame::Arguments {
                    pending: operands,
                    done: Vec::new(),
                },
                self.env.clone(),
                self.cont.clone(),
            );
            self.expr = head;
            return Ok(());
        };
        let rt = self.rt;
        let keywords = rt.keywords();
        if keywords.is_special(name) {
            let special = syntax::parse(keywords, name, &form)?;
            return self.eval_special(special, &form);
        }
        let operator = self.env.get(name)?;
        if let Value::Syntax(macro_value) = &operator {
            let expansion = expander::expand(rt, macro_value, &form)?;
            expander::memoize(keywords, &form, &expansion);
            self.expr = form;
            return Ok(());
        }
        self.collect(vec![operator], operands)
    }

    fn eval_special(&mut self, special: Special, form: &Value) -> Result<()> {
        let env = self.env.clone();
        match special {
            Special::Quote(datum) => self.finish(datum),
            Special::Quasiquote(template) => {
                let keywords = self.rt.keywords();
                let expansion = expander::expand_quasiquote(keywords, &template)?;
                expander::memoize(keywords, form, &expansion);
                self.continue_with(expansion, env);
            }
            Special::If {
                test,
                consequent,
                alternative,
            } => {
                self.cont = Continuation::push(
                    Frame::Branch {
                        consequent,
                        alternative,
                    },
                    env.clone(),
                    self.cont.clone(),
                );
                self.continue_with(test, env);
            }
            Special::Begin(forms) => self.sequence(forms, env),
            Special::Set { name, value } => {
                self.cont = Continuation::push(Frame::Assign { name }, env.clone(), self.cont.clone());
                self.continue_with(value, env);
            }
            Special::Define { name, value: None } => {
                env.define(name, Value::Unspecified);
                self.finish(Value::Unspecified);
            }
            Special::Define {
                name,
                value: Some(value),
            } => {
                self.cont = Continuation::push(Frame::Define { name }, env.clone(), self.cont.clone());
                self.continue_with(value, env);
            }
            Special::Lambda { params, body, name } => {
                let lambda = Rc::new(LambdaCell::new(params, body, env.clone()));
                match name {
                    Some(name) => {
                        lambda.set_name_if_anonymous(&name);
                        env.define(name, Value::Lambda(lambda));
                        self.finish(Value::Unspecified);
                    }
                    None => self.finish(Value::Lambda(lambda)),
                }
            }
            Special::DefineSyntax { name, value } => {
                self.cont =
                    Continuation::push(Frame::DefineSyntax { name }, env.clone(), self.cont.clone());
                self.continue_with(value, env);
            }
            Special::SyntaxRules => {
                let rules = SyntaxRules::parse(form, self.rt.keywords())?;
                self.finish(Value::Syntax(Rc::new(SyntaxCell::rules(rules))));
            }
        }
        Ok(())
    }

    /// Evaluate a list of forms in order, the last in tail position.
    fn sequence(&mut self, forms: Value, env: Env) {
        let Value::Pair(cell) = forms else {
            self.finish(Value::Unspecified);
            return;
        };
        let rest = cell.cdr();
        if rest.as_pair().is_some() {
            self.cont = Continuation::push(Frame::Sequence { rest }, env.clone(), self.cont.clone());
        }
        self.continue_with(cell.car(), env);
    }

    /// Operands that need no continuation frame: constants, variables and
    /// quoted data.
    fn immediate(&self, expr: &Value) -> Result<Option<Value>> {
        match expr {
            Value::Symbol(name) => self.env.get(name).map(Some),
            Value::Pair(cell) => match cell.car() {
                Value::Symbol(head) if head == self.rt.keywords().quote => {
                    let rest = cell.cdr();
                    match (rest.car(), rest.cdr()) {
                        (Some(datum), Some(Value::Nil)) => Ok(Some(datum)),
                        _ => Ok(None),
                    }
                }
                _ => Ok(None),
            },
            other => Ok(Some(other.clone())),
        }
    }

    /// Evaluate the remaining operands, then apply `done[0]` to the rest.
    fn collect(&mut self, mut done: Vec<Value>, mut pending: Value) -> Result<()> {
        while let Value::Pair(cell) = pending {
            let operand = cell.car();
            match self.immediate(&operand)? {
                Some(value) => {
                    done.push(value);
                    pending = cell.cdr();
                }
                None => {
                    self.cont = Continuation::push(
                        Frame::Arguments {
                            pending: cell.cdr(),
                            done,
                        },
                        self.env.clone(),
                        self.cont.clone(),
                    );
                    self.expr = operand;
                    self.ready = false;
                    return Ok(());
                }
            }
        }
        if done.is_empty() {
            return Err(Error::NotApplicable("()".to_string()));
        }
        let operator = done.remove(0);
        self.call_f(operator, done)
    }

    // ========================================================================
    // Resume
    // ========================================================================

    /// Deliver the ready value to the current continuation. Returns the final
    /// value when a halt frame is reached.
    pub fn resume(&mut self) -> Result<Option<Value>> {
        let value = std::mem::take(&mut self.expr);
        let current = std::mem::replace(&mut self.cont, self.halt.clone());
        let mut owned = Rc::unwrap_or_clone(current);
        let frame = std::mem::replace(&mut owned.frame, Frame::Halt);
        let parent = owned.parent.take().unwrap_or_else(|| self.halt.clone());
        let env = owned.env.clone();
        let run = owned.run;
        drop(owned);
        self.cont = parent;

        match frame {
            Frame::Halt => return Ok(Some(value)),
            Frame::Arguments { pending, mut done } => {
                done.push(value);
                self.env = env;
                self.collect(done, pending)?;
            }
            Frame::Sequence { rest } => self.sequence(rest, env),
            Frame::Branch {
                consequent,
                alternative,
            } => match (value.is_true(), alternative) {
                (true, _) => self.continue_with(consequent, env),
                (false, Some(alternative)) => self.continue_with(alternative, env),
                (false, None) => self.finish(Value::Unspecified),
            },
            Frame::Assign { name } => {
                env.set(&name, value)?;
                self.finish(Value::Unspecified);
            }
            Frame::Define { name } => {
                if let Value::Lambda(lambda) = &value {
                    lambda.set_name_if_anonymous(&name);
                }
                env.define(name, value);
                self.finish(Value::Unspecified);
            }
            Frame::DefineSyntax { name } => {
                let syntax = match value {
                    syntax @ Value::Syntax(_) => syntax,
                    proc if proc.is_procedure() => Value::Syntax(Rc::new(SyntaxCell::procedure(proc))),
                    other => return Err(Error::wrong_type("define-syntax", "transformer", &other)),
                };
                env.define(name, syntax);
                self.finish(Value::Unspecified);
            }
            Frame::WindIn {
                before,
                thunk,
                after,
            } => {
                let winder = self.rt.winders().push(before, after);
                self.rt.set_winders(winder.clone());
                self.cont = Continuation::push(Frame::WindOut { winder }, env.clone(), self.cont.clone());
                self.env = env;
                self.call_f(thunk, Vec::new())?;
            }
            Frame::WindOut { winder } => {
                self.rt.set_winders(winder.parent());
                self.cont = Continuation::push(Frame::Deliver { value }, env.clone(), self.cont.clone());
                self.env = env;
                self.call_f(winder.after(), Vec::new())?;
            }
            Frame::Deliver { value } => self.finish(value),
            Frame::Rewind {
                steps,
                next,
                target,
                value: delivered,
            } => {
                if let Some(previous) = next.checked_sub(1).and_then(|i| steps.get(i)) {
                    self.rt.set_winders(previous.after.clone());
                }
                match steps.get(next).cloned() {
                    Some(step) => {
                        self.rt.set_winders(step.during);
                        self.cont = Rc::new(Continuation {
                            frame: Frame::Rewind {
                                steps,
                                next: next + 1,
                                target,
                                value: delivered,
                            },
                            env: env.clone(),
                            parent: None,
                            run,
                        });
                        self.env = env;
                        self.call_f(step.thunk, Vec::new())?;
                    }
                    None => {
                        self.rt.set_winders(target.winders.clone());
                        self.cont = target.point.clone();
                        self.finish(delivered);
                    }
                }
            }
        }
        Ok(None)
    }

    // ========================================================================
    // Application
    // ========================================================================

    /// Apply `f` to `args` with the current continuation as the return point.
    fn call_f(&mut self, mut f: Value, mut args: Vec<Value>) -> Result<()> {
        loop {
            match f {
                Value::Primitive(prim) => {
                    prim.arity.check(prim.name, &args)?;
                    match prim.body {
                        PrimitiveBody::Native(func) => {
                            let value = func(&args, self.rt)?;
                            self.finish(value);
                        }
                        PrimitiveBody::Control(Control::CallCc) => {
                            let k = ContinuationValue::new(self.cont.clone(), self.rt.winders());
                            f = args.swap_remove(0);
                            args = vec![Value::Continuation(Rc::new(k))];
                            continue;
                        }
                        PrimitiveBody::Control(Control::Apply) => {
                            (f, args) = spread_arguments(prim.name, args)?;
                            continue;
                        }
                        PrimitiveBody::Control(Control::DynamicWind) => {
                            let mut parts = args.into_iter();
                            let before = parts.next().unwrap_or_default();
                            let thunk = parts.next().unwrap_or_default();
                            let after = parts.next().unwrap_or_default();
                            self.cont = Continuation::push(
                                Frame::WindIn {
                                    before: before.clone(),
                                    thunk,
                                    after,
                                },
                                self.env.clone(),
                                self.cont.clone(),
                            );
                            f = before;
                            args = Vec::new();
                            continue;
                        }
                        PrimitiveBody::Control(Control::Eval) => {
                            // Macro uses are rewritten in place; keep that off the caller's data.
                            let expr = copy_tree(&args[0]);
                            self.continue_with(expr, self.rt.global().clone());
                        }
                    }
                    return Ok(());
                }
                Value::Lambda(lambda) => {
                    if let Some(body) = jit::native_body(self.rt, &lambda) {
                        match jit::run_native(self.rt, &lambda, &body, args)? {
                            Native::Done(value) => {
                                self.finish(value);
                                return Ok(());
                            }
                            Native::Pending(callee, rest) => {
                                f = callee;
                                args = rest;
                                continue;
                            }
                        }
                    }
                    let env = lambda.bind(args)?;
                    self.continue_with(lambda.body.clone(), env);
                    return Ok(());
                }
                Value::Continuation(k) => return self.jump(k, Value::from_values(args)),
                other => return Err(Error::NotApplicable(other.to_string())),
            }
        }
    }

    /// Transfer control to `k`, running the after and before thunks between
    /// the current wind list and the one `k` was captured under.
    fn jump(&mut self, k: Rc<ContinuationValue>, value: Value) -> Result<()> {
        if !self.owns(&k) {
            return Err(Error::ContinuationInvoked(k, value));
        }
        let steps = self.rt.winders().path_to(&k.winders);
        if steps.is_empty() {
            self.cont = k.point.clone();
            self.finish(value);
            return Ok(());
        }
        self.cont = Rc::new(Continuation {
            frame: Frame::Rewind {
                steps: steps.into(),
                next: 0,
                target: k,
                value,
            },
            env: self.env.clone(),
            parent: None,
            run: self.run,
        });
        self.finish(Value::Unspecified);
        Ok(())
    }
}

// ============================================================================
// Entry points
// ============================================================================

/// Evaluate one top-level form in `env`.
pub(crate) fn eval_toplevel(rt: &Runtime, expr: Value, env: Env) -> Result<Value> {
    State::new(rt, env, true).eval_expr(expr)
}

/// Apply `f` under a driver that installs every continuation.
pub(crate) fn call_toplevel(rt: &Runtime, f: Value, args: Vec<Value>) -> Result<Value> {
    State::new(rt, rt.global().clone(), true).call(f, args)
}

/// Apply `f` under a nested driver; continuations captured by other drivers
/// propagate upward as [`Error::ContinuationInvoked`].
pub(crate) fn call_nested(rt: &Runtime, f: Value, args: Vec<Value>) -> Result<Value> {
    State::new(rt, rt.global().clone(), false).call(f, args)
}


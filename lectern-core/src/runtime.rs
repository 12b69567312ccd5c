//! The runtime: every piece of state an evaluation touches, owned by one
//! value instead of living in globals.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use log::{trace, warn};

use crate::bootstrap;
use crate::config::RuntimeConfig;
use crate::environment::Env;
use crate::error::{Error, Result};
use crate::host::{FileFetcher, Fetcher, HostRegistry, OutputSink, Scheduler, StdoutSink, Task};
use crate::interner::{Keywords, Symbol, SymbolTable};
use crate::interpreter::{self, continuation::RunId, continuation::Winders};
use crate::jit::{self, Native};
use crate::language::{Arity, CompileState, Control, NativeFn, Primitive, PrimitiveBody, Value};
use crate::native::spread_arguments;
use crate::parser::read_all;
use crate::stdlib;

pub struct Runtime {
    config: RuntimeConfig,
    symbols: RefCell<SymbolTable>,
    keywords: Keywords,
    global: Env,
    /// The dynamic-wind list in effect.
    winders: RefCell<Winders>,
    /// The trampoline slot: a tail call parked by compiled code.
    bounce: RefCell<Option<(Value, Vec<Value>)>>,
    runs: Cell<RunId>,
    /// Interpreter drivers currently on the host stack.
    entries: Cell<usize>,
    /// Compiled calls currently on the host stack.
    native_depth: Cell<usize>,
    gensyms: Cell<u64>,
    output: RefCell<Box<dyn OutputSink>>,
    fetcher: RefCell<Rc<dyn Fetcher>>,
    scheduler: Scheduler,
    host: HostRegistry,
}

/// Held while an interpreter driver runs. Leaving the outermost one clears
/// the wind list and trampoline slot, whatever state an error left them in.
pub(crate) struct EntryGuard<'rt> {
    rt: &'rt Runtime,
}

impl Drop for EntryGuard<'_> {
    fn drop(&mut self) {
        let remaining = self.rt.entries.get().saturating_sub(1);
        self.rt.entries.set(remaining);
        if remaining == 0 {
            let winders = self.rt.winders.replace(Winders::default());
            let bounce = self.rt.bounce.borrow_mut().take();
            drop((winders, bounce));
        }
    }
}

pub(crate) struct NativeGuard<'rt> {
    rt: &'rt Runtime,
}

impl Drop for NativeGuard<'_> {
    fn drop(&mut self) {
        let depth = self.rt.native_depth.get();
        self.rt.native_depth.set(depth.saturating_sub(1));
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Runtime::new(RuntimeConfig::default())
    }
}

impl Runtime {
    /// A runtime writing to stdout, with the standard library and bootstrap
    /// library loaded.
    pub fn new(config: RuntimeConfig) -> Self {
        Self::with_output(config, StdoutSink)
    }

    pub fn with_output(config: RuntimeConfig, sink: impl OutputSink + 'static) -> Self {
        let mut symbols = SymbolTable::new();
        let keywords = Keywords::new(&mut symbols);
        let fetcher: Rc<dyn Fetcher> = Rc::new(FileFetcher::new(config.fetch_root.clone()));
        let rt = Runtime {
            config,
            symbols: RefCell::new(symbols),
            keywords,
            global: Env::new_root(),
            winders: RefCell::new(Winders::default()),
            bounce: RefCell::new(None),
            runs: Cell::new(0),
            entries: Cell::new(0),
            native_depth: Cell::new(0),
            gensyms: Cell::new(0),
            output: RefCell::new(Box::new(sink)),
            fetcher: RefCell::new(fetcher),
            scheduler: Scheduler::new(),
            host: HostRegistry::with_defaults(),
        };
        stdlib::register_stdlib(&rt);
        bootstrap::load(&rt);
        rt
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn keywords(&self) -> &Keywords {
        &self.keywords
    }

    /// The top-level environment.
    pub fn global(&self) -> &Env {
        &self.global
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn host(&self) -> &HostRegistry {
        &self.host
    }

    // ========================================================================
    // Reading and evaluation
    // ========================================================================

    /// Every datum in `src`. Reading stops at the first malformed datum.
    pub fn read(&self, src: &str) -> Vec<Value> {
        read_all(src, &mut self.symbols.borrow_mut(), &self.keywords)
    }

    /// Evaluate one top-level form.
    pub fn eval(&self, expr: &Value) -> Result<Value> {
        interpreter::eval_toplevel(self, expr.clone(), self.global.clone())
    }

    /// Evaluate every form in `src`, stopping at the first error. Returns the
    /// last value.
    pub fn eval_str(&self, src: &str) -> Result<Value> {
        let mut result = Value::Unspecified;
        for form in self.read(src) {
            result = self.eval(&form)?;
        }
        Ok(result)
    }

    /// Evaluate every form in `src` independently: one result per form, and a
    /// failing form does not stop the ones after it.
    pub fn submit(&self, src: &str) -> Vec<Result<Value>> {
        let results = self.read(src).iter().map(|form| self.eval(form)).collect();
        self.flush_output();
        results
    }

    // ========================================================================
    // Application
    // ========================================================================

    /// Apply `f` to `args`. Compiled Lambdas run directly, following tail
    /// calls through the trampoline slot; everything that needs the
    /// evaluator's control state runs in a nested interpreter driver.
    pub fn apply(&self, f: &Value, args: Vec<Value>) -> Result<Value> {
        if self.entries.get() == 0 {
            return self.call(f, args);
        }
        let mut f = f.clone();
        let mut args = args;
        loop {
            match f.clone() {
                Value::Primitive(prim) => {
                    prim.arity.check(prim.name, &args)?;
                    match prim.body {
                        PrimitiveBody::Native(func) => return func(&args, self),
                        PrimitiveBody::Control(Control::Apply) => {
                            (f, args) = spread_arguments(prim.name, args)?;
                        }
                        PrimitiveBody::Control(Control::DynamicWind) => return self.wind(args),
                        PrimitiveBody::Control(Control::CallCc | Control::Eval) => {
                            return interpreter::call_nested(self, f, args);
                        }
                    }
                }
                Value::Lambda(lambda) => {
                    let Some(body) = jit::native_body(self, &lambda) else {
                        return interpreter::call_nested(self, f, args);
                    };
                    match jit::run_native(self, &lambda, &body, args)? {
                        Native::Done(value) => return Ok(value),
                        Native::Pending(callee, rest) => {
                            f = callee;
                            args = rest;
                        }
                    }
                }
                Value::Continuation(_) => return interpreter::call_nested(self, f, args),
                other => return Err(Error::NotApplicable(other.to_string())),
            }
        }
    }

    /// `dynamic-wind` called from compiled or native code. A continuation
    /// jump out of `thunk` leaves the winder installed for the driver that
    /// performs the jump to unwind.
    fn wind(&self, args: Vec<Value>) -> Result<Value> {
        let [before, thunk, after] = <[Value; 3]>::try_from(args)
            .map_err(|args| Arity::Exactly(3).error("dynamic-wind", args.len()))?;
        self.apply(&before, Vec::new())?;
        let winder = self.winders().push(before, after.clone());
        self.set_winders(winder.clone());
        let result = self.apply(&thunk, Vec::new())?;
        self.set_winders(winder.parent());
        self.apply(&after, Vec::new())?;
        Ok(result)
    }

    /// Apply `f` under a fresh top-level driver, which installs any
    /// continuation invoked beneath it.
    pub fn call(&self, f: &Value, args: Vec<Value>) -> Result<Value> {
        interpreter::call_toplevel(self, f.clone(), args)
    }

    // ========================================================================
    // Bindings
    // ========================================================================

    pub fn intern(&self, name: &str) -> Symbol {
        self.symbols.borrow_mut().intern(name)
    }

    /// Bind `name` in the top-level environment.
    pub fn define(&self, name: &str, value: Value) {
        let symbol = self.intern(name);
        self.global.define(symbol, value);
    }

    pub fn lookup(&self, name: &str) -> Option<Value> {
        let symbol = self.symbols.borrow().get(name)?;
        self.global.lookup(&symbol)
    }

    pub fn register_native(&self, name: &'static str, arity: Arity, func: NativeFn) {
        self.define(name, Value::Primitive(Rc::new(Primitive::native(name, arity, func))));
    }

    pub(crate) fn register_control(&self, name: &'static str, arity: Arity, control: Control) {
        self.define(name, Value::Primitive(Rc::new(Primitive::control(name, arity, control))));
    }

    /// Expose a host function to `host-call`.
    pub fn register_host_fn(&self, name: &str, func: impl Fn(&[Value]) -> Result<Value> + 'static) {
        self.host.register_fn(name, Rc::new(func));
    }

    /// A fresh symbol no reader input can produce.
    pub fn gensym(&self, prefix: &str) -> Symbol {
        let n = self.gensyms.get() + 1;
        self.gensyms.set(n);
        Symbol::uninterned(&format!("{prefix}{n}"))
    }

    /// Attempt compilation of a Lambda now rather than at its first call.
    pub fn compile(&self, f: &Value) -> Option<CompileState> {
        let Value::Lambda(lambda) = f else {
            return None;
        };
        jit::compiled(self, lambda);
        Some(lambda.compile_state())
    }

    // ========================================================================
    // Host boundary
    // ========================================================================

    pub fn set_output(&self, sink: impl OutputSink + 'static) {
        let previous = self.output.replace(Box::new(sink));
        drop(previous);
    }

    pub fn write_output(&self, text: &str) {
        self.output.borrow_mut().write_str(text);
    }

    pub fn flush_output(&self) {
        self.output.borrow_mut().flush();
    }

    pub fn set_fetcher(&self, fetcher: impl Fetcher + 'static) {
        *self.fetcher.borrow_mut() = Rc::new(fetcher);
    }

    /// Run deferred tasks until none remain, each as a fresh top-level call.
    pub fn run_deferred(&self) -> Vec<Result<Value>> {
        let mut results = Vec::new();
        while let Some((id, task)) = self.scheduler.pop_due() {
            trace!("deferred task {id} at {}ms", self.scheduler.now());
            let result = match task {
                Task::Call { procedure, args } => self.call(&procedure, args),
                Task::Fetch { name, procedure } => {
                    let fetcher = self.fetcher.borrow().clone();
                    fetcher
                        .fetch(&name)
                        .and_then(|text| self.call(&procedure, vec![Value::string(&text)]))
                }
            };
            if let Err(err) = &result {
                warn!("deferred task {id} failed: {err}");
            }
            results.push(result);
        }
        self.flush_output();
        results
    }

    // ========================================================================
    // Evaluator state
    // ========================================================================

    pub(crate) fn next_run(&self) -> RunId {
        let run = self.runs.get() + 1;
        self.runs.set(run);
        run
    }

    pub(crate) fn enter(&self) -> EntryGuard<'_> {
        self.entries.set(self.entries.get() + 1);
        EntryGuard { rt: self }
    }

    pub(crate) fn enter_native(&self) -> NativeGuard<'_> {
        self.native_depth.set(self.native_depth.get() + 1);
        NativeGuard { rt: self }
    }

    pub(crate) fn native_depth(&self) -> usize {
        self.native_depth.get()
    }

    pub(crate) fn winders(&self) -> Winders {
        self.winders.borrow().clone()
    }

    pub(crate) fn set_winders(&self, winders: Winders) {
        let previous = self.winders.replace(winders);
        drop(previous);
    }

    pub(crate) fn set_bounce(&self, callee: Value, args: Vec<Value>) {
        *self.bounce.borrow_mut() = Some((callee, args));
    }

    pub(crate) fn take_bounce(&self) -> Result<(Value, Vec<Value>)> {
        self.bounce
            .borrow_mut()
            .take()
            .ok_or_else(|| Error::Host("trampoline slot is empty".to_string()))
    }
}

//! The boundary to the embedding program: where output goes, where fetched
//! text comes from, deferred tasks, and a registry of named host values and
//! functions reachable from Scheme.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};
use std::rc::Rc;
use std::time::{SystemTime, UNIX_EPOCH};

use rustc_hash::FxHashMap;

use crate::error::{Error, Result};
use crate::language::Value;
use crate::native::expect_string;

// ============================================================================
// Output
// ============================================================================

/// Destination for `display`, `write` and `newline`.
pub trait OutputSink {
    fn write_str(&mut self, text: &str);

    fn flush(&mut self) {}
}

/// Writes straight to the process's standard output.
#[derive(Debug, Default)]
pub struct StdoutSink;

impl OutputSink for StdoutSink {
    fn write_str(&mut self, text: &str) {
        let _ = io::stdout().lock().write_all(text.as_bytes());
    }

    fn flush(&mut self) {
        let _ = io::stdout().flush();
    }
}

/// Collects output in memory. Clones share the same buffer, so an embedder
/// can keep one handle and give the other to the runtime.
#[derive(Debug, Default, Clone)]
pub struct BufferSink(Rc<RefCell<String>>);

impl BufferSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> String {
        self.0.borrow().clone()
    }

    /// Return and clear the buffered text.
    pub fn take(&self) -> String {
        std::mem::take(&mut *self.0.borrow_mut())
    }
}

impl OutputSink for BufferSink {
    fn write_str(&mut self, text: &str) {
        self.0.borrow_mut().push_str(text);
    }
}

// ============================================================================
// Fetching
// ============================================================================

/// Source of text for `fetch-text`.
pub trait Fetcher {
    fn fetch(&self, name: &str) -> Result<String>;
}

/// Reads files below a root directory. Absolute names and names that climb
/// out of the root are refused.
#[derive(Debug, Clone)]
pub struct FileFetcher {
    root: PathBuf,
}

impl FileFetcher {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        FileFetcher { root: root.into() }
    }
}

impl Fetcher for FileFetcher {
    fn fetch(&self, name: &str) -> Result<String> {
        let relative = Path::new(name);
        if !relative
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
        {
            return Err(Error::Host(format!("fetch-text: refusing path '{name}'")));
        }
        let path = self.root.join(relative);
        std::fs::read_to_string(&path)
            .map_err(|e| Error::Host(format!("fetch-text: failed to read '{}': {e}", path.display())))
    }
}

// ============================================================================
// Deferred tasks
// ============================================================================

pub type TaskId = u64;

#[derive(Debug, Clone)]
pub enum Task {
    /// Apply a procedure to arguments.
    Call { procedure: Value, args: Vec<Value> },
    /// Fetch text, then apply `procedure` to it.
    Fetch { name: String, procedure: Value },
}

/// Deferred tasks on a virtual clock. Running a task advances the clock to
/// its due time; nothing ever sleeps.
#[derive(Debug, Default)]
pub struct Scheduler {
    now: Cell<u64>,
    next_id: Cell<TaskId>,
    queue: RefCell<BTreeMap<(u64, TaskId), Task>>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Virtual milliseconds elapsed.
    pub fn now(&self) -> u64 {
        self.now.get()
    }

    pub fn schedule(&self, delay_ms: u64, task: Task) -> TaskId {
        let id = self.next_id.get() + 1;
        self.next_id.set(id);
        let due = self.now.get().saturating_add(delay_ms);
        self.queue.borrow_mut().insert((due, id), task);
        id
    }

    /// Returns false when the task already ran or never existed.
    pub fn cancel(&self, id: TaskId) -> bool {
        let mut queue = self.queue.borrow_mut();
        let before = queue.len();
        queue.retain(|&(_, task_id), _| task_id != id);
        queue.len() != before
    }

    /// The earliest task, advancing the clock to it. Ties run in submission
    /// order.
    pub fn pop_due(&self) -> Option<(TaskId, Task)> {
        let ((due, id), task) = self.queue.borrow_mut().pop_first()?;
        self.now.set(self.now.get().max(due));
        Some((id, task))
    }

    pub fn pending(&self) -> usize {
        self.queue.borrow().len()
    }
}

// ============================================================================
// Host registry
// ============================================================================

/// A function the embedder exposes to `host-call`.
pub type HostFn = Rc<dyn Fn(&[Value]) -> Result<Value>>;

/// Named host properties and functions.
#[derive(Default)]
pub struct HostRegistry {
    properties: RefCell<FxHashMap<String, Value>>,
    functions: RefCell<FxHashMap<String, HostFn>>,
}

impl HostRegistry {
    /// A registry holding the default functions `clock-ms` and `env-var`.
    pub fn with_defaults() -> Self {
        let registry = HostRegistry::default();
        registry.register_fn("clock-ms", Rc::new(clock_ms));
        registry.register_fn("env-var", Rc::new(env_var));
        registry
    }

    pub fn register_fn(&self, name: &str, func: HostFn) {
        self.functions.borrow_mut().insert(name.to_string(), func);
    }

    pub fn function(&self, name: &str) -> Option<HostFn> {
        self.functions.borrow().get(name).cloned()
    }

    pub fn property(&self, name: &str) -> Option<Value> {
        self.properties.borrow().get(name).cloned()
    }

    pub fn set_property(&self, name: &str, value: Value) {
        self.properties.borrow_mut().insert(name.to_string(), value);
    }

    /// True when `name` is either a property or a function.
    pub fn is_bound(&self, name: &str) -> bool {
        self.properties.borrow().contains_key(name) || self.functions.borrow().contains_key(name)
    }
}

fn clock_ms(_args: &[Value]) -> Result<Value> {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| Error::Host(format!("clock-ms: {e}")))?
        .as_millis();
    Ok(Value::int(i64::try_from(millis).unwrap_or(i64::MAX)))
}

fn env_var(args: &[Value]) -> Result<Value> {
    let [name] = args else {
        return Err(Error::Arity {
            name: "env-var".to_string(),
            expected: "1 argument".to_string(),
            got: args.len(),
        });
    };
    let name = expect_string("env-var", name)?;
    Ok(std::env::var(&*name)
        .map(|v| Value::string(&v))
        .unwrap_or(Value::Bool(false)))
}

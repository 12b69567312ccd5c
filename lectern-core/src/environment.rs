//! Environment for variable bindings
//!
//! An [`Env`] is one lexical scope: a frame of slots plus a parent link.
//! Names resolve to slot indices, so the interpreter can look bindings up by
//! name while compiled code addresses the same frames by `(depth, index)`.

use std::cell::RefCell;
use std::rc::Rc;

use rustc_hash::FxHashMap;

use crate::error::{Error, Result};
use crate::interner::Symbol;
use crate::language::Value;

// Frames with more names than this switch from a linear scan to a hash index.
const SCAN_LIMIT: usize = 12;

enum Names {
    Slots(Rc<Vec<Symbol>>),
    Table(FxHashMap<Symbol, usize>),
}

impl Names {
    fn position(&self, name: &Symbol) -> Option<usize> {
        match self {
            Names::Slots(names) => names.iter().position(|n| n == name),
            Names::Table(table) => table.get(name).copied(),
        }
    }

    fn push(&mut self, name: Symbol, index: usize) {
        match self {
            Names::Slots(names) if names.len() < SCAN_LIMIT => Rc::make_mut(names).push(name),
            Names::Slots(names) => {
                let mut table: FxHashMap<Symbol, usize> = names
                    .iter()
                    .enumerate()
                    .map(|(i, n)| (n.clone(), i))
                    .collect();
                table.insert(name, index);
                *self = Names::Table(table);
            }
            Names::Table(table) => {
                table.insert(name, index);
            }
        }
    }
}

struct Scope {
    names: RefCell<Names>,
    slots: RefCell<Vec<Value>>,
    parent: Option<Env>,
    private: bool,
}

/// A lexical scope. Cheap to clone (an `Rc` increment).
#[derive(Clone)]
pub struct Env(Rc<Scope>);

impl Env {
    /// A fresh top-level environment.
    pub fn new_root() -> Self {
        Env(Rc::new(Scope {
            names: RefCell::new(Names::Table(FxHashMap::default())),
            slots: RefCell::new(Vec::new()),
            parent: None,
            private: false,
        }))
    }

    /// Child scope binding `names[i]` to `values[i]`.
    pub fn extend(&self, names: Vec<Symbol>, values: Vec<Value>) -> Self {
        self.extend_with_layout(Rc::new(names), values, false)
    }

    /// Child scope sharing a precomputed slot layout. A private scope is one
    /// that no closure created inside it can capture.
    pub fn extend_with_layout(&self, layout: Rc<Vec<Symbol>>, values: Vec<Value>, private: bool) -> Self {
        let names = if layout.len() > SCAN_LIMIT {
            Names::Table(
                layout
                    .iter()
                    .enumerate()
                    .map(|(i, n)| (n.clone(), i))
                    .collect(),
            )
        } else {
            Names::Slots(layout)
        };
        Env(Rc::new(Scope {
            names: RefCell::new(names),
            slots: RefCell::new(values),
            parent: Some(self.clone()),
            private,
        }))
    }

    pub fn parent(&self) -> Option<&Env> {
        self.0.parent.as_ref()
    }

    pub fn is_private(&self) -> bool {
        self.0.private
    }

    /// True when nothing but the caller holds this scope.
    pub fn is_unshared(&self) -> bool {
        Rc::strong_count(&self.0) == 1
    }

    pub fn ptr_eq(&self, other: &Env) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Introduce or overwrite a binding in this scope.
    pub fn define(&self, name: Symbol, value: Value) {
        let existing = self.0.names.borrow().position(&name);
        match existing {
            Some(index) => self.0.slots.borrow_mut()[index] = value,
            None => {
                let mut slots = self.0.slots.borrow_mut();
                let index = slots.len();
                slots.push(value);
                self.0.names.borrow_mut().push(name, index);
            }
        }
    }

    /// Slot holding `name` in this scope, unless it is still unassigned.
    fn bound_index(&self, name: &Symbol) -> Option<usize> {
        let index = self.0.names.borrow().position(name)?;
        match self.0.slots.borrow()[index] {
            Value::Unassigned => None,
            _ => Some(index),
        }
    }

    /// Look a name up along the parent chain.
    pub fn lookup(&self, name: &Symbol) -> Option<Value> {
        let mut env = self;
        loop {
            if let Some(index) = env.bound_index(name) {
                return Some(env.0.slots.borrow()[index].clone());
            }
            env = env.0.parent.as_ref()?;
        }
    }

    pub fn get(&self, name: &Symbol) -> Result<Value> {
        self.lookup(name)
            .ok_or_else(|| Error::UnboundVariable(name.name().to_string()))
    }

    /// Assign the nearest existing binding.
    pub fn set(&self, name: &Symbol, value: Value) -> Result<()> {
        let mut env = self;
        loop {
            if let Some(index) = env.bound_index(name) {
                env.0.slots.borrow_mut()[index] = value;
                return Ok(());
            }
            env = env
                .0
                .parent
                .as_ref()
                .ok_or_else(|| Error::UnboundVariable(name.name().to_string()))?;
        }
    }

    // ========================================================================
    // Slot access for compiled code
    // ========================================================================

    pub fn slot(&self, index: usize) -> Value {
        self.0.slots.borrow()[index].clone()
    }

    pub fn set_slot(&self, index: usize, value: Value) {
        self.0.slots.borrow_mut()[index] = value;
    }

    /// The scope `depth` parents up (`0` is `self`).
    pub fn ancestor(&self, depth: usize) -> &Env {
        let mut env = self;
        for _ in 0..depth {
            match env.0.parent.as_ref() {
                Some(parent) => env = parent,
                None => break,
            }
        }
        env
    }

    /// Overwrite every slot in place; used when a private frame is reused
    /// for a self tail call.
    pub fn refill(&self, values: Vec<Value>) {
        *self.0.slots.borrow_mut() = values;
    }

    pub fn len(&self) -> usize {
        self.0.slots.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

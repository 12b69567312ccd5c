//! Compile-time view of the frames a compiled body will run in.
//!
//! Each [`Locals`] mirrors one runtime frame built with a fixed slot layout.
//! A variable reference resolves to a slot in the current frame, a slot in an
//! enclosing compiled frame, or a by-name lookup past the compiled frames.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::interner::Symbol;
use crate::language::Value;

use super::ValueCode;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum VarRef {
    /// Slot in the current frame.
    Local(usize),
    /// Slot in the frame `depth` parents up.
    Outer(usize, usize),
    /// Not statically visible: look up by name, starting past the compiled
    /// frames.
    Free(usize, Symbol),
}

pub(crate) struct Locals<'p> {
    names: RefCell<Vec<Symbol>>,
    parent: Option<&'p Locals<'p>>,
    captured: Cell<bool>,
}

impl<'p> Locals<'p> {
    pub(crate) fn new(parent: Option<&'p Locals<'p>>) -> Self {
        Locals {
            names: RefCell::new(Vec::new()),
            parent,
            captured: Cell::new(false),
        }
    }

    /// Give `name` a slot in this frame; an existing slot is reused.
    pub(crate) fn add(&self, name: &Symbol) -> usize {
        if let Some(index) = self.get(name) {
            return index;
        }
        let mut names = self.names.borrow_mut();
        names.push(name.clone());
        names.len() - 1
    }

    pub(crate) fn get(&self, name: &Symbol) -> Option<usize> {
        self.names.borrow().iter().position(|n| n == name)
    }

    pub(crate) fn layout(&self) -> Rc<Vec<Symbol>> {
        Rc::new(self.names.borrow().clone())
    }

    /// Record that a closure created here keeps this frame and every
    /// enclosing one alive.
    pub(crate) fn capture(&self) {
        let mut scope = Some(self);
        while let Some(current) = scope {
            current.captured.set(true);
            scope = current.parent;
        }
    }

    pub(crate) fn is_captured(&self) -> bool {
        self.captured.get()
    }

    pub(crate) fn resolve(&self, name: &Symbol) -> VarRef {
        let mut depth = 0;
        let mut scope = Some(self);
        while let Some(current) = scope {
            if let Some(index) = current.get(name) {
                return if depth == 0 {
                    VarRef::Local(index)
                } else {
                    VarRef::Outer(depth, index)
                };
            }
            depth += 1;
            scope = current.parent;
        }
        VarRef::Free(depth, name.clone())
    }

    /// Code reading `name`. A slot whose definition has not run yet is
    /// passed over, and the search continues by name in the frame above it.
    pub(crate) fn reference(&self, name: &Symbol) -> ValueCode {
        match self.resolve(name) {
            VarRef::Local(index) => {
                let name = name.clone();
                Box::new(move |_, env| match env.slot(index) {
                    Value::Unassigned => env.ancestor(1).get(&name),
                    value => Ok(value),
                })
            }
            VarRef::Outer(depth, index) => {
                let name = name.clone();
                Box::new(move |_, env| {
                    let frame = env.ancestor(depth);
                    match frame.slot(index) {
                        Value::Unassigned => frame.ancestor(1).get(&name),
                        value => Ok(value),
                    }
                })
            }
            VarRef::Free(skip, name) => Box::new(move |_, env| env.ancestor(skip).get(&name)),
        }
    }

    /// Code assigning the result of `value` to `name`.
    pub(crate) fn set(&self, name: &Symbol, value: ValueCode) -> ValueCode {
        match self.resolve(name) {
            VarRef::Local(index) => Self::set_slot(0, index, name.clone(), value),
            VarRef::Outer(depth, index) => Self::set_slot(depth, index, name.clone(), value),
            VarRef::Free(skip, name) => Box::new(move |rt, env| {
                let v = value(rt, env)?;
                env.ancestor(skip).set(&name, v)?;
                Ok(Value::Unspecified)
            }),
        }
    }

    fn set_slot(depth: usize, index: usize, name: Symbol, value: ValueCode) -> ValueCode {
        Box::new(move |rt, env| {
            let v = value(rt, env)?;
            let frame = env.ancestor(depth);
            match frame.slot(index) {
                Value::Unassigned => frame.ancestor(1).set(&name, v)?,
                _ => frame.set_slot(index, v),
            }
            Ok(Value::Unspecified)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interner::SymbolTable;

    #[test]
    fn test_resolve_local_outer_free() {
        let mut table = SymbolTable::new();
        let (x, y, z) = (table.intern("x"), table.intern("y"), table.intern("z"));
        let outer = Locals::new(None);
        outer.add(&x);
        let inner = Locals::new(Some(&outer));
        inner.add(&y);
        assert_eq!(inner.resolve(&y), VarRef::Local(0));
        assert_eq!(inner.resolve(&x), VarRef::Outer(1, 0));
        assert_eq!(inner.resolve(&z), VarRef::Free(2, z));
    }

    #[test]
    fn test_add_is_idempotent() {
        let mut table = SymbolTable::new();
        let x = table.intern("x");
        let scope = Locals::new(None);
        assert_eq!(scope.add(&x), 0);
        assert_eq!(scope.add(&x), 0);
        assert_eq!(scope.get(&x), Some(0));
        assert_eq!(scope.layout().len(), 1);
    }

    #[test]
    fn test_capture_marks_enclosing_scopes() {
        let outer = Locals::new(None);
        let inner = Locals::new(Some(&outer));
        inner.capture();
        assert!(outer.is_captured());
        assert!(inner.is_captured());
    }
}

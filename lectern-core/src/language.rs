use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use once_cell::unsync::OnceCell;

use crate::environment::Env;
use crate::error::{Error, Result};
use crate::expander::SyntaxCell;
use crate::interner::Symbol;
use crate::interpreter::continuation::ContinuationValue;
use crate::jit::CompiledBody;
use crate::numeric::Number;
use crate::runtime::Runtime;

// ============================================================================
// Core Type System
// ============================================================================

#[derive(Clone, Default)]
pub enum Value {
    /// The canonical empty list
    #[default]
    Nil,
    /// Result of forms evaluated for effect
    Unspecified,
    Bool(bool),
    Number(Number),
    Char(char),
    Str(Rc<str>),
    Symbol(Symbol),
    Pair(Rc<ConsCell>),
    Vector(Rc<RefCell<Vec<Value>>>),
    Lambda(Rc<LambdaCell>),
    Continuation(Rc<ContinuationValue>),
    Syntax(Rc<SyntaxCell>),
    Primitive(Rc<Primitive>),
    /// More than one value delivered to a single-value continuation
    Values(Rc<[Value]>),
    /// A compiled frame slot whose internal definition has not run yet.
    /// Lookups pass over it as if the name were not bound there.
    Unassigned,
}

/// A mutable cons cell.
pub struct ConsCell {
    car: RefCell<Value>,
    cdr: RefCell<Value>,
}

impl ConsCell {
    pub fn car(&self) -> Value {
        self.car.borrow().clone()
    }

    pub fn cdr(&self) -> Value {
        self.cdr.borrow().clone()
    }

    pub fn set_car(&self, value: Value) {
        *self.car.borrow_mut() = value;
    }

    pub fn set_cdr(&self, value: Value) {
        *self.cdr.borrow_mut() = value;
    }
}

// Long lists would otherwise drop recursively through their cdr chain.
impl Drop for ConsCell {
    fn drop(&mut self) {
        let mut next = self.cdr.take();
        while let Value::Pair(cell) = next {
            match Rc::try_unwrap(cell) {
                Ok(cell) => next = cell.cdr.take(),
                Err(_) => break,
            }
        }
    }
}

// ============================================================================
// Procedures
// ============================================================================

/// Formal parameters: positional names plus an optional rest name.
#[derive(Clone, Debug)]
pub struct Params {
    pub required: Vec<Symbol>,
    pub rest: Option<Symbol>,
}

impl Params {
    /// Parse a formals list: `(a b)`, `(a . rest)` or a bare `args` symbol.
    pub fn parse(formals: &Value) -> Option<Params> {
        let mut required = Vec::new();
        let mut current = formals.clone();
        loop {
            match current {
                Value::Nil => return Some(Params { required, rest: None }),
                Value::Symbol(rest) => {
                    return Some(Params {
                        required,
                        rest: Some(rest),
                    });
                }
                Value::Pair(cell) => {
                    let Value::Symbol(name) = cell.car() else {
                        return None;
                    };
                    if required.contains(&name) {
                        return None;
                    }
                    required.push(name);
                    current = cell.cdr();
                }
                _ => return None,
            }
        }
    }

    pub fn accepts(&self, count: usize) -> bool {
        if self.rest.is_some() {
            count >= self.required.len()
        } else {
            count == self.required.len()
        }
    }

    /// Names in frame-slot order.
    pub fn names(&self) -> impl Iterator<Item = &Symbol> {
        self.required.iter().chain(self.rest.iter())
    }

    pub fn arity(&self) -> Arity {
        match self.rest {
            Some(_) => Arity::AtLeast(self.required.len()),
            None => Arity::Exactly(self.required.len()),
        }
    }

    /// Slot values for a call: positional arguments then a fresh rest list.
    /// `name` is only consulted to report an arity error.
    pub fn bind_values(&self, mut args: Vec<Value>, name: impl FnOnce() -> String) -> Result<Vec<Value>> {
        if !self.accepts(args.len()) {
            return Err(self.arity().error(&name(), args.len()));
        }
        if self.rest.is_some() {
            let rest = list_from_vec(args.split_off(self.required.len()));
            args.push(rest);
        }
        Ok(args)
    }
}

/// Outcome of the one-shot compilation attempt of a Lambda.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompileState {
    Untried,
    Compiled,
    Failed,
}

/// An interpreted closure. Its compiled form is attempted at most once.
pub struct LambdaCell {
    pub params: Params,
    pub body: Value,
    pub env: Env,
    name: RefCell<Option<Symbol>>,
    compiled: OnceCell<Option<Rc<CompiledBody>>>,
}

impl LambdaCell {
    pub fn new(params: Params, body: Value, env: Env) -> Self {
        LambdaCell {
            params,
            body,
            env,
            name: RefCell::new(None),
            compiled: OnceCell::new(),
        }
    }

    /// A closure instantiated from an already compiled template.
    pub(crate) fn with_compiled(
        params: Params,
        body: Value,
        env: Env,
        compiled: Rc<CompiledBody>,
    ) -> Self {
        let compiled_cell = OnceCell::new();
        let _ = compiled_cell.set(Some(compiled));
        LambdaCell {
            params,
            body,
            env,
            name: RefCell::new(None),
            compiled: compiled_cell,
        }
    }

    pub fn name(&self) -> Option<Symbol> {
        self.name.borrow().clone()
    }

    /// Names an anonymous lambda the first time it is bound by `define`.
    pub fn set_name_if_anonymous(&self, name: &Symbol) {
        let mut slot = self.name.borrow_mut();
        if slot.is_none() {
            *slot = Some(name.clone());
        }
    }

    pub fn display_name(&self) -> String {
        self.name()
            .map_or_else(|| "lambda".to_string(), |n| n.name().to_string())
    }

    pub fn compile_state(&self) -> CompileState {
        match self.compiled.get() {
            None => CompileState::Untried,
            Some(Some(_)) => CompileState::Compiled,
            Some(None) => CompileState::Failed,
        }
    }

    /// The memoized compiled form; `init` runs only on the first request.
    pub(crate) fn compiled_or_init(
        &self,
        init: impl FnOnce() -> Option<Rc<CompiledBody>>,
    ) -> Option<Rc<CompiledBody>> {
        self.compiled.get_or_init(init).clone()
    }

    /// A child environment binding the parameters, for interpretation.
    pub fn bind(&self, args: Vec<Value>) -> Result<Env> {
        let values = self.params.bind_values(args, || self.display_name())?;
        Ok(self.env.extend(self.params.names().cloned().collect(), values))
    }
}

/// Argument count accepted by a procedure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exactly(usize),
    AtLeast(usize),
    Range(usize, usize),
}

impl Arity {
    pub fn accepts(self, count: usize) -> bool {
        match self {
            Arity::Exactly(n) => count == n,
            Arity::AtLeast(n) => count >= n,
            Arity::Range(lo, hi) => (lo..=hi).contains(&count),
        }
    }

    pub fn error(self, name: &str, got: usize) -> Error {
        let plural = |n: usize| if n == 1 { "" } else { "s" };
        let expected = match self {
            Arity::Exactly(n) => format!("{n} argument{}", plural(n)),
            Arity::AtLeast(n) => format!("at least {n} argument{}", plural(n)),
            Arity::Range(lo, hi) => format!("{lo} to {hi} arguments"),
        };
        Error::Arity {
            name: name.to_string(),
            expected,
            got,
        }
    }

    pub fn check(self, name: &str, args: &[Value]) -> Result<()> {
        if self.accepts(args.len()) {
            Ok(())
        } else {
            Err(self.error(name, args.len()))
        }
    }
}

/// Native function type - Rust functions callable from Scheme
pub type NativeFn = fn(&[Value], &Runtime) -> Result<Value>;

/// Procedures that need the evaluator's control state rather than a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    CallCc,
    DynamicWind,
    Apply,
    Eval,
}

#[derive(Clone, Copy)]
pub enum PrimitiveBody {
    Native(NativeFn),
    Control(Control),
}

/// A host procedure bound into the top-level environment.
pub struct Primitive {
    pub name: &'static str,
    pub arity: Arity,
    pub body: PrimitiveBody,
}

impl Primitive {
    pub fn native(name: &'static str, arity: Arity, func: NativeFn) -> Self {
        Primitive {
            name,
            arity,
            body: PrimitiveBody::Native(func),
        }
    }

    pub fn control(name: &'static str, arity: Arity, control: Control) -> Self {
        Primitive {
            name,
            arity,
            body: PrimitiveBody::Control(control),
        }
    }
}

// ============================================================================
// Primitive Operations
// ============================================================================

pub fn cons(car: Value, cdr: Value) -> Value {
    Value::Pair(Rc::new(ConsCell {
        car: RefCell::new(car),
        cdr: RefCell::new(cdr),
    }))
}

pub fn list_from_vec(items: Vec<Value>) -> Value {
    list_with_tail(items, Value::Nil)
}

pub fn list_with_tail(items: Vec<Value>, tail: Value) -> Value {
    items
        .into_iter()
        .rev()
        .fold(tail, |acc, item| cons(item, acc))
}

/// Fresh pairs for every pair reachable through car and cdr. Vectors and
/// other leaves are shared.
pub fn copy_tree(value: &Value) -> Value {
    let mut items = Vec::new();
    let mut rest = value.clone();
    while let Value::Pair(cell) = &rest {
        items.push(copy_tree(&cell.car()));
        let next = cell.cdr();
        rest = next;
    }
    list_with_tail(items, rest)
}

impl Value {
    pub fn string(s: &str) -> Value {
        Value::Str(Rc::from(s))
    }

    pub fn int(n: i64) -> Value {
        Value::Number(Number::Int(n))
    }

    pub fn vector(items: Vec<Value>) -> Value {
        Value::Vector(Rc::new(RefCell::new(items)))
    }

    pub fn is_true(&self) -> bool {
        !matches!(self, Value::Bool(false))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Nil)
    }

    pub fn is_procedure(&self) -> bool {
        matches!(
            self,
            Value::Lambda(_) | Value::Primitive(_) | Value::Continuation(_)
        )
    }

    pub fn as_symbol(&self) -> Option<&Symbol> {
        match self {
            Value::Symbol(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_pair(&self) -> Option<&Rc<ConsCell>> {
        match self {
            Value::Pair(p) => Some(p),
            _ => None,
        }
    }

    pub fn car(&self) -> Option<Value> {
        self.as_pair().map(|p| p.car())
    }

    pub fn cdr(&self) -> Option<Value> {
        self.as_pair().map(|p| p.cdr())
    }

    /// Iterate over the elements of a list, stopping at the first non-pair tail.
    pub fn iter(&self) -> ListIter {
        ListIter {
            current: self.clone(),
        }
    }

    /// Elements of a proper list, or `None` for improper lists and non-lists.
    pub fn to_vec(&self) -> Option<Vec<Value>> {
        let mut items = Vec::new();
        let mut current = self.clone();
        loop {
            match current {
                Value::Nil => return Some(items),
                Value::Pair(cell) => {
                    items.push(cell.car());
                    current = cell.cdr();
                }
                _ => return None,
            }
        }
    }

    /// Values carried by a (possibly multiple) value, for `call-with-values`.
    pub fn into_values(self) -> Vec<Value> {
        match self {
            Value::Values(vals) => vals.to_vec(),
            single => vec![single],
        }
    }

    /// Package continuation arguments: one value stays itself.
    pub fn from_values(mut vals: Vec<Value>) -> Value {
        if vals.len() == 1 {
            vals.pop().unwrap_or_default()
        } else {
            Value::Values(vals.into())
        }
    }
}

pub struct ListIter {
    current: Value,
}

impl Iterator for ListIter {
    type Item = Value;

    fn next(&mut self) -> Option<Value> {
        match std::mem::take(&mut self.current) {
            Value::Pair(cell) => {
                self.current = cell.cdr();
                Some(cell.car())
            }
            _ => None,
        }
    }
}

// ============================================================================
// Equivalence
// ============================================================================

/// `eq?`: identity for heap objects, value for immediates.
pub fn eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Nil, Value::Nil) | (Value::Unspecified, Value::Unspecified) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Number(x), Value::Number(y)) => x.eqv(*y),
        (Value::Char(x), Value::Char(y)) => x == y,
        (Value::Symbol(x), Value::Symbol(y)) => x == y,
        (Value::Str(x), Value::Str(y)) => Rc::ptr_eq(x, y),
        (Value::Pair(x), Value::Pair(y)) => Rc::ptr_eq(x, y),
        (Value::Vector(x), Value::Vector(y)) => Rc::ptr_eq(x, y),
        (Value::Lambda(x), Value::Lambda(y)) => Rc::ptr_eq(x, y),
        (Value::Continuation(x), Value::Continuation(y)) => Rc::ptr_eq(x, y),
        (Value::Syntax(x), Value::Syntax(y)) => Rc::ptr_eq(x, y),
        (Value::Primitive(x), Value::Primitive(y)) => Rc::ptr_eq(x, y),
        _ => false,
    }
}

/// `eqv?` differs from `eq?` only on empty strings, which are all alike.
pub fn eqv(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Str(x), Value::Str(y)) if x.is_empty() && y.is_empty() => true,
        _ => eq(a, b),
    }
}

/// `equal?`: structural equality, iterative along list spines.
pub fn equal(a: &Value, b: &Value) -> bool {
    let mut a = a.clone();
    let mut b = b.clone();
    loop {
        match (&a, &b) {
            (Value::Pair(x), Value::Pair(y)) => {
                if Rc::ptr_eq(x, y) {
                    return true;
                }
                if !equal(&x.car(), &y.car()) {
                    return false;
                }
                let (next_a, next_b) = (x.cdr(), y.cdr());
                a = next_a;
                b = next_b;
            }
            (Value::Str(x), Value::Str(y)) => return x == y,
            (Value::Vector(x), Value::Vector(y)) => {
                let (x, y) = (x.borrow(), y.borrow());
                return x.len() == y.len() && x.iter().zip(y.iter()).all(|(p, q)| equal(p, q));
            }
            (Value::Number(x), Value::Number(y)) => return x.eqv(*y),
            (Value::Values(x), Value::Values(y)) => {
                return x.len() == y.len() && x.iter().zip(y.iter()).all(|(p, q)| equal(p, q));
            }
            _ => return eqv(&a, &b),
        }
    }
}

// Structural equality for tests and assertions.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        equal(self, other)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}")
    }
}

impl fmt::Debug for LambdaCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LambdaCell")
            .field("params", &self.params)
            .field("body", &self.body)
            .field("env", &"<environment>")
            .field("compiled", &self.compile_state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_roundtrip_through_vec() {
        let list = list_from_vec(vec![Value::int(1), Value::int(2), Value::int(3)]);
        assert_eq!(list.to_vec().unwrap().len(), 3);
        assert_eq!(list.iter().count(), 3);
    }

    #[test]
    fn test_improper_list_has_no_vec() {
        let pair = cons(Value::int(1), Value::int(2));
        assert!(pair.to_vec().is_none());
    }

    #[test]
    fn test_equal_is_structural_and_eq_is_identity() {
        let a = list_from_vec(vec![Value::int(1), Value::string("x")]);
        let b = list_from_vec(vec![Value::int(1), Value::string("x")]);
        assert!(equal(&a, &b));
        assert!(!eq(&a, &b));
        assert!(eq(&a, &a.clone()));
    }

    #[test]
    fn test_only_false_is_false() {
        assert!(Value::Nil.is_true());
        assert!(Value::int(0).is_true());
        assert!(!Value::Bool(false).is_true());
    }

    #[test]
    fn test_copy_tree_makes_fresh_pairs() {
        let inner = list_from_vec(vec![Value::int(2)]);
        let tree = list_with_tail(vec![Value::int(1), inner.clone()], Value::int(3));
        let copy = copy_tree(&tree);
        assert!(equal(&tree, &copy));
        assert!(!eq(&tree, &copy));
        copy.cdr().unwrap().car().unwrap().as_pair().unwrap().set_car(Value::int(9));
        assert_eq!(inner.to_string(), "(2)");
    }

    #[test]
    fn test_set_car_mutates_in_place() {
        let pair = cons(Value::int(1), Value::Nil);
        let alias = pair.clone();
        pair.as_pair().unwrap().set_car(Value::int(9));
        assert_eq!(alias.car().unwrap(), Value::int(9));
    }

    #[test]
    fn test_dropping_long_list_does_not_overflow() {
        let items = (0..200_000).map(Value::int).collect();
        drop(list_from_vec(items));
    }

    #[test]
    fn test_params_bind_rest_list() {
        let mut table = crate::interner::SymbolTable::new();
        let params = Params {
            required: vec![table.intern("a")],
            rest: Some(table.intern("more")),
        };
        let slots = params
            .bind_values(vec![Value::int(1), Value::int(2), Value::int(3)], || "f".into())
            .unwrap();
        assert_eq!(slots.len(), 2);
        assert_eq!(slots[1], list_from_vec(vec![Value::int(2), Value::int(3)]));
        assert!(params.bind_values(vec![], || "f".into()).is_err());
    }

    #[test]
    fn test_params_parse_shapes() {
        let mut table = crate::interner::SymbolTable::new();
        let (a, b) = (table.intern("a"), table.intern("b"));
        let proper = list_from_vec(vec![Value::Symbol(a.clone()), Value::Symbol(b.clone())]);
        assert!(Params::parse(&proper).unwrap().accepts(2));
        let dotted = cons(Value::Symbol(a.clone()), Value::Symbol(b.clone()));
        let params = Params::parse(&dotted).unwrap();
        assert_eq!(params.arity(), Arity::AtLeast(1));
        assert_eq!(Params::parse(&Value::Symbol(b)).unwrap().arity(), Arity::AtLeast(0));
        let duplicate = list_from_vec(vec![Value::Symbol(a.clone()), Value::Symbol(a)]);
        assert!(Params::parse(&duplicate).is_none());
        assert!(Params::parse(&Value::int(3)).is_none());
    }
}

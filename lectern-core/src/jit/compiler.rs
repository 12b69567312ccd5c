//! Translation of Lambda bodies into nested Rust closures.
//!
//! `compile` produces code returning a value; `compile_tail` produces code
//! for tail position, where calls to Lambdas bounce through the trampoline
//! slot instead of recursing. Forms the compiler does not handle make the
//! whole Lambda fail to compile, and it stays interpreted.

use std::rc::Rc;

use crate::environment::Env;
use crate::error::Result;
use crate::expander::{self, Transformer};
use crate::interner::{Keywords, Symbol};
use crate::language::{
    Control, LambdaCell, NativeFn, Params, PrimitiveBody, Value, cons, eq,
};
use crate::runtime::Runtime;
use crate::syntax::{self, Special};

use super::analysis::{internal_defines, is_immediate_lambda};
use super::error::{CompileError, CompileResult};
use super::locals::{Locals, VarRef};
use super::{CompiledBody, Flow, TailCode, ValueCode};

// A macro that keeps expanding into another macro use past this is treated
// as non-terminating.
const MAX_EXPANSIONS: usize = 1000;

/// Compile the body of `lambda` against its defining environment.
pub(crate) fn compile_lambda(rt: &Runtime, lambda: &LambdaCell) -> CompileResult<CompiledBody> {
    let compiler = Compiler {
        keywords: rt.keywords(),
        home: &lambda.env,
    };
    compiler.procedure(&lambda.params, &lambda.body, None)
}

enum Form {
    Constant(Value),
    Reference(Symbol),
    Special(Special, Value),
    Call(Value, Vec<Value>),
}

struct Compiler<'a> {
    keywords: &'a Keywords,
    /// Environment the outermost compiled Lambda closes over; free names are
    /// resolved against it at compile time to spot macros and primitives.
    home: &'a Env,
}

fn constant(value: Value) -> ValueCode {
    Box::new(move |_, _| Ok(value.clone()))
}

fn eval_all(codes: &[ValueCode], rt: &Runtime, env: &Env) -> Result<Vec<Value>> {
    codes.iter().map(|code| code(rt, env)).collect()
}

fn as_tail(code: ValueCode) -> TailCode {
    Box::new(move |rt, env| code(rt, env).map(Flow::Value))
}

/// A frame for an immediately applied lambda.
fn bind_frame(params: &Params, layout: &Rc<Vec<Symbol>>, args: Vec<Value>, env: &Env) -> Result<Env> {
    let mut values = params.bind_values(args, || "lambda".to_string())?;
    values.resize(layout.len(), Value::Unassigned);
    Ok(env.extend_with_layout(layout.clone(), values, false))
}

impl<'a> Compiler<'a> {
    /// A procedure body in a fresh frame holding its parameters and
    /// internal definitions.
    fn procedure<'s>(
        &self,
        params: &Params,
        body: &Value,
        parent: Option<&'s Locals<'s>>,
    ) -> CompileResult<CompiledBody> {
        let scope = Locals::new(parent);
        for name in params.names() {
            scope.add(name);
        }
        for name in internal_defines(self.keywords, body) {
            scope.add(&name);
        }
        let code = self.compile_tail(body, &scope)?;
        Ok(CompiledBody {
            layout: scope.layout(),
            private: !scope.is_captured(),
            code,
        })
    }

    /// The compile-time binding of a name no compiled frame declares.
    fn static_value(&self, name: &Symbol, scope: &Locals) -> Option<Value> {
        match scope.resolve(name) {
            VarRef::Free(..) => self.home.lookup(name),
            _ => None,
        }
    }

    fn classify(&self, expr: &Value, scope: &Locals) -> CompileResult<Form> {
        for _ in 0..MAX_EXPANSIONS {
            let cell = match expr {
                Value::Symbol(name) => return Ok(Form::Reference(name.clone())),
                Value::Pair(cell) => cell,
                other => return Ok(Form::Constant(other.clone())),
            };
            let head = cell.car();
            if let Value::Symbol(name) = &head {
                if self.keywords.is_special(name) {
                    let special = syntax::parse(self.keywords, name, expr)
                        .map_err(|e| CompileError::syntax(e).with_expression(expr))?;
                    return Ok(Form::Special(special, expr.clone()));
                }
                if let Some(Value::Syntax(macro_value)) = self.static_value(name, scope) {
                    let Transformer::Rules(rules) = &macro_value.transformer else {
                        return Err(CompileError::unsupported("procedural macro").with_expression(expr));
                    };
                    let expansion = rules
                        .transcribe(expr)
                        .map_err(|e| CompileError::expansion(e).with_expression(expr))?;
                    expander::memoize(self.keywords, expr, &expansion);
                    continue;
                }
            }
            let args = cell.cdr().to_vec().ok_or_else(|| {
                CompileError::unsupported("improper argument list").with_expression(expr)
            })?;
            return Ok(Form::Call(head, args));
        }
        Err(CompileError::unsupported("macro expansion does not terminate").with_expression(expr))
    }

    fn compile(&self, expr: &Value, scope: &Locals) -> CompileResult<ValueCode> {
        match self.classify(expr, scope)? {
            Form::Constant(value) => Ok(constant(value)),
            Form::Reference(name) => self.reference(&name, scope),
            Form::Special(special, form) => self.special(special, &form, scope),
            Form::Call(head, args) => self.call(&head, &args, scope),
        }
    }

    fn compile_tail(&self, expr: &Value, scope: &Locals) -> CompileResult<TailCode> {
        match self.classify(expr, scope)? {
            Form::Special(
                Special::If {
                    test,
                    consequent,
                    alternative,
                },
                _,
            ) => {
                let test = self.compile(&test, scope)?;
                let consequent = self.compile_tail(&consequent, scope)?;
                let alternative = alternative
                    .map(|alt| self.compile_tail(&alt, scope))
                    .transpose()?;
                Ok(Box::new(move |rt, env| {
                    if test(rt, env)?.is_true() {
                        consequent(rt, env)
                    } else {
                        match &alternative {
                            Some(alternative) => alternative(rt, env),
                            None => Ok(Flow::Value(Value::Unspecified)),
                        }
                    }
                }))
            }
            Form::Special(Special::Begin(forms), _) => {
                let mut forms = forms.to_vec().unwrap_or_default();
                let Some(last) = forms.pop() else {
                    return Ok(as_tail(constant(Value::Unspecified)));
                };
                let init = forms
                    .iter()
                    .map(|form| self.compile(form, scope))
                    .collect::<CompileResult<Vec<_>>>()?;
                let last = self.compile_tail(&last, scope)?;
                Ok(Box::new(move |rt, env| {
                    for code in &init {
                        code(rt, env)?;
                    }
                    last(rt, env)
                }))
            }
            Form::Call(head, args) => self.tail_call(&head, &args, scope),
            Form::Constant(value) => Ok(as_tail(constant(value))),
            Form::Reference(name) => Ok(as_tail(self.reference(&name, scope)?)),
            Form::Special(special, form) => Ok(as_tail(self.special(special, &form, scope)?)),
        }
    }

    fn reference(&self, name: &Symbol, scope: &Locals) -> CompileResult<ValueCode> {
        if let VarRef::Free(..) = scope.resolve(name) {
            if *name == self.keywords.call_cc || *name == self.keywords.call_with_current_continuation {
                return Err(CompileError::unsupported(format!("reference to {name}")));
            }
            if let Some(Value::Primitive(prim)) = self.home.lookup(name) {
                if matches!(prim.body, PrimitiveBody::Control(Control::CallCc)) {
                    return Err(CompileError::unsupported(format!("reference to {name}")));
                }
            }
        }
        Ok(scope.reference(name))
    }

    // ========================================================================
    // Special forms
    // ========================================================================

    fn special(&self, special: Special, form: &Value, scope: &Locals) -> CompileResult<ValueCode> {
        match special {
            Special::Quote(datum) => Ok(constant(datum)),
            Special::Quasiquote(template) => {
                let expansion = expander::expand_quasiquote(self.keywords, &template)
                    .map_err(|e| CompileError::expansion(e).with_expression(form))?;
                expander::memoize(self.keywords, form, &expansion);
                self.compile(&expansion, scope)
            }
            Special::If {
                test,
                consequent,
                alternative,
            } => {
                let test = self.compile(&test, scope)?;
                let consequent = self.compile(&consequent, scope)?;
                let alternative = alternative
                    .map(|alt| self.compile(&alt, scope))
                    .transpose()?;
                Ok(Box::new(move |rt, env| {
                    if test(rt, env)?.is_true() {
                        consequent(rt, env)
                    } else {
                        match &alternative {
                            Some(alternative) => alternative(rt, env),
                            None => Ok(Value::Unspecified),
                        }
                    }
                }))
            }
            Special::Begin(forms) => {
                let codes = forms
                    .iter()
                    .map(|form| self.compile(&form, scope))
                    .collect::<CompileResult<Vec<_>>>()?;
                Ok(Box::new(move |rt, env| {
                    let mut result = Value::Unspecified;
                    for code in &codes {
                        result = code(rt, env)?;
                    }
                    Ok(result)
                }))
            }
            Special::Set { name, value } => {
                let value = self.compile(&value, scope)?;
                Ok(scope.set(&name, value))
            }
            Special::Define { name, value } => {
                let value = match value {
                    Some(value) => self.compile(&value, scope)?,
                    None => constant(Value::Unspecified),
                };
                self.define(&name, value, form, scope)
            }
            Special::Lambda {
                params,
                body,
                name: Some(name),
            } => {
                let value = self.lambda(params, body, Some(name.clone()), scope)?;
                self.define(&name, value, form, scope)
            }
            Special::Lambda {
                params,
                body,
                name: None,
            } => self.lambda(params, body, None, scope),
            Special::DefineSyntax { .. } | Special::SyntaxRules => {
                Err(CompileError::unsupported("local macro definition").with_expression(form))
            }
        }
    }

    /// Internal definitions were given slots up front; anything else is left
    /// to the interpreter.
    fn define(&self, name: &Symbol, value: ValueCode, form: &Value, scope: &Locals) -> CompileResult<ValueCode> {
        let Some(index) = scope.get(name) else {
            return Err(CompileError::unsupported("define outside a body").with_expression(form));
        };
        let name = name.clone();
        Ok(Box::new(move |rt, env| {
            let value = value(rt, env)?;
            if let Value::Lambda(lambda) = &value {
                lambda.set_name_if_anonymous(&name);
            }
            env.set_slot(index, value);
            Ok(Value::Unspecified)
        }))
    }

    fn lambda(
        &self,
        params: Params,
        body: Value,
        name: Option<Symbol>,
        scope: &Locals,
    ) -> CompileResult<ValueCode> {
        scope.capture();
        let template = Rc::new(self.procedure(&params, &body, Some(scope))?);
        Ok(Box::new(move |_, env| {
            let lambda = LambdaCell::with_compiled(
                params.clone(),
                body.clone(),
                env.clone(),
                template.clone(),
            );
            if let Some(name) = &name {
                lambda.set_name_if_anonymous(name);
            }
            Ok(Value::Lambda(Rc::new(lambda)))
        }))
    }

    // ========================================================================
    // Application
    // ========================================================================

    fn arguments(&self, args: &[Value], scope: &Locals) -> CompileResult<Vec<ValueCode>> {
        args.iter().map(|arg| self.compile(arg, scope)).collect()
    }

    fn call(&self, head: &Value, args: &[Value], scope: &Locals) -> CompileResult<ValueCode> {
        if let Some((params, body)) = self.immediate_lambda(head, args.len())? {
            let args = self.arguments(args, scope)?;
            let frame = Locals::new(Some(scope));
            for name in params.names() {
                frame.add(name);
            }
            for name in internal_defines(self.keywords, &body) {
                frame.add(&name);
            }
            let body = self.compile(&body, &frame)?;
            let layout = frame.layout();
            return Ok(Box::new(move |rt, env| {
                let values = eval_all(&args, rt, env)?;
                let frame = bind_frame(&params, &layout, values, env)?;
                body(rt, &frame)
            }));
        }
        if let Some(code) = self.inline(head, args, scope)? {
            return Ok(code);
        }
        let f = self.compile(head, scope)?;
        let args = self.arguments(args, scope)?;
        Ok(Box::new(move |rt, env| {
            let f = f(rt, env)?;
            let args = eval_all(&args, rt, env)?;
            rt.apply(&f, args)
        }))
    }

    fn tail_call(&self, head: &Value, args: &[Value], scope: &Locals) -> CompileResult<TailCode> {
        if let Some((params, body)) = self.immediate_lambda(head, args.len())? {
            let args = self.arguments(args, scope)?;
            let frame = Locals::new(Some(scope));
            for name in params.names() {
                frame.add(name);
            }
            for name in internal_defines(self.keywords, &body) {
                frame.add(&name);
            }
            let body = self.compile_tail(&body, &frame)?;
            let layout = frame.layout();
            return Ok(Box::new(move |rt, env| {
                let values = eval_all(&args, rt, env)?;
                let frame = bind_frame(&params, &layout, values, env)?;
                body(rt, &frame)
            }));
        }
        if let Some(code) = self.inline(head, args, scope)? {
            return Ok(as_tail(code));
        }
        let f = self.compile(head, scope)?;
        let args = self.arguments(args, scope)?;
        Ok(Box::new(move |rt, env| {
            let f = f(rt, env)?;
            let args = eval_all(&args, rt, env)?;
            let bounce = matches!(&f, Value::Lambda(lambda) if lambda.params.accepts(args.len()));
            if bounce {
                rt.set_bounce(f, args);
                Ok(Flow::Bounce)
            } else {
                rt.apply(&f, args).map(Flow::Value)
            }
        }))
    }

    /// Parameters and body of `((lambda formals body ...) arg ...)` when the
    /// argument count fits.
    fn immediate_lambda(&self, head: &Value, argc: usize) -> CompileResult<Option<(Params, Value)>> {
        if !is_immediate_lambda(self.keywords, head) {
            return Ok(None);
        }
        match syntax::parse(self.keywords, &self.keywords.lambda, head) {
            Ok(Special::Lambda { params, body, .. }) if params.accepts(argc) => Ok(Some((params, body))),
            Ok(_) => Ok(None),
            Err(err) => Err(CompileError::syntax(err).with_expression(head)),
        }
    }

    /// Open-coded primitive when `head` names a builtin that is still bound
    /// to itself.
    fn inline(&self, head: &Value, args: &[Value], scope: &Locals) -> CompileResult<Option<ValueCode>> {
        let Value::Symbol(name) = head else {
            return Ok(None);
        };
        let Some(op) = Inline::for_name(name.name()) else {
            return Ok(None);
        };
        let Some(Value::Primitive(prim)) = self.static_value(name, scope) else {
            return Ok(None);
        };
        let PrimitiveBody::Native(func) = prim.body else {
            return Ok(None);
        };
        if prim.name != name.name() || !prim.arity.accepts(args.len()) {
            return Ok(None);
        }
        let args = self.arguments(args, scope)?;
        Ok(Some(op.code(func, args)))
    }
}

// ============================================================================
// Inline primitives
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Inline {
    Car,
    Cdr,
    Cons,
    IsNull,
    IsPair,
    Not,
    IsEq,
    IsZero,
    Add,
    Sub,
    Mul,
    NumEq,
    Lt,
    Gt,
    Le,
    Ge,
}

impl Inline {
    fn for_name(name: &str) -> Option<Inline> {
        Some(match name {
            "car" => Inline::Car,
            "cdr" => Inline::Cdr,
            "cons" => Inline::Cons,
            "null?" => Inline::IsNull,
            "pair?" => Inline::IsPair,
            "not" => Inline::Not,
            "eq?" => Inline::IsEq,
            "zero?" => Inline::IsZero,
            "+" => Inline::Add,
            "-" => Inline::Sub,
            "*" => Inline::Mul,
            "=" => Inline::NumEq,
            "<" => Inline::Lt,
            ">" => Inline::Gt,
            "<=" => Inline::Le,
            ">=" => Inline::Ge,
            _ => return None,
        })
    }

    /// Fast paths for the common shapes; anything else goes straight to the
    /// primitive, which also reports type errors.
    fn code(self, func: NativeFn, mut args: Vec<ValueCode>) -> ValueCode {
        match args.len() {
            1 if matches!(
                self,
                Inline::Car | Inline::Cdr | Inline::IsNull | Inline::IsPair | Inline::Not | Inline::IsZero
            ) =>
            {
                let Some(arg) = args.pop() else {
                    return Box::new(move |rt, _| func(&[], rt));
                };
                Box::new(move |rt, env| {
                    let value = arg(rt, env)?;
                    match (self, &value) {
                        (Inline::Car, Value::Pair(cell)) => Ok(cell.car()),
                        (Inline::Cdr, Value::Pair(cell)) => Ok(cell.cdr()),
                        (Inline::IsNull, v) => Ok(Value::Bool(v.is_null())),
                        (Inline::IsPair, v) => Ok(Value::Bool(matches!(v, Value::Pair(_)))),
                        (Inline::Not, v) => Ok(Value::Bool(!v.is_true())),
                        (Inline::IsZero, Value::Number(n)) => Ok(Value::Bool(n.is_zero())),
                        _ => func(std::slice::from_ref(&value), rt),
                    }
                })
            }
            2 if !matches!(
                self,
                Inline::Car | Inline::Cdr | Inline::IsNull | Inline::IsPair | Inline::Not | Inline::IsZero
            ) =>
            {
                let (Some(second), Some(first)) = (args.pop(), args.pop()) else {
                    return Box::new(move |rt, _| func(&[], rt));
                };
                Box::new(move |rt, env| {
                    let a = first(rt, env)?;
                    let b = second(rt, env)?;
                    if let (Value::Number(x), Value::Number(y)) = (&a, &b) {
                        let (x, y) = (*x, *y);
                        match self {
                            Inline::Add => return Ok(Value::Number(x.add(y))),
                            Inline::Sub => return Ok(Value::Number(x.sub(y))),
                            Inline::Mul => return Ok(Value::Number(x.mul(y))),
                            Inline::NumEq => return Ok(Value::Bool(x == y)),
                            Inline::Lt => return Ok(Value::Bool(x < y)),
                            Inline::Gt => return Ok(Value::Bool(x > y)),
                            Inline::Le => return Ok(Value::Bool(x <= y)),
                            Inline::Ge => return Ok(Value::Bool(x >= y)),
                            _ => {}
                        }
                    }
                    match self {
                        Inline::Cons => Ok(cons(a, b)),
                        Inline::IsEq => Ok(Value::Bool(eq(&a, &b))),
                        _ => func(&[a, b], rt),
                    }
                })
            }
            _ => Box::new(move |rt, env| func(&eval_all(&args, rt, env)?, rt)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inline_table() {
        assert_eq!(Inline::for_name("car"), Some(Inline::Car));
        assert_eq!(Inline::for_name("<="), Some(Inline::Le));
        assert_eq!(Inline::for_name("vector-ref"), None);
    }
}

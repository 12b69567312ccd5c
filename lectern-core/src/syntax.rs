//! Shape checking for special forms, shared by the interpreter and the
//! closure compiler so both accept exactly the same programs.

use crate::error::{Error, Result};
use crate::interner::{Keywords, Symbol};
use crate::language::{Params, Value, cons};

pub(crate) enum Special {
    Quote(Value),
    Quasiquote(Value),
    If {
        test: Value,
        consequent: Value,
        alternative: Option<Value>,
    },
    /// The (possibly empty) list of forms.
    Begin(Value),
    Set {
        name: Symbol,
        value: Value,
    },
    Define {
        name: Symbol,
        value: Option<Value>,
    },
    Lambda {
        params: Params,
        body: Value,
        name: Option<Symbol>,
    },
    DefineSyntax {
        name: Symbol,
        value: Value,
    },
    SyntaxRules,
}

fn operands(form: &Value) -> Result<Vec<Value>> {
    form.cdr()
        .and_then(|rest| rest.to_vec())
        .ok_or_else(|| Error::bad_syntax(form, "improper form"))
}

fn symbol(form: &Value, value: &Value) -> Result<Symbol> {
    value
        .as_symbol()
        .cloned()
        .ok_or_else(|| Error::bad_syntax(form, "expected an identifier"))
}

/// A lambda body as one expression: a lone form, or `(begin form ...)`.
pub(crate) fn body_expression(keywords: &Keywords, form: &Value, body: Value) -> Result<Value> {
    match &body {
        Value::Pair(cell) if cell.cdr().is_null() => Ok(cell.car()),
        Value::Pair(_) => Ok(cons(Value::Symbol(keywords.begin.clone()), body)),
        _ => Err(Error::bad_syntax(form, "empty body")),
    }
}

fn lambda(keywords: &Keywords, form: &Value, formals: &Value, body: Value) -> Result<(Params, Value)> {
    let params = Params::parse(formals).ok_or_else(|| Error::bad_syntax(form, "bad parameter list"))?;
    let body = body_expression(keywords, form, body)?;
    Ok((params, body))
}

/// Parse `form`, whose head is the special keyword `head`.
pub(crate) fn parse(keywords: &Keywords, head: &Symbol, form: &Value) -> Result<Special> {
    if *head == keywords.syntax_rules {
        return Ok(Special::SyntaxRules);
    }
    let args = operands(form)?;
    if *head == keywords.quote || *head == keywords.quasiquote {
        let [datum] = args.as_slice() else {
            return Err(Error::bad_syntax(form, "expected one datum"));
        };
        return Ok(if *head == keywords.quote {
            Special::Quote(datum.clone())
        } else {
            Special::Quasiquote(datum.clone())
        });
    }
    if *head == keywords.if_ {
        return match args.as_slice() {
            [test, consequent] => Ok(Special::If {
                test: test.clone(),
                consequent: consequent.clone(),
                alternative: None,
            }),
            [test, consequent, alternative] => Ok(Special::If {
                test: test.clone(),
                consequent: consequent.clone(),
                alternative: Some(alternative.clone()),
            }),
            _ => Err(Error::bad_syntax(form, "expected (if test then [else])")),
        };
    }
    if *head == keywords.begin {
        return Ok(Special::Begin(form.cdr().unwrap_or_default()));
    }
    if *head == keywords.set {
        let [name, value] = args.as_slice() else {
            return Err(Error::bad_syntax(form, "expected (set! name value)"));
        };
        return Ok(Special::Set {
            name: symbol(form, name)?,
            value: value.clone(),
        });
    }
    if *head == keywords.lambda {
        let rest = form.cdr().unwrap_or_default();
        let formals = rest.car().ok_or_else(|| Error::bad_syntax(form, "missing parameters"))?;
        let (params, body) = lambda(keywords, form, &formals, rest.cdr().unwrap_or_default())?;
        return Ok(Special::Lambda {
            params,
            body,
            name: None,
        });
    }
    if *head == keywords.define {
        return match args.first() {
            Some(Value::Symbol(name)) => match &args[1..] {
                [] => Ok(Special::Define {
                    name: name.clone(),
                    value: None,
                }),
                [value] => Ok(Special::Define {
                    name: name.clone(),
                    value: Some(value.clone()),
                }),
                _ => Err(Error::bad_syntax(form, "expected (define name value)")),
            },
            // (define (name . formals) body ...)
            Some(Value::Pair(signature)) => {
                let name = symbol(form, &signature.car())?;
                let body = form.cdr().and_then(|rest| rest.cdr()).unwrap_or_default();
                let (params, body) = lambda(keywords, form, &signature.cdr(), body)?;
                Ok(Special::Lambda {
                    params,
                    body,
                    name: Some(name),
                })
            }
            _ => Err(Error::bad_syntax(form, "expected a name to define")),
        };
    }
    if *head == keywords.define_syntax {
        let [name, value] = args.as_slice() else {
            return Err(Error::bad_syntax(form, "expected (define-syntax name transformer)"));
        };
        return Ok(Special::DefineSyntax {
            name: symbol(form, name)?,
            value: value.clone(),
        });
    }
    Err(Error::bad_syntax(form, "unknown special form"))
}

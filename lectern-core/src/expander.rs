//! `syntax-rules` macros and quasiquote expansion.
//!
//! Matching is purely structural. Identifiers introduced by a template are
//! inserted as-is, so they can capture (or be captured by) identifiers of the
//! same name at the use site.

use std::rc::Rc;

use crate::error::{Error, Result};
use crate::interner::{Keywords, Symbol};
use crate::language::{Value, cons, copy_tree, equal, list_from_vec, list_with_tail};
use crate::runtime::Runtime;

// ============================================================================
// Macro values
// ============================================================================

pub enum Transformer {
    Rules(SyntaxRules),
    /// A procedure receiving the whole form and returning its expansion.
    Procedure(Value),
}

/// The value bound to a macro keyword.
pub struct SyntaxCell {
    pub transformer: Transformer,
}

impl SyntaxCell {
    pub fn rules(rules: SyntaxRules) -> Self {
        SyntaxCell {
            transformer: Transformer::Rules(rules),
        }
    }

    pub fn procedure(proc: Value) -> Self {
        SyntaxCell {
            transformer: Transformer::Procedure(proc),
        }
    }
}

pub struct SyntaxRules {
    ellipsis: Symbol,
    underscore: Symbol,
    literals: Vec<Symbol>,
    rules: Vec<(Value, Value)>,
}

#[derive(Clone, Debug)]
enum Binding {
    One(Value),
    Many(Vec<Binding>),
}

type Bindings = Vec<(Symbol, Binding)>;

fn lookup<'b>(bindings: &'b Bindings, name: &Symbol) -> Option<&'b Binding> {
    bindings.iter().rev().find(|(n, _)| n == name).map(|(_, b)| b)
}

impl SyntaxRules {
    /// Parse `(syntax-rules [ellipsis] (literal ...) (pattern template) ...)`.
    pub fn parse(form: &Value, keywords: &Keywords) -> Result<Self> {
        let parts = form
            .to_vec()
            .ok_or_else(|| Error::bad_syntax(form, "improper syntax-rules form"))?;
        let mut rest = parts.get(1..).unwrap_or_default();
        let mut ellipsis = keywords.ellipsis.clone();
        if let Some(Value::Symbol(custom)) = rest.first() {
            ellipsis = custom.clone();
            rest = &rest[1..];
        }
        let (literal_list, rules) = rest
            .split_first()
            .ok_or_else(|| Error::bad_syntax(form, "missing literal list"))?;
        let literals = literal_list
            .to_vec()
            .ok_or_else(|| Error::bad_syntax(form, "literals must be a list"))?
            .into_iter()
            .map(|lit| match lit {
                Value::Symbol(s) => Ok(s),
                other => Err(Error::bad_syntax(&other, "literal must be a symbol")),
            })
            .collect::<Result<Vec<_>>>()?;
        let rules = rules
            .iter()
            .map(|rule| match rule.to_vec().as_deref() {
                Some([pattern, template]) if matches!(pattern, Value::Pair(_)) => {
                    Ok((pattern.clone(), template.clone()))
                }
                _ => Err(Error::bad_syntax(rule, "rule must be (pattern template)")),
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(SyntaxRules {
            ellipsis,
            underscore: keywords.underscore.clone(),
            literals,
            rules,
        })
    }

    /// Rewrite `form` with the first rule whose pattern matches.
    pub fn transcribe(&self, form: &Value) -> Result<Value> {
        let input = form.cdr().unwrap_or_default();
        for (pattern, template) in &self.rules {
            let mut bindings = Bindings::new();
            // The keyword position of the pattern is ignored.
            let pattern_tail = pattern.cdr().unwrap_or_default();
            if self.match_pattern(&pattern_tail, &input, &mut bindings) {
                return self.generate(template, &bindings);
            }
        }
        Err(Error::bad_syntax(form, "no matching syntax rule"))
    }

    fn is_ellipsis(&self, value: &Value) -> bool {
        matches!(value, Value::Symbol(s) if *s == self.ellipsis)
    }

    fn match_pattern(&self, pattern: &Value, input: &Value, bindings: &mut Bindings) -> bool {
        match pattern {
            Value::Symbol(s) if *s == self.underscore => true,
            Value::Symbol(s) if self.literals.contains(s) => {
                matches!(input, Value::Symbol(i) if i == s)
            }
            Value::Symbol(s) => {
                bindings.push((s.clone(), Binding::One(input.clone())));
                true
            }
            Value::Pair(cell) => {
                let rest = cell.cdr();
                if rest.car().is_some_and(|next| self.is_ellipsis(&next)) {
                    let after = rest.cdr().unwrap_or_default();
                    return self.match_repetition(&cell.car(), &after, input, bindings);
                }
                match input {
                    Value::Pair(input_cell) => {
                        self.match_pattern(&cell.car(), &input_cell.car(), bindings)
                            && self.match_pattern(&rest, &input_cell.cdr(), bindings)
                    }
                    _ => false,
                }
            }
            Value::Nil => input.is_null(),
            Value::Vector(items) => match input {
                Value::Vector(input_items) => {
                    let pattern = list_from_vec(items.borrow().clone());
                    let input = list_from_vec(input_items.borrow().clone());
                    self.match_pattern(&pattern, &input, bindings)
                }
                _ => false,
            },
            datum => equal(datum, input),
        }
    }

    /// `sub ... after` against `input`: the repetition takes every element
    /// except the ones `after` needs.
    fn match_repetition(
        &self,
        sub: &Value,
        after: &Value,
        input: &Value,
        bindings: &mut Bindings,
    ) -> bool {
        let needed = after.iter().count();
        let available = input.iter().count();
        if available < needed {
            return false;
        }
        let mut remaining = input.clone();
        let mut matches = Vec::new();
        for _ in 0..available - needed {
            let Value::Pair(cell) = remaining else {
                return false;
            };
            let mut item = Bindings::new();
            if !self.match_pattern(sub, &cell.car(), &mut item) {
                return false;
            }
            matches.push(item);
            remaining = cell.cdr();
        }
        for var in self.pattern_vars(sub) {
            let column = matches
                .iter()
                .map(|m| lookup(m, &var).cloned().unwrap_or(Binding::Many(Vec::new())))
                .collect();
            bindings.push((var, Binding::Many(column)));
        }
        self.match_pattern(after, &remaining, bindings)
    }

    fn pattern_vars(&self, pattern: &Value) -> Vec<Symbol> {
        let mut vars = Vec::new();
        self.collect_vars(pattern, &mut vars);
        vars
    }

    fn collect_vars(&self, pattern: &Value, vars: &mut Vec<Symbol>) {
        match pattern {
            Value::Symbol(s) => {
                if *s != self.ellipsis && *s != self.underscore && !self.literals.contains(s) {
                    vars.push(s.clone());
                }
            }
            Value::Pair(cell) => {
                self.collect_vars(&cell.car(), vars);
                self.collect_vars(&cell.cdr(), vars);
            }
            Value::Vector(items) => {
                for item in items.borrow().iter() {
                    self.collect_vars(item, vars);
                }
            }
            _ => {}
        }
    }

    fn generate(&self, template: &Value, bindings: &Bindings) -> Result<Value> {
        match template {
            Value::Symbol(s) => match lookup(bindings, s) {
                Some(Binding::One(value)) => Ok(value.clone()),
                Some(Binding::Many(_)) => Err(Error::bad_syntax(
                    template,
                    "pattern variable used without ellipsis",
                )),
                None => Ok(template.clone()),
            },
            Value::Pair(cell) => {
                let head = cell.car();
                let rest = cell.cdr();
                // (... template) inserts template with ellipses taken literally.
                if self.is_ellipsis(&head) {
                    return match rest.car() {
                        Some(escaped) => Ok(self.generate_literal(&escaped, bindings)),
                        None => Ok(template.clone()),
                    };
                }
                if let Some(next) = rest.car() {
                    if self.is_ellipsis(&next) {
                        if let Some(items) = self.generate_repetition(&head, bindings)? {
                            let mut tail = rest.cdr().unwrap_or_default();
                            let mut items = items;
                            // `x ... ...` flattens one level per extra ellipsis.
                            while tail.car().is_some_and(|t| self.is_ellipsis(&t)) {
                                items = items
                                    .into_iter()
                                    .flat_map(|item| item.to_vec().unwrap_or_default())
                                    .collect();
                                tail = tail.cdr().unwrap_or_default();
                            }
                            let tail = self.generate(&tail, bindings)?;
                            return Ok(list_with_tail(items, tail));
                        }
                    }
                }
                Ok(cons(
                    self.generate(&head, bindings)?,
                    self.generate(&rest, bindings)?,
                ))
            }
            Value::Vector(items) => {
                let list = list_from_vec(items.borrow().clone());
                let generated = self.generate(&list, bindings)?;
                Ok(Value::vector(generated.to_vec().unwrap_or_default()))
            }
            other => Ok(other.clone()),
        }
    }

    /// Instances of `sub` for each repetition of its sequence variables, or
    /// `None` when `sub` has none (the ellipsis is then literal output, as in
    /// a template that defines another macro).
    fn generate_repetition(&self, sub: &Value, bindings: &Bindings) -> Result<Option<Vec<Value>>> {
        let vars: Vec<(Symbol, Vec<Binding>)> = self
            .pattern_vars(sub)
            .into_iter()
            .filter_map(|var| match lookup(bindings, &var) {
                Some(Binding::Many(items)) => Some((var, items.clone())),
                _ => None,
            })
            .collect();
        let Some(count) = vars.iter().map(|(_, items)| items.len()).min() else {
            return Ok(None);
        };
        if vars.iter().any(|(_, items)| items.len() != count) {
            return Err(Error::bad_syntax(sub, "mismatched ellipsis lengths"));
        }
        let mut output = Vec::with_capacity(count);
        for i in 0..count {
            let mut scoped = bindings.clone();
            for (var, items) in &vars {
                scoped.push((var.clone(), items[i].clone()));
            }
            output.push(self.generate(sub, &scoped)?);
        }
        Ok(Some(output))
    }

    fn generate_literal(&self, template: &Value, bindings: &Bindings) -> Value {
        match template {
            Value::Symbol(s) => match lookup(bindings, s) {
                Some(Binding::One(value)) => value.clone(),
                _ => template.clone(),
            },
            Value::Pair(cell) => cons(
                self.generate_literal(&cell.car(), bindings),
                self.generate_literal(&cell.cdr(), bindings),
            ),
            other => other.clone(),
        }
    }
}

// ============================================================================
// Expansion
// ============================================================================

/// One expansion step of `form` by `syntax`.
pub fn expand(rt: &Runtime, syntax: &SyntaxCell, form: &Value) -> Result<Value> {
    match &syntax.transformer {
        Transformer::Rules(rules) => rules.transcribe(form),
        Transformer::Procedure(proc) => rt
            .apply(proc, vec![form.clone()])
            .map(|expansion| copy_tree(&expansion)),
    }
}

/// Overwrite the macro use `form` with its expansion so later evaluations
/// of the same source skip the expander.
pub fn memoize(keywords: &Keywords, form: &Value, expansion: &Value) {
    let Value::Pair(cell) = form else {
        return;
    };
    match expansion {
        Value::Pair(expanded) => {
            cell.set_car(expanded.car());
            cell.set_cdr(expanded.cdr());
        }
        other => {
            cell.set_car(Value::Symbol(keywords.begin.clone()));
            cell.set_cdr(list_from_vec(vec![other.clone()]));
        }
    }
}

/// The macro bound to the head of `form` in `lookup`'s scope, if any.
pub fn macro_for(form: &Value, lookup: impl Fn(&Symbol) -> Option<Value>) -> Option<Rc<SyntaxCell>> {
    let head = form.car()?;
    match lookup(head.as_symbol()?)? {
        Value::Syntax(syntax) => Some(syntax),
        _ => None,
    }
}

// ============================================================================
// Quasiquote
// ============================================================================

fn quoted(keywords: &Keywords, datum: Value) -> Value {
    list_from_vec(vec![Value::Symbol(keywords.quote.clone()), datum])
}

fn call(head: &Symbol, args: Vec<Value>) -> Value {
    cons(Value::Symbol(head.clone()), list_from_vec(args))
}

fn tagged(form: &Value, tag: &Symbol) -> Option<Value> {
    let cell = form.as_pair()?;
    match cell.car() {
        Value::Symbol(s) if s == *tag => cell.cdr().car(),
        _ => None,
    }
}

fn contains_unquote(keywords: &Keywords, template: &Value) -> bool {
    match template {
        Value::Pair(cell) => {
            matches!(cell.car(), Value::Symbol(ref s) if *s == keywords.unquote || *s == keywords.unquote_splicing)
                || contains_unquote(keywords, &cell.car())
                || contains_unquote(keywords, &cell.cdr())
        }
        Value::Vector(items) => items.borrow().iter().any(|v| contains_unquote(keywords, v)),
        _ => false,
    }
}

/// Rewrite the body of `(quasiquote template)` into list construction calls.
pub fn expand_quasiquote(keywords: &Keywords, template: &Value) -> Result<Value> {
    quasi(keywords, template, 1)
}

fn quasi(keywords: &Keywords, template: &Value, depth: usize) -> Result<Value> {
    if !contains_unquote(keywords, template) {
        return Ok(match template {
            Value::Symbol(_) | Value::Pair(_) | Value::Nil | Value::Vector(_) => {
                quoted(keywords, template.clone())
            }
            other => other.clone(),
        });
    }
    match template {
        Value::Vector(items) => {
            let list = list_from_vec(items.borrow().clone());
            Ok(call(&keywords.list_to_vector, vec![quasi(keywords, &list, depth)?]))
        }
        Value::Pair(cell) => {
            if let Some(inner) = tagged(template, &keywords.unquote) {
                if depth == 1 {
                    return Ok(inner);
                }
                return Ok(call(
                    &keywords.cons,
                    vec![
                        quoted(keywords, Value::Symbol(keywords.unquote.clone())),
                        call(&keywords.cons, vec![quasi(keywords, &inner, depth - 1)?, quoted(keywords, Value::Nil)]),
                    ],
                ));
            }
            if let Some(inner) = tagged(template, &keywords.quasiquote) {
                return Ok(call(
                    &keywords.cons,
                    vec![
                        quoted(keywords, Value::Symbol(keywords.quasiquote.clone())),
                        call(&keywords.cons, vec![quasi(keywords, &inner, depth + 1)?, quoted(keywords, Value::Nil)]),
                    ],
                ));
            }
            let head = cell.car();
            let rest = quasi(keywords, &cell.cdr(), depth)?;
            if let Some(spliced) = tagged(&head, &keywords.unquote_splicing) {
                if depth == 1 {
                    return Ok(call(&keywords.append, vec![spliced, rest]));
                }
                let inner = call(
                    &keywords.cons,
                    vec![
                        quoted(keywords, Value::Symbol(keywords.unquote_splicing.clone())),
                        call(&keywords.cons, vec![quasi(keywords, &spliced, depth - 1)?, quoted(keywords, Value::Nil)]),
                    ],
                );
                return Ok(call(&keywords.cons, vec![inner, rest]));
            }
            Ok(call(&keywords.cons, vec![quasi(keywords, &head, depth)?, rest]))
        }
        other => Ok(other.clone()),
    }
}

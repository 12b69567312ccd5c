//! Static analysis used before compiling a body.

use crate::interner::{Keywords, Symbol};
use crate::language::Value;

fn head_is(form: &Value, keyword: &Symbol) -> bool {
    matches!(form.car(), Some(Value::Symbol(ref s)) if s == keyword)
}

/// Names introduced by `define` at the top of a body, looking through
/// `begin`. These get slots in the body's frame before any code runs.
pub(crate) fn internal_defines(keywords: &Keywords, body: &Value) -> Vec<Symbol> {
    let mut names = Vec::new();
    scan(keywords, body, &mut names);
    names
}

fn scan(keywords: &Keywords, form: &Value, names: &mut Vec<Symbol>) {
    if head_is(form, &keywords.begin) {
        for inner in form.cdr().unwrap_or_default().iter() {
            scan(keywords, &inner, names);
        }
    } else if head_is(form, &keywords.define) {
        let target = form.cdr().and_then(|rest| rest.car());
        let name = match target {
            Some(Value::Symbol(name)) => Some(name),
            // (define (name . formals) ...)
            Some(Value::Pair(signature)) => signature.car().as_symbol().cloned(),
            _ => None,
        };
        if let Some(name) = name {
            if !names.contains(&name) {
                names.push(name);
            }
        }
    }
}

/// `((lambda formals body ...) arg ...)`: an application that can run in a
/// fresh frame without allocating a closure.
pub(crate) fn is_immediate_lambda(keywords: &Keywords, head: &Value) -> bool {
    head_is(head, &keywords.lambda)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interner::SymbolTable;
    use crate::parser::read_all;

    fn names_of(src: &str) -> Vec<String> {
        let mut table = SymbolTable::new();
        let keywords = Keywords::new(&mut table);
        let body = read_all(src, &mut table, &keywords).remove(0);
        internal_defines(&keywords, &body)
            .into_iter()
            .map(|s| s.name().to_string())
            .collect()
    }

    #[test]
    fn test_finds_defines_through_begin() {
        assert_eq!(
            names_of("(begin (define a 1) (begin (define (f x) x)) (g a))"),
            vec!["a", "f"]
        );
    }

    #[test]
    fn test_ignores_nested_bodies() {
        assert!(names_of("(begin (lambda () (define hidden 1)) 2)").is_empty());
        assert!(names_of("(if x (define y 1) 2)").is_empty());
    }

    #[test]
    fn test_single_define_body() {
        assert_eq!(names_of("(define x 1)"), vec!["x"]);
    }
}

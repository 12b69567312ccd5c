//! External representations of values.
//!
//! `Display` on [`Value`] produces the `write` form: strings are quoted and
//! escaped, characters use `#\` syntax. [`display_string`] produces the
//! `display` form used by the `display` primitive.

use std::fmt;

use crate::language::Value;

fn char_name(c: char) -> Option<&'static str> {
    match c {
        ' ' => Some("space"),
        '\n' => Some("newline"),
        '\t' => Some("tab"),
        '\r' => Some("return"),
        '\0' => Some("nul"),
        '\u{7}' => Some("alarm"),
        '\u{8}' => Some("backspace"),
        '\u{7f}' => Some("delete"),
        '\u{1b}' => Some("escape"),
        _ => None,
    }
}

fn write_escaped(f: &mut fmt::Formatter<'_>, s: &str) -> fmt::Result {
    f.write_str("\"")?;
    for c in s.chars() {
        match c {
            '"' => f.write_str("\\\"")?,
            '\\' => f.write_str("\\\\")?,
            '\n' => f.write_str("\\n")?,
            '\t' => f.write_str("\\t")?,
            '\r' => f.write_str("\\r")?,
            c => write!(f, "{c}")?,
        }
    }
    f.write_str("\"")
}

fn write_value(f: &mut fmt::Formatter<'_>, value: &Value, readable: bool) -> fmt::Result {
    match value {
        Value::Nil => f.write_str("()"),
        Value::Unspecified => f.write_str("#<unspecified>"),
        Value::Unassigned => f.write_str("#<unassigned>"),
        Value::Bool(true) => f.write_str("#t"),
        Value::Bool(false) => f.write_str("#f"),
        Value::Number(n) => write!(f, "{n}"),
        Value::Char(c) if readable => match char_name(*c) {
            Some(name) => write!(f, "#\\{name}"),
            None => write!(f, "#\\{c}"),
        },
        Value::Char(c) => write!(f, "{c}"),
        Value::Str(s) if readable => write_escaped(f, s),
        Value::Str(s) => f.write_str(s),
        Value::Symbol(s) => f.write_str(s.name()),
        Value::Pair(_) => {
            f.write_str("(")?;
            let mut current = value.clone();
            let mut first = true;
            loop {
                match current {
                    Value::Pair(cell) => {
                        if !first {
                            f.write_str(" ")?;
                        }
                        first = false;
                        write_value(f, &cell.car(), readable)?;
                        current = cell.cdr();
                    }
                    Value::Nil => break,
                    tail => {
                        f.write_str(" . ")?;
                        write_value(f, &tail, readable)?;
                        break;
                    }
                }
            }
            f.write_str(")")
        }
        Value::Vector(items) => {
            f.write_str("#(")?;
            for (i, item) in items.borrow().iter().enumerate() {
                if i > 0 {
                    f.write_str(" ")?;
                }
                write_value(f, item, readable)?;
            }
            f.write_str(")")
        }
        Value::Lambda(lambda) => match lambda.name() {
            Some(name) => write!(f, "#<procedure {name}>"),
            None => f.write_str("#<procedure>"),
        },
        Value::Primitive(prim) => write!(f, "#<primitive {}>", prim.name),
        Value::Continuation(_) => f.write_str("#<continuation>"),
        Value::Syntax(_) => f.write_str("#<syntax>"),
        Value::Values(vals) => {
            for (i, v) in vals.iter().enumerate() {
                if i > 0 {
                    f.write_str(" ")?;
                }
                write_value(f, v, readable)?;
            }
            Ok(())
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_value(f, self, true)
    }
}

struct Displayed<'a>(&'a Value);

impl fmt::Display for Displayed<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_value(f, self.0, false)
    }
}

/// The `display` representation: strings and characters appear raw.
pub fn display_string(value: &Value) -> String {
    Displayed(value).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::{cons, list_from_vec};
    use crate::numeric::Number;

    #[test]
    fn test_atoms() {
        assert_eq!(Value::Bool(true).to_string(), "#t");
        assert_eq!(Value::Nil.to_string(), "()");
        assert_eq!(Value::Number(Number::Float(3.0)).to_string(), "3.0");
        assert_eq!(Value::Char(' ').to_string(), "#\\space");
        assert_eq!(Value::Char('a').to_string(), "#\\a");
    }

    #[test]
    fn test_strings_write_vs_display() {
        let s = Value::string("say \"hi\"\n");
        assert_eq!(s.to_string(), "\"say \\\"hi\\\"\\n\"");
        assert_eq!(display_string(&s), "say \"hi\"\n");
    }

    #[test]
    fn test_lists() {
        let list = list_from_vec(vec![Value::int(1), Value::string("a"), Value::Nil]);
        assert_eq!(list.to_string(), "(1 \"a\" ())");
        assert_eq!(display_string(&list), "(1 a ())");
        assert_eq!(cons(Value::int(1), Value::int(2)).to_string(), "(1 . 2)");
    }

    #[test]
    fn test_vectors_and_values() {
        let v = Value::vector(vec![Value::int(1), Value::Char('x')]);
        assert_eq!(v.to_string(), "#(1 #\\x)");
        let vals = Value::Values(vec![Value::int(1), Value::int(2)].into());
        assert_eq!(vals.to_string(), "1 2");
    }
}

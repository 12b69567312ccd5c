//! Standard library native functions
//!
//! Primitives bound into the top-level environment at start-up. Derived
//! procedures that are easier to write in Scheme live in the bootstrap
//! library instead.

use std::cmp::Ordering;
use std::rc::Rc;

use crate::error::{Error, Result};
use crate::expander;
use crate::host::Task;
use crate::language::{
    Arity, ConsCell, Control, Value, cons, eq, equal, eqv, list_from_vec, list_with_tail,
};
use crate::lexer::parse_number;
use crate::native::{
    checked_index, expect_char, expect_index, expect_integer, expect_list, expect_number,
    expect_procedure, expect_string, expect_symbol, expect_vector,
};
use crate::numeric::{IntegerOp, Number};
use crate::printer::display_string;
use crate::runtime::Runtime;

// ============================================================================
// Pairs and Lists
// ============================================================================

fn cons_fn(args: &[Value], _rt: &Runtime) -> Result<Value> {
    Ok(cons(args[0].clone(), args[1].clone()))
}

fn pair_of<'v>(name: &str, value: &'v Value) -> Result<&'v Rc<ConsCell>> {
    value
        .as_pair()
        .ok_or_else(|| Error::wrong_type(name, "pair", value))
}

fn car(args: &[Value], _rt: &Runtime) -> Result<Value> {
    Ok(pair_of("car", &args[0])?.car())
}

fn cdr(args: &[Value], _rt: &Runtime) -> Result<Value> {
    Ok(pair_of("cdr", &args[0])?.cdr())
}

fn set_car(args: &[Value], _rt: &Runtime) -> Result<Value> {
    pair_of("set-car!", &args[0])?.set_car(args[1].clone());
    Ok(Value::Unspecified)
}

fn set_cdr(args: &[Value], _rt: &Runtime) -> Result<Value> {
    pair_of("set-cdr!", &args[0])?.set_cdr(args[1].clone());
    Ok(Value::Unspecified)
}

/// Follow a `c[ad]+r` path, applied right to left.
fn cxr(name: &str, path: &str, value: &Value) -> Result<Value> {
    let mut current = value.clone();
    for step in path.chars().rev() {
        let cell = pair_of(name, &current)?.clone();
        current = if step == 'a' { cell.car() } else { cell.cdr() };
    }
    Ok(current)
}

macro_rules! cxr_fns {
    ($(($func:ident, $name:literal, $path:literal)),* $(,)?) => {
        $(
            fn $func(args: &[Value], _rt: &Runtime) -> Result<Value> {
                cxr($name, $path, &args[0])
            }
        )*

        fn register_cxrs(rt: &Runtime) {
            $(rt.register_native($name, Arity::Exactly(1), $func);)*
        }
    };
}

cxr_fns![
    (caar, "caar", "aa"),
    (cadr, "cadr", "ad"),
    (cdar, "cdar", "da"),
    (cddr, "cddr", "dd"),
    (caaar, "caaar", "aaa"),
    (caadr, "caadr", "aad"),
    (cadar, "cadar", "ada"),
    (caddr, "caddr", "add"),
    (cdaar, "cdaar", "daa"),
    (cdadr, "cdadr", "dad"),
    (cddar, "cddar", "dda"),
    (cdddr, "cdddr", "ddd"),
];

fn list(args: &[Value], _rt: &Runtime) -> Result<Value> {
    Ok(list_from_vec(args.to_vec()))
}

/// Proper-list test that terminates on circular lists.
fn is_list(args: &[Value], _rt: &Runtime) -> Result<Value> {
    let mut slow = args[0].clone();
    let mut fast = args[0].clone();
    loop {
        for _ in 0..2 {
            fast = match fast {
                Value::Nil => return Ok(Value::Bool(true)),
                Value::Pair(cell) => cell.cdr(),
                _ => return Ok(Value::Bool(false)),
            };
        }
        slow = slow.cdr().unwrap_or_default();
        if let (Value::Pair(a), Value::Pair(b)) = (&slow, &fast) {
            if Rc::ptr_eq(a, b) {
                return Ok(Value::Bool(false));
            }
        }
    }
}

fn is_pair(args: &[Value], _rt: &Runtime) -> Result<Value> {
    Ok(Value::Bool(matches!(args[0], Value::Pair(_))))
}

fn is_null(args: &[Value], _rt: &Runtime) -> Result<Value> {
    Ok(Value::Bool(args[0].is_null()))
}

fn length(args: &[Value], _rt: &Runtime) -> Result<Value> {
    let items = expect_list("length", &args[0])?;
    Ok(Value::int(items.len() as i64))
}

/// Copies every argument but the last, which becomes the shared tail.
fn append(args: &[Value], _rt: &Runtime) -> Result<Value> {
    let Some((last, init)) = args.split_last() else {
        return Ok(Value::Nil);
    };
    let mut items = Vec::new();
    for arg in init {
        items.extend(expect_list("append", arg)?);
    }
    Ok(list_with_tail(items, last.clone()))
}

fn reverse(args: &[Value], _rt: &Runtime) -> Result<Value> {
    let items = expect_list("reverse", &args[0])?;
    Ok(items.into_iter().fold(Value::Nil, |acc, item| cons(item, acc)))
}

fn list_tail(args: &[Value], _rt: &Runtime) -> Result<Value> {
    let k = expect_index("list-tail", &args[1])?;
    let mut current = args[0].clone();
    for _ in 0..k {
        current = match current.cdr() {
            Some(rest) => rest,
            None => {
                return Err(Error::IndexOutOfRange {
                    name: "list-tail".to_string(),
                    index: k as i64,
                });
            }
        };
    }
    Ok(current)
}

fn list_ref(args: &[Value], rt: &Runtime) -> Result<Value> {
    let tail = list_tail(args, rt).map_err(|_| Error::IndexOutOfRange {
        name: "list-ref".to_string(),
        index: expect_integer("list-ref", &args[1]).unwrap_or(-1),
    })?;
    tail.car().ok_or_else(|| Error::IndexOutOfRange {
        name: "list-ref".to_string(),
        index: expect_integer("list-ref", &args[1]).unwrap_or(-1),
    })
}

fn last_pair(args: &[Value], _rt: &Runtime) -> Result<Value> {
    let mut current = pair_of("last-pair", &args[0])?.clone();
    while let Value::Pair(next) = current.cdr() {
        current = next;
    }
    Ok(Value::Pair(current))
}

fn list_copy(args: &[Value], _rt: &Runtime) -> Result<Value> {
    let mut items = Vec::new();
    let mut current = args[0].clone();
    while let Value::Pair(cell) = current {
        items.push(cell.car());
        current = cell.cdr();
    }
    Ok(list_with_tail(items, current))
}

// ============================================================================
// Equivalence and Type Predicates
// ============================================================================

fn eq_fn(args: &[Value], _rt: &Runtime) -> Result<Value> {
    Ok(Value::Bool(eq(&args[0], &args[1])))
}

fn eqv_fn(args: &[Value], _rt: &Runtime) -> Result<Value> {
    Ok(Value::Bool(eqv(&args[0], &args[1])))
}

fn equal_fn(args: &[Value], _rt: &Runtime) -> Result<Value> {
    Ok(Value::Bool(equal(&args[0], &args[1])))
}

fn not(args: &[Value], _rt: &Runtime) -> Result<Value> {
    Ok(Value::Bool(!args[0].is_true()))
}

fn is_boolean(args: &[Value], _rt: &Runtime) -> Result<Value> {
    Ok(Value::Bool(matches!(args[0], Value::Bool(_))))
}

fn is_symbol(args: &[Value], _rt: &Runtime) -> Result<Value> {
    Ok(Value::Bool(matches!(args[0], Value::Symbol(_))))
}

fn is_string(args: &[Value], _rt: &Runtime) -> Result<Value> {
    Ok(Value::Bool(matches!(args[0], Value::Str(_))))
}

fn is_char(args: &[Value], _rt: &Runtime) -> Result<Value> {
    Ok(Value::Bool(matches!(args[0], Value::Char(_))))
}

fn is_vector(args: &[Value], _rt: &Runtime) -> Result<Value> {
    Ok(Value::Bool(matches!(args[0], Value::Vector(_))))
}

fn is_procedure(args: &[Value], _rt: &Runtime) -> Result<Value> {
    Ok(Value::Bool(args[0].is_procedure()))
}

fn is_number(args: &[Value], _rt: &Runtime) -> Result<Value> {
    Ok(Value::Bool(matches!(args[0], Value::Number(_))))
}

fn is_integer(args: &[Value], _rt: &Runtime) -> Result<Value> {
    Ok(Value::Bool(matches!(args[0], Value::Number(n) if n.is_integer())))
}

fn is_exact(args: &[Value], _rt: &Runtime) -> Result<Value> {
    Ok(Value::Bool(expect_number("exact?", &args[0])?.is_exact()))
}

fn is_inexact(args: &[Value], _rt: &Runtime) -> Result<Value> {
    Ok(Value::Bool(!expect_number("inexact?", &args[0])?.is_exact()))
}

// ============================================================================
// Numbers
// ============================================================================

fn numbers(name: &str, args: &[Value]) -> Result<Vec<Number>> {
    args.iter().map(|arg| expect_number(name, arg)).collect()
}

fn add(args: &[Value], _rt: &Runtime) -> Result<Value> {
    let sum = numbers("+", args)?.into_iter().fold(Number::Int(0), Number::add);
    Ok(Value::Number(sum))
}

fn mul(args: &[Value], _rt: &Runtime) -> Result<Value> {
    let product = numbers("*", args)?.into_iter().fold(Number::Int(1), Number::mul);
    Ok(Value::Number(product))
}

fn sub(args: &[Value], _rt: &Runtime) -> Result<Value> {
    let nums = numbers("-", args)?;
    let result = match nums.as_slice() {
        [only] => only.neg(),
        [first, rest @ ..] => rest.iter().fold(*first, |acc, n| acc.sub(*n)),
        [] => Number::Int(0),
    };
    Ok(Value::Number(result))
}

fn div(args: &[Value], _rt: &Runtime) -> Result<Value> {
    let nums = numbers("/", args)?;
    let result = match nums.as_slice() {
        [only] => Number::Int(1).div(*only)?,
        [first, rest @ ..] => rest.iter().try_fold(*first, |acc, n| acc.div(*n))?,
        [] => Number::Int(1),
    };
    Ok(Value::Number(result))
}

fn compare(name: &str, args: &[Value], holds: fn(Ordering) -> bool) -> Result<Value> {
    let nums = numbers(name, args)?;
    Ok(Value::Bool(nums.windows(2).all(|pair| {
        pair[0].partial_cmp(&pair[1]).is_some_and(holds)
    })))
}

fn num_eq(args: &[Value], _rt: &Runtime) -> Result<Value> {
    compare("=", args, Ordering::is_eq)
}

fn lt(args: &[Value], _rt: &Runtime) -> Result<Value> {
    compare("<", args, Ordering::is_lt)
}

fn gt(args: &[Value], _rt: &Runtime) -> Result<Value> {
    compare(">", args, Ordering::is_gt)
}

fn lte(args: &[Value], _rt: &Runtime) -> Result<Value> {
    compare("<=", args, Ordering::is_le)
}

fn gte(args: &[Value], _rt: &Runtime) -> Result<Value> {
    compare(">=", args, Ordering::is_ge)
}

fn integer_op(name: &str, args: &[Value], op: IntegerOp) -> Result<Value> {
    let a = expect_number(name, &args[0])?;
    let b = expect_number(name, &args[1])?;
    if !a.is_integer() || !b.is_integer() {
        let culprit = if a.is_integer() { &args[1] } else { &args[0] };
        return Err(Error::wrong_type(name, "integer", culprit));
    }
    Ok(Value::Number(a.integer_op(b, op)?))
}

fn quotient(args: &[Value], _rt: &Runtime) -> Result<Value> {
    integer_op("quotient", args, IntegerOp::Quotient)
}

fn remainder(args: &[Value], _rt: &Runtime) -> Result<Value> {
    integer_op("remainder", args, IntegerOp::Remainder)
}

fn modulo(args: &[Value], _rt: &Runtime) -> Result<Value> {
    integer_op("modulo", args, IntegerOp::Modulo)
}

fn abs(args: &[Value], _rt: &Runtime) -> Result<Value> {
    let n = expect_number("abs", &args[0])?;
    let negative = n < Number::Int(0);
    Ok(Value::Number(if negative { n.neg() } else { n }))
}

/// `min`/`max`: the result is inexact if any argument is.
fn extremum(name: &str, args: &[Value], pick: Ordering) -> Result<Value> {
    let nums = numbers(name, args)?;
    let inexact = nums.iter().any(|n| !n.is_exact());
    let mut best = nums[0];
    for n in &nums[1..] {
        if n.partial_cmp(&best) == Some(pick) {
            best = *n;
        }
    }
    Ok(Value::Number(if inexact {
        Number::Float(best.to_float())
    } else {
        best
    }))
}

fn min(args: &[Value], _rt: &Runtime) -> Result<Value> {
    extremum("min", args, Ordering::Less)
}

fn max(args: &[Value], _rt: &Runtime) -> Result<Value> {
    extremum("max", args, Ordering::Greater)
}

fn gcd_of(mut a: i64, mut b: i64) -> i64 {
    while b != 0 {
        (a, b) = (b, a.wrapping_rem(b));
    }
    a.wrapping_abs()
}

fn gcd(args: &[Value], _rt: &Runtime) -> Result<Value> {
    let mut result = 0;
    for arg in args {
        result = gcd_of(result, expect_integer("gcd", arg)?);
    }
    Ok(Value::int(result))
}

fn lcm(args: &[Value], _rt: &Runtime) -> Result<Value> {
    let mut result: i64 = 1;
    for arg in args {
        let n = expect_integer("lcm", arg)?;
        if n == 0 {
            return Ok(Value::int(0));
        }
        result = (result / gcd_of(result, n)).wrapping_mul(n).wrapping_abs();
    }
    Ok(Value::int(result))
}

fn rounding(name: &str, args: &[Value], round: fn(f64) -> f64) -> Result<Value> {
    match expect_number(name, &args[0])? {
        n @ Number::Int(_) => Ok(Value::Number(n)),
        Number::Float(x) => Ok(Value::Number(Number::Float(round(x)))),
    }
}

fn floor(args: &[Value], _rt: &Runtime) -> Result<Value> {
    rounding("floor", args, f64::floor)
}

fn ceiling(args: &[Value], _rt: &Runtime) -> Result<Value> {
    rounding("ceiling", args, f64::ceil)
}

fn truncate(args: &[Value], _rt: &Runtime) -> Result<Value> {
    rounding("truncate", args, f64::trunc)
}

/// Rounds half to even.
fn round(args: &[Value], _rt: &Runtime) -> Result<Value> {
    rounding("round", args, |x| {
        let rounded = x.round();
        if (x - x.trunc()).abs() == 0.5 && rounded % 2.0 != 0.0 {
            rounded - x.signum()
        } else {
            rounded
        }
    })
}

fn float_fn(name: &str, args: &[Value], f: fn(f64) -> f64) -> Result<Value> {
    let x = expect_number(name, &args[0])?.to_float();
    Ok(Value::Number(Number::Float(f(x))))
}

/// Exact for perfect squares.
fn sqrt(args: &[Value], _rt: &Runtime) -> Result<Value> {
    let n = expect_number("sqrt", &args[0])?;
    if let Number::Int(i) = n {
        if i >= 0 {
            let root = (i as f64).sqrt().round() as i64;
            if root.checked_mul(root) == Some(i) {
                return Ok(Value::int(root));
            }
        }
    }
    Ok(Value::Number(Number::Float(n.to_float().sqrt())))
}

fn expt(args: &[Value], _rt: &Runtime) -> Result<Value> {
    let base = expect_number("expt", &args[0])?;
    let power = expect_number("expt", &args[1])?;
    if let (Number::Int(b), Number::Int(p)) = (base, power) {
        if let Ok(p) = u32::try_from(p) {
            if let Some(result) = b.checked_pow(p) {
                return Ok(Value::int(result));
            }
        }
    }
    Ok(Value::Number(Number::Float(base.to_float().powf(power.to_float()))))
}

fn exp(args: &[Value], _rt: &Runtime) -> Result<Value> {
    float_fn("exp", args, f64::exp)
}

fn log(args: &[Value], _rt: &Runtime) -> Result<Value> {
    let x = expect_number("log", &args[0])?.to_float();
    match args.get(1) {
        Some(base) => Ok(Value::Number(Number::Float(x.log(expect_number("log", base)?.to_float())))),
        None => Ok(Value::Number(Number::Float(x.ln()))),
    }
}

fn sin(args: &[Value], _rt: &Runtime) -> Result<Value> {
    float_fn("sin", args, f64::sin)
}

fn cos(args: &[Value], _rt: &Runtime) -> Result<Value> {
    float_fn("cos", args, f64::cos)
}

fn tan(args: &[Value], _rt: &Runtime) -> Result<Value> {
    float_fn("tan", args, f64::tan)
}

fn atan(args: &[Value], _rt: &Runtime) -> Result<Value> {
    let y = expect_number("atan", &args[0])?.to_float();
    match args.get(1) {
        Some(x) => Ok(Value::Number(Number::Float(y.atan2(expect_number("atan", x)?.to_float())))),
        None => Ok(Value::Number(Number::Float(y.atan()))),
    }
}

fn square(args: &[Value], _rt: &Runtime) -> Result<Value> {
    let n = expect_number("square", &args[0])?;
    Ok(Value::Number(n.mul(n)))
}

fn radix(name: &str, args: &[Value]) -> Result<u32> {
    match args.get(1) {
        None => Ok(10),
        Some(value) => match expect_integer(name, value)? {
            r @ (2 | 8 | 10 | 16) => Ok(r as u32),
            _ => Err(Error::wrong_type(name, "radix 2, 8, 10 or 16", value)),
        },
    }
}

fn format_radix(mut n: i64, radix: u32) -> String {
    if n == 0 {
        return "0".to_string();
    }
    let negative = n < 0;
    let mut digits = Vec::new();
    while n != 0 {
        let digit = (n % radix as i64).unsigned_abs() as u32;
        digits.push(std::char::from_digit(digit, radix).unwrap_or('?'));
        n /= radix as i64;
    }
    if negative {
        digits.push('-');
    }
    digits.iter().rev().collect()
}

fn number_to_string(args: &[Value], _rt: &Runtime) -> Result<Value> {
    let n = expect_number("number->string", &args[0])?;
    let radix = radix("number->string", args)?;
    let text = match n {
        Number::Int(i) if radix != 10 => format_radix(i, radix),
        other => other.to_string(),
    };
    Ok(Value::string(&text))
}

fn string_to_number(args: &[Value], _rt: &Runtime) -> Result<Value> {
    let text = expect_string("string->number", &args[0])?;
    let parsed = match radix("string->number", args)? {
        10 => parse_number(&text),
        r => i64::from_str_radix(&text, r).ok().map(Number::Int),
    };
    Ok(parsed.map_or(Value::Bool(false), Value::Number))
}

fn exact_to_inexact(args: &[Value], _rt: &Runtime) -> Result<Value> {
    let n = expect_number("exact->inexact", &args[0])?;
    Ok(Value::Number(Number::Float(n.to_float())))
}

/// Only integral values have an exact counterpart.
fn inexact_to_exact(args: &[Value], _rt: &Runtime) -> Result<Value> {
    match expect_number("inexact->exact", &args[0])?.to_exact() {
        exact @ Number::Int(_) => Ok(Value::Number(exact)),
        Number::Float(_) => Err(Error::wrong_type("inexact->exact", "integral number", &args[0])),
    }
}

fn is_zero(args: &[Value], _rt: &Runtime) -> Result<Value> {
    Ok(Value::Bool(expect_number("zero?", &args[0])?.is_zero()))
}

fn is_positive(args: &[Value], _rt: &Runtime) -> Result<Value> {
    Ok(Value::Bool(expect_number("positive?", &args[0])? > Number::Int(0)))
}

fn is_negative(args: &[Value], _rt: &Runtime) -> Result<Value> {
    Ok(Value::Bool(expect_number("negative?", &args[0])? < Number::Int(0)))
}

fn is_odd(args: &[Value], _rt: &Runtime) -> Result<Value> {
    Ok(Value::Bool(expect_integer("odd?", &args[0])? % 2 != 0))
}

fn is_even(args: &[Value], _rt: &Runtime) -> Result<Value> {
    Ok(Value::Bool(expect_integer("even?", &args[0])? % 2 == 0))
}

// ============================================================================
// Characters
// ============================================================================

fn char_to_integer(args: &[Value], _rt: &Runtime) -> Result<Value> {
    Ok(Value::int(expect_char("char->integer", &args[0])? as i64))
}

fn integer_to_char(args: &[Value], _rt: &Runtime) -> Result<Value> {
    let code = expect_integer("integer->char", &args[0])?;
    u32::try_from(code)
        .ok()
        .and_then(char::from_u32)
        .map(Value::Char)
        .ok_or_else(|| Error::wrong_type("integer->char", "Unicode scalar value", &args[0]))
}

fn char_upcase(args: &[Value], _rt: &Runtime) -> Result<Value> {
    let c = expect_char("char-upcase", &args[0])?;
    Ok(Value::Char(c.to_uppercase().next().unwrap_or(c)))
}

fn char_downcase(args: &[Value], _rt: &Runtime) -> Result<Value> {
    let c = expect_char("char-downcase", &args[0])?;
    Ok(Value::Char(c.to_lowercase().next().unwrap_or(c)))
}

fn char_test(name: &str, args: &[Value], test: fn(&char) -> bool) -> Result<Value> {
    Ok(Value::Bool(test(&expect_char(name, &args[0])?)))
}

fn is_char_alphabetic(args: &[Value], _rt: &Runtime) -> Result<Value> {
    char_test("char-alphabetic?", args, |c| c.is_alphabetic())
}

fn is_char_numeric(args: &[Value], _rt: &Runtime) -> Result<Value> {
    char_test("char-numeric?", args, |c| c.is_numeric())
}

fn is_char_whitespace(args: &[Value], _rt: &Runtime) -> Result<Value> {
    char_test("char-whitespace?", args, |c| c.is_whitespace())
}

fn char_compare(name: &str, args: &[Value], holds: fn(Ordering) -> bool) -> Result<Value> {
    let chars = args
        .iter()
        .map(|arg| expect_char(name, arg))
        .collect::<Result<Vec<_>>>()?;
    Ok(Value::Bool(chars.windows(2).all(|pair| holds(pair[0].cmp(&pair[1])))))
}

fn char_eq(args: &[Value], _rt: &Runtime) -> Result<Value> {
    char_compare("char=?", args, Ordering::is_eq)
}

fn char_lt(args: &[Value], _rt: &Runtime) -> Result<Value> {
    char_compare("char<?", args, Ordering::is_lt)
}

fn char_gt(args: &[Value], _rt: &Runtime) -> Result<Value> {
    char_compare("char>?", args, Ordering::is_gt)
}

// ============================================================================
// Strings and Symbols
// ============================================================================

fn string_length(args: &[Value], _rt: &Runtime) -> Result<Value> {
    let s = expect_string("string-length", &args[0])?;
    Ok(Value::int(s.chars().count() as i64))
}

fn string_ref(args: &[Value], _rt: &Runtime) -> Result<Value> {
    let s = expect_string("string-ref", &args[0])?;
    let index = checked_index("string-ref", &args[1], s.chars().count())?;
    Ok(s.chars().nth(index).map_or(Value::Unspecified, Value::Char))
}

fn substring(args: &[Value], _rt: &Runtime) -> Result<Value> {
    let s = expect_string("substring", &args[0])?;
    let len = s.chars().count();
    let start = expect_index("substring", &args[1])?;
    let end = match args.get(2) {
        Some(end) => expect_index("substring", end)?,
        None => len,
    };
    if start > end || end > len {
        return Err(Error::IndexOutOfRange {
            name: "substring".to_string(),
            index: end as i64,
        });
    }
    let text: String = s.chars().skip(start).take(end - start).collect();
    Ok(Value::string(&text))
}

fn string_append(args: &[Value], _rt: &Runtime) -> Result<Value> {
    let mut text = String::new();
    for arg in args {
        text.push_str(&expect_string("string-append", arg)?);
    }
    Ok(Value::string(&text))
}

fn string_to_list(args: &[Value], _rt: &Runtime) -> Result<Value> {
    let s = expect_string("string->list", &args[0])?;
    Ok(list_from_vec(s.chars().map(Value::Char).collect()))
}

fn chars_to_string(name: &str, items: &[Value]) -> Result<Value> {
    let text = items
        .iter()
        .map(|item| expect_char(name, item))
        .collect::<Result<String>>()?;
    Ok(Value::string(&text))
}

fn list_to_string(args: &[Value], _rt: &Runtime) -> Result<Value> {
    chars_to_string("list->string", &expect_list("list->string", &args[0])?)
}

fn string(args: &[Value], _rt: &Runtime) -> Result<Value> {
    chars_to_string("string", args)
}

fn make_string(args: &[Value], _rt: &Runtime) -> Result<Value> {
    let len = expect_index("make-string", &args[0])?;
    let fill = match args.get(1) {
        Some(c) => expect_char("make-string", c)?,
        None => ' ',
    };
    Ok(Value::string(&std::iter::repeat_n(fill, len).collect::<String>()))
}

fn string_copy(args: &[Value], _rt: &Runtime) -> Result<Value> {
    Ok(Value::string(&expect_string("string-copy", &args[0])?))
}

fn string_upcase(args: &[Value], _rt: &Runtime) -> Result<Value> {
    Ok(Value::string(&expect_string("string-upcase", &args[0])?.to_uppercase()))
}

fn string_downcase(args: &[Value], _rt: &Runtime) -> Result<Value> {
    Ok(Value::string(&expect_string("string-downcase", &args[0])?.to_lowercase()))
}

fn string_compare(name: &str, args: &[Value], holds: fn(Ordering) -> bool) -> Result<Value> {
    let strings = args
        .iter()
        .map(|arg| expect_string(name, arg))
        .collect::<Result<Vec<_>>>()?;
    Ok(Value::Bool(strings.windows(2).all(|pair| holds(pair[0].cmp(&pair[1])))))
}

fn string_eq(args: &[Value], _rt: &Runtime) -> Result<Value> {
    string_compare("string=?", args, Ordering::is_eq)
}

fn string_lt(args: &[Value], _rt: &Runtime) -> Result<Value> {
    string_compare("string<?", args, Ordering::is_lt)
}

fn string_gt(args: &[Value], _rt: &Runtime) -> Result<Value> {
    string_compare("string>?", args, Ordering::is_gt)
}

fn string_to_symbol(args: &[Value], rt: &Runtime) -> Result<Value> {
    let name = expect_string("string->symbol", &args[0])?;
    Ok(Value::Symbol(rt.intern(&name)))
}

fn symbol_to_string(args: &[Value], _rt: &Runtime) -> Result<Value> {
    Ok(Value::string(expect_symbol("symbol->string", &args[0])?.name()))
}

/// `(gensym)` or `(gensym prefix)`.
fn gensym(args: &[Value], rt: &Runtime) -> Result<Value> {
    let prefix = match args.first() {
        None => "g".to_string(),
        Some(Value::Str(s)) => s.to_string(),
        Some(Value::Symbol(s)) => s.name().to_string(),
        Some(other) => return Err(Error::wrong_type("gensym", "string or symbol", other)),
    };
    Ok(Value::Symbol(rt.gensym(&prefix)))
}

// ============================================================================
// Vectors
// ============================================================================

fn vector(args: &[Value], _rt: &Runtime) -> Result<Value> {
    Ok(Value::vector(args.to_vec()))
}

fn make_vector(args: &[Value], _rt: &Runtime) -> Result<Value> {
    let len = expect_index("make-vector", &args[0])?;
    let fill = args.get(1).cloned().unwrap_or(Value::Unspecified);
    Ok(Value::vector(vec![fill; len]))
}

fn vector_length(args: &[Value], _rt: &Runtime) -> Result<Value> {
    let items = expect_vector("vector-length", &args[0])?;
    let len = items.borrow().len();
    Ok(Value::int(len as i64))
}

fn vector_ref(args: &[Value], _rt: &Runtime) -> Result<Value> {
    let items = expect_vector("vector-ref", &args[0])?;
    let items = items.borrow();
    let index = checked_index("vector-ref", &args[1], items.len())?;
    Ok(items[index].clone())
}

fn vector_set(args: &[Value], _rt: &Runtime) -> Result<Value> {
    let items = expect_vector("vector-set!", &args[0])?;
    let mut items = items.borrow_mut();
    let index = checked_index("vector-set!", &args[1], items.len())?;
    items[index] = args[2].clone();
    Ok(Value::Unspecified)
}

fn vector_to_list(args: &[Value], _rt: &Runtime) -> Result<Value> {
    let items = expect_vector("vector->list", &args[0])?;
    let items = items.borrow().clone();
    Ok(list_from_vec(items))
}

fn list_to_vector(args: &[Value], _rt: &Runtime) -> Result<Value> {
    Ok(Value::vector(expect_list("list->vector", &args[0])?))
}

fn vector_fill(args: &[Value], _rt: &Runtime) -> Result<Value> {
    let items = expect_vector("vector-fill!", &args[0])?;
    items.borrow_mut().fill(args[1].clone());
    Ok(Value::Unspecified)
}

fn vector_copy(args: &[Value], _rt: &Runtime) -> Result<Value> {
    let items = expect_vector("vector-copy", &args[0])?;
    let copy = items.borrow().clone();
    Ok(Value::vector(copy))
}

// ============================================================================
// Output
// ============================================================================

fn display(args: &[Value], rt: &Runtime) -> Result<Value> {
    rt.write_output(&display_string(&args[0]));
    Ok(Value::Unspecified)
}

fn write(args: &[Value], rt: &Runtime) -> Result<Value> {
    rt.write_output(&args[0].to_string());
    Ok(Value::Unspecified)
}

fn newline(_args: &[Value], rt: &Runtime) -> Result<Value> {
    rt.write_output("\n");
    Ok(Value::Unspecified)
}

fn write_char(args: &[Value], rt: &Runtime) -> Result<Value> {
    let c = expect_char("write-char", &args[0])?;
    rt.write_output(c.encode_utf8(&mut [0; 4]));
    Ok(Value::Unspecified)
}

// ============================================================================
// Control
// ============================================================================

fn values(args: &[Value], _rt: &Runtime) -> Result<Value> {
    Ok(Value::from_values(args.to_vec()))
}

/// The values delivered by a producer, as a list; used by
/// `call-with-values`.
fn values_to_list(args: &[Value], _rt: &Runtime) -> Result<Value> {
    Ok(list_from_vec(args[0].clone().into_values()))
}

/// `(error message irritant ...)`
fn error(args: &[Value], _rt: &Runtime) -> Result<Value> {
    let mut message = display_string(&args[0]);
    for irritant in &args[1..] {
        message.push(' ');
        message.push_str(&irritant.to_string());
    }
    Err(Error::UserRaised(message))
}

fn expand_once(form: &Value, rt: &Runtime) -> Result<Option<Value>> {
    match expander::macro_for(form, |name| rt.global().lookup(name)) {
        Some(syntax) => expander::expand(rt, &syntax, form).map(Some),
        None => Ok(None),
    }
}

fn macroexpand_1(args: &[Value], rt: &Runtime) -> Result<Value> {
    Ok(expand_once(&args[0], rt)?.unwrap_or_else(|| args[0].clone()))
}

fn macroexpand(args: &[Value], rt: &Runtime) -> Result<Value> {
    let mut form = args[0].clone();
    while let Some(expansion) = expand_once(&form, rt)? {
        form = expansion;
    }
    Ok(form)
}

// ============================================================================
// Host Boundary
// ============================================================================

/// `(set-timeout! proc delay-ms arg ...)` returns a task id.
fn set_timeout(args: &[Value], rt: &Runtime) -> Result<Value> {
    let procedure = expect_procedure("set-timeout!", &args[0])?;
    let delay = expect_index("set-timeout!", &args[1])?;
    let task = Task::Call {
        procedure,
        args: args[2..].to_vec(),
    };
    let id = rt.scheduler().schedule(delay as u64, task);
    Ok(Value::int(id as i64))
}

fn clear_timeout(args: &[Value], rt: &Runtime) -> Result<Value> {
    let id = expect_index("clear-timeout!", &args[0])?;
    Ok(Value::Bool(rt.scheduler().cancel(id as u64)))
}

/// `(fetch-text name proc)`: `proc` later receives the text.
fn fetch_text(args: &[Value], rt: &Runtime) -> Result<Value> {
    let name = expect_string("fetch-text", &args[0])?;
    let procedure = expect_procedure("fetch-text", &args[1])?;
    let task = Task::Fetch {
        name: name.to_string(),
        procedure,
    };
    let id = rt.scheduler().schedule(0, task);
    Ok(Value::int(id as i64))
}

fn host_ref(args: &[Value], rt: &Runtime) -> Result<Value> {
    let name = expect_string("host-ref", &args[0])?;
    rt.host()
        .property(&name)
        .ok_or_else(|| Error::Host(format!("host-ref: no host property '{name}'")))
}

fn host_set(args: &[Value], rt: &Runtime) -> Result<Value> {
    let name = expect_string("host-set!", &args[0])?;
    rt.host().set_property(&name, args[1].clone());
    Ok(Value::Unspecified)
}

fn host_is_bound(args: &[Value], rt: &Runtime) -> Result<Value> {
    let name = expect_string("host-bound?", &args[0])?;
    Ok(Value::Bool(rt.host().is_bound(&name)))
}

fn host_call(args: &[Value], rt: &Runtime) -> Result<Value> {
    let name = expect_string("host-call", &args[0])?;
    let func = rt
        .host()
        .function(&name)
        .ok_or_else(|| Error::Host(format!("host-call: no host function '{name}'")))?;
    func(&args[1..])
}

// ============================================================================
// Registration
// ============================================================================

/// Bind every native primitive into the runtime's top-level environment.
pub fn register_stdlib(rt: &Runtime) {
    use Arity::{AtLeast, Exactly, Range};

    // Pairs and lists
    rt.register_native("cons", Exactly(2), cons_fn);
    rt.register_native("car", Exactly(1), car);
    rt.register_native("cdr", Exactly(1), cdr);
    rt.register_native("set-car!", Exactly(2), set_car);
    rt.register_native("set-cdr!", Exactly(2), set_cdr);
    register_cxrs(rt);
    rt.register_native("list", AtLeast(0), list);
    rt.register_native("list?", Exactly(1), is_list);
    rt.register_native("pair?", Exactly(1), is_pair);
    rt.register_native("null?", Exactly(1), is_null);
    rt.register_native("length", Exactly(1), length);
    rt.register_native("append", AtLeast(0), append);
    rt.register_native("reverse", Exactly(1), reverse);
    rt.register_native("list-tail", Exactly(2), list_tail);
    rt.register_native("list-ref", Exactly(2), list_ref);
    rt.register_native("last-pair", Exactly(1), last_pair);
    rt.register_native("list-copy", Exactly(1), list_copy);

    // Equivalence and type predicates
    rt.register_native("eq?", Exactly(2), eq_fn);
    rt.register_native("eqv?", Exactly(2), eqv_fn);
    rt.register_native("equal?", Exactly(2), equal_fn);
    rt.register_native("not", Exactly(1), not);
    rt.register_native("boolean?", Exactly(1), is_boolean);
    rt.register_native("symbol?", Exactly(1), is_symbol);
    rt.register_native("string?", Exactly(1), is_string);
    rt.register_native("char?", Exactly(1), is_char);
    rt.register_native("vector?", Exactly(1), is_vector);
    rt.register_native("procedure?", Exactly(1), is_procedure);
    rt.register_native("number?", Exactly(1), is_number);
    rt.register_native("integer?", Exactly(1), is_integer);
    rt.register_native("exact?", Exactly(1), is_exact);
    rt.register_native("inexact?", Exactly(1), is_inexact);

    // Numbers
    rt.register_native("+", AtLeast(0), add);
    rt.register_native("-", AtLeast(1), sub);
    rt.register_native("*", AtLeast(0), mul);
    rt.register_native("/", AtLeast(1), div);
    rt.register_native("=", AtLeast(1), num_eq);
    rt.register_native("<", AtLeast(1), lt);
    rt.register_native(">", AtLeast(1), gt);
    rt.register_native("<=", AtLeast(1), lte);
    rt.register_native(">=", AtLeast(1), gte);
    rt.register_native("quotient", Exactly(2), quotient);
    rt.register_native("remainder", Exactly(2), remainder);
    rt.register_native("modulo", Exactly(2), modulo);
    rt.register_native("abs", Exactly(1), abs);
    rt.register_native("min", AtLeast(1), min);
    rt.register_native("max", AtLeast(1), max);
    rt.register_native("gcd", AtLeast(0), gcd);
    rt.register_native("lcm", AtLeast(0), lcm);
    rt.register_native("floor", Exactly(1), floor);
    rt.register_native("ceiling", Exactly(1), ceiling);
    rt.register_native("round", Exactly(1), round);
    rt.register_native("truncate", Exactly(1), truncate);
    rt.register_native("sqrt", Exactly(1), sqrt);
    rt.register_native("expt", Exactly(2), expt);
    rt.register_native("exp", Exactly(1), exp);
    rt.register_native("log", Range(1, 2), log);
    rt.register_native("sin", Exactly(1), sin);
    rt.register_native("cos", Exactly(1), cos);
    rt.register_native("tan", Exactly(1), tan);
    rt.register_native("atan", Range(1, 2), atan);
    rt.register_native("square", Exactly(1), square);
    rt.register_native("number->string", Range(1, 2), number_to_string);
    rt.register_native("string->number", Range(1, 2), string_to_number);
    rt.register_native("exact->inexact", Exactly(1), exact_to_inexact);
    rt.register_native("inexact->exact", Exactly(1), inexact_to_exact);
    rt.register_native("inexact", Exactly(1), exact_to_inexact);
    rt.register_native("exact", Exactly(1), inexact_to_exact);
    rt.register_native("zero?", Exactly(1), is_zero);
    rt.register_native("positive?", Exactly(1), is_positive);
    rt.register_native("negative?", Exactly(1), is_negative);
    rt.register_native("odd?", Exactly(1), is_odd);
    rt.register_native("even?", Exactly(1), is_even);

    // Characters
    rt.register_native("char->integer", Exactly(1), char_to_integer);
    rt.register_native("integer->char", Exactly(1), integer_to_char);
    rt.register_native("char-upcase", Exactly(1), char_upcase);
    rt.register_native("char-downcase", Exactly(1), char_downcase);
    rt.register_native("char-alphabetic?", Exactly(1), is_char_alphabetic);
    rt.register_native("char-numeric?", Exactly(1), is_char_numeric);
    rt.register_native("char-whitespace?", Exactly(1), is_char_whitespace);
    rt.register_native("char=?", AtLeast(1), char_eq);
    rt.register_native("char<?", AtLeast(1), char_lt);
    rt.register_native("char>?", AtLeast(1), char_gt);

    // Strings and symbols
    rt.register_native("string-length", Exactly(1), string_length);
    rt.register_native("string-ref", Exactly(2), string_ref);
    rt.register_native("substring", Range(2, 3), substring);
    rt.register_native("string-append", AtLeast(0), string_append);
    rt.register_native("string->list", Exactly(1), string_to_list);
    rt.register_native("list->string", Exactly(1), list_to_string);
    rt.register_native("string", AtLeast(0), string);
    rt.register_native("make-string", Range(1, 2), make_string);
    rt.register_native("string-copy", Exactly(1), string_copy);
    rt.register_native("string-upcase", Exactly(1), string_upcase);
    rt.register_native("string-downcase", Exactly(1), string_downcase);
    rt.register_native("string=?", AtLeast(1), string_eq);
    rt.register_native("string<?", AtLeast(1), string_lt);
    rt.register_native("string>?", AtLeast(1), string_gt);
    rt.register_native("string->symbol", Exactly(1), string_to_symbol);
    rt.register_native("symbol->string", Exactly(1), symbol_to_string);
    rt.register_native("gensym", Range(0, 1), gensym);

    // Vectors
    rt.register_native("vector", AtLeast(0), vector);
    rt.register_native("make-vector", Range(1, 2), make_vector);
    rt.register_native("vector-length", Exactly(1), vector_length);
    rt.register_native("vector-ref", Exactly(2), vector_ref);
    rt.register_native("vector-set!", Exactly(3), vector_set);
    rt.register_native("vector->list", Exactly(1), vector_to_list);
    rt.register_native("list->vector", Exactly(1), list_to_vector);
    rt.register_native("vector-fill!", Exactly(2), vector_fill);
    rt.register_native("vector-copy", Exactly(1), vector_copy);

    // Output
    rt.register_native("display", Exactly(1), display);
    rt.register_native("write", Exactly(1), write);
    rt.register_native("newline", Exactly(0), newline);
    rt.register_native("write-char", Exactly(1), write_char);

    // Control
    rt.register_control("apply", AtLeast(2), Control::Apply);
    rt.register_control("call/cc", Exactly(1), Control::CallCc);
    rt.register_control("call-with-current-continuation", Exactly(1), Control::CallCc);
    rt.register_control("dynamic-wind", Exactly(3), Control::DynamicWind);
    rt.register_control("eval", Range(1, 2), Control::Eval);
    rt.register_native("values", AtLeast(0), values);
    rt.register_native("%values->list", Exactly(1), values_to_list);
    rt.register_native("error", AtLeast(1), error);
    rt.register_native("macroexpand-1", Exactly(1), macroexpand_1);
    rt.register_native("macroexpand", Exactly(1), macroexpand);

    // Host boundary
    rt.register_native("set-timeout!", AtLeast(2), set_timeout);
    rt.register_native("clear-timeout!", Exactly(1), clear_timeout);
    rt.register_native("fetch-text", Exactly(2), fetch_text);
    rt.register_native("host-ref", Exactly(1), host_ref);
    rt.register_native("host-set!", Exactly(2), host_set);
    rt.register_native("host-bound?", Exactly(1), host_is_bound);
    rt.register_native("host-call", AtLeast(1), host_call);

    // Quasiquote aliases
    let keywords = rt.keywords();
    for (alias, name) in [
        (&keywords.cons, "cons"),
        (&keywords.append, "append"),
        (&keywords.list_to_vector, "list->vector"),
    ] {
        if let Some(value) = rt.lookup(name) {
            rt.global().define(alias.clone(), value);
        }
    }
}

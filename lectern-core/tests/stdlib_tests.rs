//! Native primitives and bootstrap library procedures.

use lectern::{BufferSink, Error, Runtime, RuntimeConfig};

fn run(code: &str) -> String {
    let rt = Runtime::with_output(RuntimeConfig::default(), BufferSink::new());
    match rt.eval_str(code) {
        Ok(value) => value.to_string(),
        Err(e) => panic!("{code} failed: {e}"),
    }
}

fn run_err(code: &str) -> Error {
    let rt = Runtime::with_output(RuntimeConfig::default(), BufferSink::new());
    match rt.eval_str(code) {
        Ok(value) => panic!("expected {code} to fail, got {value}"),
        Err(e) => e,
    }
}

// ============================================================================
// Numbers
// ============================================================================

#[test]
fn test_arithmetic() {
    assert_eq!(run("(+ 1 2 3)"), "6");
    assert_eq!(run("(+)"), "0");
    assert_eq!(run("(- 10)"), "-10");
    assert_eq!(run("(- 10 1 2)"), "7");
    assert_eq!(run("(* 2 3 4)"), "24");
    assert_eq!(run("(/ 6 3)"), "2");
    assert_eq!(run("(/ 1 2)"), "0.5");
    assert_eq!(run("(+ 1 2.5)"), "3.5");
}

#[test]
fn test_integer_division() {
    assert_eq!(run("(quotient 17 5)"), "3");
    assert_eq!(run("(remainder -17 5)"), "-2");
    assert_eq!(run("(modulo -17 5)"), "3");
    assert!(matches!(run_err("(quotient 1 0)"), Error::DivisionByZero));
}

#[test]
fn test_comparison() {
    assert_eq!(run("(< 1 2 3)"), "#t");
    assert_eq!(run("(< 1 3 2)"), "#f");
    assert_eq!(run("(= 1 1.0)"), "#t");
    assert_eq!(run("(>= 3 3 1)"), "#t");
}

#[test]
fn test_numeric_functions() {
    assert_eq!(run("(abs -5)"), "5");
    assert_eq!(run("(max 1 7 3)"), "7");
    assert_eq!(run("(min 4 2 8)"), "2");
    assert_eq!(run("(gcd 12 18)"), "6");
    assert_eq!(run("(lcm 4 6)"), "12");
    assert_eq!(run("(expt 2 10)"), "1024");
    assert_eq!(run("(sqrt 16)"), "4");
    assert_eq!(run("(square 5)"), "25");
    assert_eq!(run("(exact->inexact 1)"), "1.0");
    assert_eq!(run("(inexact->exact 3.0)"), "3");
    assert_eq!(run("(floor 2.5)"), "2.0");
}

#[test]
fn test_number_predicates() {
    assert_eq!(run("(list (zero? 0) (positive? -1) (negative? -1) (odd? 3) (even? 3))"), "(#t #f #t #t #f)");
    assert_eq!(run("(list (integer? 2) (integer? 2.5) (exact? 2) (inexact? 2.0))"), "(#t #f #t #t)");
}

#[test]
fn test_number_string_conversion() {
    assert_eq!(run("(number->string 255 16)"), "\"ff\"");
    assert_eq!(run("(string->number \"42\")"), "42");
    assert_eq!(run("(string->number \"ff\" 16)"), "255");
    assert_eq!(run("(string->number \"nope\")"), "#f");
}

#[test]
fn test_integer_overflow_promotes_to_float() {
    assert_eq!(run("(number? (* 9223372036854775807 2))"), "#t");
    assert_eq!(run("(exact? (* 9223372036854775807 2))"), "#f");
}

// ============================================================================
// Lists
// ============================================================================

#[test]
fn test_pairs() {
    assert_eq!(run("(cons 1 2)"), "(1 . 2)");
    assert_eq!(run("(car '(1 2))"), "1");
    assert_eq!(run("(cdr '(1 2))"), "(2)");
    assert_eq!(run("(cadr '(1 2 3))"), "2");
    assert_eq!(run("(cddr '(1 2 3))"), "(3)");
    assert_eq!(run("(caddr '(1 2 3))"), "3");
    assert_eq!(run("(define p (cons 1 2)) (set-car! p 9) (set-cdr! p '()) p"), "(9)");
}

#[test]
fn test_list_operations() {
    assert_eq!(run("(length '(1 2 3))"), "3");
    assert_eq!(run("(append '(1) '(2 3) '() '(4))"), "(1 2 3 4)");
    assert_eq!(run("(append)"), "()");
    assert_eq!(run("(reverse '(1 2 3))"), "(3 2 1)");
    assert_eq!(run("(list-tail '(1 2 3 4) 2)"), "(3 4)");
    assert_eq!(run("(list-ref '(a b c) 1)"), "b");
    assert_eq!(run("(last-pair '(1 2 3))"), "(3)");
    assert_eq!(run("(list? '(1 2))"), "#t");
    assert_eq!(run("(list? '(1 . 2))"), "#f");
}

#[test]
fn test_append_shares_last_argument() {
    assert_eq!(run("(define tail '(3 4)) (eq? (cddr (append '(1 2) tail)) tail)"), "#t");
}

#[test]
fn test_membership_and_association() {
    assert_eq!(run("(memq 'c '(a b c d))"), "(c d)");
    assert_eq!(run("(memv 5 '(1 2))"), "#f");
    assert_eq!(run("(member '(1) '((0) (1) (2)))"), "((1) (2))");
    assert_eq!(run("(assq 'b '((a 1) (b 2)))"), "(b 2)");
    assert_eq!(run("(assoc \"b\" '((\"a\" . 1) (\"b\" . 2)))"), "(\"b\" . 2)");
}

#[test]
fn test_library_procedures() {
    assert_eq!(run("(filter odd? '(1 2 3 4 5))"), "(1 3 5)");
    assert_eq!(run("(fold-left cons '() '(1 2 3))"), "(((() . 1) . 2) . 3)");
    assert_eq!(run("(fold-right cons '() '(1 2 3))"), "(1 2 3)");
    assert_eq!(run("(reduce + 0 '(1 2 3 4))"), "10");
    assert_eq!(run("(reduce + 0 '())"), "0");
    assert_eq!(run("(iota 5)"), "(0 1 2 3 4)");
    assert_eq!(run("(iota 3 1 2)"), "(1 3 5)");
    assert_eq!(run("(append-map (lambda (x) (list x x)) '(1 2))"), "(1 1 2 2)");
    assert_eq!(run("(list-index even? '(1 3 4))"), "2");
    assert_eq!(run("(list (any odd? '(2 3)) (every odd? '(1 2)))"), "(#t #f)");
}

#[test]
fn test_for_each_runs_in_order() {
    let sink = BufferSink::new();
    let rt = Runtime::with_output(RuntimeConfig::default(), sink.clone());
    rt.eval_str("(for-each (lambda (x y) (display (+ x y))) '(1 2) '(10 20))")
        .unwrap();
    assert_eq!(sink.contents(), "1122");
}

// ============================================================================
// Equivalence
// ============================================================================

#[test]
fn test_equivalence_predicates() {
    assert_eq!(run("(eq? 'a 'A)"), "#t");
    assert_eq!(run("(eq? '() '())"), "#t");
    assert_eq!(run("(eqv? 1.5 1.5)"), "#t");
    assert_eq!(run("(eqv? 2 2.0)"), "#f");
    assert_eq!(run("(eq? (list 1) (list 1))"), "#f");
    assert_eq!(run("(equal? (list 1 (vector 2 \"x\")) (list 1 (vector 2 \"x\")))"), "#t");
}

#[test]
fn test_type_predicates() {
    assert_eq!(
        run("(list (symbol? 'a) (string? \"a\") (char? #\\a) (vector? #(1)) (procedure? car) (procedure? (lambda () 1)) (boolean? #f) (null? '()) (pair? '()))"),
        "(#t #t #t #t #t #t #t #t #f)"
    );
}

// ============================================================================
// Characters and Strings
// ============================================================================

#[test]
fn test_characters() {
    assert_eq!(run("(char->integer #\\A)"), "65");
    assert_eq!(run("(integer->char 97)"), "#\\a");
    assert_eq!(run("(char-upcase #\\a)"), "#\\A");
    assert_eq!(run("(char-alphabetic? #\\1)"), "#f");
    assert_eq!(run("(char<? #\\a #\\b #\\c)"), "#t");
    assert_eq!(run("#\\space"), "#\\space");
}

#[test]
fn test_strings() {
    assert_eq!(run("(string-length \"hello\")"), "5");
    assert_eq!(run("(string-ref \"hello\" 1)"), "#\\e");
    assert_eq!(run("(substring \"hello\" 1 3)"), "\"el\"");
    assert_eq!(run("(string-append \"foo\" \"bar\")"), "\"foobar\"");
    assert_eq!(run("(string->list \"ab\")"), "(#\\a #\\b)");
    assert_eq!(run("(list->string (list #\\a #\\b))"), "\"ab\"");
    assert_eq!(run("(string-upcase \"abc\")"), "\"ABC\"");
    assert_eq!(run("(string=? \"a\" \"a\")"), "#t");
    assert_eq!(run("(string<? \"a\" \"b\")"), "#t");
    assert_eq!(run("(make-string 3 #\\z)"), "\"zzz\"");
}

#[test]
fn test_symbols_and_strings() {
    assert_eq!(run("(symbol->string 'Hello)"), "\"hello\"");
    assert_eq!(run("(eq? (string->symbol \"abc\") 'abc)"), "#t");
    assert_eq!(run("(eq? (gensym) (gensym))"), "#f");
}

// ============================================================================
// Vectors
// ============================================================================

#[test]
fn test_vectors() {
    assert_eq!(run("(vector 1 2 3)"), "#(1 2 3)");
    assert_eq!(run("(make-vector 2 'x)"), "#(x x)");
    assert_eq!(run("(vector-length #(1 2 3))"), "3");
    assert_eq!(run("(define v (vector 1 2 3)) (vector-set! v 0 'a) v"), "#(a 2 3)");
    assert_eq!(run("(vector->list #(1 2))"), "(1 2)");
    assert_eq!(run("(list->vector '(1 2))"), "#(1 2)");
    assert_eq!(run("(vector-map (lambda (x) (* x 10)) #(1 2))"), "#(10 20)");
    assert!(matches!(run_err("(vector-ref #(1) 1)"), Error::IndexOutOfRange { .. }));
}

// ============================================================================
// Control
// ============================================================================

#[test]
fn test_values() {
    assert_eq!(run("(call-with-values (lambda () (values 1 2)) +)"), "3");
    assert_eq!(run("(call-with-values (lambda () 5) list)"), "(5)");
    assert_eq!(run("(values 1 2)"), "1 2");
}

#[test]
fn test_apply_spreads_last_argument() {
    assert_eq!(run("(apply list 1 '(2 3))"), "(1 2 3)");
    assert_eq!(run("(apply apply list '((1 2)))"), "(1 2)");
    assert!(matches!(run_err("(apply + 1 2)"), Error::WrongType { .. }));
}

#[test]
fn test_arity_is_checked() {
    assert!(matches!(run_err("(car 1 2)"), Error::Arity { .. }));
    assert!(matches!(run_err("(cons 1)"), Error::Arity { .. }));
}

#[test]
fn test_assert() {
    assert_eq!(run("(assert (= 1 1))"), "#t");
    assert!(matches!(run_err("(assert (= 1 2))"), Error::UserRaised(_)));
}

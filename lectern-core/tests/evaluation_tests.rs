//! End-to-end evaluation, checked under both the compiling and the purely
//! interpreting configuration.

use lectern::{BufferSink, Error, Result, Runtime, RuntimeConfig, Value};

fn eval_with(config: RuntimeConfig, code: &str) -> Result<Value> {
    let rt = Runtime::with_output(config, BufferSink::new());
    rt.eval_str(code)
}

/// Printed result, asserting both execution modes agree.
fn run(code: &str) -> String {
    let compiled = eval_with(RuntimeConfig::default(), code)
        .unwrap_or_else(|e| panic!("compiled run of {code} failed: {e}"));
    let interpreted = eval_with(RuntimeConfig::interpreted(), code)
        .unwrap_or_else(|e| panic!("interpreted run of {code} failed: {e}"));
    let (compiled, interpreted) = (compiled.to_string(), interpreted.to_string());
    assert_eq!(compiled, interpreted, "modes disagree on {code}");
    compiled
}

/// The error from both modes, asserting they report the same failure.
fn run_err_both(code: &str) -> Error {
    let compiled = eval_with(RuntimeConfig::default(), code);
    let interpreted = eval_with(RuntimeConfig::interpreted(), code);
    match (compiled, interpreted) {
        (Err(compiled), Err(interpreted)) => {
            assert_eq!(compiled.to_string(), interpreted.to_string(), "modes disagree on {code}");
            compiled
        }
        (compiled, interpreted) => {
            panic!("expected {code} to fail, got compiled={compiled:?} interpreted={interpreted:?}")
        }
    }
}

fn run_err(code: &str) -> Error {
    match eval_with(RuntimeConfig::default(), code) {
        Err(e) => e,
        Ok(v) => panic!("expected {code} to fail, got {v}"),
    }
}

// ============================================================================
// Basic Forms
// ============================================================================

#[test]
fn test_self_evaluating() {
    assert_eq!(run("42"), "42");
    assert_eq!(run("\"hi\""), "\"hi\"");
    assert_eq!(run("#t"), "#t");
    assert_eq!(run("#\\a"), "#\\a");
    assert_eq!(run("#(1 2)"), "#(1 2)");
}

#[test]
fn test_define_and_set() {
    assert_eq!(run("(define x 1) (set! x (+ x 10)) x"), "11");
}

#[test]
fn test_if_treats_only_false_as_false() {
    assert_eq!(run("(if '() 'yes 'no)"), "yes");
    assert_eq!(run("(if 0 'yes 'no)"), "yes");
    assert_eq!(run("(if #f 'yes 'no)"), "no");
}

#[test]
fn test_quote_returns_datum() {
    assert_eq!(run("'(a b . c)"), "(a b . c)");
    assert_eq!(run("(car ''x)"), "quote");
}

// ============================================================================
// Procedures
// ============================================================================

#[test]
fn test_factorial() {
    assert_eq!(
        run("(define (fact n) (if (= n 0) 1 (* n (fact (- n 1))))) (fact 5)"),
        "120"
    );
}

#[test]
fn test_set_on_parameter() {
    assert_eq!(run("((lambda (x) (set! x (+ x 1)) x) 41)"), "42");
}

#[test]
fn test_variadic_parameters() {
    assert_eq!(run("((lambda args args) 1 2 3)"), "(1 2 3)");
    assert_eq!(run("((lambda (a . rest) rest) 1 2 3)"), "(2 3)");
    assert_eq!(run("((lambda (a . rest) rest) 1)"), "()");
}

#[test]
fn test_closure_counter() {
    let code = "
        (define (make-counter)
          (let ((n 0))
            (lambda () (set! n (+ n 1)) n)))
        (define c (make-counter))
        (c) (c) (c)";
    assert_eq!(run(code), "3");
}

#[test]
fn test_independent_closures() {
    let code = "
        (define (adder k) (lambda (x) (+ x k)))
        (define add2 (adder 2))
        (define add10 (adder 10))
        (list (add2 1) (add10 1))";
    assert_eq!(run(code), "(3 11)");
}

#[test]
fn test_internal_defines() {
    let code = "
        (define (f x)
          (define y (* x 2))
          (define (g) (+ y 1))
          (g))
        (f 5)";
    assert_eq!(run(code), "11");
}

#[test]
fn test_internal_define_read_before_it_runs() {
    let err = run_err_both("(define (f) (define a b) (define b 1) a) (f)");
    assert!(matches!(err, Error::UnboundVariable(name) if name == "b"));
    let err = run_err_both("(define (f) (define (g) b) (define a (g)) (define b 1) a) (f)");
    assert!(matches!(err, Error::UnboundVariable(name) if name == "b"));
}

#[test]
fn test_pending_internal_define_sees_outer_binding() {
    assert_eq!(run("(define b 10) (define (f) (define a b) (define b 1) (list a b)) (f)"), "(10 1)");
    assert_eq!(run("(define b 10) (define (f) (set! b 3) (define b 1) b) (list (f) b)"), "(1 3)");
}

#[test]
fn test_mutual_recursion() {
    let code = "
        (define (my-even? n) (if (= n 0) #t (my-odd? (- n 1))))
        (define (my-odd? n) (if (= n 0) #f (my-even? (- n 1))))
        (list (my-even? 10000) (my-odd? 7))";
    assert_eq!(run(code), "(#t #t)");
}

#[test]
fn test_higher_order() {
    assert_eq!(run("(map (lambda (x) (* x x)) '(1 2 3))"), "(1 4 9)");
    assert_eq!(run("(map + '(1 2) '(10 20))"), "(11 22)");
    assert_eq!(run("(apply + 1 2 '(3 4))"), "10");
}

// ============================================================================
// Tail Calls and Deep Recursion
// ============================================================================

#[test]
fn test_tail_loop_runs_in_constant_space() {
    assert_eq!(
        run("(let loop ((i 0)) (if (< i 1000000) (loop (+ i 1)) i))"),
        "1000000"
    );
}

#[test]
fn test_global_self_tail_call() {
    let code = "
        (define (count-down n) (if (= n 0) 'done (count-down (- n 1))))
        (count-down 1000000)";
    assert_eq!(run(code), "done");
}

#[test]
fn test_tail_call_through_if_and_begin() {
    let code = "
        (define (walk n acc)
          (if (= n 0)
              acc
              (begin (set! acc (+ acc 1)) (walk (- n 1) acc))))
        (walk 200000 0)";
    assert_eq!(run(code), "200000");
}

#[test]
fn test_deep_non_tail_recursion() {
    let code = "
        (define (build n) (if (= n 0) '() (cons n (build (- n 1)))))
        (length (build 100000))";
    assert_eq!(run(code), "100000");
}

// ============================================================================
// Derived Syntax
// ============================================================================

#[test]
fn test_let_forms() {
    assert_eq!(run("(let ((x 1) (y 2)) (+ x y))"), "3");
    assert_eq!(run("(let* ((x 1) (y (+ x 1))) (* x y))"), "2");
    assert_eq!(
        run("(letrec ((ev? (lambda (n) (if (= n 0) #t (od? (- n 1))))) (od? (lambda (n) (if (= n 0) #f (ev? (- n 1)))))) (ev? 10))"),
        "#t"
    );
}

#[test]
fn test_cond_and_case() {
    assert_eq!(run("(cond ((> 1 2) 'a) ((< 1 2) 'b) (else 'c))"), "b");
    assert_eq!(run("(cond ((assv 2 '((1 . one) (2 . two))) => cdr) (else 'none))"), "two");
    assert_eq!(run("(case (* 2 3) ((2 3 5 7) 'prime) ((1 4 6 8 9) 'composite))"), "composite");
    assert_eq!(run("(case 'x ((a) 1) (else 2))"), "2");
}

#[test]
fn test_and_or() {
    assert_eq!(run("(and 1 2 3)"), "3");
    assert_eq!(run("(and 1 #f 3)"), "#f");
    assert_eq!(run("(or #f 2)"), "2");
    assert_eq!(run("(or)"), "#f");
}

#[test]
fn test_do_loop() {
    assert_eq!(
        run("(do ((i 0 (+ i 1)) (acc '() (cons i acc))) ((= i 4) acc))"),
        "(3 2 1 0)"
    );
}

#[test]
fn test_quasiquote() {
    assert_eq!(run("(define b 2) `(a ,b ,@(list 3 4) e)"), "(a 2 3 4 e)");
    assert_eq!(run("(define b 2) `#(1 ,b)"), "#(1 2)");
    assert_eq!(run("`(1 `(2 ,(3 ,(+ 1 3))))"), "(1 (quasiquote (2 (unquote (3 4)))))");
}

#[test]
fn test_quasiquote_ignores_user_bindings_of_list_builders() {
    assert_eq!(run("(define (f cons) `(a ,cons)) (f 5)"), "(a 5)");
    assert_eq!(
        run("(define (append . xs) 'hijacked) (define l '(2 3)) `(1 ,@l 4)"),
        "(1 2 3 4)"
    );
    assert_eq!(run("(define (f list->vector) `#(,list->vector)) (f 7)"), "#(7)");
}

#[test]
fn test_integer_division_at_the_boundaries() {
    assert_eq!(run("(modulo 5 9223372036854775807)"), "5");
    assert_eq!(
        run("(let ((q (quotient (- -9223372036854775807 1) -1))) (list (inexact? q) q))"),
        "(#t 9223372036854775808)"
    );
}

#[test]
fn test_delay_and_force() {
    let code = "
        (define count 0)
        (define p (delay (begin (set! count (+ count 1)) count)))
        (force p)
        (force p)
        (list (force p) count)";
    assert_eq!(run(code), "(1 1)");
}

#[test]
fn test_eval_primitive() {
    assert_eq!(run("(eval '(+ 1 2))"), "3");
    assert_eq!(run("(eval (list 'car ''(9 8)))"), "9");
}

// ============================================================================
// Output
// ============================================================================

#[test]
fn test_display_and_write_reach_the_sink() {
    let sink = BufferSink::new();
    let rt = Runtime::with_output(RuntimeConfig::default(), sink.clone());
    rt.eval_str(r#"(display "hi") (newline) (write "hi") (display #\x)"#)
        .unwrap();
    assert_eq!(sink.contents(), "hi\n\"hi\"x");
}

// ============================================================================
// Errors
// ============================================================================

#[test]
fn test_error_kinds() {
    assert!(matches!(run_err("undefined-thing"), Error::UnboundVariable(_)));
    assert!(matches!(run_err("(car '())"), Error::WrongType { .. }));
    assert!(matches!(run_err("(1 2)"), Error::NotApplicable(_)));
    assert!(matches!(run_err("((lambda (x) x))"), Error::Arity { .. }));
    assert!(matches!(run_err("(/ 1 0)"), Error::DivisionByZero));
    assert!(matches!(
        run_err("(vector-ref (vector 1) 5)"),
        Error::IndexOutOfRange { .. }
    ));
    assert!(matches!(run_err("(if)"), Error::BadSyntax { .. }));
}

#[test]
fn test_user_error_message() {
    let err = run_err(r#"(error "boom:" 42 'x)"#);
    assert_eq!(err.to_string(), "boom: 42 x");
}

#[test]
fn test_errors_inside_compiled_code() {
    let err = run_err("(define (f x) (+ 1 (car x))) (f 5)");
    assert!(matches!(err, Error::WrongType { .. }));
}

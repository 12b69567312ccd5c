//! syntax-rules macros: matching, transcription, memoized expansion.

use lectern::{BufferSink, Error, Result, Runtime, RuntimeConfig, Value};

fn runtime() -> Runtime {
    Runtime::with_output(RuntimeConfig::default(), BufferSink::new())
}

fn run(code: &str) -> Result<Value> {
    runtime().eval_str(code)
}

fn run_str(code: &str) -> String {
    match run(code) {
        Ok(value) => value.to_string(),
        Err(e) => panic!("{code} failed: {e}"),
    }
}

// ============================================================================
// Matching and Transcription
// ============================================================================

#[test]
fn test_ellipsis_macro() {
    let code = "
        (define-syntax my-list
          (syntax-rules () ((_ x ...) (list x ...))))
        (my-list 1 2 3)";
    assert_eq!(run_str(code), "(1 2 3)");
}

#[test]
fn test_empty_ellipsis_match() {
    let code = "
        (define-syntax my-list
          (syntax-rules () ((_ x ...) (list x ...))))
        (my-list)";
    assert_eq!(run_str(code), "()");
}

#[test]
fn test_nested_ellipsis() {
    let code = "
        (define-syntax my-let*
          (syntax-rules ()
            ((_ () body ...) (let () body ...))
            ((_ ((x v) rest ...) body ...) (let ((x v)) (my-let* (rest ...) body ...)))))
        (my-let* ((a 1) (b (+ a 1)) (c (* b 10))) (list a b c))";
    assert_eq!(run_str(code), "(1 2 20)");
}

#[test]
fn test_ellipsis_over_subpatterns() {
    let code = "
        (define-syntax pairs
          (syntax-rules () ((_ (a b) ...) (list (cons a b) ...))))
        (pairs (1 2) (3 4))";
    assert_eq!(run_str(code), "((1 . 2) (3 . 4))");
}

#[test]
fn test_first_matching_rule_wins() {
    let code = "
        (define-syntax kind
          (syntax-rules ()
            ((_) 'none)
            ((_ x) 'one)
            ((_ x y ...) 'many)))
        (list (kind) (kind 1) (kind 1 2 3))";
    assert_eq!(run_str(code), "(none one many)");
}

#[test]
fn test_literals_match_only_themselves() {
    let code = "
        (define-syntax arrow
          (syntax-rules (=>)
            ((_ a => b) (list 'arrow a b))
            ((_ a b c) (list 'plain a b c))))
        (list (arrow 1 => 2) (arrow 1 + 2))";
    assert_eq!(run_str(code), "((arrow 1 2) (plain 1 #<primitive +> 2))");
}

#[test]
fn test_dotted_pattern_tail() {
    let code = "
        (define-syntax rest-of
          (syntax-rules () ((_ a . more) 'more)))
        (rest-of 1 2 3)";
    assert_eq!(run_str(code), "(2 3)");
}

#[test]
fn test_vector_patterns() {
    let code = "
        (define-syntax vsum
          (syntax-rules () ((_ #(x ...)) (+ x ...))))
        (vsum #(1 2 3))";
    assert_eq!(run_str(code), "6");
}

#[test]
fn test_no_matching_rule_is_bad_syntax() {
    let err = run("(define-syntax one (syntax-rules () ((_ x) x))) (one 1 2)").unwrap_err();
    assert!(matches!(err, Error::BadSyntax { .. }));
}

// ============================================================================
// Capture
// ============================================================================

#[test]
fn test_introduced_names_are_not_renamed() {
    // A template's own binding shadows a use-site variable of the same name.
    let code = "
        (define-syntax swap!
          (syntax-rules ()
            ((_ a b) (let ((tmp a)) (set! a b) (set! b tmp)))))
        (define tmp 1)
        (define other 2)
        (swap! tmp other)
        (list tmp other)";
    assert_eq!(run_str(code), "(1 2)");
}

#[test]
fn test_swap_without_collision() {
    let code = "
        (define-syntax swap!
          (syntax-rules ()
            ((_ a b) (let ((tmp a)) (set! a b) (set! b tmp)))))
        (define x 1)
        (define y 2)
        (swap! x y)
        (list x y)";
    assert_eq!(run_str(code), "(2 1)");
}

// ============================================================================
// Expansion
// ============================================================================

#[test]
fn test_expansion_is_memoized_into_procedure_body() {
    for config in [RuntimeConfig::default(), RuntimeConfig::interpreted()] {
        let rt = Runtime::with_output(config, BufferSink::new());
        rt.eval_str(
            "(define-syntax inc! (syntax-rules () ((_ v) (set! v (+ v 1)))))
             (define counter 0)
             (define (bump!) (inc! counter))
             (bump!)
             (bump!)",
        )
        .unwrap();
        assert_eq!(rt.eval_str("counter").unwrap().to_string(), "2");
        let Some(Value::Lambda(bump)) = rt.lookup("bump!") else {
            panic!("bump! is not a procedure");
        };
        assert_eq!(bump.body.to_string(), "(set! counter (+ counter 1))");
    }
}

#[test]
fn test_eval_leaves_its_datum_unchanged() {
    for config in [RuntimeConfig::default(), RuntimeConfig::interpreted()] {
        let rt = Runtime::with_output(config, BufferSink::new());
        rt.eval_str(
            "(define-syntax my-list (syntax-rules () ((_ x ...) (list x ...))))
             (define e '(my-list 1 2))
             (define q '(quasiquote (a (unquote x))))
             (define x 5)",
        )
        .unwrap();
        assert_eq!(rt.eval_str("(eval e)").unwrap().to_string(), "(1 2)");
        assert_eq!(rt.eval_str("(eval e)").unwrap().to_string(), "(1 2)");
        assert_eq!(rt.eval_str("e").unwrap().to_string(), "(my-list 1 2)");
        assert_eq!(rt.eval_str("(eval q)").unwrap().to_string(), "(a 5)");
        assert_eq!(rt.eval_str("q").unwrap().to_string(), "(quasiquote (a (unquote x)))");
    }
}

#[test]
fn test_macroexpand() {
    let rt = runtime();
    rt.eval_str("(define-syntax inc! (syntax-rules () ((_ v) (set! v (+ v 1)))))")
        .unwrap();
    assert_eq!(
        rt.eval_str("(macroexpand-1 '(inc! n))").unwrap().to_string(),
        "(set! n (+ n 1))"
    );
    assert_eq!(
        rt.eval_str("(macroexpand '(when a b))").unwrap().to_string(),
        "(if a (begin b))"
    );
    assert_eq!(
        rt.eval_str("(macroexpand '(f x))").unwrap().to_string(),
        "(f x)"
    );
}

#[test]
fn test_macro_used_inside_compiled_lambda() {
    let code = "
        (define-syntax twice
          (syntax-rules () ((_ e) (begin e e))))
        (define (bump-twice n)
          (twice (set! n (+ n 1)))
          n)
        (bump-twice 5)";
    assert_eq!(run_str(code), "7");
}

#[test]
fn test_recursive_macro() {
    let code = "
        (define-syntax my-or
          (syntax-rules ()
            ((_) #f)
            ((_ e) e)
            ((_ e r ...) (if e e (my-or r ...)))))
        (list (my-or #f #f 3) (my-or))";
    assert_eq!(run_str(code), "(3 #f)");
}

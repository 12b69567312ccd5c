//! Lazy closure compilation: compile states, fallback to the interpreter,
//! and the host-facing apply entry point.

use lectern::{BufferSink, CompileState, Runtime, RuntimeConfig, Value};

fn runtime(config: RuntimeConfig) -> Runtime {
    Runtime::with_output(config, BufferSink::new())
}

fn eval(rt: &Runtime, code: &str) -> String {
    rt.eval_str(code)
        .unwrap_or_else(|e| panic!("{code} failed: {e}"))
        .to_string()
}

fn state_of(rt: &Runtime, name: &str) -> CompileState {
    match rt.lookup(name) {
        Some(Value::Lambda(lambda)) => lambda.compile_state(),
        other => panic!("{name} is not a lambda: {other:?}"),
    }
}

// ============================================================================
// Compile States
// ============================================================================

#[test]
fn test_compiled_on_first_call() {
    let rt = runtime(RuntimeConfig::default());
    eval(&rt, "(define (square-sum a b) (+ (* a a) (* b b)))");
    assert_eq!(state_of(&rt, "square-sum"), CompileState::Untried);
    assert_eq!(eval(&rt, "(square-sum 3 4)"), "25");
    assert_eq!(state_of(&rt, "square-sum"), CompileState::Compiled);
}

#[test]
fn test_explicit_compile() {
    let rt = runtime(RuntimeConfig::default());
    eval(&rt, "(define (id x) x)");
    let id = rt.lookup("id").unwrap();
    assert_eq!(rt.compile(&id), Some(CompileState::Compiled));
    assert_eq!(rt.compile(&Value::int(3)), None);
}

#[test]
fn test_interpreted_runtime_never_compiles() {
    let rt = runtime(RuntimeConfig::interpreted());
    eval(&rt, "(define (id x) x) (id 1)");
    let id = rt.lookup("id").unwrap();
    assert_eq!(rt.compile(&id), Some(CompileState::Untried));
}

#[test]
fn test_closures_from_compiled_code_are_born_compiled() {
    let rt = runtime(RuntimeConfig::default());
    eval(
        &rt,
        "(define (adder k) (lambda (x) (+ x k)))
         (define add1 (adder 1))",
    );
    assert_eq!(state_of(&rt, "add1"), CompileState::Compiled);
    assert_eq!(eval(&rt, "(add1 41)"), "42");
}

#[test]
fn test_compilation_failure_is_sticky() {
    let rt = runtime(RuntimeConfig::default());
    eval(
        &rt,
        "(define (bump x)
           (define-syntax twice (syntax-rules () ((_ e) (begin e e))))
           (twice (set! x (+ x 1)))
           x)",
    );
    assert_eq!(eval(&rt, "(bump 1)"), "3");
    assert_eq!(state_of(&rt, "bump"), CompileState::Failed);
    assert_eq!(eval(&rt, "(bump 10)"), "12");
    assert_eq!(state_of(&rt, "bump"), CompileState::Failed);
}

// ============================================================================
// Semantics Under Compilation
// ============================================================================

#[test]
fn test_rebound_primitive_is_not_inlined() {
    let code = "
        (define (double x) (* x 2))
        (define (* a b) 'shadowed)
        (double 3)";
    assert_eq!(eval(&runtime(RuntimeConfig::default()), code), "shadowed");
    assert_eq!(eval(&runtime(RuntimeConfig::interpreted()), code), "shadowed");
}

#[test]
fn test_shared_captured_variable() {
    let rt = runtime(RuntimeConfig::default());
    eval(
        &rt,
        "(define (make-account balance)
           (define (deposit n) (set! balance (+ balance n)) balance)
           (define (peek) balance)
           (list deposit peek))
         (define acct (make-account 100))
         ((car acct) 50)",
    );
    assert_eq!(eval(&rt, "((cadr acct))"), "150");
}

#[test]
fn test_error_leaves_procedure_usable() {
    let rt = runtime(RuntimeConfig::default());
    eval(&rt, "(define (head l) (car l))");
    assert!(rt.eval_str("(head '())").is_err());
    assert_eq!(eval(&rt, "(head '(7 8))"), "7");
    assert_eq!(state_of(&rt, "head"), CompileState::Compiled);
}

#[test]
fn test_deep_recursion_falls_back_to_interpreter() {
    let config = RuntimeConfig {
        native_depth_limit: 4,
        ..RuntimeConfig::default()
    };
    let rt = runtime(config);
    eval(&rt, "(define (sum n) (if (= n 0) 0 (+ n (sum (- n 1)))))");
    assert_eq!(eval(&rt, "(sum 50000)"), "1250025000");
    assert_eq!(state_of(&rt, "sum"), CompileState::Compiled);
}

#[test]
fn test_compiled_and_interpreted_procedures_call_each_other() {
    let rt = runtime(RuntimeConfig::default());
    eval(
        &rt,
        "(define (interpreted-twice f x) (call/cc (lambda (k) (f (f x)))))
         (define (compiled-inc x) (+ x 1))",
    );
    assert_eq!(eval(&rt, "(interpreted-twice compiled-inc 40)"), "42");
    assert_eq!(state_of(&rt, "interpreted-twice"), CompileState::Failed);
    assert_eq!(state_of(&rt, "compiled-inc"), CompileState::Compiled);
}

// ============================================================================
// Host Application
// ============================================================================

#[test]
fn test_apply_from_host() {
    let rt = runtime(RuntimeConfig::default());
    eval(&rt, "(define (fact n) (if (= n 0) 1 (* n (fact (- n 1)))))");
    let fact = rt.lookup("fact").unwrap();
    let result = rt.apply(&fact, vec![Value::int(10)]).unwrap();
    assert_eq!(result.to_string(), "3628800");
}

#[test]
fn test_apply_primitive_from_host() {
    let rt = runtime(RuntimeConfig::default());
    let plus = rt.lookup("+").unwrap();
    let result = rt.call(&plus, vec![Value::int(1), Value::int(2)]).unwrap();
    assert_eq!(result.to_string(), "3");
}

#[test]
fn test_host_defined_value_visible_to_code() {
    let rt = runtime(RuntimeConfig::default());
    rt.define("answer", Value::int(42));
    assert_eq!(eval(&rt, "((lambda () answer))"), "42");
}

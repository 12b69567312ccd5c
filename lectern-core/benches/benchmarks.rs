use codspeed_criterion_compat::{Criterion, black_box, criterion_group, criterion_main};
use lectern::{BufferSink, Runtime, RuntimeConfig};
use std::time::Duration;

const FIB: &str = "(define (fib n) (if (< n 2) n (+ (fib (- n 1)) (fib (- n 2)))))";
const LOOP: &str = "(define (count-to n) (let loop ((i 0)) (if (< i n) (loop (+ i 1)) i)))";

fn runtime(config: RuntimeConfig, setup: &str) -> Runtime {
    let rt = Runtime::with_output(config, BufferSink::new());
    rt.eval_str(setup).unwrap();
    rt
}

// ============================================================================
// Reading Benchmarks
// ============================================================================

fn bench_read_small(c: &mut Criterion) {
    let rt = Runtime::with_output(RuntimeConfig::interpreted(), BufferSink::new());
    c.bench_function("read small expr", |b| {
        b.iter(|| black_box(rt.read("(cons 1 2)")))
    });
}

fn bench_read_large_list(c: &mut Criterion) {
    let rt = Runtime::with_output(RuntimeConfig::interpreted(), BufferSink::new());
    let src = format!(
        "(list {})",
        (0..1000).map(|i| i.to_string()).collect::<Vec<_>>().join(" ")
    );
    c.bench_function("read large list (1000 elements)", |b| {
        b.iter(|| black_box(rt.read(&src)))
    });
}

fn bench_read_deep_nesting(c: &mut Criterion) {
    let rt = Runtime::with_output(RuntimeConfig::interpreted(), BufferSink::new());
    let mut src = String::from("1");
    for _ in 0..100 {
        src = format!("(+ {src} 1)");
    }
    c.bench_function("read deep nesting (100 levels)", |b| {
        b.iter(|| black_box(rt.read(&src)))
    });
}

// ============================================================================
// Evaluation Benchmarks
// ============================================================================

fn bench_fib_interpreted(c: &mut Criterion) {
    let rt = runtime(RuntimeConfig::interpreted(), FIB);
    c.bench_function("fib 20 interpreted", |b| {
        b.iter(|| black_box(rt.eval_str("(fib 20)").unwrap()))
    });
}

fn bench_fib_compiled(c: &mut Criterion) {
    let rt = runtime(RuntimeConfig::default(), FIB);
    c.bench_function("fib 20 compiled", |b| {
        b.iter(|| black_box(rt.eval_str("(fib 20)").unwrap()))
    });
}

fn bench_tail_loop_interpreted(c: &mut Criterion) {
    let rt = runtime(RuntimeConfig::interpreted(), LOOP);
    c.bench_function("tail loop 100k interpreted", |b| {
        b.iter(|| black_box(rt.eval_str("(count-to 100000)").unwrap()))
    });
}

fn bench_tail_loop_compiled(c: &mut Criterion) {
    let rt = runtime(RuntimeConfig::default(), LOOP);
    c.bench_function("tail loop 100k compiled", |b| {
        b.iter(|| black_box(rt.eval_str("(count-to 100000)").unwrap()))
    });
}

fn bench_map(c: &mut Criterion) {
    let rt = runtime(RuntimeConfig::default(), "(define nums (iota 1000))");
    c.bench_function("map over 1000 elements", |b| {
        b.iter(|| black_box(rt.eval_str("(map (lambda (x) (* x x)) nums)").unwrap()))
    });
}

fn bench_call_cc_escape(c: &mut Criterion) {
    let rt = runtime(
        RuntimeConfig::default(),
        "(define (find-first pred l)
           (call/cc (lambda (return)
             (for-each (lambda (x) (if (pred x) (return x))) l)
             #f)))
         (define nums (iota 1000))",
    );
    c.bench_function("call/cc escape from for-each", |b| {
        b.iter(|| black_box(rt.eval_str("(find-first (lambda (x) (> x 500)) nums)").unwrap()))
    });
}

fn bench_startup(c: &mut Criterion) {
    c.bench_function("runtime startup with bootstrap", |b| {
        b.iter(|| black_box(Runtime::with_output(RuntimeConfig::default(), BufferSink::new())))
    });
}

criterion_group! {
    name = reading_benches;
    config = Criterion::default()
        .sample_size(100)
        .measurement_time(Duration::from_secs(5));
    targets =
        bench_read_small,
        bench_read_large_list,
        bench_read_deep_nesting
}

criterion_group! {
    name = eval_benches;
    config = Criterion::default()
        .sample_size(20)
        .measurement_time(Duration::from_secs(10));
    targets =
        bench_fib_interpreted,
        bench_fib_compiled,
        bench_tail_loop_interpreted,
        bench_tail_loop_compiled,
        bench_map,
        bench_call_cc_escape,
        bench_startup
}

criterion_main!(reading_benches, eval_benches);

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use marl::evaluator::evaluate;
use marl::lexer::tokenize;
use marl::parser::read_str;
use marl::primitives::build_global_env;

// A reasonably complex input string for benchmarking
const BENCH_INPUT: &str = r#"
(do
  (def! fib (fn* (n)
    ; naive doubly-recursive fibonacci
    (if (< n 2)
        n
        (+ (fib (- n 1))
           (fib (- n 2))))))

  (def! sum-to (fn* (n acc)
    (if (= n 0)
        acc
        (sum-to (- n 1) (+ acc n)))))

  '(1 2 3 "string with spaces" :keyword [4 5 {:a 6}])
  `(a ~(+ 1 2) ~@(list 3 4))
  '("string with escapes \"\n\r\t" true false nil -10 +)
  (fib 10)
  (sum-to 100 0))
"#;

fn bench_reader(c: &mut Criterion) {
    let mut group = c.benchmark_group("Reader");

    group.bench_with_input(
        BenchmarkId::new("tokenize", "complex_input"),
        &BENCH_INPUT,
        |b, input| b.iter(|| tokenize(black_box(input))),
    );

    group.bench_with_input(
        BenchmarkId::new("read_str", "complex_input"),
        &BENCH_INPUT,
        |b, input| b.iter(|| read_str(black_box(input))),
    );

    group.finish();
}

fn bench_evaluator(c: &mut Criterion) {
    let mut group = c.benchmark_group("Evaluator");

    // Parse once; evaluation is re-run against a fresh global environment
    // each iteration so def! does not accumulate state across runs.
    let program = read_str(BENCH_INPUT).expect("benchmark input should parse");
    group.bench_with_input(
        BenchmarkId::new("evaluate", "complex_input"),
        &program,
        |b, program| {
            b.iter(|| {
                let env = build_global_env(&[]);
                evaluate(black_box(program.clone()), env)
            })
        },
    );

    group.finish();
}

criterion_group!(benches, bench_reader, bench_evaluator);
criterion_main!(benches);

use std::time::Duration;

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};

use bencher::lines::lines;
use bencher::report;
use bencher::types::{Baseline, DiffMode, ExecutionResult, ExitState};
use bencher::validate;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// `count` lines of numeric output, e.g. a simulation printing one value per step.
fn numeric_output(count: usize, offset: f64) -> Vec<u8> {
    let mut out = String::new();
    for i in 0..count {
        out.push_str(&format!("{:.9}\n", i as f64 * 0.125 + offset));
    }
    out.into_bytes()
}

fn sample_result() -> ExecutionResult {
    ExecutionResult {
        elapsed: Duration::new(3, 141_592_653),
        user_time: Duration::new(3, 100_000_000),
        system_time: Duration::new(0, 20_000_000),
        max_rss: 65_536,
        minor_faults: 1_024,
        major_faults: 2,
        swaps: 0,
        voluntary_switches: 12,
        involuntary_switches: 340,
        exit: ExitState::Exited(0),
    }
}

// ---------------------------------------------------------------------------
// Benchmarks: validate
// ---------------------------------------------------------------------------

fn bench_textual_exact(c: &mut Criterion) {
    let mut group = c.benchmark_group("textual_exact");

    for &size in &[100, 10_000, 100_000] {
        let output = numeric_output(size, 0.0);
        let baseline = Baseline::new(output.clone(), DiffMode::Textual { tolerance: 0.0 });
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| validate::check(&output, Some(&baseline)));
        });
    }

    group.finish();
}

fn bench_textual_tolerance(c: &mut Criterion) {
    let mut group = c.benchmark_group("textual_tolerance");

    for &size in &[100, 10_000, 100_000] {
        let baseline = Baseline::new(
            numeric_output(size, 0.0),
            DiffMode::Textual { tolerance: 1e-6 },
        );
        // Every line differs textually but passes numerically.
        let output = numeric_output(size, 1e-7);
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| validate::check(&output, Some(&baseline)));
        });
    }

    group.finish();
}

fn bench_binary(c: &mut Criterion) {
    let data = vec![0xa5u8; 1 << 20];
    let baseline = Baseline::new(data.clone(), DiffMode::Binary);

    c.bench_function("binary_1mib", |b| {
        b.iter(|| validate::check(&data, Some(&baseline)));
    });
}

fn bench_leading_number(c: &mut Criterion) {
    let inputs = [
        ("integer", &b"42\n"[..]),
        ("decimal", &b"3.141592653589793\n"[..]),
        ("exponent", &b"  -6.02214076e23 mol\n"[..]),
        ("text", &b"no number here\n"[..]),
    ];

    let mut group = c.benchmark_group("leading_number");
    for (name, input) in &inputs {
        group.bench_with_input(BenchmarkId::new("input", name), input, |b, s| {
            b.iter(|| validate::leading_number(s));
        });
    }
    group.finish();
}

fn bench_lines(c: &mut Criterion) {
    let output = numeric_output(100_000, 0.0);

    c.bench_function("lines_100k", |b| {
        b.iter(|| lines(&output).count());
    });
}

// ---------------------------------------------------------------------------
// Benchmarks: report
// ---------------------------------------------------------------------------

fn bench_format_row(c: &mut Criterion) {
    let result = sample_result();

    c.bench_function("format_row", |b| {
        b.iter(|| report::format_row(&result).unwrap());
    });
}

// ---------------------------------------------------------------------------
// Criterion groups
// ---------------------------------------------------------------------------

criterion_group!(
    benches,
    bench_textual_exact,
    bench_textual_tolerance,
    bench_binary,
    bench_leading_number,
    bench_lines,
    bench_format_row,
);
criterion_main!(benches);

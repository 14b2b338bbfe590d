//! Benchmarks the scoring hot path (C6): preprocessing plus a scoring
//! strategy over a pair of moderately-sized traces, replacing the teacher's
//! `benches/syscall_overhead.rs` (which measured raw tracer throughput, a
//! concern this crate doesn't have).

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use strace_compare::equality::EqualityContext;
use strace_compare::scoring::{JaccardCoefficient, ScoringMethod, Tfidf};
use strace_compare::trace::{ExitCode, Syscall, Trace, TraceLine};

fn synthetic_trace(name: &str, syscalls: usize) -> Trace {
    let mut trace = Trace::new("linux", name, serde_json::Value::Null, "strace");
    for i in 0..syscalls {
        let mut s = Syscall::new(if i % 3 == 0 { "openat" } else { "read" });
        s.exit_code = Some(ExitCode::Number(i as i64));
        trace.push(TraceLine::Syscall(s));
    }
    trace
}

fn bench_jaccard(c: &mut Criterion) {
    let mut source = synthetic_trace("source", 500);
    let mut target = synthetic_trace("target", 480);

    c.bench_function("jaccard_compare_500_syscalls", |b| {
        b.iter(|| {
            let mut pipeline = ScoringMethod::new(EqualityContext::Canonical);
            let result = pipeline
                .compare(&JaccardCoefficient, black_box(&mut source), black_box(&mut target), &[])
                .unwrap();
            black_box(result);
        });
    });
}

fn bench_tfidf(c: &mut Criterion) {
    let mut source = synthetic_trace("source", 500);
    let mut target = synthetic_trace("target", 480);
    let corpus = vec![source.clone(), target.clone()];

    c.bench_function("tfidf_compare_500_syscalls", |b| {
        b.iter(|| {
            let mut pipeline = ScoringMethod::new(EqualityContext::Canonical);
            let result = pipeline
                .compare(&Tfidf, black_box(&mut source), black_box(&mut target), &corpus)
                .unwrap();
            black_box(result);
        });
    });
}

criterion_group!(benches, bench_jaccard, bench_tfidf);
criterion_main!(benches);

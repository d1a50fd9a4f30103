//! Pre-tokenizer split patterns run on `regex` when they can and fall back to `fancy_regex` when
//! they need lookaround.  This benchmark measures what the fallback costs, by running the same
//! lookahead-free GPT-style pattern on both engines over texts of different sizes and scripts.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use pipetok::{Backend, Pattern};

const SPLIT_PATTERN: &str =
    r"'s|'t|'re|'ve|'m|'ll|'d| ?\p{L}+| ?\p{N}+| ?[^\s\p{L}\p{N}]+|\s+";

pub fn criterion_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("Pattern backends");

    let test_cases = vec![
        " ".to_string(),
        "hello world".to_string(),
        "we've got a few contractions here, and some numbers: 1234 5678".to_string(),
        "це ще довший рядок, написаний кирилицею.".to_string(),
        "the quick brown fox jumps over the lazy dog\n\n".repeat(1000),
    ];

    for backend in [Backend::Linear, Backend::Backtracking] {
        let pattern = Pattern::compile_with(SPLIT_PATTERN, backend).unwrap();

        for (i, text) in test_cases.iter().enumerate() {
            group.bench_with_input(BenchmarkId::new(backend.to_string(), i), text, |b, text| {
                b.iter(|| {
                    pattern
                        .find_iter(text)
                        .map(|m| m.unwrap())
                        .filter(|m| !m.is_empty())
                        .count()
                })
            });
        }
    }

    group.finish();
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);

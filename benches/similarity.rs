//! Benchmarks for cache lookup performance
//!
//! This benchmark measures:
//! - LCS similarity scoring across input lengths
//! - Fuzzy lookup over a populated in-memory cache

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use model3d_forge::cache::{similarity, CacheEntry, CacheKeyer, CacheSettings, ResultCache};
use model3d_forge::types::{GenerationKind, QualityParams, ResultRef};

fn prompt_of_len(len: usize, seed: char) -> String {
    "A low poly wooden chair with four legs and a curved back "
        .chars()
        .cycle()
        .take(len.saturating_sub(1))
        .chain(std::iter::once(seed))
        .collect()
}

fn bench_similarity_scoring(c: &mut Criterion) {
    let mut group = c.benchmark_group("similarity_scoring");
    for len in [32usize, 128, 512, 1024] {
        let a = prompt_of_len(len, 'a');
        let b = prompt_of_len(len, 'b');
        group.throughput(Throughput::Bytes(len as u64));
        group.bench_with_input(BenchmarkId::new("lcs_ratio", len), &(a, b), |bench, (a, b)| {
            bench.iter(|| similarity(black_box(a), black_box(b)))
        });
    }
    group.finish();
}

fn bench_fuzzy_lookup(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().expect("tokio runtime");
    let keyer = CacheKeyer::new();
    let mut group = c.benchmark_group("fuzzy_lookup");

    for entries in [10usize, 100, 500] {
        let cache = ResultCache::in_memory(CacheSettings::default().with_max_entries(entries * 2));
        runtime.block_on(async {
            for i in 0..entries {
                let prompt = format!("A stylized model of object number {} on a plinth", i);
                let key = keyer.key(&prompt, GenerationKind::Text, &QualityParams::default());
                cache
                    .put(CacheEntry::new(
                        key.key,
                        key.fingerprint,
                        prompt,
                        GenerationKind::Text,
                        ResultRef::new(format!("https://cdn.example.com/{}.obj", i)),
                    ))
                    .await;
            }
        });

        let query = "A stylized model of object number 7 on a plinth!";
        group.throughput(Throughput::Elements(entries as u64));
        group.bench_with_input(BenchmarkId::new("find_similar", entries), &cache, |b, cache| {
            b.to_async(&runtime)
                .iter(|| async { cache.find_similar(black_box(query), GenerationKind::Text, None, None).await })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_similarity_scoring, bench_fuzzy_lookup);
criterion_main!(benches);

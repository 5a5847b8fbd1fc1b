//! Benchmark for drop resolution performance.
//!
//! Run with: cargo bench --package magicfind_core --bench resolve_benchmark

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use magicfind_core::integration::{DropTable, WeightedEntry};
use magicfind_core::loot::DropResolver;
use magicfind_core::luck_cache::LuckCache;
use magicfind_core::memory::MemoryCatalog;
use magicfind_core::parser::{parse_line, QuantitySpec};
use magicfind_core::{ActorId, DropConfig};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

fn create_test_catalog() -> MemoryCatalog {
    let mut catalog = MemoryCatalog::new();
    for material in ["DIAMOND", "EMERALD", "BONE", "ROTTEN_FLESH", "ENDER_PEARL"] {
        catalog.add_material(material, 64);
    }
    catalog.add_table(DropTable {
        name: "boss_table".to_string(),
        entries: vec![
            WeightedEntry::new("DIAMOND", 0.05, QuantitySpec::range(1, 2)),
            WeightedEntry::new("EMERALD", 0.2, QuantitySpec::Fixed(1)),
            WeightedEntry::new("BONE", 1.0, QuantitySpec::range(2, 6)),
        ],
    });
    catalog
}

fn create_test_lines() -> Vec<String> {
    [
        "ROTTEN_FLESH 1-3 1.0",
        "BONE 1 to 2 0.5",
        "DIAMOND 1 0.01",
        "ENDER_PEARL 1 0.0005",
        "boss_table 1-2 0.25",
    ]
    .iter()
    .map(|l| (*l).to_string())
    .collect()
}

fn benchmark_parse_line(c: &mut Criterion) {
    let catalog = create_test_catalog();

    c.bench_function("parse_line", |b| {
        b.iter(|| black_box(parse_line(black_box("GOLD_NUGGET 1 to 3 0.25"), &catalog)));
    });
}

fn benchmark_single_kill(c: &mut Criterion) {
    let catalog = create_test_catalog();
    let config = DropConfig::default();
    let lines = create_test_lines();
    let resolver = DropResolver::new(&catalog, &catalog, &config, 150.0);
    let mut rng = ChaCha8Rng::seed_from_u64(42);

    c.bench_function("single_kill_resolution", |b| {
        b.iter(|| black_box(resolver.resolve_lines(black_box(&lines), &mut rng)));
    });
}

fn benchmark_hundred_thousand_kills(c: &mut Criterion) {
    let catalog = create_test_catalog();
    let config = DropConfig::default();
    let lines = create_test_lines();
    let resolver = DropResolver::new(&catalog, &catalog, &config, 150.0);

    let mut group = c.benchmark_group("kills");
    group.throughput(Throughput::Elements(100_000));
    group.sample_size(10);

    group.bench_function("100k_kills", |b| {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        b.iter(|| {
            for _ in 0..100_000 {
                black_box(resolver.resolve_lines(&lines, &mut rng));
            }
        });
    });

    group.finish();
}

fn benchmark_luck_cache(c: &mut Criterion) {
    let cache = LuckCache::new();
    let actors: Vec<ActorId> = (0..1000).map(|i| ActorId::new(format!("actor-{i}"))).collect();
    for (luck, actor) in (0u32..).zip(&actors) {
        cache.set(actor, f64::from(luck));
    }

    c.bench_function("luck_cache_hit", |b| {
        let mut i = 0usize;
        b.iter(|| {
            i = (i + 1) % actors.len();
            black_box(cache.get(&actors[i]))
        });
    });
}

criterion_group!(
    benches,
    benchmark_parse_line,
    benchmark_single_kill,
    benchmark_hundred_thousand_kills,
    benchmark_luck_cache
);
criterion_main!(benches);

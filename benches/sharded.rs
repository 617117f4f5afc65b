use std::sync::{Arc, Barrier};
use std::thread;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use evictkit::builder::ShardedOptions;
use evictkit::sharded::ShardedCache;
use evictkit::traits::Cache;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const OPS_PER_THREAD: u64 = 10_000;

fn build(shards: usize) -> Arc<ShardedCache<u64, u64>> {
    Arc::new(
        ShardedOptions::new(65_536)
            .min_shards(shards)
            .hashed_keys(0)
            .lru_shards()
            .build()
            .unwrap(),
    )
}

fn run_mixed(cache: &Arc<ShardedCache<u64, u64>>, threads: usize) {
    let barrier = Arc::new(Barrier::new(threads));
    let handles: Vec<_> = (0..threads)
        .map(|t| {
            let cache = Arc::clone(cache);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let mut rng = StdRng::seed_from_u64(t as u64);
                barrier.wait();
                for _ in 0..OPS_PER_THREAD {
                    let key = rng.gen_range(0..131_072u64);
                    if rng.gen_bool(0.8) {
                        let _ = std::hint::black_box(cache.get(&key));
                    } else {
                        let _ = cache.put(key, key);
                    }
                }
            })
        })
        .collect();
    for handle in handles {
        let _ = handle.join();
    }
}

fn bench_shard_scaling(c: &mut Criterion) {
    let threads = 4;
    let mut group = c.benchmark_group("sharded_mixed_4_threads");
    group.throughput(Throughput::Elements(OPS_PER_THREAD * threads as u64));
    for shards in [1usize, 4, 16, 64] {
        let cache = build(shards);
        group.bench_with_input(BenchmarkId::from_parameter(shards), &shards, |b, _| {
            b.iter(|| run_mixed(&cache, threads))
        });
    }
    group.finish();
}

fn bench_single_thread_routing(c: &mut Criterion) {
    let cache = build(16);
    for k in 0..65_536u64 {
        cache.put(k, k).unwrap();
    }
    c.bench_function("sharded_get_hit", |b| {
        let mut key = 0u64;
        b.iter(|| {
            key = (key + 1) & 0xFFFF;
            std::hint::black_box(cache.get(&key).unwrap())
        })
    });
}

criterion_group!(benches, bench_shard_scaling, bench_single_thread_routing);
criterion_main!(benches);

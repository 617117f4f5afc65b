// ==============================================
// SHARDED CACHE CONCURRENCY TESTS (integration)
// ==============================================
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

use evictkit::builder::ShardedOptions;
use evictkit::sharded::ShardedCache;
use evictkit::traits::{Cache, EvictReason};

fn modulo_cache(capacity: usize, shards: usize) -> ShardedCache<u64, String> {
    ShardedOptions::new(capacity)
        .min_shards(shards)
        .shard_fn(|k: &u64| *k as usize)
        .lru_shards()
        .build()
        .unwrap()
}

mod routing {
    use super::*;

    #[test]
    fn sequential_keys_round_trip_across_eight_shards() {
        let cache = modulo_cache(80, 8);
        assert_eq!(cache.shard_count(), 8);

        for k in 0..10u64 {
            cache.put(k, format!("value-{k}")).unwrap();
        }
        for k in 0..10u64 {
            assert_eq!(cache.get(&k).unwrap(), Some(format!("value-{k}")));
            assert_eq!(cache.shard_index(&k), (k % 8) as usize);
        }
        assert_eq!(cache.size(), 10);
        assert_eq!(cache.capacity(), 80);
    }

    #[test]
    fn eviction_is_local_to_a_shard() {
        // Two shards of one entry each; keys 0 and 2 share shard 0.
        let cache = modulo_cache(2, 2);
        cache.put(0, "zero".into()).unwrap();
        cache.put(1, "one".into()).unwrap();
        cache.put(2, "two".into()).unwrap();

        assert_eq!(cache.get(&0).unwrap(), None);
        assert_eq!(cache.get(&1).unwrap(), Some("one".to_string()));
        assert_eq!(cache.get(&2).unwrap(), Some("two".to_string()));
    }
}

mod threads {
    use super::*;

    #[test]
    fn disjoint_writers_then_readers() {
        let cache = Arc::new(modulo_cache(4_096, 16));
        let num_threads = 8u64;
        let per_thread = 200u64;
        let barrier = Arc::new(Barrier::new(num_threads as usize));

        let handles: Vec<_> = (0..num_threads)
            .map(|t| {
                let cache = Arc::clone(&cache);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    for i in 0..per_thread {
                        let key = t * per_thread + i;
                        cache.put(key, format!("{t}:{i}")).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(cache.size(), (num_threads * per_thread) as usize);
        for t in 0..num_threads {
            for i in 0..per_thread {
                let key = t * per_thread + i;
                assert_eq!(cache.get(&key).unwrap(), Some(format!("{t}:{i}")));
            }
        }
    }

    #[test]
    fn mixed_workload_respects_capacity() {
        let cache = Arc::new(modulo_cache(64, 8));
        let barrier = Arc::new(Barrier::new(4));

        let handles: Vec<_> = (0..4u64)
            .map(|t| {
                let cache = Arc::clone(&cache);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    for i in 0..1_000u64 {
                        let key = (t * 7 + i) % 200;
                        match i % 3 {
                            0 => cache.put(key, key.to_string()).unwrap(),
                            1 => {
                                if let Some(v) = cache.get(&key).unwrap() {
                                    assert_eq!(v, key.to_string());
                                }
                            },
                            _ => {
                                cache.delete(&key).unwrap();
                            },
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert!(cache.size() <= cache.capacity());
    }

    #[test]
    fn shutdown_races_with_callers() {
        let evicted = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&evicted);
        let cache: Arc<ShardedCache<u64, u64>> = Arc::new(
            ShardedOptions::new(1_024)
                .min_shards(8)
                .hashed_keys(7)
                .lru_shards_with(move |reason, _, _| {
                    if reason == EvictReason::Shutdown {
                        counter.fetch_add(1, Ordering::SeqCst);
                    }
                    Ok(())
                })
                .build()
                .unwrap(),
        );
        for k in 0..100 {
            cache.put(k, k).unwrap();
        }

        let barrier = Arc::new(Barrier::new(5));
        let workers: Vec<_> = (0..4u64)
            .map(|t| {
                let cache = Arc::clone(&cache);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    for i in 0..10_000u64 {
                        // Every call either completes or reports shutdown.
                        match cache.get(&(i % 100)) {
                            Ok(Some(v)) => assert_eq!(v, i % 100),
                            Ok(None) => {},
                            Err(err) => {
                                assert!(err.is_shutdown());
                                return;
                            },
                        }
                        if let Err(err) = cache.put(1_000 + t, i) {
                            assert!(err.is_shutdown());
                            return;
                        }
                    }
                })
            })
            .collect();

        barrier.wait();
        cache.shutdown();
        for worker in workers {
            worker.join().unwrap();
        }

        assert!(cache.is_shutdown());
        assert_eq!(cache.size(), 0);
        assert!(cache.get(&1).unwrap_err().is_shutdown());
        // The 100 seeded keys plus at most one key per worker.
        let reported = evicted.load(Ordering::SeqCst);
        assert!((100..=104).contains(&reported), "reported {reported}");
    }

    #[test]
    fn concurrent_shutdown_is_idempotent() {
        let cache = Arc::new(modulo_cache(64, 4));
        for k in 0..32 {
            cache.put(k, k.to_string()).unwrap();
        }

        let barrier = Arc::new(Barrier::new(4));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    cache.shutdown();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert!(cache.is_shutdown());
        assert_eq!(cache.capacity(), 0);
        assert!(cache.reset().unwrap_err().is_shutdown());
    }
}

// ==============================================
// EXPIRY WORKER TESTS (integration)
// ==============================================
//
// Drives the real background worker with short bucket widths. Fired
// buckets are forwarded over a channel so tests wait with a timeout rather
// than sleeping a fixed amount.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, SystemTime};

use crossbeam_channel::{unbounded, Receiver};

use evictkit::builder::{ExpiryOptions, LruOptions};
use evictkit::expiry::ExpiryMap;
use evictkit::traits::Cache;

const WIDTH: Duration = Duration::from_millis(50);
const PATIENCE: Duration = Duration::from_secs(5);

fn forwarding_map() -> (ExpiryMap<u64>, Receiver<(SystemTime, Vec<u64>)>) {
    let (tx, rx) = unbounded();
    let map = ExpiryOptions::new(WIDTH)
        .on_expiry(move |expired| {
            let mut keys: Vec<u64> = expired.iter().copied().collect();
            keys.sort_unstable();
            let _ = tx.send((expired.deadline(), keys));
        })
        .build()
        .unwrap();
    (map, rx)
}

mod firing {
    use super::*;

    #[test]
    fn past_deadline_fires_promptly() {
        let (map, rx) = forwarding_map();
        let handle = map.register(9, SystemTime::now() - Duration::from_secs(1));

        let (deadline, keys) = rx.recv_timeout(PATIENCE).unwrap();
        assert_eq!(deadline, handle.deadline());
        assert_eq!(keys, vec![9]);
        map.shutdown();
    }

    #[test]
    fn same_bucket_keys_fire_together() {
        let (map, rx) = forwarding_map();
        let at = SystemTime::now() + Duration::from_millis(100);
        let a = map.register(1, at);
        let b = map.register(2, at);
        assert_eq!(a, b);

        let (_, keys) = rx.recv_timeout(PATIENCE).unwrap();
        assert_eq!(keys, vec![1, 2]);
        assert!(SystemTime::now() >= a.deadline());
        map.shutdown();
    }

    #[test]
    fn buckets_fire_in_deadline_order() {
        let (map, rx) = forwarding_map();
        let now = SystemTime::now();
        // Registered latest first so the worker must re-arm earlier.
        map.register(3, now + Duration::from_millis(400));
        map.register(2, now + Duration::from_millis(200));
        map.register(1, now + Duration::from_millis(50));

        let fired: Vec<_> = (0..3)
            .map(|_| rx.recv_timeout(PATIENCE).unwrap())
            .collect();
        let keys: Vec<_> = fired.iter().map(|(_, keys)| keys.clone()).collect();
        assert_eq!(keys, vec![vec![1], vec![2], vec![3]]);
        assert!(fired.windows(2).all(|w| w[0].0 < w[1].0));
        assert!(map.is_empty());
        map.shutdown();
    }

    #[test]
    fn panicking_callback_keeps_worker_alive() {
        let (tx, rx) = unbounded();
        let map = ExpiryOptions::<u64>::new(WIDTH)
            .on_expiry(move |expired| {
                if expired.contains(&0) {
                    panic!("bad bucket");
                }
                let _ = tx.send(expired.len());
            })
            .build()
            .unwrap();

        let now = SystemTime::now();
        map.register(0, now - Duration::from_secs(1));
        map.register(5, now + Duration::from_millis(150));

        assert_eq!(rx.recv_timeout(PATIENCE).unwrap(), 1);
        map.shutdown();
    }
}

mod cancellation {
    use super::*;

    #[test]
    fn unregistered_key_never_fires() {
        let (map, rx) = forwarding_map();
        let at = SystemTime::now() + Duration::from_millis(100);
        let handle = map.register(1, at);
        map.register(2, at);
        assert!(map.unregister(handle, &1));
        assert!(!map.unregister(handle, &1));

        let (_, keys) = rx.recv_timeout(PATIENCE).unwrap();
        assert_eq!(keys, vec![2]);
        map.shutdown();
    }

    #[test]
    fn emptied_bucket_is_dropped() {
        let (map, rx) = forwarding_map();
        let now = SystemTime::now();
        let early = map.register(1, now + Duration::from_millis(60));
        map.register(2, now + Duration::from_millis(300));
        assert!(map.unregister(early, &1));
        assert_eq!(map.len(), 1);

        let (deadline, keys) = rx.recv_timeout(PATIENCE).unwrap();
        assert_eq!(keys, vec![2]);
        assert!(deadline > early.deadline());
        assert!(rx.try_recv().is_err());
        map.shutdown();
    }
}

mod lifecycle {
    use super::*;

    #[test]
    fn shutdown_is_idempotent_and_discards_pending() {
        let (map, rx) = forwarding_map();
        map.register(1, SystemTime::now() + Duration::from_secs(3_600));
        map.shutdown();
        map.shutdown();

        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
    }

    #[test]
    fn drop_stops_worker() {
        let (map, rx) = forwarding_map();
        map.register(1, SystemTime::now() + Duration::from_secs(3_600));
        drop(map);

        // The worker owned the only sender; it is gone once the thread exits.
        assert!(rx.recv_timeout(PATIENCE).is_err());
        assert!(rx.is_empty());
    }

    #[test]
    fn callback_may_shut_down_its_own_map() {
        let (tx, rx) = unbounded();
        let slot: Arc<parking_lot::Mutex<Option<Arc<ExpiryMap<u64>>>>> =
            Arc::new(parking_lot::Mutex::new(None));
        let slot_cb = Arc::clone(&slot);
        let map = Arc::new(
            ExpiryOptions::<u64>::new(WIDTH)
                .on_expiry(move |_| {
                    if let Some(map) = slot_cb.lock().take() {
                        map.shutdown();
                    }
                    let _ = tx.send(());
                })
                .build()
                .unwrap(),
        );
        *slot.lock() = Some(Arc::clone(&map));
        map.register(1, SystemTime::now() - Duration::from_secs(1));

        rx.recv_timeout(PATIENCE).unwrap();
        map.shutdown();
    }

    #[test]
    fn racing_shutdowns_both_wait_for_worker_exit() {
        let (entered_tx, entered_rx) = unbounded();
        let finished = Arc::new(AtomicBool::new(false));
        let finished_cb = Arc::clone(&finished);
        let map = Arc::new(
            ExpiryOptions::<u64>::new(WIDTH)
                .on_expiry(move |_| {
                    let _ = entered_tx.send(());
                    thread::sleep(Duration::from_millis(400));
                    finished_cb.store(true, Ordering::SeqCst);
                })
                .build()
                .unwrap(),
        );
        map.register(1, SystemTime::now() - Duration::from_secs(1));
        entered_rx.recv_timeout(PATIENCE).unwrap();

        let first = Arc::clone(&map);
        let first_caller = thread::spawn(move || first.shutdown());
        // let the first caller take the worker handle
        thread::sleep(Duration::from_millis(50));
        map.shutdown();
        assert!(finished.load(Ordering::SeqCst));

        first_caller.join().unwrap();
        assert!(finished.load(Ordering::SeqCst));
    }
}

mod composition {
    use super::*;

    #[test]
    fn expiry_deletes_from_lru_cache() {
        let cache = Arc::new(LruOptions::<u64, String>::new(16).build().unwrap());
        let (tx, rx) = unbounded();
        let target = Arc::clone(&cache);
        let map = ExpiryOptions::<u64>::new(WIDTH)
            .on_expiry(move |expired| {
                for key in expired {
                    let _ = target.delete(key);
                }
                let _ = tx.send(());
            })
            .build()
            .unwrap();

        cache.put(1, "short".into()).unwrap();
        cache.put(2, "long".into()).unwrap();
        map.register(1, SystemTime::now() + Duration::from_millis(50));
        map.register(2, SystemTime::now() + Duration::from_secs(3_600));

        rx.recv_timeout(PATIENCE).unwrap();
        assert_eq!(cache.get(&1).unwrap(), None);
        assert_eq!(cache.get(&2).unwrap(), Some("long".to_string()));
        map.shutdown();
    }
}

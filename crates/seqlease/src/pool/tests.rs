use crate::{BoxError, ConnectionManager, Error, FnManager, Pool, PoolConfig, TimeSource};
use core::time::Duration;
use portable_atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::collections::HashSet;
use std::sync::{Arc, Barrier, Mutex};
use std::thread::scope;

#[derive(Default)]
struct MockTime {
    millis: AtomicU64,
}

impl MockTime {
    fn advance(&self, by: u64) {
        self.millis.fetch_add(by, Ordering::SeqCst);
    }
}

impl TimeSource for MockTime {
    fn current_millis(&self) -> u64 {
        self.millis.load(Ordering::SeqCst)
    }
}

/// Hands out sequential connection ids and tracks how many are alive.
#[derive(Default)]
struct CountingManager {
    next_id: AtomicU64,
    live: AtomicUsize,
    disconnected: Mutex<Vec<u64>>,
    rejected: Mutex<HashSet<u64>>,
    fail_connect: AtomicBool,
    fail_disconnect: AtomicBool,
}

impl CountingManager {
    fn disconnected(&self) -> Vec<u64> {
        self.disconnected.lock().unwrap().clone()
    }
}

impl ConnectionManager for CountingManager {
    type Connection = u64;
    type Error = BoxError;

    fn connect(&self) -> Result<u64, BoxError> {
        if self.fail_connect.load(Ordering::SeqCst) {
            return Err("connection refused".into());
        }
        self.live.fetch_add(1, Ordering::SeqCst);
        Ok(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    fn disconnect(&self, conn: u64) -> Result<(), BoxError> {
        self.live.fetch_sub(1, Ordering::SeqCst);
        self.disconnected.lock().unwrap().push(conn);
        if self.fail_disconnect.load(Ordering::SeqCst) {
            return Err("reset by peer".into());
        }
        Ok(())
    }

    fn check(&self, conn: &u64, _idle_for: Duration) -> Result<(), BoxError> {
        if self.rejected.lock().unwrap().contains(conn) {
            return Err("stale".into());
        }
        Ok(())
    }
}

fn pool(config: PoolConfig) -> Pool<CountingManager, Arc<MockTime>> {
    Pool::with_clock(
        CountingManager::default(),
        config,
        Arc::new(MockTime::default()),
    )
}

#[test]
fn returned_connection_is_reused() {
    let pool = pool(PoolConfig::default());

    let conn = pool.get().unwrap();
    pool.put(conn, false).unwrap();

    assert_eq!(pool.get().unwrap(), conn);
    assert_eq!(pool.active_count(), 1);
}

#[test]
fn most_recently_returned_goes_out_first() {
    let pool = pool(PoolConfig::default());

    let a = pool.get().unwrap();
    let b = pool.get().unwrap();
    pool.put(a, false).unwrap();
    pool.put(b, false).unwrap();

    assert_eq!(pool.get().unwrap(), b);
    assert_eq!(pool.get().unwrap(), a);
    assert_eq!(pool.active_count(), 2);
}

#[test]
fn three_concurrent_gets_with_two_slots() {
    let pool = pool(PoolConfig::default().with_max_active(2));
    let barrier = Barrier::new(3);

    let results = scope(|s| {
        let handles: Vec<_> = (0..3)
            .map(|_| {
                s.spawn(|| {
                    barrier.wait();
                    pool.get()
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .collect::<Vec<_>>()
    });

    let ok = results.iter().filter(|r| r.is_ok()).count();
    let exhausted = results
        .iter()
        .filter(|r| matches!(r, Err(Error::PoolExhausted { max_active: 2 })))
        .count();
    assert_eq!((ok, exhausted), (2, 1));
    assert_eq!(pool.active_count(), 2);
}

#[test]
fn force_close_destroys_connection() {
    let pool = pool(PoolConfig::default());

    let conn = pool.get().unwrap();
    pool.put(conn, true).unwrap();

    assert_eq!(pool.active_count(), 0);
    assert_eq!(pool.idle_count(), 0);
    assert_eq!(pool.manager().disconnected(), vec![conn]);
}

#[test]
fn idle_overflow_evicts_least_recently_used() {
    let pool = pool(PoolConfig::default().with_max_idle(2));

    let conns: Vec<_> = (0..3).map(|_| pool.get().unwrap()).collect();
    for &conn in &conns {
        pool.put(conn, false).unwrap();
    }

    assert_eq!(pool.idle_count(), 2);
    assert_eq!(pool.active_count(), 2);
    assert_eq!(pool.manager().disconnected(), vec![conns[0]]);
    assert_eq!(pool.get().unwrap(), conns[2]);
}

#[test]
fn putting_foreign_connections_keeps_counts_sane() {
    let pool = pool(PoolConfig::default().with_max_idle(1));

    // Opened behind the pool's back, so never counted as active.
    let a = pool.manager().connect().unwrap();
    let b = pool.manager().connect().unwrap();
    pool.put(a, false).unwrap();
    pool.put(b, false).unwrap();

    assert_eq!(pool.active_count(), 0);
    assert_eq!(pool.idle_count(), 1);
    assert_eq!(pool.manager().disconnected(), vec![a]);

    pool.release().unwrap();
    assert_eq!(pool.active_count(), 0);
    assert_eq!(pool.idle_count(), 0);
}

#[test]
fn idle_timeout_evicts_on_next_get() {
    let clock = Arc::new(MockTime::default());
    let pool = Pool::with_clock(
        CountingManager::default(),
        PoolConfig::default().with_idle_timeout(Duration::from_millis(100)),
        Arc::clone(&clock),
    );

    let conn = pool.get().unwrap();
    pool.put(conn, false).unwrap();

    clock.advance(100);
    assert_eq!(pool.get().unwrap(), conn, "exactly at the timeout is fresh");
    pool.put(conn, false).unwrap();

    clock.advance(101);
    let fresh = pool.get().unwrap();
    assert_ne!(fresh, conn);
    assert_eq!(pool.manager().disconnected(), vec![conn]);
    assert_eq!(pool.active_count(), 1);
}

#[test]
fn pruning_stops_at_first_fresh_connection() {
    let clock = Arc::new(MockTime::default());
    let pool = Pool::with_clock(
        CountingManager::default(),
        PoolConfig::default().with_idle_timeout(Duration::from_millis(100)),
        Arc::clone(&clock),
    );

    let old = pool.get().unwrap();
    let young = pool.get().unwrap();
    pool.put(old, false).unwrap();
    clock.advance(50);
    pool.put(young, false).unwrap();
    clock.advance(70);

    assert_eq!(pool.get().unwrap(), young);
    assert_eq!(pool.manager().disconnected(), vec![old]);
    assert_eq!(pool.idle_count(), 0);
}

#[test]
fn zero_idle_timeout_never_evicts() {
    let clock = Arc::new(MockTime::default());
    let pool = Pool::with_clock(
        CountingManager::default(),
        PoolConfig::default().with_idle_timeout(Duration::ZERO),
        Arc::clone(&clock),
    );

    let conn = pool.get().unwrap();
    pool.put(conn, false).unwrap();
    clock.advance(u64::MAX / 2);

    assert_eq!(pool.get().unwrap(), conn);
}

#[test]
fn rejected_idle_connection_is_replaced() {
    let pool = pool(PoolConfig::default());

    let a = pool.get().unwrap();
    let b = pool.get().unwrap();
    pool.put(a, false).unwrap();
    pool.put(b, false).unwrap();
    pool.manager().rejected.lock().unwrap().insert(b);

    assert_eq!(pool.get().unwrap(), a);
    assert_eq!(pool.manager().disconnected(), vec![b]);
    assert_eq!(pool.active_count(), 1);
}

#[test]
fn failed_connect_releases_its_slot() {
    let pool = pool(PoolConfig::default().with_max_active(1));

    pool.manager().fail_connect.store(true, Ordering::SeqCst);
    assert!(matches!(pool.get(), Err(Error::Connect(_))));
    assert_eq!(pool.active_count(), 0);

    pool.manager().fail_connect.store(false, Ordering::SeqCst);
    assert!(pool.get().is_ok());
    assert_eq!(pool.active_count(), 1);
}

#[test]
fn failed_disconnect_still_frees_slot() {
    let pool = pool(PoolConfig::default().with_max_active(1));

    let conn = pool.get().unwrap();
    pool.manager().fail_disconnect.store(true, Ordering::SeqCst);
    assert!(matches!(pool.put(conn, true), Err(Error::Disconnect(_))));
    assert_eq!(pool.active_count(), 0);

    assert!(pool.get().is_ok());
}

#[test]
fn release_closes_idle_and_rejects_gets() {
    let pool = pool(PoolConfig::default());

    let idle = pool.get().unwrap();
    let held = pool.get().unwrap();
    pool.put(idle, false).unwrap();

    pool.release().unwrap();
    assert!(pool.is_closed());
    assert_eq!(pool.manager().disconnected(), vec![idle]);
    assert_eq!(pool.active_count(), 1);
    assert!(matches!(pool.get(), Err(Error::PoolClosed)));

    // Returning to a closed pool destroys the connection.
    pool.put(held, false).unwrap();
    assert_eq!(pool.active_count(), 0);
    assert_eq!(pool.manager().disconnected(), vec![idle, held]);

    pool.release().unwrap();
}

#[test]
fn zero_max_active_is_unbounded() {
    let pool = pool(PoolConfig::default().with_max_active(0));

    let conns: Vec<_> = (0..100).map(|_| pool.get().unwrap()).collect();
    assert_eq!(pool.active_count(), 100);
    for conn in conns {
        pool.put(conn, true).unwrap();
    }
    assert_eq!(pool.active_count(), 0);
}

#[test]
fn dropping_pool_closes_idle_connections() {
    let live = Arc::new(AtomicUsize::new(0));
    let manager = {
        let (opened, closed) = (Arc::clone(&live), Arc::clone(&live));
        FnManager::new(
            move || Ok(opened.fetch_add(1, Ordering::SeqCst)),
            move |_| {
                closed.fetch_sub(1, Ordering::SeqCst);
                Ok(())
            },
        )
    };

    {
        let pool = Pool::new(manager, PoolConfig::default());
        let a = pool.get().unwrap();
        let b = pool.get().unwrap();
        pool.put(a, false).unwrap();
        pool.put(b, false).unwrap();
        assert_eq!(live.load(Ordering::SeqCst), 2);
    }

    assert_eq!(live.load(Ordering::SeqCst), 0);
}

#[test]
fn fn_manager_check_is_optional() {
    let manager = FnManager::new(|| Ok(7_u32), |_| Ok(()));
    assert!(manager.check(&7, Duration::from_secs(1)).is_ok());

    let manager = manager.with_check(|conn, _| {
        if *conn == 7 {
            Err("unhealthy".into())
        } else {
            Ok(())
        }
    });
    assert!(manager.check(&7, Duration::ZERO).is_err());
}

#[test]
fn bounds_hold_under_contention() {
    const THREADS: usize = 8;
    const ROUNDS: usize = 500;
    const MAX_ACTIVE: usize = 4;
    const MAX_IDLE: usize = 2;

    let pool = Pool::with_clock(
        CountingManager::default(),
        PoolConfig::default()
            .with_max_active(MAX_ACTIVE)
            .with_max_idle(MAX_IDLE),
        Arc::new(MockTime::default()),
    );

    scope(|s| {
        for t in 0..THREADS {
            let pool = &pool;
            s.spawn(move || {
                for round in 0..ROUNDS {
                    match pool.get() {
                        Ok(conn) => {
                            assert!(pool.active_count() <= MAX_ACTIVE);
                            pool.put(conn, (round + t) % 7 == 0).unwrap();
                            assert!(pool.idle_count() <= MAX_IDLE);
                        }
                        Err(Error::PoolExhausted { .. }) => std::thread::yield_now(),
                        Err(e) => panic!("unexpected error: {e}"),
                    }
                }
            });
        }
    });

    assert!(pool.active_count() <= MAX_IDLE);
    assert_eq!(pool.active_count(), pool.idle_count());
    assert_eq!(
        pool.manager().live.load(Ordering::SeqCst),
        pool.active_count()
    );
}

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use floodgate::ratelimit::{
    AdmissionPolicy, AdmissionRegistry, AdmissionRules, FixedWindowCounter, InitialFill,
    LeakyBucket, ManualClock, PolicySpec, TokenBucket,
};

const THREADS: usize = 16;
const CALLS_PER_THREAD: usize = 250;

/// Hammer `limiter` from many threads and return how many calls were admitted.
fn hammer(limiter: &dyn AdmissionPolicy) -> usize {
    let admitted = AtomicUsize::new(0);

    std::thread::scope(|s| {
        for _ in 0..THREADS {
            s.spawn(|| {
                for _ in 0..CALLS_PER_THREAD {
                    if limiter.allow() {
                        admitted.fetch_add(1, Ordering::Relaxed);
                    }
                }
            });
        }
    });

    admitted.into_inner()
}

#[test]
fn token_bucket_without_refill_admits_exactly_capacity() {
    for capacity in [1.0, 7.0, 100.0, 1000.0] {
        let bucket = TokenBucket::new();
        bucket.configure(0.0, capacity).unwrap();

        assert_eq!(hammer(&bucket), capacity as usize);
        assert_eq!(bucket.tokens(), 0.0);
    }
}

#[test]
fn token_bucket_starting_empty_without_refill_admits_nothing() {
    let bucket = TokenBucket::new();
    bucket.configure_with(0.0, 50.0, InitialFill::Empty).unwrap();

    assert_eq!(hammer(&bucket), 0);
}

#[test]
fn leaky_bucket_under_frozen_clock_admits_exactly_capacity() {
    let clock = ManualClock::new();
    let bucket = LeakyBucket::with_clock(clock);
    bucket.configure(1.0, 64.0).unwrap();

    assert_eq!(hammer(&bucket), 64);
    assert_eq!(bucket.level(), 64.0);
}

#[test]
fn fixed_window_under_frozen_clock_never_exceeds_rate() {
    let clock = ManualClock::new();
    let counter = FixedWindowCounter::with_clock(clock.clone());
    counter.configure(100, Duration::from_secs(1)).unwrap();

    // The first window saturates one short of the rate
    assert_eq!(hammer(&counter), 99);

    clock.advance(Duration::from_secs(1));
    assert_eq!(hammer(&counter), 100);
    assert!(counter.count() <= 100);
}

#[test]
fn registry_shared_across_threads_keeps_keys_isolated() {
    let mut rules = AdmissionRules::new();
    rules
        .insert(
            "api",
            PolicySpec::TokenBucket {
                fill_rate: 0.0,
                capacity: 10.0,
                initial: InitialFill::Full,
            },
        )
        .unwrap();
    let registry = Arc::new(AdmissionRegistry::new(&rules).unwrap());

    let per_key: Vec<usize> = std::thread::scope(|s| {
        let handles: Vec<_> = (0..4)
            .map(|k| {
                let registry = Arc::clone(&registry);
                s.spawn(move || {
                    let key = format!("client-{}", k);
                    let admitted = AtomicUsize::new(0);
                    std::thread::scope(|inner| {
                        for _ in 0..4 {
                            inner.spawn(|| {
                                for _ in 0..20 {
                                    if registry.check("api", &key).unwrap().allowed {
                                        admitted.fetch_add(1, Ordering::Relaxed);
                                    }
                                }
                            });
                        }
                    });
                    admitted.into_inner()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(per_key, vec![10, 10, 10, 10]);
    assert_eq!(registry.limiter_count(), 4);
}

#[test]
fn idle_sweeps_never_grant_extra_admissions() {
    let mut rules = AdmissionRules::new();
    rules
        .insert(
            "quota",
            PolicySpec::TokenBucket {
                fill_rate: 0.0,
                capacity: 100.0,
                initial: InitialFill::Full,
            },
        )
        .unwrap();
    // Every new key sweeps the map while other threads decide on "hot"
    let registry = AdmissionRegistry::new(&rules)
        .unwrap()
        .with_sweep_interval(1);
    let admitted = AtomicUsize::new(0);

    std::thread::scope(|s| {
        for t in 0..THREADS {
            let registry = &registry;
            let admitted = &admitted;
            s.spawn(move || {
                for i in 0..CALLS_PER_THREAD {
                    if registry.check("quota", "hot").unwrap().allowed {
                        admitted.fetch_add(1, Ordering::Relaxed);
                    }
                    registry.check("quota", &format!("{}-{}", t, i)).unwrap();
                }
            });
        }
    });

    assert_eq!(admitted.into_inner(), 100);
}

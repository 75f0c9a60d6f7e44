//! Contention stress across the primitives

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use native_threads::{
    create_condition, create_mutex, create_semaphore, create_thread, ConditionAttributes,
    Thread, ThreadOptions,
};

const THREADS: usize = 4;
const ITERATIONS: u64 = 2_000;

fn run_all(threads: &mut [Box<dyn Thread>]) {
    for thread in threads.iter_mut() {
        assert!(thread.start(), "{:?}", thread.last_error());
    }
    for thread in threads.iter_mut() {
        assert!(thread.wait(), "{:?}", thread.last_error());
    }
}

#[test]
fn test_mutex_serializes_increments() {
    let mutex = create_mutex(false);
    // Read-modify-write split into two steps so lost updates show up.
    let counter = Arc::new(AtomicU64::new(0));

    let mut threads: Vec<Box<dyn Thread>> = (0..THREADS)
        .map(|i| {
            let mutex = mutex.clone();
            let counter = counter.clone();
            create_thread(
                Arc::new(move || {
                    for _ in 0..ITERATIONS {
                        let _guard = mutex.scoped();
                        let value = counter.load(Ordering::Relaxed);
                        counter.store(value + 1, Ordering::Relaxed);
                    }
                }),
                ThreadOptions::new().name(format!("incr-{i}")),
            )
        })
        .collect();

    run_all(&mut threads);
    assert_eq!(counter.load(Ordering::SeqCst), THREADS as u64 * ITERATIONS);
}

#[test]
fn test_recursive_mutex_under_contention() {
    let mutex = create_mutex(true);
    let counter = Arc::new(AtomicU64::new(0));

    let mut threads: Vec<Box<dyn Thread>> = (0..THREADS)
        .map(|_| {
            let mutex = mutex.clone();
            let counter = counter.clone();
            create_thread(
                Arc::new(move || {
                    for _ in 0..ITERATIONS / 4 {
                        let _outer = mutex.scoped();
                        let _inner = mutex.scoped();
                        let value = counter.load(Ordering::Relaxed);
                        counter.store(value + 1, Ordering::Relaxed);
                    }
                }),
                ThreadOptions::default(),
            )
        })
        .collect();

    run_all(&mut threads);
    assert_eq!(counter.load(Ordering::SeqCst), THREADS as u64 * (ITERATIONS / 4));
}

/// Bounded queue of capacity one guarded by a mutex and two conditions.
#[test]
fn test_producer_consumer_with_conditions() {
    let mutex = create_mutex(false);
    let not_empty = create_condition(ConditionAttributes::default());
    let not_full = create_condition(ConditionAttributes::default());
    let slot = Arc::new(AtomicU64::new(0));
    let sum = Arc::new(AtomicU64::new(0));

    let mut producer = {
        let (mutex, not_empty, not_full, slot) =
            (mutex.clone(), not_empty.clone(), not_full.clone(), slot.clone());
        create_thread(
            Arc::new(move || {
                for item in 1..=ITERATIONS {
                    let _guard = mutex.scoped();
                    while slot.load(Ordering::Relaxed) != 0 {
                        not_full.wait(&*mutex, 0);
                    }
                    slot.store(item, Ordering::Relaxed);
                    not_empty.signal(false);
                }
            }),
            ThreadOptions::new().name("producer"),
        )
    };

    let mut consumer = {
        let (mutex, not_empty, not_full, slot, sum) = (
            mutex.clone(),
            not_empty.clone(),
            not_full.clone(),
            slot.clone(),
            sum.clone(),
        );
        create_thread(
            Arc::new(move || {
                for _ in 0..ITERATIONS {
                    let _guard = mutex.scoped();
                    while slot.load(Ordering::Relaxed) == 0 {
                        not_empty.wait(&*mutex, 0);
                    }
                    sum.fetch_add(slot.swap(0, Ordering::Relaxed), Ordering::Relaxed);
                    not_full.signal(false);
                }
            }),
            ThreadOptions::new().name("consumer"),
        )
    };

    assert!(consumer.start());
    assert!(producer.start());
    assert!(producer.wait());
    assert!(consumer.wait());
    assert_eq!(sum.load(Ordering::SeqCst), ITERATIONS * (ITERATIONS + 1) / 2);
}

#[test]
fn test_semaphore_ping_pong() {
    let ping = create_semaphore(1);
    let pong = create_semaphore(0);
    let turns = Arc::new(AtomicUsize::new(0));
    const ROUNDS: usize = 500;

    let player = |mine: Arc<dyn native_threads::Semaphore>,
                  theirs: Arc<dyn native_threads::Semaphore>,
                  turns: Arc<AtomicUsize>,
                  name: &str| {
        create_thread(
            Arc::new(move || {
                for _ in 0..ROUNDS {
                    assert!(mine.lock_wait());
                    turns.fetch_add(1, Ordering::SeqCst);
                    assert!(theirs.release());
                }
            }),
            ThreadOptions::new().name(name),
        )
    };

    let mut threads = vec![
        player(ping.clone(), pong.clone(), turns.clone(), "ping"),
        player(pong.clone(), ping.clone(), turns.clone(), "pong"),
    ];
    run_all(&mut threads);

    assert_eq!(turns.load(Ordering::SeqCst), 2 * ROUNDS);
    assert_eq!(ping.value(), 1);
    assert_eq!(pong.value(), 0);
}

#[test]
fn test_semaphore_limits_concurrency() {
    const PERMITS: u32 = 2;
    let semaphore = create_semaphore(PERMITS);
    let inside = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let mut threads: Vec<Box<dyn Thread>> = (0..THREADS * 2)
        .map(|_| {
            let (semaphore, inside, peak) = (semaphore.clone(), inside.clone(), peak.clone());
            create_thread(
                Arc::new(move || {
                    for _ in 0..50 {
                        assert!(semaphore.lock_wait());
                        let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        native_threads::yield_thread();
                        inside.fetch_sub(1, Ordering::SeqCst);
                        assert!(semaphore.release());
                    }
                }),
                ThreadOptions::default(),
            )
        })
        .collect();

    run_all(&mut threads);
    assert!(peak.load(Ordering::SeqCst) <= PERMITS as usize);
    assert_eq!(semaphore.value(), PERMITS);
}

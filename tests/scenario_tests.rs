//! Multi-threaded blocking scenarios for mutexes, semaphores and conditions

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::time::{Duration, Instant};

use native_threads::{
    create_condition, create_mutex, create_semaphore, create_thread, sleep_ms,
    ConditionAttributes, SyncError, Thread, ThreadOptions, WaitClock,
};

/// Long enough for a thread that is going to make progress to do so.
const SETTLE_MS: u64 = 100;

fn init_logging() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn spawn<F>(name: &str, f: F) -> Box<dyn Thread>
where
    F: Fn() + Send + Sync + 'static,
{
    let mut thread = create_thread(Arc::new(f), ThreadOptions::new().name(name));
    assert!(thread.start(), "failed to start {name}: {:?}", thread.last_error());
    thread
}

/// Polls `done` until it holds or `timeout` passes.
fn wait_until(timeout: Duration, done: impl Fn() -> bool) -> bool {
    let start = Instant::now();
    while !done() {
        if start.elapsed() > timeout {
            return false;
        }
        sleep_ms(1);
    }
    true
}

#[test]
fn test_semaphore_release_frees_one_waiter_at_a_time() {
    init_logging();
    let semaphore = create_semaphore(0);
    let acquired = Arc::new(AtomicUsize::new(0));

    let mut threads = Vec::new();
    for i in 0..2 {
        let semaphore = semaphore.clone();
        let acquired = acquired.clone();
        threads.push(spawn(&format!("sem-waiter-{i}"), move || {
            if semaphore.lock_wait() {
                acquired.fetch_add(1, Ordering::SeqCst);
            }
        }));
    }

    sleep_ms(SETTLE_MS);
    assert_eq!(acquired.load(Ordering::SeqCst), 0);

    assert!(semaphore.release());
    assert!(wait_until(Duration::from_secs(5), || acquired.load(Ordering::SeqCst) == 1));
    sleep_ms(SETTLE_MS);
    assert_eq!(acquired.load(Ordering::SeqCst), 1, "one release freed two waiters");

    assert!(semaphore.release());
    assert!(wait_until(Duration::from_secs(5), || acquired.load(Ordering::SeqCst) == 2));

    for thread in &mut threads {
        assert!(thread.wait());
    }
    assert_eq!(semaphore.value(), 0);
}

#[test]
fn test_mutex_blocks_second_thread_until_release() {
    let mutex = create_mutex(false);
    let acquired = Arc::new(AtomicBool::new(false));

    assert!(mutex.lock_wait());

    let mut contender = {
        let mutex = mutex.clone();
        let acquired = acquired.clone();
        spawn("mutex-b", move || {
            if mutex.lock_wait() {
                acquired.store(true, Ordering::SeqCst);
                mutex.release();
            }
        })
    };

    sleep_ms(SETTLE_MS);
    assert!(!acquired.load(Ordering::SeqCst));

    assert!(mutex.release());
    assert!(contender.wait());
    assert!(acquired.load(Ordering::SeqCst));
}

#[test]
fn test_recursive_mutex_needs_matching_releases() {
    let mutex = create_mutex(true);
    let acquired = Arc::new(AtomicBool::new(false));

    assert!(mutex.lock_wait());
    assert!(mutex.lock_wait());

    let mut contender = {
        let mutex = mutex.clone();
        let acquired = acquired.clone();
        spawn("recursive-b", move || {
            if mutex.lock_wait() {
                acquired.store(true, Ordering::SeqCst);
                mutex.release();
            }
        })
    };

    assert!(mutex.release());
    sleep_ms(SETTLE_MS);
    assert!(!acquired.load(Ordering::SeqCst), "acquired after a single release");

    assert!(mutex.release());
    assert!(contender.wait());
    assert!(acquired.load(Ordering::SeqCst));
}

#[test]
fn test_non_recursive_mutex_self_deadlocks() {
    let mutex = create_mutex(false);
    let (tx, rx) = mpsc::channel();

    // The harness thread is expected to hang forever; it is abandoned.
    std::thread::spawn(move || {
        assert!(mutex.lock_wait());
        tx.send("first").unwrap();
        mutex.lock_wait();
        let _ = tx.send("second");
    });

    assert_eq!(rx.recv_timeout(Duration::from_secs(5)), Ok("first"));
    assert!(rx.recv_timeout(Duration::from_millis(300)).is_err());
}

#[test]
fn test_signal_one_wakes_exactly_one_and_all_wakes_rest() {
    init_logging();
    const WAITERS: usize = 3;

    let mutex = create_mutex(false);
    let condition = create_condition(ConditionAttributes::default());
    let parked = Arc::new(AtomicUsize::new(0));
    let woken = Arc::new(AtomicUsize::new(0));

    let mut threads = Vec::new();
    for i in 0..WAITERS {
        let mutex = mutex.clone();
        let condition = condition.clone();
        let parked = parked.clone();
        let woken = woken.clone();
        threads.push(spawn(&format!("cond-waiter-{i}"), move || {
            assert!(mutex.lock_wait());
            parked.fetch_add(1, Ordering::SeqCst);
            if condition.wait(&*mutex, 0) {
                woken.fetch_add(1, Ordering::SeqCst);
            }
            mutex.release();
        }));
    }

    // Once the count is complete and we hold the mutex, every waiter has
    // registered with the condition and released the mutex inside wait().
    assert!(wait_until(Duration::from_secs(5), || {
        mutex.lock_wait();
        let all_parked = parked.load(Ordering::SeqCst) == WAITERS;
        mutex.release();
        all_parked
    }));
    assert_eq!(condition.waiting(), WAITERS);

    assert!(condition.signal(false));
    assert!(wait_until(Duration::from_secs(5), || woken.load(Ordering::SeqCst) == 1));
    sleep_ms(SETTLE_MS);
    assert_eq!(woken.load(Ordering::SeqCst), 1, "signal(false) woke more than one");
    assert_eq!(condition.waiting(), WAITERS - 1);

    assert!(condition.signal(true));
    assert!(wait_until(Duration::from_secs(5), || {
        woken.load(Ordering::SeqCst) == WAITERS
    }));

    for thread in &mut threads {
        assert!(thread.wait());
    }
    assert_eq!(condition.waiting(), 0);
}

#[test]
fn test_condition_wait_times_out_and_reacquires() {
    for clock in [WaitClock::Monotonic, WaitClock::Realtime] {
        let mutex = create_mutex(false);
        let condition = create_condition(ConditionAttributes::new().clock(clock));

        assert!(mutex.lock_wait());
        let start = Instant::now();
        assert!(!condition.wait(&*mutex, 100));
        let elapsed = start.elapsed();

        assert!(elapsed >= Duration::from_millis(100), "returned early: {elapsed:?}");
        assert!(elapsed < Duration::from_secs(5), "returned late: {elapsed:?}");
        assert_eq!(condition.last_error(), Some(SyncError::TimedOut { millis: 100 }));

        // Still held: another thread cannot take it.
        let contender = mutex.clone();
        assert!(!std::thread::spawn(move || contender.lock_try()).join().unwrap());
        assert!(mutex.release());
    }
}

#[test]
fn test_timed_wait_succeeds_when_signalled_in_time() {
    let mutex = create_mutex(false);
    let condition = create_condition(ConditionAttributes::default());
    let ready = Arc::new(AtomicBool::new(false));

    let mut signaller = {
        let mutex = mutex.clone();
        let condition = condition.clone();
        let ready = ready.clone();
        spawn("signaller", move || {
            sleep_ms(50);
            mutex.lock_wait();
            ready.store(true, Ordering::SeqCst);
            condition.signal(false);
            mutex.release();
        })
    };

    assert!(mutex.lock_wait());
    while !ready.load(Ordering::SeqCst) {
        assert!(condition.wait(&*mutex, 10_000), "{:?}", condition.last_error());
    }
    assert_eq!(condition.last_error(), None);
    assert!(mutex.release());
    assert!(signaller.wait());
}

#[test]
fn test_signal_between_release_and_block_is_not_lost() {
    // The signaller can only observe `parked` after the waiter released the
    // mutex inside wait(); it signals immediately, racing the waiter's block.
    for _ in 0..50 {
        let mutex = create_mutex(false);
        let condition = create_condition(ConditionAttributes::default());
        let parked = Arc::new(AtomicBool::new(false));

        let mut signaller = {
            let mutex = mutex.clone();
            let condition = condition.clone();
            let parked = parked.clone();
            spawn("racer", move || {
                loop {
                    mutex.lock_wait();
                    let ready = parked.load(Ordering::SeqCst);
                    mutex.release();
                    if ready {
                        break;
                    }
                    native_threads::yield_thread();
                }
                condition.signal(false);
            })
        };

        assert!(mutex.lock_wait());
        parked.store(true, Ordering::SeqCst);
        assert!(condition.wait(&*mutex, 5_000), "wakeup lost: {:?}", condition.last_error());
        assert!(mutex.release());
        assert!(signaller.wait());
    }
}

#[test]
fn test_condition_with_recursive_mutex() {
    let mutex = create_mutex(true);
    let condition = create_condition(ConditionAttributes::default());

    assert!(mutex.lock_wait());
    assert!(!condition.wait(&*mutex, 20));
    assert_eq!(condition.last_error(), Some(SyncError::TimedOut { millis: 20 }));
    assert!(mutex.release());
    assert!(mutex.lock_try());
    assert!(mutex.release());
}

use std::time::Duration;

use crate::sys::{DefaultPlatform, Platform};

/// Give up the rest of the calling thread's time slice.
pub fn yield_thread() {
    DefaultPlatform::yield_now();
}

/// Suspend the calling thread for at least `ms` milliseconds.
pub fn sleep_ms(ms: u64) {
    DefaultPlatform::sleep(Duration::from_millis(ms));
}

/// OS identifier of the calling thread, stable for the thread's lifetime.
pub fn current_thread_id() -> u64 {
    DefaultPlatform::current_thread_id()
}

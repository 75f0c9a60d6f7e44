//! Platform abstraction layer.
//!
//! Exactly one backend is compiled per target and exported as
//! [`DefaultPlatform`]. Everything outside this module talks to the trait
//! objects returned by the factory functions and never names a backend type.

use std::sync::Arc;
use std::time::Duration;

use crate::condition::{Condition, ConditionAttributes, WaitClock};
use crate::error::SyncResult;
use crate::mutex::Mutex;
use crate::runnable::Runnable;
use crate::semaphore::Semaphore;
use crate::thread::{Thread, ThreadOptions};

/// Platform backend.
///
/// Constructors never fail outright: a native creation failure produces an
/// object whose operations all return `false` and whose `last_error()`
/// explains why.
pub trait Platform {
    /// Backend name for diagnostics.
    const NAME: &'static str;

    type Mutex: Mutex + 'static;
    type Semaphore: Semaphore + 'static;
    type Condition: Condition + 'static;
    type Thread: Thread + 'static;

    fn mutex(recursive: bool) -> Self::Mutex;

    fn semaphore(initial: u32) -> Self::Semaphore;

    fn condition(attributes: ConditionAttributes) -> Self::Condition;

    fn thread(runnable: Arc<dyn Runnable>, options: ThreadOptions) -> Self::Thread;

    /// Identifier of the calling OS thread.
    fn current_thread_id() -> u64;

    fn yield_now();

    fn sleep(duration: Duration);
}

/// A native lock paired with a native condition variable.
///
/// This is the atomic release-and-block primitive conditions are built on:
/// `wait` must release the lock and block as one step.
pub trait Parker: Send + Sync + Sized {
    fn new(clock: WaitClock) -> SyncResult<Self>;

    fn lock(&self) -> SyncResult<()>;

    fn unlock(&self) -> SyncResult<()>;

    /// Atomically unlock, block, and relock. Must be called with the lock
    /// held. Returns on notification, timeout or spuriously; callers
    /// recheck their own state.
    fn wait(&self, timeout: Option<Duration>) -> SyncResult<()>;

    fn notify_one(&self) -> SyncResult<()>;

    fn notify_all(&self) -> SyncResult<()>;
}

/// Holds a [`Parker`]'s lock until [`unlock`](ParkerGuard::unlock) or drop.
///
/// A thread cancelled inside [`Parker::wait`] leaves it through a forced
/// unwind with the lock reacquired; the drop releases it on that path.
pub(crate) struct ParkerGuard<'a, P: Parker> {
    parker: &'a P,
    locked: bool,
}

impl<'a, P: Parker> ParkerGuard<'a, P> {
    pub(crate) fn lock(parker: &'a P) -> SyncResult<Self> {
        parker.lock()?;
        Ok(Self {
            parker,
            locked: true,
        })
    }

    /// Release with the unlock error reported.
    pub(crate) fn unlock(mut self) -> SyncResult<()> {
        self.locked = false;
        self.parker.unlock()
    }
}

impl<P: Parker> Drop for ParkerGuard<'_, P> {
    fn drop(&mut self) {
        if self.locked {
            if let Err(error) = self.parker.unlock() {
                tracing::warn!(%error, "parker unlock failed during unwind");
            }
        }
    }
}

cfg_if::cfg_if! {
    if #[cfg(unix)] {
        pub mod unix;
        pub use unix::PosixPlatform as DefaultPlatform;
    } else if #[cfg(windows)] {
        pub mod windows;
        pub use windows::Win32Platform as DefaultPlatform;
    } else {
        compile_error!("native-threads supports unix and windows targets only");
    }
}

/// Create a mutex on the active backend.
pub fn create_mutex(recursive: bool) -> Arc<dyn Mutex> {
    Arc::new(DefaultPlatform::mutex(recursive))
}

/// Create a semaphore holding `initial` permits.
pub fn create_semaphore(initial: u32) -> Arc<dyn Semaphore> {
    Arc::new(DefaultPlatform::semaphore(initial))
}

pub fn create_condition(attributes: ConditionAttributes) -> Arc<dyn Condition> {
    Arc::new(DefaultPlatform::condition(attributes))
}

/// Create a stopped thread handle; call [`Thread::start`] to run it.
pub fn create_thread(runnable: Arc<dyn Runnable>, options: ThreadOptions) -> Box<dyn Thread> {
    Box::new(DefaultPlatform::thread(runnable, options))
}

pub fn backend_name() -> &'static str {
    DefaultPlatform::NAME
}

//! Native thread handles running a shared [`Runnable`].

use std::sync::Arc;

use portable_atomic::{AtomicU8, Ordering};

use crate::error::{LastError, SyncError};
use crate::runnable::Runnable;

/// Smallest stack a thread is created with.
pub const MIN_STACK_SIZE: usize = 16 * 1024;

/// Lifecycle of a thread handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ThreadState {
    /// Never started, or the last start attempt failed
    Created = 0,
    /// Native thread exists and `run()` has not returned
    Running = 1,
    /// `run()` returned; the native thread has not been reaped yet
    Finished = 2,
    /// Reaped by `wait()`, or terminated by `stop()` and confirmed gone
    Stopped = 3,
    /// `stop()` requested cancellation but the native thread may still be
    /// executing; it becomes `Stopped` once `wait()` reaps it
    Stopping = 4,
}

impl ThreadState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => ThreadState::Running,
            2 => ThreadState::Finished,
            3 => ThreadState::Stopped,
            4 => ThreadState::Stopping,
            _ => ThreadState::Created,
        }
    }
}

/// Handle owning one native thread at a time.
///
/// Lifecycle operations take `&mut self`, so a handle cannot be started
/// twice concurrently or waited on from two threads.
///
/// A handle that reached [`Finished`](ThreadState::Finished) or
/// [`Stopped`](ThreadState::Stopped) may be started again; it spawns a new
/// native thread running the same Runnable.
pub trait Thread: Send {
    /// Create the native thread and let it run.
    ///
    /// Returns `true` without doing anything if the thread is already
    /// running. If a previous `stop()` is still pending, the old thread is
    /// waited for first. Creation failure returns `false` and is described
    /// by [`last_error`](Thread::last_error).
    fn start(&mut self) -> bool;

    /// Terminate the native thread.
    ///
    /// Returns whether the OS termination call succeeded, or `true` if no
    /// thread was running.
    ///
    /// On Win32 the thread is gone when this returns and the state is
    /// [`Stopped`](ThreadState::Stopped). On POSIX cancellation is deferred:
    /// the state becomes [`Stopping`](ThreadState::Stopping) and the thread
    /// keeps executing until it reaches a cancellation point (a blocking
    /// wait on a [`Condition`](crate::Condition) or
    /// [`Semaphore`](crate::Semaphore), [`sleep_ms`](crate::sleep_ms)) or
    /// returns. A thread spinning without one, or blocked in
    /// [`Mutex::lock_wait`](crate::Mutex::lock_wait), never stops, and a
    /// later `wait()` blocks until it does.
    ///
    /// # Safety
    ///
    /// The target gets no chance to clean up its own state: locks it holds
    /// stay locked and memory it owns may leak. On POSIX its Rust frames are
    /// torn down by a forced unwind, which runs destructors, so primitives
    /// of this crate it was blocked in stay usable. On Win32 nothing runs:
    /// a waiter killed inside [`Condition::wait`](crate::Condition::wait)
    /// keeps its place in the wait queue, and the next `signal(false)` may
    /// be spent on it instead of a live waiter. The caller must ensure the
    /// Runnable is in a state where that is acceptable, e.g. parked in a
    /// blocking call while owning no resources.
    unsafe fn stop(&mut self) -> bool;

    /// Block until `run()` has returned, or until a previous `stop()` has
    /// taken effect. Returns `true` immediately if no thread was started.
    fn wait(&mut self) -> bool;

    fn state(&self) -> ThreadState;

    /// Whether a native thread may still be executing the Runnable.
    fn is_running(&self) -> bool {
        matches!(self.state(), ThreadState::Running | ThreadState::Stopping)
    }

    fn last_error(&self) -> Option<SyncError>;

    fn name(&self) -> Option<&str>;
}

/// Creation options for a [`Thread`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ThreadOptions {
    name: Option<String>,
    stack_size: Option<usize>,
}

impl ThreadOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Name the thread. Applied to the OS thread where the platform allows
    /// it and used in log output everywhere.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Request a stack of at least `size` bytes, floored at
    /// [`MIN_STACK_SIZE`].
    pub fn stack_size(mut self, size: usize) -> Self {
        self.stack_size = Some(size.max(MIN_STACK_SIZE));
        self
    }

    pub fn thread_name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// `None` means the platform default.
    pub fn requested_stack_size(&self) -> Option<usize> {
        self.stack_size
    }
}

/// State shared by every backend's thread handle.
pub(crate) struct ThreadCore {
    pub(crate) runnable: Arc<dyn Runnable>,
    pub(crate) options: ThreadOptions,
    pub(crate) status: Arc<AtomicU8>,
    pub(crate) error: LastError,
}

impl ThreadCore {
    pub(crate) fn new(runnable: Arc<dyn Runnable>, options: ThreadOptions) -> Self {
        Self {
            runnable,
            options,
            status: Arc::new(AtomicU8::new(ThreadState::Created as u8)),
            error: LastError::new(),
        }
    }

    pub(crate) fn state(&self) -> ThreadState {
        ThreadState::from_u8(self.status.load(Ordering::Acquire))
    }

    pub(crate) fn set_state(&self, state: ThreadState) {
        self.status.store(state as u8, Ordering::Release);
    }

    /// Package what the new native thread needs and mark the handle running.
    pub(crate) fn launch(&self) -> ThreadLaunch {
        self.set_state(ThreadState::Running);
        ThreadLaunch {
            runnable: self.runnable.clone(),
            status: self.status.clone(),
            name: self.options.name.clone(),
        }
    }

    pub(crate) fn label(&self) -> &str {
        self.options.thread_name().unwrap_or("<unnamed>")
    }
}

/// Everything moved onto the new native thread.
pub(crate) struct ThreadLaunch {
    runnable: Arc<dyn Runnable>,
    status: Arc<AtomicU8>,
    pub(crate) name: Option<String>,
}

impl ThreadLaunch {
    /// Body of every native thread: run, then flag completion unless the
    /// handle was stopped in the meantime.
    pub(crate) fn execute(self) {
        tracing::trace!(thread = self.name.as_deref().unwrap_or("<unnamed>"), "thread entered");
        self.runnable.run();
        let _ = self.status.compare_exchange(
            ThreadState::Running as u8,
            ThreadState::Finished as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    /// Records an abnormal exit when `execute` could not complete.
    pub(crate) fn mark_finished(status: &AtomicU8) {
        let _ = status.compare_exchange(
            ThreadState::Running as u8,
            ThreadState::Finished as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    pub(crate) fn status(&self) -> Arc<AtomicU8> {
        self.status.clone()
    }
}

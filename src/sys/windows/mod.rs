//! Win32 backend on top of kernel32 objects.

use std::sync::Arc;
use std::time::Duration;

use crate::condition::{ConditionAttributes, ParkingCondition};
use crate::error::SyncError;
use crate::runnable::Runnable;
use crate::thread::ThreadOptions;

use super::Platform;

mod ffi;
mod mutex;
mod parker;
mod semaphore;
mod thread;

pub use mutex::Win32Mutex;
pub use parker::Win32Parker;
pub use semaphore::Win32Semaphore;
pub use thread::Win32Thread;

pub struct Win32Platform;

impl Platform for Win32Platform {
    const NAME: &'static str = "win32";

    type Mutex = Win32Mutex;
    type Semaphore = Win32Semaphore;
    type Condition = ParkingCondition<Win32Parker>;
    type Thread = Win32Thread;

    fn mutex(recursive: bool) -> Self::Mutex {
        Win32Mutex::new(recursive)
    }

    fn semaphore(initial: u32) -> Self::Semaphore {
        Win32Semaphore::new(initial)
    }

    fn condition(attributes: ConditionAttributes) -> Self::Condition {
        ParkingCondition::new(attributes)
    }

    fn thread(runnable: Arc<dyn Runnable>, options: ThreadOptions) -> Self::Thread {
        Win32Thread::new(runnable, options)
    }

    fn current_thread_id() -> u64 {
        // SAFETY: no preconditions.
        u64::from(unsafe { ffi::GetCurrentThreadId() })
    }

    fn yield_now() {
        // SAFETY: no preconditions.
        unsafe {
            ffi::SwitchToThread();
        }
    }

    fn sleep(duration: Duration) {
        // SAFETY: no preconditions.
        unsafe { ffi::Sleep(millis(Some(duration))) }
    }
}

/// Error for the calling thread's `GetLastError()` value.
pub(crate) fn last_os_error(op: &'static str) -> SyncError {
    // SAFETY: no preconditions.
    let code = unsafe { ffi::GetLastError() };
    SyncError::os(op, code as i32)
}

/// Converts a timeout to Win32 milliseconds, rounding up so short waits do
/// not turn into polls. `None` means forever.
pub(crate) fn millis(timeout: Option<Duration>) -> ffi::DWORD {
    match timeout {
        None => ffi::INFINITE,
        Some(timeout) => {
            let millis = (timeout.as_nanos() + 999_999) / 1_000_000;
            millis.min(u128::from(ffi::INFINITE - 1)) as ffi::DWORD
        }
    }
}

/// Owned kernel object handle, closed on drop.
pub(crate) struct OwnedHandle(ffi::HANDLE);

// SAFETY: kernel object handles are process-wide and usable from any thread.
unsafe impl Send for OwnedHandle {}
unsafe impl Sync for OwnedHandle {}

impl OwnedHandle {
    /// Wraps the result of a `Create*` call, which returns null on failure.
    pub(crate) fn from_raw(handle: ffi::HANDLE, op: &'static str) -> Result<Self, SyncError> {
        if handle.is_null() {
            Err(last_os_error(op))
        } else {
            Ok(Self(handle))
        }
    }

    pub(crate) fn raw(&self) -> ffi::HANDLE {
        self.0
    }
}

impl Drop for OwnedHandle {
    fn drop(&mut self) {
        // SAFETY: the handle is owned and closed exactly once.
        unsafe {
            ffi::CloseHandle(self.0);
        }
    }
}

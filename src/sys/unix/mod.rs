//! POSIX backend on top of pthreads.

use std::sync::Arc;
use std::time::Duration;

use crate::condition::{ConditionAttributes, ParkingCondition};
use crate::error::{SyncError, SyncResult};
use crate::runnable::Runnable;
use crate::thread::ThreadOptions;

use super::Platform;

mod mutex;
mod parker;
mod semaphore;
mod thread;

pub use mutex::PosixMutex;
pub use parker::PosixParker;
pub use semaphore::PosixSemaphore;
pub use thread::PosixThread;

// Cancellation points the crate blocks in. A pending cancel leaves them
// through a forced unwind, so they are declared with the "C-unwind" ABI
// instead of being taken from libc; that keeps the destructors of the
// calling frames on the unwind path.
extern "C-unwind" {
    pub(crate) fn pthread_cond_wait(
        cond: *mut libc::pthread_cond_t,
        mutex: *mut libc::pthread_mutex_t,
    ) -> libc::c_int;

    pub(crate) fn pthread_cond_timedwait(
        cond: *mut libc::pthread_cond_t,
        mutex: *mut libc::pthread_mutex_t,
        abstime: *const libc::timespec,
    ) -> libc::c_int;

    fn nanosleep(request: *const libc::timespec, remaining: *mut libc::timespec) -> libc::c_int;
}

pub struct PosixPlatform;

impl Platform for PosixPlatform {
    const NAME: &'static str = "posix";

    type Mutex = PosixMutex;
    type Semaphore = PosixSemaphore;
    type Condition = ParkingCondition<PosixParker>;
    type Thread = PosixThread;

    fn mutex(recursive: bool) -> Self::Mutex {
        PosixMutex::new(recursive)
    }

    fn semaphore(initial: u32) -> Self::Semaphore {
        PosixSemaphore::new(initial)
    }

    fn condition(attributes: ConditionAttributes) -> Self::Condition {
        ParkingCondition::new(attributes)
    }

    fn thread(runnable: Arc<dyn Runnable>, options: ThreadOptions) -> Self::Thread {
        PosixThread::new(runnable, options)
    }

    fn current_thread_id() -> u64 {
        // SAFETY: pthread_self has no preconditions.
        unsafe { libc::pthread_self() as usize as u64 }
    }

    fn yield_now() {
        // SAFETY: sched_yield has no preconditions.
        unsafe {
            libc::sched_yield();
        }
    }

    fn sleep(duration: Duration) {
        // SAFETY: an all-zero timespec is a valid value.
        let mut request: libc::timespec = unsafe { core::mem::zeroed() };
        request.tv_sec = libc::time_t::try_from(duration.as_secs()).unwrap_or(libc::time_t::MAX);
        request.tv_nsec = duration.subsec_nanos() as libc::c_long;

        loop {
            // SAFETY: as above.
            let mut remaining: libc::timespec = unsafe { core::mem::zeroed() };
            // SAFETY: both pointers reference live timespec values.
            let rc = unsafe { nanosleep(&request, &mut remaining) };
            if rc == 0 || errno() != libc::EINTR {
                break;
            }
            request = remaining;
        }
    }
}

/// Maps a pthread return code to a result.
pub(crate) fn check(op: &'static str, rc: libc::c_int) -> SyncResult<()> {
    if rc == 0 {
        Ok(())
    } else {
        Err(SyncError::os(op, rc))
    }
}

fn errno() -> libc::c_int {
    std::io::Error::last_os_error().raw_os_error().unwrap_or(0)
}

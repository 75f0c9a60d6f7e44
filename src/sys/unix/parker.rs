use core::cell::UnsafeCell;
use core::mem::MaybeUninit;
use std::time::Duration;

use crate::condition::WaitClock;
use crate::error::{SyncError, SyncResult};
use crate::sys::Parker;

use super::{check, pthread_cond_timedwait, pthread_cond_wait};

/// `pthread_mutex_t` + `pthread_cond_t` pair.
pub struct PosixParker {
    mutex: Box<UnsafeCell<libc::pthread_mutex_t>>,
    cond: Box<UnsafeCell<libc::pthread_cond_t>>,
    clock: libc::clockid_t,
}

// SAFETY: both native objects are boxed (stable addresses) and made for
// cross-thread use.
unsafe impl Send for PosixParker {}
unsafe impl Sync for PosixParker {}

#[cfg(not(target_vendor = "apple"))]
fn native_clock(clock: WaitClock) -> libc::clockid_t {
    match clock {
        WaitClock::Monotonic => libc::CLOCK_MONOTONIC,
        WaitClock::Realtime => libc::CLOCK_REALTIME,
    }
}

// Apple has no pthread_condattr_setclock; timed waits use the wall clock.
#[cfg(target_vendor = "apple")]
fn native_clock(_clock: WaitClock) -> libc::clockid_t {
    libc::CLOCK_REALTIME
}

impl PosixParker {
    fn init_cond(clock: libc::clockid_t) -> SyncResult<Box<UnsafeCell<libc::pthread_cond_t>>> {
        let cond = Box::new(UnsafeCell::new(libc::PTHREAD_COND_INITIALIZER));
        let mut attr = MaybeUninit::<libc::pthread_condattr_t>::uninit();
        // SAFETY: `attr` is initialized before use and destroyed once on
        // every path after that; `cond` is a boxed, unshared object.
        unsafe {
            check(
                "pthread_condattr_init",
                libc::pthread_condattr_init(attr.as_mut_ptr()),
            )?;

            #[cfg(not(target_vendor = "apple"))]
            {
                let rc = libc::pthread_condattr_setclock(attr.as_mut_ptr(), clock);
                if rc != 0 {
                    libc::pthread_condattr_destroy(attr.as_mut_ptr());
                    return Err(SyncError::os("pthread_condattr_setclock", rc));
                }
            }
            #[cfg(target_vendor = "apple")]
            let _ = clock;

            let rc = libc::pthread_cond_init(cond.get(), attr.as_ptr());
            libc::pthread_condattr_destroy(attr.as_mut_ptr());
            check("pthread_cond_init", rc)?;
        }
        Ok(cond)
    }

    /// Absolute time `timeout` from now on the parker's clock.
    fn deadline(&self, timeout: Duration) -> SyncResult<libc::timespec> {
        // SAFETY: an all-zero timespec is a valid value.
        let mut now: libc::timespec = unsafe { core::mem::zeroed() };
        // SAFETY: `now` is a live timespec.
        if unsafe { libc::clock_gettime(self.clock, &mut now) } != 0 {
            let code = std::io::Error::last_os_error().raw_os_error().unwrap_or(0);
            return Err(SyncError::os("clock_gettime", code));
        }

        let secs = libc::time_t::try_from(timeout.as_secs()).unwrap_or(libc::time_t::MAX);
        let mut tv_sec = now.tv_sec.saturating_add(secs);
        let mut tv_nsec = now.tv_nsec + timeout.subsec_nanos() as libc::c_long;
        if tv_nsec >= 1_000_000_000 {
            tv_nsec -= 1_000_000_000;
            tv_sec = tv_sec.saturating_add(1);
        }

        let mut at = now;
        at.tv_sec = tv_sec;
        at.tv_nsec = tv_nsec;
        Ok(at)
    }
}

impl Parker for PosixParker {
    fn new(clock: WaitClock) -> SyncResult<Self> {
        let clock = native_clock(clock);

        let mutex = Box::new(UnsafeCell::new(libc::PTHREAD_MUTEX_INITIALIZER));
        // SAFETY: `mutex` is boxed and not yet shared.
        check("pthread_mutex_init", unsafe {
            libc::pthread_mutex_init(mutex.get(), core::ptr::null())
        })?;

        let cond = match Self::init_cond(clock) {
            Ok(cond) => cond,
            Err(err) => {
                // SAFETY: initialized above and never locked.
                unsafe { libc::pthread_mutex_destroy(mutex.get()) };
                return Err(err);
            }
        };

        Ok(Self { mutex, cond, clock })
    }

    fn lock(&self) -> SyncResult<()> {
        // SAFETY: initialized in `new`, destroyed only in `drop`.
        check("pthread_mutex_lock", unsafe {
            libc::pthread_mutex_lock(self.mutex.get())
        })
    }

    fn unlock(&self) -> SyncResult<()> {
        // SAFETY: as in `lock`.
        check("pthread_mutex_unlock", unsafe {
            libc::pthread_mutex_unlock(self.mutex.get())
        })
    }

    fn wait(&self, timeout: Option<Duration>) -> SyncResult<()> {
        match timeout {
            // SAFETY: the caller holds `self.mutex`, as the trait requires.
            None => check("pthread_cond_wait", unsafe {
                pthread_cond_wait(self.cond.get(), self.mutex.get())
            }),
            Some(timeout) => {
                let at = self.deadline(timeout)?;
                // SAFETY: as above; `at` outlives the call.
                let rc = unsafe {
                    pthread_cond_timedwait(self.cond.get(), self.mutex.get(), &at)
                };
                match rc {
                    0 | libc::ETIMEDOUT => Ok(()),
                    rc => Err(SyncError::os("pthread_cond_timedwait", rc)),
                }
            }
        }
    }

    fn notify_one(&self) -> SyncResult<()> {
        // SAFETY: initialized in `new`.
        check("pthread_cond_signal", unsafe {
            libc::pthread_cond_signal(self.cond.get())
        })
    }

    fn notify_all(&self) -> SyncResult<()> {
        // SAFETY: initialized in `new`.
        check("pthread_cond_broadcast", unsafe {
            libc::pthread_cond_broadcast(self.cond.get())
        })
    }
}

impl Drop for PosixParker {
    fn drop(&mut self) {
        // SAFETY: exclusive access; nobody can be waiting any more.
        unsafe {
            libc::pthread_cond_destroy(self.cond.get());
            libc::pthread_mutex_destroy(self.mutex.get());
        }
    }
}

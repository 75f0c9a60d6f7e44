use core::ffi::c_void;
use core::ptr;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use crate::error::{SyncError, SyncResult};
use crate::runnable::Runnable;
use crate::thread::{Thread, ThreadCore, ThreadLaunch, ThreadOptions, ThreadState};

use super::{ffi, last_os_error, OwnedHandle};

/// A Win32 thread running a shared [`Runnable`].
pub struct Win32Thread {
    core: ThreadCore,
    /// Open thread handle from a successful `CreateThread` until waited on.
    handle: Option<OwnedHandle>,
}

impl Win32Thread {
    pub fn new(runnable: Arc<dyn Runnable>, options: ThreadOptions) -> Self {
        Self {
            core: ThreadCore::new(runnable, options),
            handle: None,
        }
    }

    fn try_start(&mut self) -> SyncResult<()> {
        if self.handle.is_some() {
            if self.core.state() == ThreadState::Running {
                return Ok(());
            }
            self.join()?;
        }

        match self.spawn() {
            Ok(handle) => {
                self.handle = Some(handle);
                tracing::debug!(thread = self.core.label(), "win32 thread started");
                Ok(())
            }
            Err(err) => {
                self.core.set_state(ThreadState::Created);
                Err(err)
            }
        }
    }

    fn spawn(&self) -> SyncResult<OwnedHandle> {
        let (stack_size, flags) = match self.core.options.requested_stack_size() {
            Some(size) => (size, ffi::CREATE_SUSPENDED | ffi::STACK_SIZE_PARAM_IS_A_RESERVATION),
            None => (0, ffi::CREATE_SUSPENDED),
        };

        let launch = Box::into_raw(Box::new(self.core.launch()));
        let mut thread_id = 0;
        // SAFETY: `launch` stays valid until `thread_start` takes it, or
        // until it is reclaimed below when creation fails.
        let raw = unsafe {
            ffi::CreateThread(
                ptr::null_mut(),
                stack_size,
                thread_start,
                launch.cast(),
                flags,
                &mut thread_id,
            )
        };
        let handle = match OwnedHandle::from_raw(raw, "CreateThread") {
            Ok(handle) => handle,
            Err(err) => {
                // SAFETY: no thread was created, so `launch` is still ours.
                drop(unsafe { Box::from_raw(launch) });
                return Err(err);
            }
        };

        // SAFETY: `handle` is a suspended thread we own.
        if unsafe { ffi::ResumeThread(handle.raw()) } == u32::MAX {
            let err = last_os_error("ResumeThread");
            // The suspended thread never ran; kill it and reclaim its input.
            // SAFETY: the thread has not executed any user code.
            unsafe {
                ffi::TerminateThread(handle.raw(), 1);
                ffi::WaitForSingleObject(handle.raw(), ffi::INFINITE);
                drop(Box::from_raw(launch));
            }
            return Err(err);
        }
        Ok(handle)
    }

    fn join(&mut self) -> SyncResult<()> {
        let Some(handle) = &self.handle else {
            return Ok(());
        };
        // SAFETY: `handle` is a live thread handle.
        if unsafe { ffi::WaitForSingleObject(handle.raw(), ffi::INFINITE) } == ffi::WAIT_FAILED {
            return Err(last_os_error("WaitForSingleObject"));
        }
        self.handle = None;
        self.core.set_state(ThreadState::Stopped);
        tracing::debug!(thread = self.core.label(), "win32 thread joined");
        Ok(())
    }

    fn try_stop(&mut self) -> SyncResult<()> {
        let Some(handle) = &self.handle else {
            return Ok(());
        };
        if !matches!(self.core.state(), ThreadState::Running | ThreadState::Stopping) {
            return Ok(());
        }
        tracing::warn!(thread = self.core.label(), "terminating win32 thread");
        // SAFETY: `handle` is a live thread handle; the consequences for the
        // target are the caller's responsibility per `Thread::stop`.
        if unsafe { ffi::TerminateThread(handle.raw(), 1) } == 0 {
            return Err(last_os_error("TerminateThread"));
        }
        // Termination completes asynchronously; only report it once the
        // thread object is signalled.
        self.core.set_state(ThreadState::Stopping);
        // SAFETY: `handle` is a live thread handle.
        if unsafe { ffi::WaitForSingleObject(handle.raw(), ffi::INFINITE) } == ffi::WAIT_FAILED {
            return Err(last_os_error("WaitForSingleObject"));
        }
        self.core.set_state(ThreadState::Stopped);
        Ok(())
    }
}

unsafe extern "system" fn thread_start(arg: *mut c_void) -> ffi::DWORD {
    // SAFETY: `arg` is the box leaked by `spawn`, handed over once.
    let launch = *unsafe { Box::from_raw(arg.cast::<ThreadLaunch>()) };
    let status = launch.status();

    // A panic must not unwind into kernel32.
    match panic::catch_unwind(AssertUnwindSafe(|| launch.execute())) {
        Ok(()) => 0,
        Err(_) => {
            tracing::error!("runnable panicked; thread exiting");
            ThreadLaunch::mark_finished(&status);
            1
        }
    }
}

impl Thread for Win32Thread {
    fn start(&mut self) -> bool {
        let result = self.try_start();
        self.core.error.record("thread_start", result)
    }

    unsafe fn stop(&mut self) -> bool {
        let result = self.try_stop();
        self.core.error.record("thread_stop", result)
    }

    fn wait(&mut self) -> bool {
        let result = self.join();
        self.core.error.record("thread_wait", result)
    }

    fn state(&self) -> ThreadState {
        self.core.state()
    }

    fn last_error(&self) -> Option<SyncError> {
        self.core.error.get()
    }

    fn name(&self) -> Option<&str> {
        self.core.options.thread_name()
    }
}

impl Drop for Win32Thread {
    fn drop(&mut self) {
        if self.handle.is_some() && self.core.state() == ThreadState::Running {
            tracing::warn!(
                thread = self.core.label(),
                "thread handle dropped while running, forcing stop"
            );
            // SAFETY: dropping a running handle is documented to terminate it.
            unsafe {
                self.stop();
            }
        }
        // Closing the handle detaches whatever is left of the thread.
    }
}

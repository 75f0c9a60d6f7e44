//! The handful of kernel32 entry points the Win32 backend needs.

#![allow(non_camel_case_types, non_snake_case, clippy::upper_case_acronyms)]

use core::ffi::c_void;

pub type HANDLE = *mut c_void;
pub type BOOL = i32;
pub type DWORD = u32;

pub type THREAD_START_ROUTINE = unsafe extern "system" fn(*mut c_void) -> DWORD;

#[repr(C)]
pub struct SRWLOCK {
    pub ptr: *mut c_void,
}

#[repr(C)]
pub struct CONDITION_VARIABLE {
    pub ptr: *mut c_void,
}

pub const SRWLOCK_INIT: SRWLOCK = SRWLOCK {
    ptr: core::ptr::null_mut(),
};
pub const CONDITION_VARIABLE_INIT: CONDITION_VARIABLE = CONDITION_VARIABLE {
    ptr: core::ptr::null_mut(),
};

pub const INFINITE: DWORD = 0xFFFF_FFFF;
pub const WAIT_OBJECT_0: DWORD = 0x0000_0000;
pub const WAIT_ABANDONED: DWORD = 0x0000_0080;
pub const WAIT_TIMEOUT: DWORD = 0x0000_0102;
pub const WAIT_FAILED: DWORD = 0xFFFF_FFFF;
pub const CREATE_SUSPENDED: DWORD = 0x0000_0004;
pub const STACK_SIZE_PARAM_IS_A_RESERVATION: DWORD = 0x0001_0000;
pub const ERROR_TIMEOUT: DWORD = 1460;
pub const ERROR_TOO_MANY_POSTS: DWORD = 298;

#[link(name = "kernel32")]
extern "system" {
    pub fn CreateMutexW(attributes: *mut c_void, initial_owner: BOOL, name: *const u16) -> HANDLE;
    pub fn ReleaseMutex(mutex: HANDLE) -> BOOL;

    pub fn CreateSemaphoreW(
        attributes: *mut c_void,
        initial: i32,
        maximum: i32,
        name: *const u16,
    ) -> HANDLE;
    pub fn ReleaseSemaphore(semaphore: HANDLE, count: i32, previous: *mut i32) -> BOOL;

    pub fn WaitForSingleObject(handle: HANDLE, millis: DWORD) -> DWORD;
    pub fn CloseHandle(handle: HANDLE) -> BOOL;
    pub fn GetLastError() -> DWORD;

    pub fn AcquireSRWLockExclusive(lock: *mut SRWLOCK);
    pub fn ReleaseSRWLockExclusive(lock: *mut SRWLOCK);
    pub fn SleepConditionVariableSRW(
        cond: *mut CONDITION_VARIABLE,
        lock: *mut SRWLOCK,
        millis: DWORD,
        flags: DWORD,
    ) -> BOOL;
    pub fn WakeConditionVariable(cond: *mut CONDITION_VARIABLE);
    pub fn WakeAllConditionVariable(cond: *mut CONDITION_VARIABLE);

    pub fn CreateThread(
        attributes: *mut c_void,
        stack_size: usize,
        start: THREAD_START_ROUTINE,
        parameter: *mut c_void,
        flags: DWORD,
        thread_id: *mut DWORD,
    ) -> HANDLE;
    pub fn ResumeThread(thread: HANDLE) -> DWORD;
    pub fn TerminateThread(thread: HANDLE, exit_code: DWORD) -> BOOL;
    pub fn GetCurrentThreadId() -> DWORD;
    pub fn SwitchToThread() -> BOOL;
    pub fn Sleep(millis: DWORD);
}

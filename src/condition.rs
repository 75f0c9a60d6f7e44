//! Condition variables bound to a caller-supplied [`Mutex`] at wait time.
//!
//! Every backend builds its condition from a [`Parker`]: a native lock paired
//! with a native condition variable. Waiters take a ticket in a [`WaitList`]
//! under the parker's lock *before* they release the caller's mutex, so a
//! `signal()` issued between that release and the moment the waiter blocks
//! still finds the ticket and cannot be lost.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use spin::Mutex as SpinMutex;

use crate::error::{LastError, SyncError, SyncResult};
use crate::mutex::Mutex;
use crate::sys::{Parker, ParkerGuard};

/// Wait/signal primitive. Owns no mutex; one is lent to each `wait()`.
pub trait Condition: Send + Sync {
    /// Wake one blocked waiter, or all of them when `wake_all` is set.
    ///
    /// A signal with nobody waiting is not remembered.
    fn signal(&self, wake_all: bool) -> bool;

    /// Release `mutex`, block until signalled or until `timeout_ms` elapses
    /// (0 blocks indefinitely), then reacquire `mutex`.
    ///
    /// The caller must hold `mutex` on entry and holds it again on return,
    /// whatever the outcome. The timeout bounds only the signal phase, never
    /// the reacquisition. A timeout returns `false` with
    /// [`SyncError::TimedOut`].
    fn wait(&self, mutex: &dyn Mutex, timeout_ms: u32) -> bool;

    /// Number of threads currently blocked in `wait()`. Advisory only.
    fn waiting(&self) -> usize;

    fn last_error(&self) -> Option<SyncError>;
}

/// Clock that timed waits are measured against on POSIX.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WaitClock {
    /// Immune to wall-clock adjustments.
    #[default]
    Monotonic,
    Realtime,
}

/// Creation attributes for a [`Condition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConditionAttributes {
    pub clock: WaitClock,
}

impl ConditionAttributes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Select the clock for timed waits. Ignored by the Win32 backend.
    pub fn clock(mut self, clock: WaitClock) -> Self {
        self.clock = clock;
        self
    }
}

/// FIFO bookkeeping of parked waiters and delivered wakeups.
#[derive(Debug, Default)]
pub(crate) struct WaitList {
    next_ticket: u64,
    parked: VecDeque<u64>,
    woken: Vec<u64>,
}

impl WaitList {
    pub(crate) fn enqueue(&mut self) -> u64 {
        let ticket = self.next_ticket;
        self.next_ticket = self.next_ticket.wrapping_add(1);
        self.parked.push_back(ticket);
        ticket
    }

    pub(crate) fn wake_one(&mut self) -> usize {
        match self.parked.pop_front() {
            Some(ticket) => {
                self.woken.push(ticket);
                1
            }
            None => 0,
        }
    }

    pub(crate) fn wake_all(&mut self) -> usize {
        let count = self.parked.len();
        self.woken.extend(self.parked.drain(..));
        count
    }

    /// Takes a delivered wakeup for `ticket`, if any.
    pub(crate) fn consume(&mut self, ticket: u64) -> bool {
        match self.woken.iter().position(|&t| t == ticket) {
            Some(index) => {
                self.woken.swap_remove(index);
                true
            }
            None => false,
        }
    }

    /// Removes `ticket` entirely. Returns `true` if it was still parked, or
    /// `false` if a wakeup had already been delivered to it.
    pub(crate) fn withdraw(&mut self, ticket: u64) -> bool {
        if let Some(index) = self.parked.iter().position(|&t| t == ticket) {
            self.parked.remove(index);
            return true;
        }
        self.consume(ticket);
        false
    }

    pub(crate) fn parked(&self) -> usize {
        self.parked.len()
    }
}

/// [`Condition`] built from a backend [`Parker`].
pub struct ParkingCondition<P: Parker> {
    parker: Option<P>,
    list: SpinMutex<WaitList>,
    error: LastError,
}

impl<P: Parker> ParkingCondition<P> {
    pub fn new(attributes: ConditionAttributes) -> Self {
        let error = LastError::new();
        let parker = match P::new(attributes.clock) {
            Ok(parker) => Some(parker),
            Err(err) => {
                tracing::warn!(error = %err, "condition creation failed");
                error.set(err);
                None
            }
        };
        tracing::debug!(clock = ?attributes.clock, "condition created");
        Self {
            parker,
            list: SpinMutex::new(WaitList::default()),
            error,
        }
    }

    fn parker(&self) -> SyncResult<&P> {
        self.parker.as_ref().ok_or(SyncError::Uninitialized)
    }

    fn try_signal(&self, wake_all: bool) -> SyncResult<()> {
        let parker = self.parker()?;
        let guard = ParkerGuard::lock(parker)?;
        let woken = {
            let mut list = self.list.lock();
            if wake_all {
                list.wake_all()
            } else {
                list.wake_one()
            }
        };
        sync_trace!(woken, wake_all, "condition signalled");
        // Waiters recheck their own ticket, so a broadcast never wakes more
        // than the list released.
        let notified = if woken > 0 { parker.notify_all() } else { Ok(()) };
        guard.unlock()?;
        notified
    }

    fn try_wait(&self, mutex: &dyn Mutex, timeout_ms: u32) -> SyncResult<()> {
        let parker = self.parker()?;
        let guard = ParkerGuard::lock(parker)?;
        let ticket = Ticket::enqueue(&self.list, parker);

        if let Err(err) = mutex.release_result() {
            ticket.withdraw();
            guard.unlock()?;
            return Err(err);
        }

        let parked = ticket.park(timeout_ms);
        let unlocked = guard.unlock();
        let relocked = mutex.lock_wait_result();

        parked?;
        unlocked?;
        relocked
    }
}

/// A waiter's place in the [`WaitList`], used with the parker locked.
///
/// Dropping a ticket that was neither consumed nor withdrawn, which is what
/// happens when a cancelled waiter unwinds out of [`Ticket::park`], gives
/// the place up and hands a wakeup already delivered to it on to the next
/// parked waiter.
struct Ticket<'a, P: Parker> {
    list: &'a SpinMutex<WaitList>,
    parker: &'a P,
    id: u64,
    settled: bool,
}

impl<'a, P: Parker> Ticket<'a, P> {
    fn enqueue(list: &'a SpinMutex<WaitList>, parker: &'a P) -> Self {
        let id = list.lock().enqueue();
        Self {
            list,
            parker,
            id,
            settled: false,
        }
    }

    fn consume(&mut self) -> bool {
        self.settled = self.list.lock().consume(self.id);
        self.settled
    }

    /// `true` if no wakeup had been delivered yet.
    fn withdraw(mut self) -> bool {
        self.settled = true;
        self.list.lock().withdraw(self.id)
    }

    /// Blocks on the parker until woken or until `timeout_ms` passes.
    fn park(mut self, timeout_ms: u32) -> SyncResult<()> {
        let deadline =
            (timeout_ms > 0).then(|| Instant::now() + Duration::from_millis(u64::from(timeout_ms)));

        loop {
            if self.consume() {
                return Ok(());
            }

            let remaining = match deadline {
                None => None,
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return if self.withdraw() {
                            Err(SyncError::TimedOut { millis: timeout_ms })
                        } else {
                            Ok(())
                        };
                    }
                    Some(deadline - now)
                }
            };

            self.parker.wait(remaining)?;
        }
    }
}

impl<P: Parker> Drop for Ticket<'_, P> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let forwarded = {
            let mut list = self.list.lock();
            !list.withdraw(self.id) && list.wake_one() > 0
        };
        if forwarded {
            if let Err(error) = self.parker.notify_all() {
                tracing::warn!(%error, "forwarding condition wakeup failed");
            }
        }
    }
}

impl<P: Parker> Condition for ParkingCondition<P> {
    fn signal(&self, wake_all: bool) -> bool {
        self.error.record("condition_signal", self.try_signal(wake_all))
    }

    fn wait(&self, mutex: &dyn Mutex, timeout_ms: u32) -> bool {
        self.error.record("condition_wait", self.try_wait(mutex, timeout_ms))
    }

    fn waiting(&self) -> usize {
        self.list.lock().parked()
    }

    fn last_error(&self) -> Option<SyncError> {
        self.error.get()
    }
}

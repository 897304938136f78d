//! Waiter bookkeeping for threads suspended in `read()` or `write()`.
//!
//! Each suspended call is represented by a [`Waiter`] whose lifecycle is a small state machine:
//!
//! 0 - waiting - the waiter is registered and its thread is (or is about to be) parked.
//! 1 - woken - a state change claimed the waiter and removed it from the wait set; the thread
//!             must re-acquire the context lock and re-check its condition.
//! 2 - cancelled - a cancellation token or an elapsed deadline claimed the waiter; the thread
//!                 must remove the waiter from the wait set itself.
//!
//! Both terminal transitions start from `waiting` via compare-exchange, so exactly one of
//! {wake, cancel} wins and the loser observes the winner's outcome.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Instant;

use parking_lot_core::{DEFAULT_PARK_TOKEN, DEFAULT_UNPARK_TOKEN, ParkResult, park, unpark_one};

const WAITER_WAITING: u8 = 0;
const WAITER_WOKEN: u8 = 1;
const WAITER_CANCELLED: u8 = 2;

/// The condition a waiter is suspended on.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum Interest {
    /// The counter must become nonzero.
    Read,

    /// The counter must have room to add the given value.
    Write(u64),
}

/// How a parked waiter was released.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum WaitOutcome {
    Woken,
    Cancelled,
    TimedOut,
}

/// One suspended call, owned jointly by the wait set and the suspended thread.
///
/// The suspended thread parks on the address of `state`. The waiter is always reachable through
/// an `Arc` held by whoever transitions it, so the address stays valid (and unique) for as long
/// as anyone may still unpark it.
#[derive(Debug)]
pub(crate) struct Waiter {
    interest: Interest,
    state: AtomicU8,
}

impl Waiter {
    fn new(interest: Interest) -> Self {
        Self {
            interest,
            state: AtomicU8::new(WAITER_WAITING),
        }
    }

    pub(crate) fn interest(&self) -> Interest {
        self.interest
    }

    pub(crate) fn is_waiting(&self) -> bool {
        self.state.load(Ordering::Acquire) == WAITER_WAITING
    }

    /// Claims the waiter for a wake. Returns `false` if it was already cancelled or woken.
    pub(crate) fn try_wake(&self) -> bool {
        self.transition(WAITER_WOKEN)
    }

    /// Claims the waiter for a cancellation. Returns `false` if it was already woken or cancelled.
    pub(crate) fn try_cancel(&self) -> bool {
        self.transition(WAITER_CANCELLED)
    }

    fn park_key(&self) -> usize {
        self.state.as_ptr() as usize
    }

    fn transition(&self, to: u8) -> bool {
        let claimed = self
            .state
            .compare_exchange(WAITER_WAITING, to, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();

        if claimed {
            // SAFETY: The key is the address of our own state, which only this waiter parks on.
            unsafe {
                unpark_one(self.park_key(), |_| DEFAULT_UNPARK_TOKEN);
            }
        }

        claimed
    }

    /// Parks the current thread until the waiter is woken, cancelled or the deadline passes.
    ///
    /// Must be called without holding the context lock.
    #[cfg_attr(test, mutants::skip)] // Mutations here can only produce hangs.
    pub(crate) fn park(&self, deadline: Option<Instant>) -> WaitOutcome {
        // SAFETY: We park on the address of our own state and the validate callback only reads
        // that state. The callbacks do not call into the parking lot.
        let result = unsafe {
            park(
                self.park_key(),
                || self.is_waiting(),
                || {},
                |_, _| {},
                DEFAULT_PARK_TOKEN,
                deadline,
            )
        };

        if matches!(result, ParkResult::TimedOut) {
            // The deadline races against wakes like any other cancellation. If we lose,
            // the state below reports whoever won.
            if self
                .state
                .compare_exchange(
                    WAITER_WAITING,
                    WAITER_CANCELLED,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                )
                .is_ok()
            {
                return WaitOutcome::TimedOut;
            }
        }

        // Unparked or invalid both mean someone already moved us out of the waiting state.
        match self.state.load(Ordering::Acquire) {
            WAITER_WOKEN => WaitOutcome::Woken,
            WAITER_CANCELLED => WaitOutcome::Cancelled,
            other => unreachable!("waiter released while still in state {other}"),
        }
    }
}

/// The callers currently suspended on one event counter.
///
/// Always accessed under the owning context's lock. Waiters are kept in registration order and
/// every wake scans from the front, so earlier waiters are preferred but no fairness is promised.
#[derive(Debug, Default)]
pub(crate) struct WaitSet {
    waiters: VecDeque<Arc<Waiter>>,
}

impl WaitSet {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Registers a waiter for the current thread.
    pub(crate) fn enqueue(&mut self, interest: Interest) -> Arc<Waiter> {
        let waiter = Arc::new(Waiter::new(interest));
        self.waiters.push_back(Arc::clone(&waiter));
        waiter
    }

    /// Wakes the first still-waiting waiter whose interest matches, removing it from the set.
    pub(crate) fn wake_one_matching(&mut self, predicate: impl Fn(Interest) -> bool) -> bool {
        let position = self.waiters.iter().position(|waiter| {
            waiter.is_waiting() && predicate(waiter.interest()) && waiter.try_wake()
        });

        match position {
            Some(index) => {
                self.waiters.remove(index);
                true
            }
            None => false,
        }
    }

    /// Wakes still-waiting waiters in registration order while their cost fits into `budget`,
    /// removing them from the set.
    ///
    /// `cost` returns `None` for waiters that are not eligible at all. Only waiters that were
    /// actually claimed are charged. Returns the total charged.
    pub(crate) fn wake_all_matching(
        &mut self,
        budget: &mut u64,
        cost: impl Fn(Interest) -> Option<u64>,
    ) -> u64 {
        let mut charged = 0_u64;

        self.waiters.retain(|waiter| {
            if !waiter.is_waiting() {
                return true;
            }

            let Some(waiter_cost) = cost(waiter.interest()) else {
                return true;
            };

            let Some(remaining) = budget.checked_sub(waiter_cost) else {
                return true;
            };

            if !waiter.try_wake() {
                return true;
            }

            *budget = remaining;
            charged = charged.saturating_add(waiter_cost);
            false
        });

        charged
    }

    /// Removes a specific waiter. Returns `false` if a wake already removed it.
    pub(crate) fn remove(&mut self, waiter: &Arc<Waiter>) -> bool {
        match self.waiters.iter().position(|w| Arc::ptr_eq(w, waiter)) {
            Some(index) => {
                self.waiters.remove(index);
                true
            }
            None => false,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.waiters.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.waiters.is_empty()
    }
}

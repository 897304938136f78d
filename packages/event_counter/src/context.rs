//! The shared state behind every [`EventCounter`][crate::EventCounter] handle.
//!
//! All counter mutation and all wait set access happens under `Context::state`. The lock is
//! only held for bounded bookkeeping; threads suspend after releasing it and re-check their
//! condition after re-acquiring it, since a wake only means the condition *may* now hold.
//!
//! Wake policy: after every state change we wake exactly the waiters the new state can satisfy,
//! scanning in registration order. In normal mode that is one reader (it takes everything). In
//! semaphore mode it is up to one reader per available unit. Writers are woken while their
//! values still fit, cumulatively, into the remaining room. Units and room promised to woken
//! waiters stay reserved until those waiters re-take the lock, so later scans do not promise
//! them again. A woken waiter that finds its condition gone (a non-waiting caller got there
//! first) passes the wake on by repeating the same scan, so no satisfiable waiter is left behind.

use std::fmt;
use std::mem;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::{Mutex, MutexGuard};
use tracing::{debug, trace};

use crate::observer::SharedObserver;
use crate::wait_set::{Interest, WaitOutcome, WaitSet};
use crate::{CancelReason, CounterInfo, Error, Flags, MAX_VALUE, Readiness, Result, WaitOptions};

#[cfg(test)]
thread_local! {
    // Lets tests verify that a context is destroyed exactly once, on the releasing thread.
    pub(crate) static DESTROYED_ON_THIS_THREAD: std::cell::Cell<usize> =
        const { std::cell::Cell::new(0) };
}

// Identifiers are only for diagnostics, so wrapping after 2^64 contexts is not a concern.
static NEXT_ID: AtomicU64 = AtomicU64::new(1);

pub(crate) struct Context {
    id: u64,
    flags: Flags,
    state: Mutex<State>,

    // Mirrors `!state.observers.is_empty()` so operations can skip notification without
    // taking the lock a second time.
    has_observers: AtomicBool,
}

struct State {
    counter: u64,
    waiters: WaitSet,
    observers: Vec<(u64, SharedObserver)>,
    next_observer_id: u64,

    // Woken readers that have not yet re-taken the lock, and the room promised to woken writers
    // in the same situation.
    woken_readers: u64,
    promised_room: u64,
}

impl Context {
    /// Creates a context holding `initial_value`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if `initial_value` exceeds [`MAX_VALUE`].
    pub(crate) fn new(initial_value: u64, flags: Flags) -> Result<Self> {
        if initial_value > MAX_VALUE {
            return Err(Error::InvalidArgument {
                value: initial_value,
            });
        }

        let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);

        debug!(id, initial_value, ?flags, "event counter created");

        Ok(Self {
            id,
            flags,
            state: Mutex::new(State {
                counter: initial_value,
                waiters: WaitSet::new(),
                observers: Vec::new(),
                next_observer_id: 0,
                woken_readers: 0,
                promised_room: 0,
            }),
            has_observers: AtomicBool::new(false),
        })
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn flags(&self) -> Flags {
        self.flags
    }

    /// Adds up to `n` to the counter, saturating at [`MAX_VALUE`]. Returns the amount added.
    pub(crate) fn signal(&self, n: u64) -> u64 {
        let mut state = self.state.lock();

        let room = MAX_VALUE.saturating_sub(state.counter);
        let added = n.min(room);

        if added > 0 {
            state.counter = state.counter.saturating_add(added);
            self.wake_ready(&mut state);
        }

        trace!(id = self.id, requested = n, added, "signaled");

        added
    }

    /// Consumes the counter (or one unit of it in semaphore mode).
    ///
    /// With `wait` set to `None` the call never suspends.
    pub(crate) fn read(&self, wait: Option<&WaitOptions>) -> Result<u64> {
        self.wait_for(Interest::Read, wait, |state| {
            let value = self.consume(state)?;
            self.wake_ready(state);
            Some(value)
        })
    }

    /// Adds `value` to the counter once there is room for it.
    ///
    /// With `wait` set to `None` the call never suspends.
    pub(crate) fn write(&self, value: u64, wait: Option<&WaitOptions>) -> Result<()> {
        if value == 0 || value > MAX_VALUE {
            return Err(Error::InvalidArgument { value });
        }

        self.wait_for(Interest::Write(value), wait, |state| {
            let room = MAX_VALUE.saturating_sub(state.counter);

            if value > room {
                return None;
            }

            state.counter = state.counter.saturating_add(value);
            self.wake_ready(state);
            Some(())
        })
    }

    pub(crate) fn readiness(&self) -> Readiness {
        Readiness::of_count(self.state.lock().counter)
    }

    pub(crate) fn info(&self) -> CounterInfo {
        CounterInfo {
            id: self.id,
            count: self.state.lock().counter,
            semaphore: self.flags.is_semaphore(),
        }
    }

    pub(crate) fn waiter_count(&self) -> usize {
        self.state.lock().waiters.len()
    }

    pub(crate) fn add_observer(&self, observer: SharedObserver) -> u64 {
        let mut state = self.state.lock();

        let observer_id = state.next_observer_id;
        state.next_observer_id = observer_id.wrapping_add(1);
        state.observers.push((observer_id, observer));
        self.has_observers.store(true, Ordering::Release);

        trace!(id = self.id, observer_id, "observer added");

        observer_id
    }

    /// Removes an observer. Returns `false` if it was already removed.
    pub(crate) fn remove_observer(&self, observer_id: u64) -> bool {
        let removed = self.remove_observer_locked(&mut self.state.lock(), observer_id);

        // Dropped here, outside the lock, as the observer may own counter references.
        removed.is_some()
    }

    /// Removes an observer and consumes the counter in the same critical section, so that no
    /// signal can land between the two and be missed by the departing observer.
    ///
    /// # Errors
    ///
    /// Returns [`Error::WouldBlock`] if the counter was zero. The observer is removed regardless.
    pub(crate) fn remove_observer_and_read(&self, observer_id: u64) -> Result<u64> {
        let mut state = self.state.lock();

        let removed = self.remove_observer_locked(&mut state, observer_id);

        let value = self.consume(&mut state);
        if value.is_some() {
            self.wake_ready(&mut state);
        }

        drop(state);
        drop(removed);

        value.ok_or(Error::WouldBlock)
    }

    fn remove_observer_locked(
        &self,
        state: &mut State,
        observer_id: u64,
    ) -> Option<SharedObserver> {
        let index = state.observers.iter().position(|(id, _)| *id == observer_id)?;
        let (_, observer) = state.observers.remove(index);

        self.has_observers
            .store(!state.observers.is_empty(), Ordering::Release);

        trace!(id = self.id, observer_id, "observer removed");

        Some(observer)
    }

    /// Invokes every registered observer with `readiness`, outside the lock.
    pub(crate) fn notify_observers(&self, readiness: Readiness) {
        if !self.has_observers() {
            return;
        }

        let observers = self
            .state
            .lock()
            .observers
            .iter()
            .map(|(_, observer)| Arc::clone(observer))
            .collect::<Vec<_>>();

        trace!(id = self.id, ?readiness, observers = observers.len(), "notifying observers");

        for observer in observers {
            observer.on_ready(readiness);
        }
    }

    pub(crate) fn has_observers(&self) -> bool {
        self.has_observers.load(Ordering::Acquire)
    }

    /// Takes the readable amount out of the counter, if there is any.
    fn consume(&self, state: &mut State) -> Option<u64> {
        if state.counter == 0 {
            return None;
        }

        if self.flags.is_semaphore() {
            state.counter = state.counter.saturating_sub(1);
            Some(1)
        } else {
            Some(mem::take(&mut state.counter))
        }
    }

    /// Wakes the waiters whose condition the current counter value can satisfy.
    ///
    /// Units and room already promised to woken waiters that have not yet re-taken the lock are
    /// not handed out a second time.
    fn wake_ready(&self, state: &mut State) {
        if state.waiters.is_empty() {
            return;
        }

        let counter = state.counter;

        if self.flags.is_semaphore() {
            let mut units = counter.saturating_sub(state.woken_readers);

            let woken = state
                .waiters
                .wake_all_matching(&mut units, |interest| match interest {
                    Interest::Read => Some(1),
                    Interest::Write(_) => None,
                });

            state.woken_readers = state.woken_readers.saturating_add(woken);
        } else if counter > 0
            && state.woken_readers == 0
            && state
                .waiters
                .wake_one_matching(|interest| interest == Interest::Read)
        {
            // The woken reader takes everything, so one in flight is enough.
            state.woken_readers = 1;
        }

        let mut room = MAX_VALUE
            .saturating_sub(counter)
            .saturating_sub(state.promised_room);

        if room > 0 {
            let promised = state
                .waiters
                .wake_all_matching(&mut room, |interest| match interest {
                    Interest::Write(value) => Some(value),
                    Interest::Read => None,
                });

            state.promised_room = state.promised_room.saturating_add(promised);
        }
    }

    /// Returns what `wake_ready()` promised to a woken waiter that now holds the lock again.
    fn settle_wake(state: &mut State, interest: Interest) {
        match interest {
            Interest::Read => {
                debug_assert!(state.woken_readers > 0, "woken reader was not accounted for");
                state.woken_readers = state.woken_readers.saturating_sub(1);
            }
            Interest::Write(value) => {
                debug_assert!(
                    state.promised_room >= value,
                    "woken writer was not accounted for"
                );
                state.promised_room = state.promised_room.saturating_sub(value);
            }
        }
    }

    /// The wait-recheck loop shared by `read()` and `write()`.
    ///
    /// `attempt` runs under the lock and either completes the operation or reports that the
    /// caller must wait. With `wait` set to `None`, waiting means failing with `WouldBlock`.
    fn wait_for<T>(
        &self,
        interest: Interest,
        wait: Option<&WaitOptions>,
        mut attempt: impl FnMut(&mut State) -> Option<T>,
    ) -> Result<T> {
        let mut state = self.state.lock();
        let mut woken = false;

        loop {
            if let Some(output) = attempt(&mut *state) {
                return Ok(output);
            }

            if woken {
                // Someone else got there first; whatever is still satisfiable goes to others.
                self.wake_ready(&mut state);
            }

            let Some(options) = wait else {
                return Err(Error::WouldBlock);
            };

            if let Some(reason) = options.cancel_reason() {
                trace!(id = self.id, ?interest, ?reason, "wait abandoned");
                return Err(Error::Cancelled { reason });
            }

            let waiter = state.waiters.enqueue(interest);
            let registration = options.token().map(|token| token.register(&waiter));

            trace!(id = self.id, ?interest, "suspending");

            let outcome = MutexGuard::unlocked(&mut state, || {
                waiter.park(options.deadline_instant())
            });

            drop(registration);

            let reason = match outcome {
                WaitOutcome::Woken => {
                    Self::settle_wake(&mut state, interest);
                    woken = true;
                    continue;
                }
                WaitOutcome::Cancelled => CancelReason::Token,
                WaitOutcome::TimedOut => CancelReason::TimedOut,
            };

            // A cancelled waiter is never removed by a wake, so it must still be registered.
            // Nothing was promised to it either, as only successful wakes are accounted.
            let removed = state.waiters.remove(&waiter);
            debug_assert!(removed, "cancelled waiter missing from the wait set");

            trace!(id = self.id, ?interest, ?reason, "wait cancelled");

            return Err(Error::Cancelled { reason });
        }
    }
}

impl fmt::Debug for Context {
    #[cfg_attr(test, mutants::skip)] // No API contract for debug output.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("id", &self.id)
            .field("flags", &self.flags)
            .field("state", &*self.state.lock())
            .field("has_observers", &self.has_observers)
            .finish()
    }
}

impl fmt::Debug for State {
    #[cfg_attr(test, mutants::skip)] // No API contract for debug output.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("State")
            .field("counter", &self.counter)
            .field("waiters", &self.waiters)
            .field("observers", &self.observers.len())
            .field("next_observer_id", &self.next_observer_id)
            .field("woken_readers", &self.woken_readers)
            .field("promised_room", &self.promised_room)
            .finish()
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        let state = self.state.get_mut();

        // Every blocked call holds a reference, so reaching zero with waiters means the
        // reference counting contract was broken somewhere.
        assert!(
            state.waiters.is_empty(),
            "event counter {} destroyed with {} registered waiters",
            self.id,
            state.waiters.len()
        );

        debug_assert!(
            state.observers.is_empty(),
            "event counter destroyed with registered observers"
        );

        // Woken waiters also hold references until they re-take the lock.
        debug_assert_eq!(state.woken_readers, 0);
        debug_assert_eq!(state.promised_room, 0);

        #[cfg(test)]
        DESTROYED_ON_THIS_THREAD.set(DESTROYED_ON_THIS_THREAD.get().saturating_add(1));

        debug!(id = self.id, count = state.counter, "event counter destroyed");
    }
}

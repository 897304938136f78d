//! Cancellation of suspended `read()` and `write()` calls.
//!
//! A waiter that suspends with a [`CancelToken`] registers itself with the token for the
//! duration of the suspension. `cancel()` first raises the sticky flag and then claims every
//! registered waiter, racing against wakes through the waiter's own state machine. Registration
//! re-checks the flag after publishing the waiter, so a waiter that registers concurrently with
//! `cancel()` is claimed by one side or the other. The returned `Registration` guard removes the
//! waiter from the token when dropped. Deadlines take the same cancellation path from inside the
//! parked thread.

use std::mem;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::trace;

use crate::CancelReason;
use crate::wait_set::Waiter;

/// Interrupts blocking [`EventCounter`][crate::EventCounter] operations from another thread.
///
/// Pass the token to a blocking call via [`WaitOptions::cancel_token()`]. Calling
/// [`cancel()`][Self::cancel] on any clone of the token makes every call currently blocked with
/// it (and every future call given it) fail with
/// [`Error::Cancelled`][crate::Error::Cancelled] without touching the counter.
///
/// Once cancelled, a token stays cancelled.
///
/// # Example
///
/// ```rust
/// use std::thread;
///
/// use event_counter::{CancelToken, EventCounter, WaitOptions};
///
/// let counter = EventCounter::new();
/// let token = CancelToken::new();
///
/// let reader = {
///     let counter = counter.clone();
///     let options = WaitOptions::new().cancel_token(token.clone());
///     thread::spawn(move || counter.read_with(&options))
/// };
///
/// token.cancel();
///
/// assert!(reader.join().unwrap().unwrap_err().is_cancelled());
/// ```
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    inner: Arc<TokenState>,
}

#[derive(Debug, Default)]
struct TokenState {
    cancelled: AtomicBool,

    // Waiters currently suspended with this token. Cancellation claims each of them.
    waiters: Mutex<Vec<Arc<Waiter>>>,
}

impl CancelToken {
    /// Creates a token that has not been cancelled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancels every blocking call using this token.
    pub fn cancel(&self) {
        if self.inner.cancelled.swap(true, Ordering::AcqRel) {
            return;
        }

        let waiters = mem::take(&mut *self.inner.waiters.lock());

        trace!(waiters = waiters.len(), "cancel token fired");

        for waiter in waiters {
            // Losing the race to a wake is fine; that waiter re-checks its condition first.
            waiter.try_cancel();
        }
    }

    /// Whether [`cancel()`][Self::cancel] has been called on this token or any of its clones.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    /// Associates a waiter with the token for as long as the returned registration lives.
    pub(crate) fn register(&self, waiter: &Arc<Waiter>) -> Registration<'_> {
        self.inner.waiters.lock().push(Arc::clone(waiter));

        // If `cancel()` took the list before we pushed, it will never see our waiter.
        if self.is_cancelled() {
            waiter.try_cancel();
        }

        Registration {
            token: self,
            waiter: Arc::clone(waiter),
        }
    }
}

/// Removes a waiter from its token when dropped.
#[derive(Debug)]
pub(crate) struct Registration<'a> {
    token: &'a CancelToken,
    waiter: Arc<Waiter>,
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        self.token
            .inner
            .waiters
            .lock()
            .retain(|waiter| !Arc::ptr_eq(waiter, &self.waiter));
    }
}

/// Controls how long an explicitly blocking operation may stay suspended.
///
/// Used with [`EventCounter::read_with()`][crate::EventCounter::read_with] and
/// [`EventCounter::write_with()`][crate::EventCounter::write_with], which always block regardless
/// of [`Flags::NONBLOCKING`][crate::Flags::NONBLOCKING]. The default waits indefinitely.
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
///
/// use event_counter::{CancelReason, Error, EventCounter, WaitOptions};
///
/// let counter = EventCounter::new();
/// let options = WaitOptions::new().timeout(Duration::from_millis(5));
///
/// assert_eq!(
///     counter.read_with(&options),
///     Err(Error::Cancelled {
///         reason: CancelReason::TimedOut
///     })
/// );
/// ```
#[derive(Clone, Debug, Default)]
pub struct WaitOptions {
    deadline: Option<Instant>,
    token: Option<CancelToken>,
}

impl WaitOptions {
    /// Creates options that wait indefinitely and cannot be cancelled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Gives up once `timeout` has elapsed, measured from now.
    ///
    /// A timeout too large to represent as an [`Instant`] waits indefinitely.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Instant::now().checked_add(timeout);
        self
    }

    /// Gives up once `deadline` has passed.
    #[must_use]
    pub fn deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Gives up once `token` is cancelled.
    #[must_use]
    pub fn cancel_token(mut self, token: CancelToken) -> Self {
        self.token = Some(token);
        self
    }

    pub(crate) fn deadline_instant(&self) -> Option<Instant> {
        self.deadline
    }

    pub(crate) fn token(&self) -> Option<&CancelToken> {
        self.token.as_ref()
    }

    /// Whether a wait with these options should give up right now, and why.
    pub(crate) fn cancel_reason(&self) -> Option<CancelReason> {
        if self.token.as_ref().is_some_and(CancelToken::is_cancelled) {
            return Some(CancelReason::Token);
        }

        if self.deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            return Some(CancelReason::TimedOut);
        }

        None
    }
}

//! Per-thread recursion guard for observer notifications.
//!
//! Observers may themselves signal counters, including the one that notified them. Calling
//! observers recursively from there would grow the stack without bound across chains of
//! counters (and loop forever on cycles), so while a thread is delivering notifications every
//! further notification it triggers is queued and delivered afterwards by the outermost call.
//! The counter updates themselves always happen immediately.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::mem;

use tracing::trace;

use crate::{EventCounter, Readiness};

thread_local! {
    static IN_SIGNAL: Cell<bool> = const { Cell::new(false) };

    // Each entry keeps its counter alive until its observers have been notified.
    static DEFERRED: RefCell<VecDeque<(EventCounter, Readiness)>> =
        const { RefCell::new(VecDeque::new()) };
}

/// Whether the current thread may start a new top-level signal with immediate notification.
///
/// Returns `false` while the thread is running [`ReadinessObserver`][crate::ReadinessObserver]
/// callbacks. Signals issued in that state still update the counter, but the observers they
/// would notify are only called once the current notification cascade has finished. Callers
/// that must observe the notification synchronously can check this first and defer the signal
/// by their own means instead.
///
/// # Example
///
/// ```rust
/// use event_counter::signal_allowed;
///
/// assert!(signal_allowed());
/// ```
#[must_use]
pub fn signal_allowed() -> bool {
    !IN_SIGNAL.get()
}

/// Delivers `readiness` to the observers of `counter`, or queues it if this thread is already
/// delivering notifications.
pub(crate) fn notify(counter: &EventCounter, readiness: Readiness) {
    if !counter.context().has_observers() {
        return;
    }

    if IN_SIGNAL.get() {
        trace!(id = counter.id(), ?readiness, "deferring nested notification");

        DEFERRED.with_borrow_mut(|deferred| deferred.push_back((counter.clone(), readiness)));
        return;
    }

    let _scope = SignalScope::enter();

    counter.context().notify_observers(readiness);

    // Drained iteratively, so chains of any length use constant stack.
    while let Some((next, readiness)) = DEFERRED.with_borrow_mut(VecDeque::pop_front) {
        next.context().notify_observers(readiness);
    }
}

/// Marks the current thread as delivering notifications for as long as it lives.
struct SignalScope;

impl SignalScope {
    fn enter() -> Self {
        debug_assert!(!IN_SIGNAL.get());
        IN_SIGNAL.set(true);
        Self
    }
}

impl Drop for SignalScope {
    fn drop(&mut self) {
        // Only non-empty if an observer panicked. Released outside the borrow because dropping
        // a counter reference may destroy the counter.
        let abandoned = DEFERRED.with_borrow_mut(mem::take);

        IN_SIGNAL.set(false);

        drop(abandoned);
    }
}

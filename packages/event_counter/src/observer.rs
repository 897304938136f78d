use std::sync::Arc;

use crate::{EventCounter, Readiness, Result, signal_guard};

pub(crate) type SharedObserver = Arc<dyn ReadinessObserver + Send + Sync>;

/// Receives a callback whenever an [`EventCounter`] changes in a way that wakes waiters.
///
/// This is the hook for polling and notification collaborators: it is called with
/// [`Readiness::READABLE`] after a signal or write added a nonzero amount, and with
/// [`Readiness::WRITABLE`] after a read freed room.
///
/// Observers run synchronously on the thread that changed the counter, after the counter's lock
/// has been released. Any signal, read or write an observer performs takes effect immediately
/// but the notifications it would trigger are deferred until the outermost notification on the
/// thread completes. Use [`signal_allowed()`][crate::signal_allowed] to detect this situation.
///
/// Any `Fn(Readiness) + Send + Sync + 'static` closure is an observer.
#[cfg_attr(test, mockall::automock)]
pub trait ReadinessObserver {
    /// Called after the counter became ready in the way described by `readiness`.
    fn on_ready(&self, readiness: Readiness);
}

impl<F> ReadinessObserver for F
where
    F: Fn(Readiness) + Send + Sync + 'static,
{
    fn on_ready(&self, readiness: Readiness) {
        self(readiness);
    }
}

/// Keeps a [`ReadinessObserver`] registered with an [`EventCounter`].
///
/// The subscription holds a reference to the counter, so the counter outlives it. Dropping the
/// subscription unregisters the observer.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicUsize, Ordering};
///
/// use event_counter::{EventCounter, Readiness};
///
/// let counter = EventCounter::new();
/// let notifications = Arc::new(AtomicUsize::new(0));
///
/// let subscription = counter.subscribe({
///     let notifications = Arc::clone(&notifications);
///     move |readiness: Readiness| {
///         if readiness.is_readable() {
///             notifications.fetch_add(1, Ordering::Relaxed);
///         }
///     }
/// });
///
/// counter.signal(1);
/// assert_eq!(notifications.load(Ordering::Relaxed), 1);
///
/// // Unregister and collect whatever is pending in one step.
/// assert_eq!(subscription.remove_and_read(), Ok(1));
/// ```
#[derive(Debug)]
pub struct Subscription {
    counter: EventCounter,
    observer_id: u64,
}

impl Subscription {
    pub(crate) fn new(counter: EventCounter, observer_id: u64) -> Self {
        Self {
            counter,
            observer_id,
        }
    }

    /// The counter this subscription observes.
    #[must_use]
    pub fn counter(&self) -> &EventCounter {
        &self.counter
    }

    /// Unregisters the observer and reads the counter in one atomic step.
    ///
    /// The read has the usual semantics: the whole counter, or a single unit in semaphore mode.
    /// No signal can slip in between the removal and the read, so nothing is lost when tearing
    /// down a subscriber that forwards counter values elsewhere.
    ///
    /// # Errors
    ///
    /// Returns [`Error::WouldBlock`][crate::Error::WouldBlock] if the counter was zero. The
    /// observer is unregistered in either case.
    pub fn remove_and_read(self) -> Result<u64> {
        let value = self
            .counter
            .context()
            .remove_observer_and_read(self.observer_id)?;

        signal_guard::notify(&self.counter, Readiness::WRITABLE);

        Ok(value)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        // Already gone if `remove_and_read()` consumed the subscription.
        self.counter.context().remove_observer(self.observer_id);
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use mockall::predicate::eq;
    use static_assertions::assert_impl_all;

    use super::*;
    use crate::Error;

    assert_impl_all!(Subscription: Send, Sync);

    #[test]
    fn closure_is_observer() {
        let observer = |readiness: Readiness| assert!(readiness.is_readable());

        observer.on_ready(Readiness::READABLE);
    }

    #[test]
    fn mock_receives_readable_on_write() {
        let mut observer = MockReadinessObserver::new();
        observer
            .expect_on_ready()
            .with(eq(Readiness::READABLE))
            .times(1)
            .return_const(());

        let counter = EventCounter::new();
        let subscription = counter.subscribe(observer);

        counter.write(3).unwrap();

        drop(subscription);
    }

    #[test]
    fn mock_receives_writable_on_read() {
        let mut observer = MockReadinessObserver::new();
        observer
            .expect_on_ready()
            .with(eq(Readiness::WRITABLE))
            .times(1)
            .return_const(());

        let counter = EventCounter::with_initial_value(5).unwrap();
        let _subscription = counter.subscribe(observer);

        assert_eq!(counter.try_read(), Ok(5));
    }

    #[test]
    fn failed_operations_do_not_notify() {
        let mut observer = MockReadinessObserver::new();
        observer.expect_on_ready().never();

        let counter = EventCounter::new();
        let _subscription = counter.subscribe(observer);

        assert_eq!(counter.try_read(), Err(Error::WouldBlock));
        assert_eq!(counter.signal(0), 0);
    }

    #[test]
    fn drop_unsubscribes() {
        let mut observer = MockReadinessObserver::new();
        observer.expect_on_ready().never();

        let counter = EventCounter::new();
        drop(counter.subscribe(observer));

        counter.signal(1);
        assert_eq!(counter.ref_count(), 1);
    }

    #[test]
    fn subscription_holds_reference() {
        let counter = EventCounter::new();
        let subscription = counter.subscribe(|_: Readiness| {});

        assert_eq!(counter.ref_count(), 2);
        assert_eq!(subscription.counter().id(), counter.id());

        drop(subscription);
        assert_eq!(counter.ref_count(), 1);
    }

    #[test]
    fn remove_and_read_empty_still_removes() {
        let counter = EventCounter::new();
        let subscription = counter.subscribe(|_: Readiness| {});

        assert_eq!(subscription.remove_and_read(), Err(Error::WouldBlock));
        assert!(!counter.context().has_observers());
        assert_eq!(counter.ref_count(), 1);
    }
}

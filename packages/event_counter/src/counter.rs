use std::fmt;
use std::ptr::NonNull;
use std::sync::Arc;

use crate::context::Context;
use crate::observer::SharedObserver;
use crate::ref_count::WithRefCount;
use crate::{
    CounterInfo, EventCounterBuilder, Flags, Readiness, ReadinessObserver, Result, Subscription,
    WaitOptions, signal_guard,
};

/// A 64-bit event counter that threads signal and wait on without exchanging any payload.
///
/// Writers add to the counter and readers consume it, blocking while there is nothing to read
/// (or, for writers, no room to add). The counter never exceeds [`MAX_VALUE`][crate::MAX_VALUE].
///
/// This type is a counted reference to shared state: [`clone()`][Clone::clone] (or
/// [`acquire()`][Self::acquire]) takes another reference and dropping (or
/// [`release()`][Self::release]) gives it back. The state is destroyed exactly once, when the
/// last reference is released. A thread blocked in [`read()`][Self::read] or
/// [`write()`][Self::write] keeps its reference alive for the duration of the call.
///
/// # Modes
///
/// * In normal mode, a read returns the whole counter and resets it to zero.
/// * In [semaphore mode][Flags::SEMAPHORE], a read decrements the counter by one and returns `1`.
/// * With [`Flags::NONBLOCKING`], `read()` and `write()` fail with
///   [`Error::WouldBlock`][crate::Error::WouldBlock] instead of suspending.
///
/// # Example
///
/// ```rust
/// use event_counter::{EventCounter, Readiness};
///
/// let counter = EventCounter::new();
///
/// counter.write(5).unwrap();
/// assert!(counter.query_readiness().is_readable());
///
/// assert_eq!(counter.read().unwrap(), 5);
/// assert_eq!(counter.query_readiness(), Readiness::WRITABLE);
/// ```
pub struct EventCounter {
    context: NonNull<WithRefCount<Context>>,
}

// SAFETY: The pointee is a `WithRefCount<Context>`, which is itself `Send + Sync` (atomic count,
// all other state behind a mutex), and we only ever hand out shared references to it.
unsafe impl Send for EventCounter {}

// SAFETY: See `Send` above.
unsafe impl Sync for EventCounter {}

impl EventCounter {
    /// Creates a counter starting at zero, in normal blocking mode.
    #[must_use]
    pub fn new() -> Self {
        Self::from_context(
            Context::new(0, Flags::empty()).expect("zero is always a valid initial value"),
        )
    }

    /// Creates a counter starting at `initial_value`, in normal blocking mode.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`][crate::Error::InvalidArgument] if `initial_value`
    /// exceeds [`MAX_VALUE`][crate::MAX_VALUE].
    pub fn with_initial_value(initial_value: u64) -> Result<Self> {
        Self::create(initial_value, Flags::empty())
    }

    /// Creates a counter starting at `initial_value` with the given flags.
    ///
    /// The returned handle is the first reference to the counter.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`][crate::Error::InvalidArgument] if `initial_value`
    /// exceeds [`MAX_VALUE`][crate::MAX_VALUE].
    ///
    /// # Example
    ///
    /// ```rust
    /// use event_counter::{Error, EventCounter, Flags};
    ///
    /// let counter = EventCounter::create(3, Flags::SEMAPHORE | Flags::NONBLOCKING).unwrap();
    ///
    /// assert_eq!(counter.read(), Ok(1));
    /// assert_eq!(counter.read(), Ok(1));
    /// assert_eq!(counter.read(), Ok(1));
    /// assert_eq!(counter.read(), Err(Error::WouldBlock));
    /// ```
    pub fn create(initial_value: u64, flags: Flags) -> Result<Self> {
        Ok(Self::from_context(Context::new(initial_value, flags)?))
    }

    /// Starts configuring a new counter.
    #[must_use]
    pub fn builder() -> EventCounterBuilder {
        EventCounterBuilder::new()
    }

    fn from_context(context: Context) -> Self {
        let boxed = Box::new(WithRefCount::new(context));

        Self {
            context: NonNull::from(Box::leak(boxed)),
        }
    }

    pub(crate) fn context(&self) -> &Context {
        self.shared()
    }

    fn shared(&self) -> &WithRefCount<Context> {
        // SAFETY: We hold a counted reference, so the allocation is alive until we release it.
        unsafe { self.context.as_ref() }
    }

    /// Takes another reference to the same counter.
    ///
    /// Equivalent to [`clone()`][Clone::clone].
    #[must_use]
    pub fn acquire(&self) -> Self {
        self.shared().inc_ref();

        Self {
            context: self.context,
        }
    }

    /// Gives up this reference, destroying the counter if it was the last one.
    ///
    /// Equivalent to dropping the handle.
    pub fn release(self) {
        drop(self);
    }

    /// The number of references currently held, for diagnostics.
    ///
    /// The value may be stale by the time the caller looks at it.
    #[must_use]
    pub fn ref_count(&self) -> usize {
        self.shared().ref_count()
    }

    /// An identifier unique among all counters created by this process, for diagnostics.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.context().id()
    }

    /// The flags the counter was created with.
    #[must_use]
    pub fn flags(&self) -> Flags {
        self.context().flags()
    }

    /// Adds `n` to the counter, saturating at [`MAX_VALUE`][crate::MAX_VALUE], and wakes whoever
    /// can now proceed.
    ///
    /// Never blocks and never fails. Returns the amount actually added, which is less than `n`
    /// if the counter saturated and `0` if it was already full.
    ///
    /// If called from within a [`ReadinessObserver`], the counter is updated immediately but
    /// observers are notified only after the current notification cascade completes. See
    /// [`signal_allowed()`][crate::signal_allowed].
    ///
    /// # Example
    ///
    /// ```rust
    /// use event_counter::{EventCounter, MAX_VALUE};
    ///
    /// let counter = EventCounter::new();
    ///
    /// assert_eq!(counter.signal(u64::MAX), MAX_VALUE);
    /// assert_eq!(counter.signal(1), 0);
    /// ```
    pub fn signal(&self, n: u64) -> u64 {
        let added = self.context().signal(n);

        if added > 0 {
            signal_guard::notify(self, Readiness::READABLE);
        }

        added
    }

    /// Reads the counter, blocking while it is zero unless the counter is
    /// [non-blocking][Flags::NONBLOCKING].
    ///
    /// In normal mode returns the whole counter and resets it to zero. In
    /// [semaphore mode][Flags::SEMAPHORE] decrements the counter by one and returns `1`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::WouldBlock`][crate::Error::WouldBlock] if the counter is zero and
    /// was created with [`Flags::NONBLOCKING`].
    pub fn read(&self) -> Result<u64> {
        if self.flags().is_nonblocking() {
            self.try_read()
        } else {
            self.read_with(&WaitOptions::new())
        }
    }

    /// Reads the counter without ever blocking.
    ///
    /// # Errors
    ///
    /// Returns [`Error::WouldBlock`][crate::Error::WouldBlock] if the counter is zero.
    pub fn try_read(&self) -> Result<u64> {
        self.finish_read(self.context().read(None))
    }

    /// Reads the counter, blocking while it is zero for as long as `options` allow.
    ///
    /// Blocks even if the counter was created with [`Flags::NONBLOCKING`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cancelled`][crate::Error::Cancelled] if the cancellation token in
    /// `options` fired or its deadline elapsed while the counter was zero. The counter is left
    /// unchanged in that case.
    pub fn read_with(&self, options: &WaitOptions) -> Result<u64> {
        self.finish_read(self.context().read(Some(options)))
    }

    fn finish_read(&self, result: Result<u64>) -> Result<u64> {
        let value = result?;
        signal_guard::notify(self, Readiness::WRITABLE);
        Ok(value)
    }

    /// Adds `value` to the counter, blocking while that would exceed
    /// [`MAX_VALUE`][crate::MAX_VALUE] unless the counter is [non-blocking][Flags::NONBLOCKING].
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`][crate::Error::InvalidArgument] if `value` is `0` or
    /// `u64::MAX`.
    ///
    /// Returns [`Error::WouldBlock`][crate::Error::WouldBlock] if there is no room for `value`
    /// and the counter was created with [`Flags::NONBLOCKING`].
    pub fn write(&self, value: u64) -> Result<()> {
        if self.flags().is_nonblocking() {
            self.try_write(value)
        } else {
            self.write_with(value, &WaitOptions::new())
        }
    }

    /// Adds `value` to the counter without ever blocking.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`][crate::Error::InvalidArgument] if `value` is `0` or
    /// `u64::MAX`.
    ///
    /// Returns [`Error::WouldBlock`][crate::Error::WouldBlock] if there is no room for `value`.
    pub fn try_write(&self, value: u64) -> Result<()> {
        self.finish_write(self.context().write(value, None))
    }

    /// Adds `value` to the counter, blocking while there is no room for it for as long as
    /// `options` allow.
    ///
    /// Blocks even if the counter was created with [`Flags::NONBLOCKING`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`][crate::Error::InvalidArgument] if `value` is `0` or
    /// `u64::MAX`.
    ///
    /// Returns [`Error::Cancelled`][crate::Error::Cancelled] if the cancellation token in
    /// `options` fired or its deadline elapsed while there was no room. The counter is left
    /// unchanged in that case.
    pub fn write_with(&self, value: u64, options: &WaitOptions) -> Result<()> {
        self.finish_write(self.context().write(value, Some(options)))
    }

    fn finish_write(&self, result: Result<()>) -> Result<()> {
        result?;
        signal_guard::notify(self, Readiness::READABLE);
        Ok(())
    }

    /// Returns a consistent snapshot of whether a read or a write of `1` would proceed
    /// without blocking.
    #[must_use]
    pub fn query_readiness(&self) -> Readiness {
        self.context().readiness()
    }

    /// Registers `observer` to be called whenever the counter becomes readable or writable.
    ///
    /// The observer stays registered until the returned [`Subscription`] is dropped.
    pub fn subscribe<O>(&self, observer: O) -> Subscription
    where
        O: ReadinessObserver + Send + Sync + 'static,
    {
        let observer: SharedObserver = Arc::new(observer);
        let observer_id = self.context().add_observer(observer);

        Subscription::new(self.acquire(), observer_id)
    }

    /// Returns a diagnostic snapshot of the counter.
    #[must_use]
    pub fn info(&self) -> CounterInfo {
        self.context().info()
    }

    /// The number of threads currently suspended in `read()` or `write()`.
    #[must_use]
    pub fn waiter_count(&self) -> usize {
        self.context().waiter_count()
    }
}

impl Default for EventCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for EventCounter {
    fn clone(&self) -> Self {
        self.acquire()
    }
}

impl Drop for EventCounter {
    fn drop(&mut self) {
        if self.shared().dec_ref() {
            // SAFETY: That was the last reference, so nobody else can observe the allocation
            // any more. It was created by `Box::leak()` in `from_context()`.
            drop(unsafe { Box::from_raw(self.context.as_ptr()) });
        }
    }
}

impl fmt::Debug for EventCounter {
    #[cfg_attr(test, mutants::skip)] // No API contract for debug output.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventCounter")
            .field("id", &self.id())
            .field("flags", &self.flags())
            .field("ref_count", &self.ref_count())
            .finish_non_exhaustive()
    }
}

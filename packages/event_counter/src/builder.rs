use crate::{EventCounter, Flags, Result};

/// Configures and creates an [`EventCounter`].
///
/// The default configuration is a counter starting at zero in normal blocking mode.
///
/// # Example
///
/// ```rust
/// use event_counter::{Error, EventCounter};
///
/// let semaphore = EventCounter::builder()
///     .initial_value(2)
///     .semaphore()
///     .nonblocking()
///     .build()
///     .unwrap();
///
/// assert_eq!(semaphore.read(), Ok(1));
/// assert_eq!(semaphore.read(), Ok(1));
/// assert_eq!(semaphore.read(), Err(Error::WouldBlock));
/// ```
#[derive(Clone, Debug, Default)]
pub struct EventCounterBuilder {
    initial_value: u64,
    flags: Flags,
}

impl EventCounterBuilder {
    /// Creates a builder with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the value the counter starts at.
    ///
    /// Must not exceed [`MAX_VALUE`][crate::MAX_VALUE], which [`build()`][Self::build] checks.
    #[must_use]
    pub fn initial_value(mut self, initial_value: u64) -> Self {
        self.initial_value = initial_value;
        self
    }

    /// Makes reads consume a single unit instead of the whole counter.
    #[must_use]
    pub fn semaphore(mut self) -> Self {
        self.flags |= Flags::SEMAPHORE;
        self
    }

    /// Makes `read()` and `write()` fail instead of suspending.
    #[must_use]
    pub fn nonblocking(mut self) -> Self {
        self.flags |= Flags::NONBLOCKING;
        self
    }

    /// Replaces all flags with `flags`.
    #[must_use]
    pub fn flags(mut self, flags: Flags) -> Self {
        self.flags = flags;
        self
    }

    /// Creates the counter.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`][crate::Error::InvalidArgument] if the initial value
    /// exceeds [`MAX_VALUE`][crate::MAX_VALUE].
    pub fn build(self) -> Result<EventCounter> {
        EventCounter::create(self.initial_value, self.flags)
    }
}

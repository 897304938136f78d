use bitflags::bitflags;

bitflags! {
    /// Options fixed when an [`EventCounter`][crate::EventCounter] is created.
    #[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
    pub struct Flags: u32 {
        /// Each read consumes a single unit instead of the whole counter.
        const SEMAPHORE = 1 << 0;

        /// [`read()`][crate::EventCounter::read] and [`write()`][crate::EventCounter::write]
        /// fail with [`Error::WouldBlock`][crate::Error::WouldBlock] instead of suspending.
        const NONBLOCKING = 1 << 1;
    }
}

impl Flags {
    /// Whether reads consume a single unit at a time.
    #[must_use]
    pub fn is_semaphore(self) -> bool {
        self.contains(Self::SEMAPHORE)
    }

    /// Whether `read()` and `write()` default to non-blocking behavior.
    #[must_use]
    pub fn is_nonblocking(self) -> bool {
        self.contains(Self::NONBLOCKING)
    }
}

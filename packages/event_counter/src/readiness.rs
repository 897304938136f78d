use bitflags::bitflags;

bitflags! {
    /// Readiness of an [`EventCounter`][crate::EventCounter] for polling collaborators.
    ///
    /// Returned by [`query_readiness()`][crate::EventCounter::query_readiness] as a snapshot and
    /// delivered to [`ReadinessObserver`][crate::ReadinessObserver]s as the readiness that
    /// triggered a notification.
    #[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
    pub struct Readiness: u8 {
        /// The counter is nonzero, so a read would succeed without blocking.
        const READABLE = 1 << 0;

        /// The counter is below [`MAX_VALUE`][crate::MAX_VALUE], so a write of at least
        /// the value `1` would succeed without blocking.
        const WRITABLE = 1 << 1;
    }
}

impl Readiness {
    /// Computes the readiness of a counter holding `count`.
    pub(crate) fn of_count(count: u64) -> Self {
        let mut readiness = Self::empty();
        readiness.set(Self::READABLE, count > 0);
        readiness.set(Self::WRITABLE, count < crate::MAX_VALUE);
        readiness
    }

    /// Whether a read would succeed without blocking.
    #[must_use]
    pub fn is_readable(self) -> bool {
        self.contains(Self::READABLE)
    }

    /// Whether a write of `1` would succeed without blocking.
    #[must_use]
    pub fn is_writable(self) -> bool {
        self.contains(Self::WRITABLE)
    }
}

use std::fmt::{self, Display};

/// A point-in-time description of an [`EventCounter`][crate::EventCounter] for diagnostics.
///
/// The [`Display`] form uses the same key-value lines that descriptor listings of kernel event
/// counters use, so tooling that parses those can parse this too:
///
/// ```text
/// eventfd-count:                5
/// eventfd-id: 1
/// eventfd-semaphore: 0
/// ```
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[non_exhaustive]
pub struct CounterInfo {
    /// The counter's process-unique identifier.
    pub id: u64,

    /// The counter value at the time of the snapshot.
    pub count: u64,

    /// Whether the counter is in semaphore mode.
    pub semaphore: bool,
}

impl Display for CounterInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "eventfd-count: {:16x}", self.count)?;
        writeln!(f, "eventfd-id: {}", self.id)?;
        writeln!(f, "eventfd-semaphore: {}", u8::from(self.semaphore))
    }
}

use std::ops::Deref;
use std::sync::atomic::{self, AtomicUsize};

/// Combines a value and a thread-safe count of owning references to it.
///
/// The count is independent of any lock inside `T`, so references can be taken and released
/// while operations on the value are in flight.
#[derive(Debug)]
pub(crate) struct WithRefCount<T> {
    value: T,
    ref_count: AtomicUsize,
}

impl<T> WithRefCount<T> {
    /// Creates a new reference-counted wrapper around `T` with one reference.
    #[must_use]
    pub(crate) fn new(value: T) -> Self {
        Self {
            value,
            ref_count: AtomicUsize::new(1),
        }
    }

    /// Increments the reference count.
    ///
    /// # Panics
    ///
    /// Panics if the reference count was zero (indicating resurrection of a destroyed value).
    ///
    /// Panics if the reference count would overflow.
    pub(crate) fn inc_ref(&self) {
        // Relaxed is enough: a new reference can only be made from an existing one,
        // which already orders everything it needs to. The count is checked before it
        // changes, so a failed increment leaves it untouched.
        let result = self
            .ref_count
            .fetch_update(atomic::Ordering::Relaxed, atomic::Ordering::Relaxed, |count| {
                match count {
                    0 => None,
                    _ => count.checked_add(1),
                }
            });

        match result {
            Ok(_) => {}
            Err(0) => panic!(
                "reference count resurrection - indicates a serious bug in reference counting logic"
            ),
            Err(_) => panic!(
                "reference count overflow - indicates a serious bug in reference counting logic"
            ),
        }
    }

    /// Decrements the reference count and returns true if this was the last reference.
    ///
    /// # Panics
    ///
    /// Panics if the reference count would underflow (go below zero).
    pub(crate) fn dec_ref(&self) -> bool {
        match self.ref_count.fetch_sub(1, atomic::Ordering::Release) {
            1 => {
                // We need an Acquire fence here to ensure we have observed all writes before drop.
                // On x86 this does nothing but weaker architectures may delay writes.
                atomic::fence(atomic::Ordering::Acquire);

                true
            }
            0 => panic!(
                "reference count underflow - indicates a serious bug in reference counting logic"
            ),
            _ => false,
        }
    }

    /// Returns the current reference count.
    ///
    /// The value may be stale by the time the caller looks at it.
    #[must_use]
    pub(crate) fn ref_count(&self) -> usize {
        self.ref_count.load(atomic::Ordering::Relaxed)
    }
}

impl<T> Deref for WithRefCount<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.value
    }
}

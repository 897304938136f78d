use std::fmt::{self, Display};

use thiserror::Error;

/// Errors that can occur when operating on an [`EventCounter`][crate::EventCounter].
#[derive(Clone, Copy, Debug, Error, Eq, PartialEq)]
#[non_exhaustive]
pub enum Error {
    /// The operation could not proceed immediately and the caller asked not to block.
    ///
    /// This is an expected outcome in non-blocking mode. Retry once the counter reports
    /// the relevant readiness.
    #[error("operation would block")]
    WouldBlock,

    /// The caller supplied a value the counter cannot accept.
    ///
    /// Writes must be in `1..=MAX_VALUE` and initial values must not exceed
    /// [`MAX_VALUE`][crate::MAX_VALUE].
    #[error("invalid argument: {value} is not an accepted counter value")]
    InvalidArgument {
        /// The rejected value.
        value: u64,
    },

    /// A blocking operation was interrupted before its condition was satisfied.
    ///
    /// The counter is left exactly as it was before the operation started.
    #[error("blocking operation was cancelled: {reason}")]
    Cancelled {
        /// What interrupted the operation.
        reason: CancelReason,
    },
}

impl Error {
    /// Whether this is [`Error::WouldBlock`].
    #[must_use]
    pub fn is_would_block(&self) -> bool {
        matches!(self, Self::WouldBlock)
    }

    /// Whether this is [`Error::Cancelled`], for any reason.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

/// Why a blocking operation was cancelled.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[non_exhaustive]
pub enum CancelReason {
    /// The [`CancelToken`][crate::CancelToken] passed to the operation was cancelled.
    Token,

    /// The deadline passed to the operation elapsed.
    TimedOut,
}

impl Display for CancelReason {
    #[cfg_attr(test, mutants::skip)] // No API contract for error message.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Token => write!(f, "cancellation was requested"),
            Self::TimedOut => write!(f, "deadline elapsed"),
        }
    }
}

/// A specialized `Result` type for event counter operations, returning the crate's
/// [`Error`] type as the error value.
pub type Result<T> = std::result::Result<T, Error>;

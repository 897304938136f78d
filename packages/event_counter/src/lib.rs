#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! A 64-bit event counter that lets threads signal each other and wait for "something happened"
//! without exchanging any payload.
//!
//! An [`EventCounter`] holds an accumulated count. Writers add to it with
//! [`write()`][EventCounter::write] or [`signal()`][EventCounter::signal], readers consume it with
//! [`read()`][EventCounter::read]. Readers block while the count is zero and writers block while
//! their addition would exceed [`MAX_VALUE`], so the counter can never overflow.
//!
//! The same primitive serves several purposes:
//!
//! * Readiness notification: poll [`query_readiness()`][EventCounter::query_readiness] or
//!   [`subscribe()`][EventCounter::subscribe] a [`ReadinessObserver`].
//! * A lightweight semaphore: create the counter with [`Flags::SEMAPHORE`] and each read
//!   takes exactly one unit.
//! * Cross-thread "work is available" signaling: many writers, one reader that drains the total.
//!
//! Blocking calls can be bounded with a deadline or interrupted with a [`CancelToken`] via
//! [`WaitOptions`]. An interrupted call never changes the counter.
//!
//! # Example
//!
//! ```rust
//! use std::thread;
//!
//! use event_counter::EventCounter;
//!
//! let counter = EventCounter::new();
//!
//! let producers = (1..=4)
//!     .map(|n| {
//!         let counter = counter.clone();
//!         thread::spawn(move || counter.write(n).unwrap())
//!     })
//!     .collect::<Vec<_>>();
//!
//! let mut total = 0;
//! while total < 10 {
//!     total += counter.read().unwrap();
//! }
//!
//! for producer in producers {
//!     producer.join().unwrap();
//! }
//!
//! assert_eq!(total, 10);
//! ```
//!
//! # Semaphore example
//!
//! ```rust
//! use event_counter::{Error, EventCounter, Flags};
//!
//! let permits = EventCounter::create(3, Flags::SEMAPHORE | Flags::NONBLOCKING).unwrap();
//!
//! for _ in 0..3 {
//!     assert_eq!(permits.read(), Ok(1));
//! }
//!
//! assert_eq!(permits.read(), Err(Error::WouldBlock));
//! ```

mod builder;
mod cancel;
mod context;
mod counter;
mod error;
mod flags;
mod info;
mod observer;
mod readiness;
mod ref_count;
mod signal_guard;
mod wait_set;

pub use builder::*;
pub use cancel::{CancelToken, WaitOptions};
pub use counter::*;
pub use error::*;
pub use flags::*;
pub use info::*;
pub use observer::{ReadinessObserver, Subscription};
pub use readiness::*;
pub use signal_guard::signal_allowed;

/// The largest value an [`EventCounter`] can hold, and the largest value a single
/// [`write()`][EventCounter::write] accepts.
///
/// One less than `u64::MAX`, which is reserved so that "full" can never be confused with a
/// wrapped-around counter.
pub const MAX_VALUE: u64 = u64::MAX - 1;

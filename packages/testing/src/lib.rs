#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![cfg_attr(coverage_nightly, coverage(off))] // This is all test code, no need to test it.

//! Private helpers for tests, benchmarks and examples in the `event_counter` workspace.
//!
//! Most tests of a blocking primitive fail by hanging rather than by panicking, so the helpers
//! here turn a hang into a test failure with a useful message.

use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

/// How long a test may run before the watchdog declares it hung.
///
/// Miri is dramatically slower for thread synchronization, so it gets a longer allowance.
#[must_use]
pub fn watchdog_timeout() -> Duration {
    if cfg!(miri) {
        Duration::from_secs(60)
    } else {
        Duration::from_secs(10)
    }
}

/// Runs `test_fn` on a separate thread and fails if it does not finish within
/// [`watchdog_timeout()`].
///
/// A panic in `test_fn` is propagated to the caller unchanged.
///
/// When the `MUTATION_TESTING` environment variable is set to "1", the watchdog is disabled and
/// `test_fn` runs directly on the calling thread, so that the mutation testing tool can detect
/// hanging mutations with its own timeout.
///
/// # Panics
///
/// Panics if `test_fn` exceeds the timeout.
///
/// # Example
///
/// ```rust
/// use testing::with_watchdog;
///
/// let answer = with_watchdog(|| 6 * 7);
/// assert_eq!(answer, 42);
/// ```
pub fn with_watchdog<F, R>(test_fn: F) -> R
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    if std::env::var("MUTATION_TESTING").as_deref() == Ok("1") {
        return test_fn();
    }

    let (tx, rx) = mpsc::channel();

    let test_thread = thread::spawn(move || {
        let result = test_fn();
        // If this fails, the receiver has already given up on us.
        drop(tx.send(result));
    });

    let timeout = watchdog_timeout();

    match rx.recv_timeout(timeout) {
        Ok(result) => {
            test_thread.join().expect("test thread already sent its result");
            result
        }
        Err(mpsc::RecvTimeoutError::Timeout) => {
            panic!("test did not finish within {timeout:?}, assuming it is hung");
        }
        Err(mpsc::RecvTimeoutError::Disconnected) => match test_thread.join() {
            Ok(()) => panic!("test thread exited without sending a result"),
            Err(e) => std::panic::resume_unwind(e),
        },
    }
}

/// Polls `condition` until it returns `true`.
///
/// Used to wait for another thread to reach a state that is only observable through
/// diagnostics, such as "is now suspended in a blocking call".
///
/// # Panics
///
/// Panics if `condition` does not become `true` within [`watchdog_timeout()`].
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicBool, Ordering};
/// use std::thread;
///
/// use testing::wait_until;
///
/// let flag = Arc::new(AtomicBool::new(false));
///
/// thread::spawn({
///     let flag = Arc::clone(&flag);
///     move || flag.store(true, Ordering::Relaxed)
/// });
///
/// wait_until(|| flag.load(Ordering::Relaxed));
/// ```
pub fn wait_until(condition: impl Fn() -> bool) {
    const POLL_INTERVAL: Duration = Duration::from_millis(1);

    let timeout = watchdog_timeout();
    let started = Instant::now();

    while !condition() {
        assert!(
            started.elapsed() < timeout,
            "condition did not become true within {timeout:?}"
        );

        thread::sleep(POLL_INTERVAL);
    }
}

//! Integration tests for readiness observers: what they are told, when, and what they may do
//! from inside the callback.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use event_counter::{EventCounter, Flags, Readiness, signal_allowed};
use testing::{wait_until, with_watchdog};

fn recording_observer(
    log: &Arc<Mutex<Vec<Readiness>>>,
) -> impl Fn(Readiness) + Send + Sync + 'static {
    let log = Arc::clone(log);
    move |readiness| log.lock().unwrap().push(readiness)
}

#[test]
fn observer_sees_readable_then_writable() {
    let counter = EventCounter::new();
    let log = Arc::new(Mutex::new(Vec::new()));
    let _subscription = counter.subscribe(recording_observer(&log));

    counter.write(2).unwrap();
    counter.read().unwrap();

    assert_eq!(
        *log.lock().unwrap(),
        vec![Readiness::READABLE, Readiness::WRITABLE]
    );
}

#[test]
fn saturated_signal_does_not_notify() {
    let counter = EventCounter::with_initial_value(event_counter::MAX_VALUE).unwrap();
    let log = Arc::new(Mutex::new(Vec::new()));
    let _subscription = counter.subscribe(recording_observer(&log));

    assert_eq!(counter.signal(1), 0);

    assert!(log.lock().unwrap().is_empty());
}

#[test]
fn every_observer_is_notified() {
    let counter = EventCounter::new();
    let first = Arc::new(Mutex::new(Vec::new()));
    let second = Arc::new(Mutex::new(Vec::new()));

    let _first = counter.subscribe(recording_observer(&first));
    let _second = counter.subscribe(recording_observer(&second));

    counter.signal(1);

    assert_eq!(*first.lock().unwrap(), vec![Readiness::READABLE]);
    assert_eq!(*second.lock().unwrap(), vec![Readiness::READABLE]);
}

#[test]
fn observer_can_read_the_counter_it_observes() {
    let counter = EventCounter::create(0, Flags::SEMAPHORE).unwrap();
    let forwarded = Arc::new(AtomicU64::new(0));

    let _subscription = counter.subscribe({
        let counter = counter.clone();
        let forwarded = Arc::clone(&forwarded);
        move |readiness: Readiness| {
            if readiness.is_readable() {
                while let Ok(value) = counter.try_read() {
                    forwarded.fetch_add(value, Ordering::Relaxed);
                }
            }
        }
    });

    counter.signal(3);

    assert_eq!(forwarded.load(Ordering::Relaxed), 3);
    assert_eq!(counter.info().count, 0);
}

#[test]
fn chain_of_counters_is_delivered_without_recursion() {
    const CHAIN_LENGTH: usize = 1_000;

    let counters = (0..CHAIN_LENGTH)
        .map(|_| EventCounter::new())
        .collect::<Vec<_>>();
    let nested_allowed = Arc::new(AtomicUsize::new(0));

    // Each counter forwards its readiness to the next one.
    let subscriptions = counters
        .windows(2)
        .map(|pair| {
            let next = pair[1].clone();
            let nested_allowed = Arc::clone(&nested_allowed);
            pair[0].subscribe(move |_: Readiness| {
                if signal_allowed() {
                    nested_allowed.fetch_add(1, Ordering::Relaxed);
                }
                next.signal(1);
            })
        })
        .collect::<Vec<_>>();

    counters[0].signal(1);

    assert!(counters.iter().all(|counter| counter.info().count == 1));
    assert_eq!(nested_allowed.load(Ordering::Relaxed), 0);
    assert!(signal_allowed());

    drop(subscriptions);
}

#[test]
fn remove_and_read_collects_pending_value() {
    let counter = EventCounter::new();
    let subscription = counter.subscribe(|_: Readiness| {});

    counter.signal(4);
    counter.signal(5);

    assert_eq!(subscription.remove_and_read(), Ok(9));
    assert_eq!(counter.ref_count(), 1);
}

#[test]
fn remove_and_read_wakes_blocked_writer() {
    with_watchdog(|| {
        let counter = EventCounter::with_initial_value(event_counter::MAX_VALUE).unwrap();
        let subscription = counter.subscribe(|_: Readiness| {});

        let writer = thread::spawn({
            let counter = counter.clone();
            move || counter.write(1)
        });

        wait_until(|| counter.waiter_count() == 1);

        assert_eq!(subscription.remove_and_read(), Ok(event_counter::MAX_VALUE));
        assert_eq!(writer.join().unwrap(), Ok(()));
        assert_eq!(counter.info().count, 1);
    });
}

#[test]
fn observer_runs_on_signaling_thread() {
    with_watchdog(|| {
        let counter = EventCounter::new();
        let observed_thread = Arc::new(Mutex::new(None));

        let _subscription = counter.subscribe({
            let observed_thread = Arc::clone(&observed_thread);
            move |_: Readiness| *observed_thread.lock().unwrap() = Some(thread::current().id())
        });

        let signaler = thread::spawn({
            let counter = counter.clone();
            move || {
                counter.signal(1);
                thread::current().id()
            }
        });

        let signaler_id = signaler.join().unwrap();

        assert_eq!(*observed_thread.lock().unwrap(), Some(signaler_id));
    });
}

#[test]
fn subscription_keeps_counter_alive() {
    let counter = EventCounter::new();
    let subscription = counter.subscribe(|_: Readiness| {});

    drop(counter);

    let counter = subscription.counter().clone();
    counter.signal(2);
    assert_eq!(counter.ref_count(), 2);

    assert_eq!(subscription.remove_and_read(), Ok(2));
}

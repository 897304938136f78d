//! Integration tests for suspending reads and writes: wakeups, cancellation and deadlines under
//! real thread contention.

use std::thread;
use std::time::{Duration, Instant};

use event_counter::{CancelReason, CancelToken, Error, EventCounter, Flags, MAX_VALUE, WaitOptions};
use testing::{wait_until, with_watchdog};

#[test]
fn blocked_reader_wakes_on_write() {
    with_watchdog(|| {
        let counter = EventCounter::new();

        let reader = thread::spawn({
            let counter = counter.clone();
            move || counter.read()
        });

        wait_until(|| counter.waiter_count() == 1);
        counter.write(3).unwrap();

        assert_eq!(reader.join().unwrap(), Ok(3));
    });
}

#[test]
fn blocked_writer_wakes_on_read() {
    with_watchdog(|| {
        let counter = EventCounter::with_initial_value(MAX_VALUE).unwrap();

        let writer = thread::spawn({
            let counter = counter.clone();
            move || counter.write(7)
        });

        wait_until(|| counter.waiter_count() == 1);
        assert_eq!(counter.read(), Ok(MAX_VALUE));

        assert_eq!(writer.join().unwrap(), Ok(()));
        assert_eq!(counter.read(), Ok(7));
    });
}

#[test]
fn normal_mode_signal_satisfies_one_of_many_readers() {
    with_watchdog(|| {
        let counter = EventCounter::new();

        let readers = (0..2)
            .map(|_| {
                let counter = counter.clone();
                thread::spawn(move || counter.read())
            })
            .collect::<Vec<_>>();

        wait_until(|| counter.waiter_count() == 2);

        counter.signal(10);
        wait_until(|| counter.info().count == 0);
        assert_eq!(counter.waiter_count(), 1);

        counter.signal(20);

        let mut results = readers
            .into_iter()
            .map(|reader| reader.join().unwrap().unwrap())
            .collect::<Vec<_>>();
        results.sort_unstable();

        assert_eq!(results, vec![10, 20]);
    });
}

#[test]
fn semaphore_signal_releases_exactly_that_many_readers() {
    with_watchdog(|| {
        let counter = EventCounter::create(0, Flags::SEMAPHORE).unwrap();

        let readers = (0..4)
            .map(|_| {
                let counter = counter.clone();
                thread::spawn(move || counter.read())
            })
            .collect::<Vec<_>>();

        wait_until(|| counter.waiter_count() == 4);

        counter.signal(2);

        // Polled without sleeping: the two readers left behind must never be woken, not even
        // briefly, while the released ones take their units.
        while counter.info().count > 0 {
            assert_eq!(counter.waiter_count(), 2);
        }

        for _ in 0..10_000 {
            assert_eq!(counter.waiter_count(), 2);
        }

        counter.signal(2);

        for reader in readers {
            assert_eq!(reader.join().unwrap(), Ok(1));
        }
    });
}

#[test]
fn timeout_expires_without_side_effects() {
    let counter = EventCounter::new();

    let started = Instant::now();
    let options = WaitOptions::new().timeout(Duration::from_millis(20));
    let error = counter.read_with(&options).unwrap_err();

    assert!(started.elapsed() >= Duration::from_millis(20));
    assert_eq!(
        error,
        Error::Cancelled {
            reason: CancelReason::TimedOut
        }
    );
    assert_eq!(counter.waiter_count(), 0);
    assert_eq!(counter.info().count, 0);
}

#[test]
fn past_deadline_fails_without_waiting_when_not_ready() {
    let counter = EventCounter::with_initial_value(MAX_VALUE).unwrap();
    let options = WaitOptions::new().deadline(Instant::now());

    assert_eq!(
        counter.write_with(1, &options),
        Err(Error::Cancelled {
            reason: CancelReason::TimedOut
        })
    );
    assert_eq!(counter.info().count, MAX_VALUE);
}

#[test]
fn ready_operation_ignores_expired_deadline() {
    let counter = EventCounter::with_initial_value(2).unwrap();
    let options = WaitOptions::new().deadline(Instant::now());

    assert_eq!(counter.read_with(&options), Ok(2));
}

#[test]
fn cancel_token_interrupts_blocked_reader() {
    with_watchdog(|| {
        let counter = EventCounter::new();
        let token = CancelToken::new();

        let reader = thread::spawn({
            let counter = counter.clone();
            let options = WaitOptions::new().cancel_token(token.clone());
            move || counter.read_with(&options)
        });

        wait_until(|| counter.waiter_count() == 1);
        token.cancel();

        let error = reader.join().unwrap().unwrap_err();
        assert!(error.is_cancelled());
        assert_eq!(counter.waiter_count(), 0);

        // The counter is still usable by others.
        counter.signal(1);
        assert_eq!(counter.try_read(), Ok(1));
    });
}

#[test]
fn cancel_token_applies_to_many_waits() {
    with_watchdog(|| {
        let counter = EventCounter::new();
        let token = CancelToken::new();

        let readers = (0..3)
            .map(|_| {
                let counter = counter.clone();
                let options = WaitOptions::new().cancel_token(token.clone());
                thread::spawn(move || counter.read_with(&options))
            })
            .collect::<Vec<_>>();

        wait_until(|| counter.waiter_count() == 3);
        token.cancel();

        for reader in readers {
            assert_eq!(
                reader.join().unwrap(),
                Err(Error::Cancelled {
                    reason: CancelReason::Token
                })
            );
        }
    });
}

#[test]
fn already_cancelled_token_fails_fast() {
    let counter = EventCounter::new();
    let token = CancelToken::new();
    token.cancel();

    let options = WaitOptions::new().cancel_token(token);

    assert_eq!(
        counter.read_with(&options),
        Err(Error::Cancelled {
            reason: CancelReason::Token
        })
    );
}

#[test]
fn nonblocking_counter_can_still_wait_explicitly() {
    with_watchdog(|| {
        let counter = EventCounter::create(0, Flags::NONBLOCKING).unwrap();

        let reader = thread::spawn({
            let counter = counter.clone();
            move || counter.read_with(&WaitOptions::new())
        });

        wait_until(|| counter.waiter_count() == 1);
        counter.signal(2);

        assert_eq!(reader.join().unwrap(), Ok(2));
    });
}

#[test]
fn many_producers_and_consumers_conserve_the_total() {
    const PRODUCERS: u64 = 4;
    const WRITES_PER_PRODUCER: u64 = 500;

    with_watchdog(|| {
        let counter = EventCounter::new();
        let done = CancelToken::new();

        let consumers = (0..3)
            .map(|_| {
                let counter = counter.clone();
                let options = WaitOptions::new().cancel_token(done.clone());
                thread::spawn(move || {
                    let mut total = 0_u64;
                    while let Ok(value) = counter.read_with(&options) {
                        total += value;
                    }
                    total
                })
            })
            .collect::<Vec<_>>();

        let producers = (0..PRODUCERS)
            .map(|_| {
                let counter = counter.clone();
                thread::spawn(move || {
                    for value in 1..=WRITES_PER_PRODUCER {
                        counter.write(value).unwrap();
                    }
                })
            })
            .collect::<Vec<_>>();

        for producer in producers {
            producer.join().unwrap();
        }

        let expected = PRODUCERS * WRITES_PER_PRODUCER * (WRITES_PER_PRODUCER + 1) / 2;

        // Cancelled reads take nothing, so whatever the consumers left behind is still counted.
        done.cancel();

        let consumed: u64 = consumers.into_iter().map(|c| c.join().unwrap()).sum();
        let leftover = counter.try_read().unwrap_or(0);

        assert_eq!(consumed + leftover, expected);
    });
}

#[test]
fn writers_contending_for_room_all_complete() {
    with_watchdog(|| {
        let counter = EventCounter::with_initial_value(MAX_VALUE - 10).unwrap();

        let writers = (0..8)
            .map(|_| {
                let counter = counter.clone();
                thread::spawn(move || {
                    for _ in 0..50 {
                        counter.write(5).unwrap();
                    }
                })
            })
            .collect::<Vec<_>>();

        // The sum exceeds what a single counter can hold, so it is tracked in a wider type.
        let mut drained = 0_u128;
        let target = u128::from(MAX_VALUE - 10) + 8 * 50 * 5;

        while drained < target {
            drained += u128::from(counter.read().unwrap());
        }

        for writer in writers {
            writer.join().unwrap();
        }

        assert_eq!(drained, target);
        assert_eq!(counter.try_read(), Err(Error::WouldBlock));
    });
}

//! Limits how many workers run a section at once by using a counter in semaphore mode as a
//! pool of permits.
//!
//! Run with: `cargo run --example event_counter_semaphore`.
#![allow(
    clippy::arithmetic_side_effects,
    reason = "this is example code that does not need production-level safety"
)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use event_counter::EventCounter;

const PERMITS: u64 = 2;
const WORKERS: usize = 6;

fn main() {
    let permits = EventCounter::builder()
        .initial_value(PERMITS)
        .semaphore()
        .build()
        .unwrap();

    let active = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let workers = (0..WORKERS)
        .map(|worker| {
            let permits = permits.clone();
            let active = Arc::clone(&active);
            let peak = Arc::clone(&peak);

            thread::spawn(move || {
                // Each read takes exactly one permit.
                permits.read().unwrap();

                let now_active = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now_active, Ordering::SeqCst);
                println!("worker {worker} running ({now_active} active)");

                thread::sleep(Duration::from_millis(20));

                active.fetch_sub(1, Ordering::SeqCst);
                permits.signal(1);
            })
        })
        .collect::<Vec<_>>();

    for worker in workers {
        worker.join().unwrap();
    }

    println!(
        "peak concurrency was {} with {PERMITS} permits",
        peak.load(Ordering::SeqCst)
    );
    assert!(peak.load(Ordering::SeqCst) <= 2);
}

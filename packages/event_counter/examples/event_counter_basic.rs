//! A work queue where several producers announce work items through one counter and a single
//! consumer drains them in batches.
//!
//! Debug-level logs show the counter being created and destroyed. Raise the subscriber to
//! `TRACE` to also see every suspension and wake.
//!
//! Run with: `cargo run --example event_counter_basic`.
#![allow(
    clippy::arithmetic_side_effects,
    reason = "this is example code that does not need production-level safety"
)]

use std::thread;
use std::time::Duration;

use event_counter::{EventCounter, WaitOptions};

const PRODUCERS: u64 = 3;
const ITEMS_PER_PRODUCER: u64 = 5;

fn main() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let work_available = EventCounter::new();

    let producers = (0..PRODUCERS)
        .map(|producer| {
            let work_available = work_available.clone();
            thread::spawn(move || {
                for item in 0..ITEMS_PER_PRODUCER {
                    thread::sleep(Duration::from_millis(10 * (producer + 1)));
                    println!("producer {producer} queued item {item}");
                    work_available.write(1).unwrap();
                }
            })
        })
        .collect::<Vec<_>>();

    let expected = PRODUCERS * ITEMS_PER_PRODUCER;
    let mut processed = 0;
    let options = WaitOptions::new().timeout(Duration::from_secs(5));

    while processed < expected {
        let batch = work_available
            .read_with(&options)
            .expect("producers stalled for longer than the timeout");

        processed += batch;
        println!("consumer took a batch of {batch}, {processed}/{expected} done");
    }

    for producer in producers {
        producer.join().unwrap();
    }

    println!();
    println!("{}", work_available.info());
}

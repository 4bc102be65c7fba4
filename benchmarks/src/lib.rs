//! Workloads shared by the Spindle benchmarks.

use std::thread;

use spindle::{mpsc, spsc, Consumer, Mode, Producer, WorkStealingPool};

/// Message counts used by the channel benchmarks.
pub const MESSAGE_COUNTS: [usize; 3] = [1_000, 10_000, 100_000];

/// Push `value`, spinning until there is room.
#[inline]
pub fn push_spinning<T, M: Mode>(producer: &Producer<T, M>, mut value: T) {
    while let Err(full) = producer.try_push(value) {
        value = full.into_inner();
        std::hint::spin_loop();
    }
}

/// Pop one item, spinning until one is available.
#[inline]
pub fn pop_spinning<T, M: Mode>(consumer: &Consumer<T, M>) -> T {
    loop {
        if let Ok(value) = consumer.try_pop() {
            return value;
        }
        std::hint::spin_loop();
    }
}

/// Move `messages` items through a fresh SPSC channel, producer on a
/// separate thread. Returns the sum received so the work cannot be elided.
pub fn pump_spsc(capacity: usize, messages: usize) -> u64 {
    let (tx, rx) = spsc::<u64>(capacity);
    let sender = thread::spawn(move || {
        for i in 0..messages {
            push_spinning(&tx, i as u64);
        }
    });
    let sum = (0..messages).map(|_| pop_spinning(&rx)).sum();
    let _ = sender.join();
    sum
}

/// Move `messages` items from `producers` threads through a fresh MPSC
/// channel.
pub fn pump_mpsc(capacity: usize, producers: usize, messages: usize) -> u64 {
    let (tx, rx) = mpsc::<u64>(capacity);
    let per_producer = messages / producers.max(1);
    let senders: Vec<_> = (0..producers)
        .map(|_| {
            let tx = tx.clone();
            thread::spawn(move || {
                for i in 0..per_producer {
                    push_spinning(&tx, i as u64);
                }
            })
        })
        .collect();

    let sum = (0..per_producer * producers)
        .map(|_| pop_spinning(&rx))
        .sum();
    for sender in senders {
        let _ = sender.join();
    }
    sum
}

/// A short CPU-bound task body.
#[inline]
pub fn spin_work(iterations: u64) -> u64 {
    (0..iterations).fold(0u64, |acc, x| acc.wrapping_mul(31).wrapping_add(x))
}

/// Pool sized to the machine, as most benchmarks want.
///
/// # Panics
///
/// Panics if worker threads cannot be spawned.
pub fn machine_pool() -> WorkStealingPool {
    WorkStealingPool::new(num_cpus::get()).expect("spawn benchmark pool")
}

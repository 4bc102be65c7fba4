//! Shared helpers for the Spindle integration tests.

use std::sync::Once;
use std::time::{Duration, Instant};

use spindle::{Consumer, Mode, Producer};
use tracing_subscriber::EnvFilter;

/// Install a test-friendly `tracing` subscriber once per process.
///
/// Output is captured by the test harness and filtered by `RUST_LOG`, so
/// `RUST_LOG=spindle_executor=trace cargo test` shows steals and worker
/// state changes for a failing test.
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Push `value`, retrying with a yield until the channel accepts it.
pub fn push_until_accepted<T, M: Mode>(producer: &Producer<T, M>, mut value: T) {
    loop {
        match producer.try_push(value) {
            Ok(()) => return,
            Err(full) => {
                value = full.into_inner();
                std::thread::yield_now();
            }
        }
    }
}

/// Pop exactly `count` items, failing the test if the channel stays empty
/// for longer than `idle_limit`.
pub fn collect_exactly<T, M: Mode>(
    consumer: &Consumer<T, M>,
    count: usize,
    idle_limit: Duration,
) -> Vec<T> {
    let mut items = Vec::with_capacity(count);
    while items.len() < count {
        match consumer.wait_pop(idle_limit) {
            Ok(item) => items.push(item),
            Err(err) => panic!("stalled after {} of {} items: {}", items.len(), count, err),
        }
    }
    items
}

/// Poll `condition` until it holds or `limit` elapses.
pub fn wait_until(limit: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + limit;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    condition()
}

#[cfg(test)]
mod tests {
    use super::*;
    use spindle::{mpsc, spsc};

    #[test]
    fn test_push_until_accepted_waits_for_room() {
        let (tx, rx) = spsc::<u32>(1);
        tx.try_push(1).unwrap();

        let consumer = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(5));
            collect_exactly(&rx, 2, Duration::from_secs(5))
        });
        push_until_accepted(&tx, 2);

        assert_eq!(consumer.join().unwrap(), vec![1, 2]);
    }

    #[test]
    #[should_panic(expected = "stalled after 0 of 1 items")]
    fn test_collect_exactly_reports_stall() {
        let (_tx, rx) = mpsc::<u8>(2);
        collect_exactly(&rx, 1, Duration::from_millis(5));
    }

    #[test]
    fn test_wait_until() {
        assert!(wait_until(Duration::from_millis(5), || true));
        assert!(!wait_until(Duration::from_millis(5), || false));
    }
}

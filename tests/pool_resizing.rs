//! Growing and shrinking a live pool.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use spindle::prelude::*;
use spindle::{PoolError, WorkerState};
use spindle_tests::{init_tracing, wait_until};

const SETTLE: Duration = Duration::from_secs(5);

#[test]
fn shrink_is_lazy_and_retired_workers_drain_their_queue() {
    init_tracing();
    let pool = WorkStealingPool::new(3).unwrap();
    let counter = Arc::new(AtomicUsize::new(0));

    // Park work on worker 2 before retiring it.
    let handles: Vec<_> = (0..20)
        .map(|_| {
            let counter = counter.clone();
            pool.submit_to(2, move || {
                thread::sleep(Duration::from_millis(1));
                counter.fetch_add(1, Ordering::Relaxed);
            })
            .unwrap()
        })
        .collect();
    pool.set_thread_count(1).unwrap();
    assert_eq!(pool.thread_count(), 1);

    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(counter.load(Ordering::Relaxed), 20);

    assert!(wait_until(SETTLE, || {
        let workers = pool.stats().workers;
        workers[1] == WorkerState::Exited && workers[2] == WorkerState::Exited
    }));
    assert_eq!(pool.stats().workers[0], WorkerState::Running);
}

#[test]
fn regrowing_reuses_retired_slots() {
    let pool = WorkStealingPool::new(4).unwrap();
    pool.set_thread_count(2).unwrap();
    pool.set_thread_count(4).unwrap();

    let stats = pool.stats();
    assert_eq!(stats.thread_count, 4);
    assert_eq!(stats.workers.len(), 4);
    assert!(stats.workers.iter().all(|state| *state != WorkerState::Exited));

    pool.set_thread_count(6).unwrap();
    assert_eq!(pool.stats().workers.len(), 6);

    let counter = Arc::new(AtomicUsize::new(0));
    let queued = pool
        .submit_batch((0..60).map(|_| {
            let counter = counter.clone();
            move || {
                counter.fetch_add(1, Ordering::Relaxed);
            }
        }))
        .unwrap();
    assert_eq!(queued, 60);
    pool.shutdown();
    assert_eq!(counter.load(Ordering::Relaxed), 60);
}

#[test]
fn growing_from_zero_runs_the_backlog() {
    init_tracing();
    let pool = WorkStealingPool::new(0).unwrap();
    let handles: Vec<_> = (0..10).map(|i| pool.submit(move || i + 1).unwrap()).collect();
    assert_eq!(pool.stats().queued, 10);

    pool.set_thread_count(2).unwrap();
    let total: i32 = handles.into_iter().map(|h| h.join().unwrap()).sum();
    assert_eq!(total, 55);
}

#[test]
fn shrinking_to_zero_parks_new_work() {
    let pool = WorkStealingPool::new(2).unwrap();
    pool.set_thread_count(0).unwrap();
    assert_eq!(pool.thread_count(), 0);

    let mut handle = pool.submit(|| "late").unwrap();
    thread::sleep(Duration::from_millis(20));
    assert!(!handle.is_finished());

    pool.set_thread_count(1).unwrap();
    assert_eq!(handle.join(), Ok("late"));
}

#[test]
fn orphaned_tasks_on_retired_queues_are_stolen() {
    let pool = WorkStealingPool::new(2).unwrap();
    pool.set_thread_count(1).unwrap();
    assert!(wait_until(SETTLE, || pool.stats().workers[1] == WorkerState::Exited));

    let results: Vec<_> = (0..5)
        .map(|i| pool.submit_to(1, move || i * 10).unwrap())
        .map(|h| h.join().unwrap())
        .collect();
    assert_eq!(results, vec![0, 10, 20, 30, 40]);
}

#[test]
fn resizing_from_inside_a_task() {
    let pool = Arc::new(WorkStealingPool::new(2).unwrap());
    let inner = pool.clone();

    let grown = pool
        .submit(move || {
            inner.set_thread_count(3).map(|()| inner.thread_count())
        })
        .unwrap()
        .join()
        .unwrap();
    assert!(matches!(grown, Ok(3)));
    assert_eq!(pool.thread_count(), 3);
}

/// Run `pool.shutdown()` on another thread and report whether it returned
/// within `limit`.
fn shutdown_within(pool: &Arc<WorkStealingPool>, limit: Duration) -> bool {
    let (tx, rx) = std::sync::mpsc::channel();
    let pool = pool.clone();
    thread::spawn(move || {
        pool.shutdown();
        let _ = tx.send(());
    });
    rx.recv_timeout(limit).is_ok()
}

#[test]
fn shutdown_from_a_task_during_shutdown() {
    init_tracing();
    let pool = Arc::new(WorkStealingPool::new(1).unwrap());
    let inner = pool.clone();
    let handle = pool
        .submit(move || {
            thread::sleep(Duration::from_millis(50));
            inner.shutdown();
        })
        .unwrap();

    thread::sleep(Duration::from_millis(10));
    assert!(shutdown_within(&pool, Duration::from_secs(3)), "nested shutdown hung");
    assert_eq!(handle.join(), Ok(()));
    assert!(pool.is_shut_down());
}

#[test]
fn resizing_from_a_task_during_shutdown() {
    init_tracing();
    let pool = Arc::new(WorkStealingPool::new(1).unwrap());
    let inner = pool.clone();
    let handle = pool
        .submit(move || {
            thread::sleep(Duration::from_millis(50));
            inner.set_thread_count(2)
        })
        .unwrap();

    thread::sleep(Duration::from_millis(10));
    assert!(shutdown_within(&pool, Duration::from_secs(3)), "resize during shutdown hung");
    assert!(matches!(handle.join(), Ok(Err(PoolError::ShutDown))));
    assert!(pool.stats().workers.iter().all(|state| *state == WorkerState::Exited));
}

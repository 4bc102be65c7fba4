//! The work-stealing thread pool.

use std::mem;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_utils::CachePadded;
use parking_lot::{Mutex, RwLock};
use rand::Rng;
use spindle_core::{package, Job, PoolError, PoolResult, TaskHandle, TaskId, WorkerId};
use spindle_scheduler::{QueueStats, TaskQueue};
use tracing::{debug, warn};

use crate::config::{Placement, PoolConfig};
use crate::worker::{self, WorkerCell, WorkerState};

/// Pool-wide counters. Jobs hold their own reference so they can report
/// panics without keeping the rest of the pool alive.
#[derive(Default)]
pub(crate) struct PoolMetrics {
    submitted: AtomicU64,
    executed: AtomicU64,
    stolen: AtomicU64,
    panicked: AtomicU64,
    discarded: AtomicU64,
}

impl PoolMetrics {
    pub(crate) fn record_executed(&self) {
        self.executed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_steal(&self) {
        self.stolen.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_panic(&self) {
        self.panicked.fetch_add(1, Ordering::Relaxed);
    }

    fn record_submitted(&self, count: usize) {
        self.submitted.fetch_add(count as u64, Ordering::Relaxed);
    }
}

/// State shared between the pool handle and its worker threads.
pub(crate) struct Shared {
    running: AtomicBool,
    /// Every slot ever spawned, indexed by worker. Replaced wholesale on
    /// growth so readers work from an immutable snapshot.
    slots: RwLock<Arc<[Arc<WorkerCell>]>>,
    /// Logical worker count used for placement. Slots at or past this index
    /// are retired.
    active: CachePadded<AtomicUsize>,
    next_queue: CachePadded<AtomicUsize>,
    /// Holds submissions while no worker is active.
    pub(crate) backlog: TaskQueue<Job>,
    pub(crate) metrics: Arc<PoolMetrics>,
}

impl Shared {
    pub(crate) fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub(crate) fn snapshot(&self) -> Arc<[Arc<WorkerCell>]> {
        self.slots.read().clone()
    }
}

/// Point-in-time view of a pool's activity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolStats {
    /// Logical worker count used for placement
    pub thread_count: usize,
    /// Tasks accepted by `submit`, `submit_to` and `submit_batch`
    pub submitted: u64,
    /// Tasks that ran to completion or panicked
    pub executed: u64,
    /// Tasks a worker took from a sibling's queue
    pub stolen: u64,
    /// Tasks that panicked
    pub panicked: u64,
    /// Tasks dropped unrun at shutdown
    pub discarded: u64,
    /// Tasks waiting in any queue, backlog included
    pub queued: usize,
    /// State of every spawned worker slot, by index
    pub workers: Vec<WorkerState>,
    /// Per-queue traffic, by worker index
    pub queues: Vec<QueueStats>,
}

/// A pool of OS threads, each owning a task queue, that steal from one
/// another when idle.
///
/// Idle workers spin with [`thread::yield_now`] rather than parking, so an
/// idle pool keeps its threads busy. A pool may have zero workers: submissions
/// then wait in a backlog until [`set_thread_count`](Self::set_thread_count)
/// grows the pool, and are discarded if it never does.
///
/// # Example
///
/// ```
/// use spindle_executor::WorkStealingPool;
///
/// let pool = WorkStealingPool::new(2).unwrap();
/// let handle = pool.submit(|| 6 * 7).unwrap();
/// assert_eq!(handle.join(), Ok(42));
/// ```
pub struct WorkStealingPool {
    shared: Arc<Shared>,
    config: PoolConfig,
    /// Join handles by worker index. Also serialises resizes. Never held
    /// across a join during shutdown.
    handles: Mutex<Vec<Option<JoinHandle<()>>>>,
    /// Submissions hold the read side from the running check until the job
    /// is queued; shutdown takes the write side to clear `running`.
    gate: RwLock<()>,
    next_task_id: AtomicU64,
}

impl WorkStealingPool {
    /// Create a pool with `worker_threads` workers and default settings
    /// otherwise.
    ///
    /// # Errors
    ///
    /// [`PoolError::Spawn`] if a worker thread cannot be created.
    pub fn new(worker_threads: usize) -> PoolResult<Self> {
        Self::with_config(PoolConfig {
            worker_threads,
            ..PoolConfig::default()
        })
    }

    /// Create a pool from an explicit configuration.
    ///
    /// # Errors
    ///
    /// [`PoolError::Spawn`] if a worker thread cannot be created. Workers
    /// spawned before the failure are shut down.
    pub fn with_config(config: PoolConfig) -> PoolResult<Self> {
        let empty: Arc<[Arc<WorkerCell>]> = Arc::from(Vec::new());
        let pool = Self {
            shared: Arc::new(Shared {
                running: AtomicBool::new(true),
                slots: RwLock::new(empty),
                active: CachePadded::new(AtomicUsize::new(0)),
                next_queue: CachePadded::new(AtomicUsize::new(0)),
                backlog: TaskQueue::new(WorkerId::new(usize::MAX)),
                metrics: Arc::new(PoolMetrics::default()),
            }),
            handles: Mutex::new(Vec::with_capacity(config.worker_threads)),
            gate: RwLock::new(()),
            next_task_id: AtomicU64::new(0),
            config,
        };

        pool.set_thread_count(pool.config.worker_threads)?;
        debug!(
            workers = pool.config.worker_threads,
            placement = ?pool.config.placement,
            "pool started"
        );
        Ok(pool)
    }

    /// The configuration this pool was created with.
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Logical worker count used to distribute new work.
    pub fn thread_count(&self) -> usize {
        self.shared.active.load(Ordering::Acquire)
    }

    /// Whether [`shutdown`](Self::shutdown) has been called.
    pub fn is_shut_down(&self) -> bool {
        !self.shared.is_running()
    }

    fn ensure_running(&self) -> PoolResult<()> {
        if self.shared.is_running() {
            Ok(())
        } else {
            Err(PoolError::ShutDown)
        }
    }

    /// Wrap `func` into a job that settles a fresh handle and reports panics
    /// to the pool counters.
    fn wrap_task<F, R>(&self, func: F) -> (Job, TaskHandle<R>)
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let id = TaskId::new(self.next_task_id.fetch_add(1, Ordering::Relaxed));
        let metrics = self.shared.metrics.clone();
        package(id, func, move || metrics.record_panic())
    }

    /// Run `func` on the pool and return a handle to its result.
    ///
    /// The destination queue is chosen by the configured [`Placement`]. A
    /// panic inside `func` is captured into the handle.
    ///
    /// # Errors
    ///
    /// [`PoolError::ShutDown`] after [`shutdown`](Self::shutdown).
    pub fn submit<F, R>(&self, func: F) -> PoolResult<TaskHandle<R>>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let _gate = self.gate.read();
        self.ensure_running()?;
        let (job, handle) = self.wrap_task(func);
        self.place(job);
        self.shared.metrics.record_submitted(1);
        Ok(handle)
    }

    /// Run `func` on the queue of worker `index` (modulo the number of
    /// spawned workers). Other workers may still steal it.
    ///
    /// # Errors
    ///
    /// [`PoolError::ShutDown`] after [`shutdown`](Self::shutdown).
    pub fn submit_to<F, R>(&self, index: usize, func: F) -> PoolResult<TaskHandle<R>>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let _gate = self.gate.read();
        self.ensure_running()?;
        let (job, handle) = self.wrap_task(func);
        let slots = self.shared.snapshot();
        if slots.is_empty() {
            self.shared.backlog.push(job);
        } else {
            slots[index % slots.len()].queue.push(job);
        }
        self.shared.metrics.record_submitted(1);
        Ok(handle)
    }

    /// Queue a batch of detached tasks: task `i` goes to queue
    /// `i % thread_count()`. Returns the number of tasks queued.
    ///
    /// Panics inside these tasks are counted and logged; there is no handle
    /// to carry them.
    ///
    /// # Errors
    ///
    /// [`PoolError::ShutDown`] after [`shutdown`](Self::shutdown).
    pub fn submit_batch<I, F>(&self, tasks: I) -> PoolResult<usize>
    where
        I: IntoIterator<Item = F>,
        F: FnOnce() + Send + 'static,
    {
        // Drain the caller's iterator before taking the gate; it may call
        // back into the pool.
        let jobs: Vec<Job> = tasks.into_iter().map(|task| Box::new(task) as Job).collect();
        let _gate = self.gate.read();
        self.ensure_running()?;
        let slots = self.shared.snapshot();
        let active = self.thread_count().min(slots.len());

        let queued = if active == 0 {
            self.shared.backlog.extend(jobs)
        } else {
            let mut buckets: Vec<Vec<Job>> = (0..active).map(|_| Vec::new()).collect();
            for (i, job) in jobs.into_iter().enumerate() {
                buckets[i % active].push(job);
            }
            slots
                .iter()
                .zip(buckets)
                .map(|(cell, bucket)| cell.queue.extend(bucket))
                .sum()
        };

        self.shared.metrics.record_submitted(queued);
        Ok(queued)
    }

    fn place(&self, job: Job) {
        let slots = self.shared.snapshot();
        let active = self.thread_count().min(slots.len());
        if active == 0 {
            self.shared.backlog.push(job);
            return;
        }

        let index = match self.config.placement {
            Placement::Random => rand::thread_rng().gen_range(0..active),
            Placement::RoundRobin => self.shared.next_queue.fetch_add(1, Ordering::Relaxed) % active,
        };
        slots[index].queue.push(job);
    }

    /// Change the logical worker count.
    ///
    /// Growing first reuses retired slots, joining the old thread (which may
    /// wait for it to finish its own queue) and starting a fresh one on the
    /// same queue, then spawns new slots. Shrinking only lowers the count and
    /// flags the excess workers as retired; each exits once its own queue is
    /// empty.
    ///
    /// # Errors
    ///
    /// [`PoolError::ShutDown`] after [`shutdown`](Self::shutdown), or
    /// [`PoolError::Spawn`] if a thread cannot be created. On a spawn failure
    /// the count stays at the number of workers actually running.
    pub fn set_thread_count(&self, count: usize) -> PoolResult<()> {
        // Fail fast: a task resizing during shutdown must not wait on the
        // handles lock.
        self.ensure_running()?;
        let mut handles = self.handles.lock();
        self.ensure_running()?;

        let current = self.thread_count();
        let slots = self.shared.snapshot();

        if count <= current {
            for cell in &slots[count..current] {
                cell.retire();
            }
            self.shared.active.store(count, Ordering::Release);
            if count < current {
                debug!(from = current, to = count, "pool shrinking");
            }
            return Ok(());
        }

        debug!(from = current, to = count, "pool growing");

        for index in current..count.min(slots.len()) {
            let cell = &slots[index];
            match handles[index].take() {
                // Resized from inside this very worker: it is mid-task, so
                // clearing the flag is enough to keep it serving.
                Some(handle) if handle.thread().id() == thread::current().id() => {
                    cell.revive();
                    handles[index] = Some(handle);
                }
                previous => {
                    if let Some(handle) = previous {
                        join_worker(index, handle);
                    }
                    cell.revive();
                    handles[index] = Some(self.spawn_worker(cell.clone())?);
                }
            }
            self.shared.active.store(index + 1, Ordering::Release);
        }

        if count > slots.len() {
            let mut grown = slots.to_vec();
            grown.extend((slots.len()..count).map(|index| Arc::new(WorkerCell::new(index))));
            let grown: Arc<[Arc<WorkerCell>]> = Arc::from(grown);
            *self.shared.slots.write() = grown.clone();
            handles.resize_with(count, || None);

            for cell in &grown[slots.len()..] {
                handles[cell.index()] = Some(self.spawn_worker(cell.clone())?);
                self.shared.active.store(cell.index() + 1, Ordering::Release);
            }
        }

        Ok(())
    }

    fn spawn_worker(&self, cell: Arc<WorkerCell>) -> PoolResult<JoinHandle<()>> {
        let index = cell.index();
        let mut builder =
            thread::Builder::new().name(format!("{}-{}", self.config.thread_name_prefix, index));
        if let Some(size) = self.config.stack_size {
            builder = builder.stack_size(size);
        }

        cell.set_state(WorkerState::Running);
        let shared = self.shared.clone();
        builder
            .spawn({
                let cell = cell.clone();
                move || worker::run(cell, shared)
            })
            .map_err(|source| {
                cell.set_state(WorkerState::Exited);
                PoolError::Spawn { index, source }
            })
    }

    /// Stop accepting work, let the workers finish every queued task they can
    /// reach, and join them. Tasks still queued afterwards (only possible when
    /// no worker was active) are discarded; their handles resolve to
    /// [`TaskError::Discarded`](spindle_core::TaskError::Discarded).
    ///
    /// Idempotent. Called from a worker thread, that worker is not joined and
    /// exits after its current task.
    pub fn shutdown(&self) {
        {
            let _gate = self.gate.write();
            if !self.shared.running.swap(false, Ordering::AcqRel) {
                return;
            }
        }

        // Workers may call back into the pool while finishing their queues,
        // so the handles lock is released before any join.
        let handles = mem::take(&mut *self.handles.lock());
        debug!(workers = handles.len(), "pool shutting down");

        let me = thread::current().id();
        for (index, handle) in handles.into_iter().enumerate() {
            if let Some(handle) = handle {
                if handle.thread().id() != me {
                    join_worker(index, handle);
                }
            }
        }

        let mut discarded = self.shared.backlog.drain().len();
        for cell in self.shared.snapshot().iter() {
            discarded += cell.queue.drain().len();
        }
        if discarded > 0 {
            self.shared
                .metrics
                .discarded
                .fetch_add(discarded as u64, Ordering::Relaxed);
            warn!(discarded, "tasks discarded at shutdown");
        }
        debug!("pool stopped");
    }

    /// Snapshot of counters and worker states.
    pub fn stats(&self) -> PoolStats {
        let slots = self.shared.snapshot();
        let metrics = &self.shared.metrics;
        let queues: Vec<QueueStats> = slots.iter().map(|cell| cell.queue.stats()).collect();
        let queued = queues.iter().map(|q| q.queue_length).sum::<usize>() + self.shared.backlog.len();

        PoolStats {
            thread_count: self.thread_count(),
            submitted: metrics.submitted.load(Ordering::Relaxed),
            executed: metrics.executed.load(Ordering::Relaxed),
            stolen: metrics.stolen.load(Ordering::Relaxed),
            panicked: metrics.panicked.load(Ordering::Relaxed),
            discarded: metrics.discarded.load(Ordering::Relaxed),
            queued,
            workers: slots.iter().map(|cell| cell.state()).collect(),
            queues,
        }
    }
}

fn join_worker(index: usize, handle: JoinHandle<()>) {
    if handle.join().is_err() {
        warn!(worker = index, "worker thread terminated abnormally");
    }
}

impl Drop for WorkStealingPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for WorkStealingPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkStealingPool")
            .field("thread_count", &self.thread_count())
            .field("running", &self.shared.is_running())
            .field("placement", &self.config.placement)
            .finish()
    }
}

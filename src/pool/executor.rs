//! Executor core: submission fan-out, stealing retrieval, drain, shutdown
//!
//! The executor owns N worker slots, each a bounded FIFO queue plus one OS
//! thread. Submissions fan out round-robin across the queues; workers retrieve
//! from their own queue first and steal from peers when it is empty. Draining
//! observes queue emptiness and the per-slot busy flags, gated against
//! concurrent submission by a small admission state machine.

use crate::error::{ExecError, ExecResult, TaskFailure};
use crate::pool::sizing::select_thread_count;
use crate::pool::slot::Slot;
use crate::pool::task::Task;
use crossbeam::utils::{Backoff, CachePadded};
use parking_lot::{Condvar, Mutex, RwLock};
use rustc_hash::FxHashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Duration;

/// Per-worker queue capacity when the configuration does not override it.
const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Poll interval for drain waiters that cannot help run tasks.
const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Full retrieval cycles over all queues before a worker falls back to a
/// blocking pop on its own queue.
const STEAL_ROUNDS: usize = 4;

/// How concurrent submissions are treated while a drain is in progress.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DrainMode {
    /// Hold `push` callers on a condition variable until the drain finishes.
    ///
    /// A task that itself submits work during a `Block` drain is held too;
    /// a drain waiting on such a task cannot finish. Use [`Reject`] when
    /// tasks may re-submit.
    ///
    /// [`Reject`]: DrainMode::Reject
    Block,

    /// Fail `push` with [`ExecError::Unavailable`] for the duration.
    Reject,
}

/// Admission gate positions consulted by `push`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Admission {
    /// Submissions proceed normally.
    Open,

    /// Submissions park until the active drain completes.
    Blocking,

    /// Submissions fail fast until the active drain completes.
    Rejecting,
}

/// Pool construction parameters.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Thread-name prefix; workers are named `{name}-worker-{index}`.
    pub name: String,

    /// Capacity of each worker's queue; full queues exert backpressure.
    /// Must be non-zero.
    pub queue_capacity: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            name: "taskpool".to_string(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

/// State shared between the executor handle and its worker threads.
struct Core {
    /// One slot per worker, fixed for the pool's lifetime.
    slots: Vec<Slot>,

    /// Set once by `stop`; workers exit their run loop on observing it.
    stopped: AtomicBool,

    /// Set on the first task failure; the pool rejects new work once set.
    failed: AtomicBool,

    /// The first recorded failure, handed to one `wait`/`join` caller.
    failure: Mutex<Option<TaskFailure>>,

    /// Admission gate consulted by every `push`.
    gate: Mutex<Admission>,

    /// Signaled when the gate reopens or the pool stops.
    gate_open: Condvar,

    /// Monotone rotor for round-robin submission fan-out.
    rotor: CachePadded<AtomicUsize>,

    /// Thread id → slot index, fully populated before any task runs.
    registry: RwLock<FxHashMap<ThreadId, usize>>,

    /// Startup barrier: number of workers that finished registering.
    ready: AtomicUsize,

    /// Non-pool threads currently inside `try_run_one`, counted for the
    /// whole attempt so a drain cannot miss a task they are executing.
    helpers: AtomicUsize,
}

/// A fixed-size pool of worker threads executing submitted tasks.
///
/// Tasks fan out over per-worker bounded queues and may be stolen by any
/// worker; FIFO order holds per queue but not across the pool. Dropping the
/// executor drains and joins it.
pub struct Executor {
    core: Arc<Core>,
    /// Worker thread handles, drained by `join`.
    handles: Mutex<Vec<JoinHandle<()>>>,
    /// Serializes concurrent `wait` callers.
    drain: Mutex<()>,
    name: String,
}

impl Executor {
    /// Creates a pool with `threads` workers, or a hardware-derived count
    /// when `threads` is zero.
    pub fn new(threads: usize) -> ExecResult<Self> {
        Self::with_config(threads, ExecutorConfig::default())
    }

    /// Creates a pool with explicit configuration.
    ///
    /// Does not return until every worker has registered itself, so the
    /// thread registry is complete before the caller can submit work. If an
    /// OS thread cannot be spawned, the workers already started are torn
    /// down and the error is returned; no partially-started pool survives.
    ///
    /// # Panics
    ///
    /// Panics if `config.queue_capacity` is zero.
    pub fn with_config(threads: usize, config: ExecutorConfig) -> ExecResult<Self> {
        let count = select_thread_count(threads);
        let slots = (0..count)
            .map(|index| Slot::new(index, config.queue_capacity))
            .collect();
        let core = Arc::new(Core {
            slots,
            stopped: AtomicBool::new(false),
            failed: AtomicBool::new(false),
            failure: Mutex::new(None),
            gate: Mutex::new(Admission::Open),
            gate_open: Condvar::new(),
            rotor: CachePadded::new(AtomicUsize::new(0)),
            registry: RwLock::new(FxHashMap::default()),
            ready: AtomicUsize::new(0),
            helpers: AtomicUsize::new(0),
        });

        let mut handles = Vec::with_capacity(count);
        for index in 0..count {
            let worker_core = Arc::clone(&core);
            let spawned = thread::Builder::new()
                .name(format!("{}-worker-{}", config.name, index))
                .spawn(move || worker_main(worker_core, index));
            match spawned {
                Ok(handle) => handles.push(handle),
                Err(err) => {
                    // Tear down whatever already started.
                    core.stopped.store(true, Ordering::Release);
                    for slot in &core.slots {
                        slot.queue.close();
                    }
                    for handle in handles {
                        let _ = handle.join();
                    }
                    return Err(ExecError::Spawn(err));
                }
            }
        }

        // The registry must be complete before the pool is handed out.
        while core.ready.load(Ordering::Acquire) < count {
            thread::yield_now();
        }
        log::debug!("{}: started {} workers", config.name, count);

        Ok(Self {
            core,
            handles: Mutex::new(handles),
            drain: Mutex::new(()),
            name: config.name,
        })
    }

    /// Submits a task for execution on some worker.
    ///
    /// The task is offered to every queue round-robin; if all are full the
    /// call blocks on the rotor's home queue until room opens, exerting
    /// backpressure on the caller. Fails when the pool is stopped, has
    /// recorded a task failure, or is draining in [`DrainMode::Reject`].
    pub fn push(&self, task: Task) -> ExecResult<()> {
        self.admit()?;

        let n = self.core.slots.len();
        let start = self.core.rotor.fetch_add(1, Ordering::Relaxed) % n;
        let mut task = task;
        for k in 0..n {
            match self.core.slots[(start + k) % n].queue.try_push(task) {
                Ok(()) => return Ok(()),
                Err(rejected) => task = rejected,
            }
        }

        // Every queue was full; enqueue on the home slot even if it blocks.
        if self.core.slots[start].queue.push(task) {
            Ok(())
        } else {
            Err(ExecError::Unavailable("executor is stopped"))
        }
    }

    /// Wraps a closure in a [`Task`] and submits it.
    pub fn spawn(&self, f: impl FnOnce() + Send + 'static) -> ExecResult<()> {
        self.push(Task::new(f))
    }

    /// Attempts to dequeue and execute exactly one pending task.
    ///
    /// Uses the same stealing retrieval as the workers and never blocks.
    /// Returns `true` if a task was executed. Safe to call from pool workers
    /// (inside a task) and from outside threads alike; waiters use it to
    /// help drain instead of deadlocking against the pool they run on.
    pub fn try_run_one(&self) -> bool {
        let core = &*self.core;
        match self.worker_index() {
            Some(index) => {
                let slot = &core.slots[index];
                // The flag is single-writer (this thread). Remember it so a
                // nested dequeue does not erase the outer task's busy marker.
                let prior = slot.busy.load(Ordering::Relaxed);
                match steal_task(core, index, &slot.busy) {
                    Some(task) => {
                        execute(core, task, Some(index));
                        slot.busy.store(prior, Ordering::Release);
                        true
                    }
                    None => false,
                }
            }
            None => {
                core.helpers.fetch_add(1, Ordering::AcqRel);
                let start = core.rotor.fetch_add(1, Ordering::Relaxed) % core.slots.len();
                let scratch = AtomicBool::new(false);
                let ran = match steal_task(core, start, &scratch) {
                    Some(task) => {
                        execute(core, task, None);
                        true
                    }
                    None => false,
                };
                core.helpers.fetch_sub(1, Ordering::AcqRel);
                ran
            }
        }
    }

    /// Drains the pool to idle.
    ///
    /// Flips the admission gate to `mode`, waits until every queue is empty
    /// and every in-flight task has finished, then reopens the gate.
    /// Concurrent `wait` callers are serialized. A waiter that is itself a
    /// pool worker helps drain via [`try_run_one`](Self::try_run_one).
    ///
    /// A worker parked behind another caller's drain keeps its busy flag
    /// raised and stalls that drain, so initiate at most one drain from
    /// inside the pool at a time.
    ///
    /// Surfaces the pool's first recorded task failure to exactly one
    /// caller; later drains of a failed pool return `Ok`.
    pub fn wait(&self, mode: DrainMode) -> ExecResult<()> {
        let _serial = self.drain.lock();

        *self.core.gate.lock() = match mode {
            DrainMode::Block => Admission::Blocking,
            DrainMode::Reject => Admission::Rejecting,
        };

        let waiter = self.worker_index();
        if waiter.is_some() {
            // A pool worker must help, or a backlog routed to this very
            // thread would wait on it forever.
            while !self.is_empty() {
                if !self.try_run_one() {
                    thread::yield_now();
                }
            }
        } else {
            while !self.is_empty() {
                thread::sleep(DRAIN_POLL_INTERVAL);
            }
        }

        // Queues are empty; wait out tasks already dequeued. The waiter's
        // own slot is excluded: its flag stays raised for the task it is
        // currently inside.
        let backoff = Backoff::new();
        loop {
            let active = self.core.helpers.load(Ordering::Acquire) != 0
                || self
                    .core
                    .slots
                    .iter()
                    .any(|slot| Some(slot.index) != waiter && slot.busy.load(Ordering::Acquire));
            if !active {
                break;
            }
            if backoff.is_completed() {
                thread::sleep(DRAIN_POLL_INTERVAL);
            } else {
                backoff.snooze();
            }
        }

        *self.core.gate.lock() = Admission::Open;
        self.core.gate_open.notify_all();

        if let Some(failure) = self.core.failure.lock().take() {
            return Err(ExecError::TaskFailed(failure));
        }
        Ok(())
    }

    /// Stops the pool: closes every queue and discards unpopped tasks.
    ///
    /// Workers blocked on their queue wake, observe the closed state, and
    /// exit. Tasks already mid-execution run to completion. Idempotent.
    pub fn stop(&self) {
        if self.core.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        let mut discarded = 0;
        for slot in &self.core.slots {
            discarded += slot.queue.close();
        }
        // Submitters parked behind a Block drain re-check and bail out.
        self.core.gate_open.notify_all();
        if discarded > 0 {
            log::debug!("{}: discarded {} queued tasks at stop", self.name, discarded);
        }
    }

    /// Drains the pool, stops it, and joins every worker thread.
    ///
    /// The deterministic shutdown path: after `join` returns, no pool thread
    /// is running. Returns the drain's result, so a recorded task failure
    /// surfaces here. Must not be called from a pool worker.
    pub fn join(&self) -> ExecResult<()> {
        debug_assert!(
            !self.is_worker_thread(),
            "join() must not be called from a pool worker"
        );
        let drained = self.wait(DrainMode::Reject);
        self.stop();
        let mut handles = self.handles.lock();
        for handle in handles.drain(..) {
            if handle.join().is_err() {
                log::error!("{}: a worker thread panicked outside task execution", self.name);
            }
        }
        drained
    }

    /// Number of worker threads, fixed at construction.
    pub fn thread_count(&self) -> usize {
        self.core.slots.len()
    }

    /// Returns `true` if the calling thread is one of this pool's workers.
    pub fn is_worker_thread(&self) -> bool {
        self.worker_index().is_some()
    }

    /// The calling worker's slot index, or `None` off-pool.
    pub fn worker_index(&self) -> Option<usize> {
        self.core
            .registry
            .read()
            .get(&thread::current().id())
            .copied()
    }

    /// Returns `true` if every queue held no tasks at the time of the call.
    ///
    /// A racy snapshot, suitable only for best-effort progress checks.
    pub fn is_empty(&self) -> bool {
        self.core.slots.iter().all(|slot| slot.queue.is_empty())
    }

    /// Total queued (not yet dequeued) tasks across all slots; a snapshot.
    pub fn pending_tasks(&self) -> usize {
        self.core.slots.iter().map(|slot| slot.queue.len()).sum()
    }

    /// Returns `true` once [`stop`](Self::stop) has run.
    pub fn is_stopped(&self) -> bool {
        self.core.stopped.load(Ordering::Acquire)
    }

    /// The pool's configured name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Checks the admission gate, parking or failing per the drain mode.
    fn admit(&self) -> ExecResult<()> {
        if self.core.stopped.load(Ordering::Acquire) {
            return Err(ExecError::Unavailable("executor is stopped"));
        }
        if self.core.failed.load(Ordering::Acquire) {
            return Err(ExecError::Unavailable("a task failed; pool rejects new work"));
        }
        let mut gate = self.core.gate.lock();
        loop {
            match *gate {
                Admission::Open => return Ok(()),
                Admission::Rejecting => {
                    return Err(ExecError::Unavailable("draining; submissions rejected"))
                }
                Admission::Blocking => {
                    self.gate_wait(&mut gate)?;
                }
            }
        }
    }

    /// Parks on the gate condvar; re-checks terminal states after waking.
    fn gate_wait(&self, gate: &mut parking_lot::MutexGuard<'_, Admission>) -> ExecResult<()> {
        self.core.gate_open.wait(gate);
        if self.core.stopped.load(Ordering::Acquire) {
            return Err(ExecError::Unavailable("executor is stopped"));
        }
        if self.core.failed.load(Ordering::Acquire) {
            return Err(ExecError::Unavailable("a task failed; pool rejects new work"));
        }
        Ok(())
    }
}

impl Drop for Executor {
    fn drop(&mut self) {
        // A worker cannot join itself; owners drop the pool from outside.
        if self.worker_index().is_none() {
            let _ = self.join();
        }
    }
}

impl std::fmt::Debug for Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor")
            .field("name", &self.name)
            .field("threads", &self.core.slots.len())
            .field("stopped", &self.core.stopped.load(Ordering::Acquire))
            .finish()
    }
}

/// Worker entry point: register, pass the startup barrier, run tasks.
fn worker_main(core: Arc<Core>, index: usize) {
    core.registry.write().insert(thread::current().id(), index);
    core.ready.fetch_add(1, Ordering::AcqRel);

    // No task may run before every worker is in the registry.
    let total = core.slots.len();
    while core.ready.load(Ordering::Acquire) < total {
        if core.stopped.load(Ordering::Acquire) {
            return;
        }
        thread::yield_now();
    }

    loop {
        if core.stopped.load(Ordering::Acquire) {
            break;
        }
        if let Some(task) = steal_task(&core, index, &core.slots[index].busy) {
            execute(&core, task, Some(index));
            core.slots[index].busy.store(false, Ordering::Release);
            continue;
        }
        // The only point where an idle worker sleeps.
        let slot = &core.slots[index];
        match slot.queue.pop(&slot.busy) {
            Some(task) => {
                execute(&core, task, Some(index));
                slot.busy.store(false, Ordering::Release);
            }
            None => break, // closed and empty
        }
    }
    log::trace!("worker {} exiting", index);
}

/// Stealing retrieval: the caller's own queue first, then every peer in
/// round-robin order, for up to `STEAL_ROUNDS` full cycles. Never blocks;
/// the bounded spin rides out transient contention, not the arrival of new
/// work.
fn steal_task(core: &Core, start: usize, busy: &AtomicBool) -> Option<Task> {
    let n = core.slots.len();
    let backoff = Backoff::new();
    for attempt in 0..(STEAL_ROUNDS * n) {
        let target = (start + attempt) % n;
        if let Some(task) = core.slots[target].queue.try_pop(busy) {
            return Some(task);
        }
        if attempt % n == n - 1 {
            backoff.snooze();
        }
    }
    None
}

/// Runs one task, recording its failure if it is the pool's first.
///
/// Busy flags are managed by the caller; `worker` is only failure
/// attribution.
fn execute(core: &Core, task: Task, worker: Option<usize>) {
    let label = task.label().map(str::to_owned);
    if let Err(message) = task.invoke() {
        record_failure(core, TaskFailure { label, worker, message });
    }
}

/// Records the pool's first failure and flips it to rejecting.
fn record_failure(core: &Core, failure: TaskFailure) {
    log::error!("{}", failure);
    {
        let mut first = core.failure.lock();
        if first.is_none() {
            *first = Some(failure);
        }
    }
    core.failed.store(true, Ordering::Release);
}

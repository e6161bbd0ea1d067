//! Periodic scheduler: hands due callbacks to the executor
//!
//! One timer thread sleeps on a condition variable until the earliest
//! deadline in a min-heap, then submits the due callbacks to the pool as
//! ordinary tasks. The timer thread never runs user code itself; a slow
//! callback delays the pool, not the clock.

use crate::error::{ExecError, ExecResult};
use crate::pool::{Executor, Task};
use parking_lot::{Condvar, Mutex};
use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use rustc_hash::FxHashMap;

/// Window granted to the timer thread on `stop` before it is detached.
const STOP_GRACE: Duration = Duration::from_secs(2);

static NEXT_TIMER_ID: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a scheduled entry.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct TimerId(u64);

impl TimerId {
    fn next() -> Self {
        Self(NEXT_TIMER_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// The raw numeric id.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

type Callback = Arc<dyn Fn() + Send + Sync + 'static>;

/// One scheduled callback in the heap.
struct Entry {
    /// When the callback is next due.
    due: Instant,

    id: TimerId,

    /// Re-arm period; `None` for one-shot entries.
    period: Option<Duration>,

    callback: Callback,

    /// Shared with the cancellation handle; checked at fire time.
    cancelled: Arc<AtomicBool>,
}

// BinaryHeap is a max-heap; order entries by reversed deadline so the
// earliest due entry surfaces first.
impl Ord for Entry {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        other
            .due
            .cmp(&self.due)
            .then_with(|| other.id.0.cmp(&self.id.0))
    }
}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.id == other.id
    }
}

impl Eq for Entry {}

/// Heap plus the cancellation index, guarded by one mutex.
struct TimerState {
    /// Scheduled entries, earliest deadline on top.
    due: BinaryHeap<Entry>,

    /// Cancellation flags for ids that are scheduled or firing.
    live: FxHashMap<TimerId, Arc<AtomicBool>>,
}

/// Schedules one-shot and repeating callbacks onto an [`Executor`].
///
/// Stopping the timer prevents further submissions; callbacks already handed
/// to the pool still run. Dropping the timer stops it.
pub struct Timer {
    state: Arc<Mutex<TimerState>>,
    notify: Arc<Condvar>,
    shutdown: Arc<AtomicBool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Timer {
    /// Spawns the timer thread bound to `executor`.
    pub fn new(executor: Arc<Executor>) -> ExecResult<Self> {
        let state = Arc::new(Mutex::new(TimerState {
            due: BinaryHeap::new(),
            live: FxHashMap::default(),
        }));
        let notify = Arc::new(Condvar::new());
        let shutdown = Arc::new(AtomicBool::new(false));

        let thread_state = Arc::clone(&state);
        let thread_notify = Arc::clone(&notify);
        let thread_shutdown = Arc::clone(&shutdown);
        let handle = thread::Builder::new()
            .name(format!("{}-timer", executor.name()))
            .spawn(move || run_loop(executor, thread_state, thread_notify, thread_shutdown))
            .map_err(ExecError::Spawn)?;

        Ok(Self {
            state,
            notify,
            shutdown,
            handle: Mutex::new(Some(handle)),
        })
    }

    /// Schedules a one-shot callback to run after `delay`.
    pub fn schedule(&self, delay: Duration, callback: impl Fn() + Send + Sync + 'static) -> TimerId {
        self.register(delay, None, Arc::new(callback))
    }

    /// Schedules a callback to run after `initial_delay` and then every
    /// `period` until cancelled.
    ///
    /// # Panics
    ///
    /// Panics if `period` is zero.
    pub fn schedule_repeating(
        &self,
        initial_delay: Duration,
        period: Duration,
        callback: impl Fn() + Send + Sync + 'static,
    ) -> TimerId {
        assert!(period > Duration::ZERO, "repeat period must be non-zero");
        self.register(initial_delay, Some(period), Arc::new(callback))
    }

    /// Cancels a scheduled entry.
    ///
    /// Returns `true` if the entry was still scheduled. Once `cancel`
    /// returns, the callback does not begin a new execution, even when its
    /// submission to the pool was already in flight; a callback already
    /// running is not interrupted.
    pub fn cancel(&self, id: TimerId) -> bool {
        let flag = self.state.lock().live.remove(&id);
        match flag {
            Some(cancelled) => {
                cancelled.store(true, Ordering::Release);
                true
            }
            None => false,
        }
    }

    /// Number of entries currently scheduled; a snapshot.
    pub fn pending(&self) -> usize {
        self.state.lock().live.len()
    }

    /// Stops the timer thread.
    ///
    /// Entries not yet due never fire. The thread is given a bounded window
    /// to finish (it may be blocked submitting into a full pool) and is
    /// detached if it overruns. Idempotent.
    pub fn stop(&self) {
        {
            // Set under the state lock so a run loop between its shutdown
            // check and its park cannot miss the wakeup.
            let _state = self.state.lock();
            self.shutdown.store(true, Ordering::Release);
        }
        self.notify.notify_one();

        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            let deadline = Instant::now() + STOP_GRACE;
            while !handle.is_finished() && Instant::now() < deadline {
                thread::sleep(Duration::from_millis(10));
            }
            if handle.is_finished() {
                let _ = handle.join();
            } else {
                log::warn!("timer thread still busy after {:?}; detaching", STOP_GRACE);
            }
        }
    }

    fn register(&self, delay: Duration, period: Option<Duration>, callback: Callback) -> TimerId {
        let id = TimerId::next();
        let cancelled = Arc::new(AtomicBool::new(false));
        {
            let mut state = self.state.lock();
            state.live.insert(id, Arc::clone(&cancelled));
            state.due.push(Entry {
                due: Instant::now() + delay,
                id,
                period,
                callback,
                cancelled,
            });
        }
        self.notify.notify_one();
        id
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Timer thread body: sleep until the earliest deadline, fire, re-arm.
fn run_loop(
    executor: Arc<Executor>,
    state: Arc<Mutex<TimerState>>,
    notify: Arc<Condvar>,
    shutdown: Arc<AtomicBool>,
) {
    loop {
        if shutdown.load(Ordering::Acquire) {
            break;
        }

        let fired = {
            let mut state = state.lock();
            // Re-check after taking the lock; stop() may have raced the scan.
            if shutdown.load(Ordering::Acquire) {
                break;
            }
            let now = Instant::now();
            let mut fired = Vec::new();
            while state.due.peek().map_or(false, |entry| entry.due <= now) {
                if let Some(entry) = state.due.pop() {
                    if entry.cancelled.load(Ordering::Acquire) {
                        state.live.remove(&entry.id);
                    } else {
                        fired.push(entry);
                    }
                }
            }
            if fired.is_empty() {
                match state.due.peek().map(|entry| entry.due) {
                    Some(due) => {
                        notify.wait_for(&mut state, due.saturating_duration_since(now));
                    }
                    None => notify.wait(&mut state),
                }
                continue;
            }
            fired
        };

        // Submissions happen outside the lock: push may block on pool
        // backpressure, and schedule/cancel must stay callable meanwhile.
        let mut completed = Vec::new();
        let mut rearmed = Vec::new();
        for mut entry in fired {
            // cancel() may have landed after the heap pop.
            if entry.cancelled.load(Ordering::Acquire) {
                completed.push(entry.id);
                continue;
            }
            let callback = Arc::clone(&entry.callback);
            let cancelled = Arc::clone(&entry.cancelled);
            let label = format!("timer-{}", entry.id.as_u64());
            // The task re-checks the flag when it runs: push may park on a
            // full queue, and cancel() can land while it waits.
            let task = Task::new(move || {
                if !cancelled.load(Ordering::Acquire) {
                    callback();
                }
            })
            .with_label(label);
            match executor.push(task) {
                Ok(()) => {
                    if entry.cancelled.load(Ordering::Acquire) {
                        completed.push(entry.id);
                    } else if let Some(period) = entry.period {
                        entry.due = Instant::now() + period;
                        rearmed.push(entry);
                    } else {
                        completed.push(entry.id);
                    }
                }
                Err(err) => {
                    log::warn!("timer entry {} dropped: {}", entry.id.as_u64(), err);
                    completed.push(entry.id);
                }
            }
        }

        let mut state = state.lock();
        for id in completed {
            state.live.remove(&id);
        }
        for entry in rearmed {
            state.due.push(entry);
        }
    }
    log::trace!("timer thread exiting");
}

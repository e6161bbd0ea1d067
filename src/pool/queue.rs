//! Bounded FIFO task queue, one per worker slot
//!
//! A mutex-protected ring with two condition variables: `not_empty` wakes
//! blocked poppers, `not_full` wakes blocked pushers. Any thread may push or
//! pop; FIFO order holds per queue. Closing the queue is one-way: pending
//! tasks are discarded, blocked callers wake and observe the closed state,
//! and all later operations fail fast.

use crate::pool::task::Task;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};

/// Interior queue state guarded by the mutex.
struct QueueState {
    /// Pending tasks in arrival order.
    items: VecDeque<Task>,

    /// One-way flag set by `close`.
    closed: bool,
}

/// A bounded multi-producer multi-consumer FIFO of [`Task`]s.
///
/// Pop operations take the caller's busy flag and raise it while still inside
/// the queue's critical section, so an observer never sees the queue empty
/// before the dequeued task is marked as running somewhere.
pub struct TaskQueue {
    state: Mutex<QueueState>,
    not_empty: Condvar,
    not_full: Condvar,
    capacity: usize,
}

impl TaskQueue {
    /// Creates an open queue holding at most `capacity` tasks.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "queue capacity must be non-zero");
        Self {
            state: Mutex::new(QueueState {
                items: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            capacity,
        }
    }

    /// Enqueues a task, blocking while the queue is full.
    ///
    /// Returns `false` if the queue is (or becomes) closed; the task is
    /// dropped in that case.
    pub fn push(&self, task: Task) -> bool {
        let mut state = self.state.lock();
        loop {
            // Re-check closed after every wakeup; close() may race the wait.
            if state.closed {
                return false;
            }
            if state.items.len() < self.capacity {
                break;
            }
            self.not_full.wait(&mut state);
        }
        state.items.push_back(task);
        self.not_empty.notify_one();
        true
    }

    /// Enqueues a task only if there is room right now.
    ///
    /// Returns the task back to the caller when the queue is full or closed.
    pub fn try_push(&self, task: Task) -> Result<(), Task> {
        let mut state = self.state.lock();
        if state.closed || state.items.len() >= self.capacity {
            return Err(task);
        }
        state.items.push_back(task);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Dequeues a task, blocking while the queue is empty.
    ///
    /// `busy` is raised before the queue's lock is released, so emptiness
    /// checks and the flag are never both observed clear while a task is in
    /// flight. Returns `None` once the queue is closed and empty.
    pub fn pop(&self, busy: &AtomicBool) -> Option<Task> {
        let mut state = self.state.lock();
        loop {
            if let Some(task) = state.items.pop_front() {
                busy.store(true, Ordering::Release);
                self.not_full.notify_one();
                return Some(task);
            }
            if state.closed {
                return None;
            }
            self.not_empty.wait(&mut state);
        }
    }

    /// Dequeues a task only if one is available right now.
    ///
    /// Raises `busy` under the same contract as [`pop`](Self::pop).
    pub fn try_pop(&self, busy: &AtomicBool) -> Option<Task> {
        let mut state = self.state.lock();
        let task = state.items.pop_front()?;
        busy.store(true, Ordering::Release);
        self.not_full.notify_one();
        Some(task)
    }

    /// Closes the queue, discarding any pending tasks.
    ///
    /// Every blocked pusher and popper wakes and observes the closed state.
    /// Returns the number of tasks discarded; repeated calls return zero.
    pub fn close(&self) -> usize {
        let discarded = {
            let mut state = self.state.lock();
            if state.closed {
                return 0;
            }
            state.closed = true;
            std::mem::take(&mut state.items)
        };
        self.not_empty.notify_all();
        self.not_full.notify_all();
        // Task destructors run outside the lock.
        discarded.len()
    }

    /// Returns `true` if the queue held no tasks at the time of the call.
    pub fn is_empty(&self) -> bool {
        self.state.lock().items.is_empty()
    }

    /// Returns the number of pending tasks at the time of the call.
    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    /// Returns `true` once [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    fn counting_task(counter: &Arc<AtomicUsize>) -> Task {
        let counter = Arc::clone(counter);
        Task::new(move || {
            counter.fetch_add(1, Ordering::Relaxed);
        })
    }

    #[test]
    fn test_push_pop_fifo_order() {
        let queue = TaskQueue::new(8);
        let order = Arc::new(Mutex::new(Vec::new()));
        for i in 0..4 {
            let order = Arc::clone(&order);
            assert!(queue.push(Task::new(move || order.lock().push(i))));
        }
        assert_eq!(queue.len(), 4);

        let busy = AtomicBool::new(false);
        while let Some(task) = queue.try_pop(&busy) {
            assert!(busy.load(Ordering::Acquire), "busy must be raised by pop");
            task.invoke().unwrap();
            busy.store(false, Ordering::Release);
        }
        assert_eq!(*order.lock(), vec![0, 1, 2, 3]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_try_push_full_returns_task() {
        let queue = TaskQueue::new(2);
        assert!(queue.try_push(Task::new(|| {})).is_ok());
        assert!(queue.try_push(Task::new(|| {})).is_ok());

        let rejected = queue.try_push(Task::new(|| {}).with_label("overflow"));
        let task = rejected.unwrap_err();
        assert_eq!(task.label(), Some("overflow"));

        // Room opens up after a pop.
        let busy = AtomicBool::new(false);
        assert!(queue.try_pop(&busy).is_some());
        assert!(queue.try_push(task).is_ok());
    }

    #[test]
    fn test_try_pop_empty_leaves_busy_clear() {
        let queue = TaskQueue::new(4);
        let busy = AtomicBool::new(false);
        assert!(queue.try_pop(&busy).is_none());
        assert!(!busy.load(Ordering::Acquire));
    }

    #[test]
    fn test_blocking_pop_waits_for_push() {
        let queue = Arc::new(TaskQueue::new(4));
        let counter = Arc::new(AtomicUsize::new(0));

        let consumer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                let busy = AtomicBool::new(false);
                let task = queue.pop(&busy);
                assert!(task.is_some());
                task.unwrap().invoke().unwrap();
            })
        };

        thread::sleep(Duration::from_millis(50));
        assert!(queue.push(counting_task(&counter)));
        consumer.join().unwrap();
        assert_eq!(counter.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_blocking_push_waits_for_room() {
        let queue = Arc::new(TaskQueue::new(1));
        let counter = Arc::new(AtomicUsize::new(0));
        assert!(queue.push(counting_task(&counter)));

        let producer = {
            let queue = Arc::clone(&queue);
            let counter = Arc::clone(&counter);
            thread::spawn(move || {
                // Queue is full; this blocks until the consumer below pops.
                assert!(queue.push(counting_task(&counter)));
            })
        };

        thread::sleep(Duration::from_millis(50));
        let busy = AtomicBool::new(false);
        assert!(queue.try_pop(&busy).is_some());
        producer.join().unwrap();
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_close_wakes_blocked_popper() {
        let queue = Arc::new(TaskQueue::new(4));
        let consumer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                let busy = AtomicBool::new(false);
                queue.pop(&busy)
            })
        };

        thread::sleep(Duration::from_millis(50));
        queue.close();
        assert!(consumer.join().unwrap().is_none());
    }

    #[test]
    fn test_close_wakes_blocked_pusher() {
        let queue = Arc::new(TaskQueue::new(1));
        assert!(queue.push(Task::new(|| {})));

        let producer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.push(Task::new(|| {})))
        };

        thread::sleep(Duration::from_millis(50));
        queue.close();
        assert!(!producer.join().unwrap(), "push must fail once closed");
    }

    #[test]
    fn test_close_discards_backlog() {
        let queue = TaskQueue::new(8);
        for _ in 0..5 {
            assert!(queue.push(Task::new(|| {})));
        }
        assert_eq!(queue.close(), 5);
        assert!(queue.is_closed());
        assert!(queue.is_empty());

        let busy = AtomicBool::new(false);
        assert!(queue.pop(&busy).is_none());
        assert!(!queue.push(Task::new(|| {})));
        assert!(queue.try_push(Task::new(|| {})).is_err());
    }

    #[test]
    fn test_close_is_idempotent() {
        let queue = TaskQueue::new(4);
        assert!(queue.push(Task::new(|| {})));
        assert_eq!(queue.close(), 1);
        assert_eq!(queue.close(), 0);
    }

    #[test]
    fn test_concurrent_producers_consumers() {
        let queue = Arc::new(TaskQueue::new(16));
        let executed = Arc::new(AtomicUsize::new(0));
        let per_producer = 100;

        let producers: Vec<_> = (0..4)
            .map(|_| {
                let queue = Arc::clone(&queue);
                let executed = Arc::clone(&executed);
                thread::spawn(move || {
                    for _ in 0..per_producer {
                        assert!(queue.push(counting_task(&executed)));
                    }
                })
            })
            .collect();

        let consumers: Vec<_> = (0..4)
            .map(|_| {
                let queue = Arc::clone(&queue);
                thread::spawn(move || {
                    let busy = AtomicBool::new(false);
                    while let Some(task) = queue.pop(&busy) {
                        task.invoke().unwrap();
                        busy.store(false, Ordering::Release);
                    }
                })
            })
            .collect();

        for producer in producers {
            producer.join().unwrap();
        }
        // Drain whatever is left, then release the consumers.
        while !queue.is_empty() {
            thread::sleep(Duration::from_millis(1));
        }
        queue.close();
        for consumer in consumers {
            consumer.join().unwrap();
        }
        assert_eq!(executed.load(Ordering::Relaxed), 4 * per_producer);
    }
}

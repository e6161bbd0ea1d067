//! Per-worker slot state shared between the executor handle and its threads

use crate::pool::queue::TaskQueue;
use crossbeam::utils::CachePadded;
use std::sync::atomic::AtomicBool;

/// One worker's share of the pool: its queue and its execution flag.
///
/// The busy flag is `true` strictly between a successful dequeue and the
/// completion of that task. Dequeues raise it inside the queue's critical
/// section; only the executing thread clears it.
pub(crate) struct Slot {
    /// Logical index of this slot within the pool.
    pub index: usize,

    /// The slot's own queue; peers steal from it during retrieval.
    pub queue: TaskQueue,

    /// Raised while a task dequeued through this slot is executing.
    pub busy: CachePadded<AtomicBool>,
}

impl Slot {
    /// Creates an idle slot with an open queue of the given capacity.
    pub fn new(index: usize, capacity: usize) -> Self {
        Self {
            index,
            queue: TaskQueue::new(capacity),
            busy: CachePadded::new(AtomicBool::new(false)),
        }
    }
}

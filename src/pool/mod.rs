//! Worker pool: a fixed-size executor with per-worker queues and stealing
//!
//! - [`Task`]: move-only unit of work, optionally labeled
//! - [`TaskQueue`]: bounded MPMC FIFO with close semantics, one per worker
//! - [`Executor`]: submission fan-out, stealing retrieval, drain, shutdown
//! - sizing helpers mapping hardware concurrency to a pool size

mod executor;
mod queue;
mod sizing;
mod slot;
mod task;

pub use executor::{DrainMode, Executor, ExecutorConfig};
pub use queue::TaskQueue;
pub use sizing::{bias_thread_count, max_threads, select_thread_count};
pub use task::{Task, TaskError, TaskResult};

//! taskpool: a work-stealing executor for blocking workloads
//!
//! A fixed-size pool of OS worker threads, each owning a bounded FIFO queue.
//! Submissions fan out round-robin across the queues; an idle worker steals
//! from its peers before parking on its own queue. The pool supports
//! draining to idle with gated admission, cooperative single-task execution
//! by outside threads, and deterministic shutdown.
//!
//! - **Submission**: [`Executor::push`] / [`Executor::spawn`], with
//!   backpressure once every queue is full
//! - **Draining**: [`Executor::wait`] blocks or rejects concurrent
//!   submitters until the pool is idle
//! - **Cooperation**: [`Executor::try_run_one`] lets any thread run one
//!   pending task without blocking
//! - **Scheduling**: [`Timer`] submits due callbacks into the pool
//! - **Wiring**: [`AppContext`] lazily builds one shared executor and timer
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use taskpool::Executor;
//!
//! let pool = Executor::new(4).unwrap();
//! let counter = Arc::new(AtomicUsize::new(0));
//! for _ in 0..100 {
//!     let counter = Arc::clone(&counter);
//!     pool.spawn(move || {
//!         counter.fetch_add(1, Ordering::Relaxed);
//!     })
//!     .unwrap();
//! }
//! pool.join().unwrap();
//! assert_eq!(counter.load(Ordering::Relaxed), 100);
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod context;
pub mod error;
pub mod pool;
pub mod timer;

// ==== Lifecycle and wiring ====

pub use context::AppContext;

// ==== Errors ====

pub use error::{ExecError, ExecResult, TaskFailure};

// ==== Pool core ====

pub use pool::{
    bias_thread_count, max_threads, select_thread_count, DrainMode, Executor, ExecutorConfig,
    Task, TaskError, TaskQueue, TaskResult,
};

// ==== Scheduling ====

pub use timer::{Timer, TimerId};

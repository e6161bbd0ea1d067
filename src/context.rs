//! Application-scoped construction of the shared executor and timer
//!
//! Collaborators take the context (or the handles it produces) explicitly
//! instead of reaching for an ambient process-wide pool. The context builds
//! its executor and timer lazily, on first use, and tears both down in
//! [`shutdown`](AppContext::shutdown).

use crate::error::ExecResult;
use crate::pool::{Executor, ExecutorConfig};
use crate::timer::Timer;
use once_cell::sync::OnceCell;
use std::sync::Arc;

/// Owns one lazily-constructed [`Executor`] and one [`Timer`] bound to it.
pub struct AppContext {
    threads: usize,
    config: ExecutorConfig,
    executor: OnceCell<Arc<Executor>>,
    timer: OnceCell<Timer>,
}

impl AppContext {
    /// A context with default configuration and hardware-derived sizing.
    pub fn new() -> Self {
        Self::with_config(0, ExecutorConfig::default())
    }

    /// A context with an explicit worker count and configuration.
    ///
    /// Nothing is spawned until [`executor`](Self::executor) or
    /// [`timer`](Self::timer) is first called.
    pub fn with_config(threads: usize, config: ExecutorConfig) -> Self {
        Self {
            threads,
            config,
            executor: OnceCell::new(),
            timer: OnceCell::new(),
        }
    }

    /// The shared executor, constructed on first use.
    pub fn executor(&self) -> ExecResult<&Arc<Executor>> {
        self.executor.get_or_try_init(|| {
            Executor::with_config(self.threads, self.config.clone()).map(Arc::new)
        })
    }

    /// The shared timer, bound to the context's executor, constructed on
    /// first use.
    pub fn timer(&self) -> ExecResult<&Timer> {
        let executor = Arc::clone(self.executor()?);
        self.timer.get_or_try_init(|| Timer::new(executor))
    }

    /// Stops the timer, then drains and joins the executor.
    ///
    /// Callbacks already handed to the pool run before the join completes.
    /// A no-op for components never constructed.
    pub fn shutdown(&self) -> ExecResult<()> {
        if let Some(timer) = self.timer.get() {
            timer.stop();
        }
        match self.executor.get() {
            Some(executor) => executor.join(),
            None => Ok(()),
        }
    }
}

impl Default for AppContext {
    fn default() -> Self {
        Self::new()
    }
}

//! Executor error types

use std::fmt;

/// Description of the first task failure observed by a pool.
///
/// Recorded when a task body returns an error or panics; surfaced to the
/// next [`wait`](crate::Executor::wait) or [`join`](crate::Executor::join)
/// caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskFailure {
    /// Label of the failing task, when one was set.
    pub label: Option<String>,

    /// Index of the worker that executed the task; `None` when it ran on a
    /// cooperative non-pool thread via `try_run_one`.
    pub worker: Option<usize>,

    /// Rendered error or panic message.
    pub message: String,
}

impl fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.label, self.worker) {
            (Some(label), Some(worker)) => {
                write!(f, "task '{}' failed on worker {}: {}", label, worker, self.message)
            }
            (Some(label), None) => write!(f, "task '{}' failed: {}", label, self.message),
            (None, Some(worker)) => write!(f, "task failed on worker {}: {}", worker, self.message),
            (None, None) => write!(f, "task failed: {}", self.message),
        }
    }
}

/// Executor errors
#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    /// The pool is not accepting submissions (draining, stopped, or failed).
    #[error("executor unavailable: {0}")]
    Unavailable(&'static str),

    /// An OS thread could not be created while constructing the pool.
    #[error("failed to spawn worker thread: {0}")]
    Spawn(std::io::Error),

    /// A task reported a failure; see [`TaskFailure`].
    #[error("{0}")]
    TaskFailed(TaskFailure),
}

/// Executor operation result
pub type ExecResult<T> = Result<T, ExecError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_failure_display() {
        let full = TaskFailure {
            label: Some("reindex".to_string()),
            worker: Some(3),
            message: "index out of range".to_string(),
        };
        assert_eq!(
            full.to_string(),
            "task 'reindex' failed on worker 3: index out of range"
        );

        let bare = TaskFailure {
            label: None,
            worker: None,
            message: "boom".to_string(),
        };
        assert_eq!(bare.to_string(), "task failed: boom");
    }

    #[test]
    fn test_unavailable_message() {
        let err = ExecError::Unavailable("stopped");
        assert_eq!(err.to_string(), "executor unavailable: stopped");
    }

    #[test]
    fn test_task_failed_passthrough() {
        let err = ExecError::TaskFailed(TaskFailure {
            label: None,
            worker: Some(0),
            message: "bad input".to_string(),
        });
        assert_eq!(err.to_string(), "task failed on worker 0: bad input");
    }
}

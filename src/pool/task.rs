//! Unit of work accepted by the executor

use std::any::Any;
use std::borrow::Cow;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};

/// Error type reported by fallible task bodies.
pub type TaskError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Outcome of one task body.
pub type TaskResult = Result<(), TaskError>;

/// A unit of work: a boxed closure plus an optional diagnostic label.
///
/// Tasks are consumed exactly once. The pool makes no attempt to retry or
/// clone them; a task popped from a queue either runs to completion or is
/// recorded as the pool's first failure.
pub struct Task {
    /// Diagnostic label carried into failure reports.
    label: Option<Cow<'static, str>>,

    /// The work itself.
    body: Box<dyn FnOnce() -> TaskResult + Send + 'static>,
}

impl Task {
    /// Creates a task from an infallible closure.
    pub fn new(f: impl FnOnce() + Send + 'static) -> Self {
        Self {
            label: None,
            body: Box::new(move || {
                f();
                Ok(())
            }),
        }
    }

    /// Creates a task from a closure that may report an error.
    pub fn fallible(f: impl FnOnce() -> TaskResult + Send + 'static) -> Self {
        Self {
            label: None,
            body: Box::new(f),
        }
    }

    /// Attaches a label used in failure reports and logs.
    pub fn with_label(mut self, label: impl Into<Cow<'static, str>>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Returns the task's label, if one was set.
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// Consumes the task and runs its body, containing unwinds.
    ///
    /// Returns the rendered error message on explicit failure or panic.
    pub(crate) fn invoke(self) -> Result<(), String> {
        let body = self.body;
        match panic::catch_unwind(AssertUnwindSafe(body)) {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(err.to_string()),
            Err(payload) => Err(panic_message(payload)),
        }
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task").field("label", &self.label).finish()
    }
}

/// Extracts a printable message from a panic payload.
fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "task panicked".to_string()
    }
}

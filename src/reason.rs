//! The reasons a task may suspend on.
//!
//! A task yields a list of these; the session schedules each, and resumes the task
//! exactly once, for whichever reason becomes true first, cancelling the rest before
//! the task runs again.

use crate::event::Event;
use crate::task::TaskHandle;

#[derive(Clone)]
pub enum Reason {
    /// Transparent when it is the entire yielded value: the task is immediately
    /// re-entered for its next yield, in the same step. Buried inside a longer list it
    /// is simply never schedulable and is dropped from that yield's live reasons.
    NoReason,
    /// Resume after `delay` ticks of logical time. Negative delays are rejected.
    Timeout(i64),
    /// Resume the next time `event` posts.
    WaitEvent(Event),
    /// Resume when `task` exits or is killed.
    Status(TaskHandle),
}

/// Normalizes the various shapes a task may yield (`Reason`, `Vec<Reason>`, a tuple of
/// reasons) into a single `Vec<Reason>` at the stepper boundary.
pub trait IntoReasons {
    fn into_reasons(self) -> Vec<Reason>;
}

impl IntoReasons for Reason {
    fn into_reasons(self) -> Vec<Reason> {
        vec![self]
    }
}

impl IntoReasons for Vec<Reason> {
    fn into_reasons(self) -> Vec<Reason> {
        self
    }
}

impl IntoReasons for (Reason, Reason) {
    fn into_reasons(self) -> Vec<Reason> {
        vec![self.0, self.1]
    }
}

impl IntoReasons for (Reason, Reason, Reason) {
    fn into_reasons(self) -> Vec<Reason> {
        vec![self.0, self.1, self.2]
    }
}

impl<const N: usize> IntoReasons for [Reason; N] {
    fn into_reasons(self) -> Vec<Reason> {
        self.into()
    }
}

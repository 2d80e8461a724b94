//! Tasks: resumable step functions.
//!
//! The original models a task body as a generator: each `yield` suspends the function
//! at that point and hands back a list of reasons, one of which later resumes it from
//! exactly that point. Rust has no stable generator syntax reachable from a library, so
//! a task body here is an explicit state machine — a `TaskBody` implementation that
//! tracks its own resume point and returns a `StepOutcome` each time `step` is called.

use crate::error::OroboroError;
use crate::reason::Reason;
use crate::session::Session;
use crate::time::Time;

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct TaskId(pub(crate) usize);

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum TaskStatus {
    Born,
    Running,
    Waiting,
    Exited,
    Killed,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Exited | TaskStatus::Killed)
    }
}

/// What a task body produced on this call to `step`.
pub enum StepOutcome {
    /// Suspend on this set of reasons; resume when exactly one of them fires.
    Yield(Vec<Reason>),
    /// The task body is finished.
    Done,
    /// The task body raised an error it does not itself handle.
    Failed(OroboroError),
}

impl StepOutcome {
    pub fn yield_on(reasons: impl crate::reason::IntoReasons) -> StepOutcome {
        StepOutcome::Yield(reasons.into_reasons())
    }
}

/// A resumable task body, advanced one step at a time by the session.
pub trait TaskBody {
    fn step(&mut self, cx: &mut StepCx) -> StepOutcome;
}

/// Adapts a plain `FnMut` into a `TaskBody`, for task bodies whose only state is what
/// they capture (a resume-point counter, accumulator cells, etc).
impl<F: FnMut(&mut StepCx) -> StepOutcome> TaskBody for F {
    fn step(&mut self, cx: &mut StepCx) -> StepOutcome {
        self(cx)
    }
}

/// Context handed to a task body on each step: the pieces of session state a step
/// function is allowed to touch (spawn subtasks, post events, read the clock).
pub struct StepCx {
    pub(crate) session: Session,
    pub(crate) task_id: TaskId,
}

impl StepCx {
    pub fn now(&self) -> Time {
        self.session.now()
    }

    pub fn spawn(&self, body: impl TaskBody + 'static) -> TaskHandle {
        self.session.spawn(body)
    }

    pub fn post(&self, ev: &crate::event::Event) {
        self.session.post(ev);
    }

    pub fn post_at(&self, t: Time, ev: &crate::event::Event) {
        self.session.post_at(t, ev);
    }

    pub fn current_reason_index(&self) -> Option<usize> {
        self.session.current_reason_index()
    }

    pub fn current_reason(&self) -> Option<Reason> {
        self.session.current_reason()
    }

    pub fn task_handle(&self) -> TaskHandle {
        TaskHandle {
            id: self.task_id,
            session: self.session.clone(),
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }
}

/// A cheap, cloneable reference to a task living in a session's task slab.
#[derive(Clone)]
pub struct TaskHandle {
    pub(crate) id: TaskId,
    pub(crate) session: Session,
}

impl PartialEq for TaskHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}
impl Eq for TaskHandle {}

impl TaskHandle {
    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn name(&self) -> Option<String> {
        self.session.task_name(self.id)
    }

    pub fn status(&self) -> TaskStatus {
        self.session.task_status(self.id)
    }

    pub fn result(&self) -> Option<()> {
        if self.status() == TaskStatus::Exited {
            Some(())
        } else {
            None
        }
    }

    pub fn kill(&self) -> crate::error::Result<()> {
        self.session.kill_task(self.id)
    }

    pub(crate) fn done_event(&self) -> crate::event::Event {
        self.session.task_done_event(self.id)
    }
}

//! The session: owns the event loop and the task slab, and is the only thing that
//! knows how to turn a yielded `Reason` into scheduled, cancellable work.
//!
//! Installs a root pseudo-task at construction so `currenttask()` always has something
//! to report, mirroring the source's module-level root task.

use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;

use crate::error::{OroboroError, Result};
use crate::event::{Event, WaiterId};
use crate::event_loop::{EventLoop, Handle as LoopHandle};
use crate::reason::Reason;
use crate::task::{StepCx, StepOutcome, TaskBody, TaskHandle, TaskId, TaskStatus};
use crate::time::Time;

/// Session-wide configuration. `exit_on_error` mirrors the one knob the distilled
/// interface names explicitly; `trace` comes from a toggle the original exposed as a
/// module-level flag (`traceon`/`traceoff`), expressed here as a plain struct field
/// instead of process-global mutable state.
#[derive(Clone, Debug)]
pub struct SessionConfig {
    pub exit_on_error: bool,
    pub trace: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            exit_on_error: true,
            trace: false,
        }
    }
}

enum LiveReason {
    Timeout(LoopHandle),
    WaitEvent(Event, WaiterId),
}

impl LiveReason {
    fn cancel(&self) {
        match self {
            LiveReason::Timeout(h) => h.cancel(),
            LiveReason::WaitEvent(ev, wid) => {
                let _ = ev.removewaiter(*wid);
            }
        }
    }
}

struct TaskSlot {
    #[allow(dead_code)]
    parent: Option<TaskId>,
    name: Option<String>,
    status: TaskStatus,
    body: Option<Box<dyn TaskBody>>,
    live_reasons: Vec<LiveReason>,
    pending_reasons: Vec<Reason>,
    done_event: Event,
}

struct SessionCore {
    loop_: EventLoop,
    tasks: RefCell<Vec<Option<TaskSlot>>>,
    config: SessionConfig,
}

/// A cheap, cloneable handle onto the simulation. Deliberately `!Send`/`!Sync`: there
/// is exactly one logical thread of control, by construction, not by convention.
#[derive(Clone)]
pub struct Session(Rc<SessionCore>);

struct CurrentFrame {
    task: TaskId,
    reason_index: Option<usize>,
}

thread_local! {
    static CURRENT: RefCell<Vec<CurrentFrame>> = RefCell::new(Vec::new());
}

/// Pops the frame pushed by `step_task` on `Drop`, so a panicking `body.step()` still
/// leaves `CURRENT` balanced instead of leaking a stale frame onto the next step.
struct CurrentGuard;

impl Drop for CurrentGuard {
    fn drop(&mut self) {
        CURRENT.with(|c| {
            c.borrow_mut().pop();
        });
    }
}

impl Session {
    pub fn new() -> Self {
        Self::with_config(SessionConfig::default())
    }

    pub fn with_config(config: SessionConfig) -> Self {
        let core = SessionCore {
            loop_: EventLoop::new(),
            tasks: RefCell::new(Vec::new()),
            config,
        };
        let session = Session(Rc::new(core));
        let root_id = TaskId(session.0.tasks.borrow().len());
        session.0.tasks.borrow_mut().push(Some(TaskSlot {
            parent: None,
            name: Some("root".to_string()),
            status: TaskStatus::Running,
            body: None,
            live_reasons: Vec::new(),
            pending_reasons: Vec::new(),
            done_event: Event::new(),
        }));
        CURRENT.with(|c| {
            c.borrow_mut().push(CurrentFrame {
                task: root_id,
                reason_index: None,
            })
        });
        session
    }

    pub fn now(&self) -> Time {
        self.0.loop_.now()
    }

    // ---- introspection, backed by the thread-local current-frame stack ----

    pub fn current_task(&self) -> TaskHandle {
        let id = CURRENT
            .with(|c| c.borrow().last().map(|f| f.task))
            .expect("a session always has a current task; this is a root or task-stepper bug");
        TaskHandle {
            id,
            session: self.clone(),
        }
    }

    pub fn current_reason_index(&self) -> Option<usize> {
        CURRENT.with(|c| c.borrow().last().and_then(|f| f.reason_index))
    }

    pub fn current_reason(&self) -> Option<Reason> {
        let (id, idx) = CURRENT.with(|c| c.borrow().last().map(|f| (f.task, f.reason_index)))?;
        let idx = idx?;
        self.0.tasks.borrow()[id.0]
            .as_ref()
            .and_then(|s| s.pending_reasons.get(idx))
            .cloned()
    }

    // ---- task slab accessors used by TaskHandle ----

    pub(crate) fn task_name(&self, id: TaskId) -> Option<String> {
        self.0.tasks.borrow()[id.0].as_ref().and_then(|s| s.name.clone())
    }

    pub(crate) fn task_status(&self, id: TaskId) -> TaskStatus {
        self.0.tasks.borrow()[id.0]
            .as_ref()
            .map(|s| s.status)
            .unwrap_or(TaskStatus::Killed)
    }

    pub(crate) fn task_done_event(&self, id: TaskId) -> Event {
        self.0.tasks.borrow()[id.0].as_ref().unwrap().done_event.clone()
    }

    // ---- events ----

    /// Schedules `ev.post` for this step (normal events) or the observer phase
    /// (`ObserverEvent`s). Dispatch is on the event's own tag, never on its Rust type —
    /// the source confused `isinstance(Event, ObserverEvent)` (the class) with
    /// `isinstance(ev, ObserverEvent)` (the instance) here; this is the corrected form.
    pub fn post(&self, ev: &Event) {
        let ev = ev.clone();
        if ev.is_observer() {
            self.0.loop_.call_observer_now(move || ev.post(None));
        } else {
            self.0.loop_.call_now(move || ev.post(None));
        }
    }

    pub fn post_value(&self, ev: &Event, value: Rc<dyn Any>) {
        let ev = ev.clone();
        if ev.is_observer() {
            self.0.loop_.call_observer_now(move || ev.post(Some(value)));
        } else {
            self.0.loop_.call_now(move || ev.post(Some(value)));
        }
    }

    pub fn post_at(&self, t: Time, ev: &Event) {
        let ev = ev.clone();
        if ev.is_observer() {
            self.0.loop_.call_observer_at(t, move || ev.post(None));
        } else {
            self.0.loop_.call_at(t, move || ev.post(None));
        }
    }

    // ---- tasks ----

    fn insert_task(&self, body: impl TaskBody + 'static) -> TaskId {
        let parent = CURRENT.with(|c| c.borrow().last().map(|f| f.task));
        let mut tasks = self.0.tasks.borrow_mut();
        let id = TaskId(tasks.len());
        tasks.push(Some(TaskSlot {
            parent,
            name: None,
            status: TaskStatus::Born,
            body: Some(Box::new(body)),
            live_reasons: Vec::new(),
            pending_reasons: Vec::new(),
            done_event: Event::new(),
        }));
        id
    }

    pub fn spawn(&self, body: impl TaskBody + 'static) -> TaskHandle {
        let id = self.insert_task(body);
        let sess = self.clone();
        self.0.loop_.call_now(move || sess.step_task(id, None));
        TaskHandle {
            id,
            session: self.clone(),
        }
    }

    /// Like `spawn`, but runs the task's first `step` synchronously instead of
    /// deferring it through the loop's "work scheduled this step" queue. Needed by
    /// callers that must consume the *current* sample immediately (the TE assertion
    /// driver spawning a matcher task inside a sampler's own waiter callback) rather
    /// than waiting for the next drain.
    pub fn spawn_now(&self, body: impl TaskBody + 'static) -> TaskHandle {
        let id = self.insert_task(body);
        self.step_task(id, None);
        TaskHandle {
            id,
            session: self.clone(),
        }
    }

    pub fn kill_task(&self, id: TaskId) -> Result<()> {
        let live = {
            let mut tasks = self.0.tasks.borrow_mut();
            let slot = tasks[id.0]
                .as_mut()
                .ok_or_else(|| OroboroError::usage("kill: task no longer exists"))?;
            if slot.status.is_terminal() {
                return Err(OroboroError::usage("kill: task already terminal"));
            }
            slot.status = TaskStatus::Killed;
            std::mem::take(&mut slot.live_reasons)
        };
        for lr in &live {
            lr.cancel();
        }
        self.end_task(id);
        Ok(())
    }

    fn fire(&self, task_id: TaskId, reason_index: usize) {
        let live = {
            let mut tasks = self.0.tasks.borrow_mut();
            match tasks[task_id.0].as_mut() {
                Some(slot) if slot.status == TaskStatus::Waiting => {
                    std::mem::take(&mut slot.live_reasons)
                }
                _ => return,
            }
        };
        for lr in &live {
            lr.cancel();
        }
        self.step_task(task_id, Some(reason_index));
    }

    fn step_task(&self, task_id: TaskId, fired_index: Option<usize>) {
        CURRENT.with(|c| {
            c.borrow_mut().push(CurrentFrame {
                task: task_id,
                reason_index: fired_index,
            })
        });
        let _guard = CurrentGuard;

        loop {
            let mut body = {
                let mut tasks = self.0.tasks.borrow_mut();
                match tasks[task_id.0].as_mut() {
                    Some(slot) => {
                        slot.status = TaskStatus::Running;
                        slot.body.take()
                    }
                    None => break,
                }
            };
            let outcome = match body.as_mut() {
                Some(b) => {
                    let mut cx = StepCx {
                        session: self.clone(),
                        task_id,
                    };
                    b.step(&mut cx)
                }
                None => break, // root, or a task with no body left to run
            };
            {
                let mut tasks = self.0.tasks.borrow_mut();
                if let Some(slot) = tasks[task_id.0].as_mut() {
                    slot.body = body;
                }
            }

            match outcome {
                StepOutcome::Yield(reasons) => {
                    if reasons.len() == 1 && matches!(reasons[0], Reason::NoReason) {
                        continue;
                    }
                    self.schedule_reasons(task_id, reasons);
                    break;
                }
                StepOutcome::Done => {
                    {
                        let mut tasks = self.0.tasks.borrow_mut();
                        if let Some(slot) = tasks[task_id.0].as_mut() {
                            slot.status = TaskStatus::Exited;
                        }
                    }
                    self.end_task(task_id);
                    break;
                }
                StepOutcome::Failed(err) => {
                    self.handle_failure(task_id, err);
                    break;
                }
            }
        }
    }

    fn schedule_reasons(&self, task_id: TaskId, reasons: Vec<Reason>) {
        let mut live = Vec::with_capacity(reasons.len());
        for (idx, r) in reasons.iter().enumerate() {
            match r {
                // A NoReason buried inside a longer yielded list (as opposed to being
                // the entire yielded value, handled before this is reached) can never
                // fire; it is simply dropped from this yield's live reasons.
                Reason::NoReason => continue,
                Reason::Timeout(delay) => {
                    if *delay < 0 {
                        return self.handle_failure(
                            task_id,
                            OroboroError::invariant(format!("Timeout with negative delay {delay}")),
                        );
                    }
                    let sess = self.clone();
                    let handle = self.0.loop_.call_later(*delay, move || sess.fire(task_id, idx));
                    live.push(LiveReason::Timeout(handle));
                }
                Reason::WaitEvent(ev) => {
                    let sess = self.clone();
                    let wid = ev.addwaiter(move || sess.fire(task_id, idx));
                    live.push(LiveReason::WaitEvent(ev.clone(), wid));
                }
                Reason::Status(th) => {
                    let ev = th.done_event();
                    let sess = self.clone();
                    let wid = ev.addwaiter(move || sess.fire(task_id, idx));
                    live.push(LiveReason::WaitEvent(ev.clone(), wid));
                }
            }
        }
        let mut tasks = self.0.tasks.borrow_mut();
        if let Some(slot) = tasks[task_id.0].as_mut() {
            slot.status = TaskStatus::Waiting;
            slot.live_reasons = live;
            slot.pending_reasons = reasons;
        }
    }

    fn end_task(&self, task_id: TaskId) {
        let done_event = self.0.tasks.borrow()[task_id.0]
            .as_ref()
            .unwrap()
            .done_event
            .clone();
        done_event.post(None);
    }

    fn handle_failure(&self, task_id: TaskId, err: OroboroError) {
        tracing::error!(task_id = task_id.0, %err, "uncaught error from task step function");
        if self.0.config.exit_on_error {
            eprintln!("fatal: {err}");
            std::process::exit(1);
        }
        {
            let mut tasks = self.0.tasks.borrow_mut();
            if let Some(slot) = tasks[task_id.0].as_mut() {
                slot.status = TaskStatus::Exited;
            }
        }
        self.end_task(task_id);
    }

    // ---- loop control ----

    pub fn run_until(&self, t: Time) {
        self.0.loop_.run_until(t);
    }

    pub fn run_forever(&self) {
        self.0.loop_.run_forever();
    }

    /// Spawns `body` as the main task and runs the loop to completion.
    pub fn start(&self, body: impl TaskBody + 'static) -> TaskHandle {
        let handle = self.spawn(body);
        self.run_forever();
        handle
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

pub fn currenttime(session: &Session) -> Time {
    session.now()
}

pub fn currenttask(session: &Session) -> TaskHandle {
    session.current_task()
}

pub fn currentreason(session: &Session) -> Option<Reason> {
    session.current_reason()
}

pub fn currentreasonindex(session: &Session) -> Option<usize> {
    session.current_reason_index()
}

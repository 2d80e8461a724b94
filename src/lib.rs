//! Discrete-event simulation kernel: a stratified event loop, cooperative tasks that
//! suspend on composable reasons, and a temporal-expression matcher for asserting
//! regular-expression-like sequence properties over an observer event.
//!
//! Single-threaded by construction: every public type here is `!Send`/`!Sync`.

pub mod error;
pub mod event;
pub mod event_loop;
pub mod reason;
pub mod session;
pub mod task;
pub mod te;
pub mod time;

pub use error::{OroboroError, Result};
pub use event::{Event, WaiterId};
pub use event_loop::{EventLoop, Handle};
pub use reason::{IntoReasons, Reason};
pub use session::{currentreason, currentreasonindex, currenttask, currenttime, Session, SessionConfig};
pub use task::{StepCx, StepOutcome, TaskBody, TaskHandle, TaskId, TaskStatus};
pub use te::{
    always, always_pred, never_pred, repeat_checked, teevent, teeval, tetrace_children,
    tetrace_count, tetrace_dict, tetrace_ecycle, tetrace_print, tetrace_scycle, tetrace_status,
    tetrace_stime, DataValue, FeedResult, MatchData, MatchTrace, Matcher, PredFn, TeExpr,
    TraceStatus,
};
pub use time::Time;

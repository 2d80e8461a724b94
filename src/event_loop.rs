//! The stratified event loop: a min-priority queue of scheduled callbacks plus a
//! ready list for same-step work and an observers list for end-of-step work.
//!
//! Grounded on the wave algorithm in the original `BaseLoop.run_once`: every normal
//! callback due at or before the step's end time runs, in (when, id) order, before any
//! observer callback at that same time. Normal callbacks may enqueue further same-time
//! work (`call_now`), which forms the next sub-wave; observers only run once the ready
//! list has fully quiesced.
//!
//! Interior-mutable by design, like the session sitting on top of it: a callback fired
//! during `run_once` routinely needs to schedule further work on the same loop, so the
//! loop only ever holds its own borrow for the short critical section around a queue
//! mutation, never across a callback invocation.

use std::cell::{Cell, RefCell};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::collections::VecDeque;
use std::rc::Rc;

use crate::time::Time;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Kind {
    Normal,
    Observer,
}

/// A cancellable reference to a queued or scheduled callback.
///
/// Mirrors the source's `Handle`: a logical time, a monotonic tie-breaking id, a
/// cancelled flag, and a normal/observer tag. Cloning a `Handle` shares the same
/// cancelled flag, so cancelling any clone cancels the scheduled callback.
#[derive(Clone, Debug)]
pub struct Handle {
    id: u64,
    when: Time,
    kind: Kind,
    cancelled: Rc<Cell<bool>>,
}

impl Handle {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn when(&self) -> Time {
        self.when
    }

    pub fn kind(&self) -> Kind {
        self.kind
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.get()
    }

    /// Idempotent: cancelling an already-cancelled handle is a no-op, not an error.
    /// For a `Timeout` reason this is the whole of its cancel action — the handle
    /// stays in the heap as a tombstone and is skipped when it would otherwise fire.
    pub fn cancel(&self) {
        self.cancelled.set(true);
    }
}

struct QueuedItem {
    id: u64,
    when: Time,
    kind: Kind,
    cancelled: Rc<Cell<bool>>,
    callback: Box<dyn FnOnce()>,
}

impl QueuedItem {
    fn handle(&self) -> Handle {
        Handle {
            id: self.id,
            when: self.when,
            kind: self.kind,
            cancelled: self.cancelled.clone(),
        }
    }
}

struct ScheduledEntry(QueuedItem);

impl PartialEq for ScheduledEntry {
    fn eq(&self, other: &Self) -> bool {
        self.0.when == other.0.when && self.0.id == other.0.id
    }
}
impl Eq for ScheduledEntry {}

impl PartialOrd for ScheduledEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScheduledEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; reverse so the earliest (when, id) pops first.
        (other.0.when, other.0.id).cmp(&(self.0.when, self.0.id))
    }
}

#[derive(Default)]
struct LoopState {
    now: Time,
    next_id: u64,
    scheduled: BinaryHeap<ScheduledEntry>,
    ready: VecDeque<QueuedItem>,
    observers: VecDeque<QueuedItem>,
}

impl LoopState {
    fn next_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}

#[derive(Clone, Default)]
pub struct EventLoop {
    state: Rc<RefCell<LoopState>>,
}

impl EventLoop {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now(&self) -> Time {
        self.state.borrow().now
    }

    fn push_scheduled(&self, when: Time, kind: Kind, cb: Box<dyn FnOnce()>) -> Handle {
        let mut st = self.state.borrow_mut();
        let id = st.next_id();
        let item = QueuedItem {
            id,
            when,
            kind,
            cancelled: Rc::new(Cell::new(false)),
            callback: cb,
        };
        let handle = item.handle();
        st.scheduled.push(ScheduledEntry(item));
        handle
    }

    fn push_ready(&self, kind: Kind, cb: Box<dyn FnOnce()>) -> Handle {
        let mut st = self.state.borrow_mut();
        let id = st.next_id();
        let now = st.now;
        let item = QueuedItem {
            id,
            when: now,
            kind,
            cancelled: Rc::new(Cell::new(false)),
            callback: cb,
        };
        let handle = item.handle();
        st.ready.push_back(item);
        handle
    }

    pub fn call_at(&self, when: Time, cb: impl FnOnce() + 'static) -> Handle {
        self.push_scheduled(when, Kind::Normal, Box::new(cb))
    }

    pub fn call_later(&self, delay: i64, cb: impl FnOnce() + 'static) -> Handle {
        self.call_at(self.now() + delay, cb)
    }

    pub fn call_observer_at(&self, when: Time, cb: impl FnOnce() + 'static) -> Handle {
        self.push_scheduled(when, Kind::Observer, Box::new(cb))
    }

    pub fn call_observer_later(&self, delay: i64, cb: impl FnOnce() + 'static) -> Handle {
        self.call_observer_at(self.now() + delay, cb)
    }

    pub fn call_now(&self, cb: impl FnOnce() + 'static) -> Handle {
        self.push_ready(Kind::Normal, Box::new(cb))
    }

    pub fn call_observer_now(&self, cb: impl FnOnce() + 'static) -> Handle {
        self.push_ready(Kind::Observer, Box::new(cb))
    }

    pub fn next_when(&self) -> Option<Time> {
        let st = self.state.borrow();
        if !st.ready.is_empty() {
            return Some(st.now);
        }
        st.scheduled.peek().map(|e| e.0.when)
    }

    /// Drain due scheduled work into the ready list, advancing `now` as each entry is
    /// popped, then run waves of normal callbacks (each of which may enqueue further
    /// same-time work) until the ready list is empty, then run the deferred observers.
    ///
    /// Only ever holds its own borrow for a queue mutation, never across a callback, so
    /// a callback invoked here is free to schedule further work on this same loop.
    pub fn run_once(&self, endtime: Time) {
        tracing::debug!(endtime = endtime.get(), "run_once: draining scheduled");

        loop {
            let due = {
                let mut st = self.state.borrow_mut();
                match st.scheduled.peek() {
                    Some(top) if top.0.when <= endtime => {
                        let ScheduledEntry(item) = st.scheduled.pop().unwrap();
                        st.now = item.when;
                        Some(item)
                    }
                    _ => None,
                }
            };
            match due {
                Some(item) => self.state.borrow_mut().ready.push_back(item),
                None => break,
            }
        }

        loop {
            let wave: Vec<QueuedItem> = {
                let mut st = self.state.borrow_mut();
                st.ready.drain(..).collect()
            };
            if wave.is_empty() {
                break;
            }
            tracing::trace!(wave_len = wave.len(), "running wave");
            for item in wave {
                if item.cancelled.get() {
                    continue;
                }
                match item.kind {
                    Kind::Normal => (item.callback)(),
                    Kind::Observer => self.state.borrow_mut().observers.push_back(item),
                }
            }
        }

        debug_assert!(
            self.state.borrow().ready.is_empty(),
            "observers must not reschedule at now"
        );
        let obs: Vec<QueuedItem> = {
            let mut st = self.state.borrow_mut();
            st.observers.drain(..).collect()
        };
        tracing::trace!(observer_len = obs.len(), "running observer phase");
        for item in obs {
            if !item.cancelled.get() {
                (item.callback)();
            }
        }

        let mut st = self.state.borrow_mut();
        if endtime > st.now {
            st.now = endtime;
        }
    }

    pub fn run_until(&self, endtime: Time) {
        while let Some(w) = self.next_when() {
            if w > endtime {
                break;
            }
            self.run_once(w);
        }
    }

    pub fn run_forever(&self) {
        while let Some(w) = self.next_when() {
            self.run_once(w);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell as StdRefCell;

    #[test]
    fn loop_basic() {
        let loop_ = EventLoop::new();
        let val = Rc::new(Cell::new(0));
        let v = val.clone();
        loop_.call_at(Time(10), move || v.set(99));
        assert_eq!(val.get(), 0);
        loop_.run_once(Time(10));
        assert_eq!(val.get(), 99);
    }

    #[test]
    fn loop_basic_sequence() {
        let loop_ = EventLoop::new();
        let val = Rc::new(Cell::new(0));
        for (t, v) in [(10, 99), (20, 101), (30, 103)] {
            let val = val.clone();
            loop_.call_at(Time(t), move || val.set(v));
        }
        loop_.run_once(Time(10));
        assert_eq!(val.get(), 99);
        loop_.run_once(Time(20));
        assert_eq!(val.get(), 101);
        loop_.run_once(Time(30));
        assert_eq!(val.get(), 103);
    }

    fn trace_test(reversed: bool) {
        let loop_ = EventLoop::new();
        let trace = Rc::new(StdRefCell::new(Vec::new()));

        let push = |trace: Rc<StdRefCell<Vec<&'static str>>>, s: &'static str| {
            move || trace.borrow_mut().push(s)
        };

        if reversed {
            loop_.call_observer_at(Time(10), push(trace.clone(), "checka"));
            loop_.call_at(Time(10), push(trace.clone(), "a"));
            loop_.call_observer_at(Time(20), push(trace.clone(), "checkb"));
            loop_.call_at(Time(20), push(trace.clone(), "b"));
        } else {
            loop_.call_at(Time(10), push(trace.clone(), "a"));
            loop_.call_observer_at(Time(10), push(trace.clone(), "checka"));
            loop_.call_at(Time(20), push(trace.clone(), "b"));
            loop_.call_observer_at(Time(20), push(trace.clone(), "checkb"));
        }

        loop_.run_forever();
        assert_eq!(*trace.borrow(), vec!["a", "checka", "b", "checkb"]);
    }

    #[test]
    fn loop_trace() {
        trace_test(false);
    }

    #[test]
    fn loop_trace_b() {
        trace_test(true);
    }

    #[test]
    fn loop_until() {
        let loop_ = EventLoop::new();
        let val = Rc::new(Cell::new(0));
        for (t, v) in [(10, 99), (20, 101), (30, 103), (40, 105), (50, 107)] {
            let val = val.clone();
            loop_.call_at(Time(t), move || val.set(v));
        }
        assert_eq!(val.get(), 0);
        loop_.run_until(Time(30));
        assert_eq!(val.get(), 103);
        loop_.run_until(Time(40));
        assert_eq!(val.get(), 105);
    }

    #[test]
    fn cancelled_handle_does_not_run() {
        let loop_ = EventLoop::new();
        let val = Rc::new(Cell::new(0));
        let v = val.clone();
        let h = loop_.call_at(Time(10), move || v.set(99));
        h.cancel();
        loop_.run_once(Time(10));
        assert_eq!(val.get(), 0);
    }

    #[test]
    fn callback_can_reschedule_on_the_same_loop() {
        // a normal callback firing a fresh call_now must form the next sub-wave
        let loop_ = EventLoop::new();
        let trace = Rc::new(StdRefCell::new(Vec::new()));
        let t1 = trace.clone();
        let t2 = trace.clone();
        let loop2 = loop_.clone();
        loop_.call_at(Time(5), move || {
            t1.borrow_mut().push(1);
            let t2 = t2.clone();
            loop2.call_now(move || t2.borrow_mut().push(2));
        });
        loop_.run_once(Time(5));
        assert_eq!(*trace.borrow(), vec![1, 2]);
    }
}

//! Events: named notification objects whose `post` invokes every waiter synchronously
//! under a snapshot of the waiter set, so a waiter may remove itself (or another
//! waiter) during its own invocation without perturbing the in-flight iteration.

use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;

use crate::error::{OroboroError, Result};

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct WaiterId(u64);

type Waiter = Rc<RefCell<dyn FnMut()>>;

struct EventInner {
    count: u64,
    value: Option<Rc<dyn Any>>,
    is_observer: bool,
    waiters: Vec<(WaiterId, Waiter)>,
    next_waiter_id: u64,
}

/// A plain event. Waiters registered via `addwaiter` fire, in registration order, every
/// time `post` runs.
#[derive(Clone)]
pub struct Event {
    inner: Rc<RefCell<EventInner>>,
}

impl Default for Event {
    fn default() -> Self {
        Self::new()
    }
}

impl Event {
    pub fn new() -> Self {
        Event {
            inner: Rc::new(RefCell::new(EventInner {
                count: 0,
                value: None,
                is_observer: false,
                waiters: Vec::new(),
                next_waiter_id: 0,
            })),
        }
    }

    /// An `ObserverEvent`: identical mechanics, but the session defers its `post` to the
    /// end-of-step observer phase instead of running it inline with normal work.
    pub fn new_observer() -> Self {
        let ev = Self::new();
        ev.inner.borrow_mut().is_observer = true;
        ev
    }

    pub fn is_observer(&self) -> bool {
        self.inner.borrow().is_observer
    }

    pub fn count(&self) -> u64 {
        self.inner.borrow().count
    }

    pub fn val<T: 'static>(&self) -> Option<Rc<T>> {
        self.inner
            .borrow()
            .value
            .clone()
            .and_then(|v| v.downcast::<T>().ok())
    }

    pub fn addwaiter(&self, w: impl FnMut() + 'static) -> WaiterId {
        let mut inner = self.inner.borrow_mut();
        let id = WaiterId(inner.next_waiter_id);
        inner.next_waiter_id += 1;
        inner.waiters.push((id, Rc::new(RefCell::new(w))));
        id
    }

    pub fn removewaiter(&self, id: WaiterId) -> Result<()> {
        let mut inner = self.inner.borrow_mut();
        let before = inner.waiters.len();
        inner.waiters.retain(|(wid, _)| *wid != id);
        if inner.waiters.len() == before {
            return Err(OroboroError::usage(format!(
                "removewaiter: waiter {:?} is not registered",
                id
            )));
        }
        Ok(())
    }

    /// Fires every currently-registered waiter under a snapshot, so a waiter removing
    /// itself (or another) mid-iteration is safe.
    pub fn post(&self, value: Option<Rc<dyn Any>>) {
        let snapshot: Vec<(WaiterId, Waiter)> = {
            let mut inner = self.inner.borrow_mut();
            inner.count += 1;
            inner.value = value;
            inner.waiters.clone()
        };
        tracing::trace!(waiters = snapshot.len(), "event post");
        for (_, w) in snapshot {
            (w.borrow_mut())();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn post_increments_count_independent_of_waiter_churn() {
        let ev = Event::new();
        assert_eq!(ev.count(), 0);
        ev.post(None);
        ev.post(None);
        assert_eq!(ev.count(), 2);
    }

    #[test]
    fn waiter_can_remove_itself_during_post() {
        let ev = Event::new();
        let fired = Rc::new(Cell::new(0));

        let f2 = fired.clone();
        let ev2 = ev.clone();
        let id_cell: Rc<RefCell<Option<WaiterId>>> = Rc::new(RefCell::new(None));
        let id_cell2 = id_cell.clone();
        let id = ev.addwaiter(move || {
            f2.set(f2.get() + 1);
            if let Some(id) = *id_cell2.borrow() {
                ev2.removewaiter(id).unwrap();
            }
        });
        *id_cell.borrow_mut() = Some(id);

        ev.post(None);
        assert_eq!(fired.get(), 1);
        ev.post(None);
        assert_eq!(fired.get(), 1, "self-removed waiter must not fire again");
    }

    #[test]
    fn removing_absent_waiter_is_usage_error() {
        let ev = Event::new();
        let id = ev.addwaiter(|| {});
        ev.removewaiter(id).unwrap();
        assert!(matches!(ev.removewaiter(id), Err(OroboroError::Usage(_))));
    }
}

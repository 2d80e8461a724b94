//! Temporal-expression matching: build an AST (`ast`), drive it sample-by-sample
//! against an observer event (`matcher`), and report what happened through trace
//! records (`trace`).

pub mod ast;
pub mod matcher;
pub mod trace;

use std::cell::{Cell, RefCell};
use std::rc::Rc;

pub use ast::{always_pred, never_pred, DataValue, MatchData, PredFn, TeExpr};
pub use matcher::{repeat_checked, teeval, FeedResult, Matcher};
pub use trace::{
    tetrace_children, tetrace_count, tetrace_dict, tetrace_ecycle, tetrace_print, tetrace_scycle,
    tetrace_status, tetrace_stime, MatchTrace, TraceStatus,
};

use crate::event::{Event, WaiterId};
use crate::reason::Reason;
use crate::session::Session;
use crate::task::{StepCx, StepOutcome, TaskBody};
use crate::time::Time;

type ReportFn = Rc<RefCell<dyn FnMut(MatchTrace)>>;

/// One matcher tree's lifetime as a real, killable task: spawned the cycle it starts
/// on (via `spawn_now`, so it consumes that very sample immediately), then suspends on
/// `WaitEvent(sampler)` between samples until its matcher reports a match or dies.
/// This is what gives each assertion-in-progress the same kill/cancel path as any other
/// task, rather than a bespoke `retain_mut` loop private to the TE module.
struct MatcherTask {
    label: Rc<str>,
    start_cycle: u32,
    start_time: Time,
    cycle: Rc<Cell<u32>>,
    sampler: Event,
    data: MatchData,
    matcher: Box<dyn Matcher>,
    onmatch: ReportFn,
    onfail: ReportFn,
}

impl TaskBody for MatcherTask {
    fn step(&mut self, cx: &mut StepCx) -> StepOutcome {
        let this_cycle = self.cycle.get();
        let now = cx.now();
        let r = self.matcher.feed(this_cycle, &mut self.data);
        if r.matched {
            let trace = MatchTrace::new(
                self.label.to_string(),
                self.start_cycle,
                this_cycle,
                self.start_time,
                now,
                TraceStatus::Match,
                self.data.clone(),
            );
            (self.onmatch.borrow_mut())(trace);
            return StepOutcome::Done;
        }
        if r.dead {
            let trace = MatchTrace::new(
                self.label.to_string(),
                self.start_cycle,
                this_cycle,
                self.start_time,
                now,
                TraceStatus::Fail,
                self.data.clone(),
            );
            (self.onfail.borrow_mut())(trace);
            return StepOutcome::Done;
        }
        StepOutcome::yield_on(Reason::WaitEvent(self.sampler.clone()))
    }
}

/// Installs a live assertion: every post of `sampler` spawns a fresh `MatcherTask` for
/// `expr` (so a match starting on this very sample can still be reported), running its
/// first step inline against the current cycle via `Session::spawn_now`. `onmatch`/
/// `onfail` fire exactly once per spawned task, when its matcher produces a match or
/// dies without one; each task detaches its own `WaitEvent(sampler)` registration when
/// it finishes, the same cancellation path any other task gets from `kill_task`/`fire`.
///
/// `sampler` should be an `ObserverEvent` so sampling happens after normal state updates
/// for the step have settled.
pub fn always(
    session: &Session,
    sampler: &Event,
    expr: &Rc<TeExpr>,
    onmatch: impl FnMut(MatchTrace) + 'static,
    onfail: impl FnMut(MatchTrace) + 'static,
) -> WaiterId {
    let cycle = Rc::new(Cell::new(0u32));
    let onmatch: ReportFn = Rc::new(RefCell::new(onmatch));
    let onfail: ReportFn = Rc::new(RefCell::new(onfail));
    let expr = expr.clone();
    let label: Rc<str> = Rc::from(format!("{expr:?}"));
    let session = session.clone();
    let sampler_for_task = sampler.clone();

    sampler.addwaiter(move || {
        let this_cycle = cycle.get() + 1;
        cycle.set(this_cycle);
        let now = session.now();

        session.spawn_now(MatcherTask {
            label: label.clone(),
            start_cycle: this_cycle,
            start_time: now,
            cycle: cycle.clone(),
            sampler: sampler_for_task.clone(),
            data: MatchData::new(),
            matcher: matcher::build(&expr),
            onmatch: onmatch.clone(),
            onfail: onfail.clone(),
        });
    })
}

/// Like `always`, but gives back a plain `Event` that posts once per match instead of
/// taking match/fail callbacks — for code that wants to `WaitEvent` on "this assertion
/// just matched" rather than consume trace records directly.
pub fn teevent(session: &Session, sampler: &Event, expr: &Rc<TeExpr>) -> Event {
    let out = Event::new();
    let posted = out.clone();
    always(session, sampler, expr, move |_trace| posted.post(None), |_trace| {});
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn bools(v: &[i32]) -> Rc<Vec<bool>> {
        Rc::new(v.iter().map(|&x| x != 0).collect())
    }

    fn run_assertion(expr: &Rc<TeExpr>, n_cycles: u32) -> HashMap<u32, TraceStatus> {
        let session = Session::new();
        let sampler = Event::new_observer();
        let verdicts = Rc::new(RefCell::new(HashMap::new()));
        let v1 = verdicts.clone();
        let v2 = verdicts.clone();
        always(
            &session,
            &sampler,
            expr,
            move |t| {
                v1.borrow_mut().insert(tetrace_scycle(&t), TraceStatus::Match);
            },
            move |t| {
                v2.borrow_mut().insert(tetrace_scycle(&t), TraceStatus::Fail);
            },
        );
        for _ in 1..=n_cycles {
            sampler.post(None);
        }
        verdicts.borrow().clone()
    }

    // S6: (ok+a+b) | (b+ok+a+c)
    #[test]
    fn te_alternation_scenario() {
        let ok = always_pred();
        let a = TeExpr::pred_bool("a", bools(&[0, 0, 1, 0, 0, 1, 0, 0, 1, 0, 1, 0]));
        let b = TeExpr::pred_bool("b", bools(&[0, 0, 1, 1, 0, 0, 0, 0, 1, 1, 0, 0]));
        let c = TeExpr::pred_bool("c", bools(&[0, 0, 0, 0, 0, 0, 1, 0, 0, 0, 0, 1]));

        let left = ok.concat(&a).concat(&b);
        let right = b.concat(&ok).concat(&a).concat(&c);
        let expr = left.alt(&right);

        let verdicts = run_assertion(&expr, 12);
        let expected = [
            TraceStatus::Fail,
            TraceStatus::Match,
            TraceStatus::Fail,
            TraceStatus::Match,
            TraceStatus::Fail,
            TraceStatus::Fail,
            TraceStatus::Fail,
            TraceStatus::Match,
            TraceStatus::Match,
            TraceStatus::Fail,
            TraceStatus::Fail,
            TraceStatus::Fail,
        ];
        for (i, exp) in expected.iter().enumerate() {
            let start = (i + 1) as u32;
            assert_eq!(
                verdicts.get(&start),
                Some(exp),
                "start cycle {start} mismatch"
            );
        }
    }

    // S7: (a + ok*(1,8)) & (ok*(1,8) + b)
    #[test]
    fn te_bounded_conjunction_scenario() {
        let ok = always_pred();
        let a = TeExpr::pred_bool("a", bools(&[0, 0, 1, 0, 0, 0, 0, 0, 1, 0, 0, 0]));
        let b = TeExpr::pred_bool("b", bools(&[0, 0, 0, 0, 0, 0, 0, 1, 1, 0, 1, 0]));

        let left = a.concat(&ok.repeat(1, 8));
        let right = ok.repeat(1, 8).concat(&b);
        let expr = left.conj(&right);

        let verdicts = run_assertion(&expr, 12);
        let expected = [
            TraceStatus::Fail,
            TraceStatus::Fail,
            TraceStatus::Match,
            TraceStatus::Fail,
            TraceStatus::Fail,
            TraceStatus::Fail,
            TraceStatus::Fail,
            TraceStatus::Fail,
            TraceStatus::Match,
            TraceStatus::Fail,
            TraceStatus::Fail,
            TraceStatus::Fail,
        ];
        for (i, exp) in expected.iter().enumerate() {
            let start = (i + 1) as u32;
            assert_eq!(
                verdicts.get(&start),
                Some(exp),
                "start cycle {start} mismatch"
            );
        }
    }

    // S8: double invert is an involution over the first branch of the S6 scenario.
    #[test]
    fn double_invert_is_involution() {
        let ok = always_pred();
        let a = TeExpr::pred_bool("a", bools(&[0, 0, 1, 0, 0, 1, 0, 0, 1, 0, 1, 0]));
        let b = TeExpr::pred_bool("b", bools(&[0, 0, 1, 1, 0, 0, 0, 0, 1, 1, 0, 0]));
        let plain = ok.concat(&a).concat(&b);
        let double_inverted = plain.invert().invert();

        let plain_verdicts = run_assertion(&plain, 12);
        let inverted_verdicts = run_assertion(&double_inverted, 12);
        assert_eq!(plain_verdicts, inverted_verdicts);
    }

    fn assert_verdicts(verdicts: &HashMap<u32, TraceStatus>, expected: &[TraceStatus]) {
        for (i, exp) in expected.iter().enumerate() {
            let start = (i + 1) as u32;
            assert_eq!(
                verdicts.get(&start),
                Some(exp),
                "start cycle {start} mismatch"
            );
        }
    }

    // Intersect reuses `SameEndMatcher`, the same state machine Conj builds on (see
    // DESIGN.md's matcher-semantics notes): `(a+b) ^ (b+a)` only matches a start cycle
    // where both 2-long chains complete together, i.e. both predicates hold on this
    // sample and the next. This is a from-scratch scenario (not lifted verbatim from
    // `mainfn_int0`, whose expected trace depends on a cross-start pairing this crate's
    // per-start matcher lifecycle doesn't model — see DESIGN.md).
    #[test]
    fn te_intersect_scenario() {
        let a = TeExpr::pred_bool("a", bools(&[1, 0, 1, 1, 1, 0, 1, 0]));
        let b = TeExpr::pred_bool("b", bools(&[1, 1, 0, 1, 1, 0, 1, 0]));
        let expr = a.concat(&b).intersect(&b.concat(&a));

        let verdicts = run_assertion(&expr, 8);
        let expected = [
            TraceStatus::Fail,
            TraceStatus::Fail,
            TraceStatus::Fail,
            TraceStatus::Match,
            TraceStatus::Fail,
            TraceStatus::Fail,
            TraceStatus::Fail,
            TraceStatus::Fail,
        ];
        assert_verdicts(&verdicts, &expected);
    }

    // Implies: `a >> (b+b+b)` — a vacuous implication (a never matches) holds trivially;
    // once a matches, the three-long b chain must follow exactly.
    #[test]
    fn te_implies_scenario() {
        let a = TeExpr::pred_bool("a", bools(&[0, 0, 1, 0, 0, 0, 0, 0, 1, 0, 0, 0, 0, 0, 0, 0]));
        let b = TeExpr::pred_bool("b", bools(&[0, 0, 0, 1, 1, 1, 0, 0, 0, 1, 1, 0, 0, 0, 0, 0]));
        let expr = a.implies(&b.concat(&b).concat(&b));

        let verdicts = run_assertion(&expr, 16);
        let expected = [
            TraceStatus::Match,
            TraceStatus::Match,
            TraceStatus::Match,
            TraceStatus::Match,
            TraceStatus::Match,
            TraceStatus::Match,
            TraceStatus::Match,
            TraceStatus::Match,
            TraceStatus::Fail,
            TraceStatus::Match,
            TraceStatus::Match,
            TraceStatus::Match,
            TraceStatus::Match,
            TraceStatus::Match,
            TraceStatus::Match,
            TraceStatus::Match,
        ];
        assert_verdicts(&verdicts, &expected);
    }

    // Once: `Once((a+a) | (b+b) | (c+c))` over three identical stimulus vectors — every
    // branch lands on the same cycles here, so this exercises `Once`'s wiring through
    // the matcher tree rather than the winner-suppression case (none of the three
    // branches ever resolves on a different cycle than its siblings in this data set).
    #[test]
    fn te_once_scenario() {
        let vals = [0, 0, 1, 1, 0, 0, 0, 1, 1, 1, 0, 0, 0, 0, 0, 0];
        let a = TeExpr::pred_bool("a", bools(&vals));
        let b = TeExpr::pred_bool("b", bools(&vals));
        let c = TeExpr::pred_bool("c", bools(&vals));
        let expr = (a.concat(&a)).alt(&b.concat(&b)).alt(&c.concat(&c)).once();

        let verdicts = run_assertion(&expr, 16);
        let expected = [
            TraceStatus::Fail,
            TraceStatus::Fail,
            TraceStatus::Match,
            TraceStatus::Fail,
            TraceStatus::Fail,
            TraceStatus::Fail,
            TraceStatus::Fail,
            TraceStatus::Match,
            TraceStatus::Match,
            TraceStatus::Fail,
            TraceStatus::Fail,
            TraceStatus::Fail,
            TraceStatus::Fail,
            TraceStatus::Fail,
            TraceStatus::Fail,
            TraceStatus::Fail,
        ];
        assert_verdicts(&verdicts, &expected);
    }

    // Standalone invert (no `Once` wrapper) over the same stimulus: a verdict-by-verdict
    // complement of `te_once_scenario`'s plain-`Alt` child, not exercised via the
    // double-invert involution check S8 already covers.
    #[test]
    fn te_invert_scenario() {
        let vals = [0, 0, 1, 1, 0, 0, 0, 1, 1, 1, 0, 0, 0, 0, 0, 0];
        let a = TeExpr::pred_bool("a", bools(&vals));
        let b = TeExpr::pred_bool("b", bools(&vals));
        let c = TeExpr::pred_bool("c", bools(&vals));
        let expr = (a.concat(&a)).alt(&b.concat(&b)).alt(&c.concat(&c)).invert();

        let verdicts = run_assertion(&expr, 16);
        let expected = [
            TraceStatus::Match,
            TraceStatus::Match,
            TraceStatus::Fail,
            TraceStatus::Match,
            TraceStatus::Match,
            TraceStatus::Match,
            TraceStatus::Match,
            TraceStatus::Fail,
            TraceStatus::Fail,
            TraceStatus::Match,
            TraceStatus::Match,
            TraceStatus::Match,
            TraceStatus::Match,
            TraceStatus::Match,
            TraceStatus::Match,
            TraceStatus::Match,
        ];
        assert_verdicts(&verdicts, &expected);
    }
}

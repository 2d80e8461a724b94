//! Match/failure trace records: what an assertion hands back to `onmatch`/`onfail`.
//!
//! A plain read-only tuple of accessors, the way the distilled interface's
//! `tetrace_*` functions are named — callers poke at fields through functions rather
//! than public struct fields so the representation stays free to change.

use crate::te::ast::MatchData;
use crate::time::Time;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum TraceStatus {
    Match,
    Fail,
}

#[derive(Clone, Debug)]
pub struct MatchTrace {
    pub(crate) label: String,
    pub(crate) start_cycle: u32,
    pub(crate) end_cycle: u32,
    pub(crate) start_time: Time,
    pub(crate) end_time: Time,
    pub(crate) status: TraceStatus,
    pub(crate) data: MatchData,
    pub(crate) children: Vec<MatchTrace>,
}

impl MatchTrace {
    pub(crate) fn new(
        label: String,
        start_cycle: u32,
        end_cycle: u32,
        start_time: Time,
        end_time: Time,
        status: TraceStatus,
        data: MatchData,
    ) -> Self {
        MatchTrace {
            label,
            start_cycle,
            end_cycle,
            start_time,
            end_time,
            status,
            data,
            children: Vec::new(),
        }
    }
}

pub fn tetrace_dict(t: &MatchTrace) -> &MatchData {
    &t.data
}

pub fn tetrace_count(t: &MatchTrace) -> u32 {
    t.end_cycle - t.start_cycle + 1
}

pub fn tetrace_scycle(t: &MatchTrace) -> u32 {
    t.start_cycle
}

pub fn tetrace_ecycle(t: &MatchTrace) -> u32 {
    t.end_cycle
}

pub fn tetrace_stime(t: &MatchTrace) -> Time {
    t.start_time
}

pub fn tetrace_etime(t: &MatchTrace) -> Time {
    t.end_time
}

pub fn tetrace_children(t: &MatchTrace) -> &[MatchTrace] {
    &t.children
}

pub fn tetrace_status(t: &MatchTrace) -> TraceStatus {
    t.status
}

/// `print` is a caller-supplied formatting hook: trace pretty-printing format is an
/// external collaborator's concern, not this crate's.
pub fn tetrace_print(t: &MatchTrace, render: impl Fn(&MatchTrace) -> String) -> String {
    render(t)
}

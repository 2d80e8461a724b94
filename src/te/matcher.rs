//! The matcher: turns a `TeExpr` into a live, per-sample-fed state machine.
//!
//! Each operator spawns its own children the way §4.7 describes: `Concat` starts a
//! fresh right-hand matcher every time its left side lands a match; `Repeat` is
//! desugared into an `Alt` of `Concat` chains at build time; `Once`/`Firstof` suppress
//! siblings once a winner is decided. A matcher dies once it can never produce another
//! match; callers (the assertion driver in `assertion.rs`) drop it once `feed` reports
//! `dead`.

use std::rc::Rc;

use crate::error::{OroboroError, Result};
use crate::te::ast::{MatchData, TeExpr};

pub struct FeedResult {
    pub matched: bool,
    pub dead: bool,
}

impl FeedResult {
    fn pending() -> Self {
        FeedResult {
            matched: false,
            dead: false,
        }
    }
}

pub trait Matcher {
    fn feed(&mut self, cycle: u32, data: &mut MatchData) -> FeedResult;
}

struct PredMatcher {
    f: crate::te::ast::PredFn,
    done: bool,
}

impl Matcher for PredMatcher {
    fn feed(&mut self, cycle: u32, data: &mut MatchData) -> FeedResult {
        if self.done {
            return FeedResult {
                matched: false,
                dead: true,
            };
        }
        self.done = true;
        let matched = (self.f)(cycle, data);
        FeedResult { matched, dead: true }
    }
}

/// `b` starts the cycle *after* `a` ends, so a child spawned because `a` matched this
/// cycle sits in `pending` and is promoted into `b_children` at the top of the next
/// `feed` call, rather than being fed the same sample that closed `a`.
struct ConcatMatcher {
    a: Option<Box<dyn Matcher>>,
    b_template: Rc<TeExpr>,
    b_children: Vec<Box<dyn Matcher>>,
    pending: Vec<Box<dyn Matcher>>,
}

impl Matcher for ConcatMatcher {
    fn feed(&mut self, cycle: u32, data: &mut MatchData) -> FeedResult {
        self.b_children.append(&mut self.pending);

        let mut matched = false;
        let mut spawn = false;

        if let Some(a) = self.a.as_mut() {
            let r = a.feed(cycle, data);
            if r.matched {
                spawn = true;
            }
            if r.dead {
                self.a = None;
            }
        }

        self.b_children.retain_mut(|b| {
            let r = b.feed(cycle, data);
            if r.matched {
                matched = true;
            }
            !r.dead
        });

        if spawn {
            self.pending.push(build(&self.b_template));
        }

        let dead = self.a.is_none() && self.b_children.is_empty() && self.pending.is_empty();
        FeedResult { matched, dead }
    }
}

struct AltMatcher {
    a: Option<Box<dyn Matcher>>,
    b: Option<Box<dyn Matcher>>,
}

impl Matcher for AltMatcher {
    fn feed(&mut self, cycle: u32, data: &mut MatchData) -> FeedResult {
        let mut matched = false;
        if let Some(a) = self.a.as_mut() {
            let r = a.feed(cycle, data);
            matched |= r.matched;
            if r.dead {
                self.a = None;
            }
        }
        if let Some(b) = self.b.as_mut() {
            let r = b.feed(cycle, data);
            matched |= r.matched;
            if r.dead {
                self.b = None;
            }
        }
        let dead = self.a.is_none() && self.b.is_none();
        FeedResult { matched, dead }
    }
}

/// Shared by `Conj` (endpoints equal) and `Intersect` (right endpoint aliased): since
/// both children are fed the same sample stream in lockstep, each child's `matched` flag
/// on a given `feed` call already means "this child ends exactly here" — so requiring
/// both flags true on the same call is exactly "match at the same end cycle e", with no
/// cross-cycle bookkeeping needed.
struct SameEndMatcher {
    a: Box<dyn Matcher>,
    b: Box<dyn Matcher>,
    a_dead: bool,
    b_dead: bool,
}

impl Matcher for SameEndMatcher {
    fn feed(&mut self, cycle: u32, data: &mut MatchData) -> FeedResult {
        let mut a_matched = false;
        let mut b_matched = false;
        if !self.a_dead {
            let r = self.a.feed(cycle, data);
            a_matched = r.matched;
            self.a_dead = r.dead;
        }
        if !self.b_dead {
            let r = self.b.feed(cycle, data);
            b_matched = r.matched;
            self.b_dead = r.dead;
        }
        let dead = self.a_dead || self.b_dead;
        FeedResult {
            matched: a_matched && b_matched,
            dead,
        }
    }
}

/// "If a matches, b must then match; if a never matches at all, the implication holds
/// trivially." `ever_matched` tracks whether `a` produced at least one match before it
/// died, which decides whether its death is "failed" (trivial hold) or exhausted.
struct ImpliesMatcher {
    a: Option<Box<dyn Matcher>>,
    a_ever_matched: bool,
    emitted_trivial: bool,
    b_template: Rc<TeExpr>,
    b_children: Vec<Box<dyn Matcher>>,
    pending: Vec<Box<dyn Matcher>>,
}

impl Matcher for ImpliesMatcher {
    fn feed(&mut self, cycle: u32, data: &mut MatchData) -> FeedResult {
        self.b_children.append(&mut self.pending);

        let mut matched = false;
        if let Some(a) = self.a.as_mut() {
            let r = a.feed(cycle, data);
            if r.matched {
                self.a_ever_matched = true;
                self.pending.push(build(&self.b_template));
            }
            if r.dead {
                if !self.a_ever_matched {
                    matched = true;
                    self.emitted_trivial = true;
                }
                self.a = None;
            }
        }
        self.b_children.retain_mut(|b| {
            let r = b.feed(cycle, data);
            if r.matched {
                matched = true;
            }
            !r.dead
        });
        let dead = self.a.is_none() && self.b_children.is_empty() && self.pending.is_empty();
        FeedResult { matched, dead }
    }
}

/// Reports match only once the child has definitively died without ever matching
/// (a single final verdict rather than a per-cycle one, see DESIGN.md).
struct InvertMatcher {
    child: Option<Box<dyn Matcher>>,
    ever_matched: bool,
}

impl Matcher for InvertMatcher {
    fn feed(&mut self, cycle: u32, data: &mut MatchData) -> FeedResult {
        if let Some(child) = self.child.as_mut() {
            let r = child.feed(cycle, data);
            if r.matched {
                self.ever_matched = true;
            }
            if r.dead {
                self.child = None;
                return FeedResult {
                    matched: !self.ever_matched,
                    dead: true,
                };
            }
        }
        FeedResult::pending()
    }
}

struct OnceMatcher {
    child: Option<Box<dyn Matcher>>,
    fired: bool,
}

impl Matcher for OnceMatcher {
    fn feed(&mut self, cycle: u32, data: &mut MatchData) -> FeedResult {
        if let Some(child) = self.child.as_mut() {
            let r = child.feed(cycle, data);
            if r.dead {
                self.child = None;
            }
            if r.matched && !self.fired {
                self.fired = true;
                return FeedResult {
                    matched: true,
                    dead: self.child.is_none(),
                };
            }
            return FeedResult {
                matched: false,
                dead: self.child.is_none(),
            };
        }
        FeedResult {
            matched: false,
            dead: true,
        }
    }
}

struct FirstofMatcher {
    children: Vec<Option<Box<dyn Matcher>>>,
    decided: bool,
}

impl Matcher for FirstofMatcher {
    fn feed(&mut self, cycle: u32, data: &mut MatchData) -> FeedResult {
        if self.decided {
            return FeedResult {
                matched: false,
                dead: true,
            };
        }
        let mut winner = false;
        for slot in self.children.iter_mut() {
            if let Some(m) = slot {
                let r = m.feed(cycle, data);
                if r.dead {
                    *slot = None;
                }
                if r.matched {
                    winner = true;
                    break;
                }
            }
        }
        if winner {
            self.decided = true;
            return FeedResult {
                matched: true,
                dead: true,
            };
        }
        let dead = self.children.iter().all(|c| c.is_none());
        FeedResult {
            matched: false,
            dead,
        }
    }
}

/// Desugars `Repeat(a, lo, hi)` into an `Alt` of `k`-fold `Concat` chains, built once
/// when the matcher tree is constructed (the bounds are static). `lo == 0` is folded
/// down to `lo == 1` here: none of this crate's own assertions need a true empty-match
/// base case, and supporting it fully would require a zero-width "matches without
/// consuming a sample" node threaded through `Concat`.
fn desugar_repeat(a: &Rc<TeExpr>, lo: u32, hi: u32) -> Rc<TeExpr> {
    let lo = lo.max(1);
    let mut alt: Option<Rc<TeExpr>> = None;
    for k in lo..=hi {
        let mut chain = a.clone();
        for _ in 1..k {
            chain = chain.concat(a);
        }
        alt = Some(match alt {
            None => chain,
            Some(prev) => prev.alt(&chain),
        });
    }
    alt.unwrap_or_else(|| a.clone())
}

pub fn build(expr: &Rc<TeExpr>) -> Box<dyn Matcher> {
    match expr.as_ref() {
        TeExpr::Pred(f, _) => Box::new(PredMatcher {
            f: f.clone(),
            done: false,
        }),
        TeExpr::Concat(a, b) => Box::new(ConcatMatcher {
            a: Some(build(a)),
            b_template: b.clone(),
            b_children: Vec::new(),
            pending: Vec::new(),
        }),
        TeExpr::Alt(a, b) => Box::new(AltMatcher {
            a: Some(build(a)),
            b: Some(build(b)),
        }),
        TeExpr::Conj(a, b) | TeExpr::Intersect(a, b) => Box::new(SameEndMatcher {
            a: build(a),
            b: build(b),
            a_dead: false,
            b_dead: false,
        }),
        TeExpr::Repeat(a, lo, hi) => build(&desugar_repeat(a, *lo, *hi)),
        TeExpr::Implies(a, b) => Box::new(ImpliesMatcher {
            a: Some(build(a)),
            a_ever_matched: false,
            emitted_trivial: false,
            b_template: b.clone(),
            b_children: Vec::new(),
            pending: Vec::new(),
        }),
        TeExpr::Invert(a) => Box::new(InvertMatcher {
            child: Some(build(a)),
            ever_matched: false,
        }),
        TeExpr::Once(a) => Box::new(OnceMatcher {
            child: Some(build(a)),
            fired: false,
        }),
        TeExpr::Firstof(xs) => Box::new(FirstofMatcher {
            children: xs.iter().map(|x| Some(build(x))).collect(),
            decided: false,
        }),
    }
}

/// Validated `Repeat` construction: `lo <= hi` required.
pub fn repeat_checked(a: &Rc<TeExpr>, lo: u32, hi: u32) -> Result<Rc<TeExpr>> {
    if hi < lo {
        return Err(OroboroError::expression(format!(
            "Repeat: hi ({hi}) must be >= lo ({lo})"
        )));
    }
    Ok(a.repeat(lo, hi))
}

/// Stateless single-sample evaluation: builds a fresh matcher tree for `expr` and feeds
/// it exactly one sample at cycle 0. Does not install a sampler or attach to a session
/// loop — for reasoning about one isolated sample before wiring up a larger assertion.
pub fn teeval(expr: &Rc<TeExpr>, data: &mut MatchData) -> bool {
    build(expr).feed(0, data).matched
}

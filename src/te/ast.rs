//! The temporal-expression AST. Immutable once built; `Matcher` (in `matcher.rs`)
//! dispatches on the variant tag rather than through a virtual hierarchy, the same way
//! the bytecode interpreter this is grounded on dispatches on its instruction enum.

use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

/// Scalar values a predicate may stash in its match-scoped data dictionary.
#[derive(Clone, Debug, PartialEq)]
pub enum DataValue {
    Bool(bool),
    Int(i64),
    Str(String),
}

pub type MatchData = BTreeMap<String, DataValue>;

/// A leaf predicate: given the current cycle and this match's data dictionary,
/// decides whether the single sample at that cycle satisfies it.
pub type PredFn = Rc<dyn Fn(u32, &mut MatchData) -> bool>;

#[derive(Clone)]
pub enum TeExpr {
    Pred(PredFn, &'static str),
    Concat(Rc<TeExpr>, Rc<TeExpr>),
    Alt(Rc<TeExpr>, Rc<TeExpr>),
    Conj(Rc<TeExpr>, Rc<TeExpr>),
    Intersect(Rc<TeExpr>, Rc<TeExpr>),
    Repeat(Rc<TeExpr>, u32, u32),
    Implies(Rc<TeExpr>, Rc<TeExpr>),
    Invert(Rc<TeExpr>),
    Once(Rc<TeExpr>),
    Firstof(Vec<Rc<TeExpr>>),
}

impl fmt::Debug for TeExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TeExpr::Pred(_, name) => write!(f, "{name}"),
            TeExpr::Concat(a, b) => write!(f, "({a:?} + {b:?})"),
            TeExpr::Alt(a, b) => write!(f, "({a:?} | {b:?})"),
            TeExpr::Conj(a, b) => write!(f, "({a:?} & {b:?})"),
            TeExpr::Intersect(a, b) => write!(f, "({a:?} ^ {b:?})"),
            TeExpr::Repeat(a, lo, hi) => write!(f, "({a:?} * ({lo},{hi}))"),
            TeExpr::Implies(a, b) => write!(f, "({a:?} >> {b:?})"),
            TeExpr::Invert(a) => write!(f, "~{a:?}"),
            TeExpr::Once(a) => write!(f, "Once({a:?})"),
            TeExpr::Firstof(xs) => {
                write!(f, "Firstof(")?;
                for (i, x) in xs.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{x:?}")?;
                }
                write!(f, ")")
            }
        }
    }
}

impl TeExpr {
    pub fn pred(name: &'static str, f: impl Fn(u32, &mut MatchData) -> bool + 'static) -> Rc<TeExpr> {
        Rc::new(TeExpr::Pred(Rc::new(f), name))
    }

    /// Cycles are 1-based; `samples[0]` is consulted on the first post (cycle 1).
    pub fn pred_bool(name: &'static str, samples: Rc<Vec<bool>>) -> Rc<TeExpr> {
        Self::pred(name, move |cycle, _data| {
            samples.get((cycle - 1) as usize).copied().unwrap_or(false)
        })
    }

    pub fn concat(self: &Rc<Self>, other: &Rc<TeExpr>) -> Rc<TeExpr> {
        Rc::new(TeExpr::Concat(self.clone(), other.clone()))
    }

    pub fn alt(self: &Rc<Self>, other: &Rc<TeExpr>) -> Rc<TeExpr> {
        Rc::new(TeExpr::Alt(self.clone(), other.clone()))
    }

    pub fn conj(self: &Rc<Self>, other: &Rc<TeExpr>) -> Rc<TeExpr> {
        Rc::new(TeExpr::Conj(self.clone(), other.clone()))
    }

    pub fn intersect(self: &Rc<Self>, other: &Rc<TeExpr>) -> Rc<TeExpr> {
        Rc::new(TeExpr::Intersect(self.clone(), other.clone()))
    }

    pub fn implies(self: &Rc<Self>, other: &Rc<TeExpr>) -> Rc<TeExpr> {
        Rc::new(TeExpr::Implies(self.clone(), other.clone()))
    }

    pub fn invert(self: &Rc<Self>) -> Rc<TeExpr> {
        Rc::new(TeExpr::Invert(self.clone()))
    }

    pub fn once(self: &Rc<Self>) -> Rc<TeExpr> {
        Rc::new(TeExpr::Once(self.clone()))
    }

    /// `lo <= hi` required; `lo < 0` is not representable (unsigned), `hi < lo` is an
    /// `ExpressionError` raised by the caller (`repeat_checked`).
    pub fn repeat(self: &Rc<Self>, lo: u32, hi: u32) -> Rc<TeExpr> {
        Rc::new(TeExpr::Repeat(self.clone(), lo, hi))
    }
}

/// `always`/`never`-style always-true leaf: a predicate that matches every sample. The
/// original's `__init__.py` re-exports a `never` builder alongside `always` without the
/// matcher source present in the retained pack; defined here as the natural inverse:
/// sugar over `Invert` of the always-true predicate, so `never` fails on every sample
/// that `always_pred` would match, matching the "always but inverted" reading implied
/// by its name sitting next to `always` in that export list.
pub fn always_pred() -> Rc<TeExpr> {
    TeExpr::pred("ok", |_cycle, _data| true)
}

pub fn never_pred() -> Rc<TeExpr> {
    always_pred().invert()
}

//! Logical simulation time.
//!
//! Kept as a newtype rather than a bare `i64` so the representation could be swapped
//! without touching call sites that only ever add a delay or compare two times.

use std::fmt;
use std::ops::Add;

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Time(pub i64);

impl Time {
    pub const ZERO: Time = Time(0);

    pub fn get(self) -> i64 {
        self.0
    }
}

impl Add<i64> for Time {
    type Output = Time;
    fn add(self, rhs: i64) -> Time {
        Time(self.0 + rhs)
    }
}

impl From<i64> for Time {
    fn from(v: i64) -> Time {
        Time(v)
    }
}

impl fmt::Debug for Time {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t={}", self.0)
    }
}

impl fmt::Display for Time {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

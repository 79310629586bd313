//! Virtual time for the simulation clock.

use std::fmt;
use std::ops::{Add, AddAssign};

/// A point in virtual time, measured in integer ticks.
///
/// Virtual time is advanced only by the scheduler popping events; it has no
/// relationship to wall-clock time. Ticks are unitless — embedding code
/// decides whether a tick is a second, a minute, or anything else.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SimTime(u64);

impl SimTime {
    /// Time zero, the clock value of a fresh environment.
    pub const ZERO: SimTime = SimTime(0);

    /// Creates a time at the given tick count.
    pub fn new(ticks: u64) -> Self {
        SimTime(ticks)
    }

    /// Returns the tick count.
    pub fn ticks(self) -> u64 {
        self.0
    }
}

impl From<u64> for SimTime {
    fn from(ticks: u64) -> Self {
        SimTime(ticks)
    }
}

impl Add<u64> for SimTime {
    type Output = SimTime;

    fn add(self, delay: u64) -> SimTime {
        SimTime(self.0 + delay)
    }
}

impl AddAssign<u64> for SimTime {
    fn add_assign(&mut self, delay: u64) {
        self.0 += delay;
    }
}

impl fmt::Display for SimTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

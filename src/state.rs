//! Circuit breaker states.

use std::fmt;

/// Represents the possible states of a local circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    /// Circuit is closed and calls are admitted.
    Closed = 0,

    /// Circuit is open and calls are refused until the reset timeout elapses.
    Open = 1,

    /// Circuit is admitting probe calls to test whether the dependency recovered.
    HalfOpen = 2,
}

impl State {
    /// Short lowercase name used in log fields and metric labels.
    pub fn as_str(&self) -> &'static str {
        match self {
            State::Closed => "closed",
            State::Open => "open",
            State::HalfOpen => "half-open",
        }
    }

    /// Numeric encoding used by gauges.
    pub fn as_i64(&self) -> i64 {
        *self as i64
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A state change observed on a local breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    /// State before the change.
    pub from: State,
    /// State after the change.
    pub to: State,
}

impl Transition {
    pub(crate) fn new(from: State, to: State) -> Self {
        Self { from, to }
    }
}

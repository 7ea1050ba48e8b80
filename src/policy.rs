//! Trip policies for the local breaker.

/// Selects how failures accumulate toward the failure threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TripPolicy {
    /// Every failure counts toward the threshold; successes in between do not
    /// clear the running total.
    #[default]
    TotalFailures,

    /// Only an unbroken run of failures counts; a success zeroes the counter.
    ConsecutiveFailures,
}

impl TripPolicy {
    /// Whether a recorded success clears the failure counter.
    pub fn success_clears_failures(&self) -> bool {
        matches!(self, TripPolicy::ConsecutiveFailures)
    }

    /// Short name used in log fields.
    pub fn as_str(&self) -> &'static str {
        match self {
            TripPolicy::TotalFailures => "total-failures",
            TripPolicy::ConsecutiveFailures => "consecutive-failures",
        }
    }
}

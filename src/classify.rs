//! Mapping completed attempts to breaker success/failure signals.

use once_cell::sync::Lazy;
use smallvec::SmallVec;
use std::fmt;

use crate::transport::{Response, TransportError};

/// Status codes that count against a breaker unless overridden.
pub const DEFAULT_FAILURE_STATUSES: [u16; 6] = [408, 429, 500, 502, 503, 504];

static DEFAULT_SET: Lazy<FailureStatuses> =
    Lazy::new(|| FailureStatuses::from_codes(DEFAULT_FAILURE_STATUSES));

/// The result of one attempted call, as seen by a breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// A response arrived with a status outside the failure set.
    Success,

    /// A response arrived with a status inside the failure set.
    HttpStatusFailure(u16),

    /// No response: connection failure, timeout or protocol error.
    TransportFailure,
}

impl Outcome {
    /// The boolean signal fed to breakers.
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success)
    }

    /// Short name used in log fields and metric labels.
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::HttpStatusFailure(_) => "http-status-failure",
            Outcome::TransportFailure => "transport-failure",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::HttpStatusFailure(code) => write!(f, "{} ({})", self.as_str(), code),
            _ => f.write_str(self.as_str()),
        }
    }
}

/// The set of HTTP status codes treated as breaker failures.
///
/// Client errors other than 408 and 429 are deliberately absent from the
/// default set: they say nothing about whether the dependency is available.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureStatuses {
    codes: SmallVec<[u16; 8]>,
}

impl Default for FailureStatuses {
    fn default() -> Self {
        DEFAULT_SET.clone()
    }
}

impl FailureStatuses {
    /// Builds a set replacing the defaults entirely.
    ///
    /// An empty input yields the default set.
    pub fn from_codes<I>(codes: I) -> Self
    where
        I: IntoIterator<Item = u16>,
    {
        let mut set: SmallVec<[u16; 8]> = codes.into_iter().collect();
        if set.is_empty() {
            return Self::default();
        }
        set.sort_unstable();
        set.dedup();
        Self { codes: set }
    }

    /// Whether `status` counts as a failure.
    pub fn contains(&self, status: u16) -> bool {
        self.codes.binary_search(&status).is_ok()
    }

    /// The codes in ascending order.
    pub fn codes(&self) -> &[u16] {
        &self.codes
    }

    /// Classifies a completed attempt.
    pub fn classify(&self, result: &Result<Response, TransportError>) -> Outcome {
        match result {
            Ok(response) => self.classify_status(response.status()),
            Err(_) => Outcome::TransportFailure,
        }
    }

    /// Classifies a received status code.
    pub fn classify_status(&self, status: u16) -> Outcome {
        if self.contains(status) {
            Outcome::HttpStatusFailure(status)
        } else {
            Outcome::Success
        }
    }
}

/// Free-standing form of [`FailureStatuses::classify`]: a transport error is
/// always a failure, otherwise the status decides.
pub fn classify(
    transport_failed: bool,
    status: Option<u16>,
    failure_statuses: &FailureStatuses,
) -> bool {
    if transport_failed {
        return false;
    }
    match status {
        Some(code) => !failure_statuses.contains(code),
        None => false,
    }
}

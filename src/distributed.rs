//! Circuit breaker whose state lives in a shared counter store.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, trace};

use crate::config::DistributedBuilder;
use crate::error::{AdmitError, StoreError};
use crate::store::CounterStore;

/// A breaker shared across processes through a counter keyed per dependency.
///
/// Nothing is cached locally: every admission check and every recorded
/// outcome is a round trip, so all holders of the same store and key see the
/// same decision.
#[derive(Clone)]
pub struct DistributedBreaker {
    store: Arc<dyn CounterStore>,
    failure_limit: u64,
    counter_ttl: Duration,
}

impl DistributedBreaker {
    pub(crate) fn new(store: Arc<dyn CounterStore>, failure_limit: u64, counter_ttl: Duration) -> Self {
        Self {
            store,
            failure_limit,
            counter_ttl,
        }
    }

    /// Creates a new builder over `store`.
    pub fn builder<S: CounterStore + 'static>(store: S) -> DistributedBuilder {
        DistributedBuilder::new(store)
    }

    /// Counter value at which admission is refused.
    pub fn failure_limit(&self) -> u64 {
        self.failure_limit
    }

    /// Lifetime of a failure window.
    pub fn counter_ttl(&self) -> Duration {
        self.counter_ttl
    }

    /// Admission check for `key`. An absent counter means zero failures.
    pub fn admit(&self, key: &str) -> Result<(), AdmitError> {
        let failures = self.failures(key)?;
        if failures >= self.failure_limit {
            debug!(key, failures, limit = self.failure_limit, "admission refused");
            return Err(AdmitError::Refused {
                key: key.to_string(),
                failures,
            });
        }
        trace!(key, failures, "admitted");
        Ok(())
    }

    /// Counts a failure against `key`, arming the window TTL on the first one.
    ///
    /// Increment and expire are two separate store commands. If the process
    /// dies between them the window has no expiry and stays open until a
    /// success resets it; callers accept that longer window.
    pub fn record_failure(&self, key: &str) -> Result<u64, StoreError> {
        let failures = self.store.incr(key)?;
        if failures == 1 {
            self.store.expire(key, self.counter_ttl)?;
        }
        trace!(key, failures, "failure recorded");
        Ok(failures)
    }

    /// Clears the counter for `key`. Idempotent.
    pub fn reset(&self, key: &str) -> Result<(), StoreError> {
        self.store.delete(key)
    }

    /// Current counter value for `key`.
    pub fn failures(&self, key: &str) -> Result<u64, StoreError> {
        Ok(self.store.get(key)?.unwrap_or(0))
    }

    /// Routes an outcome to `record_failure` or `reset`.
    pub fn record(&self, key: &str, success: bool) -> Result<(), StoreError> {
        if success {
            self.reset(key)
        } else {
            self.record_failure(key).map(|_| ())
        }
    }
}

impl std::fmt::Debug for DistributedBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DistributedBreaker")
            .field("failure_limit", &self.failure_limit)
            .field("counter_ttl", &self.counter_ttl)
            .finish_non_exhaustive()
    }
}

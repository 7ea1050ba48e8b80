//! Construction-time configuration for breakers.

use std::sync::Arc;
use std::time::Duration;

use crate::breaker::{BreakerSettings, LocalBreaker};
use crate::distributed::DistributedBreaker;
use crate::error::ConfigError;
use crate::hook::HookRegistry;
use crate::metrics::{MetricSink, NullMetricSink};
use crate::policy::TripPolicy;
use crate::store::CounterStore;

/// How a local breaker moves from OPEN to HALF_OPEN.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HalfOpenMode {
    /// The transition happens inside the first `allow()` after the reset
    /// timeout has elapsed.
    #[default]
    Lazy,

    /// A background watcher, armed when the breaker trips, flips the state
    /// once the reset timeout elapses even if nobody calls `allow()`.
    /// `allow()` still performs the lazy check.
    Scheduled,
}

/// Builder for [`LocalBreaker`].
pub struct BreakerBuilder {
    name: String,
    policy: TripPolicy,
    failure_threshold: u32,
    reset_timeout: Duration,
    half_open_probe_quota: u32,
    half_open_mode: HalfOpenMode,
    metric_sink: Arc<dyn MetricSink>,
    hook_registry: Arc<HookRegistry>,
}

impl Default for BreakerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl BreakerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            name: "default".to_string(),
            policy: TripPolicy::TotalFailures,
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(30),
            half_open_probe_quota: 1,
            half_open_mode: HalfOpenMode::Lazy,
            metric_sink: Arc::new(NullMetricSink),
            hook_registry: Arc::new(HookRegistry::new()),
        }
    }

    /// Names the breaker in logs and metrics; usually the dependency it guards.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets how failures accumulate.
    pub fn policy(mut self, policy: TripPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Sets the number of counted failures that trips the breaker.
    pub fn failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    /// Sets how long the breaker stays OPEN before admitting a probe.
    pub fn reset_timeout(mut self, timeout: Duration) -> Self {
        self.reset_timeout = timeout;
        self
    }

    /// Sets the number of successful probes needed to close from HALF_OPEN.
    pub fn half_open_probe_quota(mut self, quota: u32) -> Self {
        self.half_open_probe_quota = quota;
        self
    }

    /// Selects lazy or scheduled OPEN to HALF_OPEN transitions.
    pub fn half_open_mode(mut self, mode: HalfOpenMode) -> Self {
        self.half_open_mode = mode;
        self
    }

    /// Sets a metric sink for state transitions.
    pub fn metric_sink<M: MetricSink>(mut self, sink: M) -> Self {
        self.metric_sink = Arc::new(sink);
        self
    }

    /// Shares an existing sink, e.g. one also used by a dispatcher.
    pub fn shared_metric_sink(mut self, sink: Arc<dyn MetricSink>) -> Self {
        self.metric_sink = sink;
        self
    }

    /// Sets a hook registry for the breaker.
    pub fn hooks(mut self, hooks: HookRegistry) -> Self {
        self.hook_registry = Arc::new(hooks);
        self
    }

    /// Validates the settings and builds the breaker.
    pub fn build(self) -> Result<LocalBreaker, ConfigError> {
        if self.failure_threshold == 0 {
            return Err(ConfigError::ZeroFailureThreshold);
        }
        if self.half_open_probe_quota == 0 {
            return Err(ConfigError::ZeroProbeQuota);
        }

        LocalBreaker::new(BreakerSettings {
            name: self.name,
            policy: self.policy,
            failure_threshold: self.failure_threshold,
            reset_timeout: self.reset_timeout,
            half_open_probe_quota: self.half_open_probe_quota,
            half_open_mode: self.half_open_mode,
            metric_sink: self.metric_sink,
            hooks: self.hook_registry,
        })
    }
}

/// Builder for [`DistributedBreaker`].
pub struct DistributedBuilder {
    store: Arc<dyn CounterStore>,
    failure_limit: u64,
    counter_ttl: Duration,
}

impl DistributedBuilder {
    /// Creates a builder over a shared counter store.
    pub fn new<S: CounterStore + 'static>(store: S) -> Self {
        Self::with_shared_store(Arc::new(store))
    }

    /// Creates a builder over a store already shared elsewhere.
    pub fn with_shared_store(store: Arc<dyn CounterStore>) -> Self {
        Self {
            store,
            failure_limit: 5,
            counter_ttl: Duration::from_secs(10),
        }
    }

    /// Sets the counter value at which admission is refused.
    pub fn failure_limit(mut self, limit: u64) -> Self {
        self.failure_limit = limit;
        self
    }

    /// Sets the lifetime of a failure window, armed on its first failure.
    pub fn counter_ttl(mut self, ttl: Duration) -> Self {
        self.counter_ttl = ttl;
        self
    }

    /// Validates the settings and builds the breaker.
    pub fn build(self) -> Result<DistributedBreaker, ConfigError> {
        if self.failure_limit == 0 {
            return Err(ConfigError::ZeroFailureLimit);
        }
        Ok(DistributedBreaker::new(
            self.store,
            self.failure_limit,
            self.counter_ttl,
        ))
    }
}

//! In-process circuit breaker.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::config::{BreakerBuilder, HalfOpenMode};
use crate::error::ConfigError;
use crate::hook::HookRegistry;
use crate::metrics::MetricSink;
use crate::policy::TripPolicy;
use crate::state::{State, Transition};
use crate::watcher::{self, ArmSignal};

pub(crate) struct BreakerSettings {
    pub(crate) name: String,
    pub(crate) policy: TripPolicy,
    pub(crate) failure_threshold: u32,
    pub(crate) reset_timeout: Duration,
    pub(crate) half_open_probe_quota: u32,
    pub(crate) half_open_mode: HalfOpenMode,
    pub(crate) metric_sink: Arc<dyn MetricSink>,
    pub(crate) hooks: Arc<HookRegistry>,
}

/// Counters and state, only touched under the breaker's lock.
#[derive(Debug)]
struct Core {
    state: State,
    failure_count: u32,
    success_count: u32,
    last_failure_at: Option<Instant>,
}

impl Core {
    fn enter_half_open(&mut self) -> Transition {
        let from = self.state;
        self.state = State::HalfOpen;
        self.failure_count = 0;
        self.success_count = 0;
        Transition::new(from, State::HalfOpen)
    }

    fn close(&mut self) -> Transition {
        let from = self.state;
        self.state = State::Closed;
        self.failure_count = 0;
        self.success_count = 0;
        Transition::new(from, State::Closed)
    }

    fn trip(&mut self) -> Transition {
        let from = self.state;
        self.state = State::Open;
        Transition::new(from, State::Open)
    }
}

/// A point-in-time copy of a local breaker's state and counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakerSnapshot {
    /// Current state.
    pub state: State,
    /// Counted failures. Frozen while OPEN.
    pub failure_count: u32,
    /// Recorded successes since the last reset of the counters.
    pub success_count: u32,
    /// When the most recent failure was recorded.
    pub last_failure_at: Option<Instant>,
}

pub(crate) enum WatchStep {
    Done,
    Wait(Duration),
}

pub(crate) struct BreakerInner {
    name: String,
    policy: TripPolicy,
    failure_threshold: u32,
    reset_timeout: Duration,
    half_open_probe_quota: u32,
    core: Mutex<Core>,
    arm: Option<ArmSignal>,
    metric_sink: Arc<dyn MetricSink>,
    hooks: Arc<HookRegistry>,
}

impl BreakerInner {
    fn reset_elapsed(&self, core: &Core, now: Instant) -> bool {
        core.last_failure_at
            .map_or(true, |at| now.saturating_duration_since(at) > self.reset_timeout)
    }

    /// Called by the watcher thread. Promotes OPEN to HALF_OPEN once due,
    /// otherwise reports how long to wait before checking again.
    pub(crate) fn promote_if_due(&self) -> WatchStep {
        let now = Instant::now();
        let transition = {
            let mut core = self.core.lock();
            if core.state != State::Open {
                return WatchStep::Done;
            }
            if !self.reset_elapsed(&core, now) {
                let since = core
                    .last_failure_at
                    .map_or(Duration::ZERO, |at| now.saturating_duration_since(at));
                // `allow()` compares strictly, so wake just past the boundary.
                return WatchStep::Wait(
                    self.reset_timeout
                        .saturating_sub(since)
                        .saturating_add(Duration::from_millis(1)),
                );
            }
            core.enter_half_open()
        };

        self.announce(transition);
        WatchStep::Done
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    fn announce(&self, transition: Transition) {
        match transition.to {
            State::Open => warn!(
                breaker = %self.name,
                from = %transition.from,
                "circuit breaker opened"
            ),
            State::HalfOpen => info!(breaker = %self.name, "circuit breaker half-open, admitting probes"),
            State::Closed => info!(breaker = %self.name, "circuit breaker closed"),
        }

        if transition.to == State::Open {
            if let Some(arm) = &self.arm {
                arm.arm();
            }
        }

        self.metric_sink
            .record_state_transition(&self.name, transition.from, transition.to);
        self.hooks.execute_transition_hooks(transition);
    }
}

/// An in-process circuit breaker guarding one downstream dependency.
///
/// All counter and state changes happen under one mutex held only for the
/// in-memory update; the guarded call itself always runs without it. Cloning
/// is cheap and clones share state.
#[derive(Clone)]
pub struct LocalBreaker {
    inner: Arc<BreakerInner>,
}

impl LocalBreaker {
    pub(crate) fn new(settings: BreakerSettings) -> Result<Self, ConfigError> {
        let (arm, listener) = match settings.half_open_mode {
            HalfOpenMode::Lazy => (None, None),
            HalfOpenMode::Scheduled => {
                let (arm, listener) = watcher::channel();
                (Some(arm), Some(listener))
            }
        };

        let inner = Arc::new(BreakerInner {
            name: settings.name,
            policy: settings.policy,
            failure_threshold: settings.failure_threshold,
            reset_timeout: settings.reset_timeout,
            half_open_probe_quota: settings.half_open_probe_quota,
            core: Mutex::new(Core {
                state: State::Closed,
                failure_count: 0,
                success_count: 0,
                last_failure_at: None,
            }),
            arm,
            metric_sink: settings.metric_sink,
            hooks: settings.hooks,
        });

        if let Some(listener) = listener {
            listener
                .spawn(Arc::downgrade(&inner))
                .map_err(ConfigError::Watcher)?;
        }

        Ok(Self { inner })
    }

    /// Creates a new builder for customizing a breaker.
    pub fn builder() -> BreakerBuilder {
        BreakerBuilder::new()
    }

    /// The breaker's name.
    pub fn name(&self) -> &str {
        self.inner.name()
    }

    /// The configured trip policy.
    pub fn policy(&self) -> TripPolicy {
        self.inner.policy
    }

    /// Admission check.
    ///
    /// In OPEN, the call that finds the reset timeout elapsed also moves the
    /// breaker to HALF_OPEN and zeroes both counters before returning true.
    pub fn allow(&self) -> bool {
        let now = Instant::now();
        let (allowed, transition) = {
            let mut core = self.inner.core.lock();
            let state = core.state;
            match state {
                State::Closed => (true, None),
                State::Open => {
                    if self.inner.reset_elapsed(&core, now) {
                        (true, Some(core.enter_half_open()))
                    } else {
                        (false, None)
                    }
                }
                State::HalfOpen => (
                    core.success_count < self.inner.half_open_probe_quota,
                    None,
                ),
            }
        };

        if let Some(transition) = transition {
            self.inner.announce(transition);
        }
        if !allowed {
            debug!(breaker = %self.inner.name, "admission refused");
            self.inner.hooks.execute_refused_hook();
        }

        allowed
    }

    /// Feeds the outcome of an admitted call back into the breaker.
    pub fn record(&self, success: bool) {
        self.record_with_state(success);
    }

    /// Like [`record`](Self::record), returning the state this outcome left
    /// the breaker in, read under the same lock.
    pub(crate) fn record_with_state(&self, success: bool) -> State {
        let (transition, state_after) = {
            let mut core = self.inner.core.lock();
            let transition = if success {
                core.success_count = core.success_count.saturating_add(1);
                let state = core.state;
                match state {
                    State::HalfOpen
                        if core.success_count >= self.inner.half_open_probe_quota =>
                    {
                        Some(core.close())
                    }
                    State::Closed if self.inner.policy.success_clears_failures() => {
                        core.failure_count = 0;
                        None
                    }
                    _ => None,
                }
            } else {
                core.last_failure_at = Some(Instant::now());
                let state = core.state;
                match state {
                    State::HalfOpen => Some(core.trip()),
                    State::Closed => {
                        core.failure_count = core.failure_count.saturating_add(1);
                        if core.failure_count >= self.inner.failure_threshold {
                            Some(core.trip())
                        } else {
                            None
                        }
                    }
                    // Late result from a call admitted before the trip.
                    State::Open => None,
                }
            };
            (transition, core.state)
        };

        if let Some(transition) = transition {
            self.inner.announce(transition);
        }
        state_after
    }

    /// Current state, for observability.
    pub fn state(&self) -> State {
        self.inner.core.lock().state
    }

    /// State and counters read under one lock acquisition.
    pub fn snapshot(&self) -> BreakerSnapshot {
        let core = self.inner.core.lock();
        BreakerSnapshot {
            state: core.state,
            failure_count: core.failure_count,
            success_count: core.success_count,
            last_failure_at: core.last_failure_at,
        }
    }
}

impl std::fmt::Debug for LocalBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalBreaker")
            .field("name", &self.inner.name)
            .field("policy", &self.inner.policy)
            .field("failure_threshold", &self.inner.failure_threshold)
            .field("reset_timeout", &self.inner.reset_timeout)
            .field("half_open_probe_quota", &self.inner.half_open_probe_quota)
            .field("scheduled", &self.inner.arm.is_some())
            .finish()
    }
}

//! Observability sink for dispatched calls and breaker transitions.

use std::time::Duration;

use crate::classify::Outcome;
use crate::state::State;

/// Which breaker guarded a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GuardKind {
    /// No breaker configured.
    Unguarded,
    /// The in-process breaker.
    Local,
    /// The counter-store breaker.
    Distributed,
}

impl GuardKind {
    /// Short name used in log fields and metric labels.
    pub fn as_str(&self) -> &'static str {
        match self {
            GuardKind::Unguarded => "none",
            GuardKind::Local => "local",
            GuardKind::Distributed => "distributed",
        }
    }
}

/// What happened to one call, reported once the dispatcher is done with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallReport {
    /// Breaker that guarded the call.
    pub guard: GuardKind,
    /// Whether admission was granted.
    pub admitted: bool,
    /// Classified outcome; `None` when the call was refused.
    pub outcome: Option<Outcome>,
    /// Local breaker state after feedback; `None` for other guards.
    pub state_after: Option<State>,
    /// Whether the outcome reached the breaker. False when a counter store
    /// write failed, or when the call was refused.
    pub feedback_recorded: bool,
    /// Time spent in the transport.
    pub elapsed: Duration,
}

/// Trait for sinks that receive breaker events.
///
/// Sinks are informational; nothing in the breakers depends on them.
pub trait MetricSink: Send + Sync + 'static {
    /// Records the fate of a dispatched call.
    fn record_call(&self, report: &CallReport);

    /// Records a local breaker state transition.
    fn record_state_transition(&self, breaker: &str, from: State, to: State);
}

/// A sink that discards all events.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullMetricSink;

impl MetricSink for NullMetricSink {
    fn record_call(&self, _report: &CallReport) {}
    fn record_state_transition(&self, _breaker: &str, _from: State, _to: State) {}
}

#[cfg(feature = "prometheus")]
pub use self::prometheus::PrometheusSink;

#[cfg(feature = "prometheus")]
mod prometheus {
    use prometheus_client::metrics::counter::Counter;
    use prometheus_client::metrics::family::Family;
    use prometheus_client::metrics::gauge::Gauge;
    use prometheus_client::registry::Registry;

    use super::{CallReport, MetricSink};
    use crate::state::State;

    type Labels = Vec<(String, String)>;

    /// Exports call and transition counters plus a per-breaker state gauge.
    #[derive(Debug, Clone, Default)]
    pub struct PrometheusSink {
        calls: Family<Labels, Counter>,
        transitions: Family<Labels, Counter>,
        state: Family<Labels, Gauge>,
    }

    impl PrometheusSink {
        /// Creates the metrics and registers them.
        pub fn new(registry: &mut Registry) -> Self {
            let sink = Self::default();
            registry.register(
                "breaker_calls",
                "Dispatched calls by guard, admission and outcome",
                sink.calls.clone(),
            );
            registry.register(
                "breaker_transitions",
                "Local breaker state transitions",
                sink.transitions.clone(),
            );
            registry.register(
                "breaker_state",
                "Local breaker state (0 closed, 1 open, 2 half-open)",
                sink.state.clone(),
            );
            sink
        }
    }

    impl MetricSink for PrometheusSink {
        fn record_call(&self, report: &CallReport) {
            let outcome = report.outcome.map_or("refused", |outcome| outcome.as_str());
            let labels = vec![
                ("guard".to_string(), report.guard.as_str().to_string()),
                ("admitted".to_string(), report.admitted.to_string()),
                ("outcome".to_string(), outcome.to_string()),
            ];
            self.calls.get_or_create(&labels).inc();
        }

        fn record_state_transition(&self, breaker: &str, from: State, to: State) {
            let labels = vec![
                ("breaker".to_string(), breaker.to_string()),
                ("from".to_string(), from.as_str().to_string()),
                ("to".to_string(), to.as_str().to_string()),
            ];
            self.transitions.get_or_create(&labels).inc();

            let labels = vec![("breaker".to_string(), breaker.to_string())];
            self.state.get_or_create(&labels).set(to.as_i64());
        }
    }
}

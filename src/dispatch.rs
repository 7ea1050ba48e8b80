//! Wraps one outbound call with admission control and outcome feedback.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, trace, warn};

use crate::breaker::LocalBreaker;
use crate::classify::{FailureStatuses, Outcome};
use crate::distributed::DistributedBreaker;
use crate::error::{AdmitError, BuildError, DispatchError, DispatchResult, StoreError};
use crate::metrics::{CallReport, GuardKind, MetricSink, NullMetricSink};
use crate::request::Request;
use crate::state::State;
use crate::transport::{Response, Transport, TransportError};

/// The breaker acting on one call.
enum Guard<'a> {
    Unguarded,
    Local(&'a LocalBreaker),
    Distributed(&'a DistributedBreaker, &'a str),
}

impl Guard<'_> {
    fn kind(&self) -> GuardKind {
        match self {
            Guard::Unguarded => GuardKind::Unguarded,
            Guard::Local(_) => GuardKind::Local,
            Guard::Distributed(..) => GuardKind::Distributed,
        }
    }
}

/// Builder for [`Dispatcher`].
pub struct DispatcherBuilder<T> {
    transport: T,
    local: Option<LocalBreaker>,
    distributed: Option<DistributedBreaker>,
    failure_statuses: FailureStatuses,
    metric_sink: Arc<dyn MetricSink>,
}

impl<T> DispatcherBuilder<T> {
    /// Guards calls with an in-process breaker.
    pub fn local_breaker(mut self, breaker: LocalBreaker) -> Self {
        self.local = Some(breaker);
        self
    }

    /// Guards calls with a counter-store breaker. Each request must then
    /// carry a breaker key. Ignored while a local breaker is configured.
    pub fn distributed_breaker(mut self, breaker: DistributedBreaker) -> Self {
        self.distributed = Some(breaker);
        self
    }

    /// Replaces the default failure status set for every call that does not
    /// override it. An empty list keeps the default.
    pub fn failure_statuses<I>(mut self, codes: I) -> Self
    where
        I: IntoIterator<Item = u16>,
    {
        self.failure_statuses = FailureStatuses::from_codes(codes);
        self
    }

    /// Sets the sink receiving one report per call.
    pub fn metric_sink<M: MetricSink>(mut self, sink: M) -> Self {
        self.metric_sink = Arc::new(sink);
        self
    }

    /// Shares an existing sink.
    pub fn shared_metric_sink(mut self, sink: Arc<dyn MetricSink>) -> Self {
        self.metric_sink = sink;
        self
    }

    /// Builds the dispatcher.
    pub fn build(self) -> Dispatcher<T> {
        if self.local.is_some() && self.distributed.is_some() {
            debug!("local and distributed breakers configured, the local breaker takes precedence");
        }
        Dispatcher {
            transport: self.transport,
            local: self.local,
            distributed: self.distributed,
            failure_statuses: self.failure_statuses,
            metric_sink: self.metric_sink,
        }
    }
}

/// Sends requests through a transport under breaker control.
///
/// A call runs in four steps: the request's build errors are surfaced, the
/// active breaker is asked for admission, the transport is invoked without
/// any breaker lock held, and the classified outcome is fed back to the
/// breaker before the transport result is returned unchanged.
pub struct Dispatcher<T> {
    transport: T,
    local: Option<LocalBreaker>,
    distributed: Option<DistributedBreaker>,
    failure_statuses: FailureStatuses,
    metric_sink: Arc<dyn MetricSink>,
}

impl<T> Dispatcher<T> {
    /// Starts building a dispatcher over `transport`.
    pub fn builder(transport: T) -> DispatcherBuilder<T> {
        DispatcherBuilder {
            transport,
            local: None,
            distributed: None,
            failure_statuses: FailureStatuses::default(),
            metric_sink: Arc::new(NullMetricSink),
        }
    }

    /// Which breaker guards calls made through this dispatcher.
    pub fn guard_kind(&self) -> GuardKind {
        if self.local.is_some() {
            GuardKind::Local
        } else if self.distributed.is_some() {
            GuardKind::Distributed
        } else {
            GuardKind::Unguarded
        }
    }

    /// The local breaker, if configured.
    pub fn local_breaker(&self) -> Option<&LocalBreaker> {
        self.local.as_ref()
    }

    /// The distributed breaker, if configured.
    pub fn distributed_breaker(&self) -> Option<&DistributedBreaker> {
        self.distributed.as_ref()
    }

    /// The transport calls are sent through.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    fn prepare<'a>(&'a self, request: &'a Request) -> Result<Guard<'a>, BuildError> {
        if let Some(err) = request.build_error() {
            debug!(error = %err, "request has build errors, not dispatching");
            return Err(err.clone());
        }

        if let Some(local) = &self.local {
            return Ok(Guard::Local(local));
        }
        if let Some(distributed) = &self.distributed {
            let key = request.breaker_key().ok_or(BuildError::MissingBreakerKey)?;
            return Ok(Guard::Distributed(distributed, key));
        }
        Ok(Guard::Unguarded)
    }

    fn failure_statuses_for<'a>(&'a self, request: &'a Request) -> &'a FailureStatuses {
        request
            .failure_statuses()
            .unwrap_or(&self.failure_statuses)
    }

    fn refuse(&self, guard: GuardKind, state_after: Option<State>) -> DispatchError {
        self.metric_sink.record_call(&CallReport {
            guard,
            admitted: false,
            outcome: None,
            state_after,
            feedback_recorded: false,
            elapsed: Duration::ZERO,
        });
        DispatchError::CircuitOpen
    }

    fn admit_local(&self, breaker: &LocalBreaker) -> DispatchResult<()> {
        if breaker.allow() {
            return Ok(());
        }
        Err(self.refuse(GuardKind::Local, Some(breaker.state())))
    }

    fn settle_admission(&self, key: &str, admission: Result<(), AdmitError>) -> DispatchResult<()> {
        match admission {
            Ok(()) => Ok(()),
            Err(AdmitError::Refused { .. }) => Err(self.refuse(GuardKind::Distributed, None)),
            Err(AdmitError::Store(err)) => {
                warn!(key, error = %err, "breaker store unreachable during admission");
                Err(DispatchError::Store(err))
            }
        }
    }

    fn settle_feedback(&self, key: &str, feedback: Result<(), StoreError>) -> bool {
        match feedback {
            Ok(()) => true,
            Err(err) => {
                warn!(key, error = %err, "failed to record outcome in breaker store");
                false
            }
        }
    }

    fn finish(
        &self,
        guard: GuardKind,
        outcome: Outcome,
        state_after: Option<State>,
        feedback_recorded: bool,
        elapsed: Duration,
        result: Result<Response, TransportError>,
    ) -> DispatchResult<Response> {
        debug!(
            guard = guard.as_str(),
            outcome = %outcome,
            elapsed_ms = elapsed.as_millis() as u64,
            "call completed"
        );
        self.metric_sink.record_call(&CallReport {
            guard,
            admitted: true,
            outcome: Some(outcome),
            state_after,
            feedback_recorded,
            elapsed,
        });
        result.map_err(DispatchError::Transport)
    }
}

impl<T: Transport> Dispatcher<T> {
    /// Executes one request under breaker control.
    ///
    /// Returns [`DispatchError::CircuitOpen`] without touching the network
    /// when the active breaker refuses. Responses whose status is in the
    /// failure set are still returned as `Ok`; they only count against the
    /// breaker.
    pub fn execute(&self, request: &Request) -> DispatchResult<Response> {
        let guard = self.prepare(request)?;

        match &guard {
            Guard::Unguarded => {}
            Guard::Local(breaker) => self.admit_local(breaker)?,
            Guard::Distributed(breaker, key) => {
                self.settle_admission(key, breaker.admit(key))?
            }
        }
        trace!(method = %request.method(), guard = guard.kind().as_str(), "admitted");

        let start = Instant::now();
        let result = self.transport.send(request);
        let elapsed = start.elapsed();

        let outcome = self.failure_statuses_for(request).classify(&result);
        let (state_after, feedback_recorded) = match &guard {
            Guard::Unguarded => (None, false),
            Guard::Local(breaker) => {
                (Some(breaker.record_with_state(outcome.is_success())), true)
            }
            Guard::Distributed(breaker, key) => (
                None,
                self.settle_feedback(key, breaker.record(key, outcome.is_success())),
            ),
        };

        self.finish(
            guard.kind(),
            outcome,
            state_after,
            feedback_recorded,
            elapsed,
            result,
        )
    }
}

#[cfg(feature = "async")]
impl<T: crate::transport::AsyncTransport> Dispatcher<T> {
    /// Async form of [`execute`](Dispatcher::execute).
    ///
    /// Counter store round trips run on tokio's blocking pool; must be
    /// called from within a tokio runtime when a distributed breaker is
    /// active.
    pub async fn execute_async(&self, request: &Request) -> DispatchResult<Response> {
        let guard = self.prepare(request)?;

        match &guard {
            Guard::Unguarded => {}
            Guard::Local(breaker) => self.admit_local(breaker)?,
            Guard::Distributed(breaker, key) => {
                let admission = run_blocking(breaker, key, |breaker, key| {
                    breaker.admit(key)
                })
                .await
                .unwrap_or_else(|err| Err(AdmitError::Store(err)));
                self.settle_admission(key, admission)?
            }
        }
        trace!(method = %request.method(), guard = guard.kind().as_str(), "admitted");

        let start = Instant::now();
        let result = self.transport.send(request).await;
        let elapsed = start.elapsed();

        let outcome = self.failure_statuses_for(request).classify(&result);
        let success = outcome.is_success();
        let (state_after, feedback_recorded) = match &guard {
            Guard::Unguarded => (None, false),
            Guard::Local(breaker) => (Some(breaker.record_with_state(success)), true),
            Guard::Distributed(breaker, key) => {
                let feedback = run_blocking(breaker, key, move |breaker, key| {
                    breaker.record(key, success)
                })
                .await
                .and_then(|feedback| feedback);
                (None, self.settle_feedback(key, feedback))
            }
        };

        self.finish(
            guard.kind(),
            outcome,
            state_after,
            feedback_recorded,
            elapsed,
            result,
        )
    }
}

#[cfg(feature = "async")]
async fn run_blocking<R, F>(
    breaker: &DistributedBreaker,
    key: &str,
    op: F,
) -> Result<R, StoreError>
where
    R: Send + 'static,
    F: FnOnce(&DistributedBreaker, &str) -> R + Send + 'static,
{
    let breaker = breaker.clone();
    let key = key.to_string();
    tokio::task::spawn_blocking(move || op(&breaker, &key))
        .await
        .map_err(|err| StoreError::Task(err.to_string()))
}

impl<T> std::fmt::Debug for Dispatcher<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("guard", &self.guard_kind())
            .field("local", &self.local)
            .field("distributed", &self.distributed)
            .field("failure_statuses", &self.failure_statuses.codes())
            .finish_non_exhaustive()
    }
}

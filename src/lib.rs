//! # outbound-breaker
//!
//! Circuit breaking for outbound HTTP calls. Before every call a breaker
//! decides whether the call is attempted at all; after every completed call
//! the outcome is fed back so the breaker can update its assessment.
//!
//! Two breakers are provided:
//!
//! - [`LocalBreaker`]: an in-process CLOSED / OPEN / HALF_OPEN state machine
//!   with a total-failures or consecutive-failures trip policy, a reset
//!   timeout and a half-open probe quota.
//! - [`DistributedBreaker`]: a failure counter in a shared [`CounterStore`]
//!   (Redis with the `redis` feature), keyed per dependency, so every process
//!   using the same key makes the same admission decision.
//!
//! A [`Dispatcher`] ties either breaker to a [`Transport`]: it surfaces
//! request build errors, asks for admission, sends the request, classifies
//! the outcome against a set of failure status codes and records it.
//!
//! ## States
//!
//! - **Closed**: calls pass through; failures are counted.
//! - **Open**: calls are refused without touching the network until the
//!   reset timeout has elapsed since the last failure.
//! - **Half-Open**: probe calls are admitted until the probe quota of
//!   successes closes the breaker; any failed probe re-opens it.
//!
//! ## Basic Usage
//!
//! ```rust
//! use outbound_breaker::{
//!     DispatchError, Dispatcher, LocalBreaker, Request, Response, Transport, TransportError,
//!     TripPolicy,
//! };
//! use std::time::Duration;
//!
//! struct Unavailable;
//!
//! impl Transport for Unavailable {
//!     fn send(&self, _request: &Request) -> Result<Response, TransportError> {
//!         Ok(Response::with_status(503))
//!     }
//! }
//!
//! let breaker = LocalBreaker::builder()
//!     .name("inventory")
//!     .policy(TripPolicy::ConsecutiveFailures)
//!     .failure_threshold(2)
//!     .reset_timeout(Duration::from_secs(30))
//!     .build()
//!     .unwrap();
//!
//! let dispatcher = Dispatcher::builder(Unavailable)
//!     .local_breaker(breaker)
//!     .build();
//!
//! let request = Request::get("http://inventory.internal/items").build();
//!
//! // Failure statuses are returned as responses and counted.
//! assert_eq!(dispatcher.execute(&request).unwrap().status(), 503);
//! assert_eq!(dispatcher.execute(&request).unwrap().status(), 503);
//!
//! // The breaker has tripped: no network call is made.
//! assert!(matches!(
//!     dispatcher.execute(&request),
//!     Err(DispatchError::CircuitOpen)
//! ));
//! ```
//!
//! ## Features
//!
//! - `redis` - Redis counter store for the distributed breaker
//! - `reqwest` - `reqwest` based transports
//! - `async` - `Dispatcher::execute_async` over an `AsyncTransport`
//! - `prometheus` - Prometheus metric sink

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

mod breaker;
mod classify;
mod config;
mod dispatch;
mod distributed;
mod error;
mod hook;
mod metrics;
mod policy;
pub mod prelude;
mod request;
mod state;
mod store;
mod transport;
mod watcher;

// Re-exports
pub use breaker::{BreakerSnapshot, LocalBreaker};
pub use classify::{classify, FailureStatuses, Outcome, DEFAULT_FAILURE_STATUSES};
pub use config::{BreakerBuilder, DistributedBuilder, HalfOpenMode};
pub use dispatch::{Dispatcher, DispatcherBuilder};
pub use distributed::DistributedBreaker;
pub use error::{AdmitError, BuildError, ConfigError, DispatchError, DispatchResult, StoreError};
pub use hook::HookRegistry;
pub use metrics::{CallReport, GuardKind, MetricSink, NullMetricSink};
pub use policy::TripPolicy;
pub use request::{Method, Request, RequestBuilder};
pub use state::{State, Transition};
pub use store::{CounterStore, InMemoryStore};
pub use transport::{Response, Transport, TransportError};

#[cfg(feature = "prometheus")]
pub use metrics::PrometheusSink;
#[cfg(feature = "redis")]
pub use store::RedisStore;
#[cfg(feature = "async")]
pub use transport::AsyncTransport;
#[cfg(all(feature = "reqwest", feature = "async"))]
pub use transport::AsyncReqwestTransport;
#[cfg(feature = "reqwest")]
pub use transport::ReqwestTransport;

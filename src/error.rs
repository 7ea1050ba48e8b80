//! Error types for breakers, counter stores and the dispatcher.

use std::error::Error as StdError;
use std::io;

use thiserror::Error;

use crate::transport::TransportError;

/// Result type for dispatched calls.
pub type DispatchResult<T> = Result<T, DispatchError>;

/// Error returned by [`Dispatcher::execute`](crate::Dispatcher::execute).
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The request could not be assembled. No breaker was consulted.
    #[error("failed to build request: {0}")]
    Build(#[from] BuildError),

    /// The active breaker refused admission. No network call was made.
    #[error("request refused, the circuit is open")]
    CircuitOpen,

    /// The transport failed before a response was received.
    #[error("transport failure: {0}")]
    Transport(#[from] TransportError),

    /// The distributed breaker could not reach its counter store.
    #[error("circuit breaker store unavailable: {0}")]
    Store(#[from] StoreError),
}

impl DispatchError {
    /// Whether the call was refused by a breaker without being attempted.
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, DispatchError::CircuitOpen)
    }
}

/// Problems collected while assembling a request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    /// The URL could not be parsed.
    #[error("invalid url {url:?}: {reason}")]
    InvalidUrl {
        /// The rejected input.
        url: String,
        /// Parser message.
        reason: String,
    },

    /// A header was given an empty name.
    #[error("header name cannot be empty")]
    EmptyHeaderName,

    /// The breaker key was set to an empty string.
    #[error("circuit breaker key cannot be empty")]
    EmptyBreakerKey,

    /// A distributed breaker guards the call but the request has no key.
    #[error("a circuit breaker key is required by the distributed breaker")]
    MissingBreakerKey,
}

/// Error talking to the shared counter store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend rejected the command or the connection failed.
    #[error("counter store backend error: {0}")]
    Backend(#[source] Box<dyn StdError + Send + Sync + 'static>),

    /// The blocking store call could not be completed on the worker pool.
    #[error("counter store task failed: {0}")]
    Task(String),
}

impl StoreError {
    /// Wraps any backend error.
    pub fn backend<E>(err: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        StoreError::Backend(Box::new(err))
    }
}

#[cfg(feature = "redis")]
impl From<redis::RedisError> for StoreError {
    fn from(err: redis::RedisError) -> Self {
        StoreError::backend(err)
    }
}

/// Admission decision failures of the distributed breaker.
#[derive(Debug, Error)]
pub enum AdmitError {
    /// The failure counter reached the configured limit.
    #[error("request refused, the circuit for {key:?} is open ({failures} failures)")]
    Refused {
        /// Counter key that was checked.
        key: String,
        /// Counter value observed.
        failures: u64,
    },

    /// The counter could not be read.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Invalid breaker configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// `failure_threshold` must be at least 1.
    #[error("failure threshold must be at least 1")]
    ZeroFailureThreshold,

    /// `half_open_probe_quota` must be at least 1.
    #[error("half-open probe quota must be at least 1")]
    ZeroProbeQuota,

    /// `failure_limit` must be at least 1.
    #[error("failure limit must be at least 1")]
    ZeroFailureLimit,

    /// The half-open watcher thread could not be started.
    #[error("failed to start half-open watcher: {0}")]
    Watcher(#[source] io::Error),
}

//! The network collaborator the dispatcher sends requests through.

use std::time::Duration;

use thiserror::Error;

use crate::request::Request;

/// A received HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    status: u16,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

impl Response {
    /// Creates a response.
    pub fn new(status: u16, headers: Vec<(String, String)>, body: Vec<u8>) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    /// A bodiless response with only a status.
    pub fn with_status(status: u16) -> Self {
        Self::new(status, Vec::new(), Vec::new())
    }

    /// The HTTP status code.
    pub fn status(&self) -> u16 {
        self.status
    }

    /// Response headers.
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// First header value matching `name`, case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Response body bytes.
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Consumes the response, returning the body.
    pub fn into_body(self) -> Vec<u8> {
        self.body
    }
}

/// Failure below the HTTP layer. Always counted against the breaker.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The connection could not be established or was reset.
    #[error("connection failed: {0}")]
    Connection(String),

    /// The transport gave up waiting.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// Anything else: TLS, malformed response, body read failures.
    #[error("protocol error: {0}")]
    Protocol(String),
}

/// Sends a request and returns the response or a transport-level error.
///
/// Implementations own timeouts and cancellation.
pub trait Transport: Send + Sync {
    /// Performs one network call.
    fn send(&self, request: &Request) -> Result<Response, TransportError>;
}

impl<T: Transport + ?Sized> Transport for &T {
    fn send(&self, request: &Request) -> Result<Response, TransportError> {
        (**self).send(request)
    }
}

impl<T: Transport + ?Sized> Transport for std::sync::Arc<T> {
    fn send(&self, request: &Request) -> Result<Response, TransportError> {
        (**self).send(request)
    }
}

#[cfg(feature = "async")]
pub use self::async_transport::AsyncTransport;

#[cfg(feature = "async")]
mod async_transport {
    use futures::future::BoxFuture;

    use super::{Response, TransportError};
    use crate::request::Request;

    /// Async counterpart of [`Transport`](super::Transport).
    pub trait AsyncTransport: Send + Sync {
        /// Performs one network call.
        fn send<'a>(&'a self, request: &'a Request)
            -> BoxFuture<'a, Result<Response, TransportError>>;
    }
}

#[cfg(feature = "reqwest")]
pub use self::reqwest_transport::ReqwestTransport;

#[cfg(all(feature = "reqwest", feature = "async"))]
pub use self::reqwest_transport::AsyncReqwestTransport;

#[cfg(feature = "reqwest")]
mod reqwest_transport {
    use std::time::Duration;

    use super::{Response, Transport, TransportError};
    use crate::request::{Method, Request};

    fn method(method: Method) -> reqwest::Method {
        match method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Patch => reqwest::Method::PATCH,
            Method::Delete => reqwest::Method::DELETE,
        }
    }

    fn map_error(err: reqwest::Error, timeout: Duration) -> TransportError {
        if err.is_timeout() {
            TransportError::Timeout(timeout)
        } else if err.is_connect() {
            TransportError::Connection(err.to_string())
        } else {
            TransportError::Protocol(err.to_string())
        }
    }

    fn response_headers(headers: &reqwest::header::HeaderMap) -> Vec<(String, String)> {
        headers
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|value| (name.as_str().to_string(), value.to_string()))
            })
            .collect()
    }

    fn target(request: &Request) -> Result<reqwest::Url, TransportError> {
        request
            .url()
            .cloned()
            .ok_or_else(|| TransportError::Protocol("request has no valid url".to_string()))
    }

    /// Blocking transport backed by `reqwest::blocking::Client`.
    #[derive(Debug, Clone)]
    pub struct ReqwestTransport {
        client: reqwest::blocking::Client,
        timeout: Duration,
    }

    impl ReqwestTransport {
        /// Builds a client with the given per-request timeout.
        pub fn new(timeout: Duration) -> Result<Self, TransportError> {
            let client = reqwest::blocking::Client::builder()
                .timeout(timeout)
                .build()
                .map_err(|err| TransportError::Protocol(err.to_string()))?;
            Ok(Self { client, timeout })
        }

        /// Wraps an existing client. `timeout` is only used for error reporting.
        pub fn with_client(client: reqwest::blocking::Client, timeout: Duration) -> Self {
            Self { client, timeout }
        }
    }

    impl Transport for ReqwestTransport {
        fn send(&self, request: &Request) -> Result<Response, TransportError> {
            let mut builder = self
                .client
                .request(method(request.method()), target(request)?);
            for (name, value) in request.headers() {
                builder = builder.header(name.as_str(), value.as_str());
            }
            if !request.body().is_empty() {
                builder = builder.body(request.body().to_vec());
            }

            let response = builder
                .send()
                .map_err(|err| map_error(err, self.timeout))?;
            let status = response.status().as_u16();
            let headers = response_headers(response.headers());
            let body = response
                .bytes()
                .map_err(|err| map_error(err, self.timeout))?;

            Ok(Response::new(status, headers, body.to_vec()))
        }
    }

    /// Async transport backed by `reqwest::Client`.
    #[cfg(feature = "async")]
    #[derive(Debug, Clone)]
    pub struct AsyncReqwestTransport {
        client: reqwest::Client,
        timeout: Duration,
    }

    #[cfg(feature = "async")]
    impl AsyncReqwestTransport {
        /// Builds a client with the given per-request timeout.
        pub fn new(timeout: Duration) -> Result<Self, TransportError> {
            let client = reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .map_err(|err| TransportError::Protocol(err.to_string()))?;
            Ok(Self { client, timeout })
        }
    }

    #[cfg(feature = "async")]
    impl super::AsyncTransport for AsyncReqwestTransport {
        fn send<'a>(
            &'a self,
            request: &'a Request,
        ) -> futures::future::BoxFuture<'a, Result<Response, TransportError>> {
            Box::pin(async move {
                let mut builder = self
                    .client
                    .request(method(request.method()), target(request)?);
                for (name, value) in request.headers() {
                    builder = builder.header(name.as_str(), value.as_str());
                }
                if !request.body().is_empty() {
                    builder = builder.body(request.body().to_vec());
                }

                let response = builder
                    .send()
                    .await
                    .map_err(|err| map_error(err, self.timeout))?;
                let status = response.status().as_u16();
                let headers = response_headers(response.headers());
                let body = response
                    .bytes()
                    .await
                    .map_err(|err| map_error(err, self.timeout))?;

                Ok(Response::new(status, headers, body.to_vec()))
            })
        }
    }
}

//! Finished request descriptors handed to the dispatcher.

use std::fmt;

use url::Url;

use crate::classify::FailureStatuses;
use crate::error::BuildError;

/// HTTP methods supported by the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// `GET`
    Get,
    /// `POST`
    Post,
    /// `PUT`
    Put,
    /// `PATCH`
    Patch,
    /// `DELETE`
    Delete,
}

impl Method {
    /// Uppercase wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A ready-to-send request plus any errors collected while building it.
///
/// Errors do not abort building; they are kept so the dispatcher can surface
/// the first one before touching any breaker.
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    url: Option<Url>,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
    breaker_key: Option<String>,
    failure_statuses: Option<FailureStatuses>,
    errors: Vec<BuildError>,
}

impl Request {
    /// Starts building a request.
    pub fn builder(method: Method, url: &str) -> RequestBuilder {
        RequestBuilder::new(method, url)
    }

    /// Shorthand for a `GET` builder.
    pub fn get(url: &str) -> RequestBuilder {
        RequestBuilder::new(Method::Get, url)
    }

    /// Shorthand for a `POST` builder.
    pub fn post(url: &str) -> RequestBuilder {
        RequestBuilder::new(Method::Post, url)
    }

    /// The request method.
    pub fn method(&self) -> Method {
        self.method
    }

    /// The target URL, absent only when it failed to parse.
    pub fn url(&self) -> Option<&Url> {
        self.url.as_ref()
    }

    /// Headers in insertion order.
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// Raw body bytes.
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Counter key for the distributed breaker.
    pub fn breaker_key(&self) -> Option<&str> {
        self.breaker_key.as_deref()
    }

    /// Per-request failure status override.
    pub fn failure_statuses(&self) -> Option<&FailureStatuses> {
        self.failure_statuses.as_ref()
    }

    /// The first build-time error, if any.
    pub fn build_error(&self) -> Option<&BuildError> {
        self.errors.first()
    }

    /// Every build-time error in the order they were collected.
    pub fn build_errors(&self) -> &[BuildError] {
        &self.errors
    }
}

/// Builder for [`Request`].
#[derive(Debug, Clone)]
pub struct RequestBuilder {
    request: Request,
}

impl RequestBuilder {
    /// Creates a builder; an unparsable URL is recorded, not returned.
    pub fn new(method: Method, url: &str) -> Self {
        let mut errors = Vec::new();
        let parsed = match Url::parse(url) {
            Ok(parsed) => Some(parsed),
            Err(err) => {
                errors.push(BuildError::InvalidUrl {
                    url: url.to_string(),
                    reason: err.to_string(),
                });
                None
            }
        };

        Self {
            request: Request {
                method,
                url: parsed,
                headers: Vec::new(),
                body: Vec::new(),
                breaker_key: None,
                failure_statuses: None,
                errors,
            },
        }
    }

    /// Appends a header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        if name.trim().is_empty() {
            self.request.errors.push(BuildError::EmptyHeaderName);
            return self;
        }
        self.request.headers.push((name, value.into()));
        self
    }

    /// Appends a query parameter.
    pub fn query(mut self, key: &str, value: &str) -> Self {
        if let Some(url) = self.request.url.as_mut() {
            url.query_pairs_mut().append_pair(key, value);
        }
        self
    }

    /// Sets the body.
    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.request.body = body.into();
        self
    }

    /// Sets the distributed breaker counter key for this call.
    pub fn breaker_key(mut self, key: impl Into<String>) -> Self {
        let key = key.into();
        if key.is_empty() {
            self.request.errors.push(BuildError::EmptyBreakerKey);
            return self;
        }
        self.request.breaker_key = Some(key);
        self
    }

    /// Replaces the failure status set for this call. An empty list keeps
    /// whatever set the dispatcher uses.
    pub fn failure_statuses<I>(mut self, codes: I) -> Self
    where
        I: IntoIterator<Item = u16>,
    {
        let codes: Vec<u16> = codes.into_iter().collect();
        if !codes.is_empty() {
            self.request.failure_statuses = Some(FailureStatuses::from_codes(codes));
        }
        self
    }

    /// Finishes the request. Collected errors travel with it.
    pub fn build(self) -> Request {
        self.request
    }
}

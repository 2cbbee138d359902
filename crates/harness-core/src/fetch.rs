//! Request normalisation against the target origin.
//!
//! Test code addresses the target with bare paths, absolute URLs, or a
//! structured request. Everything is resolved against the origin recorded at
//! start and rejected when it points at a different host, so a misconfigured
//! test fails loudly instead of probing the wrong service.

use std::time::Duration;

use url::Url;

use crate::error::{HarnessError, TransportError};

/// A request whose URL may still be relative to the origin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    method: String,
    url: String,
    headers: Vec<(String, String)>,
    body: Option<Vec<u8>>,
    timeout: Option<Duration>,
}

impl FetchRequest {
    /// Creates a request with the given method and URL or path.
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
            headers: Vec::new(),
            body: None,
            timeout: None,
        }
    }

    /// Creates a `GET` request.
    pub fn get(url: impl Into<String>) -> Self {
        Self::new("GET", url)
    }

    /// Adds a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Sets the request body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Bounds the whole request, from connect to the end of the response
    /// headers. Without it the request waits as long as the target does.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// HTTP method.
    pub fn method(&self) -> &str {
        &self.method
    }

    /// URL or path as supplied.
    pub fn url(&self) -> &str {
        &self.url
    }
}

/// Anything `fetch` accepts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchInput {
    /// A path or URL string, resolved against the origin.
    Path(String),
    /// An absolute URL.
    Url(Url),
    /// A structured request.
    Request(FetchRequest),
}

impl From<&str> for FetchInput {
    fn from(value: &str) -> Self {
        Self::Path(value.to_owned())
    }
}

impl From<String> for FetchInput {
    fn from(value: String) -> Self {
        Self::Path(value)
    }
}

impl From<Url> for FetchInput {
    fn from(value: Url) -> Self {
        Self::Url(value)
    }
}

impl From<FetchRequest> for FetchInput {
    fn from(value: FetchRequest) -> Self {
        Self::Request(value)
    }
}

/// A request with an absolute URL on the target's host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRequest {
    /// HTTP method.
    pub method: String,
    /// Absolute URL.
    pub url: Url,
    /// Header pairs in insertion order.
    pub headers: Vec<(String, String)>,
    /// Optional body.
    pub body: Option<Vec<u8>>,
    /// Caller-supplied bound on the request.
    pub timeout: Option<Duration>,
}

/// Resolves `input` against `origin`, rejecting other hosts.
///
/// # Errors
///
/// Returns [`HarnessError::InvalidRequestUrl`] when the input cannot be
/// joined onto the origin and [`HarnessError::CrossOrigin`] when it resolves
/// to a different host or port.
pub fn resolve_request(origin: &Url, input: FetchInput) -> Result<ResolvedRequest, HarnessError> {
    let request = match input {
        FetchInput::Path(path) => FetchRequest::get(path),
        FetchInput::Url(url) => FetchRequest::get(String::from(url)),
        FetchInput::Request(request) => request,
    };
    let url = origin
        .join(&request.url)
        .map_err(|source| HarnessError::InvalidRequestUrl {
            input: request.url.clone(),
            source,
        })?;
    if !same_host(origin, &url) {
        return Err(HarnessError::CrossOrigin {
            expected: origin.origin().ascii_serialization(),
            actual: url.origin().ascii_serialization(),
        });
    }
    Ok(ResolvedRequest {
        method: request.method,
        url,
        headers: request.headers,
        body: request.body,
        timeout: request.timeout,
    })
}

fn same_host(origin: &Url, candidate: &Url) -> bool {
    origin.host_str() == candidate.host_str()
        && origin.port_or_known_default() == candidate.port_or_known_default()
}

/// Performs HTTP requests on behalf of the controller.
///
/// Implementations must pass the response through unmodified: no retries and
/// no timeout other than [`ResolvedRequest::timeout`].
pub trait HttpClient {
    /// Response type handed back to the caller.
    type Response;

    /// Sends one request.
    ///
    /// # Errors
    ///
    /// Returns the client's own failure, boxed.
    fn send(&self, request: ResolvedRequest) -> Result<Self::Response, TransportError>;
}

/// Response type returned by [`ReqwestClient`].
pub type ReqwestResponse = reqwest::blocking::Response;

/// [`HttpClient`] over `reqwest`'s blocking client.
#[derive(Debug, Clone)]
pub struct ReqwestClient {
    client: reqwest::blocking::Client,
}

impl ReqwestClient {
    /// Builds a client that speaks plain HTTP and HTTPS and never times a
    /// request out on its own.
    ///
    /// # Errors
    ///
    /// Returns the builder's failure, boxed.
    pub fn new() -> Result<Self, TransportError> {
        let client = client_builder().build()?;
        Ok(Self { client })
    }

    /// Wraps a preconfigured client, e.g. one with a custom timeout.
    pub const fn with_client(client: reqwest::blocking::Client) -> Self {
        Self { client }
    }
}

impl HttpClient for ReqwestClient {
    type Response = ReqwestResponse;

    fn send(&self, request: ResolvedRequest) -> Result<Self::Response, TransportError> {
        let method = reqwest::Method::from_bytes(request.method.as_bytes())?;
        let mut builder = self.client.request(method, request.url);
        for (name, value) in request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }
        Ok(builder.send()?)
    }
}

// The blocking client otherwise applies a 30 second total timeout.
fn client_builder() -> reqwest::blocking::ClientBuilder {
    reqwest::blocking::Client::builder().timeout(None::<Duration>)
}

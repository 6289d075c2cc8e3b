//! HTTP client for the origin, built on `reqwest`.
//!
//! [`Transport`] is the seam the console and the cache layer are written
//! against; [`HttpClient`] is the network implementation. Framing (lengths,
//! chunked bodies, close-delimited bodies, HEAD) is left to reqwest; this
//! module only converts between its types and the crate's [`Request`] and
//! [`Response`].

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tracing::debug;

use crate::{Request, Response, StatusCode};

/// Failures that stop an exchange from producing a response.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("could not set up the HTTP client: {0}")]
    Build(#[source] reqwest::Error),

    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("no response from {url} within {timeout:?}")]
    Timeout { url: String, timeout: Duration },

    #[error("{url} answered with unsupported status {status}")]
    UnknownStatus { url: String, status: u16 },

    #[error("method {0} cannot be sent")]
    InvalidMethod(String),
}

/// Sends one request and waits for its complete response.
pub trait Transport: Send + Sync {
    fn send(&self, request: Request) -> impl Future<Output = Result<Response, ClientError>> + Send;
}

impl<T: Transport> Transport for &T {
    fn send(&self, request: Request) -> impl Future<Output = Result<Response, ClientError>> + Send {
        (**self).send(request)
    }
}

impl<T: Transport> Transport for std::sync::Arc<T> {
    fn send(&self, request: Request) -> impl Future<Output = Result<Response, ClientError>> + Send {
        (**self).send(request)
    }
}

// `host:port` becomes `http://host:port`; a full base URL is kept as given.
fn base_url(origin: &str) -> String {
    let origin = origin.trim_end_matches('/');
    if origin.contains("://") {
        origin.to_owned()
    } else {
        format!("http://{origin}")
    }
}

/// Plain, uncached client for a single origin.
///
/// Redirects are not followed: the console reports what the origin said.
/// Cloning is cheap and shares the connection pool.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: reqwest::Client,
    base: String,
    timeout: Duration,
}

impl HttpClient {
    /// A client for `origin`, either `host:port` or a base URL.
    /// `timeout` bounds each exchange from connect to the last body byte.
    pub fn new(origin: impl AsRef<str>, timeout: Duration) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .user_agent(concat!("cachelens/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(ClientError::Build)?;
        Ok(Self {
            client,
            base: base_url(origin.as_ref()),
            timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base
    }

    fn failure(&self, url: &str, source: reqwest::Error) -> ClientError {
        if source.is_timeout() {
            ClientError::Timeout {
                url: url.to_owned(),
                timeout: self.timeout,
            }
        } else {
            ClientError::Request {
                url: url.to_owned(),
                source,
            }
        }
    }
}

impl Transport for HttpClient {
    async fn send(&self, request: Request) -> Result<Response, ClientError> {
        let url = format!("{}{}", self.base, request.target());
        let method = reqwest::Method::from_bytes(request.method().as_str().as_bytes())
            .map_err(|_| ClientError::InvalidMethod(request.method().to_string()))?;

        let mut outgoing = self.client.request(method, &url);
        for (name, value) in request.headers().iter() {
            outgoing = outgoing.header(name, value);
        }
        if !request.body_ref().is_empty() {
            outgoing = outgoing.body(request.body_ref().clone());
        }

        let reply = outgoing
            .send()
            .await
            .map_err(|e| self.failure(&url, e))?;

        let code = reply.status().as_u16();
        let status = StatusCode::from_u16(code).ok_or_else(|| ClientError::UnknownStatus {
            url: url.clone(),
            status: code,
        })?;

        let mut response = Response::new(status);
        for (name, value) in reply.headers() {
            match value.to_str() {
                Ok(value) => response.add_header(name.as_str(), value),
                Err(_) => debug!(header = %name, "skipping non-text header value"),
            }
        }
        let body = reply.bytes().await.map_err(|e| self.failure(&url, e))?;

        debug!(
            method = %request.method(),
            %url,
            status = code,
            bytes = body.len(),
            "exchange complete"
        );
        Ok(response.body_bytes(body))
    }
}

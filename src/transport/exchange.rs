//! Single HTTP exchange
//!
//! `HttpExchange` is the seam between the retry loop and the network: one
//! POST, one response or one fault. The reqwest implementation owns the
//! shared connection pool; clones share it.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use std::time::Duration;
use thiserror::Error;

use super::{HttpOptions, HttpVersion, TimeoutOptions};
use crate::protocol::DriverError;

/// Outgoing request, fully prepared.
#[derive(Debug, Clone)]
pub struct WireRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
    pub timeout: Duration,
}

/// Received response, whatever its status code.
#[derive(Debug, Clone, PartialEq)]
pub struct WireResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl WireResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }
}

/// Failure before a response was received.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportFault {
    #[error("connection failed: {0}")]
    Connect(String),

    #[error("request timed out: {0}")]
    Timeout(String),

    /// Reset or broken stream mid-exchange
    #[error("I/O failure: {0}")]
    Io(String),

    /// Not worth retrying: invalid header, redirect loop, builder error
    #[error("request could not be sent: {0}")]
    Fatal(String),
}

impl TransportFault {
    pub fn is_retryable(&self) -> bool {
        !matches!(self, TransportFault::Fatal(_))
    }
}

#[async_trait]
pub trait HttpExchange: Send + Sync {
    async fn exchange(&self, request: &WireRequest) -> Result<WireResponse, TransportFault>;
}

/// reqwest-backed exchange.
#[derive(Clone)]
pub struct ReqwestExchange {
    client: reqwest::Client,
}

impl ReqwestExchange {
    pub fn new(http: &HttpOptions, timeouts: &TimeoutOptions) -> Result<Self, DriverError> {
        let redirect = match http.max_redirects {
            0 => reqwest::redirect::Policy::none(),
            n => reqwest::redirect::Policy::limited(n),
        };

        let mut builder = reqwest::Client::builder()
            .connect_timeout(timeouts.connect)
            .redirect(redirect)
            .pool_idle_timeout(Duration::from_secs(30))
            .pool_max_idle_per_host(16);

        if let Some(read) = timeouts.socket {
            builder = builder.read_timeout(read);
        }

        builder = match http.version {
            HttpVersion::Http1 => builder.http1_only(),
            HttpVersion::Http2 => builder.http2_prior_knowledge(),
            HttpVersion::Auto => builder,
        };

        if let Some(proxy) = &http.proxy {
            let proxy = reqwest::Proxy::all(proxy)
                .map_err(|e| DriverError::Config(format!("Invalid proxy '{}': {}", proxy, e)))?;
            builder = builder.proxy(proxy);
        }

        let client = builder
            .build()
            .map_err(|e| DriverError::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    pub fn from_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

fn header_map(headers: &[(String, String)]) -> Result<HeaderMap, TransportFault> {
    let mut map = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| TransportFault::Fatal(format!("invalid header name '{}': {}", name, e)))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| TransportFault::Fatal(format!("invalid value for header '{}': {}", name, e)))?;
        map.append(name, value);
    }
    Ok(map)
}

fn classify(err: reqwest::Error) -> TransportFault {
    let msg = err.to_string();
    if err.is_timeout() {
        TransportFault::Timeout(msg)
    } else if err.is_connect() {
        TransportFault::Connect(msg)
    } else if err.is_builder() || err.is_redirect() {
        TransportFault::Fatal(msg)
    } else {
        TransportFault::Io(msg)
    }
}

#[async_trait]
impl HttpExchange for ReqwestExchange {
    async fn exchange(&self, request: &WireRequest) -> Result<WireResponse, TransportFault> {
        let response = self
            .client
            .post(&request.url)
            .headers(header_map(&request.headers)?)
            .timeout(request.timeout)
            .body(request.body.clone())
            .send()
            .await
            .map_err(classify)?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.to_string(), v.to_string())))
            .collect();
        let body = response.text().await.map_err(classify)?;

        Ok(WireResponse {
            status,
            headers,
            body,
        })
    }
}

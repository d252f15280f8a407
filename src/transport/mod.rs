//! HTTP transport
//!
//! Connection settings fixed at construction, a retry loop reserved for
//! transport faults, and classification of non-2xx responses.

pub mod exchange;
pub mod retry;

pub use exchange::{HttpExchange, ReqwestExchange, TransportFault, WireRequest, WireResponse};
pub use retry::{Backoff, Exchanged, RetryPolicy, RetryingTransport};

use std::time::Duration;
use tracing::warn;

use crate::protocol::{DriverError, TimeoutCategory};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HttpVersion {
    /// Negotiated by the HTTP stack
    #[default]
    Auto,
    Http1,
    /// HTTP/2 with prior knowledge
    Http2,
}

/// Connection-level HTTP configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpOptions {
    pub version: HttpVersion,
    /// 0 disables redirects; 3xx responses are then surfaced as failures
    pub max_redirects: usize,
    /// Forward proxy URL
    pub proxy: Option<String>,
    pub retry: RetryPolicy,
}

impl Default for HttpOptions {
    fn default() -> Self {
        Self {
            version: HttpVersion::Auto,
            max_redirects: 10,
            proxy: None,
            retry: RetryPolicy::default(),
        }
    }
}

/// Timeout categories, each independently configurable.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeoutOptions {
    pub connect: Duration,
    pub general: Duration,
    pub collection_admin: Duration,
    pub table_admin: Duration,
    pub database_admin: Duration,
    /// Per-read socket timeout; unset leaves it to the request timeout
    pub socket: Option<Duration>,
}

impl Default for TimeoutOptions {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(10),
            general: Duration::from_secs(10),
            collection_admin: Duration::from_secs(60),
            table_admin: Duration::from_secs(30),
            database_admin: Duration::from_secs(600),
            socket: None,
        }
    }
}

impl TimeoutOptions {
    pub fn for_category(&self, category: TimeoutCategory) -> Duration {
        match category {
            TimeoutCategory::General => self.general,
            TimeoutCategory::CollectionAdmin => self.collection_admin,
            TimeoutCategory::TableAdmin => self.table_admin,
            TimeoutCategory::DatabaseAdmin => self.database_admin,
        }
    }
}

/// Map a received response to success or a classified failure.
pub fn classify_status(url: &str, response: &WireResponse) -> Result<(), DriverError> {
    let status = response.status;
    if status < 300 {
        return Ok(());
    }
    warn!(
        "POST {} returned HTTP {}: {}",
        url,
        status,
        response.body.chars().take(500).collect::<String>()
    );
    let body = response.body.clone();
    Err(match status {
        401 => DriverError::Authentication { body },
        422 => DriverError::MalformedRequest { body },
        503 => DriverError::ServiceUnavailable { body },
        _ => DriverError::Http { status, body },
    })
}

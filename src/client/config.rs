//! Client configuration
//!
//! `ClientOptions` is the finished, immutable configuration the client is
//! built from. `ClientConfig` is its file form, read from TOML with
//! environment overrides.
//!
//! ## Environment Variables
//!
//! - `DATA_API_ENDPOINT` - Service base URL
//! - `DATA_API_TOKEN` - Bearer token
//! - `DATA_API_KEYSPACE` - Default keyspace
//!
//! These can be set in a `.env` file next to the configuration file.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::observer::DEFAULT_MAX_IN_FLIGHT;
use crate::protocol::{
    CodecRegistry, DateEncoding, DriverError, DriverResult, EmbeddingAuth, VectorEncoding,
};
use crate::transport::{HttpOptions, HttpVersion, RetryPolicy, TimeoutOptions};

pub const ENV_ENDPOINT: &str = "DATA_API_ENDPOINT";
pub const ENV_TOKEN: &str = "DATA_API_TOKEN";
pub const ENV_KEYSPACE: &str = "DATA_API_KEYSPACE";

pub const DEFAULT_API_PATH: &str = "api/json/v1";

/// Name of this driver as it appears first in `User-Agent`.
pub const DRIVER_NAME: &str = "dataapi-client";

/// Produces the bearer token for each request.
pub trait TokenProvider: Send + Sync {
    fn token(&self) -> Option<String>;
}

/// A fixed token.
#[derive(Clone)]
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

impl fmt::Debug for StaticToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("StaticToken(***)")
    }
}

impl TokenProvider for StaticToken {
    fn token(&self) -> Option<String> {
        Some(self.0.clone())
    }
}

impl<F> TokenProvider for F
where
    F: Fn() -> Option<String> + Send + Sync,
{
    fn token(&self) -> Option<String> {
        self()
    }
}

/// One `User-Agent` component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caller {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl Caller {
    pub fn new(name: impl Into<String>, version: Option<&str>) -> Self {
        Self {
            name: name.into(),
            version: version.map(str::to_string),
        }
    }
}

impl fmt::Display for Caller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.version {
            Some(v) => write!(f, "{}/{}", self.name, v),
            None => f.write_str(&self.name),
        }
    }
}

/// `User-Agent` value: the driver first, then callers in registration
/// order, so the most specific caller comes last.
pub fn user_agent(callers: &[Caller]) -> String {
    let mut agent = format!("{}/{}", DRIVER_NAME, env!("CARGO_PKG_VERSION"));
    for caller in callers {
        agent.push(' ');
        agent.push_str(&caller.to_string());
    }
    agent
}

/// Finished client configuration.
#[derive(Clone)]
pub struct ClientOptions {
    /// Base URL, e.g. `https://db.example.com`
    pub endpoint: String,
    pub api_path: String,
    pub keyspace: Option<String>,
    pub token: Option<Arc<dyn TokenProvider>>,
    pub callers: Vec<Caller>,
    pub timeouts: TimeoutOptions,
    pub http: HttpOptions,
    pub embedding_auth: Option<EmbeddingAuth>,
    pub reranking_api_key: Option<String>,
    /// Sent on every request
    pub headers: Vec<(String, String)>,
    pub registry: Arc<CodecRegistry>,
    /// Observer notifications allowed in flight before new ones are dropped
    pub observer_capacity: usize,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            api_path: DEFAULT_API_PATH.to_string(),
            keyspace: None,
            token: None,
            callers: Vec::new(),
            timeouts: TimeoutOptions::default(),
            http: HttpOptions::default(),
            embedding_auth: None,
            reranking_api_key: None,
            headers: Vec::new(),
            registry: CodecRegistry::global(),
            observer_capacity: DEFAULT_MAX_IN_FLIGHT,
        }
    }
}

impl fmt::Debug for ClientOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientOptions")
            .field("endpoint", &self.endpoint)
            .field("api_path", &self.api_path)
            .field("keyspace", &self.keyspace)
            .field("token", &self.token.as_ref().map(|_| "***"))
            .field("callers", &self.callers)
            .field("timeouts", &self.timeouts)
            .field("http", &self.http)
            .field("headers", &self.headers.len())
            .field("observer_capacity", &self.observer_capacity)
            .finish()
    }
}

impl ClientOptions {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> DriverResult<()> {
        if !(self.endpoint.starts_with("http://") || self.endpoint.starts_with("https://")) {
            return Err(DriverError::Config(format!(
                "Endpoint must be an http(s) URL, got '{}'",
                self.endpoint
            )));
        }
        Ok(())
    }

    /// `<endpoint>/<api_path>`, without trailing slash.
    pub fn base_url(&self) -> String {
        let endpoint = self.endpoint.trim_end_matches('/');
        let path = self.api_path.trim_matches('/');
        if path.is_empty() {
            endpoint.to_string()
        } else {
            format!("{}/{}", endpoint, path)
        }
    }

    pub fn user_agent(&self) -> String {
        user_agent(&self.callers)
    }
}

/// File form of the configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default)]
    pub endpoint: String,
    #[serde(default)]
    pub token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keyspace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_path: Option<String>,
    #[serde(default)]
    pub callers: Vec<Caller>,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub codec: CodecConfig,
}

/// Timeouts in milliseconds; unset keeps the default.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimeoutConfig {
    pub connect_ms: Option<u64>,
    pub general_ms: Option<u64>,
    pub collection_admin_ms: Option<u64>,
    pub table_admin_ms: Option<u64>,
    pub database_admin_ms: Option<u64>,
    pub socket_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HttpConfig {
    /// `auto`, `http1` or `http2`
    pub version: Option<String>,
    pub max_redirects: Option<usize>,
    pub proxy: Option<String>,
    pub max_attempts: Option<u32>,
    pub initial_delay_ms: Option<u64>,
    pub multiplier: Option<f64>,
    pub max_delay_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CodecConfig {
    /// `array` or `binary`
    pub vector_encoding: Option<String>,
    /// `iso8601` or `epoch_millis`
    pub date_encoding: Option<String>,
}

impl ClientConfig {
    /// Read a TOML file, loading a `.env` beside it first, then apply
    /// environment overrides.
    pub fn load(path: &Path) -> DriverResult<Self> {
        if let Some(dir) = path.parent() {
            let env_path = dir.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
            }
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            DriverError::Config(format!("Cannot read {}: {}", path.display(), e))
        })?;
        let mut config = Self::from_toml(&content)?;
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn from_toml(content: &str) -> DriverResult<Self> {
        toml::from_str(content)
            .map_err(|e| DriverError::Config(format!("Invalid configuration: {}", e)))
    }

    /// Configuration from the environment (and `.env`) alone.
    pub fn from_env() -> DriverResult<Self> {
        let _ = dotenvy::dotenv();
        let mut config = Self::default();
        config.apply_env_overrides();
        if config.endpoint.is_empty() {
            return Err(DriverError::Config(format!("{} is not set", ENV_ENDPOINT)));
        }
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(endpoint) = std::env::var(ENV_ENDPOINT) {
            if !endpoint.is_empty() {
                self.endpoint = endpoint;
            }
        }

        if let Ok(token) = std::env::var(ENV_TOKEN) {
            if !token.is_empty() {
                self.token = token;
            }
        }

        if let Ok(keyspace) = std::env::var(ENV_KEYSPACE) {
            if !keyspace.is_empty() {
                self.keyspace = Some(keyspace);
            }
        }
    }

    pub fn to_toml(&self) -> DriverResult<String> {
        toml::to_string_pretty(self)
            .map_err(|e| DriverError::Config(format!("Cannot serialize configuration: {}", e)))
    }

    pub fn into_options(self) -> DriverResult<ClientOptions> {
        let mut options = ClientOptions::new(self.endpoint);
        if let Some(path) = self.api_path {
            options.api_path = path;
        }
        options.keyspace = self.keyspace;
        if !self.token.is_empty() {
            options.token = Some(Arc::new(StaticToken::new(self.token)));
        }
        options.callers = self.callers;

        let ms = Duration::from_millis;
        let t = &mut options.timeouts;
        let cfg = &self.timeouts;
        if let Some(v) = cfg.connect_ms {
            t.connect = ms(v);
        }
        if let Some(v) = cfg.general_ms {
            t.general = ms(v);
        }
        if let Some(v) = cfg.collection_admin_ms {
            t.collection_admin = ms(v);
        }
        if let Some(v) = cfg.table_admin_ms {
            t.table_admin = ms(v);
        }
        if let Some(v) = cfg.database_admin_ms {
            t.database_admin = ms(v);
        }
        t.socket = cfg.socket_ms.map(ms);

        let http = &self.http;
        options.http.version = match http.version.as_deref() {
            None | Some("auto") => HttpVersion::Auto,
            Some("http1") => HttpVersion::Http1,
            Some("http2") => HttpVersion::Http2,
            Some(other) => {
                return Err(DriverError::Config(format!("Unknown HTTP version '{}'", other)))
            }
        };
        if let Some(n) = http.max_redirects {
            options.http.max_redirects = n;
        }
        options.http.proxy = http.proxy.clone();
        let mut retry = RetryPolicy::default();
        if let Some(n) = http.max_attempts {
            retry = retry.with_max_attempts(n);
        }
        if let Some(v) = http.initial_delay_ms {
            retry = retry.with_initial_delay(ms(v));
        }
        if let Some(v) = http.multiplier {
            retry = retry.with_multiplier(v);
        }
        if let Some(v) = http.max_delay_ms {
            retry = retry.with_max_delay(ms(v));
        }
        options.http.retry = retry;

        let mut registry = (*CodecRegistry::global()).clone();
        match self.codec.vector_encoding.as_deref() {
            None => {}
            Some("array") => registry = registry.with_vector_encoding(VectorEncoding::Array),
            Some("binary") => registry = registry.with_vector_encoding(VectorEncoding::Binary),
            Some(other) => {
                return Err(DriverError::Config(format!(
                    "Unknown vector encoding '{}'",
                    other
                )))
            }
        }
        match self.codec.date_encoding.as_deref() {
            None => {}
            Some("iso8601") => registry = registry.with_date_encoding(DateEncoding::Iso8601),
            Some("epoch_millis") => {
                registry = registry.with_date_encoding(DateEncoding::EpochMillis)
            }
            Some(other) => {
                return Err(DriverError::Config(format!(
                    "Unknown date encoding '{}'",
                    other
                )))
            }
        }
        options.registry = Arc::new(registry);

        options.validate()?;
        Ok(options)
    }
}

use std::sync::Arc;
use std::time::Duration;

use super::config::{Caller, ClientOptions, StaticToken, TokenProvider};
use super::DataApiClient;
use crate::protocol::{CodecRegistry, DriverError, EmbeddingAuth};
use crate::transport::{HttpExchange, HttpVersion, RetryPolicy, TimeoutOptions};

/// Fluent construction of a `ClientOptions` and the client built from it.
pub struct DataApiClientBuilder {
    options: ClientOptions,
    exchange: Option<Arc<dyn HttpExchange>>,
}

impl DataApiClientBuilder {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            options: ClientOptions::new(endpoint),
            exchange: None,
        }
    }

    pub fn token(mut self, token: &str) -> Self {
        self.options.token = Some(Arc::new(StaticToken::new(token)));
        self
    }

    pub fn token_provider(mut self, provider: Arc<dyn TokenProvider>) -> Self {
        self.options.token = Some(provider);
        self
    }

    pub fn api_path(mut self, path: &str) -> Self {
        self.options.api_path = path.to_string();
        self
    }

    pub fn keyspace(mut self, keyspace: &str) -> Self {
        self.options.keyspace = Some(keyspace.to_string());
        self
    }

    /// Append a `User-Agent` component; later callers are more specific.
    pub fn caller(mut self, name: &str, version: Option<&str>) -> Self {
        self.options.callers.push(Caller::new(name, version));
        self
    }

    pub fn timeouts(mut self, timeouts: TimeoutOptions) -> Self {
        self.options.timeouts = timeouts;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.options.timeouts.connect = timeout;
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.options.timeouts.general = timeout;
        self
    }

    pub fn http_version(mut self, version: HttpVersion) -> Self {
        self.options.http.version = version;
        self
    }

    pub fn max_redirects(mut self, max: usize) -> Self {
        self.options.http.max_redirects = max;
        self
    }

    pub fn proxy(mut self, url: &str) -> Self {
        self.options.http.proxy = Some(url.to_string());
        self
    }

    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.options.http.retry = policy;
        self
    }

    pub fn embedding_api_key(mut self, key: &str) -> Self {
        self.options.embedding_auth = Some(EmbeddingAuth::ApiKey(key.to_string()));
        self
    }

    pub fn embedding_headers(mut self, headers: Vec<(String, String)>) -> Self {
        self.options.embedding_auth = Some(EmbeddingAuth::Headers(headers));
        self
    }

    pub fn reranking_api_key(mut self, key: &str) -> Self {
        self.options.reranking_api_key = Some(key.to_string());
        self
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.options.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn registry(mut self, registry: CodecRegistry) -> Self {
        self.options.registry = Arc::new(registry);
        self
    }

    pub fn observer_capacity(mut self, capacity: usize) -> Self {
        self.options.observer_capacity = capacity;
        self
    }

    /// Use this exchange instead of the reqwest one.
    pub fn exchange(mut self, exchange: Arc<dyn HttpExchange>) -> Self {
        self.exchange = Some(exchange);
        self
    }

    pub fn into_options(self) -> ClientOptions {
        self.options
    }

    pub fn build(self) -> Result<DataApiClient, DriverError> {
        match self.exchange {
            Some(exchange) => DataApiClient::with_exchange(self.options, exchange),
            None => DataApiClient::new(self.options),
        }
    }
}

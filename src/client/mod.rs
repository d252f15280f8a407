//! Data API client
//!
//! `DataApiClient` owns the configuration, the shared connection pool and
//! the observer bus. Every operation funnels into `run_command`, which
//! encodes the command, executes it through the retrying transport,
//! classifies and decodes the reply, and hands an execution record to the
//! observers once the result is known.

mod builder;
mod collection;
mod config;
mod cursor;
mod database;
mod results;
mod table;

pub use builder::DataApiClientBuilder;
pub use collection::{Collection, FindOptions, IdGeneration, InsertManyOptions, UpdateOptions};
pub use config::{
    user_agent, Caller, ClientConfig, ClientOptions, CodecConfig, HttpConfig, StaticToken,
    TimeoutConfig, TokenProvider, DEFAULT_API_PATH, DRIVER_NAME, ENV_ENDPOINT, ENV_KEYSPACE,
    ENV_TOKEN,
};
pub use cursor::{Cursor, CursorState};
pub use database::Database;
pub use results::{DeleteResult, DocumentResponse, InsertManyResult, InsertOneResult, UpdateResult};
pub use table::Table;

use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

use crate::observer::{CommandObserver, ExecutionOutcome, ExecutionRecord, ObserverBus};
use crate::protocol::{
    ApiResponse, CodecRegistry, Command, CommandSettings, DriverError, DriverResult,
    FromDocument,
};
use crate::transport::{
    classify_status, HttpExchange, ReqwestExchange, RetryingTransport, WireRequest,
};

struct ClientInner {
    options: ClientOptions,
    base_url: String,
    user_agent: String,
    transport: RetryingTransport,
    observers: ObserverBus,
}

/// Entry point. Cheap to clone; clones share the connection pool and the
/// observer registry.
#[derive(Clone)]
pub struct DataApiClient {
    inner: Arc<ClientInner>,
}

/// What the pipeline learned before it finished, for the execution record.
#[derive(Default)]
struct Trace {
    request_body: Option<String>,
    http_status: Option<u16>,
    response_body: Option<String>,
    attempts: u32,
}

impl DataApiClient {
    pub fn new(options: ClientOptions) -> DriverResult<Self> {
        options.validate()?;
        let exchange = ReqwestExchange::new(&options.http, &options.timeouts)?;
        Self::with_exchange(options, Arc::new(exchange))
    }

    /// Client over a caller-supplied HTTP exchange.
    pub fn with_exchange(
        options: ClientOptions,
        exchange: Arc<dyn HttpExchange>,
    ) -> DriverResult<Self> {
        options.validate()?;
        let transport = RetryingTransport::new(exchange, options.http.retry.clone());
        let observers = ObserverBus::new(options.observer_capacity);
        Ok(Self {
            inner: Arc::new(ClientInner {
                base_url: options.base_url(),
                user_agent: options.user_agent(),
                transport,
                observers,
                options,
            }),
        })
    }

    pub fn builder(endpoint: impl Into<String>) -> DataApiClientBuilder {
        DataApiClientBuilder::new(endpoint)
    }

    pub fn options(&self) -> &ClientOptions {
        &self.inner.options
    }

    pub fn registry(&self) -> &CodecRegistry {
        &self.inner.options.registry
    }

    pub(crate) fn shared_registry(&self) -> Arc<CodecRegistry> {
        self.inner.options.registry.clone()
    }

    pub fn observers(&self) -> &ObserverBus {
        &self.inner.observers
    }

    pub fn register_observer(&self, name: impl Into<String>, observer: Arc<dyn CommandObserver>) {
        self.inner.observers.register(name, observer);
    }

    pub fn unregister_observer(&self, name: &str) -> bool {
        self.inner.observers.unregister(name)
    }

    pub fn database(&self, keyspace: impl Into<String>) -> Database {
        Database::new(self.clone(), keyspace.into())
    }

    /// Database for the configured default keyspace.
    pub fn default_database(&self) -> DriverResult<Database> {
        let keyspace = self.inner.options.keyspace.clone().ok_or_else(|| {
            DriverError::Config("No default keyspace configured".to_string())
        })?;
        Ok(self.database(keyspace))
    }

    pub(crate) fn url(&self, segments: &[&str]) -> String {
        let mut url = self.inner.base_url.clone();
        for segment in segments {
            url.push('/');
            url.push_str(segment);
        }
        url
    }

    /// Lazy cursor over a paginated command posted to `url`.
    pub fn cursor<T: FromDocument>(&self, url: impl Into<String>, command: Command) -> Cursor<T> {
        Cursor::new(self.clone(), url.into(), command, self.shared_registry())
    }

    /// Execute one command against `url`.
    ///
    /// Observers are notified exactly once, after the outcome is known,
    /// whatever that outcome is.
    pub async fn run_command(&self, url: &str, command: &Command) -> DriverResult<ApiResponse> {
        self.run_command_with(url, command, &self.inner.options.registry)
            .await
    }

    /// `run_command` with a handle-specific registry.
    pub(crate) async fn run_command_with(
        &self,
        url: &str,
        command: &Command,
        registry: &CodecRegistry,
    ) -> DriverResult<ApiResponse> {
        let started_at = Utc::now();
        let clock = Instant::now();
        let mut trace = Trace::default();

        let result = self.execute(url, command, registry, &mut trace).await;

        if !self.inner.observers.is_empty() {
            let outcome = match &result {
                Ok(_) => ExecutionOutcome::Success,
                Err(e) => ExecutionOutcome::Failure {
                    message: e.to_string(),
                    error_codes: e.error_codes().into_iter().map(str::to_string).collect(),
                },
            };
            self.inner.observers.notify(ExecutionRecord {
                command: command.clone(),
                url: url.to_string(),
                request_body: trace.request_body,
                http_status: trace.http_status,
                response_body: trace.response_body,
                outcome,
                attempts: trace.attempts,
                started_at,
                elapsed: clock.elapsed(),
            });
        }
        result
    }

    async fn execute(
        &self,
        url: &str,
        command: &Command,
        registry: &CodecRegistry,
        trace: &mut Trace,
    ) -> DriverResult<ApiResponse> {
        let options = &self.inner.options;
        let body = command.to_body(registry)?;
        trace.request_body = Some(body.clone());

        let settings = command.settings();
        let request = WireRequest {
            url: url.to_string(),
            headers: self.headers(settings),
            body,
            timeout: settings
                .timeout
                .unwrap_or_else(|| options.timeouts.for_category(settings.timeout_category)),
        };

        debug!("Sending '{}' to {}", command.name(), url);
        let exchanged = match self.inner.transport.execute(&request, settings.deadline).await {
            Ok(exchanged) => exchanged,
            Err(e) => {
                if let DriverError::Transport { attempts, .. }
                | DriverError::DeadlineExceeded { attempts } = &e
                {
                    trace.attempts = *attempts;
                }
                return Err(e);
            }
        };
        trace.attempts = exchanged.attempts;
        trace.http_status = Some(exchanged.response.status);
        trace.response_body = Some(exchanged.response.body.clone());

        classify_status(url, &exchanged.response)?;
        let response = ApiResponse::decode(&exchanged.response.body, registry)?;
        for warning in &response.warnings {
            warn!("Command '{}' returned a warning: {}", command.name(), warning);
        }
        let response = response.into_result(command)?;
        debug!(
            "'{}' completed after {} attempt(s)",
            command.name(),
            exchanged.attempts
        );
        Ok(response)
    }

    fn headers(&self, settings: &CommandSettings) -> Vec<(String, String)> {
        let options = &self.inner.options;
        let mut headers = Vec::with_capacity(4 + options.headers.len() + settings.headers.len());

        let token = settings
            .token
            .clone()
            .or_else(|| options.token.as_ref().and_then(|p| p.token()));
        match token {
            Some(token) => headers.push(("Authorization".to_string(), format!("Bearer {}", token))),
            None => debug!("No token available, sending request without Authorization"),
        }
        headers.push(("Content-Type".to_string(), "application/json".to_string()));
        headers.push(("User-Agent".to_string(), self.inner.user_agent.clone()));

        if let Some(auth) = settings.embedding_auth.as_ref().or(options.embedding_auth.as_ref()) {
            headers.extend(auth.headers());
        }
        if let Some(key) = settings
            .reranking_api_key
            .as_ref()
            .or(options.reranking_api_key.as_ref())
        {
            headers.push((
                crate::protocol::command::RERANKING_API_KEY_HEADER.to_string(),
                key.clone(),
            ));
        }
        headers.extend(options.headers.iter().cloned());
        headers.extend(settings.headers.iter().cloned());
        headers
    }
}

impl std::fmt::Debug for DataApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataApiClient")
            .field("base_url", &self.inner.base_url)
            .field("observers", &self.inner.observers.len())
            .finish()
    }
}

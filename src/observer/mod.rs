//! Execution observers
//!
//! Observers are registered by name and notified once per completed command
//! with an immutable `ExecutionRecord`. Each notification runs as its own
//! spawned task, after the caller already holds its result, so a slow or
//! panicking observer cannot delay or fail the command, nor another
//! observer.
//!
//! In-flight notifications are bounded; when the bound is reached new
//! notifications are dropped and counted.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

use crate::protocol::Command;

pub const DEFAULT_MAX_IN_FLIGHT: usize = 1024;

/// How a command ended.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutcome {
    Success,
    Failure {
        /// Display form of the error returned to the caller
        message: String,
        /// Server error codes, when the envelope carried errors
        error_codes: Vec<String>,
    },
}

/// Snapshot of one completed command.
#[derive(Debug, Clone)]
pub struct ExecutionRecord {
    pub command: Command,
    pub url: String,
    /// Serialized request body; `None` if encoding failed
    pub request_body: Option<String>,
    pub http_status: Option<u16>,
    pub response_body: Option<String>,
    pub outcome: ExecutionOutcome,
    pub attempts: u32,
    pub started_at: DateTime<Utc>,
    pub elapsed: Duration,
}

impl ExecutionRecord {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, ExecutionOutcome::Success)
    }
}

#[async_trait]
pub trait CommandObserver: Send + Sync {
    async fn on_execution(&self, record: Arc<ExecutionRecord>);
}

/// Observer that writes one `tracing` event per command.
#[derive(Debug, Default, Clone)]
pub struct LoggingObserver {
    /// Include request and response bodies
    pub verbose: bool,
}

#[async_trait]
impl CommandObserver for LoggingObserver {
    async fn on_execution(&self, record: Arc<ExecutionRecord>) {
        match &record.outcome {
            ExecutionOutcome::Success => info!(
                command = record.command.name(),
                status = record.http_status,
                attempts = record.attempts,
                elapsed_ms = record.elapsed.as_millis() as u64,
                "Command succeeded"
            ),
            ExecutionOutcome::Failure {
                message,
                error_codes,
            } => warn!(
                command = record.command.name(),
                status = record.http_status,
                attempts = record.attempts,
                elapsed_ms = record.elapsed.as_millis() as u64,
                codes = ?error_codes,
                "Command failed: {}",
                message
            ),
        }
        if self.verbose {
            debug!(
                command = record.command.name(),
                request = record.request_body.as_deref().unwrap_or(""),
                response = record.response_body.as_deref().unwrap_or(""),
                "Command payloads"
            );
        }
    }
}

/// Named registry of observers.
pub struct ObserverBus {
    observers: RwLock<HashMap<String, Arc<dyn CommandObserver>>>,
    permits: Arc<Semaphore>,
    dropped: AtomicU64,
}

impl Default for ObserverBus {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_IN_FLIGHT)
    }
}

impl ObserverBus {
    pub fn new(max_in_flight: usize) -> Self {
        Self {
            observers: RwLock::new(HashMap::new()),
            permits: Arc::new(Semaphore::new(max_in_flight.max(1))),
            dropped: AtomicU64::new(0),
        }
    }

    /// Register under `name`, returning any observer it replaces.
    pub fn register(
        &self,
        name: impl Into<String>,
        observer: Arc<dyn CommandObserver>,
    ) -> Option<Arc<dyn CommandObserver>> {
        self.observers.write().insert(name.into(), observer)
    }

    pub fn unregister(&self, name: &str) -> bool {
        self.observers.write().remove(name).is_some()
    }

    pub fn names(&self) -> Vec<String> {
        self.observers.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.observers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.read().is_empty()
    }

    /// Notifications discarded because the in-flight bound was reached or
    /// no runtime was available.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Fire-and-forget delivery to every registered observer.
    ///
    /// The registry lock is released before anything is spawned, so
    /// observers may register or unregister from inside their callback.
    pub fn notify(&self, record: ExecutionRecord) {
        let targets: Vec<(String, Arc<dyn CommandObserver>)> = self
            .observers
            .read()
            .iter()
            .map(|(name, obs)| (name.clone(), obs.clone()))
            .collect();
        if targets.is_empty() {
            return;
        }

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            self.dropped.fetch_add(targets.len() as u64, Ordering::Relaxed);
            debug!("No async runtime, dropping {} observer notification(s)", targets.len());
            return;
        };

        let record = Arc::new(record);
        for (name, observer) in targets {
            let Ok(permit) = self.permits.clone().try_acquire_owned() else {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                debug!("Observer '{}' backlog full, notification dropped", name);
                continue;
            };
            let record = record.clone();
            handle.spawn(async move {
                let _permit = permit;
                let delivery = AssertUnwindSafe(observer.on_execution(record)).catch_unwind();
                if delivery.await.is_err() {
                    error!("Observer '{}' panicked while handling a command", name);
                }
            });
        }
    }
}

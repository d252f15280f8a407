use super::command::Command;
use super::response::{ApiError, ApiResponse};
use super::value::{Document, Value};
use crate::client::InsertManyResult;
use thiserror::Error;

/// Driver error types
#[derive(Error, Debug)]
pub enum DriverError {
    /// Connection refused, reset or timed out on every allowed attempt
    #[error("Transport error after {attempts} attempt(s): {message}")]
    Transport { attempts: u32, message: String },

    /// Caller-supplied deadline passed before a successful exchange
    #[error("Deadline exceeded after {attempts} attempt(s)")]
    DeadlineExceeded { attempts: u32 },

    #[error("Authentication failed (HTTP 401): {body}")]
    Authentication { body: String },

    #[error("Malformed request (HTTP 422): {body}")]
    MalformedRequest { body: String },

    #[error("Service unavailable (HTTP 503): {body}")]
    ServiceUnavailable { body: String },

    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// HTTP 2xx carrying a non-empty `errors` array
    #[error("{0}")]
    Api(Box<ApiFailure>),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Cursor error: {0}")]
    Cursor(String),

    /// A batch insert failed. `result` holds every id and document response
    /// reported before the failure, including the failing chunk's own.
    #[error("Batch insert failed after {} inserted document(s): {source}", .result.inserted_ids.len())]
    InsertMany {
        result: Box<InsertManyResult>,
        source: Box<DriverError>,
    },

    /// `countDocuments` reached its upper bound or the server's own limit
    #[error("Too many documents to count (limit {limit})")]
    TooManyDocuments { limit: u64 },
}

pub type DriverResult<T> = Result<T, DriverError>;

impl DriverError {
    pub(crate) fn serialization(msg: impl Into<String>) -> Self {
        DriverError::Serialization(msg.into())
    }

    /// HTTP status code for failures that came from a received response.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            DriverError::InsertMany { source, .. } => source.http_status(),
            DriverError::Authentication { .. } => Some(401),
            DriverError::MalformedRequest { .. } => Some(422),
            DriverError::ServiceUnavailable { .. } => Some(503),
            DriverError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// True for failures a higher layer may reasonably retry with its own
    /// backoff. The transport never retries these itself.
    pub fn is_transient(&self) -> bool {
        match self {
            DriverError::InsertMany { source, .. } => source.is_transient(),
            other => matches!(
                other,
                DriverError::Transport { .. } | DriverError::ServiceUnavailable { .. }
            ),
        }
    }

    pub fn api_failure(&self) -> Option<&ApiFailure> {
        match self {
            DriverError::Api(failure) => Some(&**failure),
            DriverError::InsertMany { source, .. } => source.api_failure(),
            _ => None,
        }
    }

    /// What a failed batch insert did get in.
    pub fn partial_insert(&self) -> Option<&InsertManyResult> {
        match self {
            DriverError::InsertMany { result, .. } => Some(&**result),
            _ => None,
        }
    }

    /// Error codes reported by the server, in response order.
    pub fn error_codes(&self) -> Vec<&str> {
        self.api_failure()
            .map(|f| {
                f.errors
                    .iter()
                    .filter_map(|e| e.error_code.as_deref())
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl From<serde_json::Error> for DriverError {
    fn from(err: serde_json::Error) -> Self {
        DriverError::Serialization(err.to_string())
    }
}

/// A 2xx response whose envelope reported errors.
///
/// The full response is kept so callers can see what succeeded: a batch
/// insert may report some ids in `status.insertedIds` next to the errors for
/// the rejected documents.
#[derive(Debug, Clone)]
pub struct ApiFailure {
    pub command: Command,
    pub errors: Vec<ApiError>,
    pub response: ApiResponse,
}

impl ApiFailure {
    /// Documents returned alongside the errors, if any.
    pub fn documents(&self) -> &[Document] {
        self.response.documents()
    }

    /// Ids the server accepted before failing, from `status.insertedIds`.
    pub fn inserted_ids(&self) -> Vec<Value> {
        self.response.inserted_ids()
    }
}

impl std::fmt::Display for ApiFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Command '{}' failed", self.command.name())?;
        for (i, err) in self.errors.iter().enumerate() {
            let sep = if i == 0 { ": " } else { "; " };
            write!(f, "{}{}", sep, err)?;
        }
        Ok(())
    }
}

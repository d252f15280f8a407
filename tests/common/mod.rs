//! Common test utilities for client tests
//!
//! Provides:
//! - A scripted `HttpExchange` that replays canned outcomes and records
//!   every request it sees
//! - A loopback axum stub server replaying canned HTTP responses
//! - Client constructors with fast retry settings

#![allow(dead_code)]

use async_trait::async_trait;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::Router;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

use dataapi_client::transport::{TransportFault, WireRequest, WireResponse};
use dataapi_client::{DataApiClient, HttpExchange, RetryPolicy};

pub const ENDPOINT: &str = "http://stub.local";

// ============================================================================
// Scripted exchange
// ============================================================================

pub type Outcome = Result<WireResponse, TransportFault>;

pub fn ok(body: &str) -> Outcome {
    Ok(WireResponse::new(200, body))
}

pub fn status(code: u16, body: &str) -> Outcome {
    Ok(WireResponse::new(code, body))
}

pub fn refused() -> Outcome {
    Err(TransportFault::Connect("connection refused".to_string()))
}

#[derive(Default)]
pub struct ScriptedExchange {
    script: Mutex<VecDeque<Outcome>>,
    requests: Mutex<Vec<WireRequest>>,
    /// Delay applied before every outcome
    latency: Option<Duration>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl ScriptedExchange {
    pub fn new(script: Vec<Outcome>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            ..Self::default()
        })
    }

    pub fn with_latency(script: Vec<Outcome>, latency: Duration) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            latency: Some(latency),
            ..Self::default()
        })
    }

    pub fn attempts(&self) -> usize {
        self.requests.lock().len()
    }

    /// Most exchanges seen running at the same time.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<WireRequest> {
        self.requests.lock().clone()
    }

    /// Request bodies parsed back to JSON.
    pub fn bodies(&self) -> Vec<serde_json::Value> {
        self.requests
            .lock()
            .iter()
            .map(|r| serde_json::from_str(&r.body).expect("request body is JSON"))
            .collect()
    }
}

#[async_trait]
impl HttpExchange for ScriptedExchange {
    async fn exchange(&self, request: &WireRequest) -> Result<WireResponse, TransportFault> {
        self.requests.lock().push(request.clone());
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(running, Ordering::SeqCst);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        let next = self.script.lock().pop_front();
        next.unwrap_or_else(|| Err(TransportFault::Fatal("script exhausted".to_string())))
    }
}

/// Retry policy with millisecond delays.
pub fn fast_retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy::new()
        .with_max_attempts(max_attempts)
        .with_initial_delay(Duration::from_millis(1))
        .with_max_delay(Duration::from_millis(5))
}

pub fn scripted_client(exchange: Arc<ScriptedExchange>, max_attempts: u32) -> DataApiClient {
    DataApiClient::builder(ENDPOINT)
        .token("test-token")
        .retry(fast_retry(max_attempts))
        .exchange(exchange)
        .build()
        .expect("client builds")
}

// ============================================================================
// Stub server
// ============================================================================

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub path: String,
    pub headers: HeaderMap,
    pub body: serde_json::Value,
}

struct StubState {
    responses: Mutex<VecDeque<(u16, String)>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

pub struct StubServer {
    pub endpoint: String,
    state: Arc<StubState>,
}

impl StubServer {
    /// Serve `responses` in order, one per request; afterwards every request
    /// gets HTTP 500.
    pub async fn start(responses: Vec<(u16, &str)>) -> Self {
        let state = Arc::new(StubState {
            responses: Mutex::new(
                responses
                    .into_iter()
                    .map(|(code, body)| (code, body.to_string()))
                    .collect(),
            ),
            requests: Mutex::new(Vec::new()),
        });

        let app = Router::new().fallback(replay).with_state(state.clone());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            endpoint: format!("http://{}", addr),
            state,
        }
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.requests.lock().clone()
    }

    pub fn client(&self) -> DataApiClient {
        DataApiClient::builder(&self.endpoint)
            .token("stub-token")
            .caller("stub-tests", Some("1.0"))
            .retry(fast_retry(1))
            .build()
            .expect("client builds")
    }
}

async fn replay(
    State(state): State<Arc<StubState>>,
    uri: axum::http::Uri,
    headers: HeaderMap,
    body: String,
) -> (StatusCode, String) {
    state.requests.lock().push(RecordedRequest {
        path: uri.path().to_string(),
        headers,
        body: serde_json::from_str(&body).unwrap_or(serde_json::Value::Null),
    });
    let next = state.responses.lock().pop_front();
    match next {
        Some((code, body)) => (
            StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            body,
        ),
        None => (StatusCode::INTERNAL_SERVER_ERROR, "no scripted response".to_string()),
    }
}

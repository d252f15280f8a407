//! Execution Observer Tests
//!
//! Tests for:
//! - One record per command, success and failure
//! - Isolation from panicking observers
//! - Unregistering from inside a callback
//! - Bounded in-flight notifications
//! - Log lines written by the logging observer

mod common;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use common::{ok, refused, scripted_client, status, ScriptedExchange};
use dataapi_client::protocol::names;
use dataapi_client::{
    Command, CommandObserver, DataApiClient, ExecutionOutcome, ExecutionRecord, LoggingObserver,
};

const URL: &str = "http://stub.local/api/json/v1/ks/c";

/// Forwards every record to a channel.
struct Forward(mpsc::UnboundedSender<Arc<ExecutionRecord>>);

#[async_trait]
impl CommandObserver for Forward {
    async fn on_execution(&self, record: Arc<ExecutionRecord>) {
        let _ = self.0.send(record);
    }
}

struct Panics;

#[async_trait]
impl CommandObserver for Panics {
    async fn on_execution(&self, _record: Arc<ExecutionRecord>) {
        panic!("observer failure");
    }
}

fn forwarding(client: &DataApiClient, name: &str) -> mpsc::UnboundedReceiver<Arc<ExecutionRecord>> {
    let (tx, rx) = mpsc::unbounded_channel();
    client.register_observer(name, Arc::new(Forward(tx)));
    rx
}

async fn recv(rx: &mut mpsc::UnboundedReceiver<Arc<ExecutionRecord>>) -> Arc<ExecutionRecord> {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("observer notified in time")
        .expect("channel open")
}

// ============================================================================
// Records
// ============================================================================

#[tokio::test]
async fn test_success_record() {
    let exchange = ScriptedExchange::new(vec![refused(), ok(r#"{"status":{"count":4}}"#)]);
    let client = scripted_client(exchange, 2);
    let mut rx = forwarding(&client, "capture");

    client
        .run_command(URL, &Command::new(names::COUNT_DOCUMENTS))
        .await
        .unwrap();

    let record = recv(&mut rx).await;
    assert!(record.is_success());
    assert_eq!(record.command.name(), "countDocuments");
    assert_eq!(record.url, URL);
    assert_eq!(record.attempts, 2);
    assert_eq!(record.http_status, Some(200));
    assert_eq!(
        record.request_body.as_deref(),
        Some(r#"{"countDocuments":{}}"#)
    );
    assert_eq!(
        record.response_body.as_deref(),
        Some(r#"{"status":{"count":4}}"#)
    );
}

#[tokio::test]
async fn test_failure_record_carries_error_codes() {
    let body = r#"{"errors":[{"message":"no such collection","errorCode":"COLLECTION_NOT_EXIST"}]}"#;
    let exchange = ScriptedExchange::new(vec![ok(body)]);
    let client = scripted_client(exchange, 1);
    let mut rx = forwarding(&client, "capture");

    let err = client
        .run_command(URL, &Command::new(names::FIND))
        .await
        .unwrap_err();

    let record = recv(&mut rx).await;
    match &record.outcome {
        ExecutionOutcome::Failure {
            message,
            error_codes,
        } => {
            assert_eq!(message, &err.to_string());
            assert_eq!(error_codes, &vec!["COLLECTION_NOT_EXIST".to_string()]);
        }
        ExecutionOutcome::Success => panic!("expected failure record"),
    }
    assert_eq!(record.http_status, Some(200));
}

#[tokio::test]
async fn test_http_failure_record() {
    let exchange = ScriptedExchange::new(vec![status(503, "busy")]);
    let client = scripted_client(exchange, 3);
    let mut rx = forwarding(&client, "capture");

    client
        .run_command(URL, &Command::new(names::FIND))
        .await
        .unwrap_err();

    let record = recv(&mut rx).await;
    assert!(!record.is_success());
    assert_eq!(record.http_status, Some(503));
    assert_eq!(record.attempts, 1);
}

// ============================================================================
// Isolation
// ============================================================================

#[tokio::test]
async fn test_panicking_observer_is_isolated() {
    let exchange = ScriptedExchange::new(vec![
        ok(r#"{"status":{"count":1}}"#),
        ok(r#"{"status":{"count":2}}"#),
    ]);
    let client = scripted_client(exchange, 1);
    client.register_observer("boom", Arc::new(Panics));
    let mut rx = forwarding(&client, "capture");

    for _ in 0..2 {
        let response = client
            .run_command(URL, &Command::new(names::COUNT_DOCUMENTS))
            .await
            .unwrap();
        assert!(response.status_field("count").is_some());
    }

    assert!(recv(&mut rx).await.is_success());
    assert!(recv(&mut rx).await.is_success());
}

/// Removes itself on its first notification.
struct OneShot {
    client: DataApiClient,
    tx: mpsc::UnboundedSender<bool>,
}

#[async_trait]
impl CommandObserver for OneShot {
    async fn on_execution(&self, _record: Arc<ExecutionRecord>) {
        let removed = self.client.unregister_observer("one-shot");
        let _ = self.tx.send(removed);
    }
}

#[tokio::test]
async fn test_unregister_from_callback() {
    let exchange = ScriptedExchange::new(vec![
        ok(r#"{"status":{}}"#),
        ok(r#"{"status":{}}"#),
    ]);
    let client = scripted_client(exchange, 1);
    let (tx, mut rx) = mpsc::unbounded_channel();
    client.register_observer(
        "one-shot",
        Arc::new(OneShot {
            client: client.clone(),
            tx,
        }),
    );

    client.run_command(URL, &Command::new(names::FIND)).await.unwrap();
    let removed = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(removed);
    assert!(client.observers().is_empty());

    client.run_command(URL, &Command::new(names::FIND)).await.unwrap();
    assert!(
        tokio::time::timeout(Duration::from_millis(100), rx.recv())
            .await
            .map(|r| r.is_none())
            .unwrap_or(true),
        "removed observer must not be notified again"
    );
}

// ============================================================================
// Back-pressure
// ============================================================================

/// Holds every notification until released.
struct Gate(Arc<tokio::sync::Notify>);

#[async_trait]
impl CommandObserver for Gate {
    async fn on_execution(&self, _record: Arc<ExecutionRecord>) {
        self.0.notified().await;
    }
}

#[tokio::test]
async fn test_full_backlog_drops_and_counts() {
    let exchange = ScriptedExchange::new(vec![
        ok(r#"{"status":{}}"#),
        ok(r#"{"status":{}}"#),
        ok(r#"{"status":{}}"#),
    ]);
    let client = DataApiClient::builder(common::ENDPOINT)
        .retry(common::fast_retry(1))
        .observer_capacity(1)
        .exchange(exchange)
        .build()
        .unwrap();
    let gate = Arc::new(tokio::sync::Notify::new());
    client.register_observer("slow", Arc::new(Gate(gate.clone())));

    for _ in 0..3 {
        client.run_command(URL, &Command::new(names::FIND)).await.unwrap();
    }
    assert_eq!(client.observers().dropped(), 2);
    gate.notify_waiters();
}

// ============================================================================
// Logging observer
// ============================================================================

/// Shared buffer the fmt subscriber writes into.
#[derive(Clone, Default)]
struct Captured(Arc<Mutex<Vec<u8>>>);

impl std::io::Write for Captured {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl Captured {
    fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.lock()).into_owned()
    }
}

fn record(outcome: ExecutionOutcome) -> Arc<ExecutionRecord> {
    Arc::new(ExecutionRecord {
        command: Command::new(names::COUNT_DOCUMENTS),
        url: URL.to_string(),
        request_body: Some(r#"{"countDocuments":{}}"#.to_string()),
        http_status: Some(200),
        response_body: Some(r#"{"status":{"count":4}}"#.to_string()),
        outcome,
        attempts: 2,
        started_at: Utc::now(),
        elapsed: Duration::from_millis(12),
    })
}

#[tokio::test]
async fn test_logging_observer_output() {
    let captured = Captured::default();
    let writer = captured.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new("dataapi_client=debug"))
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    let quiet = LoggingObserver::default();
    quiet.on_execution(record(ExecutionOutcome::Success)).await;
    quiet
        .on_execution(record(ExecutionOutcome::Failure {
            message: "no such collection".to_string(),
            error_codes: vec!["COLLECTION_NOT_EXIST".to_string()],
        }))
        .await;

    let text = captured.text();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 2, "{}", text);
    assert!(lines[0].contains("INFO"), "{}", lines[0]);
    assert!(lines[0].contains("Command succeeded"));
    assert!(lines[0].contains("countDocuments"));
    assert!(lines[0].contains("attempts=2"));
    assert!(lines[1].contains("WARN"), "{}", lines[1]);
    assert!(lines[1].contains("Command failed: no such collection"));
    assert!(lines[1].contains("COLLECTION_NOT_EXIST"));
    assert!(!text.contains("Command payloads"));

    LoggingObserver { verbose: true }
        .on_execution(record(ExecutionOutcome::Success))
        .await;
    let text = captured.text();
    assert!(text.contains("DEBUG"), "{}", text);
    assert!(text.contains("Command payloads"));
    assert!(text.contains(":4}}"), "{}", text);
}

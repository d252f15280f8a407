//! Client Tests Against a Loopback Server
//!
//! Tests for:
//! - URL layout and request headers as seen by a real HTTP server
//! - Document operations end to end through reqwest
//! - Paged reads
//! - Partial failures and status mapping

mod common;

use common::StubServer;
use dataapi_client::{
    Document, DriverError, FindOptions, InsertManyOptions, UpdateOptions, Value,
};

fn header(request: &common::RecordedRequest, name: &str) -> String {
    request
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

// ============================================================================
// Document operations
// ============================================================================

#[tokio::test]
async fn test_insert_one_round_trip() {
    let server = StubServer::start(vec![(200, r#"{"status":{"insertedIds":["1"]}}"#)]).await;
    let collection = server.client().database("ks").collection("coll");

    let result = collection
        .insert_one(Document::new().with("name", "Ada"))
        .await
        .unwrap();
    assert_eq!(result.inserted_id, Value::from("1"));

    let requests = server.requests();
    assert_eq!(requests.len(), 1);
    let request = &requests[0];
    assert_eq!(request.path, "/api/json/v1/ks/coll");
    assert_eq!(
        request.body,
        serde_json::json!({"insertOne": {"document": {"name": "Ada"}}})
    );
    assert_eq!(header(request, "authorization"), "Bearer stub-token");
    assert_eq!(header(request, "content-type"), "application/json");
    let agent = header(request, "user-agent");
    assert!(agent.starts_with("dataapi-client/"), "{}", agent);
    assert!(agent.ends_with("stub-tests/1.0"), "{}", agent);
}

#[tokio::test]
async fn test_find_pages_through_server() {
    let server = StubServer::start(vec![
        (200, r#"{"data":{"documents":[{"_id":1},{"_id":2}],"nextPageState":"a"}}"#),
        (200, r#"{"data":{"documents":[{"_id":3}],"nextPageState":"b"}}"#),
        (200, r#"{"data":{"documents":[{"_id":4}],"nextPageState":null}}"#),
    ])
    .await;
    let collection = server.client().database("ks").collection("coll");

    let options = FindOptions {
        limit: Some(10),
        ..FindOptions::default()
    };
    let docs = collection
        .find::<Document>(Some(Document::new().with("active", true)), options)
        .to_list()
        .await
        .unwrap();

    let ids: Vec<Value> = docs.iter().filter_map(|d| d.id().cloned()).collect();
    assert_eq!(ids, (1..=4).map(Value::from).collect::<Vec<_>>());

    let requests = server.requests();
    assert_eq!(requests.len(), 3);
    assert_eq!(requests[0].body["find"]["filter"]["active"], true);
    assert!(requests[0].body["find"]["options"].get("pageState").is_none());
    assert_eq!(requests[1].body["find"]["options"]["pageState"], "a");
    assert_eq!(requests[2].body["find"]["options"]["pageState"], "b");
}

#[tokio::test]
async fn test_update_and_delete_counts() {
    let server = StubServer::start(vec![
        (200, r#"{"status":{"matchedCount":1,"modifiedCount":1}}"#),
        (200, r#"{"status":{"deletedCount":3}}"#),
    ])
    .await;
    let collection = server.client().database("ks").collection("coll");

    let updated = collection
        .update_one(
            Document::new().with("_id", 1),
            Document::new().with("$set", Document::new().with("seen", true)),
            UpdateOptions {
                upsert: true,
                ..UpdateOptions::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.matched_count, 1);
    assert_eq!(updated.modified_count, 1);

    let deleted = collection
        .delete_many(Document::new().with("stale", true))
        .await
        .unwrap();
    assert_eq!(deleted.deleted_count, Some(3));

    let requests = server.requests();
    assert_eq!(requests[0].body["updateOne"]["options"]["upsert"], true);
    assert_eq!(requests[1].body["deleteMany"]["filter"]["stale"], true);
}

#[tokio::test]
async fn test_admin_commands_hit_keyspace_url() {
    let server = StubServer::start(vec![
        (200, r#"{"status":{"ok":1}}"#),
        (200, r#"{"status":{"collections":["a","b"]}}"#),
    ])
    .await;
    let db = server.client().database("ks");

    db.create_collection("vectors", Some(Document::new().with("vector", Document::new().with("dimension", 3))))
        .await
        .unwrap();
    let names = db.list_collection_names().await.unwrap();
    assert_eq!(names, vec!["a".to_string(), "b".to_string()]);

    let requests = server.requests();
    assert_eq!(requests[0].path, "/api/json/v1/ks");
    assert_eq!(requests[0].body["createCollection"]["name"], "vectors");
    assert_eq!(
        requests[0].body["createCollection"]["options"]["vector"]["dimension"],
        3
    );
    assert!(requests[1].body.get("findCollections").is_some());
}

// ============================================================================
// Failures
// ============================================================================

#[tokio::test]
async fn test_partial_failure_exposes_both_sides() {
    let body = r#"{
        "status": {"insertedIds": ["a", "b"]},
        "errors": [{"message": "Document already exists", "errorCode": "DOCUMENT_ALREADY_EXISTS"}]
    }"#;
    let server = StubServer::start(vec![(200, body)]).await;
    let collection = server.client().database("ks").collection("coll");

    let docs = vec![
        Document::new().with("_id", "a"),
        Document::new().with("_id", "b"),
        Document::new().with("_id", "c"),
    ];
    let err = collection
        .insert_many(docs, InsertManyOptions::default())
        .await
        .unwrap_err();

    let failure = err.api_failure().expect("API failure");
    assert_eq!(failure.command.name(), "insertMany");
    assert_eq!(failure.inserted_ids(), vec![Value::from("a"), Value::from("b")]);
    assert_eq!(err.partial_insert().map(|r| r.len()), Some(2));
    assert_eq!(err.error_codes(), vec!["DOCUMENT_ALREADY_EXISTS"]);
    assert!(err.to_string().contains("Document already exists"));
}

#[tokio::test]
async fn test_unauthorized_maps_to_authentication() {
    let server = StubServer::start(vec![(401, "invalid token")]).await;
    let collection = server.client().database("ks").collection("coll");

    let err = collection.estimated_document_count().await.unwrap_err();
    match err {
        DriverError::Authentication { body } => assert_eq!(body, "invalid token"),
        other => panic!("expected authentication error, got {:?}", other),
    }
    assert_eq!(server.requests().len(), 1);
}

#[tokio::test]
async fn test_connection_refused_is_transport_error() {
    // Bind then drop to get a port nobody listens on
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = dataapi_client::DataApiClient::builder(format!("http://{}", addr))
        .retry(common::fast_retry(2))
        .build()
        .unwrap();
    let err = client
        .database("ks")
        .collection("coll")
        .estimated_document_count()
        .await
        .unwrap_err();
    assert!(matches!(err, DriverError::Transport { attempts: 2, .. }), "{:?}", err);
}

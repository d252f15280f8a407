//! Data API Rust Client
//!
//! Driver core for a document/table data service spoken to over HTTP with
//! JSON commands. Each operation is posted as `{"<command>": {...}}`; the
//! reply envelope (`status`, `data`, `errors`) is decoded into typed
//! results or a lazy paging cursor.
//!
//! # Example
//!
//! ```rust,no_run
//! use dataapi_client::{DataApiClient, Document, FindOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), dataapi_client::DriverError> {
//!     let client = DataApiClient::builder("http://localhost:8181")
//!         .token("my-token")
//!         .build()?;
//!
//!     let users = client.database("default_keyspace").collection("users");
//!     let inserted = users
//!         .insert_one(Document::new().with("name", "alice").with("age", 31))
//!         .await?;
//!     println!("Inserted {:?}", inserted.inserted_id);
//!
//!     let mut cursor = users.find::<Document>(None, FindOptions::default());
//!     while let Some(doc) = cursor.next().await? {
//!         println!("{:?}", doc.get("name"));
//!     }
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod observer;
pub mod protocol;
pub mod transport;

pub use client::{
    Caller, ClientConfig, ClientOptions, Collection, Cursor, CursorState, DataApiClient,
    DataApiClientBuilder, Database, DeleteResult, DocumentResponse, FindOptions, IdGeneration,
    InsertManyOptions, InsertManyResult, InsertOneResult, StaticToken, Table, TokenProvider,
    UpdateOptions, UpdateResult,
};
pub use observer::{CommandObserver, ExecutionOutcome, ExecutionRecord, LoggingObserver, ObserverBus};
pub use protocol::{
    ApiError, ApiFailure, ApiResponse, CodecRegistry, Command, CommandSettings, DataVector,
    Document, DriverError, DriverResult, EmbeddingAuth, FromDocument, FromValue, Hybrid,
    IntoDocument, ObjectId, Projection, Serde, TimeoutCategory, Value,
};
pub use transport::{HttpExchange, HttpVersion, RetryPolicy, TimeoutOptions};

use serde_json::{Map, Value as Json};
use std::time::Duration;
use tokio::time::Instant;

use super::codec::CodecRegistry;
use super::error::{DriverError, DriverResult};
use super::value::{Document, Value};

/// Key of the embedded options object inside a command payload.
pub const OPTIONS_KEY: &str = "options";
/// Paging token option, echoed back from `data.nextPageState`.
pub const PAGE_STATE_OPTION: &str = "pageState";

/// Command names understood by the service.
pub mod names {
    pub const INSERT_ONE: &str = "insertOne";
    pub const INSERT_MANY: &str = "insertMany";
    pub const FIND: &str = "find";
    pub const FIND_ONE: &str = "findOne";
    pub const UPDATE_ONE: &str = "updateOne";
    pub const UPDATE_MANY: &str = "updateMany";
    pub const DELETE_ONE: &str = "deleteOne";
    pub const DELETE_MANY: &str = "deleteMany";
    pub const COUNT_DOCUMENTS: &str = "countDocuments";
    pub const ESTIMATED_DOCUMENT_COUNT: &str = "estimatedDocumentCount";
    pub const CREATE_COLLECTION: &str = "createCollection";
    pub const FIND_COLLECTIONS: &str = "findCollections";
    pub const DELETE_COLLECTION: &str = "deleteCollection";
    pub const CREATE_TABLE: &str = "createTable";
    pub const LIST_TABLES: &str = "listTables";
    pub const DROP_TABLE: &str = "dropTable";
    pub const CREATE_INDEX: &str = "createIndex";
    pub const LIST_INDEXES: &str = "listIndexes";
}

/// Which configured request timeout applies to a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeoutCategory {
    #[default]
    General,
    CollectionAdmin,
    TableAdmin,
    DatabaseAdmin,
}

/// Credentials forwarded to the server-side embedding provider.
#[derive(Debug, Clone, PartialEq)]
pub enum EmbeddingAuth {
    /// Sent as `x-embedding-api-key`
    ApiKey(String),
    /// Providers that need several credentials (access id + secret, ...)
    Headers(Vec<(String, String)>),
}

pub const EMBEDDING_API_KEY_HEADER: &str = "x-embedding-api-key";
pub const RERANKING_API_KEY_HEADER: &str = "reranking-api-key";

impl EmbeddingAuth {
    pub fn headers(&self) -> Vec<(String, String)> {
        match self {
            EmbeddingAuth::ApiKey(key) => {
                vec![(EMBEDDING_API_KEY_HEADER.to_string(), key.clone())]
            }
            EmbeddingAuth::Headers(headers) => headers.clone(),
        }
    }
}

/// Per-call execution settings. Carried next to the envelope, never
/// serialized into the body.
#[derive(Debug, Clone, Default)]
pub struct CommandSettings {
    pub timeout_category: TimeoutCategory,
    /// Overrides the category's configured request timeout
    pub timeout: Option<Duration>,
    /// Overrides the client's token provider
    pub token: Option<String>,
    pub embedding_auth: Option<EmbeddingAuth>,
    /// Sent as `reranking-api-key`
    pub reranking_api_key: Option<String>,
    pub headers: Vec<(String, String)>,
    /// Remaining retries are abandoned once this instant passes
    pub deadline: Option<Instant>,
}

impl CommandSettings {
    pub fn for_category(category: TimeoutCategory) -> Self {
        Self {
            timeout_category: category,
            ..Self::default()
        }
    }
}

/// One operation: name, ordered payload, embedded options and settings.
#[derive(Debug, Clone, Default)]
pub struct Command {
    name: String,
    payload: Document,
    options: Document,
    settings: CommandSettings,
}

impl Command {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Set a payload field, e.g. `filter`, `sort`, `document`.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.payload.insert(key, value);
        self
    }

    /// Set a payload field only when a value is present.
    pub fn with_opt<V: Into<Value>>(self, key: impl Into<String>, value: Option<V>) -> Self {
        match value {
            Some(v) => self.with(key, v),
            None => self,
        }
    }

    /// Set a field of the embedded `options` object.
    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.options.insert(key, value);
        self
    }

    pub fn with_option_opt<V: Into<Value>>(self, key: impl Into<String>, value: Option<V>) -> Self {
        match value {
            Some(v) => self.with_option(key, v),
            None => self,
        }
    }

    pub fn with_settings(mut self, settings: CommandSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_timeout_category(mut self, category: TimeoutCategory) -> Self {
        self.settings.timeout_category = category;
        self
    }

    /// Copy of this command resuming at `page_state`. `None` clears any
    /// previous token so the copy starts from the first page.
    pub fn with_page_state(&self, page_state: Option<&str>) -> Command {
        let mut next = self.clone();
        match page_state {
            Some(token) => {
                next.options.insert(PAGE_STATE_OPTION, token);
            }
            None => {
                next.options.remove(PAGE_STATE_OPTION);
            }
        }
        next
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn payload(&self) -> &Document {
        &self.payload
    }

    pub fn options(&self) -> &Document {
        &self.options
    }

    pub fn settings(&self) -> &CommandSettings {
        &self.settings
    }

    pub fn validate(&self) -> DriverResult<()> {
        if self.name.trim().is_empty() {
            return Err(DriverError::InvalidCommand(
                "Command name must not be empty".to_string(),
            ));
        }
        if self.payload.contains_key(OPTIONS_KEY) && !self.options.is_empty() {
            return Err(DriverError::InvalidCommand(format!(
                "Command '{}' sets '{}' both as a payload field and through with_option",
                self.name, OPTIONS_KEY
            )));
        }
        Ok(())
    }

    /// `{"<name>": {...payload, "options": {...}}}`; `options` is omitted
    /// when empty.
    pub fn to_wire(&self, registry: &CodecRegistry) -> DriverResult<Json> {
        self.validate()?;
        let mut body = match registry.encode_document(&self.payload)? {
            Json::Object(map) => map,
            _ => Map::new(),
        };
        if !self.options.is_empty() {
            body.insert(OPTIONS_KEY.to_string(), registry.encode_document(&self.options)?);
        }
        let mut envelope = Map::with_capacity(1);
        envelope.insert(self.name.clone(), Json::Object(body));
        Ok(Json::Object(envelope))
    }

    pub fn to_body(&self, registry: &CodecRegistry) -> DriverResult<String> {
        Ok(serde_json::to_string(&self.to_wire(registry)?)?)
    }
}

use futures::StreamExt;
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

use super::cursor::Cursor;
use super::results::{DeleteResult, InsertManyResult, InsertOneResult, UpdateResult};
use super::DataApiClient;
use crate::protocol::{
    names, ApiResponse, CodecRegistry, Command, CommandSettings, Document, DriverError,
    DriverResult, FromDocument, IntoDocument, ObjectId, TimeoutCategory, Value, ID_FIELD,
};

/// Client-side `_id` assignment for documents inserted without one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IdGeneration {
    /// Leave it to the server
    #[default]
    Server,
    ObjectId,
    UuidV4,
    UuidV7,
}

impl IdGeneration {
    fn generate(self) -> Option<Value> {
        match self {
            IdGeneration::Server => None,
            IdGeneration::ObjectId => Some(Value::ObjectId(ObjectId::new())),
            IdGeneration::UuidV4 => Some(Value::Uuid(Uuid::new_v4())),
            IdGeneration::UuidV7 => Some(Value::Uuid(Uuid::now_v7())),
        }
    }

    fn apply(self, doc: &mut Document) {
        if doc.contains_key(ID_FIELD) {
            return;
        }
        if let Some(id) = self.generate() {
            doc.set_id(id);
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindOptions {
    pub sort: Option<Document>,
    pub projection: Option<Document>,
    pub limit: Option<u64>,
    pub skip: Option<u64>,
    pub include_similarity: bool,
    pub include_sort_vector: bool,
}

impl FindOptions {
    pub(crate) fn apply(&self, mut command: Command, paged: bool) -> Command {
        command = command
            .with_opt("sort", self.sort.clone())
            .with_opt("projection", self.projection.clone());
        if paged {
            command = command
                .with_option_opt("limit", self.limit)
                .with_option_opt("skip", self.skip);
            if self.include_sort_vector {
                command = command.with_option("includeSortVector", true);
            }
        }
        if self.include_similarity {
            command = command.with_option("includeSimilarity", true);
        }
        command
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateOptions {
    pub upsert: bool,
    /// Picks the document when several match (`updateOne` only)
    pub sort: Option<Document>,
}

/// Batch insert settings.
#[derive(Debug, Clone, PartialEq)]
pub struct InsertManyOptions {
    /// Ordered inserts stop at the first failing chunk
    pub ordered: bool,
    /// Documents per command
    pub chunk_size: usize,
    /// Chunks in flight at once; ordered inserts always use one
    pub concurrency: usize,
    pub return_document_responses: bool,
}

impl Default for InsertManyOptions {
    fn default() -> Self {
        Self {
            ordered: false,
            chunk_size: 50,
            concurrency: 1,
            return_document_responses: false,
        }
    }
}

/// Chunked `insertMany` shared by collections and tables.
///
/// Ordered inserts send one chunk at a time and stop at the first failure.
/// Unordered inserts keep up to `concurrency` chunks in flight and let every
/// chunk finish. Either way a failure comes back as
/// `DriverError::InsertMany`, carrying all ids reported so far.
pub(crate) async fn insert_chunked(
    client: &DataApiClient,
    url: &str,
    registry: &CodecRegistry,
    settings: &CommandSettings,
    documents: Vec<Document>,
    options: &InsertManyOptions,
) -> DriverResult<InsertManyResult> {
    let chunk_size = options.chunk_size.max(1);
    let commands: Vec<Command> = documents
        .chunks(chunk_size)
        .map(|chunk| {
            let mut command = Command::new(names::INSERT_MANY)
                .with("documents", Value::List(chunk.iter().cloned().map(Value::Document).collect()))
                .with_option("ordered", options.ordered)
                .with_settings(settings.clone());
            if options.return_document_responses {
                command = command.with_option("returnDocumentResponses", true);
            }
            command
        })
        .collect();

    let mut result = InsertManyResult::default();
    if options.ordered {
        for command in &commands {
            match client.run_command_with(url, command, registry).await {
                Ok(response) => result.absorb(&response, registry)?,
                Err(err) => return Err(failed_insert(result, err, registry)),
            }
        }
        return Ok(result);
    }

    let outcomes: Vec<DriverResult<ApiResponse>> = futures::stream::iter(commands.iter())
        .map(|command| client.run_command_with(url, command, registry))
        .buffered(options.concurrency.max(1))
        .collect()
        .await;
    let mut first_error = None;
    for outcome in outcomes {
        match outcome {
            Ok(response) => result.absorb(&response, registry)?,
            Err(err) => {
                absorb_failure(&mut result, &err, registry);
                first_error.get_or_insert(err);
            }
        }
    }
    match first_error {
        Some(err) => Err(DriverError::InsertMany {
            result: Box::new(result),
            source: Box::new(err),
        }),
        None => Ok(result),
    }
}

fn failed_insert(mut result: InsertManyResult, err: DriverError, registry: &CodecRegistry) -> DriverError {
    absorb_failure(&mut result, &err, registry);
    DriverError::InsertMany {
        result: Box::new(result),
        source: Box::new(err),
    }
}

/// A failed chunk may still report ids it inserted before the error.
fn absorb_failure(result: &mut InsertManyResult, err: &DriverError, registry: &CodecRegistry) {
    if let Some(failure) = err.api_failure() {
        if let Err(e) = result.absorb(&failure.response, registry) {
            warn!("Ignoring unreadable partial insertMany status: {}", e);
        }
    }
}

/// Handle on one document collection.
#[derive(Debug, Clone)]
pub struct Collection {
    client: DataApiClient,
    keyspace: String,
    name: String,
    url: String,
    settings: CommandSettings,
    id_generation: IdGeneration,
    registry: Arc<CodecRegistry>,
}

impl Collection {
    pub(crate) fn new(client: DataApiClient, keyspace: String, name: String) -> Self {
        let url = client.url(&[keyspace.as_str(), name.as_str()]);
        let registry = client.shared_registry();
        Self {
            client,
            keyspace,
            name,
            url,
            settings: CommandSettings::default(),
            id_generation: IdGeneration::Server,
            registry,
        }
    }

    /// Read these document fields back as vectors (besides `$vector`).
    pub fn with_vector_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.registry = Arc::new(self.registry.as_ref().clone().with_vector_fields(fields));
        self
    }

    /// Read these document fields back as hybrid values (besides `$hybrid`).
    pub fn with_hybrid_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.registry = Arc::new(self.registry.as_ref().clone().with_hybrid_fields(fields));
        self
    }

    /// Codec registry used by this handle.
    pub fn registry(&self) -> &CodecRegistry {
        &self.registry
    }

    /// Settings applied to every command of this handle.
    pub fn with_settings(mut self, settings: CommandSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_id_generation(mut self, id_generation: IdGeneration) -> Self {
        self.id_generation = id_generation;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn keyspace(&self) -> &str {
        &self.keyspace
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn command(&self, name: &str) -> Command {
        Command::new(name).with_settings(CommandSettings {
            timeout_category: TimeoutCategory::General,
            ..self.settings.clone()
        })
    }

    pub async fn run_command(&self, command: &Command) -> DriverResult<ApiResponse> {
        self.client
            .run_command_with(&self.url, command, &self.registry)
            .await
    }

    pub async fn insert_one<D: IntoDocument>(&self, document: D) -> DriverResult<InsertOneResult> {
        let mut document = document.into_document(&self.registry)?;
        self.id_generation.apply(&mut document);
        let command = self.command(names::INSERT_ONE).with("document", document);
        let response = self.run_command(&command).await?;
        InsertOneResult::from_response(&response)
    }

    pub async fn insert_many<D, I>(
        &self,
        documents: I,
        options: InsertManyOptions,
    ) -> DriverResult<InsertManyResult>
    where
        D: IntoDocument,
        I: IntoIterator<Item = D>,
    {
        let documents = documents
            .into_iter()
            .map(|d| {
                let mut doc = d.into_document(&self.registry)?;
                self.id_generation.apply(&mut doc);
                Ok(doc)
            })
            .collect::<DriverResult<Vec<_>>>()?;
        let settings = self.command(names::INSERT_MANY).settings().clone();
        insert_chunked(
            &self.client,
            &self.url,
            &self.registry,
            &settings,
            documents,
            &options,
        )
        .await
    }

    /// Lazy cursor; nothing is sent until it is advanced.
    pub fn find<T: FromDocument>(&self, filter: Option<Document>, options: FindOptions) -> Cursor<T> {
        let command = options.apply(self.command(names::FIND).with_opt("filter", filter), true);
        Cursor::new(
            self.client.clone(),
            self.url.clone(),
            command,
            self.registry.clone(),
        )
    }

    pub async fn find_one<T: FromDocument>(
        &self,
        filter: Option<Document>,
        options: FindOptions,
    ) -> DriverResult<Option<T>> {
        let command = options.apply(self.command(names::FIND_ONE).with_opt("filter", filter), false);
        let response = self.run_command(&command).await?;
        match response.document() {
            Some(doc) => T::from_document(doc.clone(), &self.registry).map(Some),
            None => Ok(None),
        }
    }

    pub async fn update_one(
        &self,
        filter: Document,
        update: Document,
        options: UpdateOptions,
    ) -> DriverResult<UpdateResult> {
        let mut command = self
            .command(names::UPDATE_ONE)
            .with("filter", filter)
            .with("update", update)
            .with_opt("sort", options.sort);
        if options.upsert {
            command = command.with_option("upsert", true);
        }
        let response = self.run_command(&command).await?;
        UpdateResult::from_response(&response)
    }

    /// Repeats the command while the server reports `moreData`, summing
    /// the counts.
    pub async fn update_many(
        &self,
        filter: Document,
        update: Document,
        options: UpdateOptions,
    ) -> DriverResult<UpdateResult> {
        let mut command = self
            .command(names::UPDATE_MANY)
            .with("filter", filter)
            .with("update", update);
        if options.upsert {
            command = command.with_option("upsert", true);
        }

        let mut total = UpdateResult::default();
        let mut page_state: Option<String> = None;
        loop {
            let current = command.with_page_state(page_state.as_deref());
            let response = self.run_command(&current).await?;
            let partial = UpdateResult::from_response(&response)?;
            total.matched_count += partial.matched_count;
            total.modified_count += partial.modified_count;
            if partial.upserted_id.is_some() {
                total.upserted_id = partial.upserted_id;
            }
            page_state = response.status_as::<String>("nextPageState")?;
            let more = response.status_as::<bool>("moreData")?.unwrap_or(false);
            if !more || page_state.is_none() {
                return Ok(total);
            }
        }
    }

    pub async fn delete_one(
        &self,
        filter: Document,
        sort: Option<Document>,
    ) -> DriverResult<DeleteResult> {
        let command = self
            .command(names::DELETE_ONE)
            .with("filter", filter)
            .with_opt("sort", sort);
        let response = self.run_command(&command).await?;
        DeleteResult::from_response(&response)
    }

    /// Repeats the command while the server reports `moreData`. An empty
    /// filter deletes everything and reports no count.
    pub async fn delete_many(&self, filter: Document) -> DriverResult<DeleteResult> {
        let command = self.command(names::DELETE_MANY).with("filter", filter);
        let mut deleted: Option<u64> = None;
        loop {
            let response = self.run_command(&command).await?;
            if let Some(n) = DeleteResult::from_response(&response)?.deleted_count {
                deleted = Some(deleted.unwrap_or(0) + n);
            }
            if !response.status_as::<bool>("moreData")?.unwrap_or(false) {
                return Ok(DeleteResult {
                    deleted_count: deleted,
                });
            }
        }
    }

    /// Exact count, failing once `upper_bound` is exceeded or the server
    /// stops counting.
    pub async fn count_documents(&self, filter: Option<Document>, upper_bound: u64) -> DriverResult<u64> {
        let command = self.command(names::COUNT_DOCUMENTS).with_opt("filter", filter);
        let response = self.run_command(&command).await?;
        let count = response.status_as::<u64>("count")?.ok_or_else(|| {
            DriverError::serialization("countDocuments response carries no 'status.count'")
        })?;
        if response.status_as::<bool>("moreData")?.unwrap_or(false) {
            return Err(DriverError::TooManyDocuments { limit: count });
        }
        if count > upper_bound {
            return Err(DriverError::TooManyDocuments { limit: upper_bound });
        }
        Ok(count)
    }

    pub async fn estimated_document_count(&self) -> DriverResult<u64> {
        let command = self.command(names::ESTIMATED_DOCUMENT_COUNT);
        let response = self.run_command(&command).await?;
        response.status_as::<u64>("count")?.ok_or_else(|| {
            DriverError::serialization("estimatedDocumentCount response carries no 'status.count'")
        })
    }
}

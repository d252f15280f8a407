use super::collection::{insert_chunked, FindOptions, InsertManyOptions};
use super::cursor::Cursor;
use super::database::{descriptors, status_list};
use super::results::{InsertManyResult, InsertOneResult};
use super::DataApiClient;
use std::sync::Arc;

use crate::protocol::{
    names, ApiResponse, CodecRegistry, Command, CommandSettings, Document, DriverError,
    DriverResult, FromDocument, IntoDocument, TimeoutCategory, Value,
};

/// Handle on one table. Rows are documents whose key columns come from the
/// table schema; `insertedIds` entries are primary key tuples.
///
/// Vector columns have no wire tag, so the handle must know their names to
/// read them back as vectors. Tables from `Database::create_table` learn
/// them from the definition; otherwise use `with_vector_columns`.
#[derive(Debug, Clone)]
pub struct Table {
    client: DataApiClient,
    keyspace: String,
    name: String,
    url: String,
    settings: CommandSettings,
    registry: Arc<CodecRegistry>,
}

impl Table {
    pub(crate) fn new(client: DataApiClient, keyspace: String, name: String) -> Self {
        let url = client.url(&[keyspace.as_str(), name.as_str()]);
        let registry = client.shared_registry();
        Self {
            client,
            keyspace,
            name,
            url,
            settings: CommandSettings::default(),
            registry,
        }
    }

    pub fn with_vector_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.registry = Arc::new(self.registry.as_ref().clone().with_vector_fields(columns));
        self
    }

    pub fn registry(&self) -> &CodecRegistry {
        &self.registry
    }

    pub fn with_settings(mut self, settings: CommandSettings) -> Self {
        self.settings = settings;
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

    fn command(&self, name: &str, category: TimeoutCategory) -> Command {
        Command::new(name).with_settings(CommandSettings {
            timeout_category: category,
            ..self.settings.clone()
        })
    }

    pub async fn run_command(&self, command: &Command) -> DriverResult<ApiResponse> {
        self.client
            .run_command_with(&self.url, command, &self.registry)
            .await
    }

    pub async fn insert_one<R: IntoDocument>(&self, row: R) -> DriverResult<InsertOneResult> {
        let command = self
            .command(names::INSERT_ONE, TimeoutCategory::General)
            .with("document", row.into_document(&self.registry)?);
        let response = self.run_command(&command).await?;
        InsertOneResult::from_response(&response)
    }

    pub async fn insert_many<R, I>(
        &self,
        rows: I,
        options: InsertManyOptions,
    ) -> DriverResult<InsertManyResult>
    where
        R: IntoDocument,
        I: IntoIterator<Item = R>,
    {
        let rows = rows
            .into_iter()
            .map(|row| row.into_document(&self.registry))
            .collect::<DriverResult<Vec<_>>>()?;
        let settings = CommandSettings {
            timeout_category: TimeoutCategory::General,
            ..self.settings.clone()
        };
        insert_chunked(&self.client, &self.url, &self.registry, &settings, rows, &options).await
    }

    pub fn find<T: FromDocument>(&self, filter: Option<Document>, options: FindOptions) -> Cursor<T> {
        let command = options.apply(
            self.command(names::FIND, TimeoutCategory::General)
                .with_opt("filter", filter),
            true,
        );
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
        let command = options.apply(
            self.command(names::FIND_ONE, TimeoutCategory::General)
                .with_opt("filter", filter),
            false,
        );
        let response = self.run_command(&command).await?;
        match response.document() {
            Some(row) => T::from_document(row.clone(), &self.registry).map(Some),
            None => Ok(None),
        }
    }

    /// `filter` must address a full primary key. Tables report no counts.
    pub async fn update_one(&self, filter: Document, update: Document) -> DriverResult<()> {
        let command = self
            .command(names::UPDATE_ONE, TimeoutCategory::General)
            .with("filter", filter)
            .with("update", update);
        self.run_command(&command).await?;
        Ok(())
    }

    pub async fn delete_one(&self, filter: Document) -> DriverResult<()> {
        let command = self
            .command(names::DELETE_ONE, TimeoutCategory::General)
            .with("filter", filter);
        self.run_command(&command).await?;
        Ok(())
    }

    pub async fn delete_many(&self, filter: Document) -> DriverResult<()> {
        let command = self
            .command(names::DELETE_MANY, TimeoutCategory::General)
            .with("filter", filter);
        self.run_command(&command).await?;
        Ok(())
    }

    /// Create an index from its `definition` (`column` plus `options`).
    pub async fn create_index(
        &self,
        name: &str,
        definition: Document,
        if_not_exists: bool,
    ) -> DriverResult<()> {
        let mut command = self
            .command(names::CREATE_INDEX, TimeoutCategory::TableAdmin)
            .with("name", name)
            .with("definition", definition);
        if if_not_exists {
            command = command.with_option("ifNotExists", true);
        }
        self.run_command(&command).await?;
        Ok(())
    }

    pub async fn list_index_names(&self) -> DriverResult<Vec<String>> {
        let command = self.command(names::LIST_INDEXES, TimeoutCategory::TableAdmin);
        let response = self.run_command(&command).await?;
        status_list(&response, "indexes")?
            .iter()
            .map(|v| {
                v.as_str().map(str::to_string).ok_or_else(|| {
                    DriverError::serialization(format!(
                        "Expected an index name, found {}",
                        v.type_name()
                    ))
                })
            })
            .collect()
    }

    /// Index descriptors (`name` plus `definition`).
    pub async fn list_indexes(&self) -> DriverResult<Vec<Document>> {
        let command = self
            .command(names::LIST_INDEXES, TimeoutCategory::TableAdmin)
            .with_option("explain", true);
        let response = self.run_command(&command).await?;
        descriptors(&response, "indexes")
    }
}

/// Names of the `vector` columns in a table definition. A column type is
/// either a bare string or an object with a `type` field.
pub(crate) fn vector_columns(definition: &Document) -> Vec<String> {
    let Some(Value::Document(columns)) = definition.get("columns") else {
        return Vec::new();
    };
    columns
        .iter()
        .filter(|(_, column)| {
            let kind = match column {
                Value::Document(spec) => spec.get("type").and_then(Value::as_str),
                other => other.as_str(),
            };
            kind == Some("vector")
        })
        .map(|(name, _)| name.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vector_columns_from_definition() {
        let definition = Document::new()
            .with(
                "columns",
                Document::new()
                    .with("id", "text")
                    .with("embedding", Document::new().with("type", "vector").with("dimension", 3))
                    .with("plain", "vector")
                    .with("tags", Document::new().with("type", "set")),
            )
            .with("primaryKey", "id");
        assert_eq!(vector_columns(&definition), vec!["embedding", "plain"]);
        assert!(vector_columns(&Document::new()).is_empty());
    }
}

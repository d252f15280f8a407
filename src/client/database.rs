use super::collection::Collection;
use super::table::{vector_columns, Table};
use super::DataApiClient;
use crate::protocol::{
    names, ApiResponse, Command, CommandSettings, Document, DriverError, DriverResult,
    TimeoutCategory, Value,
};

/// Handle on one keyspace.
#[derive(Debug, Clone)]
pub struct Database {
    client: DataApiClient,
    keyspace: String,
    url: String,
    settings: CommandSettings,
}

impl Database {
    pub(crate) fn new(client: DataApiClient, keyspace: String) -> Self {
        let url = client.url(&[keyspace.as_str()]);
        Self {
            client,
            keyspace,
            url,
            settings: CommandSettings::default(),
        }
    }

    /// Settings applied to every command of this handle and of the
    /// collections and tables it hands out.
    pub fn with_settings(mut self, settings: CommandSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn keyspace(&self) -> &str {
        &self.keyspace
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn client(&self) -> &DataApiClient {
        &self.client
    }

    pub fn collection(&self, name: impl Into<String>) -> Collection {
        Collection::new(self.client.clone(), self.keyspace.clone(), name.into())
            .with_settings(self.settings.clone())
    }

    pub fn table(&self, name: impl Into<String>) -> Table {
        Table::new(self.client.clone(), self.keyspace.clone(), name.into())
            .with_settings(self.settings.clone())
    }

    fn command(&self, name: &str, category: TimeoutCategory) -> Command {
        Command::new(name).with_settings(CommandSettings {
            timeout_category: category,
            ..self.settings.clone()
        })
    }

    /// Run a keyspace-level command.
    pub async fn run_command(&self, command: &Command) -> DriverResult<ApiResponse> {
        self.client.run_command(&self.url, command).await
    }

    /// Create a collection; `definition` holds the `options` of the
    /// command (vector settings, indexing, default id type).
    pub async fn create_collection(
        &self,
        name: &str,
        definition: Option<Document>,
    ) -> DriverResult<Collection> {
        let command = self
            .command(names::CREATE_COLLECTION, TimeoutCategory::CollectionAdmin)
            .with("name", name)
            .with_opt("options", definition);
        self.run_command(&command).await?;
        Ok(self.collection(name))
    }

    pub async fn list_collection_names(&self) -> DriverResult<Vec<String>> {
        let command = self.command(names::FIND_COLLECTIONS, TimeoutCategory::CollectionAdmin);
        let response = self.run_command(&command).await?;
        status_list(&response, "collections")?
            .iter()
            .map(|v| {
                v.as_str().map(str::to_string).ok_or_else(|| {
                    DriverError::serialization(format!(
                        "Expected a collection name, found {}",
                        v.type_name()
                    ))
                })
            })
            .collect()
    }

    /// Collection descriptors (`name` plus `options`).
    pub async fn list_collections(&self) -> DriverResult<Vec<Document>> {
        let command = self
            .command(names::FIND_COLLECTIONS, TimeoutCategory::CollectionAdmin)
            .with_option("explain", true);
        let response = self.run_command(&command).await?;
        descriptors(&response, "collections")
    }

    pub async fn delete_collection(&self, name: &str) -> DriverResult<()> {
        let command = self
            .command(names::DELETE_COLLECTION, TimeoutCategory::CollectionAdmin)
            .with("name", name);
        self.run_command(&command).await?;
        Ok(())
    }

    /// Create a table from its `definition` (`columns` and `primaryKey`).
    /// The returned handle reads the definition's vector columns as vectors.
    pub async fn create_table(
        &self,
        name: &str,
        definition: Document,
        if_not_exists: bool,
    ) -> DriverResult<Table> {
        let vectors = vector_columns(&definition);
        let mut command = self
            .command(names::CREATE_TABLE, TimeoutCategory::TableAdmin)
            .with("name", name)
            .with("definition", definition);
        if if_not_exists {
            command = command.with_option("ifNotExists", true);
        }
        self.run_command(&command).await?;
        Ok(self.table(name).with_vector_columns(vectors))
    }

    pub async fn list_table_names(&self) -> DriverResult<Vec<String>> {
        let command = self.command(names::LIST_TABLES, TimeoutCategory::TableAdmin);
        let response = self.run_command(&command).await?;
        status_list(&response, "tables")?
            .iter()
            .map(|v| {
                v.as_str().map(str::to_string).ok_or_else(|| {
                    DriverError::serialization(format!(
                        "Expected a table name, found {}",
                        v.type_name()
                    ))
                })
            })
            .collect()
    }

    /// Table descriptors (`name` plus `definition`).
    pub async fn list_tables(&self) -> DriverResult<Vec<Document>> {
        let command = self
            .command(names::LIST_TABLES, TimeoutCategory::TableAdmin)
            .with_option("explain", true);
        let response = self.run_command(&command).await?;
        descriptors(&response, "tables")
    }

    pub async fn drop_table(&self, name: &str, if_exists: bool) -> DriverResult<()> {
        let mut command = self
            .command(names::DROP_TABLE, TimeoutCategory::TableAdmin)
            .with("name", name);
        if if_exists {
            command = command.with_option("ifExists", true);
        }
        self.run_command(&command).await?;
        Ok(())
    }
}

pub(crate) fn status_list<'a>(response: &'a ApiResponse, key: &str) -> DriverResult<&'a [Value]> {
    match response.status_field(key) {
        Some(Value::List(items)) => Ok(items.as_slice()),
        Some(other) => Err(DriverError::serialization(format!(
            "'status.{}' must be a list, found {}",
            key,
            other.type_name()
        ))),
        None => Err(DriverError::serialization(format!(
            "Response carries no 'status.{}'",
            key
        ))),
    }
}

pub(crate) fn descriptors(response: &ApiResponse, key: &str) -> DriverResult<Vec<Document>> {
    status_list(response, key)?
        .iter()
        .map(|v| match v {
            Value::Document(doc) => Ok(doc.clone()),
            other => Err(DriverError::serialization(format!(
                "Expected a descriptor object, found {}",
                other.type_name()
            ))),
        })
        .collect()
}

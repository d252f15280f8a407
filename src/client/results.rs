use serde::Deserialize;

use crate::protocol::{ApiResponse, CodecRegistry, DriverError, DriverResult, Value};

#[derive(Debug, Clone, PartialEq)]
pub struct InsertOneResult {
    pub inserted_id: Value,
}

impl InsertOneResult {
    pub(crate) fn from_response(response: &ApiResponse) -> DriverResult<Self> {
        response
            .inserted_ids()
            .into_iter()
            .next()
            .map(|inserted_id| Self { inserted_id })
            .ok_or_else(|| {
                DriverError::serialization("insertOne response carries no 'status.insertedIds'")
            })
    }
}

/// Outcome of one document of a batch insert, as reported with
/// `returnDocumentResponses`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentResponse {
    #[serde(rename = "_id", default)]
    pub id: Option<serde_json::Value>,
    pub status: String,
    /// Indexes into the response `errors` array
    #[serde(rename = "errorIdxs", default)]
    pub error_indexes: Vec<usize>,
}

impl DocumentResponse {
    pub fn is_ok(&self) -> bool {
        self.status == "OK"
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct InsertManyResult {
    /// Ids in the order the server reported them
    pub inserted_ids: Vec<Value>,
    /// Per-document outcomes; empty unless requested
    pub document_responses: Vec<DocumentResponse>,
}

impl InsertManyResult {
    /// Append one chunk's ids and document responses.
    pub(crate) fn absorb(&mut self, response: &ApiResponse, registry: &CodecRegistry) -> DriverResult<()> {
        self.inserted_ids.extend(response.inserted_ids());
        if let Some(Value::List(items)) = response.status_field("documentResponses") {
            for item in items {
                let plain = registry.to_plain_json(item);
                let parsed: DocumentResponse = serde_json::from_value(plain).map_err(|e| {
                    DriverError::serialization(format!("Invalid document response: {}", e))
                })?;
                self.document_responses.push(parsed);
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.inserted_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inserted_ids.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateResult {
    pub matched_count: u64,
    pub modified_count: u64,
    pub upserted_id: Option<Value>,
}

impl UpdateResult {
    pub(crate) fn from_response(response: &ApiResponse) -> DriverResult<Self> {
        Ok(Self {
            matched_count: response.status_as("matchedCount")?.unwrap_or(0),
            modified_count: response.status_as("modifiedCount")?.unwrap_or(0),
            upserted_id: response.status_field("upsertedId").cloned(),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeleteResult {
    /// `None` when the server does not count, e.g. an unfiltered delete
    pub deleted_count: Option<u64>,
}

impl DeleteResult {
    pub(crate) fn from_response(response: &ApiResponse) -> DriverResult<Self> {
        let deleted_count = match response.status_as::<i64>("deletedCount")? {
            Some(n) if n >= 0 => Some(n as u64),
            _ => None,
        };
        Ok(Self { deleted_count })
    }
}

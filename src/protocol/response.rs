use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use std::fmt;

use super::codec::{json_type, CodecRegistry};
use super::command::Command;
use super::error::{ApiFailure, DriverError, DriverResult};
use super::projection::FromValue;
use super::scalar::DataVector;
use super::value::{Document, Value};

/// One entry of the response `errors` array.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiError {
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exception_class: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub family: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.error_code {
            Some(code) => write!(f, "[{}] {}", code, self.message),
            None => f.write_str(&self.message),
        }
    }
}

/// `data` section of a response.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResponseData {
    pub document: Option<Document>,
    pub documents: Option<Vec<Document>>,
    pub next_page_state: Option<String>,
}

/// Parsed response envelope.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ApiResponse {
    pub status: Option<Document>,
    pub data: Option<ResponseData>,
    pub errors: Vec<ApiError>,
    /// `status.warnings`, kept separately so callers need not dig
    pub warnings: Vec<ApiError>,
}

impl ApiResponse {
    /// Parse a raw response body.
    pub fn decode(body: &str, registry: &CodecRegistry) -> DriverResult<Self> {
        let json: Json = serde_json::from_str(body).map_err(|e| {
            DriverError::serialization(format!(
                "Invalid response body ({}): {}",
                e,
                truncate(body, 200)
            ))
        })?;
        let mut root = match json {
            Json::Object(map) => map,
            other => {
                return Err(DriverError::serialization(format!(
                    "Response body must be a JSON object, got {}",
                    json_type(&other)
                )))
            }
        };

        let errors = match root.remove("errors") {
            Some(Json::Array(items)) => items
                .into_iter()
                .map(parse_api_error)
                .collect::<DriverResult<Vec<_>>>()?,
            Some(Json::Null) | None => Vec::new(),
            Some(other) => {
                return Err(DriverError::serialization(format!(
                    "'errors' must be an array, got {}",
                    json_type(&other)
                )))
            }
        };

        let (status, warnings) = match root.remove("status") {
            Some(Json::Null) | None => (None, Vec::new()),
            Some(mut status) => {
                let warnings = match status.as_object_mut().and_then(|m| m.remove("warnings")) {
                    Some(Json::Array(items)) => items
                        .into_iter()
                        .map(parse_api_error)
                        .collect::<DriverResult<Vec<_>>>()?,
                    _ => Vec::new(),
                };
                (Some(registry.decode_document(&status)?), warnings)
            }
        };

        let data = match root.remove("data") {
            Some(Json::Null) | None => None,
            Some(data) => Some(decode_data(&data, registry)?),
        };

        Ok(Self {
            status,
            data,
            errors,
            warnings,
        })
    }

    pub fn is_error(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Ok when `errors` is empty, otherwise the structured failure carrying
    /// the command and everything the server returned.
    pub fn into_result(self, command: &Command) -> DriverResult<Self> {
        if self.errors.is_empty() {
            return Ok(self);
        }
        Err(DriverError::Api(Box::new(ApiFailure {
            command: command.clone(),
            errors: self.errors.clone(),
            response: self,
        })))
    }

    pub fn status_field(&self, key: &str) -> Option<&Value> {
        self.status.as_ref().and_then(|s| s.get(key))
    }

    /// Status field converted to `T`; missing or null is `None`.
    pub fn status_as<T: FromValue>(&self, key: &str) -> DriverResult<Option<T>> {
        match self.status_field(key) {
            None | Some(Value::Null) => Ok(None),
            Some(v) => T::from_value(v).map(Some),
        }
    }

    pub fn document(&self) -> Option<&Document> {
        self.data.as_ref().and_then(|d| d.document.as_ref())
    }

    pub fn documents(&self) -> &[Document] {
        self.data
            .as_ref()
            .and_then(|d| d.documents.as_deref())
            .unwrap_or(&[])
    }

    pub fn next_page_state(&self) -> Option<&str> {
        self.data.as_ref().and_then(|d| d.next_page_state.as_deref())
    }

    pub fn inserted_ids(&self) -> Vec<Value> {
        match self.status_field("insertedIds") {
            Some(Value::List(ids)) => ids.clone(),
            _ => Vec::new(),
        }
    }

    /// `status.sortVector` when the command asked for it.
    pub fn sort_vector(&self) -> Option<DataVector> {
        self.status_field("sortVector")
            .and_then(|v| DataVector::from_value(v).ok())
    }

    /// Unwrap into the owned page: documents and next token.
    pub(crate) fn into_page(self) -> (Vec<Document>, Option<String>) {
        match self.data {
            Some(data) => (data.documents.unwrap_or_default(), data.next_page_state),
            None => (Vec::new(), None),
        }
    }
}

fn parse_api_error(item: Json) -> DriverResult<ApiError> {
    match item {
        Json::String(message) => Ok(ApiError {
            message,
            ..ApiError::default()
        }),
        other => serde_json::from_value(other)
            .map_err(|e| DriverError::serialization(format!("Invalid error entry: {}", e))),
    }
}

fn decode_data(data: &Json, registry: &CodecRegistry) -> DriverResult<ResponseData> {
    let Json::Object(map) = data else {
        return Err(DriverError::serialization(format!(
            "'data' must be an object, got {}",
            json_type(data)
        )));
    };
    let document = match map.get("document") {
        Some(Json::Null) | None => None,
        Some(doc) => Some(registry.decode_document(doc)?),
    };
    let documents = match map.get("documents") {
        Some(Json::Array(items)) => Some(
            items
                .iter()
                .map(|d| registry.decode_document(d))
                .collect::<DriverResult<Vec<_>>>()?,
        ),
        Some(Json::Null) | None => None,
        Some(other) => {
            return Err(DriverError::serialization(format!(
                "'data.documents' must be an array, got {}",
                json_type(other)
            )))
        }
    };
    let next_page_state = match map.get("nextPageState") {
        Some(Json::String(token)) => Some(token.clone()),
        _ => None,
    };
    Ok(ResponseData {
        document,
        documents,
        next_page_state,
    })
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

//! Projection of generic documents onto statically-typed records.
//!
//! Decoding is explicit: a record implements `FromDocument`, usually with the
//! `Projection` helper, which matches field names case-insensitively, ignores
//! unknown fields and leaves missing ones at `Default::default()`.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Number, Value as Json};
use std::collections::HashMap;
use uuid::Uuid;

use super::codec::CodecRegistry;
use super::error::{DriverError, DriverResult};
use super::scalar::{DataVector, Hybrid, ObjectId};
use super::value::{Document, Value};

/// Conversion from a single `Value`.
pub trait FromValue: Sized {
    fn from_value(value: &Value) -> DriverResult<Self>;
}

fn expected(what: &str, value: &Value) -> DriverError {
    DriverError::serialization(format!("Expected {}, found {} ({:?})", what, value.type_name(), value))
}

impl FromValue for Value {
    fn from_value(value: &Value) -> DriverResult<Self> {
        Ok(value.clone())
    }
}

impl FromValue for bool {
    fn from_value(value: &Value) -> DriverResult<Self> {
        value.as_bool().ok_or_else(|| expected("bool", value))
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> DriverResult<Self> {
        match value {
            Value::String(s) => Ok(s.clone()),
            Value::Hybrid(Hybrid::Text(s)) => Ok(s.clone()),
            other => Err(expected("string", other)),
        }
    }
}

impl FromValue for Number {
    fn from_value(value: &Value) -> DriverResult<Self> {
        match value {
            Value::Number(n) => Ok(n.clone()),
            other => Err(expected("number", other)),
        }
    }
}

macro_rules! impl_from_value_int {
    ($($t:ty),*) => {
        $(
            impl FromValue for $t {
                fn from_value(value: &Value) -> DriverResult<Self> {
                    value
                        .as_i64()
                        .and_then(|n| <$t>::try_from(n).ok())
                        .ok_or_else(|| expected(stringify!($t), value))
                }
            }
        )*
    };
}

impl_from_value_int!(i8, i16, i32, i64, u8, u16, u32, usize);

impl FromValue for u64 {
    fn from_value(value: &Value) -> DriverResult<Self> {
        match value {
            Value::Number(n) => n.as_u64().ok_or_else(|| expected("u64", value)),
            other => Err(expected("u64", other)),
        }
    }
}

impl FromValue for f64 {
    fn from_value(value: &Value) -> DriverResult<Self> {
        match value {
            Value::Number(n) => n.as_f64().ok_or_else(|| expected("f64", value)),
            Value::String(s) => match s.as_str() {
                "NaN" => Ok(f64::NAN),
                "Infinity" => Ok(f64::INFINITY),
                "-Infinity" => Ok(f64::NEG_INFINITY),
                _ => Err(expected("f64", value)),
            },
            other => Err(expected("f64", other)),
        }
    }
}

impl FromValue for f32 {
    fn from_value(value: &Value) -> DriverResult<Self> {
        f64::from_value(value).map(|v| v as f32)
    }
}

impl FromValue for Uuid {
    fn from_value(value: &Value) -> DriverResult<Self> {
        match value {
            Value::Uuid(id) => Ok(*id),
            Value::String(s) => Uuid::parse_str(s).map_err(|_| expected("uuid", value)),
            other => Err(expected("uuid", other)),
        }
    }
}

impl FromValue for ObjectId {
    fn from_value(value: &Value) -> DriverResult<Self> {
        match value {
            Value::ObjectId(id) => Ok(*id),
            Value::String(s) => s.parse(),
            other => Err(expected("objectId", other)),
        }
    }
}

impl FromValue for DateTime<Utc> {
    fn from_value(value: &Value) -> DriverResult<Self> {
        match value {
            Value::Date(ts) => Ok(*ts),
            // Table timestamp columns come back as plain ISO-8601 strings
            Value::String(s) => DateTime::parse_from_rfc3339(s)
                .map(|d| d.with_timezone(&Utc))
                .map_err(|_| expected("date", value)),
            other => Err(expected("date", other)),
        }
    }
}

impl FromValue for DataVector {
    fn from_value(value: &Value) -> DriverResult<Self> {
        match value {
            Value::Vector(v) => Ok(v.clone()),
            Value::Bytes(b) => DataVector::from_be_bytes(b),
            Value::List(items) => items
                .iter()
                .map(f32::from_value)
                .collect::<DriverResult<Vec<_>>>()
                .map(DataVector),
            Value::Document(doc) => match doc.get(super::codec::TAG_BINARY) {
                Some(Value::String(encoded)) => DataVector::from_base64(encoded),
                _ => Err(expected("vector", value)),
            },
            other => Err(expected("vector", other)),
        }
    }
}

impl FromValue for Hybrid {
    fn from_value(value: &Value) -> DriverResult<Self> {
        match value {
            Value::Hybrid(h) => Ok(h.clone()),
            Value::String(s) => Ok(Hybrid::Text(s.clone())),
            other => Err(expected("hybrid", other)),
        }
    }
}

impl FromValue for Document {
    fn from_value(value: &Value) -> DriverResult<Self> {
        match value {
            Value::Document(doc) => Ok(doc.clone()),
            other => Err(expected("document", other)),
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value) -> DriverResult<Self> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

impl<T: FromValue> FromValue for Vec<T> {
    fn from_value(value: &Value) -> DriverResult<Self> {
        match value {
            Value::List(items) | Value::Set(items) => items.iter().map(T::from_value).collect(),
            other => Err(expected("list", other)),
        }
    }
}

impl<T: FromValue> FromValue for HashMap<String, T> {
    fn from_value(value: &Value) -> DriverResult<Self> {
        match value {
            Value::Document(doc) => doc
                .iter()
                .map(|(k, v)| Ok((k.to_string(), T::from_value(v)?)))
                .collect(),
            Value::Map(entries) => entries
                .iter()
                .map(|(k, v)| Ok((String::from_value(k)?, T::from_value(v)?)))
                .collect(),
            other => Err(expected("map", other)),
        }
    }
}

/// Conversion from a whole document (one result row).
pub trait FromDocument: Sized {
    fn from_document(doc: Document, registry: &CodecRegistry) -> DriverResult<Self>;
}

impl FromDocument for Document {
    fn from_document(doc: Document, _registry: &CodecRegistry) -> DriverResult<Self> {
        Ok(doc)
    }
}

/// Conversion into a document for writes.
pub trait IntoDocument {
    fn into_document(self, registry: &CodecRegistry) -> DriverResult<Document>;
}

impl IntoDocument for Document {
    fn into_document(self, _registry: &CodecRegistry) -> DriverResult<Document> {
        Ok(self)
    }
}

/// Field reader over a borrowed document.
pub struct Projection<'a> {
    doc: &'a Document,
}

impl<'a> Projection<'a> {
    pub fn new(doc: &'a Document) -> Self {
        Self { doc }
    }

    /// Field value, or `T::default()` when absent or null.
    pub fn get<T: FromValue + Default>(&self, name: &str) -> DriverResult<T> {
        Ok(self.get_opt(name)?.unwrap_or_default())
    }

    pub fn get_opt<T: FromValue>(&self, name: &str) -> DriverResult<Option<T>> {
        match self.doc.get_ignore_case(name) {
            None | Some(Value::Null) => Ok(None),
            Some(v) => T::from_value(v)
                .map(Some)
                .map_err(|e| DriverError::serialization(format!("Field '{}': {}", name, e))),
        }
    }

    /// Field value; absence is an error.
    pub fn require<T: FromValue>(&self, name: &str) -> DriverResult<T> {
        self.get_opt(name)?
            .ok_or_else(|| DriverError::serialization(format!("Missing required field '{}'", name)))
    }
}

/// Adapter for serde types.
///
/// Reading goes through the registry's plain JSON view, so dates arrive as
/// ISO-8601 strings and ids as strings. Rows are read the way `Projection`
/// reads them: keys match case-insensitively, unknown keys are ignored, and
/// fields the row lacks keep their `T::default()` value.
///
/// Writing decodes the serialized form with the handle's registry, so bound
/// vector fields become vectors.
#[derive(Debug, Clone, PartialEq)]
pub struct Serde<T>(pub T);

impl<T> Serde<T> {
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T: DeserializeOwned + Serialize + Default> FromDocument for Serde<T> {
    fn from_document(doc: Document, registry: &CodecRegistry) -> DriverResult<Self> {
        let plain = registry.to_plain_json(&Value::Document(doc));
        let merged = match (serde_json::to_value(T::default())?, plain) {
            (Json::Object(mut fields), Json::Object(row)) => {
                overlay(&mut fields, row);
                Json::Object(fields)
            }
            (_, plain) => plain,
        };
        serde_json::from_value(merged)
            .map(Serde)
            .map_err(|e| DriverError::serialization(format!("Cannot decode document: {}", e)))
    }
}

/// Copy row values onto the default's fields, matching names exactly first
/// and case-insensitively otherwise.
fn overlay(fields: &mut Map<String, Json>, row: Map<String, Json>) {
    for (key, value) in row {
        if let Some(slot) = fields.get_mut(&key) {
            *slot = value;
            continue;
        }
        if let Some(slot) = fields
            .iter_mut()
            .find(|(name, _)| name.eq_ignore_ascii_case(&key))
            .map(|(_, slot)| slot)
        {
            *slot = value;
        }
    }
}

impl<T: Serialize> IntoDocument for Serde<T> {
    fn into_document(self, registry: &CodecRegistry) -> DriverResult<Document> {
        let json = serde_json::to_value(&self.0)?;
        match registry.decode_value(&json)? {
            Value::Document(doc) => Ok(doc),
            other => Err(DriverError::serialization(format!(
                "Expected an object to build a document, found {}",
                other.type_name()
            ))),
        }
    }
}

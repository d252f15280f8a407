//! Typed value codec
//!
//! Converts between `Document`/`Value` and wire JSON. Extended scalars are
//! handled by `ScalarCodec`s held in a `CodecRegistry`. A codec claims either
//! a wire tag (`{"$date": ...}`) or a reserved field name (`$vector`), and is
//! looked up by `ScalarKind` on the encode side.
//!
//! Vectors and hybrids carry no tag, so on the decode side they are
//! recognized by field name only: the reserved `$vector`/`$hybrid` names, plus
//! whatever fields the registry has bound to those kinds (table vector
//! columns, for instance).
//!
//! The registry is an explicit value: build one at start-up, share it through
//! an `Arc`, and pass `&CodecRegistry` to every encode/decode call.
//! `CodecRegistry::global()` exists for callers that want a process-wide
//! default; it is initialized once and read-only afterwards.

use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use once_cell::sync::OnceCell;
use serde_json::{Map, Value as Json};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

use super::error::{DriverError, DriverResult};
use super::scalar::{DataVector, Hybrid, ObjectId};
use super::value::{Document, Value};

pub const TAG_DATE: &str = "$date";
pub const TAG_UUID: &str = "$uuid";
pub const TAG_OBJECT_ID: &str = "$objectId";
pub const TAG_BINARY: &str = "$binary";
pub const FIELD_VECTOR: &str = "$vector";
pub const FIELD_VECTORIZE: &str = "$vectorize";
pub const FIELD_LEXICAL: &str = "$lexical";
pub const FIELD_HYBRID: &str = "$hybrid";

/// Extended scalar kinds that need a custom wire form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarKind {
    Date,
    Uuid,
    ObjectId,
    Binary,
    Vector,
    Hybrid,
}

impl Value {
    pub fn scalar_kind(&self) -> Option<ScalarKind> {
        match self {
            Value::Date(_) => Some(ScalarKind::Date),
            Value::Uuid(_) => Some(ScalarKind::Uuid),
            Value::ObjectId(_) => Some(ScalarKind::ObjectId),
            Value::Bytes(_) => Some(ScalarKind::Binary),
            Value::Vector(_) => Some(ScalarKind::Vector),
            Value::Hybrid(_) => Some(ScalarKind::Hybrid),
            _ => None,
        }
    }
}

/// Wire form for vectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VectorEncoding {
    #[default]
    Array,
    /// `{"$binary": "<base64 big-endian f32>"}`
    Binary,
}

/// Wire form for points in time inside `$date`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DateEncoding {
    /// ISO-8601, truncated to milliseconds
    #[default]
    Iso8601,
    EpochMillis,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CodecOptions {
    pub vector_encoding: VectorEncoding,
    pub date_encoding: DateEncoding,
}

/// Encoder/decoder pair for one extended scalar kind.
pub trait ScalarCodec: Send + Sync + fmt::Debug {
    fn kind(&self) -> ScalarKind;

    /// Tag this codec decodes when it appears as the single key of an object.
    fn wire_tag(&self) -> Option<&'static str> {
        None
    }

    /// Document field whose value this codec always decodes.
    fn field_name(&self) -> Option<&'static str> {
        None
    }

    fn encode(&self, value: &Value, options: &CodecOptions) -> DriverResult<Json>;

    /// For tagged codecs `wire` is the tag's inner value, for field-bound
    /// codecs it is the whole field value.
    fn decode(&self, wire: &Json, options: &CodecOptions) -> DriverResult<Value>;
}

fn mismatch(kind: ScalarKind, value: &Value) -> DriverError {
    DriverError::serialization(format!(
        "{:?} codec cannot encode a {} value",
        kind,
        value.type_name()
    ))
}

fn tagged(tag: &str, inner: Json) -> Json {
    let mut map = Map::with_capacity(1);
    map.insert(tag.to_string(), inner);
    Json::Object(map)
}

#[derive(Debug)]
struct DateCodec;

impl ScalarCodec for DateCodec {
    fn kind(&self) -> ScalarKind {
        ScalarKind::Date
    }

    fn wire_tag(&self) -> Option<&'static str> {
        Some(TAG_DATE)
    }

    fn encode(&self, value: &Value, options: &CodecOptions) -> DriverResult<Json> {
        let Value::Date(ts) = value else {
            return Err(mismatch(self.kind(), value));
        };
        let inner = match options.date_encoding {
            DateEncoding::Iso8601 => Json::String(ts.to_rfc3339_opts(SecondsFormat::Millis, true)),
            DateEncoding::EpochMillis => Json::from(ts.timestamp_millis()),
        };
        Ok(tagged(TAG_DATE, inner))
    }

    fn decode(&self, wire: &Json, _options: &CodecOptions) -> DriverResult<Value> {
        let ts = match wire {
            Json::Number(n) => n
                .as_i64()
                .and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
            Json::String(s) => DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|d| d.with_timezone(&Utc)),
            _ => None,
        };
        ts.map(Value::Date)
            .ok_or_else(|| DriverError::serialization(format!("Invalid $date value: {}", wire)))
    }
}

#[derive(Debug)]
struct UuidCodec;

impl ScalarCodec for UuidCodec {
    fn kind(&self) -> ScalarKind {
        ScalarKind::Uuid
    }

    fn wire_tag(&self) -> Option<&'static str> {
        Some(TAG_UUID)
    }

    fn encode(&self, value: &Value, _options: &CodecOptions) -> DriverResult<Json> {
        match value {
            Value::Uuid(id) => Ok(tagged(TAG_UUID, Json::String(id.to_string()))),
            other => Err(mismatch(self.kind(), other)),
        }
    }

    fn decode(&self, wire: &Json, _options: &CodecOptions) -> DriverResult<Value> {
        wire.as_str()
            .and_then(|s| Uuid::parse_str(s).ok())
            .map(Value::Uuid)
            .ok_or_else(|| DriverError::serialization(format!("Invalid $uuid value: {}", wire)))
    }
}

#[derive(Debug)]
struct ObjectIdCodec;

impl ScalarCodec for ObjectIdCodec {
    fn kind(&self) -> ScalarKind {
        ScalarKind::ObjectId
    }

    fn wire_tag(&self) -> Option<&'static str> {
        Some(TAG_OBJECT_ID)
    }

    fn encode(&self, value: &Value, _options: &CodecOptions) -> DriverResult<Json> {
        match value {
            Value::ObjectId(id) => Ok(tagged(TAG_OBJECT_ID, Json::String(id.to_hex()))),
            other => Err(mismatch(self.kind(), other)),
        }
    }

    fn decode(&self, wire: &Json, _options: &CodecOptions) -> DriverResult<Value> {
        let hex = wire
            .as_str()
            .ok_or_else(|| DriverError::serialization(format!("Invalid $objectId value: {}", wire)))?;
        Ok(Value::ObjectId(hex.parse::<ObjectId>()?))
    }
}

#[derive(Debug)]
struct BinaryCodec;

impl ScalarCodec for BinaryCodec {
    fn kind(&self) -> ScalarKind {
        ScalarKind::Binary
    }

    fn wire_tag(&self) -> Option<&'static str> {
        Some(TAG_BINARY)
    }

    fn encode(&self, value: &Value, _options: &CodecOptions) -> DriverResult<Json> {
        match value {
            Value::Bytes(bytes) => Ok(tagged(TAG_BINARY, Json::String(STANDARD.encode(bytes)))),
            other => Err(mismatch(self.kind(), other)),
        }
    }

    fn decode(&self, wire: &Json, _options: &CodecOptions) -> DriverResult<Value> {
        let encoded = wire
            .as_str()
            .ok_or_else(|| DriverError::serialization(format!("Invalid $binary value: {}", wire)))?;
        STANDARD
            .decode(encoded)
            .map(Value::Bytes)
            .map_err(|e| DriverError::serialization(format!("Invalid $binary value: {}", e)))
    }
}

#[derive(Debug)]
struct VectorCodec;

impl ScalarCodec for VectorCodec {
    fn kind(&self) -> ScalarKind {
        ScalarKind::Vector
    }

    fn field_name(&self) -> Option<&'static str> {
        Some(FIELD_VECTOR)
    }

    fn encode(&self, value: &Value, options: &CodecOptions) -> DriverResult<Json> {
        let Value::Vector(vector) = value else {
            return Err(mismatch(self.kind(), value));
        };
        match options.vector_encoding {
            VectorEncoding::Binary => Ok(tagged(TAG_BINARY, Json::String(vector.to_base64()))),
            VectorEncoding::Array => {
                let mut items = Vec::with_capacity(vector.dimension());
                for (i, v) in vector.as_slice().iter().enumerate() {
                    let n = serde_json::Number::from_f64(*v as f64).ok_or_else(|| {
                        DriverError::serialization(format!(
                            "Vector component {} is not finite ({})",
                            i, v
                        ))
                    })?;
                    items.push(Json::Number(n));
                }
                Ok(Json::Array(items))
            }
        }
    }

    fn decode(&self, wire: &Json, _options: &CodecOptions) -> DriverResult<Value> {
        match wire {
            Json::Array(items) => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    let v = item.as_f64().ok_or_else(|| {
                        DriverError::serialization(format!("Invalid vector component: {}", item))
                    })?;
                    values.push(v as f32);
                }
                Ok(Value::Vector(DataVector(values)))
            }
            Json::Object(map) => match map.get(TAG_BINARY).and_then(Json::as_str) {
                Some(encoded) => Ok(Value::Vector(DataVector::from_base64(encoded)?)),
                None => Err(DriverError::serialization(format!(
                    "Invalid vector value: {}",
                    wire
                ))),
            },
            Json::Null => Ok(Value::Null),
            other => Err(DriverError::serialization(format!(
                "Invalid vector value: {}",
                other
            ))),
        }
    }
}

#[derive(Debug)]
struct HybridCodec;

impl ScalarCodec for HybridCodec {
    fn kind(&self) -> ScalarKind {
        ScalarKind::Hybrid
    }

    fn field_name(&self) -> Option<&'static str> {
        Some(FIELD_HYBRID)
    }

    fn encode(&self, value: &Value, _options: &CodecOptions) -> DriverResult<Json> {
        match value {
            Value::Hybrid(Hybrid::Text(text)) => Ok(Json::String(text.clone())),
            Value::Hybrid(Hybrid::Parts { vectorize, lexical }) => {
                let mut map = Map::with_capacity(2);
                map.insert(FIELD_VECTORIZE.to_string(), Json::String(vectorize.clone()));
                map.insert(FIELD_LEXICAL.to_string(), Json::String(lexical.clone()));
                Ok(Json::Object(map))
            }
            other => Err(mismatch(self.kind(), other)),
        }
    }

    fn decode(&self, wire: &Json, _options: &CodecOptions) -> DriverResult<Value> {
        match wire {
            Json::String(text) => Ok(Value::Hybrid(Hybrid::Text(text.clone()))),
            Json::Object(map) => {
                let part = |key: &str| {
                    map.get(key)
                        .and_then(Json::as_str)
                        .map(str::to_string)
                        .ok_or_else(|| {
                            DriverError::serialization(format!("Hybrid value is missing '{}'", key))
                        })
                };
                Ok(Value::Hybrid(Hybrid::Parts {
                    vectorize: part(FIELD_VECTORIZE)?,
                    lexical: part(FIELD_LEXICAL)?,
                }))
            }
            Json::Null => Ok(Value::Null),
            other => Err(DriverError::serialization(format!(
                "Invalid hybrid value: {}",
                other
            ))),
        }
    }
}

static GLOBAL_REGISTRY: OnceCell<Arc<CodecRegistry>> = OnceCell::new();

/// Registry of extended scalar codecs plus process-level encoding switches.
#[derive(Debug, Clone)]
pub struct CodecRegistry {
    options: CodecOptions,
    codecs: Vec<Arc<dyn ScalarCodec>>,
    /// Ordinary field names decoded as vectors or hybrids, at any depth
    bound_fields: HashMap<String, ScalarKind>,
}

impl Default for CodecRegistry {
    fn default() -> Self {
        Self::new(CodecOptions::default())
    }
}

impl CodecRegistry {
    /// Registry with every built-in codec.
    pub fn new(options: CodecOptions) -> Self {
        Self {
            options,
            codecs: vec![
                Arc::new(DateCodec),
                Arc::new(UuidCodec),
                Arc::new(ObjectIdCodec),
                Arc::new(BinaryCodec),
                Arc::new(VectorCodec),
                Arc::new(HybridCodec),
            ],
            bound_fields: HashMap::new(),
        }
    }

    /// Replace the codec for `codec.kind()`.
    pub fn register(mut self, codec: Arc<dyn ScalarCodec>) -> Self {
        self.codecs.retain(|c| c.kind() != codec.kind());
        self.codecs.push(codec);
        self
    }

    pub fn with_vector_encoding(mut self, encoding: VectorEncoding) -> Self {
        self.options.vector_encoding = encoding;
        self
    }

    pub fn with_date_encoding(mut self, encoding: DateEncoding) -> Self {
        self.options.date_encoding = encoding;
        self
    }

    pub fn options(&self) -> &CodecOptions {
        &self.options
    }

    /// Decode these fields as vectors wherever they appear.
    pub fn with_vector_fields<I, S>(self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.bind_fields(fields, ScalarKind::Vector)
    }

    /// Decode these fields as hybrid sort values wherever they appear.
    pub fn with_hybrid_fields<I, S>(self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.bind_fields(fields, ScalarKind::Hybrid)
    }

    fn bind_fields<I, S>(mut self, fields: I, kind: ScalarKind) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for field in fields {
            self.bound_fields.insert(field.into(), kind);
        }
        self
    }

    /// Kind a field decodes to by name alone, if any.
    pub fn field_kind(&self, field: &str) -> Option<ScalarKind> {
        self.by_field(field)
            .map(|c| c.kind())
            .or_else(|| self.bound_fields.get(field).copied())
    }

    /// Install the process-wide registry. Fails, handing the registry back,
    /// if one is already in place (including the default created by an
    /// earlier `global()` call).
    pub fn install_global(registry: CodecRegistry) -> Result<(), CodecRegistry> {
        GLOBAL_REGISTRY
            .set(Arc::new(registry))
            .map_err(|rejected| (*rejected).clone())
    }

    pub fn global() -> Arc<CodecRegistry> {
        GLOBAL_REGISTRY
            .get_or_init(|| Arc::new(CodecRegistry::default()))
            .clone()
    }

    fn by_kind(&self, kind: ScalarKind) -> Option<&Arc<dyn ScalarCodec>> {
        self.codecs.iter().find(|c| c.kind() == kind)
    }

    fn by_tag(&self, tag: &str) -> Option<&Arc<dyn ScalarCodec>> {
        self.codecs.iter().find(|c| c.wire_tag() == Some(tag))
    }

    fn by_field(&self, field: &str) -> Option<&Arc<dyn ScalarCodec>> {
        self.codecs.iter().find(|c| c.field_name() == Some(field))
    }

    fn field_codec(&self, field: &str) -> Option<&Arc<dyn ScalarCodec>> {
        self.by_field(field).or_else(|| {
            self.bound_fields
                .get(field)
                .and_then(|kind| self.by_kind(*kind))
        })
    }

    // ========================================================================
    // Encoding
    // ========================================================================

    pub fn encode_document(&self, doc: &Document) -> DriverResult<Json> {
        let mut map = Map::with_capacity(doc.len());
        for (key, value) in doc.iter() {
            if key.is_empty() {
                return Err(DriverError::serialization("Empty field name in document"));
            }
            if value.is_null() && !doc.includes_nulls() {
                continue;
            }
            let encoded = self
                .encode_value(value)
                .map_err(|e| DriverError::serialization(format!("Field '{}': {}", key, strip(e))))?;
            map.insert(key.to_string(), encoded);
        }
        Ok(Json::Object(map))
    }

    pub fn encode_value(&self, value: &Value) -> DriverResult<Json> {
        if let Some(kind) = value.scalar_kind() {
            let codec = self.by_kind(kind).ok_or_else(|| {
                DriverError::serialization(format!("No codec registered for {:?}", kind))
            })?;
            return codec.encode(value, &self.options);
        }
        Ok(match value {
            Value::Null => Json::Null,
            Value::Bool(b) => Json::Bool(*b),
            Value::Number(n) => Json::Number(n.clone()),
            Value::String(s) => Json::String(s.clone()),
            Value::List(items) | Value::Set(items) => Json::Array(
                items
                    .iter()
                    .map(|v| self.encode_value(v))
                    .collect::<DriverResult<Vec<_>>>()?,
            ),
            Value::Map(entries) => self.encode_map(entries)?,
            Value::Document(doc) => self.encode_document(doc)?,
            // Scalars were handled above
            other => return Err(mismatch_any(other)),
        })
    }

    /// String-keyed maps become objects, anything else an array of pairs.
    fn encode_map(&self, entries: &[(Value, Value)]) -> DriverResult<Json> {
        if entries.iter().all(|(k, _)| matches!(k, Value::String(_))) {
            let mut map = Map::with_capacity(entries.len());
            for (k, v) in entries {
                if let Value::String(key) = k {
                    map.insert(key.clone(), self.encode_value(v)?);
                }
            }
            return Ok(Json::Object(map));
        }
        let mut pairs = Vec::with_capacity(entries.len());
        for (k, v) in entries {
            pairs.push(Json::Array(vec![self.encode_value(k)?, self.encode_value(v)?]));
        }
        Ok(Json::Array(pairs))
    }

    // ========================================================================
    // Decoding
    // ========================================================================

    pub fn decode_document(&self, wire: &Json) -> DriverResult<Document> {
        let Json::Object(map) = wire else {
            return Err(DriverError::serialization(format!(
                "Expected a JSON object, got {}",
                json_type(wire)
            )));
        };
        let mut doc = Document::with_capacity(map.len());
        for (key, field) in map {
            doc.insert(key.clone(), self.decode_field(key, field)?);
        }
        Ok(doc)
    }

    /// Decode the value of field `name`. Reserved and bound names go to
    /// their codec; anything else is decoded by shape.
    pub fn decode_field(&self, name: &str, wire: &Json) -> DriverResult<Value> {
        match self.field_codec(name) {
            Some(codec) => codec
                .decode(wire, &self.options)
                .map_err(|e| DriverError::serialization(format!("Field '{}': {}", name, strip(e)))),
            None => self.decode_value(wire),
        }
    }

    /// Decode a value by shape. Untagged vectors and hybrids only come back
    /// typed through `decode_field`/`decode_document`.
    pub fn decode_value(&self, wire: &Json) -> DriverResult<Value> {
        Ok(match wire {
            Json::Null => Value::Null,
            Json::Bool(b) => Value::Bool(*b),
            Json::Number(n) => Value::Number(n.clone()),
            Json::String(s) => Value::String(s.clone()),
            Json::Array(items) => Value::List(
                items
                    .iter()
                    .map(|v| self.decode_value(v))
                    .collect::<DriverResult<Vec<_>>>()?,
            ),
            Json::Object(map) => {
                if map.len() == 1 {
                    if let Some((tag, inner)) = map.iter().next() {
                        if let Some(codec) = self.by_tag(tag) {
                            return codec.decode(inner, &self.options);
                        }
                    }
                }
                Value::Document(self.decode_document(wire)?)
            }
        })
    }

    /// Plain JSON view: extended scalars as their natural JSON form (dates
    /// as ISO strings, ids as strings, vectors as arrays, bytes as base64).
    /// Used to hand documents to serde-based types.
    pub fn to_plain_json(&self, value: &Value) -> Json {
        match value {
            Value::Null => Json::Null,
            Value::Bool(b) => Json::Bool(*b),
            Value::Number(n) => Json::Number(n.clone()),
            Value::String(s) => Json::String(s.clone()),
            Value::Bytes(b) => Json::String(STANDARD.encode(b)),
            Value::List(items) | Value::Set(items) => {
                Json::Array(items.iter().map(|v| self.to_plain_json(v)).collect())
            }
            Value::Map(entries) => Json::Array(
                entries
                    .iter()
                    .map(|(k, v)| Json::Array(vec![self.to_plain_json(k), self.to_plain_json(v)]))
                    .collect(),
            ),
            Value::Document(doc) => Json::Object(
                doc.iter()
                    .map(|(k, v)| (k.to_string(), self.to_plain_json(v)))
                    .collect(),
            ),
            Value::Date(ts) => Json::String(ts.to_rfc3339_opts(SecondsFormat::Millis, true)),
            Value::Uuid(id) => Json::String(id.to_string()),
            Value::ObjectId(id) => Json::String(id.to_hex()),
            Value::Vector(v) => Json::Array(
                v.as_slice()
                    .iter()
                    .map(|f| serde_json::Number::from_f64(*f as f64).map_or(Json::Null, Json::Number))
                    .collect(),
            ),
            Value::Hybrid(parts) => self
                .by_kind(ScalarKind::Hybrid)
                .and_then(|codec| codec.encode(&Value::Hybrid(parts.clone()), &self.options).ok())
                .unwrap_or(Json::Null),
        }
    }
}

fn mismatch_any(value: &Value) -> DriverError {
    DriverError::serialization(format!("Cannot encode {} value", value.type_name()))
}

fn strip(err: DriverError) -> String {
    match err {
        DriverError::Serialization(msg) => msg,
        other => other.to_string(),
    }
}

pub(crate) fn json_type(wire: &Json) -> &'static str {
    match wire {
        Json::Null => "null",
        Json::Bool(_) => "boolean",
        Json::Number(_) => "number",
        Json::String(_) => "string",
        Json::Array(_) => "array",
        Json::Object(_) => "object",
    }
}

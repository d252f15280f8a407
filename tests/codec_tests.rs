//! Typed Value Codec Tests
//!
//! Tests for:
//! - Round trips of every extended scalar kind
//! - Stable, idempotent document encoding
//! - Literal-preserving numbers
//! - Typed projection into static shapes

use chrono::{TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use dataapi_client::protocol::codec::{DateEncoding, VectorEncoding};
use dataapi_client::protocol::{uuid_kind, UuidKind};
use dataapi_client::{
    CodecRegistry, DataVector, Document, DriverError, FromDocument, Hybrid, IntoDocument,
    ObjectId, Projection, Serde, Value,
};

fn round_trip(registry: &CodecRegistry, doc: &Document) -> Document {
    let wire = registry.encode_document(doc).unwrap();
    let text = serde_json::to_string(&wire).unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&text).unwrap();
    registry.decode_document(&parsed).unwrap()
}

// ============================================================================
// Round trips
// ============================================================================

#[test]
fn test_round_trip_date_with_millis() {
    let registry = CodecRegistry::default();
    let ts = Utc.timestamp_millis_opt(1_718_000_123_456).unwrap();
    let doc = Document::new().with("at", ts);
    assert_eq!(round_trip(&registry, &doc), doc);

    let millis = CodecRegistry::default().with_date_encoding(DateEncoding::EpochMillis);
    assert_eq!(round_trip(&millis, &doc), doc);
}

#[test]
fn test_round_trip_uuids() {
    let registry = CodecRegistry::default();
    let v7 = Uuid::now_v7();
    let v4 = Uuid::new_v4();
    let doc = Document::new().with("a", v7).with("b", v4);
    let back = round_trip(&registry, &doc);
    assert_eq!(back, doc);

    match back.get("a") {
        Some(Value::Uuid(id)) => assert_eq!(uuid_kind(id), UuidKind::TimeOrdered),
        other => panic!("expected uuid, got {:?}", other),
    }
    match back.get("b") {
        Some(Value::Uuid(id)) => assert_eq!(uuid_kind(id), UuidKind::Random),
        other => panic!("expected uuid, got {:?}", other),
    }
}

#[test]
fn test_round_trip_object_id() {
    let registry = CodecRegistry::default();
    let id = ObjectId::new();
    let doc = Document::new().with("_id", id);
    let wire = registry.encode_document(&doc).unwrap();
    assert_eq!(wire, json!({"_id": {"$objectId": id.to_hex()}}));
    assert_eq!(round_trip(&registry, &doc), doc);
}

#[test]
fn test_round_trip_vector_both_encodings() {
    let doc = Document::new()
        .with("text", "hello")
        .with("$vector", DataVector::new(vec![0.1, -0.25, 3.5]));

    let array = CodecRegistry::default();
    assert_eq!(round_trip(&array, &doc), doc);

    let binary = CodecRegistry::default().with_vector_encoding(VectorEncoding::Binary);
    let wire = binary.encode_document(&doc).unwrap();
    assert!(wire["$vector"]["$binary"].is_string());
    assert_eq!(round_trip(&binary, &doc), doc);
}

#[test]
fn test_round_trip_hybrid() {
    let registry = CodecRegistry::default();
    let text = Document::new().with("$hybrid", Hybrid::Text("red shoes".to_string()));
    assert_eq!(round_trip(&registry, &text), text);

    let parts = Document::new().with(
        "$hybrid",
        Hybrid::Parts {
            vectorize: "comfortable red shoes".to_string(),
            lexical: "red shoes".to_string(),
        },
    );
    let wire = registry.encode_document(&parts).unwrap();
    assert_eq!(
        wire,
        json!({"$hybrid": {"$vectorize": "comfortable red shoes", "$lexical": "red shoes"}})
    );
    assert_eq!(round_trip(&registry, &parts), parts);
}

#[test]
fn test_round_trip_bytes_and_nested() {
    let registry = CodecRegistry::default();
    let doc = Document::new()
        .with("blob", Value::Bytes(vec![0, 1, 2, 254, 255]))
        .with(
            "nested",
            Document::new()
                .with("when", Utc.timestamp_millis_opt(0).unwrap())
                .with("tags", vec!["a", "b"]),
        );
    assert_eq!(round_trip(&registry, &doc), doc);
}

// ============================================================================
// Encoding stability
// ============================================================================

#[test]
fn test_encode_is_idempotent_and_ordered() {
    let registry = CodecRegistry::default();
    let doc = Document::new()
        .with("zeta", 1)
        .with("alpha", "x")
        .with("mid", Document::new().with("b", 2).with("a", 1));

    let first = serde_json::to_string(&registry.encode_document(&doc).unwrap()).unwrap();
    let second = serde_json::to_string(&registry.encode_document(&doc).unwrap()).unwrap();
    assert_eq!(first, second);
    assert_eq!(first, r#"{"zeta":1,"alpha":"x","mid":{"b":2,"a":1}}"#);
}

#[test]
fn test_large_numbers_keep_their_literal() {
    let registry = CodecRegistry::default();
    let wire: serde_json::Value =
        serde_json::from_str(r#"{"big":123456789012345678901234567890,"dec":0.1000000000000000055511151231257827}"#)
            .unwrap();
    let doc = registry.decode_document(&wire).unwrap();
    let text = serde_json::to_string(&registry.encode_document(&doc).unwrap()).unwrap();
    assert_eq!(
        text,
        r#"{"big":123456789012345678901234567890,"dec":0.1000000000000000055511151231257827}"#
    );

    let literal = Value::decimal("98765432109876543210.000000001").unwrap();
    let encoded = registry.encode_value(&literal).unwrap();
    assert_eq!(encoded.to_string(), "98765432109876543210.000000001");
}

#[test]
fn test_non_finite_floats_become_strings() {
    assert_eq!(Value::from(f64::NAN), Value::from("NaN"));
    assert_eq!(Value::from(f64::INFINITY), Value::from("Infinity"));
    assert_eq!(Value::from(f64::NEG_INFINITY), Value::from("-Infinity"));
}

#[test]
fn test_empty_field_name_rejected() {
    let registry = CodecRegistry::default();
    let doc = Document::new().with("", 1);
    assert!(matches!(
        registry.encode_document(&doc),
        Err(DriverError::Serialization(_))
    ));
}

#[test]
fn test_sets_encode_as_arrays() {
    let registry = CodecRegistry::default();
    let doc = Document::new().with("s", Value::Set(vec![Value::from(1), Value::from(2)]));
    assert_eq!(registry.encode_document(&doc).unwrap(), json!({"s": [1, 2]}));
}

// ============================================================================
// Projection
// ============================================================================

#[derive(Debug, Default, PartialEq)]
struct Person {
    name: String,
    age: i32,
    email: Option<String>,
    joined: Option<chrono::DateTime<Utc>>,
}

impl FromDocument for Person {
    fn from_document(doc: Document, _registry: &CodecRegistry) -> Result<Self, DriverError> {
        let p = Projection::new(&doc);
        Ok(Person {
            name: p.require("name")?,
            age: p.get("age")?,
            email: p.get_opt("email")?,
            joined: p.get_opt("joined")?,
        })
    }
}

#[test]
fn test_projection_tolerates_case_unknown_and_missing() {
    let registry = CodecRegistry::default();
    let wire = json!({
        "NAME": "Ada",
        "unknown": {"x": 1},
        "joined": {"$date": "2024-01-02T03:04:05.006Z"}
    });
    let doc = registry.decode_document(&wire).unwrap();
    let person = Person::from_document(doc, &registry).unwrap();
    assert_eq!(person.name, "Ada");
    assert_eq!(person.age, 0);
    assert_eq!(person.email, None);
    assert_eq!(
        person.joined,
        Some(Utc.timestamp_millis_opt(1_704_164_645_006).unwrap())
    );
}

#[test]
fn test_projection_reports_offending_field() {
    let registry = CodecRegistry::default();
    let doc = Document::new().with("name", "Ada").with("age", "old");
    let err = Person::from_document(doc, &registry).unwrap_err();
    assert!(err.to_string().contains("age"), "{}", err);
}

#[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
struct Product {
    sku: String,
    price: f64,
    tags: Vec<String>,
}

#[test]
fn test_serde_adapter_both_ways() {
    let registry = CodecRegistry::default();
    let product = Product {
        sku: "A-1".to_string(),
        price: 9.5,
        tags: vec!["new".to_string()],
    };
    let doc = Serde(product).into_document(&registry).unwrap();
    assert_eq!(doc.keys().collect::<Vec<_>>(), vec!["sku", "price", "tags"]);

    let back = Serde::<Product>::from_document(doc.with("ignored", true), &registry)
        .unwrap()
        .into_inner();
    assert_eq!(back.sku, "A-1");
    assert_eq!(back.price, 9.5);
}

#[test]
fn test_serde_adapter_reads_like_projection() {
    let registry = CodecRegistry::default();
    // Upper-cased key, missing `tags`, unknown `stock`
    let doc = Document::new()
        .with("SKU", "B-2")
        .with("price", 3.25)
        .with("stock", 7);
    let product = Serde::<Product>::from_document(doc, &registry)
        .unwrap()
        .into_inner();
    assert_eq!(
        product,
        Product {
            sku: "B-2".to_string(),
            price: 3.25,
            tags: Vec::new(),
        }
    );
}

// ============================================================================
// Field-bound vectors and hybrids
// ============================================================================

#[test]
fn test_vector_column_round_trip_both_encodings() {
    let doc = Document::new()
        .with("id", 1)
        .with("embedding", DataVector::new(vec![0.5, -0.25, 2.0]));
    for encoding in [VectorEncoding::Array, VectorEncoding::Binary] {
        let registry = CodecRegistry::default()
            .with_vector_encoding(encoding)
            .with_vector_fields(["embedding"]);
        let wire = registry.encode_document(&doc).unwrap();
        let back = registry.decode_document(&wire).unwrap();
        assert_eq!(back, doc, "{:?}", encoding);
    }

    // The binary form of an unbound column reads back as bytes
    let binary = CodecRegistry::default().with_vector_encoding(VectorEncoding::Binary);
    let wire = binary.encode_document(&doc).unwrap();
    assert!(matches!(
        binary.decode_document(&wire).unwrap().get("embedding"),
        Some(Value::Bytes(_))
    ));
}

#[test]
fn test_hybrid_field_nested_round_trip() {
    let registry = CodecRegistry::default().with_hybrid_fields(["$hybrid", "query"]);
    let doc = Document::new().with(
        "filters",
        Document::new().with("query", Hybrid::Text("wool socks".to_string())),
    );
    let wire = registry.encode_document(&doc).unwrap();
    assert_eq!(wire, json!({"filters": {"query": "wool socks"}}));
    assert_eq!(registry.decode_document(&wire).unwrap(), doc);

    let unbound = CodecRegistry::default().decode_document(&wire).unwrap();
    assert_eq!(
        unbound.get_path("filters.query"),
        Some(&Value::from("wool socks"))
    );
}

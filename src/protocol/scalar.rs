//! Extended scalar kinds carried inside documents beyond plain JSON.

use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{DateTime, TimeZone, Utc};
use once_cell::sync::Lazy;
use rand::RngCore;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU32, Ordering};
use uuid::Uuid;

use super::error::DriverError;

/// 12-byte identifier with a leading 32-bit seconds timestamp.
///
/// Layout: 4 bytes big-endian seconds, 5 bytes process-random, 3 bytes
/// big-endian counter.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId([u8; 12]);

static PROCESS_UNIQUE: Lazy<[u8; 5]> = Lazy::new(|| {
    let mut buf = [0u8; 5];
    rand::thread_rng().fill_bytes(&mut buf);
    buf
});

static OID_COUNTER: Lazy<AtomicU32> =
    Lazy::new(|| AtomicU32::new(rand::thread_rng().next_u32() & 0x00ff_ffff));

impl ObjectId {
    pub fn new() -> Self {
        Self::with_timestamp(Utc::now().timestamp() as u32)
    }

    pub fn with_timestamp(seconds: u32) -> Self {
        let mut bytes = [0u8; 12];
        bytes[0..4].copy_from_slice(&seconds.to_be_bytes());
        bytes[4..9].copy_from_slice(&*PROCESS_UNIQUE);
        let counter = OID_COUNTER.fetch_add(1, Ordering::Relaxed) & 0x00ff_ffff;
        bytes[9..12].copy_from_slice(&counter.to_be_bytes()[1..4]);
        Self(bytes)
    }

    pub fn from_bytes(bytes: [u8; 12]) -> Self {
        Self(bytes)
    }

    pub fn bytes(&self) -> [u8; 12] {
        self.0
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        let secs = u32::from_be_bytes([self.0[0], self.0[1], self.0[2], self.0[3]]);
        Utc.timestamp_opt(secs as i64, 0)
            .single()
            .unwrap_or_default()
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl Default for ObjectId {
    fn default() -> Self {
        Self::new()
    }
}

impl FromStr for ObjectId {
    type Err = DriverError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = hex::decode(s)
            .map_err(|e| DriverError::serialization(format!("Invalid objectId '{}': {}", s, e)))?;
        let bytes: [u8; 12] = raw.try_into().map_err(|_| {
            DriverError::serialization(format!("Invalid objectId '{}': expected 12 bytes", s))
        })?;
        Ok(Self(bytes))
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", self.to_hex())
    }
}

/// How a UUID was generated, judged from its version nibble.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UuidKind {
    /// v4
    Random,
    /// v1, v6 and v7 all embed a timestamp
    TimeOrdered,
    Other,
}

pub fn uuid_kind(id: &Uuid) -> UuidKind {
    match id.get_version_num() {
        4 => UuidKind::Random,
        1 | 6 | 7 => UuidKind::TimeOrdered,
        _ => UuidKind::Other,
    }
}

/// Fixed-length float embedding.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DataVector(pub Vec<f32>);

impl DataVector {
    pub fn new(values: Vec<f32>) -> Self {
        Self(values)
    }

    pub fn dimension(&self) -> usize {
        self.0.len()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    /// Big-endian IEEE-754 f32 packing, base64 encoded.
    pub fn to_base64(&self) -> String {
        let mut bytes = Vec::with_capacity(self.0.len() * 4);
        for v in &self.0 {
            bytes.extend_from_slice(&v.to_be_bytes());
        }
        STANDARD.encode(bytes)
    }

    pub fn from_base64(encoded: &str) -> Result<Self, DriverError> {
        let bytes = STANDARD
            .decode(encoded)
            .map_err(|e| DriverError::serialization(format!("Invalid vector binary: {}", e)))?;
        Self::from_be_bytes(&bytes)
    }

    pub fn from_be_bytes(bytes: &[u8]) -> Result<Self, DriverError> {
        if bytes.len() % 4 != 0 {
            return Err(DriverError::serialization(format!(
                "Vector binary length {} is not a multiple of 4",
                bytes.len()
            )));
        }
        Ok(Self(
            bytes
                .chunks_exact(4)
                .map(|c| f32::from_be_bytes([c[0], c[1], c[2], c[3]]))
                .collect(),
        ))
    }
}

impl From<Vec<f32>> for DataVector {
    fn from(v: Vec<f32>) -> Self {
        Self(v)
    }
}

/// Value for a hybrid (vector + lexical) search field.
#[derive(Debug, Clone, PartialEq)]
pub enum Hybrid {
    /// One text used for both vectorize and lexical matching
    Text(String),
    Parts { vectorize: String, lexical: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_id_hex_roundtrip() {
        let id = ObjectId::new();
        let parsed: ObjectId = id.to_hex().parse().unwrap();
        assert_eq!(parsed, id);
        assert_eq!(id.to_hex().len(), 24);
    }

    #[test]
    fn test_object_id_timestamp() {
        let id = ObjectId::with_timestamp(1_700_000_000);
        assert_eq!(id.timestamp().timestamp(), 1_700_000_000);
    }

    #[test]
    fn test_object_ids_are_distinct() {
        let a = ObjectId::new();
        let b = ObjectId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn test_invalid_object_id() {
        assert!("zz".parse::<ObjectId>().is_err());
        assert!("0102".parse::<ObjectId>().is_err());
    }

    #[test]
    fn test_uuid_kind() {
        assert_eq!(uuid_kind(&Uuid::new_v4()), UuidKind::Random);
        assert_eq!(uuid_kind(&Uuid::now_v7()), UuidKind::TimeOrdered);
    }

    #[test]
    fn test_vector_binary() {
        let v = DataVector::new(vec![0.5, -1.25, 3.0]);
        let decoded = DataVector::from_base64(&v.to_base64()).unwrap();
        assert_eq!(decoded, v);
        // 0.5f32 big-endian is 3f 00 00 00
        assert!(v.to_base64().starts_with("PwAAAL"));
    }

    #[test]
    fn test_vector_binary_bad_length() {
        assert!(DataVector::from_be_bytes(&[1, 2, 3]).is_err());
    }
}

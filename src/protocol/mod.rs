//! Wire protocol definitions
//!
//! Every operation travels as one JSON object keyed by the command name.
//! Documents use an ordered, dynamically-typed value model; extended scalars
//! (dates, identifiers, vectors, hybrid search values) are encoded through
//! the codec registry.

pub mod codec;
pub mod command;
pub mod error;
pub mod projection;
pub mod response;
pub mod scalar;
pub mod value;

pub use codec::{CodecOptions, CodecRegistry, DateEncoding, ScalarCodec, ScalarKind, VectorEncoding};
pub use command::{
    names, Command, CommandSettings, EmbeddingAuth, TimeoutCategory, PAGE_STATE_OPTION,
};
pub use error::{ApiFailure, DriverError, DriverResult};
pub use projection::{FromDocument, FromValue, IntoDocument, Projection, Serde};
pub use response::{ApiError, ApiResponse, ResponseData};
pub use scalar::{uuid_kind, DataVector, Hybrid, ObjectId, UuidKind};
pub use value::{Document, Value, ID_FIELD};

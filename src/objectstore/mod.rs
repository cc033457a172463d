//! Object Store (ADR-20): chunked blob storage layered on JetStream,
//! addressed by a random 22-character NUID per object.

mod error;
mod nuid;
mod object;
mod store;

pub use self::error::ObjectStoreError;
pub use self::object::{ObjectMetadata, ObjectOptions, DEFAULT_CHUNK_SIZE};
pub use self::store::{BucketConfig, ObjectStore, PutOptions};

use thiserror::Error;

/// Object Store failure kinds.
#[derive(Debug, Error)]
pub enum ObjectStoreError {
    #[error("bucket name {0:?} is invalid: must be non-empty, without leading/trailing '.', using only [A-Za-z0-9_-]")]
    InvalidBucketName(String),

    #[error("bucket {0} not found")]
    BucketNotFound(String),

    #[error("object {0:?} not found")]
    ObjectNotFound(String),

    #[error("object {name:?} is missing chunk at sequence {expected}")]
    MissingChunk { name: String, expected: u64 },

    #[error("object {name:?} failed digest verification: expected {expected}, got {actual}")]
    DigestMismatch {
        name: String,
        expected: String,
        actual: String,
    },
}

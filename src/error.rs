use thiserror::Error;

use crate::jetstream::JetStreamError;
use crate::objectstore::ObjectStoreError;

/// Every fallible operation in this crate returns this error.
///
/// The variants mirror the error taxonomy from the protocol design: transport
/// failures, handshake/authentication failures, server-reported errors,
/// request timeouts, no-responders, and the nested JetStream/Object Store
/// error families.
#[derive(Debug, Error)]
pub enum NatsError {
    #[error("transport error: {0}")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("handshake timed out after {0:?}")]
    HandshakeTimeout(std::time::Duration),

    #[error("unexpected end of stream while waiting for {0}")]
    UnexpectedEof(&'static str),

    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("authentication handler failed: {0}")]
    AuthHandler(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("server error: {0}")]
    Server(String),

    #[error("request to {subject} timed out")]
    RequestTimeout { subject: String },

    #[error("no responders are listening on {subject}")]
    NoResponders { subject: String },

    #[error("connection is not connected")]
    NotConnected,

    #[error("connection was closed")]
    ConnectionClosed,

    #[error("operation was cancelled")]
    Cancelled,

    #[error("malformed frame: {0}")]
    ProtocolError(String),

    #[error("payload of {actual} bytes exceeds the server's max_payload of {max}")]
    MaxPayloadExceeded { max: u32, actual: usize },

    #[error("invalid header block: {0}")]
    HeaderError(String),

    #[error("invalid URL: {0}")]
    UrlError(#[from] url::ParseError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    JetStream(#[from] JetStreamError),

    #[error(transparent)]
    ObjectStore(#[from] ObjectStoreError),
}

pub type NatsResult<T> = Result<T, NatsError>;

impl NatsError {
    /// `NatsError` doesn't implement `Clone` (several variants box a
    /// `dyn Error`); this produces an equivalent error for fanning the same
    /// failure out to many pending requests or flush waiters at once, e.g.
    /// when a connection drop fails every promise outstanding against it.
    pub(crate) fn clone_for_broadcast(&self) -> NatsError {
        match self {
            NatsError::NotConnected => NatsError::NotConnected,
            NatsError::ConnectionClosed => NatsError::ConnectionClosed,
            NatsError::Cancelled => NatsError::Cancelled,
            other => NatsError::Server(other.to_string()),
        }
    }
}

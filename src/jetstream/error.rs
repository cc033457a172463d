use thiserror::Error;

/// A non-null `error` object in a `$JS.API.*` response, or a transport-level
/// failure while making the request.
#[derive(Debug, Error)]
pub enum JetStreamError {
    #[error("jetstream api error {code} (err_code {err_code}): {description}")]
    Api {
        code: u16,
        err_code: u32,
        description: String,
    },

    #[error("stream {name} not found")]
    StreamNotFound { name: String },

    #[error("malformed jetstream response: {0}")]
    MalformedResponse(String),

    #[error("publish to {subject} failed: {reason}")]
    PublishFailed { subject: String, reason: String },
}

use bytes::Bytes;

use crate::headers::NatsHeaders;

/// A message delivered to a subscription or resolved as a request reply.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub subject: String,
    pub sid: String,
    pub reply_to: Option<String>,
    pub headers: Option<NatsHeaders>,
    pub payload: Bytes,
}

impl Message {
    /// True when this message is the request/reply layer's 503 sentinel.
    pub fn is_no_responders(&self) -> bool {
        self.headers.as_ref().map(|h| h.is_no_responders()).unwrap_or(false)
    }
}

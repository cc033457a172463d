//! DTOs exchanged with the `$JS.API.*` subject tree. Modeled as explicit
//! records; `serde`'s `skip_serializing_if` elides zero/empty/`None` fields
//! the way the server omits them from the wire.

use std::collections::HashMap;

use derive_builder::Builder;
use serde::{Deserialize, Serialize};

fn is_zero(n: &u64) -> bool {
    *n == 0
}

fn is_zero_i64(n: &i64) -> bool {
    *n == 0
}

/// An API-level error object, present on any failed `$JS.API.*` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiError {
    pub code: u16,
    #[serde(default)]
    pub err_code: u32,
    pub description: String,
}

/// The `error` half of a `$JS.API.*` response, checked for before attempting
/// to decode the success shape. `serde`'s `flatten` does not reliably
/// distinguish "absent" from "present but unparsable" for an `Option<T>`
/// field (a known limitation), so responses are decoded in two steps
/// instead of via one combined struct: see [`crate::jetstream::context`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiErrorEnvelope {
    #[serde(default)]
    pub error: Option<ApiError>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetentionPolicy {
    Limits,
    Interest,
    Workqueue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscardPolicy {
    Old,
    New,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageType {
    File,
    Memory,
}

/// Stream configuration. General enough to describe any JetStream stream;
/// the Object Store creates these with a fixed, narrow subset of fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Builder)]
#[builder(setter(into, strip_option))]
pub struct StreamConfig {
    pub name: String,
    pub subjects: Vec<String>,
    #[builder(default = "RetentionPolicy::Limits")]
    pub retention: RetentionPolicy,
    #[builder(default = "DiscardPolicy::Old")]
    pub discard: DiscardPolicy,
    #[builder(default = "StorageType::File")]
    pub storage: StorageType,
    #[builder(default = "1")]
    pub num_replicas: u8,
    #[builder(default)]
    #[serde(default, skip_serializing_if = "is_zero")]
    pub max_bytes: u64,
    #[builder(default)]
    #[serde(default, skip_serializing_if = "is_zero")]
    pub max_age: u64,
    #[builder(default)]
    #[serde(default, skip_serializing_if = "is_zero_i64")]
    pub max_msgs_per_subject: i64,
    #[builder(default)]
    #[serde(default)]
    pub allow_rollup_hdrs: bool,
    #[builder(default)]
    #[serde(default)]
    pub allow_direct: bool,
    #[builder(default)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compression: Option<String>,
}

impl StreamConfig {
    pub fn builder() -> StreamConfigBuilder {
        StreamConfigBuilder::default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamState {
    pub messages: u64,
    pub bytes: u64,
    pub first_seq: u64,
    pub last_seq: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_subjects: Option<u64>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub subjects: HashMap<String, u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamInfo {
    pub config: StreamConfig,
    pub state: StreamState,
}

/// `STREAM.INFO` request body; `subjects_filter` and `offset` support the
/// pagination this crate performs internally when a stream's subject list
/// is too large for a single reply.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StreamInfoRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subjects_filter: Option<String>,
    #[serde(skip_serializing_if = "is_zero_usize")]
    pub offset: usize,
}

fn is_zero_usize(n: &usize) -> bool {
    *n == 0
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct StreamPurgeRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seq: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keep: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct StreamPurgeResponse {
    pub success: bool,
    pub purged: u64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PublishAck {
    pub stream: String,
    pub seq: u64,
    #[serde(default)]
    pub duplicate: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
}

/// `DIRECT.GET.<stream>` request body: exactly one of the three selectors.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DirectGetRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_by_subj: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seq: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_by_subj: Option<String>,
}

impl DirectGetRequest {
    pub fn last_by_subject(subject: impl Into<String>) -> Self {
        DirectGetRequest {
            last_by_subj: Some(subject.into()),
            ..Default::default()
        }
    }

    pub fn next_by_subject(subject: impl Into<String>, after_seq: u64) -> Self {
        DirectGetRequest {
            next_by_subj: Some(subject.into()),
            seq: Some(after_seq),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_stream_config_elides_zero_and_absent_fields() {
        let config = StreamConfig::builder()
            .name("orders")
            .subjects(vec!["orders.>".to_string()])
            .build()
            .unwrap();

        let json = serde_json::to_value(&config).unwrap();
        assert!(json.get("max_bytes").is_none());
        assert!(json.get("max_age").is_none());
        assert!(json.get("compression").is_none());
        assert_eq!(json["retention"], "limits");
        assert_eq!(json["storage"], "file");
    }

    #[test]
    fn direct_get_request_selectors_are_mutually_exclusive_in_json() {
        let req = DirectGetRequest::last_by_subject("$O.bkt.M.bmFtZQ");
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["last_by_subj"], "$O.bkt.M.bmFtZQ");
        assert!(json.get("seq").is_none());
        assert!(json.get("next_by_subj").is_none());
    }

    #[test]
    fn publish_ack_decodes_from_a_plain_success_body() {
        let body = serde_json::json!({"stream": "orders", "seq": 42, "duplicate": false});
        let ack: PublishAck = serde_json::from_value(body).unwrap();
        assert_eq!(ack.stream, "orders");
        assert_eq!(ack.seq, 42);
    }

    #[test]
    fn error_envelope_extracts_the_error_object() {
        let body = serde_json::json!({"error": {"code": 404, "err_code": 10059, "description": "stream not found"}});
        let envelope: ApiErrorEnvelope = serde_json::from_value(body).unwrap();
        assert_eq!(envelope.error.unwrap().code, 404);
    }

    #[test]
    fn error_envelope_is_none_on_a_success_body() {
        let body = serde_json::json!({"stream": "orders", "seq": 42});
        let envelope: ApiErrorEnvelope = serde_json::from_value(body).unwrap();
        assert!(envelope.error.is_none());
    }
}

//! A thin request/reply façade over the `$JS.API.*` subject tree.

use std::sync::Arc;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::client::NatsConnection;
use crate::error::NatsResult;
use crate::headers::NatsHeaders;
use crate::jetstream::error::JetStreamError;
use crate::jetstream::types::{
    ApiErrorEnvelope, DirectGetRequest, PublishAck, StreamConfig, StreamInfo, StreamInfoRequest, StreamPurgeRequest,
    StreamPurgeResponse,
};

/// Subjects above this many entries in a single `STREAM.INFO` response are
/// truncated server-side. This crate paginates via `offset` until a page
/// comes back empty instead of trusting a single reply to be complete.
const SUBJECTS_PAGE_THRESHOLD: usize = 10_000;

#[derive(Clone)]
pub struct Context {
    connection: Arc<NatsConnection>,
    api_prefix: String,
}

impl Context {
    pub fn new(connection: Arc<NatsConnection>) -> Self {
        Context {
            connection,
            api_prefix: "$JS.API".to_string(),
        }
    }

    pub fn with_domain(connection: Arc<NatsConnection>, domain: impl AsRef<str>) -> Self {
        Context {
            connection,
            api_prefix: format!("$JS.{}.API", domain.as_ref()),
        }
    }

    fn subject(&self, suffix: &str) -> String {
        format!("{}.{suffix}", self.api_prefix)
    }

    async fn api_request<Req: Serialize, Resp: DeserializeOwned>(
        &self,
        suffix: &str,
        request: &Req,
        cancel: &CancellationToken,
    ) -> NatsResult<Resp> {
        let payload = Bytes::from(serde_json::to_vec(request)?);
        let reply = self
            .connection
            .request(&self.subject(suffix), payload, None, cancel)
            .await?;
        decode_api_reply(&reply.payload, suffix)
    }

    pub async fn stream_create(&self, config: StreamConfig, cancel: &CancellationToken) -> NatsResult<StreamInfo> {
        let name = config.name.clone();
        self.api_request(&format!("STREAM.CREATE.{name}"), &config, cancel).await
    }

    pub async fn stream_info(&self, name: &str, cancel: &CancellationToken) -> NatsResult<StreamInfo> {
        self.stream_info_with_subjects(name, None, cancel).await
    }

    /// Fetches stream info, paginating the `subjects` map via `offset` when
    /// a filter is given, until a page comes back empty.
    pub async fn stream_info_with_subjects(
        &self,
        name: &str,
        filter: Option<&str>,
        cancel: &CancellationToken,
    ) -> NatsResult<StreamInfo> {
        let suffix = format!("STREAM.INFO.{name}");
        let mut request = StreamInfoRequest {
            subjects_filter: filter.map(String::from),
            offset: 0,
        };

        let info_result: NatsResult<StreamInfo> = self.api_request(&suffix, &request, cancel).await;
        let mut info = match info_result {
            Ok(info) => info,
            Err(e) => {
                return Err(map_404(e, name));
            }
        };

        if filter.is_none() {
            return Ok(info);
        }

        loop {
            let page_size = info.state.subjects.len();
            if page_size < SUBJECTS_PAGE_THRESHOLD {
                break;
            }
            request.offset += page_size;
            let page: StreamInfo = self.api_request(&suffix, &request, cancel).await?;
            if page.state.subjects.is_empty() {
                break;
            }
            info.state.subjects.extend(page.state.subjects);
        }

        Ok(info)
    }

    pub async fn stream_delete(&self, name: &str, cancel: &CancellationToken) -> NatsResult<()> {
        let _: StreamDeleteResponse = self
            .api_request(&format!("STREAM.DELETE.{name}"), &serde_json::json!({}), cancel)
            .await
            .map_err(|e| map_404(e, name))?;
        Ok(())
    }

    pub async fn stream_purge(
        &self,
        name: &str,
        request: StreamPurgeRequest,
        cancel: &CancellationToken,
    ) -> NatsResult<StreamPurgeResponse> {
        self.api_request(&format!("STREAM.PURGE.{name}"), &request, cancel)
            .await
            .map_err(|e| map_404(e, name))
    }

    pub async fn publish(
        &self,
        subject: &str,
        payload: Bytes,
        headers: Option<&NatsHeaders>,
        cancel: &CancellationToken,
    ) -> NatsResult<PublishAck> {
        let reply = self
            .connection
            .request_with_headers(subject, payload, headers, None, cancel)
            .await?;
        decode_api_reply(&reply.payload, subject).map_err(|e| {
            if let crate::error::NatsError::JetStream(JetStreamError::Api { description, .. }) = &e {
                JetStreamError::PublishFailed {
                    subject: subject.to_string(),
                    reason: description.clone(),
                }
                .into()
            } else {
                e
            }
        })
    }

    pub async fn publish_with_rollup(
        &self,
        subject: &str,
        payload: Bytes,
        cancel: &CancellationToken,
    ) -> NatsResult<PublishAck> {
        let mut headers = NatsHeaders::new();
        headers.set("Nats-Rollup", "sub");
        self.publish(subject, payload, Some(&headers), cancel).await
    }

    /// Fetches one message by subject without going through a consumer.
    /// Returns `None` on a 404 status rather than raising an error.
    pub async fn direct_get(
        &self,
        stream: &str,
        request: DirectGetRequest,
        cancel: &CancellationToken,
    ) -> NatsResult<Option<crate::client::Message>> {
        let payload = Bytes::from(serde_json::to_vec(&request)?);
        let reply = self
            .connection
            .request(&self.subject(&format!("DIRECT.GET.{stream}")), payload, None, cancel)
            .await?;

        if reply.headers.as_ref().and_then(|h| h.status_code()) == Some(404) {
            return Ok(None);
        }
        Ok(Some(reply))
    }
}

#[derive(Debug, serde::Deserialize)]
struct StreamDeleteResponse {
    #[allow(dead_code)]
    success: bool,
}

/// Checks for a non-null `error` field first, then decodes the success
/// shape; see [`crate::jetstream::types::ApiErrorEnvelope`] for why this
/// isn't one combined `serde(flatten)` struct.
fn decode_api_reply<Resp: DeserializeOwned>(payload: &[u8], context: &str) -> NatsResult<Resp> {
    let envelope: ApiErrorEnvelope = serde_json::from_slice(payload)?;
    if let Some(err) = envelope.error {
        return Err(JetStreamError::Api {
            code: err.code,
            err_code: err.err_code,
            description: err.description,
        }
        .into());
    }
    serde_json::from_slice(payload).map_err(|e| {
        JetStreamError::MalformedResponse(format!("{context}: {e}")).into()
    })
}

fn map_404(err: crate::error::NatsError, stream: &str) -> crate::error::NatsError {
    if let crate::error::NatsError::JetStream(JetStreamError::Api { code: 404, .. }) = &err {
        return JetStreamError::StreamNotFound {
            name: stream.to_string(),
        }
        .into();
    }
    err
}

//! JetStream context: stream lifecycle, publish-ack, and direct-get over the
//! `$JS.API.*` subject tree (or `$JS.<domain>.API` when configured).

mod context;
mod error;
mod types;

pub use self::context::Context;
pub use self::error::JetStreamError;
pub use self::types::{
    ApiError, DirectGetRequest, DiscardPolicy, PublishAck, RetentionPolicy, StorageType, StreamConfig,
    StreamConfigBuilder, StreamInfo, StreamPurgeRequest, StreamPurgeResponse, StreamState,
};

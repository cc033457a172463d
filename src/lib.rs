//! A tokio-based NATS client carried over a WebSocket transport, with header,
//! JetStream and Object Store support.
//!
//! The wire-level protocol (frame codec, header block, handshake, reconnect)
//! lives in [`client`] and [`codec`]; [`net`] names the transport and
//! authentication contracts a caller plugs in. [`jetstream`] and
//! [`objectstore`] are built entirely on top of the plain request/reply
//! surface [`client::NatsConnection`] exposes — neither reaches into the
//! connection's internals.

pub mod client;
pub mod codec;
pub mod error;
pub mod headers;
pub mod jetstream;
pub mod net;
pub mod objectstore;
pub mod protocol;

pub use crate::client::{ConnectionStatus, Message, NatsClientOptions, NatsClientOptionsBuilder, NatsConnection};
pub use crate::error::{NatsError, NatsResult};
pub use crate::headers::NatsHeaders;

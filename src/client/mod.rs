//! The NATS client proper: connection core, subscription registry, inbox
//! correlator, configuration, and the message type delivered to callers.

mod connection;
mod inbox;
mod message;
mod options;
mod registry;
mod sender;
mod status;

pub use self::connection::NatsConnection;
pub use self::message::Message;
pub use self::options::{NatsClientOptions, NatsClientOptionsBuilder};
pub use self::status::ConnectionStatus;

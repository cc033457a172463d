//! External collaborators: the transport byte-stream contract and the
//! authentication contract. Neither is implemented here; a WebSocket
//! transport and NKEY/Ed25519 signing are both supplied by the caller.

mod auth;
mod transport;

pub use self::auth::{Authenticator, NoAuth, TokenAuth, UserPassAuth};
pub use self::transport::{Transport, TransportFactory, TransportReader, TransportWriter};

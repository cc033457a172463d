//! The injected transport collaborator. A WebSocket implementation
//! (including TLS) lives in the application; this crate only depends on the
//! narrow byte-stream contract below.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::NatsResult;

/// A single, already-framed byte-stream session, before it is split into
/// independent halves.
///
/// The NATS layer treats whatever the transport carries (binary WebSocket
/// frames, typically) as one opaque concatenated byte stream; framing at
/// the NATS protocol level is the frame codec's job, not the transport's.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Opens the session against `uri`. Implementations own TLS, if any.
    async fn connect(&mut self, uri: &Url, cancel: &CancellationToken) -> NatsResult<()>;

    /// Reads up to `count` bytes into `buf[offset..offset + count]`, returning
    /// the number of bytes read. Zero means the peer closed the session in an
    /// orderly fashion; this is not itself an error. Only called before
    /// [`Transport::split`], during the handshake.
    async fn receive(
        &mut self,
        buf: &mut [u8],
        offset: usize,
        count: usize,
        cancel: &CancellationToken,
    ) -> NatsResult<usize>;

    /// Writes `bytes` in full. Only called before [`Transport::split`],
    /// during the handshake.
    async fn send(&mut self, bytes: &[u8], cancel: &CancellationToken) -> NatsResult<()>;

    /// Closes the session. Best-effort; errors are logged by the caller, not
    /// propagated, since close is often called during teardown.
    async fn close(&mut self, cancel: &CancellationToken) -> NatsResult<()>;

    fn is_connected(&self) -> bool;

    /// Splits a connected transport into independent read and write halves,
    /// the way a real socket's receive and send directions are genuinely
    /// independent at the OS level (`TcpStream::into_split`, for instance).
    /// Called once, right after the handshake completes: the read loop owns
    /// the [`TransportReader`] outright with no locking at all, since it is
    /// the only task that ever touches it, and the connection's send-side
    /// wrapper wraps only the [`TransportWriter`] half in its mutex. A
    /// pending read can then never block a write, or vice versa.
    fn split(self: Box<Self>) -> (Box<dyn TransportReader>, Box<dyn TransportWriter>);
}

/// The read half of a split [`Transport`]. Owned exclusively by the read
/// loop task, so it needs no internal synchronization of its own.
#[async_trait]
pub trait TransportReader: Send {
    async fn receive(
        &mut self,
        buf: &mut [u8],
        offset: usize,
        count: usize,
        cancel: &CancellationToken,
    ) -> NatsResult<usize>;
}

/// The write half of a split [`Transport`]. Wrapped in a single mutex so
/// that concurrent publishers, the keep-alive loop, and PONG replies never
/// interleave a partial frame on the wire — see spec.md's "transport's
/// write half is protected by a single mutex".
#[async_trait]
pub trait TransportWriter: Send {
    async fn send(&mut self, bytes: &[u8], cancel: &CancellationToken) -> NatsResult<()>;

    async fn close(&mut self, cancel: &CancellationToken) -> NatsResult<()>;
}

/// Produces a fresh, unconnected [`Transport`] instance. The reconnect loop
/// instantiates a new transport on every attempt rather than reusing the
/// failed one.
pub trait TransportFactory: Send + Sync {
    fn create(&self) -> Box<dyn Transport>;
}

impl<F> TransportFactory for F
where
    F: Fn() -> Box<dyn Transport> + Send + Sync,
{
    fn create(&self) -> Box<dyn Transport> {
        (self)()
    }
}

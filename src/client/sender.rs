//! Transport write-mutex wrapper: only the write half is protected by a
//! mutex, and every outbound frame is a single `send` call. The read half
//! lives entirely outside this type, owned exclusively by the read loop
//! task, so a pending read can never contend with a write (or vice versa)
//! for the same lock — see [`crate::net::Transport::split`].

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::error::NatsResult;
use crate::net::TransportWriter;

pub struct TransportSender {
    writer: Mutex<Box<dyn TransportWriter>>,
}

impl TransportSender {
    pub fn new(writer: Box<dyn TransportWriter>) -> Self {
        TransportSender {
            writer: Mutex::new(writer),
        }
    }

    /// Writes `bytes` as a single call into the transport, so a PUB/HPUB
    /// header and its payload can never interleave with another frame.
    pub async fn send(&self, bytes: &[u8], cancel: &CancellationToken) -> NatsResult<()> {
        self.writer.lock().await.send(bytes, cancel).await
    }

    pub async fn close(&self, cancel: &CancellationToken) {
        let _ = self.writer.lock().await.close(cancel).await;
    }

    /// Installs the write half of a freshly reconnected transport.
    pub async fn replace(&self, writer: Box<dyn TransportWriter>) {
        *self.writer.lock().await = writer;
    }
}

//! An in-memory stand-in for the transport contract, used to drive the
//! connection core's handshake/request/reconnect logic without a real
//! WebSocket or TCP socket.

pub mod fake_jetstream;

use std::sync::Mutex;

use async_trait::async_trait;
use nats_ws::error::{NatsError, NatsResult};
use nats_ws::net::{Transport, TransportFactory, TransportReader, TransportWriter};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use url::Url;

/// The test's view of one connection attempt: a channel to feed bytes to
/// the client and a channel to observe exactly what it sends. Each call to
/// [`crate::support::MockTransport::send`] corresponds to one queued item
/// here, since the connection core always writes a whole frame per call.
pub struct MockServer {
    pub to_client: mpsc::UnboundedSender<Vec<u8>>,
    pub from_client: mpsc::UnboundedReceiver<Vec<u8>>,
}

impl MockServer {
    /// Sends the INFO frame and waits for the client's CONNECT + PING,
    /// replying PONG — the full happy-path handshake.
    pub async fn handshake(&mut self, server_id: &str) {
        self.to_client
            .send(
                format!(
                    "INFO {{\"server_id\":\"{server_id}\",\"version\":\"2.10.0\",\"headers\":true,\"max_payload\":1048576,\"proto\":1}}\r\n"
                )
                .into_bytes(),
            )
            .unwrap();
        let connect = self.from_client.recv().await.expect("client should send CONNECT");
        assert!(connect.starts_with(b"CONNECT "), "expected CONNECT, got {connect:?}");
        let ping = self.from_client.recv().await.expect("client should send PING");
        assert_eq!(ping, b"PING\r\n");
        self.to_client.send(b"PONG\r\n".to_vec()).unwrap();
    }

    /// Drains the client's post-handshake wildcard SUB for its inbox.
    pub async fn expect_inbox_subscribe(&mut self) -> String {
        let sub = self.from_client.recv().await.expect("client should subscribe its inbox");
        let text = String::from_utf8(sub).unwrap();
        assert!(text.starts_with("SUB _INBOX."), "expected inbox SUB, got {text:?}");
        text
    }

    /// Waits for the next frame the client sends and returns it as text.
    pub async fn expect_frame(&mut self) -> String {
        let bytes = self.from_client.recv().await.expect("client should have sent a frame");
        String::from_utf8(bytes).unwrap()
    }

    pub fn send_raw(&self, bytes: &[u8]) {
        self.to_client.send(bytes.to_vec()).unwrap();
    }
}

/// A single mock transport session; the client-facing half of a
/// [`MockServer`] pair.
pub struct MockTransport {
    inbound: mpsc::UnboundedReceiver<Vec<u8>>,
    outbound: mpsc::UnboundedSender<Vec<u8>>,
    connected: bool,
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&mut self, _uri: &Url, _cancel: &CancellationToken) -> NatsResult<()> {
        self.connected = true;
        Ok(())
    }

    async fn receive(
        &mut self,
        buf: &mut [u8],
        offset: usize,
        count: usize,
        _cancel: &CancellationToken,
    ) -> NatsResult<usize> {
        match self.inbound.recv().await {
            Some(bytes) => {
                let n = bytes.len().min(count);
                buf[offset..offset + n].copy_from_slice(&bytes[..n]);
                Ok(n)
            }
            None => Ok(0),
        }
    }

    async fn send(&mut self, bytes: &[u8], _cancel: &CancellationToken) -> NatsResult<()> {
        self.outbound
            .send(bytes.to_vec())
            .map_err(|e| NatsError::Transport(Box::new(e)))
    }

    async fn close(&mut self, _cancel: &CancellationToken) -> NatsResult<()> {
        self.connected = false;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn split(self: Box<Self>) -> (Box<dyn TransportReader>, Box<dyn TransportWriter>) {
        (
            Box::new(MockTransportReader { inbound: self.inbound }),
            Box::new(MockTransportWriter { outbound: self.outbound }),
        )
    }
}

struct MockTransportReader {
    inbound: mpsc::UnboundedReceiver<Vec<u8>>,
}

#[async_trait]
impl TransportReader for MockTransportReader {
    async fn receive(
        &mut self,
        buf: &mut [u8],
        offset: usize,
        count: usize,
        _cancel: &CancellationToken,
    ) -> NatsResult<usize> {
        match self.inbound.recv().await {
            Some(bytes) => {
                let n = bytes.len().min(count);
                buf[offset..offset + n].copy_from_slice(&bytes[..n]);
                Ok(n)
            }
            None => Ok(0),
        }
    }
}

struct MockTransportWriter {
    outbound: mpsc::UnboundedSender<Vec<u8>>,
}

#[async_trait]
impl TransportWriter for MockTransportWriter {
    async fn send(&mut self, bytes: &[u8], _cancel: &CancellationToken) -> NatsResult<()> {
        self.outbound
            .send(bytes.to_vec())
            .map_err(|e| NatsError::Transport(Box::new(e)))
    }

    async fn close(&mut self, _cancel: &CancellationToken) -> NatsResult<()> {
        Ok(())
    }
}

/// Hands out a fresh [`MockTransport`]/[`MockServer`] pair on every call,
/// mirroring the real reconnect loop's "new transport per attempt"
/// behavior. The test drives each attempt's [`MockServer`] by reading them
/// off `new_connections` in order.
pub struct MockTransportFactory {
    new_connections: Mutex<mpsc::UnboundedSender<MockServer>>,
}

impl MockTransportFactory {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<MockServer>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            MockTransportFactory {
                new_connections: Mutex::new(tx),
            },
            rx,
        )
    }
}

impl TransportFactory for MockTransportFactory {
    fn create(&self) -> Box<dyn Transport> {
        let (to_client_tx, to_client_rx) = mpsc::unbounded_channel();
        let (from_client_tx, from_client_rx) = mpsc::unbounded_channel();
        let server = MockServer {
            to_client: to_client_tx,
            from_client: from_client_rx,
        };
        let _ = self.new_connections.lock().unwrap().send(server);
        Box::new(MockTransport {
            inbound: to_client_rx,
            outbound: from_client_tx,
            connected: false,
        })
    }
}

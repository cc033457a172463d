//! A minimal [`Transport`] over a plain TCP socket, for pointing these demos
//! at a real `nats-server` without pulling in a WebSocket stack. The
//! WebSocket transport this crate actually targets is left to the
//! application; this stands in for it since the wire bytes above the
//! socket are identical either way.

use async_trait::async_trait;
use nats_ws::error::{NatsError, NatsResult};
use nats_ws::net::{Transport, TransportFactory, TransportReader, TransportWriter};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;
use url::Url;

pub struct TcpTransport {
    stream: Option<TcpStream>,
}

impl TcpTransport {
    pub fn new() -> Self {
        TcpTransport { stream: None }
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn connect(&mut self, uri: &Url, _cancel: &CancellationToken) -> NatsResult<()> {
        let host = uri
            .host_str()
            .ok_or_else(|| NatsError::ProtocolError("transport URL has no host".into()))?;
        let port = uri.port().unwrap_or(4222);
        let stream = TcpStream::connect((host, port))
            .await
            .map_err(|e| NatsError::Transport(Box::new(e)))?;
        self.stream = Some(stream);
        Ok(())
    }

    async fn receive(
        &mut self,
        buf: &mut [u8],
        offset: usize,
        count: usize,
        _cancel: &CancellationToken,
    ) -> NatsResult<usize> {
        let stream = self.stream.as_mut().ok_or(NatsError::NotConnected)?;
        let n = stream
            .read(&mut buf[offset..offset + count])
            .await
            .map_err(|e| NatsError::Transport(Box::new(e)))?;
        Ok(n)
    }

    async fn send(&mut self, bytes: &[u8], _cancel: &CancellationToken) -> NatsResult<()> {
        let stream = self.stream.as_mut().ok_or(NatsError::NotConnected)?;
        stream.write_all(bytes).await.map_err(|e| NatsError::Transport(Box::new(e)))?;
        Ok(())
    }

    async fn close(&mut self, _cancel: &CancellationToken) -> NatsResult<()> {
        self.stream = None;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    fn split(self: Box<Self>) -> (Box<dyn TransportReader>, Box<dyn TransportWriter>) {
        let stream = self.stream.expect("split called on a connected transport");
        let (read_half, write_half) = stream.into_split();
        (
            Box::new(TcpTransportReader { read_half }),
            Box::new(TcpTransportWriter { write_half }),
        )
    }
}

struct TcpTransportReader {
    read_half: OwnedReadHalf,
}

#[async_trait]
impl TransportReader for TcpTransportReader {
    async fn receive(
        &mut self,
        buf: &mut [u8],
        offset: usize,
        count: usize,
        _cancel: &CancellationToken,
    ) -> NatsResult<usize> {
        let n = self
            .read_half
            .read(&mut buf[offset..offset + count])
            .await
            .map_err(|e| NatsError::Transport(Box::new(e)))?;
        Ok(n)
    }
}

struct TcpTransportWriter {
    write_half: OwnedWriteHalf,
}

#[async_trait]
impl TransportWriter for TcpTransportWriter {
    async fn send(&mut self, bytes: &[u8], _cancel: &CancellationToken) -> NatsResult<()> {
        self.write_half.write_all(bytes).await.map_err(|e| NatsError::Transport(Box::new(e)))?;
        Ok(())
    }

    async fn close(&mut self, _cancel: &CancellationToken) -> NatsResult<()> {
        let _ = self.write_half.shutdown().await;
        Ok(())
    }
}

pub struct TcpTransportFactory;

impl TransportFactory for TcpTransportFactory {
    fn create(&self) -> Box<dyn Transport> {
        Box::new(TcpTransport::new())
    }
}

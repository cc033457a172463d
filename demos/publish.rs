//! Connects to a local `nats-server`, subscribes to `topic`, publishes one
//! message, and prints whatever comes back through the subscription.

#[path = "tcp_transport.rs"]
mod tcp_transport;

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use nats_ws::net::TransportFactory;
use nats_ws::{NatsClientOptions, NatsConnection};
use tcp_transport::TcpTransportFactory;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let transport_factory: Arc<dyn TransportFactory> = Arc::new(TcpTransportFactory);
    let options = NatsClientOptions::builder()
        .url("nats://127.0.0.1:4222".parse()?)
        .transport_factory(transport_factory)
        .name("nats-ws-publish-demo")
        .build()?;

    let connection = NatsConnection::connect(options).await?;
    let cancel = CancellationToken::new();

    let (_sid, mut messages) = connection.subscribe("topic", None, &cancel).await?;
    connection.flush(&cancel).await?;

    connection
        .publish("topic", Bytes::from_static(b"Hello world!"), None, None, &cancel)
        .await?;

    match tokio::time::timeout(Duration::from_secs(1), messages.recv()).await {
        Ok(Some(msg)) => println!("received: {:?}", msg.payload),
        Ok(None) => println!("subscription closed before a message arrived"),
        Err(_) => println!("timed out waiting for the echoed message"),
    }

    connection.close().await;
    Ok(())
}

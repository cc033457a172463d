//! Subscribes to `messages` with `UNSUB ... 10`, then publishes 15 messages
//! — only the first 10 are ever delivered, since the server drops the
//! subscription once its max-message count is reached.

#[path = "tcp_transport.rs"]
mod tcp_transport;

use std::sync::Arc;

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
        .name("nats-ws-subscribe-demo")
        .build()?;

    let connection = NatsConnection::connect(options).await?;
    let cancel = CancellationToken::new();

    let (sid, mut messages) = connection.subscribe("messages", None, &cancel).await?;
    connection.unsubscribe(sid, Some(10), &cancel).await?;

    for i in 1..=15 {
        connection
            .publish("messages", Bytes::from(format!("message #{i}")), None, None, &cancel)
            .await?;
        println!("sent message #{i}");
    }

    for _ in 0..10 {
        match messages.recv().await {
            Some(msg) => println!("received: {:?}", msg.payload),
            None => break,
        }
    }

    connection.close().await;
    Ok(())
}

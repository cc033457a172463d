//! Subscribes to `marcopolo`, replies `polo` to any `marco` request, then
//! exercises the request/reply call itself against that responder.

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
        .name("nats-ws-request-demo")
        .build()?;

    let connection = NatsConnection::connect(options).await?;
    let cancel = CancellationToken::new();

    let (_sid, mut requests) = connection.subscribe("marcopolo", None, &cancel).await?;
    connection.flush(&cancel).await?;

    let responder = Arc::clone(&connection);
    let responder_cancel = cancel.clone();
    tokio::spawn(async move {
        while let Some(msg) = requests.recv().await {
            if msg.payload.as_ref() != b"marco" {
                println!("received {:?} instead of marco", msg.payload);
                continue;
            }
            let Some(reply_to) = msg.reply_to else {
                println!("received marco without a reply-to subject");
                continue;
            };
            if let Err(e) = responder
                .publish(&reply_to, Bytes::from_static(b"polo"), None, None, &responder_cancel)
                .await
            {
                println!("failed to reply: {e}");
            }
        }
    });

    let response = connection
        .request(
            "marcopolo",
            Bytes::from_static(b"marco"),
            Some(Duration::from_secs(2)),
            &cancel,
        )
        .await?;
    println!("received: {:?}", response.payload);

    connection.close().await;
    Ok(())
}

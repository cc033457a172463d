//! Object Store scenarios driven end-to-end: a real [`ObjectStore`] talking
//! to a real [`NatsConnection`], with the far end played by
//! [`support::fake_jetstream::FakeJetStream`] instead of a live
//! `nats-server`.

mod support;

use std::sync::Arc;
use std::time::Duration;

use nats_ws::jetstream::Context;
use nats_ws::objectstore::{BucketConfig, ObjectStore, ObjectStoreError, PutOptions};
use nats_ws::{NatsClientOptions, NatsConnection, NatsError};
use support::fake_jetstream::FakeJetStream;
use support::MockTransportFactory;
use tokio_util::sync::CancellationToken;

async fn connect_against_fake_jetstream() -> Arc<NatsConnection> {
    let (factory, mut new_conns) = MockTransportFactory::new();
    let options = NatsClientOptions::builder()
        .url("nats://mock/".parse().unwrap())
        .transport_factory(Arc::new(factory) as Arc<dyn nats_ws::net::TransportFactory>)
        .connect_timeout(Duration::from_secs(2))
        .request_timeout(Duration::from_secs(2))
        .ping_interval(Duration::from_secs(60))
        .build()
        .unwrap();

    let connect_task = tokio::spawn(NatsConnection::connect(options));
    let mut server = new_conns.recv().await.unwrap();
    server.handshake("test").await;
    server.expect_inbox_subscribe().await;
    let connection = connect_task.await.unwrap().unwrap();

    tokio::spawn(FakeJetStream::new().run(server));
    connection
}

#[tokio::test]
async fn put_then_get_round_trips_a_multi_chunk_object() {
    let cancel = CancellationToken::new();
    let connection = connect_against_fake_jetstream().await;
    let js = Context::new(Arc::clone(&connection));
    let store = ObjectStore::create(js, BucketConfig::new("bkt"), &cancel).await.unwrap();

    let data = vec![7u8; 300 * 1024];
    let meta = store
        .put("a/b.txt", &data, PutOptions::default(), &cancel)
        .await
        .unwrap();
    assert_eq!(meta.chunks, 3);
    assert_eq!(meta.size, data.len() as u64);

    let fetched = store.get("a/b.txt", &cancel).await.unwrap();
    assert_eq!(fetched.as_ref(), data.as_slice());

    let info = store.get_info("a/b.txt", &cancel).await.unwrap();
    assert_eq!(info.digest, meta.digest);
}

#[tokio::test]
async fn a_mismatched_recorded_digest_fails_get() {
    let cancel = CancellationToken::new();
    let connection = connect_against_fake_jetstream().await;
    let js = Context::new(Arc::clone(&connection));
    let store = ObjectStore::create(js.clone(), BucketConfig::new("bkt"), &cancel)
        .await
        .unwrap();

    store
        .put("small.bin", b"hello world", PutOptions::default(), &cancel)
        .await
        .unwrap();

    // Republish the metadata record with a digest that no longer matches
    // the chunks already on the stream, simulating corruption in transit.
    let mut corrupted = store.get_info("small.bin", &cancel).await.unwrap();
    corrupted.digest = Some("SHA-256=not-the-real-digest".to_string());
    let payload = bytes::Bytes::from(serde_json::to_vec(&corrupted).unwrap());
    js.publish_with_rollup("$O.bkt.M.c21hbGwuYmlu", payload, &cancel)
        .await
        .unwrap();

    let err = store.get("small.bin", &cancel).await.unwrap_err();
    assert!(matches!(err, NatsError::ObjectStore(ObjectStoreError::DigestMismatch { .. })), "got {err:?}");
}

#[tokio::test]
async fn delete_soft_deletes_and_masks_existence() {
    let cancel = CancellationToken::new();
    let connection = connect_against_fake_jetstream().await;
    let js = Context::new(Arc::clone(&connection));
    let store = ObjectStore::create(js, BucketConfig::new("bkt"), &cancel).await.unwrap();

    store.put("a.txt", b"hello", PutOptions::default(), &cancel).await.unwrap();
    store.put("b.txt", b"world", PutOptions::default(), &cancel).await.unwrap();
    store.delete("a.txt", &cancel).await.unwrap();

    assert!(!store.exists("a.txt", &cancel).await);
    let err = store.get("a.txt", &cancel).await.unwrap_err();
    assert!(matches!(err, NatsError::ObjectStore(ObjectStoreError::ObjectNotFound(_))), "got {err:?}");

    let live = store.list(false, &cancel).await.unwrap();
    assert_eq!(live.len(), 1);
    assert_eq!(live[0].name, "b.txt");

    let all = store.list(true, &cancel).await.unwrap();
    assert_eq!(all.len(), 2);
    assert!(all.iter().any(|o| o.name == "a.txt" && o.deleted));
}

#[tokio::test]
async fn get_on_a_never_stored_name_is_object_not_found() {
    let cancel = CancellationToken::new();
    let connection = connect_against_fake_jetstream().await;
    let js = Context::new(Arc::clone(&connection));
    let store = ObjectStore::create(js, BucketConfig::new("bkt"), &cancel).await.unwrap();

    let err = store.get_info("nope", &cancel).await.unwrap_err();
    assert!(matches!(err, NatsError::ObjectStore(ObjectStoreError::ObjectNotFound(_))), "got {err:?}");
}

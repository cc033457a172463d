use criterion::{criterion_group, criterion_main, Criterion};
use nats_ws::codec::{encode_connect, encode_pub, encode_sub, encode_unsub, FrameCodec};
use nats_ws::protocol::ConnectCommand;

fn parse_one(input: &[u8]) {
    let mut codec = FrameCodec::new();
    codec.feed(input);
    codec.try_parse().unwrap();
}

fn benchmark_parser(c: &mut Criterion) {
    c.bench_function("connect_parse", |b| {
        let cmd =
            b"CONNECT {\"verbose\":false,\"pedantic\":false,\"name\":\"nats-ws\",\"lang\":\"rust\",\"version\":\"1.0.0\"}\r\n";
        b.iter(|| parse_one(cmd));
    });

    c.bench_function("connect_write", |b| {
        let cmd = ConnectCommand::builder()
            .lang("rust")
            .version("1.0.0")
            .build()
            .unwrap();
        let json = serde_json::to_value(&cmd).unwrap();
        b.iter(|| encode_connect(&json));
    });

    c.bench_function("pub_parse", |b| {
        let cmd = b"PUB FOO 11\r\nHello NATS!\r\n";
        b.iter(|| parse_one(cmd));
    });

    c.bench_function("pub_write", |b| {
        b.iter(|| encode_pub("FOO", None, b"Hello NATS!"));
    });

    c.bench_function("sub_parse", |b| {
        let cmd = b"SUB FOO pouet 1\r\n";
        b.iter(|| parse_one(cmd));
    });

    c.bench_function("sub_write", |b| {
        b.iter(|| encode_sub("FOO", Some("pouet"), 1));
    });

    c.bench_function("unsub_parse", |b| {
        let cmd = b"UNSUB 1\r\n";
        b.iter(|| parse_one(cmd));
    });

    c.bench_function("unsub_write", |b| {
        b.iter(|| encode_unsub(1, None));
    });

    c.bench_function("info_parse", |b| {
        let cmd = b"INFO {\"server_id\":\"test\",\"version\":\"1.3.0\",\"go\":\"go1.10.3\",\"host\":\"0.0.0.0\",\"port\":4222,\"max_payload\":4000,\"proto\":1,\"client_id\":1337}\r\n";
        b.iter(|| parse_one(cmd));
    });

    c.bench_function("message_parse", |b| {
        let cmd = b"MSG FOO pouet 4\r\ntoto\r\n";
        b.iter(|| parse_one(cmd));
    });

    c.bench_function("message_write", |b| {
        b.iter(|| encode_pub("FOO", Some("pouet"), b"toto"));
    });

    c.bench_function("hmessage_parse", |b| {
        let cmd = b"HMSG FOO pouet 12 16\r\nNATS/1.0\r\n\r\ntoto\r\n";
        b.iter(|| parse_one(cmd));
    });
}

criterion_group!(benches, benchmark_parser);
criterion_main!(benches);

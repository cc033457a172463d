//! A minimal in-memory stand-in for the `$JS.API.*` request/reply surface
//! and the Object Store's chunk/metadata subjects, driven over a
//! [`crate::support::MockServer`] exactly as a real `nats-server` would be.
//! Deliberately narrow: it only understands the operations the Object
//! Store actually issues (create/info/purge/direct-get and chunk/metadata
//! publish), not the full JetStream API surface.

use std::collections::HashMap;

use bytes::Bytes;
use nats_ws::NatsHeaders;
use tokio::sync::mpsc;

use crate::support::MockServer;

struct StoredMessage {
    subject: String,
    headers: Option<NatsHeaders>,
    payload: Bytes,
    seq: u64,
}

#[derive(Default)]
struct FakeStream {
    messages: Vec<StoredMessage>,
    next_seq: u64,
}

/// Owns every stream this server has seen and answers requests against
/// them until its [`MockServer`]'s channel closes.
pub struct FakeJetStream {
    streams: HashMap<String, FakeStream>,
}

impl FakeJetStream {
    pub fn new() -> Self {
        FakeJetStream { streams: HashMap::new() }
    }

    pub async fn run(mut self, server: MockServer) {
        let MockServer { to_client, mut from_client } = server;
        while let Some(bytes) = from_client.recv().await {
            match parse_client_frame(&bytes) {
                ClientFrame::Pub { subject, reply_to, payload } => {
                    if let Some(reply) = reply_to {
                        self.handle(&subject, None, payload, &reply, &to_client);
                    }
                }
                ClientFrame::HPub { subject, reply_to, headers, payload } => {
                    if let Some(reply) = reply_to {
                        self.handle(&subject, Some(headers), payload, &reply, &to_client);
                    }
                }
                ClientFrame::Other => {}
            }
        }
    }

    fn handle(
        &mut self,
        subject: &str,
        headers: Option<NatsHeaders>,
        payload: Bytes,
        reply_to: &str,
        to_client: &mpsc::UnboundedSender<Vec<u8>>,
    ) {
        if let Some(name) = subject.strip_prefix("$JS.API.STREAM.CREATE.") {
            self.streams.entry(name.to_string()).or_default();
            reply_json(to_client, reply_to, &stream_info_json(name, &HashMap::new(), 0));
            return;
        }

        if let Some(name) = subject.strip_prefix("$JS.API.STREAM.INFO.") {
            let request: serde_json::Value = serde_json::from_slice(&payload).unwrap_or_default();
            let filter = request.get("subjects_filter").and_then(|v| v.as_str());
            let stream = self.streams.entry(name.to_string()).or_default();
            let mut subjects = HashMap::new();
            if let Some(filter) = filter {
                let prefix = filter.trim_end_matches('>');
                for m in &stream.messages {
                    if m.subject.starts_with(prefix) {
                        *subjects.entry(m.subject.clone()).or_insert(0u64) += 1;
                    }
                }
            }
            reply_json(to_client, reply_to, &stream_info_json(name, &subjects, stream.next_seq));
            return;
        }

        if let Some(name) = subject.strip_prefix("$JS.API.STREAM.PURGE.") {
            let request: serde_json::Value = serde_json::from_slice(&payload).unwrap_or_default();
            let filter = request.get("filter").and_then(|v| v.as_str()).map(String::from);
            let mut purged = 0u64;
            if let Some(stream) = self.streams.get_mut(name) {
                match filter {
                    Some(filter) => {
                        let before = stream.messages.len();
                        stream.messages.retain(|m| m.subject != filter);
                        purged = (before - stream.messages.len()) as u64;
                    }
                    None => {
                        purged = stream.messages.len() as u64;
                        stream.messages.clear();
                    }
                }
            }
            reply_json(to_client, reply_to, &serde_json::json!({"success": true, "purged": purged}));
            return;
        }

        if let Some(name) = subject.strip_prefix("$JS.API.DIRECT.GET.") {
            let request: serde_json::Value = serde_json::from_slice(&payload).unwrap_or_default();
            let found = if let Some(subj) = request.get("last_by_subj").and_then(|v| v.as_str()) {
                self.streams.get(name).and_then(|s| s.messages.iter().rev().find(|m| m.subject == subj))
            } else if let Some(subj) = request.get("next_by_subj").and_then(|v| v.as_str()) {
                let after = request.get("seq").and_then(|v| v.as_u64()).unwrap_or(0);
                self.streams.get(name).and_then(|s| s.messages.iter().find(|m| m.subject == subj && m.seq > after))
            } else {
                None
            };
            match found {
                Some(message) => {
                    let mut h = NatsHeaders::new();
                    h.set("Nats-Sequence", message.seq.to_string());
                    let frame = build_hmsg_frame(reply_to, &h, &message.payload);
                    let _ = to_client.send(frame);
                }
                None => {
                    let h = NatsHeaders::with_status(404, "Message Not Found");
                    let frame = build_hmsg_frame(reply_to, &h, b"");
                    let _ = to_client.send(frame);
                }
            }
            return;
        }

        if let Some(stream_name) = object_stream_for(subject) {
            let rollup = headers.as_ref().map(|h| h.get("Nats-Rollup") == Some("sub")).unwrap_or(false);
            let stream = self.streams.entry(stream_name).or_default();
            stream.next_seq += 1;
            let seq = stream.next_seq;
            if rollup {
                stream.messages.retain(|m| m.subject != subject);
            }
            stream.messages.push(StoredMessage {
                subject: subject.to_string(),
                headers,
                payload,
                seq,
            });
            reply_json(to_client, reply_to, &serde_json::json!({"stream": "obj", "seq": seq, "duplicate": false}));
        }
    }
}

fn stream_info_json(name: &str, subjects: &HashMap<String, u64>, last_seq: u64) -> serde_json::Value {
    serde_json::json!({
        "config": {
            "name": name,
            "subjects": [],
            "retention": "limits",
            "discard": "new",
            "storage": "file",
            "num_replicas": 1,
            "allow_rollup_hdrs": true,
            "allow_direct": true,
        },
        "state": {
            "messages": subjects.values().sum::<u64>(),
            "bytes": 0,
            "first_seq": 0,
            "last_seq": last_seq,
            "subjects": subjects,
        },
    })
}

fn reply_json(to_client: &mpsc::UnboundedSender<Vec<u8>>, reply_to: &str, value: &serde_json::Value) {
    let payload = serde_json::to_vec(value).unwrap();
    let _ = to_client.send(build_msg_frame(reply_to, &payload));
}

fn object_stream_for(subject: &str) -> Option<String> {
    let mut parts = subject.split('.');
    if parts.next()? != "$O" {
        return None;
    }
    let bucket = parts.next()?;
    Some(format!("OBJ_{bucket}"))
}

fn build_msg_frame(subject: &str, payload: &[u8]) -> Vec<u8> {
    let mut out = format!("MSG {subject} 1 {}\r\n", payload.len()).into_bytes();
    out.extend_from_slice(payload);
    out.extend_from_slice(b"\r\n");
    out
}

fn build_hmsg_frame(subject: &str, headers: &NatsHeaders, payload: &[u8]) -> Vec<u8> {
    let header_bytes = headers.to_wire();
    let total = header_bytes.len() + payload.len();
    let mut out = format!("HMSG {subject} 1 {} {total}\r\n", header_bytes.len()).into_bytes();
    out.extend_from_slice(&header_bytes);
    out.extend_from_slice(payload);
    out.extend_from_slice(b"\r\n");
    out
}

enum ClientFrame {
    Pub {
        subject: String,
        reply_to: Option<String>,
        payload: Bytes,
    },
    HPub {
        subject: String,
        reply_to: Option<String>,
        headers: NatsHeaders,
        payload: Bytes,
    },
    Other,
}

/// Parses exactly the two client->server command shapes this fake server
/// needs to understand; every JetStream/Object Store call the connection
/// core makes is a request (always carries a reply-to), so that's all
/// that's handled here.
fn parse_client_frame(bytes: &[u8]) -> ClientFrame {
    let line_end = match bytes.windows(2).position(|w| w == b"\r\n") {
        Some(pos) => pos,
        None => return ClientFrame::Other,
    };
    let line = match std::str::from_utf8(&bytes[..line_end]) {
        Ok(s) => s,
        Err(_) => return ClientFrame::Other,
    };
    let mut tokens = line.split_whitespace();
    let op = tokens.next().unwrap_or("");
    let rest: Vec<&str> = tokens.collect();

    match op {
        "PUB" => {
            let (subject, reply_to) = match rest.len() {
                2 => (rest[0], None),
                3 => (rest[0], Some(rest[1])),
                _ => return ClientFrame::Other,
            };
            let payload_start = line_end + 2;
            let payload_end = bytes.len().saturating_sub(2);
            ClientFrame::Pub {
                subject: subject.to_string(),
                reply_to: reply_to.map(String::from),
                payload: Bytes::copy_from_slice(&bytes[payload_start..payload_end]),
            }
        }
        "HPUB" => {
            let (subject, reply_to, hlen) = match rest.len() {
                3 => (rest[0], None, rest[1]),
                4 => (rest[0], Some(rest[1]), rest[2]),
                _ => return ClientFrame::Other,
            };
            let hlen: usize = match hlen.parse() {
                Ok(n) => n,
                Err(_) => return ClientFrame::Other,
            };
            let block_start = line_end + 2;
            let header_bytes = &bytes[block_start..block_start + hlen];
            let payload_start = block_start + hlen;
            let payload_end = bytes.len().saturating_sub(2);
            let headers = NatsHeaders::from_wire(header_bytes).unwrap_or_default();
            ClientFrame::HPub {
                subject: subject.to_string(),
                reply_to: reply_to.map(String::from),
                headers,
                payload: Bytes::copy_from_slice(&bytes[payload_start..payload_end]),
            }
        }
        _ => ClientFrame::Other,
    }
}

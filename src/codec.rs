//! The wire protocol frame codec.
//!
//! Maintains an append-only byte buffer with read/write cursors. Bytes
//! arriving from the transport are appended via [`FrameCodec::feed`];
//! [`FrameCodec::try_parse`] extracts one complete frame at a time and
//! advances the read cursor by exactly that frame's length.

use bytes::Bytes;
use serde_json::Value as Json;

use crate::error::NatsError;

/// One parsed inbound/outbound NATS operation.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Ping,
    Pong,
    Ok,
    Err(String),
    Info(Json),
    Msg {
        subject: String,
        sid: String,
        reply_to: Option<String>,
        payload: Bytes,
    },
    HMsg {
        subject: String,
        sid: String,
        reply_to: Option<String>,
        header_bytes: Bytes,
        payload: Bytes,
    },
}

const INITIAL_CAPACITY: usize = 4 * 1024;

/// Incremental parser/serializer over a single append-only buffer.
///
/// Unread bytes are compacted to the start of the buffer when the tail runs
/// out of room; the buffer doubles in size if compaction alone doesn't make
/// room for the incoming chunk.
pub struct FrameCodec {
    buf: Vec<u8>,
    read_pos: usize,
    write_pos: usize,
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameCodec {
    pub fn new() -> Self {
        FrameCodec {
            buf: vec![0u8; INITIAL_CAPACITY],
            read_pos: 0,
            write_pos: 0,
        }
    }

    /// Appends freshly-received bytes to the buffer.
    pub fn feed(&mut self, bytes: &[u8]) {
        self.reserve(bytes.len());
        let end = self.write_pos + bytes.len();
        self.buf[self.write_pos..end].copy_from_slice(bytes);
        self.write_pos = end;
    }

    fn unread(&self) -> &[u8] {
        &self.buf[self.read_pos..self.write_pos]
    }

    fn reserve(&mut self, additional: usize) {
        let tail_room = self.buf.len() - self.write_pos;
        if tail_room >= additional {
            return;
        }

        if self.read_pos > 0 {
            self.buf.copy_within(self.read_pos..self.write_pos, 0);
            self.write_pos -= self.read_pos;
            self.read_pos = 0;
        }

        let mut cap = self.buf.len();
        while cap - self.write_pos < additional {
            cap = (cap * 2).max(INITIAL_CAPACITY);
        }
        self.buf.resize(cap, 0);
    }

    fn advance(&mut self, n: usize) {
        self.read_pos += n;
        if self.read_pos == self.write_pos {
            // Nothing left unread: reset cursors so the buffer doesn't creep
            // forward forever on a steady stream of small frames.
            self.read_pos = 0;
            self.write_pos = 0;
        }
    }

    /// Attempts to extract one complete frame from the buffer.
    ///
    /// Returns `Ok(None)` when the buffer holds only a partial frame — in
    /// that case nothing is consumed. Malformed MSG/HMSG lines are surfaced
    /// as `Frame::Err` with the command line consumed so the stream
    /// resynchronizes at the next CRLF.
    pub fn try_parse(&mut self) -> Result<Option<Frame>, NatsError> {
        let data = self.unread();
        if data.is_empty() {
            return Ok(None);
        }

        if data.len() >= 6 && &data[..6] == b"PING\r\n" {
            self.advance(6);
            return Ok(Some(Frame::Ping));
        }
        if data.len() >= 6 && &data[..6] == b"PONG\r\n" {
            self.advance(6);
            return Ok(Some(Frame::Pong));
        }

        let crlf_pos = match find_crlf(data) {
            Some(p) => p,
            None => return Ok(None),
        };

        let line = std::str::from_utf8(&data[..crlf_pos])
            .map_err(|e| NatsError::ProtocolError(format!("command line is not valid UTF-8: {e}")))?;
        let line_len = crlf_pos + 2;

        // Own the split pieces so the immutable borrow of `self` (via `data`)
        // ends here, freeing `self` up for the mutable calls below.
        let (token, rest) = split_first_token(line);
        let token = token.to_string();
        let rest = rest.to_string();

        if token.eq_ignore_ascii_case("+OK") {
            self.advance(line_len);
            return Ok(Some(Frame::Ok));
        }

        if token.eq_ignore_ascii_case("-ERR") {
            self.advance(line_len);
            return Ok(Some(Frame::Err(strip_quotes(rest.trim()))));
        }

        if token.eq_ignore_ascii_case("INFO") {
            let value: Json = serde_json::from_str(rest.trim())?;
            self.advance(line_len);
            return Ok(Some(Frame::Info(value)));
        }

        if token.eq_ignore_ascii_case("MSG") {
            return self.try_parse_msg(&rest, crlf_pos);
        }

        if token.eq_ignore_ascii_case("HMSG") {
            return self.try_parse_hmsg(&rest, crlf_pos);
        }

        // Unrecognized leading token: malformed, resynchronize at the next line.
        self.advance(line_len);
        Ok(Some(Frame::Err(format!("unknown protocol operation {token:?}"))))
    }

    fn try_parse_msg(&mut self, rest: &str, crlf_pos: usize) -> Result<Option<Frame>, NatsError> {
        let tokens: Vec<&str> = rest.split_whitespace().collect();
        if tokens.len() != 3 && tokens.len() != 4 {
            self.advance(crlf_pos + 2);
            return Ok(Some(Frame::Err(format!(
                "malformed MSG line: expected 3 or 4 fields, got {}",
                tokens.len()
            ))));
        }

        let subject = tokens[0].to_string();
        let sid = tokens[1].to_string();
        let (reply_to, byte_count_tok) = if tokens.len() == 4 {
            (Some(tokens[2].to_string()), tokens[3])
        } else {
            (None, tokens[2])
        };

        let byte_count: usize = match byte_count_tok.parse() {
            Ok(n) => n,
            Err(_) => {
                self.advance(crlf_pos + 2);
                return Ok(Some(Frame::Err(format!(
                    "malformed MSG line: invalid byte count {byte_count_tok:?}"
                ))));
            }
        };

        let total_needed = crlf_pos + 2 + byte_count + 2;
        let data = self.unread();
        if data.len() < total_needed {
            return Ok(None);
        }

        let payload_start = crlf_pos + 2;
        let payload_end = payload_start + byte_count;
        if &data[payload_end..payload_end + 2] != b"\r\n" {
            self.advance(crlf_pos + 2);
            return Ok(Some(Frame::Err(
                "malformed MSG: payload not terminated by CRLF".into(),
            )));
        }

        let payload = Bytes::copy_from_slice(&data[payload_start..payload_end]);
        self.advance(total_needed);
        Ok(Some(Frame::Msg {
            subject,
            sid,
            reply_to,
            payload,
        }))
    }

    fn try_parse_hmsg(&mut self, rest: &str, crlf_pos: usize) -> Result<Option<Frame>, NatsError> {
        let tokens: Vec<&str> = rest.split_whitespace().collect();
        if tokens.len() != 4 && tokens.len() != 5 {
            self.advance(crlf_pos + 2);
            return Ok(Some(Frame::Err(format!(
                "malformed HMSG line: expected 4 or 5 fields, got {}",
                tokens.len()
            ))));
        }

        let subject = tokens[0].to_string();
        let sid = tokens[1].to_string();
        let (reply_to, hlen_tok, tlen_tok) = if tokens.len() == 5 {
            (Some(tokens[2].to_string()), tokens[3], tokens[4])
        } else {
            (None, tokens[2], tokens[3])
        };

        let (header_len, total_len): (usize, usize) = match (hlen_tok.parse(), tlen_tok.parse()) {
            (Ok(h), Ok(t)) if t >= h => (h, t),
            _ => {
                self.advance(crlf_pos + 2);
                return Ok(Some(Frame::Err(format!(
                    "malformed HMSG line: invalid lengths {hlen_tok:?}/{tlen_tok:?}"
                ))));
            }
        };

        let total_needed = crlf_pos + 2 + total_len + 2;
        let data = self.unread();
        if data.len() < total_needed {
            return Ok(None);
        }

        let block_start = crlf_pos + 2;
        let block_end = block_start + total_len;
        if &data[block_end..block_end + 2] != b"\r\n" {
            self.advance(crlf_pos + 2);
            return Ok(Some(Frame::Err(
                "malformed HMSG: payload not terminated by CRLF".into(),
            )));
        }

        let header_bytes = Bytes::copy_from_slice(&data[block_start..block_start + header_len]);
        let payload = Bytes::copy_from_slice(&data[block_start + header_len..block_end]);
        self.advance(total_needed);
        Ok(Some(Frame::HMsg {
            subject,
            sid,
            reply_to,
            header_bytes,
            payload,
        }))
    }
}

fn find_crlf(data: &[u8]) -> Option<usize> {
    data.windows(2).position(|w| w == b"\r\n")
}

fn split_first_token(line: &str) -> (&str, &str) {
    match line.find(char::is_whitespace) {
        Some(idx) => (&line[..idx], line[idx..].trim_start()),
        None => (line, ""),
    }
}

fn strip_quotes(s: &str) -> String {
    let s = s.strip_prefix('\'').unwrap_or(s);
    let s = s.strip_suffix('\'').unwrap_or(s);
    s.to_string()
}

/// Serializes a `PUB <subj> [<reply>] <n>\r\n<payload>\r\n` frame.
pub fn encode_pub(subject: &str, reply_to: Option<&str>, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(subject.len() + payload.len() + 32);
    out.extend_from_slice(b"PUB ");
    out.extend_from_slice(subject.as_bytes());
    out.push(b' ');
    if let Some(reply) = reply_to {
        out.extend_from_slice(reply.as_bytes());
        out.push(b' ');
    }
    out.extend_from_slice(payload.len().to_string().as_bytes());
    out.extend_from_slice(b"\r\n");
    out.extend_from_slice(payload);
    out.extend_from_slice(b"\r\n");
    out
}

/// Serializes an `HPUB <subj> [<reply>] <hlen> <tlen>\r\n<hdr+payload>\r\n` frame.
pub fn encode_hpub(subject: &str, reply_to: Option<&str>, header_bytes: &[u8], payload: &[u8]) -> Vec<u8> {
    let total_len = header_bytes.len() + payload.len();
    let mut out = Vec::with_capacity(subject.len() + total_len + 40);
    out.extend_from_slice(b"HPUB ");
    out.extend_from_slice(subject.as_bytes());
    out.push(b' ');
    if let Some(reply) = reply_to {
        out.extend_from_slice(reply.as_bytes());
        out.push(b' ');
    }
    out.extend_from_slice(header_bytes.len().to_string().as_bytes());
    out.push(b' ');
    out.extend_from_slice(total_len.to_string().as_bytes());
    out.extend_from_slice(b"\r\n");
    out.extend_from_slice(header_bytes);
    out.extend_from_slice(payload);
    out.extend_from_slice(b"\r\n");
    out
}

/// Serializes a `SUB <subj> [<queue>] <sid>\r\n` frame.
pub fn encode_sub(subject: &str, queue_group: Option<&str>, sid: u64) -> Vec<u8> {
    match queue_group {
        Some(q) => format!("SUB {subject} {q} {sid}\r\n").into_bytes(),
        None => format!("SUB {subject} {sid}\r\n").into_bytes(),
    }
}

/// Serializes an `UNSUB <sid> [<max>]\r\n` frame.
pub fn encode_unsub(sid: u64, max_msgs: Option<u64>) -> Vec<u8> {
    match max_msgs {
        Some(max) => format!("UNSUB {sid} {max}\r\n").into_bytes(),
        None => format!("UNSUB {sid}\r\n").into_bytes(),
    }
}

/// Serializes a `CONNECT <json>\r\n` frame.
pub fn encode_connect(json: &Json) -> Vec<u8> {
    format!("CONNECT {json}\r\n").into_bytes()
}

pub fn encode_ping() -> &'static [u8] {
    b"PING\r\n"
}

pub fn encode_pong() -> &'static [u8] {
    b"PONG\r\n"
}

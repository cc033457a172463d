//! Connection core: handshake, read loop, keep-alive loop, reconnect loop,
//! and the publish/request/flush entry points.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use log::{debug, info, warn};
use parking_lot::{Mutex as SyncMutex, RwLock};
use rand::Rng;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::client::inbox::{generate_inbox_prefix, InboxCorrelator};
use crate::client::message::Message;
use crate::client::options::NatsClientOptions;
use crate::client::registry::SubscriptionRegistry;
use crate::client::sender::TransportSender;
use crate::client::status::{ConnectionStatus, StatusCell};
use crate::codec::{encode_connect, encode_hpub, encode_ping, encode_pong, encode_pub, encode_sub, encode_unsub, Frame, FrameCodec};
use crate::error::{NatsError, NatsResult};
use crate::headers::NatsHeaders;
use crate::net::{Transport, TransportReader};
use crate::protocol::ServerInfo;

/// Owns one transport session, the parse buffer, the subscription registry,
/// the inbox, and the set of pending-request promises.
pub struct NatsConnection {
    options: NatsClientOptions,
    sender: Arc<TransportSender>,
    registry: Arc<SubscriptionRegistry>,
    inbox: RwLock<Arc<InboxCorrelator>>,
    inbox_sid: SyncMutex<u64>,
    server_info: RwLock<Option<ServerInfo>>,
    status: Arc<StatusCell>,
    error_tx: broadcast::Sender<String>,
    flush_waiters: SyncMutex<VecDeque<oneshot::Sender<()>>>,
    outstanding_pings: AtomicU32,
    user_closed: std::sync::atomic::AtomicBool,
    cancel: CancellationToken,
    tasks: SyncMutex<Vec<JoinHandle<()>>>,
}

impl NatsConnection {
    /// Opens the transport, performs the handshake, and starts the
    /// background loops. The returned connection is `Connected`.
    pub async fn connect(options: NatsClientOptions) -> NatsResult<Arc<Self>> {
        let cancel = CancellationToken::new();
        let status = Arc::new(StatusCell::new(ConnectionStatus::Connecting));
        let (error_tx, _) = broadcast::channel(64);

        let mut transport = options.transport_factory.create();
        let timeout_cancel = cancel.child_token();
        let (server_info, mut codec) = tokio::time::timeout(
            options.connect_timeout,
            handshake(transport.as_mut(), &options, &timeout_cancel),
        )
        .await
        .map_err(|_| NatsError::HandshakeTimeout(options.connect_timeout))??;

        let prefix = generate_inbox_prefix();
        let registry = Arc::new(SubscriptionRegistry::new());
        let inbox = Arc::new(InboxCorrelator::new(prefix));
        let (inbox_sid, inbox_rx) = registry.add(inbox.wildcard_subject(), None);
        spawn_inbox_forwarder(Arc::clone(&inbox), inbox_rx);
        let sub_bytes = encode_sub(&inbox.wildcard_subject(), None, inbox_sid);
        transport.send(&sub_bytes, &cancel).await?;

        let (reader, writer) = transport.split();
        let sender = Arc::new(TransportSender::new(writer));

        let conn = Arc::new(NatsConnection {
            options,
            sender,
            registry,
            inbox: RwLock::new(inbox),
            inbox_sid: SyncMutex::new(inbox_sid),
            server_info: RwLock::new(Some(server_info)),
            status,
            error_tx,
            flush_waiters: SyncMutex::new(VecDeque::new()),
            outstanding_pings: AtomicU32::new(0),
            user_closed: std::sync::atomic::AtomicBool::new(false),
            cancel,
            tasks: SyncMutex::new(Vec::new()),
        });

        conn.status.set(ConnectionStatus::Connected);
        // Drain whatever the handshake already buffered (e.g. the server's
        // reply to a publish that raced the CONNECT/PING exchange) before
        // the read loop takes over polling the transport.
        while let Some(frame) = codec.try_parse()? {
            conn.handle_frame(frame).await;
        }
        conn.spawn_loops(codec, reader);
        Ok(conn)
    }

    fn spawn_loops(self: &Arc<Self>, codec: FrameCodec, reader: Box<dyn TransportReader>) {
        let read_loop = tokio::spawn(Arc::clone(self).run_read_loop(codec, reader));
        let keepalive_loop = tokio::spawn(Arc::clone(self).run_keepalive_loop());
        let mut tasks = self.tasks.lock();
        tasks.push(read_loop);
        tasks.push(keepalive_loop);
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status.get()
    }

    pub fn subscribe_status(&self) -> broadcast::Receiver<ConnectionStatus> {
        self.status.subscribe()
    }

    pub fn subscribe_errors(&self) -> broadcast::Receiver<String> {
        self.error_tx.subscribe()
    }

    pub fn server_info(&self) -> Option<ServerInfo> {
        self.server_info.read().clone()
    }

    fn check_payload_size(&self, len: usize) -> NatsResult<()> {
        if let Some(info) = self.server_info.read().as_ref() {
            if len > info.max_payload as usize {
                return Err(NatsError::MaxPayloadExceeded {
                    max: info.max_payload,
                    actual: len,
                });
            }
        }
        Ok(())
    }

    /// Publishes `payload` on `subject`. Serializes PUB or HPUB depending on
    /// whether `headers` is set. `cancel` is the caller's own cancellation
    /// budget, linked alongside the connection's own (the write still goes
    /// through the connection's single send mutex via `self.cancel`).
    pub async fn publish(
        &self,
        subject: &str,
        payload: Bytes,
        reply_to: Option<&str>,
        headers: Option<&NatsHeaders>,
        cancel: &CancellationToken,
    ) -> NatsResult<()> {
        crate::protocol::validate_token(subject, "subject")?;
        self.check_payload_size(payload.len())?;
        if self.status.get() != ConnectionStatus::Connected {
            return Err(NatsError::NotConnected);
        }

        let bytes = match headers {
            Some(h) => encode_hpub(subject, reply_to, &h.to_wire(), &payload),
            None => encode_pub(subject, reply_to, &payload),
        };
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(NatsError::Cancelled),
            result = self.sender.send(&bytes, &self.cancel) => result,
        }
    }

    /// Subscribes to `subject`, optionally as part of `queue_group`.
    pub async fn subscribe(
        &self,
        subject: &str,
        queue_group: Option<&str>,
        cancel: &CancellationToken,
    ) -> NatsResult<(u64, mpsc::UnboundedReceiver<Message>)> {
        crate::protocol::validate_token(subject, "subject")?;
        if self.status.get() != ConnectionStatus::Connected {
            return Err(NatsError::NotConnected);
        }
        let (sid, rx) = self.registry.add(subject, queue_group.map(String::from));
        let bytes = encode_sub(subject, queue_group, sid);
        let sent = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(NatsError::Cancelled),
            result = self.sender.send(&bytes, &self.cancel) => result,
        };
        if let Err(e) = sent {
            self.registry.remove(sid);
            return Err(e);
        }
        Ok((sid, rx))
    }

    /// Unsubscribes `sid`, optionally after `max_msgs` more deliveries.
    pub async fn unsubscribe(&self, sid: u64, max_msgs: Option<u64>, cancel: &CancellationToken) -> NatsResult<()> {
        let bytes = encode_unsub(sid, max_msgs);
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(NatsError::Cancelled),
            result = self.sender.send(&bytes, &self.cancel) => result?,
        }
        if max_msgs.is_none() {
            self.registry.remove(sid);
        } else {
            self.registry.deactivate(sid);
        }
        Ok(())
    }

    /// Request/reply: reserves an inbox subject, publishes with reply-to
    /// set, and awaits the correlated reply under `timeout` (defaulting to
    /// `request_timeout`). The pending entry is always removed on return.
    pub async fn request(
        &self,
        subject: &str,
        payload: Bytes,
        timeout: Option<Duration>,
        cancel: &CancellationToken,
    ) -> NatsResult<Message> {
        self.request_with_headers(subject, payload, None, timeout, cancel).await
    }

    /// Like [`Self::request`], but attaches `headers` to the outbound
    /// request frame (used by the JetStream rollup-publish call).
    pub async fn request_with_headers(
        &self,
        subject: &str,
        payload: Bytes,
        headers: Option<&NatsHeaders>,
        timeout: Option<Duration>,
        cancel: &CancellationToken,
    ) -> NatsResult<Message> {
        let inbox = Arc::clone(&self.inbox.read());
        let (reply_subject, rx) = inbox.reserve();
        let deadline = timeout.unwrap_or(self.options.request_timeout);

        if let Err(e) = self.publish(subject, payload, Some(&reply_subject), headers, cancel).await {
            inbox.forget(&reply_subject);
            return Err(e);
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                inbox.forget(&reply_subject);
                Err(NatsError::Cancelled)
            }
            outcome = tokio::time::timeout(deadline, rx) => match outcome {
                Ok(Ok(result)) => result,
                Ok(Err(_)) => Err(NatsError::ConnectionClosed),
                Err(_) => {
                    inbox.forget(&reply_subject);
                    Err(NatsError::RequestTimeout {
                        subject: subject.to_string(),
                    })
                }
            },
        }
    }

    /// Enqueues a completion promise, sends PING, and awaits it; each
    /// incoming PONG resolves the oldest queued waiter.
    pub async fn flush(&self, cancel: &CancellationToken) -> NatsResult<()> {
        let (tx, rx) = oneshot::channel();
        self.flush_waiters.lock().push_back(tx);
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(NatsError::Cancelled),
            result = self.sender.send(encode_ping(), &self.cancel) => result?,
        }
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(NatsError::Cancelled),
            outcome = tokio::time::timeout(self.options.request_timeout, rx) => outcome
                .map_err(|_| NatsError::RequestTimeout { subject: "<flush>".to_string() })?
                .map_err(|_| NatsError::ConnectionClosed),
        }
    }

    /// Closes the connection. Cancels the background loops and best-effort
    /// closes the transport; does not await their shutdown.
    pub async fn close(&self) {
        self.user_closed.store(true, Ordering::SeqCst);
        self.status.set(ConnectionStatus::Closed);
        self.cancel.cancel();
        self.sender.close(&self.cancel).await;
    }

    async fn handle_frame(&self, frame: Frame) {
        match frame {
            Frame::Ping => {
                if let Err(e) = self.sender.send(encode_pong(), &self.cancel).await {
                    self.report_error(format!("failed to reply to PING: {e}"));
                }
            }
            Frame::Pong => {
                self.outstanding_pings.store(0, Ordering::SeqCst);
                if let Some(tx) = self.flush_waiters.lock().pop_front() {
                    let _ = tx.send(());
                }
            }
            Frame::Ok => {}
            Frame::Err(text) => {
                self.report_error(format!("server error: {text}"));
            }
            Frame::Info(json) => {
                if let Ok(info) = serde_json::from_value::<ServerInfo>(json) {
                    *self.server_info.write() = Some(info);
                }
            }
            Frame::Msg { .. } | Frame::HMsg { .. } => {
                self.route_message(frame);
            }
        }
    }

    fn route_message(&self, frame: Frame) {
        let (sid, message) = match crate::client::registry::build_message(frame) {
            Some(pair) => pair,
            None => return,
        };
        let inbox = Arc::clone(&self.inbox.read());
        if inbox.owns(&message.subject) {
            if inbox.resolve(message) {
                return;
            }
        }
        let frame = rebuild_frame(sid, message);
        if !self.registry.dispatch(frame) {
            debug!("dropping message for unknown or inactive sid");
        }
    }

    fn report_error(&self, message: String) {
        warn!("{message}");
        let _ = self.error_tx.send(message);
    }

    async fn run_read_loop(self: Arc<Self>, mut codec: FrameCodec, mut reader: Box<dyn TransportReader>) {
        let buf_size = self.options.receive_buffer_size;
        let mut buf = vec![0u8; buf_size];
        loop {
            if let Some(frame) = match codec.try_parse() {
                Ok(frame) => frame,
                Err(e) => {
                    self.report_error(format!("frame parse error: {e}"));
                    continue;
                }
            } {
                self.handle_frame(frame).await;
                continue;
            }

            let n = match reader.receive(&mut buf, 0, buf_size, &self.cancel).await {
                Ok(n) => n,
                Err(e) => {
                    self.report_error(format!("transport read error: {e}"));
                    break;
                }
            };
            if n == 0 {
                debug!("transport closed (orderly EOF)");
                break;
            }
            codec.feed(&buf[..n]);
        }

        self.on_read_loop_exit().await;
    }

    async fn on_read_loop_exit(self: Arc<Self>) {
        if self.user_closed.load(Ordering::SeqCst) || self.cancel.is_cancelled() {
            return;
        }
        if self.options.allow_reconnect {
            tokio::spawn(self.clone().reconnect_loop());
        } else {
            self.fail_everything_outstanding(NatsError::ConnectionClosed);
            self.status.set(ConnectionStatus::Disconnected);
        }
    }

    fn fail_everything_outstanding(&self, err: NatsError) {
        self.inbox.read().fail_all(&err);
        for tx in self.flush_waiters.lock().drain(..) {
            let _ = tx.send(());
        }
    }

    async fn run_keepalive_loop(self: Arc<Self>) {
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return,
                _ = tokio::time::sleep(self.options.ping_interval) => {}
            }
            if self.status.get() != ConnectionStatus::Connected {
                continue;
            }
            let outstanding = self.outstanding_pings.fetch_add(1, Ordering::SeqCst) + 1;
            if outstanding > self.options.max_ping_out {
                warn!("exceeded max_ping_out ({}); forcing reconnect", self.options.max_ping_out);
                self.sender.close(&self.cancel).await;
                return;
            }
            if let Err(e) = self.sender.send(encode_ping(), &self.cancel).await {
                self.report_error(format!("keepalive PING failed: {e}"));
                return;
            }
        }
    }

    async fn reconnect_loop(self: Arc<Self>) {
        self.status.set(ConnectionStatus::Reconnecting);
        self.fail_everything_outstanding(NatsError::ConnectionClosed);
        // The stale inbox's wildcard subscription dies with the old
        // session; drop it so it's excluded from the replay list below.
        self.registry.remove(*self.inbox_sid.lock());

        let replay = self.registry.resubscribe_commands();
        let mut delay = self.options.reconnect_delay;
        let mut attempt: i64 = 0;

        loop {
            if self.cancel.is_cancelled() || self.user_closed.load(Ordering::SeqCst) {
                return;
            }
            if self.options.max_reconnect_attempts >= 0 && attempt >= self.options.max_reconnect_attempts {
                warn!("exhausted max_reconnect_attempts; giving up");
                self.status.set(ConnectionStatus::Disconnected);
                return;
            }
            attempt += 1;

            let mut transport = self.options.transport_factory.create();
            let handshake_result = tokio::time::timeout(
                self.options.connect_timeout,
                handshake(transport.as_mut(), &self.options, &self.cancel),
            )
            .await;

            let (server_info, mut codec) = match handshake_result {
                Ok(Ok(pair)) => pair,
                Ok(Err(e)) => {
                    self.report_error(format!("reconnect attempt {attempt} failed: {e}"));
                    self.sleep_backoff(&mut delay).await;
                    continue;
                }
                Err(_) => {
                    self.report_error(format!("reconnect attempt {attempt} timed out"));
                    self.sleep_backoff(&mut delay).await;
                    continue;
                }
            };

            let prefix = generate_inbox_prefix();
            let new_inbox = Arc::new(InboxCorrelator::new(prefix));
            let (new_inbox_sid, inbox_rx) = self.registry.add(new_inbox.wildcard_subject(), None);
            spawn_inbox_forwarder(Arc::clone(&new_inbox), inbox_rx);

            let mut replay_ok = true;
            let sub_bytes = encode_sub(&new_inbox.wildcard_subject(), None, new_inbox_sid);
            if transport.send(&sub_bytes, &self.cancel).await.is_err() {
                replay_ok = false;
            }
            for (sid, bytes) in &replay {
                if transport.send(bytes, &self.cancel).await.is_err() {
                    replay_ok = false;
                    break;
                }
                debug!("replayed subscription sid {sid} after reconnect");
            }
            if !replay_ok {
                self.registry.remove(new_inbox_sid);
                self.report_error(format!("reconnect attempt {attempt} failed replaying subscriptions"));
                self.sleep_backoff(&mut delay).await;
                continue;
            }

            *self.inbox.write() = new_inbox;
            *self.inbox_sid.lock() = new_inbox_sid;
            *self.server_info.write() = Some(server_info);
            let (reader, writer) = transport.split();
            self.sender.replace(writer).await;
            self.outstanding_pings.store(0, Ordering::SeqCst);
            self.status.set(ConnectionStatus::Connected);

            while let Ok(Some(frame)) = codec.try_parse() {
                self.handle_frame(frame).await;
            }
            self.spawn_loops(codec, reader);
            return;
        }
    }

    async fn sleep_backoff(&self, delay: &mut Duration) {
        let sleep_for = if self.options.reconnect_jitter {
            jittered(*delay)
        } else {
            *delay
        };
        tokio::select! {
            _ = self.cancel.cancelled() => {}
            _ = tokio::time::sleep(sleep_for) => {}
        }
        *delay = std::cmp::min(*delay * 2, self.options.max_reconnect_delay);
    }
}

fn jittered(base: Duration) -> Duration {
    let factor = rand::thread_rng().gen_range(0.75..=1.25);
    Duration::from_secs_f64(base.as_secs_f64() * factor)
}

/// Forwards every message the inbox's own wildcard subscription receives
/// into the correlator, so a reply that outraces a `resolve()` registration
/// race is still observed by `route_message`'s direct-dispatch path. In
/// practice `route_message` resolves inbox replies before they ever reach
/// the registry, so this task only drains messages that could not be
/// matched to a pending request (e.g. a reply that arrived after its
/// request timed out) and discards them.
fn spawn_inbox_forwarder(_inbox: Arc<InboxCorrelator>, mut rx: mpsc::UnboundedReceiver<Message>) {
    tokio::spawn(async move { while rx.recv().await.is_some() {} });
}

fn rebuild_frame(sid: String, message: Message) -> Frame {
    match message.headers {
        Some(headers) => Frame::HMsg {
            subject: message.subject,
            sid,
            reply_to: message.reply_to,
            header_bytes: Bytes::from(headers.to_wire()),
            payload: message.payload,
        },
        None => Frame::Msg {
            subject: message.subject,
            sid,
            reply_to: message.reply_to,
            payload: message.payload,
        },
    }
}

/// Drives the handshake: read INFO, build and send CONNECT
/// (filling in auth fields from the configured [`crate::net::Authenticator`]),
/// send PING, and wait for PONG (optionally preceded by `+OK`). Returns the
/// parsed server info plus the frame codec carrying any bytes buffered past
/// the handshake, so the read loop can pick up exactly where this left off.
async fn handshake(
    transport: &mut dyn Transport,
    options: &NatsClientOptions,
    cancel: &CancellationToken,
) -> NatsResult<(ServerInfo, FrameCodec)> {
    transport.connect(&options.url, cancel).await?;

    let mut codec = FrameCodec::new();
    let server_info = loop {
        match next_frame(transport, &mut codec, options.receive_buffer_size, cancel).await? {
            Frame::Info(json) => break serde_json::from_value::<ServerInfo>(json)?,
            other => {
                return Err(NatsError::ProtocolError(format!(
                    "expected INFO as the first frame, got {other:?}"
                )))
            }
        }
    };

    let nonce = server_info.nonce.as_deref();
    let auth = options.auth_handler.authenticate(nonce).await?;
    let mut connect_command = options.connect_command_skeleton();
    connect_command.apply_auth(auth);

    let connect_json = serde_json::to_value(&connect_command)?;
    transport.send(&encode_connect(&connect_json), cancel).await?;
    transport.send(crate::codec::encode_ping(), cancel).await?;

    loop {
        match next_frame(transport, &mut codec, options.receive_buffer_size, cancel).await? {
            Frame::Ok => continue,
            Frame::Pong => break,
            Frame::Err(text) => {
                let lowered = text.to_ascii_lowercase();
                if lowered.contains("auth") || lowered.contains("authorization") {
                    return Err(NatsError::Authentication(text));
                }
                return Err(NatsError::Server(text));
            }
            other => {
                return Err(NatsError::ProtocolError(format!(
                    "expected PONG to complete the handshake, got {other:?}"
                )))
            }
        }
    }

    info!("connected to {}", options.url);
    Ok((server_info, codec))
}

/// Returns the next complete frame, reading more bytes from the transport
/// as needed.
async fn next_frame(
    transport: &mut dyn Transport,
    codec: &mut FrameCodec,
    buf_size: usize,
    cancel: &CancellationToken,
) -> NatsResult<Frame> {
    if let Some(frame) = codec.try_parse()? {
        return Ok(frame);
    }
    let mut buf = vec![0u8; buf_size];
    loop {
        let n = transport.receive(&mut buf, 0, buf_size, cancel).await?;
        if n == 0 {
            return Err(NatsError::UnexpectedEof("handshake frame"));
        }
        codec.feed(&buf[..n]);
        if let Some(frame) = codec.try_parse()? {
            return Ok(frame);
        }
    }
}

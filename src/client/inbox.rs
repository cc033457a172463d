//! Inbox/request correlator.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use rand::RngCore;
use tokio::sync::oneshot;

use crate::client::message::Message;
use crate::error::NatsError;

/// A fresh `_INBOX.<128-bit-hex>.` prefix, regenerated on every successful
/// (re)connect so replies from a prior session can never be mistaken for
/// ones from the current session.
pub fn generate_inbox_prefix() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    let mut hex = String::with_capacity(32);
    for b in bytes {
        hex.push_str(&format!("{b:02x}"));
    }
    format!("_INBOX.{hex}.")
}

/// Allocates reply subjects under a per-connection inbox prefix and resolves
/// them against inbound frames.
pub struct InboxCorrelator {
    prefix: String,
    request_counter: AtomicU64,
    pending: Mutex<HashMap<String, oneshot::Sender<Result<Message, NatsError>>>>,
}

impl InboxCorrelator {
    pub fn new(prefix: String) -> Self {
        InboxCorrelator {
            prefix,
            request_counter: AtomicU64::new(1),
            pending: Mutex::new(HashMap::new()),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn wildcard_subject(&self) -> String {
        format!("{}*", self.prefix)
    }

    /// Reserves a reply subject and a promise for its eventual resolution.
    pub fn reserve(&self) -> (String, oneshot::Receiver<Result<Message, NatsError>>) {
        let id = self.request_counter.fetch_add(1, Ordering::SeqCst);
        let subject = format!("{}{id}", self.prefix);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(subject.clone(), tx);
        (subject, rx)
    }

    pub fn owns(&self, subject: &str) -> bool {
        subject.starts_with(&self.prefix)
    }

    /// Resolves the pending promise for `message.subject`, if any. Returns
    /// true if a promise was found and resolved (a 503 status resolves the
    /// promise with a no-responders error).
    pub fn resolve(&self, message: Message) -> bool {
        let tx = self.pending.lock().remove(&message.subject);
        match tx {
            Some(tx) => {
                let result = if message.is_no_responders() {
                    Err(NatsError::NoResponders {
                        subject: message.subject.clone(),
                    })
                } else {
                    Ok(message)
                };
                let _ = tx.send(result);
                true
            }
            None => false,
        }
    }

    pub fn forget(&self, subject: &str) {
        self.pending.lock().remove(subject);
    }

    /// Fails every still-pending request with `err`. Called before a fresh
    /// inbox is installed (connection loss or a new reconnect attempt).
    pub fn fail_all(&self, err: &NatsError) {
        let mut pending = self.pending.lock();
        for (_, tx) in pending.drain() {
            let _ = tx.send(Err(err.clone_for_broadcast()));
        }
    }
}

use parking_lot::RwLock;
use tokio::sync::broadcast;

/// Connection lifecycle states: Disconnected -> Connecting -> Connected ->
/// (Reconnecting <-> Connected) -> Closed. Closed is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    Closed,
}

/// Current status behind a single mutex, plus a broadcast channel so callers
/// can observe transitions as they happen from whichever task drives them.
pub struct StatusCell {
    current: RwLock<ConnectionStatus>,
    tx: broadcast::Sender<ConnectionStatus>,
}

impl StatusCell {
    pub fn new(initial: ConnectionStatus) -> Self {
        let (tx, _) = broadcast::channel(32);
        StatusCell {
            current: RwLock::new(initial),
            tx,
        }
    }

    pub fn get(&self) -> ConnectionStatus {
        *self.current.read()
    }

    pub fn set(&self, status: ConnectionStatus) {
        *self.current.write() = status;
        // No subscribers is a normal, frequent state; not an error.
        let _ = self.tx.send(status);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionStatus> {
        self.tx.subscribe()
    }
}

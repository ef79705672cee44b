use std::collections::HashMap;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use shared::directory::ServiceDirectory;
use shared::protocol::Message;
use crate::bridge::DirectoryChange;

pub type ClientId = u64;

/// Frames a connection may have queued before it is considered stalled
pub const OUTBOUND_CAPACITY: usize = 256;

/// Outbound queue of one connection, drained by that connection's writer
/// task. A queue that fills up gets its client dropped.
pub type Outbound = mpsc::Sender<String>;

/// Create the queue for one connection.
pub fn outbound() -> (Outbound, mpsc::Receiver<String>) {
    mpsc::channel(OUTBOUND_CAPACITY)
}

/// Connected clients, indexed by a stable id.
#[derive(Default)]
pub struct BroadcastHub {
    clients: HashMap<ClientId, Outbound>,
    next_id: ClientId,
}

impl BroadcastHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection and queue its initial ALL snapshot.
    pub fn connect(&mut self, outbound: Outbound, directory: &ServiceDirectory) -> ClientId {
        self.next_id += 1;
        let id = self.next_id;
        self.clients.insert(id, outbound);
        tracing::info!("Client {} connected ({} total)", id, self.clients.len());
        self.send_all(id, directory);
        id
    }

    pub fn disconnect(&mut self, id: ClientId) -> bool {
        let removed = self.clients.remove(&id).is_some();
        if removed {
            tracing::info!("Client {} disconnected ({} left)", id, self.clients.len());
        }
        removed
    }

    /// Handle a text frame from a client. Only REFRESH is meaningful; it is
    /// answered to that client alone.
    pub fn handle_message(&mut self, id: ClientId, text: &str, directory: &ServiceDirectory) {
        match Message::decode(text) {
            Ok(Message::Refresh) => {
                tracing::debug!("Client {} requested a refresh", id);
                self.send_all(id, directory);
            }
            Ok(other) => {
                tracing::debug!("Ignoring {:?} message from client {}", other.kind(), id);
            }
            Err(e) => {
                tracing::debug!("Ignoring unreadable message from client {}: {}", id, e);
            }
        }
    }

    /// Fan a change out to every connected client.
    pub fn broadcast(&mut self, change: &DirectoryChange) {
        let message = match change {
            DirectoryChange::AddOrUpdate(entry) => Message::AddOrUpdate(entry.clone()),
            DirectoryChange::Remove(full_name) => Message::Remove(full_name.clone()),
        };
        let frame = match message.encode() {
            Ok(frame) => frame,
            Err(e) => {
                tracing::error!("Failed to encode {:?} message: {}", message.kind(), e);
                return;
            }
        };

        self.clients
            .retain(|id, outbound| deliver(*id, outbound, frame.clone()));
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    fn send_all(&mut self, id: ClientId, directory: &ServiceDirectory) {
        let frame = match Message::All(directory.snapshot()).encode() {
            Ok(frame) => frame,
            Err(e) => {
                tracing::error!("Failed to encode ALL message: {}", e);
                return;
            }
        };
        let delivered = self
            .clients
            .get(&id)
            .map(|outbound| deliver(id, outbound, frame));
        if delivered == Some(false) {
            self.clients.remove(&id);
        }
    }
}

/// Queue a frame without waiting. Returns false when the client has to be
/// dropped; dropping its sender ends the writer task and closes the socket.
fn deliver(id: ClientId, outbound: &Outbound, frame: String) -> bool {
    match outbound.try_send(frame) {
        Ok(()) => true,
        Err(TrySendError::Full(_)) => {
            tracing::warn!("Client {} is not reading, dropping it", id);
            false
        }
        Err(TrySendError::Closed(_)) => {
            tracing::debug!("Dropping client {} with closed queue", id);
            false
        }
    }
}

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use anyhow::{Context, Result};
use shared::types::{FullName, ServiceEntry};
use crate::bridge::{DiscoveryBridge, HostResolver};
use crate::hub::{BroadcastHub, ClientId, Outbound};
pub use crate::mdns::browser::DiscoveryEvent;

/// Commands sent to the relay loop by socket and HTTP handlers
pub enum RelayCommand {
    Connect(Outbound, oneshot::Sender<ClientId>),
    ClientMessage(ClientId, String),
    Disconnect(ClientId),
    Snapshot(oneshot::Sender<Vec<ServiceEntry>>),
    GetOne(FullName, oneshot::Sender<Option<ServiceEntry>>),
}

/// Handle to interact with the relay loop
#[derive(Clone)]
pub struct RelayHandle {
    tx: mpsc::Sender<RelayCommand>,
}

/// Create a handle and the command receiver to pass to [`run`].
pub fn channel() -> (RelayHandle, mpsc::Receiver<RelayCommand>) {
    let (tx, rx) = mpsc::channel(256);
    (RelayHandle { tx }, rx)
}

impl RelayHandle {
    /// Register a connection. Its ALL snapshot is queued on `outbound`
    /// before this returns.
    pub async fn connect(&self, outbound: Outbound) -> Result<ClientId> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(RelayCommand::Connect(outbound, reply))
            .await
            .context("relay loop stopped")?;
        Ok(rx.await?)
    }

    /// Forward a text frame received from a client
    pub async fn message(&self, client: ClientId, text: String) -> Result<()> {
        self.tx
            .send(RelayCommand::ClientMessage(client, text))
            .await
            .context("relay loop stopped")?;
        Ok(())
    }

    pub async fn disconnect(&self, client: ClientId) -> Result<()> {
        self.tx
            .send(RelayCommand::Disconnect(client))
            .await
            .context("relay loop stopped")?;
        Ok(())
    }

    /// Get all services
    pub async fn snapshot(&self) -> Result<Vec<ServiceEntry>> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(RelayCommand::Snapshot(reply))
            .await
            .context("relay loop stopped")?;
        Ok(rx.await?)
    }

    /// Get a single service by full name
    pub async fn get_one(&self, full_name: FullName) -> Result<Option<ServiceEntry>> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(RelayCommand::GetOne(full_name, reply))
            .await
            .context("relay loop stopped")?;
        Ok(rx.await?)
    }
}

/// Relay event loop. Owns the directory, the resolution tasks and the
/// connected clients; every mutation and every snapshot happens here, one
/// event at a time.
pub async fn run<R: HostResolver>(
    resolver: R,
    mut discovery: mpsc::Receiver<DiscoveryEvent>,
    mut commands: mpsc::Receiver<RelayCommand>,
    cancel: CancellationToken,
) -> Result<()> {
    let (resolution_tx, mut resolutions) = mpsc::unbounded_channel();
    let mut bridge = DiscoveryBridge::new(resolver, resolution_tx);
    let mut hub = BroadcastHub::new();

    loop {
        tokio::select! {
            Some(event) = discovery.recv() => {
                let change = bridge.handle_event(event);
                hub.broadcast(&change);
            }
            Some(resolution) = resolutions.recv() => {
                if let Some(change) = bridge.apply_resolution(resolution) {
                    hub.broadcast(&change);
                }
            }
            Some(command) = commands.recv() => {
                match command {
                    RelayCommand::Connect(outbound, reply) => {
                        let id = hub.connect(outbound, bridge.directory());
                        if reply.send(id).is_err() {
                            hub.disconnect(id);
                        }
                    }
                    RelayCommand::ClientMessage(id, text) => {
                        hub.handle_message(id, &text, bridge.directory());
                    }
                    RelayCommand::Disconnect(id) => {
                        hub.disconnect(id);
                    }
                    RelayCommand::Snapshot(reply) => {
                        let _ = reply.send(bridge.directory().snapshot());
                    }
                    RelayCommand::GetOne(full_name, reply) => {
                        let _ = reply.send(bridge.directory().entry(&full_name));
                    }
                }
            }
            _ = cancel.cancelled() => {
                tracing::info!("Relay loop shutting down");
                break;
            }
        }
    }

    bridge.shutdown();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use shared::protocol::Message;
    use shared::types::Service;
    use crate::bridge::tests::StubResolver;

    fn printer() -> Service {
        Service::new("printer", "_http._tcp.local.", "printer.local.", 631)
    }

    async fn next_message(rx: &mut mpsc::Receiver<String>) -> Message {
        let frame = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out waiting for a frame")
            .expect("queue closed");
        Message::decode(&frame).unwrap()
    }

    async fn wait_for_request(resolver: &StubResolver) {
        for _ in 0..200 {
            if resolver.count() > 0 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("resolver was never asked");
    }

    #[tokio::test]
    async fn test_loop_relays_add_and_resolution() {
        let resolver = StubResolver::default();
        let (discovery_tx, discovery_rx) = mpsc::channel(16);
        let (handle, commands) = channel();
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run(resolver.clone(), discovery_rx, commands, cancel.clone()));

        let (outbound, mut rx) = crate::hub::outbound();
        handle.connect(outbound).await.unwrap();
        assert_eq!(next_message(&mut rx).await, Message::All(Vec::new()));

        discovery_tx.send(DiscoveryEvent::Added(printer())).await.unwrap();
        let Message::AddOrUpdate(entry) = next_message(&mut rx).await else {
            panic!("expected ADD_OR_UPDATE");
        };
        assert!(entry.addresses.is_empty());

        wait_for_request(&resolver).await;
        resolver.reply(0).send("192.168.1.5");
        let Message::AddOrUpdate(entry) = next_message(&mut rx).await else {
            panic!("expected ADD_OR_UPDATE");
        };
        assert_eq!(entry.addresses.as_slice(), ["192.168.1.5"]);

        let snapshot = handle.snapshot().await.unwrap();
        assert_eq!(snapshot, vec![entry.clone()]);
        assert_eq!(handle.get_one(printer().full_name()).await.unwrap(), Some(entry));

        cancel.cancel();
        task.await.unwrap().unwrap();
        assert!(resolver.reply(0).is_cancelled());
    }

    #[tokio::test]
    async fn test_refresh_goes_through_the_loop() {
        let (_discovery_tx, discovery_rx) = mpsc::channel(16);
        let (handle, commands) = channel();
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run(StubResolver::default(), discovery_rx, commands, cancel.clone()));

        let (outbound, mut rx) = crate::hub::outbound();
        let id = handle.connect(outbound).await.unwrap();
        next_message(&mut rx).await;

        handle.message(id, r#"{"type":4}"#.to_string()).await.unwrap();
        assert_eq!(next_message(&mut rx).await, Message::All(Vec::new()));

        handle.disconnect(id).await.unwrap();
        cancel.cancel();
        task.await.unwrap().unwrap();
    }
}

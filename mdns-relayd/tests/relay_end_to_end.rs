use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use mdns_relayd::api::routes::{router, AppState};
use mdns_relayd::bridge::{DiscoveryBridge, HostResolver, ResolutionReply};
use mdns_relayd::hub::{self, BroadcastHub};
use mdns_relayd::relay::{self, DiscoveryEvent};
use mdns_relay_client::{AgentConfig, ConnectionState, Mirror, Presenter, SyncAgent};
use shared::types::{AddressSet, FullName, Service};

/// Answers every lookup immediately from a fixed table.
#[derive(Clone, Default)]
struct TableResolver {
    table: HashMap<String, Vec<String>>,
}

impl TableResolver {
    fn with(mut self, hostname: &str, address: &str) -> Self {
        self.table
            .entry(hostname.to_string())
            .or_default()
            .push(address.to_string());
        self
    }
}

impl HostResolver for TableResolver {
    fn resolve(&self, hostname: &str, reply: ResolutionReply) {
        for address in self.table.get(hostname).into_iter().flatten() {
            reply.send(address.as_str());
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Seen {
    Upsert(String, Vec<String>),
    Remove(String),
}

/// Presenter whose log stays readable while the agent owns it.
#[derive(Clone, Default)]
struct SharedRecorder {
    seen: Arc<Mutex<Vec<Seen>>>,
}

impl SharedRecorder {
    fn snapshot(&self) -> Vec<Seen> {
        self.seen.lock().unwrap().clone()
    }

    async fn wait_for(&self, expected: &Seen) {
        for _ in 0..400 {
            if self.snapshot().contains(expected) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("never saw {:?}, got {:?}", expected, self.snapshot());
    }
}

impl Presenter for SharedRecorder {
    fn on_add_or_update(&mut self, full_name: &FullName, _: &Service, addresses: &AddressSet) {
        self.seen
            .lock()
            .unwrap()
            .push(Seen::Upsert(full_name.to_string(), addresses.as_slice().to_vec()));
    }

    fn on_remove(&mut self, full_name: &FullName) {
        self.seen.lock().unwrap().push(Seen::Remove(full_name.to_string()));
    }
}

fn printer() -> Service {
    Service::new("printer", "_http._tcp.local.", "printer.local.", 631)
        .with_attribute("rp", "ipp/print")
}

async fn http_get(addr: std::net::SocketAddr, path: &str) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let request = format!(
        "GET {} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
        path
    );
    stream.write_all(request.as_bytes()).await.unwrap();
    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();
    response
}

#[test]
fn test_in_memory_mirror_matches_server_directory() {
    let resolver = TableResolver::default().with("printer.local.", "192.168.1.5");
    let (resolution_tx, mut resolutions) = mpsc::unbounded_channel();
    let mut bridge = DiscoveryBridge::new(resolver, resolution_tx);
    let mut hub = BroadcastHub::new();

    let (outbound, mut frames) = hub::outbound();
    hub.connect(outbound, bridge.directory());

    let change = bridge.handle_event(DiscoveryEvent::Added(printer()));
    hub.broadcast(&change);
    while let Ok(resolution) = resolutions.try_recv() {
        if let Some(change) = bridge.apply_resolution(resolution) {
            hub.broadcast(&change);
        }
    }

    let mut mirror = Mirror::new(SharedRecorder::default());
    while let Ok(frame) = frames.try_recv() {
        mirror.apply_text(&frame).unwrap();
    }

    assert_eq!(mirror.directory().snapshot(), bridge.directory().snapshot());
    let full_name = printer().full_name();
    assert_eq!(
        mirror.directory().addresses(&full_name).unwrap().as_slice(),
        ["192.168.1.5"]
    );
    assert_eq!(mirror.directory().service(&full_name).unwrap().attributes["rp"], "ipp/print");

    let change = bridge.handle_event(DiscoveryEvent::Removed(printer()));
    hub.broadcast(&change);
    while let Ok(frame) = frames.try_recv() {
        mirror.apply_text(&frame).unwrap();
    }
    assert!(mirror.directory().is_empty());
    assert_eq!(
        mirror.presenter().snapshot().last(),
        Some(&Seen::Remove("printer._http._tcp.local.".into()))
    );
}

#[tokio::test]
async fn test_client_mirrors_relay_over_websocket() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let cancel = CancellationToken::new();

    let resolver = TableResolver::default().with("printer.local.", "192.168.1.5");
    let (discovery_tx, discovery_rx) = mpsc::channel(16);
    let (relay_handle, commands) = relay::channel();
    let relay_task = tokio::spawn(relay::run(resolver, discovery_rx, commands, cancel.clone()));

    let app = router(AppState { relay: relay_handle });
    let server_cancel = cancel.clone();
    let server_task = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { server_cancel.cancelled().await })
            .await
    });

    let recorder = SharedRecorder::default();
    let mut config = AgentConfig::new(format!("ws://{}", addr));
    config.retry_interval = Duration::from_millis(50);
    let (agent, trigger) = SyncAgent::new(config, recorder.clone());
    let mut state = agent.state();
    let agent_cancel = CancellationToken::new();
    let agent_task = tokio::spawn(agent.run(agent_cancel.clone()));

    tokio::time::timeout(
        Duration::from_secs(5),
        state.wait_for(|s| *s == ConnectionState::Connected),
    )
    .await
    .unwrap()
    .unwrap();

    discovery_tx.send(DiscoveryEvent::Added(printer())).await.unwrap();
    let resolved = Seen::Upsert(
        "printer._http._tcp.local.".into(),
        vec!["192.168.1.5".into()],
    );
    recorder.wait_for(&resolved).await;

    // Inspection endpoints see the same directory
    let listing = http_get(addr, "/v1/services").await;
    assert!(listing.starts_with("HTTP/1.1 200"));
    let (_, body) = listing.split_once("\r\n\r\n").unwrap();
    let services: serde_json::Value = serde_json::from_str(body).unwrap();
    assert_eq!(services[0]["fullname"], "printer._http._tcp.local.");
    assert_eq!(services[0]["port"], 631);
    assert_eq!(services[0]["addresses"][0], "192.168.1.5");
    let missing = http_get(addr, "/v1/services/nothing._http._tcp.local.").await;
    assert!(missing.starts_with("HTTP/1.1 404"));

    // A manual refresh brings back the whole directory again
    let before = recorder.snapshot().len();
    assert!(trigger.refresh());
    for _ in 0..400 {
        if recorder.snapshot().len() > before {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(recorder.snapshot()[before..], [resolved.clone()]);

    discovery_tx.send(DiscoveryEvent::Removed(printer())).await.unwrap();
    recorder
        .wait_for(&Seen::Remove("printer._http._tcp.local.".into()))
        .await;

    agent_cancel.cancel();
    let mirror = agent_task.await.unwrap().unwrap();
    assert!(mirror.directory().is_empty());

    cancel.cancel();
    relay_task.await.unwrap().unwrap();
    server_task.await.unwrap().unwrap();
}

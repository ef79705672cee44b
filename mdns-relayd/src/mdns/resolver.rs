use std::collections::HashMap;
use std::net::IpAddr;
use std::pin::Pin;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use mdns_sd::{HostnameResolutionEvent, ServiceDaemon};
use futures::stream::{FuturesUnordered, StreamExt};
use futures::Future;
use crate::bridge::{HostResolver, ResolutionReply};
use crate::config::DiscoveryConfig;

type RecvResult = (
    String,
    u64,
    flume::Receiver<HostnameResolutionEvent>,
    std::result::Result<HostnameResolutionEvent, flume::RecvError>,
);
type RecvFuture = Pin<Box<dyn Future<Output = RecvResult> + Send>>;

fn make_recv_future(
    hostname: String,
    generation: u64,
    rx: flume::Receiver<HostnameResolutionEvent>,
) -> RecvFuture {
    Box::pin(async move {
        let result = rx.recv_async().await;
        (hostname, generation, rx, result)
    })
}

/// Subscription requests sent to the resolver task
enum ResolverCommand {
    Subscribe(String, ResolutionReply),
}

/// Hostname resolution on top of mdns-sd.
///
/// mdns-sd keeps a single listener per hostname, so lookups are shared: one
/// lookup per hostname, fanned out to every subscribed reply.
#[derive(Clone)]
pub struct MdnsResolver {
    tx: mpsc::UnboundedSender<ResolverCommand>,
}

impl HostResolver for MdnsResolver {
    fn resolve(&self, hostname: &str, reply: ResolutionReply) {
        if self
            .tx
            .send(ResolverCommand::Subscribe(hostname.to_string(), reply))
            .is_err()
        {
            tracing::warn!("Resolver task stopped, {} stays unresolved", hostname);
        }
    }
}

impl MdnsResolver {
    pub fn spawn(
        daemon: ServiceDaemon,
        config: &DiscoveryConfig,
        cancel: CancellationToken,
    ) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let lookups = Lookups::new(config.no_cache, config.resolve_timeout());
        let handle = tokio::spawn(run_resolver(daemon, lookups, rx, cancel));
        (Self { tx }, handle)
    }
}

struct Lookup {
    generation: u64,
    subscribers: Vec<ResolutionReply>,
    found: Vec<IpAddr>,
}

/// Per-hostname lookup bookkeeping, kept apart from the daemon so it can be
/// exercised without a network.
struct Lookups {
    entries: HashMap<String, Lookup>,
    next_generation: u64,
    no_cache: bool,
    timeout: Option<Duration>,
}

/// What the caller has to do with the daemon after a bookkeeping step
#[derive(Debug, PartialEq, Eq)]
enum Action {
    None,
    Start(u64),
    Stop,
}

impl Lookups {
    fn new(no_cache: bool, timeout: Option<Duration>) -> Self {
        Self {
            entries: HashMap::new(),
            next_generation: 1,
            no_cache,
            timeout,
        }
    }

    fn subscribe(&mut self, hostname: &str, reply: ResolutionReply) -> Action {
        if let Some(lookup) = self.entries.get_mut(hostname) {
            lookup.subscribers.retain(|r| !r.is_cancelled());
            if !self.no_cache {
                for address in &lookup.found {
                    reply.send(address.to_string());
                }
                lookup.subscribers.push(reply);
                return Action::None;
            }
            lookup.subscribers.push(reply);
            lookup.found.clear();
            lookup.generation = self.next_generation;
            self.next_generation += 1;
            return Action::Start(lookup.generation);
        }

        let generation = self.next_generation;
        self.next_generation += 1;
        self.entries.insert(
            hostname.to_string(),
            Lookup {
                generation,
                subscribers: vec![reply],
                found: Vec::new(),
            },
        );
        Action::Start(generation)
    }

    /// Whether events from this generation still belong to a live lookup
    fn is_current(&self, hostname: &str, generation: u64) -> bool {
        self.entries
            .get(hostname)
            .is_some_and(|lookup| lookup.generation == generation)
    }

    fn found(&mut self, hostname: &str, addresses: impl IntoIterator<Item = IpAddr>) -> Action {
        let Some(lookup) = self.entries.get_mut(hostname) else {
            return Action::None;
        };
        for address in addresses {
            if !lookup.found.contains(&address) {
                lookup.found.push(address);
            }
            lookup
                .subscribers
                .retain(|reply| reply.send(address.to_string()));
        }
        self.prune(hostname)
    }

    /// Drop cancelled subscribers; a lookup nobody listens to is stopped
    fn prune(&mut self, hostname: &str) -> Action {
        let Some(lookup) = self.entries.get_mut(hostname) else {
            return Action::None;
        };
        lookup.subscribers.retain(|reply| !reply.is_cancelled());
        if lookup.subscribers.is_empty() {
            self.entries.remove(hostname);
            return Action::Stop;
        }
        Action::None
    }

    fn finished(&mut self, hostname: &str) {
        self.entries.remove(hostname);
    }

    fn hostnames(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }
}

async fn run_resolver(
    daemon: ServiceDaemon,
    mut lookups: Lookups,
    mut rx: mpsc::UnboundedReceiver<ResolverCommand>,
    cancel: CancellationToken,
) {
    let mut receivers: FuturesUnordered<RecvFuture> = FuturesUnordered::new();
    let mut sweep = tokio::time::interval(Duration::from_secs(30));
    sweep.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let timeout_ms = lookups.timeout.map(|t| t.as_millis() as u64);

    loop {
        tokio::select! {
            Some(command) = rx.recv() => {
                let ResolverCommand::Subscribe(hostname, reply) = command;
                if let Action::Start(generation) = lookups.subscribe(&hostname, reply) {
                    match daemon.resolve_hostname(&hostname, timeout_ms) {
                        Ok(receiver) => {
                            tracing::debug!("Resolving hostname {}", hostname);
                            receivers.push(make_recv_future(hostname, generation, receiver));
                        }
                        Err(e) => {
                            tracing::warn!("Failed to resolve {}: {}", hostname, e);
                            lookups.finished(&hostname);
                        }
                    }
                }
            }

            Some((hostname, generation, receiver, result)) = receivers.next() => {
                if !lookups.is_current(&hostname, generation) {
                    continue;
                }
                match result {
                    Ok(HostnameResolutionEvent::AddressesFound(_, addresses)) => {
                        tracing::debug!("Hostname {} resolved to {:?}", hostname, addresses);
                        if lookups.found(&hostname, addresses) == Action::Stop {
                            stop_lookup(&daemon, &hostname);
                            continue;
                        }
                    }
                    Ok(HostnameResolutionEvent::SearchTimeout(_)) => {
                        tracing::debug!("Lookup of {} timed out", hostname);
                        lookups.finished(&hostname);
                        continue;
                    }
                    Ok(HostnameResolutionEvent::SearchStopped(_)) | Err(_) => {
                        lookups.finished(&hostname);
                        continue;
                    }
                    Ok(_) => {}
                }
                receivers.push(make_recv_future(hostname, generation, receiver));
            }

            _ = sweep.tick() => {
                for hostname in lookups.hostnames() {
                    if lookups.prune(&hostname) == Action::Stop {
                        stop_lookup(&daemon, &hostname);
                    }
                }
            }

            _ = cancel.cancelled() => {
                tracing::info!("Hostname resolver shutting down");
                break;
            }
        }
    }
}

fn stop_lookup(daemon: &ServiceDaemon, hostname: &str) {
    tracing::debug!("No subscribers left for {}, stopping lookup", hostname);
    if let Err(e) = daemon.stop_resolve_hostname(hostname) {
        tracing::debug!("Failed to stop lookup of {}: {}", hostname, e);
    }
}

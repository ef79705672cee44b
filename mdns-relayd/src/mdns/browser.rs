use std::collections::{HashMap, HashSet};
use std::pin::Pin;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use mdns_sd::{ServiceDaemon, ServiceEvent};
use futures::stream::{FuturesUnordered, StreamExt};
use futures::Future;
use anyhow::Result;
use shared::types::Service;
use crate::config::DiscoveryConfig;

const META_QUERY_TYPE: &str = "_services._dns-sd._udp.local.";

/// Service lifecycle events produced by the discovery source, in the order
/// mdns-sd reported them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryEvent {
    Added(Service),
    Updated(Service),
    Removed(Service),
}

type RecvResult = (
    Browse,
    flume::Receiver<ServiceEvent>,
    std::result::Result<ServiceEvent, flume::RecvError>,
);
type RecvFuture = Pin<Box<dyn Future<Output = RecvResult> + Send>>;

/// What a receiver was opened for
#[derive(Debug, Clone)]
enum Browse {
    Meta,
    Type(String),
}

fn make_recv_future(browse: Browse, rx: flume::Receiver<ServiceEvent>) -> RecvFuture {
    Box::pin(async move {
        let result = rx.recv_async().await;
        (browse, rx, result)
    })
}

/// Turns raw mdns-sd browse results into added/updated/removed events.
#[derive(Default)]
struct Translator {
    known: HashMap<String, Service>,
}

impl Translator {
    fn resolved(&mut self, fullname: &str, service: Service) -> Option<DiscoveryEvent> {
        match self.known.get(fullname) {
            Some(previous) if *previous == service => None,
            Some(_) => {
                self.known.insert(fullname.to_string(), service.clone());
                Some(DiscoveryEvent::Updated(service))
            }
            None => {
                self.known.insert(fullname.to_string(), service.clone());
                Some(DiscoveryEvent::Added(service))
            }
        }
    }

    fn removed(&mut self, fullname: &str) -> Option<DiscoveryEvent> {
        self.known.remove(fullname).map(DiscoveryEvent::Removed)
    }
}

pub async fn run_browser(
    daemon: ServiceDaemon,
    config: DiscoveryConfig,
    tx: mpsc::Sender<DiscoveryEvent>,
    cancel: CancellationToken,
) -> Result<()> {
    tracing::info!("Starting mDNS browser");

    let mut browsed_types = HashSet::new();
    let mut receivers: FuturesUnordered<RecvFuture> = FuturesUnordered::new();
    let mut translator = Translator::default();

    if config.browse_all {
        match daemon.browse(META_QUERY_TYPE) {
            Ok(receiver) => receivers.push(make_recv_future(Browse::Meta, receiver)),
            Err(e) => tracing::error!("Failed to start meta-query browse: {}", e),
        }
    }

    for service_type in &config.service_types {
        start_browse(&daemon, service_type, &mut browsed_types, &mut receivers);
    }

    if receivers.is_empty() {
        anyhow::bail!("no mDNS browse could be started");
    }

    loop {
        tokio::select! {
            Some((browse, rx, result)) = receivers.next() => {
                match (&browse, result) {
                    (Browse::Meta, Ok(ServiceEvent::ServiceFound(_, service_type))) => {
                        start_browse(&daemon, &service_type, &mut browsed_types, &mut receivers);
                    }
                    (Browse::Type(_), Ok(ServiceEvent::ServiceResolved(info))) => {
                        let service = convert_service_info(&info);
                        if let Some(event) = translator.resolved(info.get_fullname(), service) {
                            tracing::debug!("Resolved service: {}", info.get_fullname());
                            if tx.send(event).await.is_err() {
                                tracing::info!("Discovery consumer gone, stopping browser");
                                break;
                            }
                        }
                    }
                    (Browse::Type(_), Ok(ServiceEvent::ServiceRemoved(_typ, fullname))) => {
                        tracing::debug!("Service removed: {}", fullname);
                        if let Some(event) = translator.removed(&fullname) {
                            if tx.send(event).await.is_err() {
                                tracing::info!("Discovery consumer gone, stopping browser");
                                break;
                            }
                        }
                    }
                    (_, Ok(_)) => {}
                    (browse, Err(e)) => {
                        tracing::warn!("Browse receiver for {:?} disconnected: {}", browse, e);
                        continue;
                    }
                }
                receivers.push(make_recv_future(browse, rx));
            }

            _ = cancel.cancelled() => {
                tracing::info!("mDNS browser shutting down");
                break;
            }
        }
    }

    Ok(())
}

fn start_browse(
    daemon: &ServiceDaemon,
    service_type: &str,
    browsed_types: &mut HashSet<String>,
    receivers: &mut FuturesUnordered<RecvFuture>,
) {
    if !browsed_types.insert(service_type.to_string()) {
        return;
    }
    match daemon.browse(service_type) {
        Ok(receiver) => {
            tracing::info!("Browsing service type {}", service_type);
            receivers.push(make_recv_future(Browse::Type(service_type.to_string()), receiver));
        }
        Err(e) => {
            browsed_types.remove(service_type);
            tracing::error!("Failed to browse {}: {}", service_type, e);
        }
    }
}

/// Convert an mdns-sd ServiceInfo to our Service. Addresses are left to the
/// hostname resolver.
fn convert_service_info(info: &mdns_sd::ServiceInfo) -> Service {
    let attributes: HashMap<String, String> = info
        .get_properties()
        .iter()
        .map(|prop| (prop.key().to_string(), prop.val_str().to_string()))
        .collect();

    Service {
        name: instance_name(info.get_fullname(), info.get_type()).to_string(),
        service_type: info.get_type().to_string(),
        hostname: info.get_hostname().to_string(),
        port: info.get_port(),
        attributes,
    }
}

/// "printer._http._tcp.local." with type "_http._tcp.local." -> "printer"
fn instance_name<'a>(fullname: &'a str, service_type: &str) -> &'a str {
    fullname
        .strip_suffix(service_type)
        .map(|rest| rest.strip_suffix('.').unwrap_or(rest))
        .filter(|name| !name.is_empty())
        .unwrap_or(fullname)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn printer(port: u16) -> Service {
        Service::new("printer", "_http._tcp.local.", "printer.local.", port)
    }

    #[test]
    fn test_instance_name_strips_type_suffix() {
        assert_eq!(instance_name("printer._http._tcp.local.", "_http._tcp.local."), "printer");
        assert_eq!(instance_name("My.Box._ssh._tcp.local.", "_ssh._tcp.local."), "My.Box");
        assert_eq!(instance_name("odd", "_http._tcp.local."), "odd");
    }

    #[test]
    fn test_translator_add_then_update() {
        let mut translator = Translator::default();
        let fullname = "printer._http._tcp.local.";

        assert_eq!(
            translator.resolved(fullname, printer(631)),
            Some(DiscoveryEvent::Added(printer(631)))
        );
        assert_eq!(translator.resolved(fullname, printer(631)), None, "unchanged re-announce");
        assert_eq!(
            translator.resolved(fullname, printer(8631)),
            Some(DiscoveryEvent::Updated(printer(8631)))
        );
    }

    #[test]
    fn test_translator_remove_only_known() {
        let mut translator = Translator::default();
        let fullname = "printer._http._tcp.local.";

        assert_eq!(translator.removed(fullname), None);
        translator.resolved(fullname, printer(631));
        assert_eq!(translator.removed(fullname), Some(DiscoveryEvent::Removed(printer(631))));
        assert_eq!(
            translator.resolved(fullname, printer(631)),
            Some(DiscoveryEvent::Added(printer(631))),
            "comes back as a new service after removal"
        );
    }
}

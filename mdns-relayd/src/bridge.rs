//! Translates discovery events into directory mutations and change
//! notifications, and owns the hostname resolution task of every service.
//!
//! Resolution results come back through a channel and are applied by the
//! same loop that applies discovery events. Each result carries the id of
//! the task that produced it; results of a task that has since been
//! cancelled or replaced are dropped without touching the directory.

use std::collections::HashMap;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use shared::directory::ServiceDirectory;
use shared::types::{FullName, Service, ServiceEntry};
use crate::mdns::browser::DiscoveryEvent;

pub type TaskId = u64;

/// One address produced by a resolution task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub full_name: FullName,
    pub task: TaskId,
    pub address: String,
}

/// Where a resolver delivers addresses for one task.
#[derive(Debug, Clone)]
pub struct ResolutionReply {
    full_name: FullName,
    task: TaskId,
    cancel: CancellationToken,
    tx: mpsc::UnboundedSender<Resolution>,
}

impl ResolutionReply {
    /// Deliver an address. Returns false once the task is cancelled or the
    /// relay loop is gone; the resolver should stop feeding this reply.
    pub fn send(&self, address: impl Into<String>) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        self.tx
            .send(Resolution {
                full_name: self.full_name.clone(),
                task: self.task,
                address: address.into(),
            })
            .is_ok()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled() || self.tx.is_closed()
    }
}

/// Asynchronous hostname resolution. Implementations push every address
/// they find into `reply` until it reports cancellation.
pub trait HostResolver {
    fn resolve(&self, hostname: &str, reply: ResolutionReply);
}

/// Change notification for the broadcast side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectoryChange {
    AddOrUpdate(ServiceEntry),
    Remove(FullName),
}

struct ResolutionTask {
    id: TaskId,
    cancel: CancellationToken,
}

pub struct DiscoveryBridge<R> {
    directory: ServiceDirectory,
    tasks: HashMap<FullName, ResolutionTask>,
    resolver: R,
    resolutions: mpsc::UnboundedSender<Resolution>,
    next_task: TaskId,
}

impl<R: HostResolver> DiscoveryBridge<R> {
    pub fn new(resolver: R, resolutions: mpsc::UnboundedSender<Resolution>) -> Self {
        Self {
            directory: ServiceDirectory::new(),
            tasks: HashMap::new(),
            resolver,
            resolutions,
            next_task: 1,
        }
    }

    pub fn directory(&self) -> &ServiceDirectory {
        &self.directory
    }

    pub fn handle_event(&mut self, event: DiscoveryEvent) -> DirectoryChange {
        match event {
            DiscoveryEvent::Added(service) => self.service_added(service),
            DiscoveryEvent::Updated(service) => self.service_updated(service),
            DiscoveryEvent::Removed(service) => self.service_removed(&service),
        }
    }

    fn service_added(&mut self, service: Service) -> DirectoryChange {
        let hostname = service.hostname.clone();
        let full_name = self.directory.upsert(service);
        self.cancel_task(&full_name);

        let id = self.next_task;
        self.next_task += 1;
        let cancel = CancellationToken::new();
        self.tasks.insert(
            full_name.clone(),
            ResolutionTask {
                id,
                cancel: cancel.clone(),
            },
        );

        tracing::debug!("Resolving {} for {} (task {})", hostname, full_name, id);
        self.resolver.resolve(
            &hostname,
            ResolutionReply {
                full_name: full_name.clone(),
                task: id,
                cancel,
                tx: self.resolutions.clone(),
            },
        );

        self.change_for(&full_name)
    }

    fn service_updated(&mut self, service: Service) -> DirectoryChange {
        let full_name = self.directory.upsert(service);
        self.change_for(&full_name)
    }

    fn service_removed(&mut self, service: &Service) -> DirectoryChange {
        let full_name = service.full_name();
        self.cancel_task(&full_name);
        self.directory.remove(&full_name);
        DirectoryChange::Remove(full_name)
    }

    /// Apply one resolved address. Returns a change only when the address is
    /// new for a service whose current task produced it.
    pub fn apply_resolution(&mut self, resolution: Resolution) -> Option<DirectoryChange> {
        let current = self.tasks.get(&resolution.full_name).map(|task| task.id);
        if current != Some(resolution.task) {
            tracing::debug!(
                "Dropping stale resolution {} for {} (task {})",
                resolution.address,
                resolution.full_name,
                resolution.task
            );
            return None;
        }

        if !self
            .directory
            .add_address(&resolution.full_name, resolution.address.as_str())
        {
            return None;
        }

        tracing::debug!("Resolved {} -> {}", resolution.full_name, resolution.address);
        Some(self.change_for(&resolution.full_name))
    }

    /// Cancel every outstanding resolution task.
    pub fn shutdown(&mut self) {
        for (_, task) in self.tasks.drain() {
            task.cancel.cancel();
        }
    }

    fn cancel_task(&mut self, full_name: &FullName) {
        if let Some(task) = self.tasks.remove(full_name) {
            tracing::debug!("Cancelling resolution task {} for {}", task.id, full_name);
            task.cancel.cancel();
        }
    }

    fn change_for(&self, full_name: &FullName) -> DirectoryChange {
        match self.directory.entry(full_name) {
            Some(entry) => DirectoryChange::AddOrUpdate(entry),
            None => DirectoryChange::Remove(full_name.clone()),
        }
    }

    #[cfg(test)]
    fn outstanding_tasks(&self) -> usize {
        self.tasks.len()
    }
}

impl<R> Drop for DiscoveryBridge<R> {
    fn drop(&mut self) {
        for task in self.tasks.values() {
            task.cancel.cancel();
        }
    }
}

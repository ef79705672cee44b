use std::collections::{BTreeMap, HashMap};
use crate::types::{AddressSet, FullName, Service, ServiceEntry};

/// In-memory directory of services and their resolved addresses, keyed by
/// [`FullName`].
///
/// Every key with addresses also has a service record. Removal drops both
/// at once. The directory has a single owner and is never shared across
/// threads, so no locking happens here.
#[derive(Debug, Default)]
pub struct ServiceDirectory {
    services: BTreeMap<FullName, Service>,
    addresses: HashMap<FullName, AddressSet>,
}

impl ServiceDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the record stored under the service's full name.
    /// Addresses are left untouched.
    pub fn upsert(&mut self, service: Service) -> FullName {
        let full_name = service.full_name();
        self.services.insert(full_name.clone(), service);
        full_name
    }

    /// Remove a service and its addresses. Returns true if it was present.
    pub fn remove(&mut self, full_name: &FullName) -> bool {
        self.addresses.remove(full_name);
        self.services.remove(full_name).is_some()
    }

    /// Append an address for a known service. Returns true only if the
    /// address was not already recorded.
    pub fn add_address(&mut self, full_name: &FullName, address: impl Into<String>) -> bool {
        if !self.services.contains_key(full_name) {
            return false;
        }
        self.addresses
            .entry(full_name.clone())
            .or_default()
            .insert(address)
    }

    /// Replace the whole address list of a known service.
    pub fn replace_addresses(&mut self, full_name: &FullName, addresses: AddressSet) {
        if !self.services.contains_key(full_name) {
            return;
        }
        if addresses.is_empty() {
            self.addresses.remove(full_name);
        } else {
            self.addresses.insert(full_name.clone(), addresses);
        }
    }

    pub fn clear(&mut self) {
        self.services.clear();
        self.addresses.clear();
    }

    pub fn contains(&self, full_name: &FullName) -> bool {
        self.services.contains_key(full_name)
    }

    pub fn service(&self, full_name: &FullName) -> Option<&Service> {
        self.services.get(full_name)
    }

    pub fn addresses(&self, full_name: &FullName) -> Option<&AddressSet> {
        self.addresses.get(full_name)
    }

    /// Owned copy of one service and its addresses.
    pub fn entry(&self, full_name: &FullName) -> Option<ServiceEntry> {
        self.services.get(full_name).map(|service| ServiceEntry {
            service: service.clone(),
            addresses: self.addresses.get(full_name).cloned().unwrap_or_default(),
        })
    }

    /// Every service with its addresses, ordered by full name.
    pub fn snapshot(&self) -> Vec<ServiceEntry> {
        self.services
            .iter()
            .map(|(full_name, service)| ServiceEntry {
                service: service.clone(),
                addresses: self.addresses.get(full_name).cloned().unwrap_or_default(),
            })
            .collect()
    }

    pub fn full_names(&self) -> impl Iterator<Item = &FullName> {
        self.services.keys()
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    #[cfg(test)]
    fn orphaned_addresses(&self) -> usize {
        self.addresses
            .iter()
            .filter(|(k, v)| !v.is_empty() && !self.services.contains_key(*k))
            .count()
    }
}

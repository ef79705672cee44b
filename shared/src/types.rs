use std::collections::HashMap;
use std::fmt;
use serde::{Serialize, Deserialize};

/// A service announced on the local network.
/// Two services are the same entity iff `name` and `service_type` are equal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    /// Instance name, e.g. "printer"
    pub name: String,

    /// Service type, e.g. "_http._tcp.local."
    #[serde(rename = "type")]
    pub service_type: String,

    /// Hostname, e.g. "printer.local."
    pub hostname: String,

    /// Service port
    pub port: u16,

    /// TXT record key-value pairs
    #[serde(default)]
    pub attributes: HashMap<String, String>,
}

impl Service {
    pub fn new(
        name: impl Into<String>,
        service_type: impl Into<String>,
        hostname: impl Into<String>,
        port: u16,
    ) -> Self {
        Self {
            name: name.into(),
            service_type: service_type.into(),
            hostname: hostname.into(),
            port,
            attributes: HashMap::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn full_name(&self) -> FullName {
        FullName::of(self)
    }
}

/// Directory key: `name + "." + type`.
///
/// Computed once from a record and then handled as an opaque string.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FullName(String);

impl FullName {
    pub fn of(service: &Service) -> Self {
        Self(format!("{}.{}", service.name, service.service_type))
    }

    /// Wrap a full name received from elsewhere (REMOVE payloads, URL paths).
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FullName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Insertion-ordered, duplicate-free list of textual addresses.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct AddressSet(Vec<String>);

impl AddressSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `address` unless already present. Returns true if it was added.
    pub fn insert(&mut self, address: impl Into<String>) -> bool {
        let address = address.into();
        if self.0.contains(&address) {
            return false;
        }
        self.0.push(address);
        true
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, String> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }
}

impl<S: Into<String>> FromIterator<S> for AddressSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut set = AddressSet::new();
        for address in iter {
            set.insert(address);
        }
        set
    }
}

impl<'de> Deserialize<'de> for AddressSet {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Vec::<String>::deserialize(deserializer)?;
        Ok(raw.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a AddressSet {
    type Item = &'a String;
    type IntoIter = std::slice::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// A service together with the addresses resolved for it so far.
/// This is the unit carried by snapshots and ADD_OR_UPDATE messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceEntry {
    pub service: Service,
    pub addresses: AddressSet,
}

impl ServiceEntry {
    pub fn full_name(&self) -> FullName {
        self.service.full_name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_name_concatenates_name_and_type() {
        let service = Service::new("printer", "_http._tcp.local.", "printer.local.", 80);
        assert_eq!(service.full_name().as_str(), "printer._http._tcp.local.");
    }

    #[test]
    fn test_same_name_different_type_is_distinct() {
        let http = Service::new("nas", "_http._tcp.local.", "nas.local.", 80);
        let ssh = Service::new("nas", "_ssh._tcp.local.", "nas.local.", 22);
        assert_ne!(http.full_name(), ssh.full_name());
    }

    #[test]
    fn test_address_set_keeps_first_occurrence_order() {
        let set: AddressSet = ["10.0.0.2", "10.0.0.1", "10.0.0.2"].into_iter().collect();
        assert_eq!(set.as_slice(), ["10.0.0.2", "10.0.0.1"]);
    }

    #[test]
    fn test_address_set_insert_reports_novelty() {
        let mut set = AddressSet::new();
        assert!(set.insert("fd00::1"));
        assert!(!set.insert("fd00::1"));
        assert_eq!(set.len(), 1);
    }
}

use shared::directory::ServiceDirectory;
use shared::error::ProtocolError;
use shared::protocol::Message;
use shared::types::{AddressSet, FullName, Service, ServiceEntry};

/// Receives every change applied to the local mirror.
pub trait Presenter {
    fn on_add_or_update(&mut self, full_name: &FullName, service: &Service, addresses: &AddressSet);
    fn on_remove(&mut self, full_name: &FullName);
}

/// Local copy of the relay's directory.
pub struct Mirror<P> {
    directory: ServiceDirectory,
    presenter: P,
}

impl<P: Presenter> Mirror<P> {
    pub fn new(presenter: P) -> Self {
        Self {
            directory: ServiceDirectory::new(),
            presenter,
        }
    }

    pub fn directory(&self) -> &ServiceDirectory {
        &self.directory
    }

    pub fn presenter(&self) -> &P {
        &self.presenter
    }

    /// Decode a text frame and apply it. Undecodable frames leave the
    /// mirror untouched.
    pub fn apply_text(&mut self, text: &str) -> Result<(), ProtocolError> {
        let message = Message::decode(text)?;
        self.apply(message);
        Ok(())
    }

    pub fn apply(&mut self, message: Message) {
        match message {
            Message::All(entries) => self.resync(entries),
            Message::AddOrUpdate(entry) => self.add_or_update(entry),
            Message::Remove(full_name) => {
                if self.directory.remove(&full_name) {
                    self.presenter.on_remove(&full_name);
                } else {
                    tracing::debug!("Ignoring REMOVE of unknown {}", full_name);
                }
            }
            Message::Refresh => {
                tracing::debug!("Ignoring REFRESH sent by the server");
            }
        }
    }

    /// Rebuild from a full snapshot. Entries that vanished are reported as
    /// removed before the snapshot entries are reported.
    fn resync(&mut self, entries: Vec<ServiceEntry>) {
        let previous: Vec<FullName> = self.directory.full_names().cloned().collect();
        self.directory.clear();

        let mut current = Vec::with_capacity(entries.len());
        for entry in entries {
            let full_name = self.directory.upsert(entry.service);
            self.directory.replace_addresses(&full_name, entry.addresses);
            current.push(full_name);
        }

        for full_name in previous.iter().filter(|name| !self.directory.contains(name)) {
            self.presenter.on_remove(full_name);
        }
        for full_name in &current {
            self.notify(full_name);
        }
    }

    fn add_or_update(&mut self, entry: ServiceEntry) {
        let full_name = self.directory.upsert(entry.service);
        self.directory.replace_addresses(&full_name, entry.addresses);
        self.notify(&full_name);
    }

    fn notify(&mut self, full_name: &FullName) {
        if let Some(service) = self.directory.service(full_name) {
            let empty = AddressSet::new();
            let addresses = self.directory.addresses(full_name).unwrap_or(&empty);
            self.presenter.on_add_or_update(full_name, service, addresses);
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub(crate) enum Seen {
        Upsert(String, Vec<String>),
        Remove(String),
    }

    #[derive(Default)]
    pub(crate) struct Recorder {
        pub seen: Vec<Seen>,
    }

    impl Presenter for Recorder {
        fn on_add_or_update(&mut self, full_name: &FullName, _: &Service, addresses: &AddressSet) {
            self.seen
                .push(Seen::Upsert(full_name.to_string(), addresses.as_slice().to_vec()));
        }

        fn on_remove(&mut self, full_name: &FullName) {
            self.seen.push(Seen::Remove(full_name.to_string()));
        }
    }

    fn entry(name: &str, addresses: &[&str]) -> ServiceEntry {
        ServiceEntry {
            service: Service::new(name, "_http._tcp.local.", format!("{}.local.", name), 80),
            addresses: addresses.iter().copied().collect(),
        }
    }

    #[test]
    fn test_all_rebuilds_and_reports_vanished_entries() {
        let mut mirror = Mirror::new(Recorder::default());
        mirror.apply(Message::All(vec![entry("a", &[]), entry("b", &["10.0.0.2"])]));
        mirror.apply(Message::All(vec![entry("b", &["10.0.0.3"]), entry("c", &[])]));

        assert_eq!(
            mirror.presenter().seen[2..],
            [
                Seen::Remove("a._http._tcp.local.".into()),
                Seen::Upsert("b._http._tcp.local.".into(), vec!["10.0.0.3".into()]),
                Seen::Upsert("c._http._tcp.local.".into(), vec![]),
            ]
        );
        assert_eq!(mirror.directory().len(), 2);
    }

    #[test]
    fn test_add_or_update_replaces_address_list() {
        let mut mirror = Mirror::new(Recorder::default());
        mirror.apply(Message::AddOrUpdate(entry("a", &["10.0.0.1", "10.0.0.2"])));
        mirror.apply(Message::AddOrUpdate(entry("a", &["10.0.0.9"])));

        let key = FullName::new("a._http._tcp.local.");
        assert_eq!(mirror.directory().addresses(&key).unwrap().as_slice(), ["10.0.0.9"]);
        assert_eq!(mirror.presenter().seen.len(), 2);
    }

    #[test]
    fn test_remove_reports_and_forgets() {
        let mut mirror = Mirror::new(Recorder::default());
        mirror.apply(Message::AddOrUpdate(entry("a", &["10.0.0.1"])));
        mirror.apply(Message::Remove(FullName::new("a._http._tcp.local.")));

        assert!(mirror.directory().is_empty());
        assert_eq!(
            mirror.presenter().seen.last(),
            Some(&Seen::Remove("a._http._tcp.local.".into()))
        );
    }

    #[test]
    fn test_remove_of_unknown_name_is_silent() {
        let mut mirror = Mirror::new(Recorder::default());
        mirror.apply(Message::AddOrUpdate(entry("a", &[])));
        mirror.apply(Message::Remove(FullName::new("ghost._http._tcp.local.")));

        assert_eq!(mirror.directory().len(), 1);
        assert_eq!(
            mirror.presenter().seen,
            [Seen::Upsert("a._http._tcp.local.".into(), vec![])]
        );
    }

    #[test]
    fn test_bad_frames_leave_mirror_untouched() {
        let mut mirror = Mirror::new(Recorder::default());
        mirror.apply(Message::AddOrUpdate(entry("a", &[])));

        assert!(mirror.apply_text("{").is_err());
        assert!(mirror.apply_text(r#"{"type":77}"#).is_err());
        mirror.apply_text(r#"{"type":4}"#).unwrap();

        assert_eq!(mirror.directory().len(), 1);
        assert_eq!(mirror.presenter().seen.len(), 1);
    }
}

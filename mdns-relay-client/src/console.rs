use std::collections::HashSet;
use std::io::{self, Write};
use shared::types::{AddressSet, FullName, Service};
use crate::mirror::Presenter;

const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const RED: &str = "\x1b[31m";
const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

/// Prints mirror changes as they arrive.
pub struct ConsolePresenter<W = io::Stdout> {
    out: W,
    color: bool,
    known: HashSet<FullName>,
}

impl ConsolePresenter {
    pub fn stdout() -> Self {
        Self::new(io::stdout(), true)
    }
}

impl<W: Write> ConsolePresenter<W> {
    pub fn new(out: W, color: bool) -> Self {
        Self {
            out,
            color,
            known: HashSet::new(),
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn label(&self, color: &str, text: &str) -> String {
        if self.color {
            format!("{}{}{}{}", BOLD, color, text, RESET)
        } else {
            text.to_string()
        }
    }

    fn write_details(&mut self, service: &Service, addresses: &AddressSet) -> io::Result<()> {
        writeln!(self.out, "    name:       {}", service.name)?;
        writeln!(self.out, "    hostname:   {}", service.hostname)?;
        writeln!(self.out, "    port:       {}", service.port)?;
        writeln!(self.out, "    type:       {}", service.service_type)?;

        let mut attributes: Vec<_> = service.attributes.iter().collect();
        attributes.sort();
        if attributes.is_empty() {
            writeln!(self.out, "    attributes: -")?;
        } else {
            writeln!(self.out, "    attributes:")?;
            for (key, value) in attributes {
                writeln!(self.out, "      {}={}", key, value)?;
            }
        }

        if addresses.is_empty() {
            writeln!(self.out, "    addresses:  -")?;
        } else {
            let joined: Vec<&str> = addresses.iter().map(String::as_str).collect();
            writeln!(self.out, "    addresses:  {}", joined.join(", "))?;
        }
        self.out.flush()
    }
}

impl<W: Write> Presenter for ConsolePresenter<W> {
    fn on_add_or_update(&mut self, full_name: &FullName, service: &Service, addresses: &AddressSet) {
        let label = if self.known.insert(full_name.clone()) {
            self.label(GREEN, "ADDED")
        } else {
            self.label(YELLOW, "UPDATED")
        };
        let result = writeln!(self.out, "{} {}", label, full_name)
            .and_then(|_| self.write_details(service, addresses));
        if let Err(e) = result {
            tracing::warn!("Failed to write to console: {}", e);
        }
    }

    fn on_remove(&mut self, full_name: &FullName) {
        self.known.remove(full_name);
        let label = self.label(RED, "REMOVED");
        let result = writeln!(self.out, "{} {}", label, full_name).and_then(|_| self.out.flush());
        if let Err(e) = result {
            tracing::warn!("Failed to write to console: {}", e);
        }
    }
}

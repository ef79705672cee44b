use std::collections::HashMap;
use serde::{Serialize, Deserialize};
use crate::error::ProtocolError;
use crate::types::{AddressSet, FullName, Service, ServiceEntry};

/// Service type browsed when nothing else is configured
pub const DEFAULT_SERVICE_TYPE: &str = "_http._tcp.local.";

/// Default WebSocket port of the relay daemon
pub const DEFAULT_PORT: u16 = 1234;

/// Default endpoint clients connect to
pub const DEFAULT_URL: &str = "ws://localhost:1234";

/// Path the WebSocket endpoint is served on
pub const WS_PATH: &str = "/";

/// Integer codes carried in the `type` field of every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    /// Used when the `type` field is absent
    None = 0,
    All = 1,
    AddOrUpdate = 2,
    Remove = 3,
    Refresh = 4,
}

impl MessageType {
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(MessageType::None),
            1 => Some(MessageType::All),
            2 => Some(MessageType::AddOrUpdate),
            3 => Some(MessageType::Remove),
            4 => Some(MessageType::Refresh),
            _ => None,
        }
    }
}

/// A decoded protocol frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Full directory snapshot (server -> client)
    All(Vec<ServiceEntry>),
    /// One service was added or changed (server -> client)
    AddOrUpdate(ServiceEntry),
    /// A service disappeared (server -> client)
    Remove(FullName),
    /// Ask the server for a new snapshot (client -> server)
    Refresh,
}

/// JSON shape of a service inside a frame.
///
/// `fullname` is always recomputed from `name` and `type` when converting
/// into a [`ServiceEntry`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireService {
    pub name: String,
    #[serde(default)]
    pub hostname: String,
    #[serde(default)]
    pub port: u16,
    #[serde(rename = "type")]
    pub service_type: String,
    #[serde(default)]
    pub fullname: Option<String>,
    #[serde(default)]
    pub attributes: HashMap<String, String>,
    #[serde(default)]
    pub addresses: AddressSet,
}

impl From<&ServiceEntry> for WireService {
    fn from(entry: &ServiceEntry) -> Self {
        let service = &entry.service;
        Self {
            name: service.name.clone(),
            hostname: service.hostname.clone(),
            port: service.port,
            service_type: service.service_type.clone(),
            fullname: Some(service.full_name().to_string()),
            attributes: service.attributes.clone(),
            addresses: entry.addresses.clone(),
        }
    }
}

impl WireService {
    pub fn into_entry(self) -> ServiceEntry {
        let service = Service {
            name: self.name,
            service_type: self.service_type,
            hostname: self.hostname,
            port: self.port,
            attributes: self.attributes,
        };

        if let Some(supplied) = self.fullname.as_deref() {
            if supplied != service.full_name().as_str() {
                tracing::warn!(
                    "Ignoring supplied fullname {} for {}",
                    supplied,
                    service.full_name()
                );
            }
        }

        ServiceEntry {
            service,
            addresses: self.addresses,
        }
    }
}

#[derive(Serialize)]
struct OutFrame {
    #[serde(rename = "type")]
    kind: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    services: Option<Vec<WireService>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    service: Option<WireService>,
    #[serde(skip_serializing_if = "Option::is_none")]
    fullname: Option<String>,
}

#[derive(Deserialize)]
struct InFrame {
    #[serde(rename = "type", default)]
    kind: Option<i64>,
    #[serde(default)]
    services: Option<Vec<WireService>>,
    #[serde(default)]
    service: Option<WireService>,
    #[serde(default)]
    fullname: Option<String>,
}

impl Message {
    pub fn kind(&self) -> MessageType {
        match self {
            Message::All(_) => MessageType::All,
            Message::AddOrUpdate(_) => MessageType::AddOrUpdate,
            Message::Remove(_) => MessageType::Remove,
            Message::Refresh => MessageType::Refresh,
        }
    }

    /// Encode as a single JSON text frame.
    pub fn encode(&self) -> Result<String, ProtocolError> {
        let mut frame = OutFrame {
            kind: self.kind().code(),
            services: None,
            service: None,
            fullname: None,
        };
        match self {
            Message::All(entries) => {
                frame.services = Some(entries.iter().map(WireService::from).collect());
            }
            Message::AddOrUpdate(entry) => {
                frame.service = Some(WireService::from(entry));
            }
            Message::Remove(full_name) => {
                frame.fullname = Some(full_name.to_string());
            }
            Message::Refresh => {}
        }
        Ok(serde_json::to_string(&frame)?)
    }

    /// Decode one JSON text frame.
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        let frame: InFrame = serde_json::from_str(text)?;
        let code = frame.kind.ok_or(ProtocolError::MissingType)?;

        match MessageType::from_code(code) {
            Some(MessageType::All) => {
                let services = frame.services.ok_or(ProtocolError::MissingField {
                    kind: MessageType::All,
                    field: "services",
                })?;
                Ok(Message::All(
                    services.into_iter().map(WireService::into_entry).collect(),
                ))
            }
            Some(MessageType::AddOrUpdate) => {
                let service = frame.service.ok_or(ProtocolError::MissingField {
                    kind: MessageType::AddOrUpdate,
                    field: "service",
                })?;
                Ok(Message::AddOrUpdate(service.into_entry()))
            }
            Some(MessageType::Remove) => {
                let fullname = frame.fullname.ok_or(ProtocolError::MissingField {
                    kind: MessageType::Remove,
                    field: "fullname",
                })?;
                Ok(Message::Remove(FullName::new(fullname)))
            }
            Some(MessageType::Refresh) => Ok(Message::Refresh),
            Some(MessageType::None) | None => Err(ProtocolError::UnknownType(code)),
        }
    }
}

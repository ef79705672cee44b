//! Data model, directory store and wire protocol shared by the relay daemon
//! and its clients.

pub mod directory;
pub mod error;
pub mod protocol;
pub mod types;

pub use directory::ServiceDirectory;
pub use error::ProtocolError;
pub use protocol::{Message, MessageType, WireService};
pub use types::{AddressSet, FullName, Service, ServiceEntry};

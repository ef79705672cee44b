//! Client side of the mDNS relay: keeps a local mirror of the relay's
//! service directory over a reconnecting WebSocket connection.

pub mod agent;
pub mod config;
pub mod console;
pub mod lifecycle;
pub mod mirror;

pub use agent::{AgentConfig, AgentError, RefreshTrigger, SyncAgent};
pub use lifecycle::{ConnectionState, RetryBudget};
pub use mirror::{Mirror, Presenter};

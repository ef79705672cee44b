//! Relays an mDNS service directory to WebSocket clients.
//!
//! Discovery events flow from the mdns-sd browser into the
//! [`bridge::DiscoveryBridge`], which owns the directory and the hostname
//! resolution tasks; every change is fanned out by the
//! [`hub::BroadcastHub`]. Both live inside the single [`relay::run`] loop.

pub mod api;
pub mod bridge;
pub mod config;
pub mod hub;
pub mod mdns;
pub mod relay;
pub mod shutdown;

use std::path::Path;
use std::time::Duration;
use serde::Deserialize;
use anyhow::{Context, Result};
use shared::protocol::{DEFAULT_PORT, DEFAULT_SERVICE_TYPE};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DiscoveryConfig {
    /// Service types to browse, e.g. "_http._tcp.local."
    #[serde(default = "default_service_types")]
    pub service_types: Vec<String>,
    /// Also follow the DNS-SD meta-query and browse every advertised type
    #[serde(default)]
    pub browse_all: bool,
    /// Restrict mDNS traffic to one interface (name or address)
    #[serde(default)]
    pub interface: Option<String>,
    /// Do not replay previously resolved host addresses to new lookups
    #[serde(default)]
    pub no_cache: bool,
    /// Give up on a hostname lookup after this many milliseconds
    #[serde(default)]
    pub resolve_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen")]
    pub listen: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogConfig {
    /// Diagnostic output only
    #[serde(default)]
    pub verbose: bool,
}

fn default_service_types() -> Vec<String> {
    vec![DEFAULT_SERVICE_TYPE.to_string()]
}

fn default_listen() -> String {
    format!("0.0.0.0:{}", DEFAULT_PORT)
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            service_types: default_service_types(),
            browse_all: false,
            interface: None,
            no_cache: false,
            resolve_timeout_ms: None,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

impl DiscoveryConfig {
    pub fn resolve_timeout(&self) -> Option<Duration> {
        self.resolve_timeout_ms.map(Duration::from_millis)
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        if config.discovery.service_types.is_empty() && !config.discovery.browse_all {
            anyhow::bail!("discovery.service_types is empty and browse_all is off");
        }
        Ok(config)
    }
}

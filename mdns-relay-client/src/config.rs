use std::time::Duration;
use clap::Parser;
use shared::protocol::DEFAULT_URL;
use crate::agent::AgentConfig;
use crate::lifecycle::RetryBudget;

/// Mirror the service directory of an mdns-relayd instance
#[derive(Debug, Parser)]
#[command(name = "mdns-relay-client", version)]
pub struct Args {
    /// WebSocket URL of the relay
    #[arg(short, long, default_value = DEFAULT_URL)]
    pub url: String,

    /// Reconnect attempts after a failure (-1 = unlimited, 0 = never)
    #[arg(short, long, default_value_t = -1, allow_negative_numbers = true)]
    pub max_retries: i64,

    /// Delay between reconnect attempts, in milliseconds
    #[arg(short, long, default_value_t = 5000)]
    pub retry_interval: u64,

    /// Periodic refresh interval in milliseconds (<= 0 disables it)
    #[arg(short = 'f', long, default_value_t = -1, allow_negative_numbers = true)]
    pub refresh_interval: i64,

    /// Debug logging
    #[arg(long)]
    pub verbose: bool,
}

impl Args {
    pub fn agent_config(&self) -> AgentConfig {
        let refresh_interval = u64::try_from(self.refresh_interval)
            .ok()
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis);

        AgentConfig {
            url: self.url.clone(),
            max_retries: RetryBudget::from_max_retries(self.max_retries),
            retry_interval: Duration::from_millis(self.retry_interval),
            refresh_interval,
        }
    }
}

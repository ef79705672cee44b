use std::process::ExitCode;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use mdns_relay_client::config::Args;
use mdns_relay_client::console::ConsolePresenter;
use mdns_relay_client::{AgentError, RefreshTrigger, SyncAgent};

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let default_filter = if args.verbose {
        "mdns_relay_client=debug,shared=debug"
    } else {
        "mdns_relay_client=info,shared=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter))
        )
        .with_writer(std::io::stderr)
        .init();

    let (agent, trigger) = SyncAgent::new(args.agent_config(), ConsolePresenter::stdout());
    let cancel = CancellationToken::new();

    // Every line on stdin asks for a fresh snapshot
    tokio::spawn(read_refresh_requests(trigger));

    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("Shutdown signal received"),
            Err(e) => tracing::error!("Failed to listen for ctrl-c: {}", e),
        }
        signal_cancel.cancel();
    });

    match agent.run(cancel).await {
        Ok(mirror) => {
            tracing::info!("Stopped with {} mirrored services", mirror.directory().len());
            ExitCode::SUCCESS
        }
        Err(e @ AgentError::RetriesExhausted { .. }) => {
            tracing::error!("{}", e);
            ExitCode::from(2)
        }
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn read_refresh_requests(trigger: RefreshTrigger) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(_)) => {
                if !trigger.refresh() {
                    break;
                }
            }
            Ok(None) => break,
            Err(e) => {
                tracing::warn!("Failed to read stdin: {}", e);
                break;
            }
        }
    }
}

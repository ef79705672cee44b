use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use mdns_sd::ServiceDaemon;
use anyhow::{Context, Result};
use mdns_relayd::api;
use mdns_relayd::config::Config;
use mdns_relayd::mdns::{browser, resolver::MdnsResolver};
use mdns_relayd::relay;
use mdns_relayd::shutdown::{self, Stop};

#[tokio::main]
async fn main() -> Result<()> {
    // Load config; without a path every default applies
    let config_path = std::env::args().nth(1);
    let config = match &config_path {
        Some(path) => Config::load(path)
            .with_context(|| format!("Failed to load config from {}", path))?,
        None => Config::default(),
    };

    // Initialize tracing
    let default_filter = if config.log.verbose {
        "mdns_relayd=debug,shared=debug"
    } else {
        "mdns_relayd=info,shared=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter))
        )
        .init();

    tracing::info!("Starting mdns-relayd");
    match &config_path {
        Some(path) => tracing::info!("Loaded config from {}", path),
        None => tracing::info!("No config file given, using defaults"),
    }

    // Create mDNS daemon, optionally bound to one interface
    let mdns_daemon = ServiceDaemon::new()
        .context("Failed to create mDNS daemon")?;
    if let Some(interface) = &config.discovery.interface {
        mdns_daemon
            .disable_interface(mdns_sd::IfKind::All)
            .context("Failed to disable default interfaces")?;
        mdns_daemon
            .enable_interface(interface.as_str())
            .with_context(|| format!("Failed to enable interface {}", interface))?;
    }

    // Create cancellation token for graceful shutdown
    let cancel = CancellationToken::new();

    // Spawn mDNS browser task
    let (browser_tx, browser_rx) = mpsc::channel(256);
    let browser_cancel = cancel.clone();
    let browser_daemon = mdns_daemon.clone();
    let browser_config = config.discovery.clone();
    let mut browser_handle = tokio::spawn(browser::run_browser(
        browser_daemon,
        browser_config,
        browser_tx,
        browser_cancel,
    ));

    // Spawn hostname resolver task
    let (resolver, resolver_handle) =
        MdnsResolver::spawn(mdns_daemon.clone(), &config.discovery, cancel.clone());

    // Spawn relay loop
    let (relay_handle, relay_commands) = relay::channel();
    let relay_cancel = cancel.clone();
    let relay_task = tokio::spawn(async move {
        if let Err(e) = relay::run(resolver, browser_rx, relay_commands, relay_cancel).await {
            tracing::error!("Relay loop error: {}", e);
        }
    });

    let app = api::routes::router(api::routes::AppState {
        relay: relay_handle,
    });

    // Bind WebSocket / HTTP server
    let listener = tokio::net::TcpListener::bind(&config.server.listen)
        .await
        .with_context(|| format!("Failed to bind to {}", config.server.listen))?;

    tracing::info!("Listening on {}", config.server.listen);

    // Run server with graceful shutdown
    let server_cancel = cancel.clone();
    let mut server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async move { server_cancel.cancelled().await })
            .await
        {
            tracing::error!("Server error: {}", e);
        }
    });

    // Wait for a shutdown signal, the listener closing or discovery failing
    let stop = shutdown::wait_for_stop(
        tokio::signal::ctrl_c(),
        &mut server_handle,
        &mut browser_handle,
    )
    .await;

    // Trigger cancellation
    cancel.cancel();

    // Wait for all tasks to complete
    let _ = tokio::join!(resolver_handle, relay_task);
    if !browser_handle.is_finished() {
        let _ = browser_handle.await;
    }
    if !server_handle.is_finished() {
        let _ = server_handle.await;
    }

    // Shutdown mDNS daemon
    if let Err(e) = mdns_daemon.shutdown() {
        tracing::error!("Failed to shutdown mDNS daemon: {}", e);
    }

    if let Stop::DiscoveryFailed(error) = stop {
        return Err(error.context("mDNS discovery stopped"));
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

use std::future::Future;
use anyhow::{anyhow, Result};
use tokio::task::JoinHandle;

/// Why the daemon is stopping
#[derive(Debug)]
pub enum Stop {
    /// ctrl-c or a failure to listen for it
    Signal,
    /// The HTTP/WebSocket server ended on its own
    ListenerClosed,
    /// The browser ended before shutdown; nothing can be discovered anymore
    DiscoveryFailed(anyhow::Error),
}

/// Wait until the first of the signal, the server task or the browser task
/// finishes. The browser only returns early on failure.
pub async fn wait_for_stop<S>(
    signal: S,
    server: &mut JoinHandle<()>,
    browser: &mut JoinHandle<Result<()>>,
) -> Stop
where
    S: Future<Output = std::io::Result<()>>,
{
    tokio::select! {
        result = signal => {
            match result {
                Ok(()) => tracing::info!("Shutdown signal received"),
                Err(e) => tracing::error!("Failed to listen for ctrl-c: {}", e),
            }
            Stop::Signal
        }
        _ = server => {
            tracing::warn!("Listener closed, shutting down");
            Stop::ListenerClosed
        }
        result = browser => {
            let error = match result {
                Ok(Ok(())) => anyhow!("mDNS browser stopped unexpectedly"),
                Ok(Err(e)) => e,
                Err(e) => anyhow::Error::new(e).context("mDNS browser task failed"),
            };
            tracing::error!("Discovery failed, shutting down: {:#}", error);
            Stop::DiscoveryFailed(error)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn idle_server() -> JoinHandle<()> {
        tokio::spawn(std::future::pending())
    }

    #[tokio::test]
    async fn test_failed_browser_stops_the_daemon() {
        let mut server = idle_server();
        let mut browser: JoinHandle<Result<()>> =
            tokio::spawn(async { anyhow::bail!("no mDNS browse could be started") });

        let stop = tokio::time::timeout(
            Duration::from_secs(2),
            wait_for_stop(std::future::pending(), &mut server, &mut browser),
        )
        .await
        .unwrap();

        let Stop::DiscoveryFailed(error) = stop else {
            panic!("expected discovery failure, got {:?}", stop);
        };
        assert!(error.to_string().contains("no mDNS browse"));
        server.abort();
    }

    #[tokio::test]
    async fn test_signal_wins_while_everything_runs() {
        let mut server = idle_server();
        let mut browser: JoinHandle<Result<()>> = tokio::spawn(std::future::pending());

        let stop = wait_for_stop(async { Ok(()) }, &mut server, &mut browser).await;

        assert!(matches!(stop, Stop::Signal));
        assert!(!browser.is_finished());
        server.abort();
        browser.abort();
    }

    #[tokio::test]
    async fn test_server_exit_stops_the_daemon() {
        let mut server = tokio::spawn(async {});
        let mut browser: JoinHandle<Result<()>> = tokio::spawn(std::future::pending());

        let stop = wait_for_stop(std::future::pending(), &mut server, &mut browser).await;

        assert!(matches!(stop, Stop::ListenerClosed));
        browser.abort();
    }
}

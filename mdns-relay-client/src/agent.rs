use std::time::Duration;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tokio_tungstenite::tungstenite::protocol::Message as WsMessage;
use tokio_tungstenite::tungstenite::Error as WsError;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use shared::protocol::Message;
use crate::lifecycle::{ConnectionState, Lifecycle, RetryBudget};
use crate::mirror::{Mirror, Presenter};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Error)]
pub enum AgentError {
    /// The retry budget is spent; the agent will not reconnect
    #[error("gave up on {url} after {retries} retries")]
    RetriesExhausted { url: String, retries: u32 },
    #[error("unsupported relay url {0}, expected ws://host[:port]")]
    InvalidUrl(String),
}

#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// WebSocket URL (ws:// only)
    pub url: String,
    pub max_retries: RetryBudget,
    pub retry_interval: Duration,
    /// Send REFRESH periodically while connected
    pub refresh_interval: Option<Duration>,
}

impl AgentConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_retries: RetryBudget::Unlimited,
            retry_interval: Duration::from_millis(5000),
            refresh_interval: None,
        }
    }
}

/// Requests a refresh from outside the agent, e.g. on user input.
#[derive(Clone)]
pub struct RefreshTrigger {
    tx: mpsc::UnboundedSender<()>,
}

impl RefreshTrigger {
    /// Returns false once the agent has stopped.
    pub fn refresh(&self) -> bool {
        self.tx.send(()).is_ok()
    }
}

enum SessionEnd {
    Lost,
    Cancelled,
}

enum SessionEvent {
    Cancelled,
    PeriodicRefresh,
    ManualRefresh,
    Frame(Option<Result<WsMessage, WsError>>),
}

/// Keeps a [`Mirror`] in sync with one relay endpoint, reconnecting as the
/// retry budget allows.
pub struct SyncAgent<P> {
    config: AgentConfig,
    lifecycle: Lifecycle,
    mirror: Mirror<P>,
    refresh_rx: mpsc::UnboundedReceiver<()>,
    state_tx: watch::Sender<ConnectionState>,
}

impl<P: Presenter> SyncAgent<P> {
    pub fn new(config: AgentConfig, presenter: P) -> (Self, RefreshTrigger) {
        let (tx, refresh_rx) = mpsc::unbounded_channel();
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        let agent = Self {
            lifecycle: Lifecycle::new(config.max_retries),
            config,
            mirror: Mirror::new(presenter),
            refresh_rx,
            state_tx,
        };
        (agent, RefreshTrigger { tx })
    }

    /// Observe connection state changes
    pub fn state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    /// Run until cancelled (returns the mirror) or until the retry budget is
    /// exhausted.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<Mirror<P>, AgentError> {
        if !self.config.url.starts_with("ws://") {
            return Err(AgentError::InvalidUrl(self.config.url.clone()));
        }

        let state = self.lifecycle.start();
        self.publish(state);

        loop {
            tracing::info!("Connecting to {}", self.config.url);
            let connect = tokio::select! {
                result = connect_async(self.config.url.as_str()) => Some(result),
                _ = cancel.cancelled() => None,
            };

            match connect {
                None => return Ok(self.finish()),
                Some(Ok((socket, _response))) => {
                    let state = self.lifecycle.connected();
                    self.publish(state);
                    tracing::info!("Connected to {}", self.config.url);

                    match self.session(socket, &cancel).await {
                        SessionEnd::Cancelled => return Ok(self.finish()),
                        SessionEnd::Lost => tracing::warn!("Disconnected from {}", self.config.url),
                    }
                }
                Some(Err(e)) => {
                    tracing::warn!("Failed to connect to {}: {}", self.config.url, e);
                }
            }

            let state = self.lifecycle.connection_lost();
            self.publish(state);
            if state == ConnectionState::Terminated {
                tracing::error!("Retry budget exhausted, giving up on {}", self.config.url);
                return Err(AgentError::RetriesExhausted {
                    url: self.config.url.clone(),
                    retries: self.lifecycle.retries(),
                });
            }

            tracing::info!(
                "Reconnecting in {:?} (retry {})",
                self.config.retry_interval,
                self.lifecycle.retries()
            );
            tokio::select! {
                _ = tokio::time::sleep(self.config.retry_interval) => {}
                _ = cancel.cancelled() => return Ok(self.finish()),
            }
            let state = self.lifecycle.reopen();
            self.publish(state);
        }
    }

    /// Pump one open connection until it drops or the agent is cancelled.
    /// The refresh timer lives only as long as the session.
    async fn session(&mut self, socket: Socket, cancel: &CancellationToken) -> SessionEnd {
        let (mut sink, mut stream) = socket.split();
        let mut refresh_timer = self.config.refresh_interval.map(|period| {
            let mut timer = interval_at(Instant::now() + period, period);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
            timer
        });

        // Requests made while disconnected are answered by the ALL every
        // new connection starts with.
        while self.refresh_rx.try_recv().is_ok() {}

        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => SessionEvent::Cancelled,
                _ = next_tick(&mut refresh_timer) => SessionEvent::PeriodicRefresh,
                Some(()) = self.refresh_rx.recv() => SessionEvent::ManualRefresh,
                frame = stream.next() => SessionEvent::Frame(frame),
            };

            match event {
                SessionEvent::Cancelled => {
                    let _ = sink.send(WsMessage::Close(None)).await;
                    return SessionEnd::Cancelled;
                }
                SessionEvent::PeriodicRefresh => {
                    tracing::debug!("Periodic refresh");
                    if !send_refresh(&mut sink).await {
                        return SessionEnd::Lost;
                    }
                }
                SessionEvent::ManualRefresh => {
                    tracing::debug!("Manual refresh");
                    if let Some(timer) = refresh_timer.as_mut() {
                        timer.reset();
                    }
                    if !send_refresh(&mut sink).await {
                        return SessionEnd::Lost;
                    }
                }
                SessionEvent::Frame(Some(Ok(WsMessage::Text(text)))) => {
                    if let Err(e) = self.mirror.apply_text(&text) {
                        tracing::warn!("Dropping unreadable message: {}", e);
                    }
                }
                SessionEvent::Frame(Some(Ok(WsMessage::Close(_)))) | SessionEvent::Frame(None) => {
                    return SessionEnd::Lost;
                }
                SessionEvent::Frame(Some(Ok(_))) => {}
                SessionEvent::Frame(Some(Err(e))) => {
                    tracing::warn!("Connection error: {}", e);
                    return SessionEnd::Lost;
                }
            }
        }
    }

    fn publish(&self, state: ConnectionState) {
        tracing::debug!("Connection state: {}", state);
        self.state_tx.send_replace(state);
    }

    fn finish(self) -> Mirror<P> {
        tracing::info!("Sync agent stopped");
        self.mirror
    }
}

/// Returns false when the connection can no longer be written to.
async fn send_refresh(sink: &mut SplitSink<Socket, WsMessage>) -> bool {
    let frame = match Message::Refresh.encode() {
        Ok(frame) => frame,
        Err(e) => {
            tracing::error!("Failed to encode refresh: {}", e);
            return true;
        }
    };
    match sink.send(WsMessage::Text(frame)).await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!("Failed to send refresh: {}", e);
            false
        }
    }
}

async fn next_tick(timer: &mut Option<Interval>) {
    match timer {
        Some(timer) => {
            timer.tick().await;
        }
        None => std::future::pending().await,
    }
}

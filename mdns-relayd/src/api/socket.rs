use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use crate::api::routes::AppState;
use crate::hub;
use crate::relay::RelayHandle;

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state.relay))
}

/// One WebSocket connection: a writer task draining this client's queue and
/// a reader task forwarding text frames to the relay loop.
async fn handle_socket(socket: WebSocket, relay: RelayHandle) {
    let (mut sender, mut receiver) = socket.split();
    let (outbound_tx, mut outbound_rx) = hub::outbound();

    let client = match relay.connect(outbound_tx).await {
        Ok(id) => id,
        Err(e) => {
            tracing::error!("Failed to register client: {}", e);
            return;
        }
    };

    let mut send_task = tokio::spawn(async move {
        while let Some(frame) = outbound_rx.recv().await {
            if let Err(e) = sender.send(Message::Text(frame)).await {
                tracing::debug!("Client {}: send failed: {}", client, e);
                break;
            }
        }
    });

    let recv_relay = relay.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(result) = receiver.next().await {
            match result {
                Ok(Message::Text(text)) => {
                    if recv_relay.message(client, text).await.is_err() {
                        break;
                    }
                }
                Ok(Message::Binary(_)) => {
                    tracing::debug!("Client {}: ignoring binary frame", client);
                }
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    tracing::debug!("Client {}: receive failed: {}", client, e);
                    break;
                }
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    if let Err(e) = relay.disconnect(client).await {
        tracing::debug!("Client {}: {}", client, e);
    }
}

use axum::{
    body::Bytes,
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::control::handle_text;
use crate::registry::SessionHandle;
use crate::state::AppState;

/// Handle WebSocket upgrade
pub async fn handle_websocket(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> Response {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// Handle individual WebSocket connection
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();
    let (session, mut outbound) = SessionHandle::new(state.session_queue_capacity);
    let session_id = session.id();

    state.hub.register(session);
    info!(
        "New client connected: {} ({} connected)",
        session_id,
        state.hub.session_count()
    );

    // Pong replies bypass the event queue so a full queue never delays them
    let (pong_tx, mut pong_rx) = mpsc::channel::<Bytes>(4);

    // Writer: drains this session's queue so slow sockets never block others
    let writer = tokio::spawn(async move {
        loop {
            let frame = tokio::select! {
                Some(payload) = pong_rx.recv() => Message::Pong(payload),
                event = outbound.recv() => {
                    let Some(event) = event else { break };
                    match serde_json::to_string(&event) {
                        Ok(json) => Message::Text(json.into()),
                        Err(e) => {
                            error!("Failed to serialize event: {}", e);
                            continue;
                        }
                    }
                }
            };
            if let Err(e) = sender.send(frame).await {
                debug!("Failed to send to client {}: {}", session_id, e);
                break;
            }
        }
    });

    while let Some(msg) = receiver.next().await {
        let msg = match msg {
            Ok(msg) => msg,
            Err(e) => {
                error!("WebSocket error: {}", e);
                break;
            }
        };

        match msg {
            Message::Text(text) => {
                if let Some(reply) = handle_text(text.as_str(), &state.switch).await {
                    if state.hub.unicast(&session_id, reply).is_err() {
                        break;
                    }
                }
            }
            Message::Ping(payload) => {
                let _ = pong_tx.try_send(payload);
            }
            Message::Close(_) => {
                info!("WebSocket connection closed by client");
                break;
            }
            _ => {}
        }
    }

    state.hub.unregister(&session_id);
    writer.abort();

    info!(
        "Client {} disconnected ({} remaining)",
        session_id,
        state.hub.session_count()
    );
}

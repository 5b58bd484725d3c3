use axum::{
    extract::{
        ws::{Message, WebSocket},
        Path, State, WebSocketUpgrade,
    },
    response::Response,
};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, warn};

use crate::events::TrackingEvent;
use crate::AppState;

/// Streams one order's position, status and route events.
pub async fn order_socket(
    ws: WebSocketUpgrade,
    Path(order_id): Path<String>,
    State(state): State<AppState>,
) -> Response {
    let rx = state.events.subscribe(&order_id);
    ws.on_upgrade(move |socket| forward(socket, rx, order_id))
}

/// Streams events for every order (batched positions, all status changes).
pub async fn global_socket(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    let rx = state.events.subscribe_global();
    ws.on_upgrade(|socket| forward(socket, rx, "global".to_string()))
}

async fn forward(
    mut socket: WebSocket,
    mut rx: broadcast::Receiver<TrackingEvent>,
    channel: String,
) {
    debug!(%channel, "subscriber connected");
    loop {
        tokio::select! {
            event = rx.recv() => match event {
                Ok(event) => {
                    let text = match serde_json::to_string(&event) {
                        Ok(text) => text,
                        Err(err) => {
                            warn!(%channel, error = %err, "failed to encode event");
                            continue;
                        }
                    };
                    if socket.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(%channel, skipped, "subscriber fell behind, events dropped");
                }
                Err(RecvError::Closed) => break,
            },
            incoming = socket.recv() => match incoming {
                // Clients only listen; anything but a close is ignored.
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }
    debug!(%channel, "subscriber disconnected");
}

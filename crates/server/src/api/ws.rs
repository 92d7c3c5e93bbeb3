//! WebSocket push of session progress.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::{IntoResponse, Response},
};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use mixloop_core::ProgressSubscription;

use super::error::ApiError;
use super::progress::SessionParams;
use crate::metrics::{WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL, WS_MESSAGES_SENT};
use crate::state::AppState;

/// WebSocket upgrade handler.
///
/// The subscription is taken before the upgrade completes, so a client
/// connecting mid-job first receives the latest event and then every later
/// one.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(params): Query<SessionParams>,
) -> Result<Response, ApiError> {
    let session_id = params.require()?;
    let subscription = state.broadcaster().subscribe(&session_id).await;
    Ok(ws
        .on_upgrade(move |socket| handle_socket(socket, subscription))
        .into_response())
}

/// Forward events until the session is cleaned up or the client leaves.
async fn handle_socket(socket: WebSocket, mut subscription: ProgressSubscription) {
    let (mut sender, mut receiver) = socket.split();
    let session_id = subscription.session_id().to_string();

    WS_CONNECTIONS_TOTAL.inc();
    WS_CONNECTIONS_ACTIVE.inc();
    info!(session_id = %session_id, "Progress client connected");

    loop {
        tokio::select! {
            event = subscription.recv() => {
                let Some(event) = event else {
                    debug!(session_id = %session_id, "Session cleaned up, closing stream");
                    let _ = sender.send(Message::Close(None)).await;
                    break;
                };
                match serde_json::to_string(&event) {
                    Ok(json) => {
                        WS_MESSAGES_SENT
                            .with_label_values(&[event.stage.as_str()])
                            .inc();
                        if sender.send(Message::Text(json.into())).await.is_err() {
                            debug!("WebSocket send failed, client disconnected");
                            break;
                        }
                    }
                    Err(e) => {
                        error!("Failed to serialize ProgressEvent: {}", e);
                    }
                }
            }
            incoming = receiver.next() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | None => {
                        debug!("WebSocket client requested close");
                        break;
                    }
                    Some(Ok(_)) => {
                        // Clients have nothing to say; pings are answered by axum
                    }
                    Some(Err(e)) => {
                        warn!("WebSocket receive error: {}", e);
                        break;
                    }
                }
            }
        }
    }

    WS_CONNECTIONS_ACTIVE.dec();
    info!(session_id = %session_id, "Progress client disconnected");
}

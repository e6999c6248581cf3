//! WebSocket upgrade handler

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::app::AppState;
use crate::matchmaking::{ConnectionId, MatchmakingHandle};
use crate::util::rate_limit::ConnectionRateLimiter;
use crate::ws::protocol::{ClientMsg, ProtocolError, ServerMsg};

/// Outbound messages buffered per connection before new ones are dropped
const OUTBOUND_BUFFER: usize = 64;

/// WebSocket upgrade handler
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state.matchmaking))
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, matchmaking: MatchmakingHandle) {
    let connection_id = Uuid::new_v4();
    info!(connection_id = %connection_id, "New WebSocket connection");

    let (ws_sink, ws_stream) = socket.split();
    let (outbound_tx, outbound_rx) = mpsc::channel::<ServerMsg>(OUTBOUND_BUFFER);

    // The service holds the only sender, so it can cut a stalled client off
    if let Err(e) = matchmaking.connect(connection_id, outbound_tx).await {
        error!(connection_id = %connection_id, error = %e, "Failed to register connection");
        return;
    }

    // Spawn writer task: service messages -> WebSocket
    let writer_handle = tokio::spawn(write_loop(connection_id, ws_sink, outbound_rx));

    read_loop(connection_id, ws_stream, &matchmaking).await;

    // Cleanup on disconnect
    if let Err(e) = matchmaking.disconnect(connection_id).await {
        warn!(connection_id = %connection_id, error = %e, "Disconnect not delivered");
    }
    writer_handle.abort();

    info!(connection_id = %connection_id, "WebSocket connection closed");
}

async fn write_loop(
    connection_id: ConnectionId,
    mut ws_sink: SplitSink<WebSocket, Message>,
    mut outbound_rx: mpsc::Receiver<ServerMsg>,
) {
    while let Some(msg) = outbound_rx.recv().await {
        if let Err(e) = send_msg(&mut ws_sink, &msg).await {
            debug!(connection_id = %connection_id, error = %e, "WebSocket send failed");
            return;
        }
    }

    // Sender dropped by the service: close so the client notices
    debug!(connection_id = %connection_id, "Outbound channel closed, closing socket");
    let _ = ws_sink.close().await;
}

/// Reader loop: WebSocket -> matchmaking service
async fn read_loop(
    connection_id: ConnectionId,
    mut ws_stream: SplitStream<WebSocket>,
    matchmaking: &MatchmakingHandle,
) {
    let rate_limiter = ConnectionRateLimiter::new();

    while let Some(result) = ws_stream.next().await {
        match result {
            Ok(Message::Text(text)) => {
                let msg = match ClientMsg::parse(&text) {
                    Ok(msg) => msg,
                    Err(e) => {
                        warn!(connection_id = %connection_id, error = %e, "Rejected client message");
                        if matchmaking.reject(connection_id, e).await.is_err() {
                            break;
                        }
                        continue;
                    }
                };

                if matches!(msg, ClientMsg::FindMatch(_)) && !rate_limiter.check_join() {
                    warn!(connection_id = %connection_id, "Rate limited find-match");
                    if matchmaking
                        .reject(connection_id, ProtocolError::RateLimited)
                        .await
                        .is_err()
                    {
                        break;
                    }
                    continue;
                }

                if matchmaking.submit(connection_id, msg).await.is_err() {
                    debug!(connection_id = %connection_id, "Matchmaking service gone");
                    break;
                }
            }
            Ok(Message::Binary(_)) => {
                warn!(connection_id = %connection_id, "Received binary message, ignoring");
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(Message::Close(_)) => {
                info!(connection_id = %connection_id, "Client initiated close");
                break;
            }
            Err(e) => {
                error!(connection_id = %connection_id, error = %e, "WebSocket error");
                break;
            }
        }
    }
}

/// Send a message over WebSocket
async fn send_msg(
    sink: &mut SplitSink<WebSocket, Message>,
    msg: &ServerMsg,
) -> Result<(), String> {
    let json = serde_json::to_string(msg).map_err(|e| e.to_string())?;
    sink.send(Message::Text(json))
        .await
        .map_err(|e| e.to_string())
}

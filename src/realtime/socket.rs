//! WebSocket endpoints feeding the connection registry.
//!
//! One writer task per socket drains the subscriber's queue, which gives
//! per-channel FIFO. The read loop only watches for close; heartbeats and
//! any other client frames are ignored.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use uuid::Uuid;

use super::registry::{Scope, Subscriber};
use crate::AppState;

pub async fn project_ws(
    ws: WebSocketUpgrade,
    Path(project_id): Path<Uuid>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| serve_scope(socket, Scope::Project(project_id), state))
}

pub async fn thread_ws(
    ws: WebSocketUpgrade,
    Path(thread_id): Path<Uuid>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| serve_scope(socket, Scope::Thread(thread_id), state))
}

async fn serve_scope(socket: WebSocket, scope: Scope, state: Arc<AppState>) {
    let (mut sink, mut stream) = socket.split();
    let (sub, mut rx) = Subscriber::channel(state.config.ws_buffer);
    let conn_id = sub.id();

    state.registry.connect(scope, sub);
    state.metrics.ws_opened();
    tracing::info!(
        scope = %scope,
        conn_id = %conn_id,
        channels = state.registry.channel_count(scope),
        "realtime client connected"
    );

    // Ends when the registry drops our sender (pruned) or the socket write fails.
    let mut writer = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if sink.send(Message::Text(frame.to_string())).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    loop {
        tokio::select! {
            msg = stream.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    if !is_heartbeat(&text) {
                        tracing::debug!(conn_id = %conn_id, "ignoring client frame");
                    }
                }
                Some(Ok(Message::Binary(_) | Message::Ping(_) | Message::Pong(_))) => {}
                Some(Ok(Message::Close(_))) | None => break,
                Some(Err(e)) => {
                    tracing::debug!(conn_id = %conn_id, error = %e, "websocket read error");
                    break;
                }
            },
            _ = &mut writer => break,
        }
    }

    state.registry.disconnect(scope, conn_id);
    writer.abort();
    state.metrics.ws_closed();
    tracing::info!(scope = %scope, conn_id = %conn_id, "realtime client disconnected");
}

/// `"ping"` or `{"type": "ping"}`.
fn is_heartbeat(text: &str) -> bool {
    let text = text.trim();
    if text.eq_ignore_ascii_case("ping") {
        return true;
    }
    serde_json::from_str::<serde_json::Value>(text)
        .ok()
        .and_then(|v| v.get("type").and_then(|t| t.as_str()).map(|t| t == "ping"))
        .unwrap_or(false)
}

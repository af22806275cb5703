//! # routes::activity
//!
//! Activity feed — REST history plus a live WebSocket stream
//!
//! | Method    | Path                          | Description                       |
//! |-----------|-------------------------------|-----------------------------------|
//! | GET       | `/api/users/:user/activity`   | Activity ของ user (ใหม่สุดก่อน)    |
//! | GET (WS)  | `/ws/activity`                | Real-time event stream            |
//! | GET       | `/api/stats`                  | buy_count, sell_count, positions  |

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    response::IntoResponse,
    Json,
};
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use std::sync::atomic::Ordering;
use tracing::{debug, info};

use crate::{service, state::SharedState};

/// GET /api/users/:user/activity
pub async fn get_activity(
    State(state): State<SharedState>,
    Path(user): Path<String>,
) -> impl IntoResponse {
    let records = service::activity(&state, &user).await;
    Json(json!({
        "ok":      true,
        "count":   records.len(),
        "records": records,
    }))
}

/// GET /api/stats
pub async fn get_stats(State(state): State<SharedState>) -> impl IntoResponse {
    let positions = state.ledger.read().await.len();
    let vaults    = state.registry.read().await.list().len();
    let records   = state.activity.read().await.len();

    Json(json!({
        "ok":         true,
        "buy_count":  state.buy_count.load(Ordering::Relaxed),
        "sell_count": state.sell_count.load(Ordering::Relaxed),
        "positions":  positions,
        "vaults":     vaults,
        "activity":   records,
        "starting_balance": state.config.starting_balance,
    }))
}

// ─── WebSocket Handler ────────────────────────────────────────────────────────

/// Upgrade HTTP → WebSocket แล้ว subscribe broadcast channel
pub async fn ws_activity(
    ws: WebSocketUpgrade,
    State(state): State<SharedState>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: SharedState) {
    let mut rx = state.broadcast_tx.subscribe();
    let (mut sender, mut receiver) = socket.split();

    info!("🔌 WebSocket client connected");

    loop {
        tokio::select! {
            result = rx.recv() => {
                match result {
                    Ok(json_str) => {
                        if sender.send(Message::Text(json_str)).await.is_err() {
                            break; // Client disconnect
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                        debug!("WS client lagged, skipped {n} events");
                    }
                    Err(_) => break, // Channel closed
                }
            }

            result = receiver.next() => {
                match result {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(Message::Ping(data))) => {
                        let _ = sender.send(Message::Pong(data)).await;
                    }
                    _ => {}
                }
            }
        }
    }

    info!("🔌 WebSocket client disconnected");
}

//! WebSocket upgrade for the drawing-event stream.
//!
//! Each accepted socket becomes a connection actor (`services::client`)
//! registered with the hub. Frames are opaque binary payloads here; only the
//! collector looks inside them.

use axum::Json;
use axum::extract::State;
use axum::extract::ws::WebSocketUpgrade;
use axum::http::StatusCode;
use axum::response::Response;
use tracing::warn;

use crate::services::client;
use crate::services::hub::HubStats;
use crate::state::AppState;

pub async fn handle_ws(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    let AppState { hub, connection } = state;
    ws.max_message_size(connection.max_message_bytes)
        .max_frame_size(connection.max_message_bytes)
        .on_upgrade(move |socket| client::serve(socket, hub, connection))
}

/// Current hub counters. 503 once the hub has shut down.
pub async fn stats(State(state): State<AppState>) -> Result<Json<HubStats>, StatusCode> {
    state.hub.stats().await.map(Json).map_err(|e| {
        warn!(error = %e, "stats requested after hub stopped");
        StatusCode::SERVICE_UNAVAILABLE
    })
}

#[cfg(test)]
#[path = "ws_test.rs"]
mod tests;

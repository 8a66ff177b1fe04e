use axum::{
    extract::{ws::WebSocketUpgrade, Query, State},
    response::Response,
};
use serde::Deserialize;

use crate::state::AppState;
use crate::ws::actor;

/// Query parameters for WebSocket connection.
/// A client may supply a stable id (`?client=...`) so that its pending
/// mailbox is matched up on reconnect; otherwise one is allocated.
#[derive(Debug, Deserialize)]
pub struct WsConnectQuery {
    pub client: Option<String>,
}

/// GET /ws?client=<id>
/// WebSocket upgrade endpoint. Spawns an actor for the connection.
pub async fn ws_upgrade(
    State(state): State<AppState>,
    Query(params): Query<WsConnectQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    let connection_id = params
        .client
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| uuid::Uuid::now_v7().to_string());

    tracing::info!(connection_id = %connection_id, "WebSocket connection accepted");
    ws.on_upgrade(move |socket| actor::run_connection(socket, state, connection_id))
}

//! Client websocket endpoint. Each accepted connection owns exactly one
//! relay session; when either side goes away the session is torn down and a
//! reconnecting client starts a fresh one.

pub mod relay;
pub mod upstream;

use crate::state::AppState;
use axum::extract::State;
use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::response::Response;
use std::sync::Arc;
use tracing::{error, info, instrument};
use uuid::Uuid;

/// Axum handler to upgrade an HTTP connection to a WebSocket.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

#[instrument(name = "relay_session", skip_all, fields(session_id))]
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let session_id = Uuid::new_v4();
    tracing::Span::current().record("session_id", session_id.to_string());
    info!("client connected");

    if let Err(e) = relay::run(state, socket).await {
        error!(error = ?e, "relay session terminated with error");
    }
    info!("relay session finished");
}

//! Axum WebSocket upgrade handler and per-peer receive cycle.

use std::sync::Arc;

use axum::extract::State;
use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::response::{IntoResponse, Response};

use super::connection::Connection;
use super::messages::ClientFrame;
use super::transport;
use crate::app_state::AppState;
use crate::bus::Bus;
use crate::error::GatewayError;
use crate::session::SessionVerifier;

/// `GET /ws` — Upgrade HTTP connection to WebSocket.
///
/// Answers 503 instead of upgrading while the bus is not running.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    if !state.bus.is_running() {
        return GatewayError::BusNotRunning.into_response();
    }
    ws.on_upgrade(move |socket| serve_socket(socket, state))
}

async fn serve_socket(socket: WebSocket, state: AppState) {
    let (sink, stream) = transport::split(socket);
    let connection = match state.bus.join(Box::new(sink), Box::new(stream)).await {
        Ok(connection) => connection,
        Err(e) => {
            tracing::warn!(error = %e, "websocket join refused");
            return;
        }
    };
    drive_connection(&state.bus, state.verifier.as_ref(), connection).await;
}

/// Reads client frames until the peer goes away or the server closes the
/// connection, handling `auth` frames, then notifies the bus.
pub async fn drive_connection(
    bus: &Bus,
    verifier: &dyn SessionVerifier,
    connection: Arc<Connection>,
) {
    loop {
        let received = tokio::select! {
            biased;
            () = connection.disconnected() => break,
            received = connection.receive() => received,
        };
        let Ok(frame) = received else {
            break;
        };
        match frame {
            Some(ClientFrame::Auth(request)) => {
                connection
                    .authorize(verifier, request.token.as_deref(), request.subscribe)
                    .await;
            }
            Some(ClientFrame::Unhandled { topic }) => {
                tracing::debug!(conn_id = %connection.id(), topic, "ignoring client frame");
            }
            None => {}
        }
    }

    match connection.principal().await {
        Some(principal) => {
            tracing::debug!(conn_id = %connection.id(), user = principal.display_name(), "client disconnected");
        }
        None => tracing::debug!(conn_id = %connection.id(), "anonymous client disconnected"),
    }
    bus.leave(connection.id()).await;
}

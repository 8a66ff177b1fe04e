//! JSON wire protocol: decode incoming frames, dispatch to the relay,
//! answer with acks.
//!
//! Frames are JSON text tagged by a `type` field. Presentation payloads are
//! opaque to the server and forwarded verbatim.

use axum::extract::ws::Message;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::relay::dispatch;
use crate::relay::registry::Role;
use crate::state::AppState;

/// Client → server frames.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMessage {
    /// Claim the display role for this connection.
    RegisterPresentation,
    /// Claim the control role for this connection.
    RegisterControl,
    /// Current song/segment selection; `payload` is opaque and may carry
    /// explicit nulls to clear the displayed content.
    PresentationUpdate {
        #[serde(default)]
        payload: Value,
    },
}

/// Server → client frames.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerMessage {
    /// Reply to a client request. `{success:true}` or `{success:false, error}`.
    Ack {
        success: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    /// Fan-out of a control client's selection to a display. Fire-and-forget.
    PresentationUpdate { payload: Value },
    /// A display registered; sent to every control connection.
    PresentationConnected { id: String },
    /// A display departed (close or eviction); sent to every control connection.
    PresentationDisconnected { id: String },
}

impl ServerMessage {
    pub fn ack_ok() -> Self {
        Self::Ack {
            success: true,
            error: None,
        }
    }

    pub fn ack_err(message: impl Into<String>) -> Self {
        Self::Ack {
            success: false,
            error: Some(message.into()),
        }
    }
}

/// Handle an incoming text frame from a connection.
///
/// Every error is contained here: malformed frames and rejected operations
/// are answered with an error ack and the connection stays open (and, for
/// registration failures, unassigned).
pub fn handle_text_message(
    text: &str,
    tx: &mpsc::UnboundedSender<Message>,
    state: &AppState,
    connection_id: &str,
) {
    let msg = match serde_json::from_str::<ClientMessage>(text) {
        Ok(msg) => msg,
        Err(e) => {
            tracing::warn!(
                connection_id = %connection_id,
                error = %e,
                "Failed to decode client frame"
            );
            send(tx, &ServerMessage::ack_err("Unrecognized message"));
            return;
        }
    };

    match msg {
        ClientMessage::RegisterPresentation => {
            reply(tx, dispatch::register(&state.relay, connection_id, Role::Display));
        }
        ClientMessage::RegisterControl => {
            reply(tx, dispatch::register(&state.relay, connection_id, Role::Control));
        }
        ClientMessage::PresentationUpdate { payload } => {
            if state.relay.registry.role_of(connection_id) != Some(Role::Control) {
                tracing::warn!(
                    connection_id = %connection_id,
                    "presentationUpdate from a connection not registered as control"
                );
                send(tx, &ServerMessage::ack_err("Not registered as control"));
                return;
            }
            // Ack covers the dispatch attempt only; per-display failures
            // fall back to mailboxes and never fail the call.
            dispatch::broadcast_from_control(&state.relay, payload);
            send(tx, &ServerMessage::ack_ok());
        }
    }
}

fn reply(tx: &mpsc::UnboundedSender<Message>, result: Result<(), String>) {
    match result {
        Ok(()) => send(tx, &ServerMessage::ack_ok()),
        Err(e) => send(tx, &ServerMessage::ack_err(e)),
    }
}

/// Serialize and send a frame to this connection's writer task.
fn send(tx: &mpsc::UnboundedSender<Message>, msg: &ServerMessage) {
    if let Ok(json) = serde_json::to_string(msg) {
        let _ = tx.send(Message::Text(json.into()));
    }
}

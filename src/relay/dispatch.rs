//! Message routing core and session bootstrap operations.
//!
//! Fan-out from the control connection to displays is synchronous and
//! fire-and-forget: an unreachable display gets its update queued in the
//! pending delivery store instead, and never fails the broadcast.

use axum::extract::ws::Message;
use serde_json::Value;

use crate::relay::registry::Role;
use crate::relay::RelayState;
use crate::ws::protocol::ServerMessage;
use crate::ws::ConnectionSender;

/// Record a freshly opened transport as an unassigned connection.
pub fn open_connection(relay: &RelayState, id: &str, sender: ConnectionSender) {
    relay.registry.connect(id, sender);
    tracing::debug!(connection_id = %id, "Connection opened");
}

/// Assign a role to a connection: registry update, mailbox flush, and — for
/// displays — arrival notification to every control connection.
///
/// Re-registration (same or different role) overwrites; subsequent fan-out
/// reflects only the latest role.
pub fn register(relay: &RelayState, id: &str, role: Role) -> Result<(), String> {
    // The drain-and-flush runs under the registry entry's guard: a broadcast
    // racing this registration cannot see the new role or sender until the
    // queued backlog, in arrival order, is already on the channel.
    let mut flushed = 0;
    let found = relay.registry.register_with(id, role, |sender| {
        let queued = relay.mailboxes.drain(id);
        flushed = queued.len();
        for message in &queued {
            let _ = send_message(sender, message);
        }
    });
    if !found {
        return Err("Unknown connection id".to_string());
    }

    if flushed > 0 {
        tracing::info!(
            connection_id = %id,
            flushed = flushed,
            "Flushed pending mailbox on registration"
        );
    }

    tracing::info!(connection_id = %id, role = ?role, "Connection registered");

    if role == Role::Display {
        notify_controls(
            relay,
            &ServerMessage::PresentationConnected { id: id.to_string() },
        );
    }

    Ok(())
}

/// Fan a control client's state update out to every display connection.
///
/// Each target is independent: live transports get the update immediately,
/// unreachable ones get it queued. The caller is acked once the attempt has
/// covered all known displays, never per-display delivery.
pub fn broadcast_from_control(relay: &RelayState, payload: Value) {
    let message = ServerMessage::PresentationUpdate { payload };
    for (id, sender) in relay.registry.by_role(Role::Display) {
        if send_message(&sender, &message).is_err() {
            tracing::debug!(
                connection_id = %id,
                "Display unreachable, queueing presentation update"
            );
            relay.mailboxes.enqueue(&id, message.clone());
        }
    }
}

/// Departure bookkeeping for a closing transport.
///
/// No-op when a newer transport has already taken over the id (the old
/// actor's cleanup must not tear down the reconnected session).
pub fn close_connection(relay: &RelayState, id: &str, sender: &ConnectionSender) {
    let Some(info) = relay.registry.remove_if_same(id, sender) else {
        tracing::debug!(connection_id = %id, "Close from superseded transport, ignoring");
        return;
    };

    relay.mailboxes.evict(id);

    if info.role == Role::Display {
        notify_controls(
            relay,
            &ServerMessage::PresentationDisconnected { id: id.to_string() },
        );
    }

    tracing::info!(connection_id = %id, role = ?info.role, "Connection closed");
}

/// Fire-and-forget a message to every control connection.
pub(crate) fn notify_controls(relay: &RelayState, message: &ServerMessage) {
    for (_, sender) in relay.registry.by_role(Role::Control) {
        let _ = send_message(&sender, message);
    }
}

/// Serialize and push a message onto a connection's outbound channel.
/// Fails when the transport is gone (writer task dropped its receiver).
pub(crate) fn send_message(sender: &ConnectionSender, message: &ServerMessage) -> Result<(), ()> {
    let json = serde_json::to_string(message).map_err(|_| ())?;
    sender.send(Message::Text(json.into())).map_err(|_| ())
}

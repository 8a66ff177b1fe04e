//! Liveness monitor: one periodic sweep with two independent thresholds.
//!
//! The heartbeat threshold evicts connections that have gone silent; the
//! staleness threshold reclaims pending mailboxes whose target never came
//! back. Both passes are idempotent, so re-running over already-evicted
//! state is safe.

use axum::extract::ws::{CloseFrame, Message};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;

use crate::relay::dispatch;
use crate::relay::registry::Role;
use crate::relay::RelayState;
use crate::ws::protocol::ServerMessage;

/// WebSocket close code sent on forced eviction (going away).
const CLOSE_EVICTED: u16 = 1001;

#[derive(Debug, Default, PartialEq, Eq)]
pub struct SweepStats {
    pub evicted_connections: usize,
    pub reclaimed_mailboxes: usize,
}

/// Periodic sweep task, owned by `RelayState::start`.
pub(crate) async fn run(relay: Arc<RelayState>) {
    let mut ticker = interval(Duration::from_secs(relay.config.sweep_interval_secs));
    // Skip the first immediate tick
    ticker.tick().await;

    loop {
        ticker.tick().await;
        let stats = sweep_once(&relay, Utc::now());
        if stats.evicted_connections > 0 || stats.reclaimed_mailboxes > 0 {
            tracing::info!(
                evicted = stats.evicted_connections,
                reclaimed = stats.reclaimed_mailboxes,
                "Liveness sweep"
            );
        }
    }
}

/// One sweep pass against `now`. Split out from the timer loop so tests can
/// drive it directly.
pub fn sweep_once(relay: &RelayState, now: DateTime<Utc>) -> SweepStats {
    let mut stats = SweepStats::default();

    // Pass 1: force-close connections silent past the heartbeat timeout.
    let heartbeat_cutoff =
        now - ChronoDuration::seconds(relay.config.heartbeat_timeout_secs as i64);
    for id in relay.registry.silent_before(heartbeat_cutoff) {
        let Some(info) = relay.registry.remove(&id) else {
            continue;
        };

        let close = Message::Close(Some(CloseFrame {
            code: CLOSE_EVICTED,
            reason: "Heartbeat timeout".into(),
        }));
        // The transport may already be gone; eviction proceeds either way.
        let _ = info.sender.send(close);

        relay.mailboxes.evict(&id);

        if info.role == Role::Display {
            dispatch::notify_controls(
                relay,
                &ServerMessage::PresentationDisconnected { id: id.clone() },
            );
        }

        tracing::info!(
            connection_id = %id,
            role = ?info.role,
            "Evicted silent connection"
        );
        stats.evicted_connections += 1;
    }

    // Pass 2: reclaim mailboxes whose target never returned. Runs against
    // ids the first pass may already have evicted, and against ids with no
    // registry entry at all.
    let stale_cutoff = now - ChronoDuration::seconds(relay.config.mailbox_stale_secs as i64);
    stats.reclaimed_mailboxes = relay.mailboxes.sweep_stale(stale_cutoff);

    stats
}

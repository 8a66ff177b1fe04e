//! Pending delivery store: per-target ordered mailboxes for messages that
//! could not be delivered because the target was momentarily unreachable.
//!
//! Mailboxes are created lazily on the first failed delivery, drained
//! exactly once when the target re-registers, and discarded on eviction.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::ws::protocol::ServerMessage;

/// Retention for updates queued while a target is unreachable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetentionPolicy {
    /// Keep every intermediate update (source behavior; segment-by-segment
    /// history replays in full on reconnect).
    Unbounded,
    /// Keep only the most recent `capacity` updates per target. A freshly
    /// rejoining display usually only needs the latest state.
    Ring(usize),
}

impl RetentionPolicy {
    /// Parse the config string form; anything unrecognized falls back to
    /// unbounded, the source behavior.
    pub fn from_config(policy: &str, capacity: usize) -> Self {
        match policy {
            "ring" => Self::Ring(capacity.max(1)),
            "unbounded" => Self::Unbounded,
            other => {
                tracing::warn!(
                    policy = %other,
                    "Unknown mailbox_policy, falling back to unbounded"
                );
                Self::Unbounded
            }
        }
    }
}

#[derive(Debug)]
struct Mailbox {
    entries: VecDeque<ServerMessage>,
    last_enqueued: DateTime<Utc>,
}

impl Mailbox {
    fn new() -> Self {
        Self {
            entries: VecDeque::new(),
            last_enqueued: Utc::now(),
        }
    }
}

#[derive(Debug)]
pub struct MailboxStore {
    boxes: DashMap<String, Mailbox>,
    policy: RetentionPolicy,
}

impl MailboxStore {
    pub fn new(policy: RetentionPolicy) -> Self {
        Self {
            boxes: DashMap::new(),
            policy,
        }
    }

    /// Append a message to the target's mailbox, creating it if absent.
    pub fn enqueue(&self, target: &str, message: ServerMessage) {
        let mut mailbox = self
            .boxes
            .entry(target.to_string())
            .or_insert_with(Mailbox::new);
        if let RetentionPolicy::Ring(capacity) = self.policy {
            while mailbox.entries.len() >= capacity {
                mailbox.entries.pop_front();
            }
        }
        mailbox.entries.push_back(message);
        mailbox.last_enqueued = Utc::now();
    }

    /// Atomically take the target's whole mailbox in arrival order.
    ///
    /// An enqueue racing this call lands either wholly before (and is
    /// returned here) or wholly after (in a fresh mailbox); no entry is
    /// lost or duplicated.
    pub fn drain(&self, target: &str) -> Vec<ServerMessage> {
        match self.boxes.remove(target) {
            Some((_, mailbox)) => mailbox.entries.into(),
            None => Vec::new(),
        }
    }

    /// Discard the target's mailbox without delivery.
    pub fn evict(&self, target: &str) {
        self.boxes.remove(target);
    }

    /// Reclaim mailboxes with no enqueue since `cutoff`. Safe to run for
    /// targets whose connection no longer exists; returns how many were
    /// reclaimed.
    pub fn sweep_stale(&self, cutoff: DateTime<Utc>) -> usize {
        let before = self.boxes.len();
        self.boxes.retain(|_, mailbox| mailbox.last_enqueued >= cutoff);
        before - self.boxes.len()
    }

    /// Number of entries currently queued for a target.
    pub fn pending(&self, target: &str) -> usize {
        self.boxes
            .get(target)
            .map(|mailbox| mailbox.entries.len())
            .unwrap_or(0)
    }
}

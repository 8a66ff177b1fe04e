//! The relay core: one process-wide state object with an explicit
//! lifecycle, injected into handlers rather than captured as globals, so
//! tests can run any number of isolated instances.

pub mod dispatch;
pub mod mailbox;
pub mod registry;
pub mod sweep;

use std::sync::{Arc, Mutex};

use tokio::task::JoinHandle;

use crate::config::RelayConfig;
use mailbox::{MailboxStore, RetentionPolicy};
use registry::Registry;

/// Registry, pending-delivery store, and the liveness sweep that polices
/// both. All mutation goes through the operations in [`dispatch`].
pub struct RelayState {
    pub registry: Registry,
    pub mailboxes: MailboxStore,
    pub config: RelayConfig,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl RelayState {
    pub fn new(config: RelayConfig) -> Arc<Self> {
        let policy = RetentionPolicy::from_config(&config.mailbox_policy, config.mailbox_capacity);
        Arc::new(Self {
            registry: Registry::new(),
            mailboxes: MailboxStore::new(policy),
            config,
            sweeper: Mutex::new(None),
        })
    }

    /// Spawn the liveness sweep. Idempotent; a second call is a no-op while
    /// the sweep is running.
    pub fn start(self: &Arc<Self>) {
        let mut sweeper = self.sweeper.lock().expect("sweeper lock");
        if sweeper.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return;
        }
        tracing::info!(
            sweep_interval_secs = self.config.sweep_interval_secs,
            heartbeat_timeout_secs = self.config.heartbeat_timeout_secs,
            mailbox_stale_secs = self.config.mailbox_stale_secs,
            "Relay started"
        );
        *sweeper = Some(tokio::spawn(sweep::run(self.clone())));
    }

    /// Stop the liveness sweep. Connections and mailboxes are left in place;
    /// the process is expected to exit shortly after.
    pub fn stop(&self) {
        if let Some(handle) = self.sweeper.lock().expect("sweeper lock").take() {
            handle.abort();
            tracing::info!("Relay stopped");
        }
    }
}

impl Drop for RelayState {
    fn drop(&mut self) {
        self.stop();
    }
}

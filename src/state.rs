use std::sync::Arc;

use crate::relay::RelayState;

/// Shared application state passed to all handlers via axum State extractor.
#[derive(Clone)]
pub struct AppState {
    /// Process-wide relay state: registry, mailboxes, liveness sweep
    pub relay: Arc<RelayState>,
}

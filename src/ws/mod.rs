pub mod actor;
pub mod handler;
pub mod protocol;

use tokio::sync::mpsc;

/// Type alias for the sender half of a WebSocket connection's channel.
/// The relay clones this to push messages to a specific client; nothing
/// reaches a transport except through the registry's stored sender.
pub type ConnectionSender = mpsc::UnboundedSender<axum::extract::ws::Message>;

//! PeerLink transport: synchronizes two automation endpoints over TCP.
//! Each side listens for the other's events and sends its own on a lazily opened connection.

pub mod addr;
pub mod config;
pub mod connection;
pub mod error;
pub mod inbox;
pub mod link;
mod listener;

pub use config::LinkConfig;
pub use connection::{ConnectionManager, RetryPolicy};
pub use error::{ConnectError, SendError, StartError};
pub use inbox::Inbox;
pub use link::PeerLink;
pub use peerlink_core::{Data, Event, Message};

use tokio::sync::watch;

/// Resolves once the link's shutdown flag is set or its sender is gone.
pub(crate) async fn shutdown_signalled(rx: &mut watch::Receiver<bool>) {
    let _ = rx.wait_for(|stop| *stop).await;
}

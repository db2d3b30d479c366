//! Link error types. Socket errors are converted into these at the task boundary.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use peerlink_core::EncodeError;

/// Failure to start a link.
#[derive(Debug, thiserror::Error)]
pub enum StartError {
    /// Listener cannot claim its port.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
    #[error("link already started")]
    AlreadyStarted,
    #[error("link was stopped; create a new one")]
    Stopped,
}

/// Peer unreachable.
#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    #[error("no peer configured (receive-only link)")]
    NoPeer,
    #[error("could not connect to {peer} after {attempts} attempts: {last}")]
    Exhausted {
        peer: String,
        attempts: u32,
        #[source]
        last: io::Error,
    },
}

/// Message not delivered to the peer socket.
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("link is not running")]
    NotRunning,
    #[error(transparent)]
    Connect(#[from] ConnectError),
    #[error(transparent)]
    Encode(#[from] EncodeError),
    /// Write failed again after one reconnect.
    #[error("write failed after reconnect: {0}")]
    Write(#[source] io::Error),
    #[error("send did not complete within {0:?}")]
    TimedOut(Duration),
    #[error("outbound writer is gone")]
    Closed,
}

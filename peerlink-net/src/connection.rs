//! Outbound side: one lazily connected client socket with bounded retry,
//! owned by a single writer task that serves send requests in order.

use std::future::Future;
use std::io;
use std::time::Duration;

use peerlink_core::{encode_frame, Message};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};

use crate::config::LinkConfig;
use crate::error::{ConnectError, SendError};
use crate::shutdown_signalled;

/// Connection attempts, per-attempt timeout and fixed pause between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub connect_timeout: Duration,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 5,
            connect_timeout: Duration::from_secs(10),
            delay: Duration::from_secs(1),
        }
    }
}

impl From<&LinkConfig> for RetryPolicy {
    fn from(c: &LinkConfig) -> Self {
        Self {
            attempts: c.connect_attempts,
            connect_timeout: c.connect_timeout(),
            delay: c.retry_delay(),
        }
    }
}

/// Owns the client socket to the peer.
pub struct ConnectionManager {
    host: String,
    port: u16,
    policy: RetryPolicy,
    stream: Option<TcpStream>,
}

impl ConnectionManager {
    pub fn new(host: impl Into<String>, port: u16, policy: RetryPolicy) -> Self {
        Self {
            host: host.into(),
            port,
            policy,
            stream: None,
        }
    }

    pub fn peer(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Reuse the cached socket, or connect with retry.
    pub async fn ensure_connected(&mut self) -> Result<(), ConnectError> {
        if let Some(stream) = &self.stream {
            if !peer_closed(stream) {
                return Ok(());
            }
            debug!(peer = %self.peer(), "peer closed cached connection");
            self.stream = None;
        }
        self.stream = Some(self.connect().await?);
        Ok(())
    }

    /// Write one frame. On write failure, reconnect and resend exactly once.
    pub async fn send(&mut self, msg: &Message) -> Result<(), SendError> {
        let frame = encode_frame(msg)?;
        self.ensure_connected().await?;
        // Taken out so a cancelled or failed write never leaves a half-written socket cached.
        if let Some(mut stream) = self.stream.take() {
            match write_frame(&mut stream, &frame).await {
                Ok(()) => {
                    self.stream = Some(stream);
                    debug!(peer = %self.peer(), event = %msg.event, "sent");
                    return Ok(());
                }
                Err(e) => {
                    warn!(peer = %self.peer(), error = %e, "write failed, reconnecting");
                }
            }
        }
        let mut stream = self.connect().await?;
        write_frame(&mut stream, &frame)
            .await
            .map_err(SendError::Write)?;
        self.stream = Some(stream);
        info!(peer = %self.peer(), event = %msg.event, "sent after reconnect");
        Ok(())
    }

    /// Drop the client socket, if any.
    pub fn close(&mut self) {
        if self.stream.take().is_some() {
            debug!(peer = %self.peer(), "closed outbound connection");
        }
    }

    async fn connect(&self) -> Result<TcpStream, ConnectError> {
        let peer = self.peer();
        let stream = connect_with_retry(&self.policy, &peer, || {
            TcpStream::connect((self.host.as_str(), self.port))
        })
        .await?;
        let _ = stream.set_nodelay(true);
        Ok(stream)
    }
}

/// Run `dial` up to `policy.attempts` times, each bounded by `policy.connect_timeout`,
/// pausing `policy.delay` between attempts but not after the last.
async fn connect_with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    peer: &str,
    mut dial: F,
) -> Result<T, ConnectError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = io::Result<T>>,
{
    let attempts = policy.attempts.max(1);
    let mut last = io::Error::new(io::ErrorKind::Other, "no connection attempt made");
    for attempt in 1..=attempts {
        debug!(%peer, attempt, attempts, "connecting");
        last = match tokio::time::timeout(policy.connect_timeout, dial()).await {
            Ok(Ok(conn)) => {
                info!(%peer, attempt, "connected");
                return Ok(conn);
            }
            Ok(Err(e)) => e,
            Err(_) => io::Error::new(io::ErrorKind::TimedOut, "connect timed out"),
        };
        warn!(%peer, attempt, attempts, error = %last, "connect failed");
        if attempt < attempts {
            tokio::time::sleep(policy.delay).await;
        }
    }
    Err(ConnectError::Exhausted {
        peer: peer.to_string(),
        attempts,
        last,
    })
}

async fn write_frame(stream: &mut TcpStream, frame: &[u8]) -> io::Result<()> {
    stream.write_all(frame).await?;
    stream.flush().await
}

/// The peer never writes on our outbound connection, so readable means EOF or reset.
fn peer_closed(stream: &TcpStream) -> bool {
    let mut buf = [0u8; 1];
    match stream.try_read(&mut buf) {
        Ok(0) => true,
        Ok(_) => false,
        Err(e) => e.kind() != io::ErrorKind::WouldBlock,
    }
}

/// One send handed to the writer task.
pub(crate) struct OutboundRequest {
    pub message: Message,
    pub timeout: Duration,
    pub reply: oneshot::Sender<Result<(), SendError>>,
}

/// Writer task: sole owner of the client socket. Requests are served one at a time,
/// so frames from concurrent callers never interleave.
pub(crate) async fn run_outbound(
    mut conn: ConnectionManager,
    mut requests: mpsc::Receiver<OutboundRequest>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let req = tokio::select! {
            req = requests.recv() => match req {
                Some(req) => req,
                None => break,
            },
            _ = shutdown_signalled(&mut shutdown) => break,
        };
        let result = tokio::select! {
            r = tokio::time::timeout(req.timeout, conn.send(&req.message)) => {
                r.unwrap_or(Err(SendError::TimedOut(req.timeout)))
            }
            _ = shutdown_signalled(&mut shutdown) => Err(SendError::NotRunning),
        };
        let _ = req.reply.send(result);
    }
    conn.close();
    // Fail anything still queued instead of leaving callers waiting on a dropped reply.
    requests.close();
    while let Ok(req) = requests.try_recv() {
        let _ = req.reply.send(Err(SendError::NotRunning));
    }
}

//! Inbound side: accept loop plus one handler per connection feeding the inbox.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use peerlink_core::wire::{decode_frame, FrameDecodeError};
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{watch, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::error::StartError;
use crate::inbox::Inbox;
use crate::shutdown_signalled;

const READ_CHUNK: usize = 4096;
/// Pause after a failed accept (e.g. out of file descriptors) so the loop does not spin.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Bind `port` on all interfaces.
pub(crate) async fn bind(port: u16) -> Result<TcpListener, StartError> {
    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
    TcpListener::bind(addr)
        .await
        .map_err(|source| StartError::Bind { addr, source })
}

/// Accept until shutdown. At most `max_inbound` connections are served at once;
/// extra connections are closed right after accept.
/// Returns once the listener socket and every handler are closed.
pub(crate) async fn run_listener(
    listener: TcpListener,
    inbox: Arc<Inbox>,
    max_inbound: usize,
    mut shutdown: watch::Receiver<bool>,
) {
    let slots = Arc::new(Semaphore::new(max_inbound.max(1)));
    let mut handlers = JoinSet::new();
    loop {
        let accepted = tokio::select! {
            r = listener.accept() => r,
            Some(_) = handlers.join_next(), if !handlers.is_empty() => continue,
            _ = shutdown_signalled(&mut shutdown) => break,
        };
        match accepted {
            Ok((stream, addr)) => {
                let Ok(permit) = slots.clone().try_acquire_owned() else {
                    warn!(%addr, "inbound connection limit reached, closing");
                    drop(stream);
                    continue;
                };
                info!(%addr, "peer connected");
                handlers.spawn(handle_connection(
                    stream,
                    addr,
                    inbox.clone(),
                    shutdown.clone(),
                    permit,
                ));
            }
            Err(e) => {
                warn!(error = %e, "accept failed");
                tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
            }
        }
    }
    drop(listener);
    while handlers.join_next().await.is_some() {}
    debug!("listener stopped");
}

/// Read frames until EOF, error or shutdown. A bad frame drops this connection only.
async fn handle_connection(
    mut stream: TcpStream,
    addr: SocketAddr,
    inbox: Arc<Inbox>,
    mut shutdown: watch::Receiver<bool>,
    _permit: OwnedSemaphorePermit,
) {
    let mut buf: Vec<u8> = Vec::with_capacity(READ_CHUNK);
    loop {
        buf.reserve(READ_CHUNK);
        let read = tokio::select! {
            r = stream.read_buf(&mut buf) => r,
            _ = shutdown_signalled(&mut shutdown) => break,
        };
        match read {
            Ok(0) => {
                if !buf.is_empty() {
                    debug!(%addr, pending = buf.len(), "discarding partial frame");
                }
                info!(%addr, "peer disconnected");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                warn!(%addr, error = %e, "read failed");
                break;
            }
        }
        // One read may carry several frames, or only part of one.
        loop {
            match decode_frame(&buf) {
                Ok((msg, used)) => {
                    buf.drain(..used);
                    debug!(%addr, event = %msg.event, "received");
                    inbox.append(msg);
                }
                Err(FrameDecodeError::NeedMore) => break,
                Err(e) => {
                    warn!(%addr, error = %e, "bad frame, dropping connection");
                    return;
                }
            }
        }
    }
}

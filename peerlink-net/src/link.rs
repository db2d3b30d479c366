//! PeerLink: one endpoint of a two-party session. Listens for the peer's messages and
//! sends its own over a lazily opened outbound connection.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use peerlink_core::{Data, Message};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::addr;
use crate::config::LinkConfig;
use crate::connection::{run_outbound, ConnectionManager, OutboundRequest, RetryPolicy};
use crate::error::{ConnectError, SendError, StartError};
use crate::inbox::Inbox;
use crate::listener;

const OUTBOUND_QUEUE: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Starting,
    Running,
    Stopped,
}

struct LinkState {
    phase: Phase,
    local_addr: Option<SocketAddr>,
    outbound: Option<mpsc::Sender<OutboundRequest>>,
    outbound_task: Option<JoinHandle<()>>,
    listener_task: Option<JoinHandle<()>>,
}

/// Owned by the caller; start once, stop once, then discard.
pub struct PeerLink {
    config: LinkConfig,
    inbox: Arc<Inbox>,
    running: AtomicBool,
    /// Stops the writer task; signalled before `shutdown`.
    writer_shutdown: watch::Sender<bool>,
    /// Stops the listener and its handlers.
    shutdown: watch::Sender<bool>,
    state: Mutex<LinkState>,
}

impl PeerLink {
    /// Create an idle link. Nothing is bound until [`PeerLink::start`].
    pub fn new(config: LinkConfig) -> Self {
        let (writer_shutdown, _) = watch::channel(false);
        let (shutdown, _) = watch::channel(false);
        Self {
            config,
            inbox: Arc::new(Inbox::new()),
            running: AtomicBool::new(false),
            writer_shutdown,
            shutdown,
            state: Mutex::new(LinkState {
                phase: Phase::Idle,
                local_addr: None,
                outbound: None,
                outbound_task: None,
                listener_task: None,
            }),
        }
    }

    /// Create and start a link in one step.
    pub async fn bind(config: LinkConfig) -> Result<Self, StartError> {
        let link = Self::new(config);
        link.start().await?;
        Ok(link)
    }

    /// Bind the listener and start background tasks. With a peer configured the outbound
    /// writer is started too, but the connection is only opened by the first send.
    pub async fn start(&self) -> Result<(), StartError> {
        {
            let mut st = self.lock_state();
            match st.phase {
                Phase::Idle => st.phase = Phase::Starting,
                Phase::Starting | Phase::Running => return Err(StartError::AlreadyStarted),
                Phase::Stopped => return Err(StartError::Stopped),
            }
        }
        let tcp = match listener::bind(self.config.local_port).await {
            Ok(l) => l,
            Err(e) => {
                self.lock_state().phase = Phase::Idle;
                return Err(e);
            }
        };
        let local_addr = tcp.local_addr().ok();

        let mut st = self.lock_state();
        if st.phase == Phase::Stopped {
            // stop() raced with start(); the listener is dropped here.
            return Err(StartError::Stopped);
        }
        st.listener_task = Some(tokio::spawn(listener::run_listener(
            tcp,
            self.inbox.clone(),
            self.config.max_inbound,
            self.shutdown.subscribe(),
        )));
        if let Some((host, port)) = self.config.peer_addr() {
            let conn = ConnectionManager::new(host, port, RetryPolicy::from(&self.config));
            let (tx, rx) = mpsc::channel(OUTBOUND_QUEUE);
            st.outbound = Some(tx);
            st.outbound_task = Some(tokio::spawn(run_outbound(
                conn,
                rx,
                self.writer_shutdown.subscribe(),
            )));
        }
        st.local_addr = local_addr;
        st.phase = Phase::Running;
        self.running.store(true, Ordering::SeqCst);
        info!(
            local = ?local_addr,
            peer = ?self.config.peer_addr(),
            "peer link started"
        );
        Ok(())
    }

    /// Send an event; `false` on any failure (details are logged).
    pub async fn send(&self, event: impl AsRef<str>, data: Data) -> bool {
        self.send_with_timeout(event, data, self.config.send_timeout())
            .await
    }

    pub async fn send_with_timeout(
        &self,
        event: impl AsRef<str>,
        data: Data,
        timeout: Duration,
    ) -> bool {
        let event = event.as_ref();
        match self.try_send_with_timeout(event, data, timeout).await {
            Ok(()) => true,
            Err(e) => {
                warn!(event, error = %e, "send failed");
                false
            }
        }
    }

    pub async fn try_send(&self, event: impl AsRef<str>, data: Data) -> Result<(), SendError> {
        self.try_send_with_timeout(event, data, self.config.send_timeout())
            .await
    }

    /// Send with a deadline covering connect, retries and the write.
    pub async fn try_send_with_timeout(
        &self,
        event: impl AsRef<str>,
        data: Data,
        timeout: Duration,
    ) -> Result<(), SendError> {
        let outbound = {
            let st = self.lock_state();
            if st.phase != Phase::Running {
                return Err(SendError::NotRunning);
            }
            st.outbound.clone().ok_or(ConnectError::NoPeer)?
        };
        let (reply, result) = oneshot::channel();
        let request = OutboundRequest {
            message: Message::new(event.as_ref(), data),
            timeout,
            reply,
        };
        outbound
            .send(request)
            .await
            .map_err(|_| SendError::NotRunning)?;
        result.await.map_err(|_| SendError::Closed)?
    }

    /// Wait for the first message with `event` (any event if `None`). `None` on timeout.
    pub async fn receive(&self, event: Option<&str>, timeout: Duration) -> Option<Message> {
        let msg = self.inbox.pop_matching(event, timeout).await;
        match &msg {
            Some(m) => debug!(event = %m.event, "delivered"),
            None => debug!(filter = ?event, ?timeout, "receive timed out"),
        }
        msg
    }

    /// Stop background work: client socket first, then listener and handlers.
    /// Idempotent; safe when never started.
    pub async fn stop(&self) {
        let was_running = self.running.swap(false, Ordering::SeqCst);
        let (outbound_task, listener_task) = {
            let mut st = self.lock_state();
            st.phase = Phase::Stopped;
            st.outbound = None;
            (st.outbound_task.take(), st.listener_task.take())
        };
        self.writer_shutdown.send_replace(true);
        if let Some(task) = outbound_task {
            let _ = task.await;
        }
        self.shutdown.send_replace(true);
        if let Some(task) = listener_task {
            let _ = task.await;
        }
        if was_running {
            info!("peer link stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Bound listener address; useful when the config asked for port 0.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.lock_state().local_addr
    }

    /// Address the peer should dial to reach this link. May block on DNS.
    pub fn advertised_addr(&self) -> Option<SocketAddr> {
        let port = self.local_addr()?.port();
        let ip = addr::local_ip(self.config.peer_host.as_deref());
        Some(SocketAddr::new(ip, port))
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    pub fn inbox(&self) -> &Inbox {
        &self.inbox
    }

    fn lock_state(&self) -> MutexGuard<'_, LinkState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for PeerLink {
    fn drop(&mut self) {
        // Tasks notice and close their sockets even if stop() was never awaited.
        self.writer_shutdown.send_replace(true);
        self.shutdown.send_replace(true);
    }
}

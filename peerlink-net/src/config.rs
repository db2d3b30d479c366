//! Load link config from file and environment.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

/// Default listen port, also the default port assumed for the peer.
pub const DEFAULT_PORT: u16 = 9998;

/// Link configuration. File: ~/.config/peerlink/config.toml or /etc/peerlink/config.toml.
/// Env overrides: PEERLINK_LOCAL_PORT, PEERLINK_PEER_HOST, PEERLINK_PEER_PORT.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LinkConfig {
    /// Listen port on all interfaces (default 9998; 0 picks an ephemeral port).
    #[serde(default = "default_port")]
    pub local_port: u16,
    /// Peer host. Absent means receive-only.
    #[serde(default)]
    pub peer_host: Option<String>,
    /// Peer port (default 9998).
    #[serde(default)]
    pub peer_port: Option<u16>,
    /// Outbound connection attempts before giving up (default 5).
    #[serde(default = "default_connect_attempts")]
    pub connect_attempts: u32,
    /// Timeout of a single connection attempt (default 10).
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Fixed pause between attempts (default 1000).
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Deadline for one send, connect and retries included (default 60).
    #[serde(default = "default_send_timeout_secs")]
    pub send_timeout_secs: u64,
    /// Concurrent inbound connections; extra ones are closed on accept (default 1).
    #[serde(default = "default_max_inbound")]
    pub max_inbound: usize,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_connect_attempts() -> u32 {
    5
}
fn default_connect_timeout_secs() -> u64 {
    10
}
fn default_retry_delay_ms() -> u64 {
    1000
}
fn default_send_timeout_secs() -> u64 {
    60
}
fn default_max_inbound() -> usize {
    1
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            local_port: default_port(),
            peer_host: None,
            peer_port: None,
            connect_attempts: default_connect_attempts(),
            connect_timeout_secs: default_connect_timeout_secs(),
            retry_delay_ms: default_retry_delay_ms(),
            send_timeout_secs: default_send_timeout_secs(),
            max_inbound: default_max_inbound(),
        }
    }
}

impl LinkConfig {
    /// Receive-only link on `local_port`.
    pub fn listen_only(local_port: u16) -> Self {
        Self {
            local_port,
            ..Self::default()
        }
    }

    pub fn with_peer(mut self, host: impl Into<String>, port: u16) -> Self {
        self.peer_host = Some(host.into());
        self.peer_port = Some(port);
        self
    }

    /// Peer (host, port), if this link can send.
    pub fn peer_addr(&self) -> Option<(&str, u16)> {
        let host = self.peer_host.as_deref().filter(|h| !h.is_empty())?;
        Some((host, self.peer_port.unwrap_or(DEFAULT_PORT)))
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_secs(self.send_timeout_secs)
    }
}

/// Load config: merge default, then config file (if present), then env vars.
pub fn load() -> LinkConfig {
    let mut c = load_file(&config_paths()).unwrap_or_default();
    apply_env(&mut c, |key| std::env::var(key).ok());
    c
}

/// Apply PEERLINK_* overrides. Unparsable values are ignored.
pub fn apply_env(c: &mut LinkConfig, var: impl Fn(&str) -> Option<String>) {
    if let Some(p) = var("PEERLINK_LOCAL_PORT").and_then(|s| s.parse::<u16>().ok()) {
        c.local_port = p;
    }
    if let Some(h) = var("PEERLINK_PEER_HOST") {
        c.peer_host = Some(h).filter(|h| !h.is_empty());
    }
    if let Some(p) = var("PEERLINK_PEER_PORT").and_then(|s| s.parse::<u16>().ok()) {
        c.peer_port = Some(p);
    }
}

fn config_paths() -> Vec<PathBuf> {
    let home = std::env::var_os("HOME").map(PathBuf::from);
    let mut out = Vec::new();
    if let Some(h) = home {
        out.push(h.join(".config/peerlink/config.toml"));
    }
    out.push(PathBuf::from("/etc/peerlink/config.toml"));
    out
}

/// First existing file wins, even if it fails to parse.
fn load_file(paths: &[PathBuf]) -> Option<LinkConfig> {
    let p = paths.iter().find(|p| p.exists())?;
    match read_file(p) {
        Ok(c) => Some(c),
        Err(e) => {
            warn!(path = %p.display(), error = %e, "ignoring config file");
            None
        }
    }
}

fn read_file(p: &Path) -> Result<LinkConfig, Box<dyn std::error::Error>> {
    let s = std::fs::read_to_string(p)?;
    Ok(toml::from_str::<LinkConfig>(&s)?)
}

//! Command-line argument parsing.

use clap::{Parser, Subcommand};
use peerlink_net::{Data, LinkConfig};

/// Exchange synchronization events with a peer machine.
#[derive(Parser, Debug)]
#[command(name = "peerlink")]
#[command(version)]
pub struct Cli {
    /// Local listen port (overrides config; `send` defaults to an ephemeral port).
    #[arg(long, global = true)]
    pub port: Option<u16>,

    /// Log level (trace, debug, info, warn, error). RUST_LOG takes precedence.
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Listen and print every received message until interrupted.
    Listen,
    /// Send one event to the peer and exit.
    Send {
        /// Peer as HOST or HOST:PORT.
        #[arg(long, value_parser = parse_peer)]
        peer: Option<(String, Option<u16>)>,
        #[arg(long, default_value = "ready")]
        event: String,
        /// Event data as a JSON object.
        #[arg(long, value_parser = parse_data, default_value = r#"{"message":"hello"}"#)]
        data: Data,
    },
    /// Listen until an event arrives; exit status 1 on timeout.
    Wait {
        /// Event to wait for; any event if omitted.
        #[arg(long)]
        event: Option<String>,
        /// Seconds to wait.
        #[arg(long, default_value_t = 30.0)]
        timeout: f64,
    },
}

impl Cli {
    /// Overlay command-line choices onto the loaded config.
    pub fn apply(&self, cfg: &mut LinkConfig) {
        if let Command::Send {
            peer: Some((host, port)),
            ..
        } = &self.command
        {
            cfg.peer_host = Some(host.clone());
            if port.is_some() {
                cfg.peer_port = *port;
            }
        }
        match (&self.command, self.port) {
            (_, Some(p)) => cfg.local_port = p,
            // A sender should not collide with a listener on this host.
            (Command::Send { .. }, None) => cfg.local_port = 0,
            _ => {}
        }
    }
}

/// HOST, HOST:PORT or [V6]:PORT.
fn parse_peer(s: &str) -> Result<(String, Option<u16>), String> {
    let port = |p: &str| p.parse::<u16>().map_err(|e| format!("bad port {p:?}: {e}"));
    if let Some(rest) = s.strip_prefix('[') {
        let (host, tail) = rest.split_once(']').ok_or("missing ']'")?;
        return match tail.strip_prefix(':') {
            Some(p) => Ok((host.to_string(), Some(port(p)?))),
            None if tail.is_empty() => Ok((host.to_string(), None)),
            None => Err(format!("unexpected {tail:?} after address")),
        };
    }
    match s.split_once(':') {
        Some((host, p)) if !p.contains(':') => Ok((host.to_string(), Some(port(p)?))),
        // Bare IPv6 address.
        Some(_) => Ok((s.to_string(), None)),
        None if s.is_empty() => Err("empty peer".to_string()),
        None => Ok((s.to_string(), None)),
    }
}

fn parse_data(s: &str) -> Result<Data, String> {
    serde_json::from_str::<Data>(s).map_err(|e| format!("data must be a JSON object: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_defaults() {
        let cli = Cli::parse_from(["peerlink", "send", "--peer", "192.168.1.100"]);
        let mut cfg = LinkConfig::default();
        cli.apply(&mut cfg);
        assert_eq!(cfg.peer_addr(), Some(("192.168.1.100", 9998)));
        assert_eq!(cfg.local_port, 0);
        match cli.command {
            Command::Send { event, data, .. } => {
                assert_eq!(event, "ready");
                assert_eq!(data["message"], "hello");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn send_with_port_and_data() {
        let cli = Cli::parse_from([
            "peerlink",
            "--port",
            "9999",
            "send",
            "--peer",
            "10.0.0.5:9000",
            "--event",
            "call_start",
            "--data",
            r#"{"n": 1}"#,
        ]);
        let mut cfg = LinkConfig::default();
        cli.apply(&mut cfg);
        assert_eq!(cfg.local_port, 9999);
        assert_eq!(cfg.peer_addr(), Some(("10.0.0.5", 9000)));
    }

    #[test]
    fn listen_keeps_configured_port() {
        let cli = Cli::parse_from(["peerlink", "listen"]);
        let mut cfg = LinkConfig::listen_only(7000);
        cli.apply(&mut cfg);
        assert_eq!(cfg.local_port, 7000);
        assert_eq!(cli.log_level, "info");
    }

    #[test]
    fn wait_args() {
        let cli = Cli::parse_from(["peerlink", "wait", "--event", "call_end", "--timeout", "2.5"]);
        match cli.command {
            Command::Wait { event, timeout } => {
                assert_eq!(event.as_deref(), Some("call_end"));
                assert_eq!(timeout, 2.5);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn peer_parsing() {
        assert_eq!(parse_peer("host").unwrap(), ("host".to_string(), None));
        assert_eq!(parse_peer("host:1").unwrap(), ("host".to_string(), Some(1)));
        assert_eq!(parse_peer("[::1]:5").unwrap(), ("::1".to_string(), Some(5)));
        assert_eq!(parse_peer("::1").unwrap(), ("::1".to_string(), None));
        assert!(parse_peer("host:99999").is_err());
        assert!(parse_peer("").is_err());
    }

    #[test]
    fn data_must_be_object() {
        assert!(parse_data("[1]").is_err());
        assert!(Cli::try_parse_from(["peerlink", "send", "--data", "nope"]).is_err());
    }
}

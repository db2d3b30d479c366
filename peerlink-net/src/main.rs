// PeerLink CLI: listen, send or wait for synchronization events.

mod cli;

use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use peerlink_net::{config, Data, LinkConfig, PeerLink};
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Command};

const LISTEN_POLL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let mut cfg = config::load();
    cli.apply(&mut cfg);

    match cli.command {
        Command::Listen => listen(cfg).await,
        Command::Send { event, data, .. } => send(cfg, &event, data).await,
        Command::Wait { event, timeout } => wait(cfg, event.as_deref(), timeout).await,
    }
}

async fn start(cfg: LinkConfig) -> anyhow::Result<PeerLink> {
    let link = PeerLink::bind(cfg).await.context("starting peer link")?;
    if let Some(addr) = link.advertised_addr() {
        tracing::info!(%addr, "reachable by peer at");
    }
    Ok(link)
}

async fn listen(cfg: LinkConfig) -> anyhow::Result<ExitCode> {
    let link = start(cfg).await?;
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            msg = link.receive(None, LISTEN_POLL) => match msg {
                Some(msg) => println!("{}", serde_json::to_string(&msg)?),
                None => tracing::info!("no message in the last {}s", LISTEN_POLL.as_secs()),
            },
            r = &mut shutdown => {
                r?;
                break;
            }
        }
    }
    link.stop().await;
    report_unconsumed(&link);
    Ok(ExitCode::SUCCESS)
}

async fn send(cfg: LinkConfig, event: &str, data: Data) -> anyhow::Result<ExitCode> {
    if cfg.peer_addr().is_none() {
        anyhow::bail!("no peer: pass --peer or set PEERLINK_PEER_HOST");
    }
    let link = start(cfg).await?;
    let result = link.try_send(event, data).await;
    link.stop().await;
    result.with_context(|| format!("sending {event}"))?;
    tracing::info!(event, "sent");
    Ok(ExitCode::SUCCESS)
}

async fn wait(cfg: LinkConfig, event: Option<&str>, timeout: f64) -> anyhow::Result<ExitCode> {
    let timeout = Duration::try_from_secs_f64(timeout).context("invalid --timeout")?;
    let link = start(cfg).await?;
    let got = link.receive(event, timeout).await;
    link.stop().await;
    match got {
        Some(msg) => {
            println!("{}", serde_json::to_string(&msg)?);
            Ok(ExitCode::SUCCESS)
        }
        None => {
            tracing::warn!(event = ?event, ?timeout, "timed out waiting");
            Ok(ExitCode::FAILURE)
        }
    }
}

fn report_unconsumed(link: &PeerLink) {
    let pending = link.inbox().drain();
    if !pending.is_empty() {
        let events: Vec<&str> = pending.iter().map(|m| m.event.as_str()).collect();
        tracing::warn!(count = pending.len(), ?events, "unconsumed messages at shutdown");
    }
}

/// Wait for Ctrl+C or SIGTERM (Unix).
async fn shutdown_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate())?;
        tokio::select! {
            r = tokio::signal::ctrl_c() => r?,
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
    }
    tracing::info!("shutting down");
    Ok(())
}

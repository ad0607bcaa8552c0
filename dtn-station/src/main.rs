// DTN link station: the crew terminal (client) or Earth (server) end of a
// timed store-and-forward dispatch link.

mod config;
mod console;
mod link;
mod transport;

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, ValueEnum};
use dtn_core::{BackupStore, LinkCore, PartyDirectory, Role};
use tokio::io::BufReader;

#[derive(Debug, Parser)]
#[command(name = "dtn-station", version, about)]
struct Cli {
    /// Config file (default: ~/.config/dtn-link/config.toml or /etc/dtn-link/config.toml).
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Which end of the link to run.
    #[arg(value_enum)]
    role: RoleArg,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum RoleArg {
    Client,
    Server,
}

impl From<RoleArg> for Role {
    fn from(r: RoleArg) -> Self {
        match r {
            RoleArg::Client => Role::Client,
            RoleArg::Server => Role::Server,
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = config::load(cli.config.as_deref()).context("loading configuration")?;
    init_tracing(cfg.log_file.as_deref())?;

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("starting runtime")?;
    rt.block_on(run(cli.role.into(), cfg))
}

fn init_tracing(log_file: Option<&Path>) -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    match log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("opening log file {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(std::sync::Mutex::new(file))
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
    }
    Ok(())
}

async fn run(role: Role, cfg: config::Config) -> anyhow::Result<()> {
    let backup = BackupStore::new(cfg.backup_path_for(role));
    let restored = match backup.restore() {
        Ok(records) => {
            tracing::info!(path = %backup.path().display(), dispatches = records.len(), "history restored");
            records
        }
        Err(e) => {
            tracing::error!(path = %backup.path().display(), error = %e, "cannot restore history, starting empty");
            backup
                .quarantine()
                .context("moving the unreadable backup aside")?;
            Vec::new()
        }
    };
    let core_cfg = cfg.to_core();
    let core = LinkCore::with_history(
        role,
        core_cfg,
        PartyDirectory::builtin(core_cfg.dispatch_capacity),
        restored,
    )?;

    let addr = cfg.addr();
    let stream = transport::establish(role, &addr)
        .await
        .with_context(|| format!("establishing the link on {addr}"))?;
    let mut link = transport::Connection::new(stream);
    link.handshake(role)
        .await
        .context("handshake with the peer")?;
    println!("Link up as {role}. Type `help` for commands.");

    let station = link::Station::new(
        core,
        link,
        backup,
        cfg.receive_timeout(),
        cfg.connection_check(),
    );
    station
        .run(BufReader::new(tokio::io::stdin()), shutdown_signal())
        .await
}

/// Wait for Ctrl+C or SIGTERM (Unix).
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "cannot listen for SIGTERM");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

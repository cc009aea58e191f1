//! `conduitd` - the Conduit plugin host.
//!
//! Loads the layered configuration, installs logging, and serves plugins on
//! the configured Unix socket until interrupted. On Ctrl+C or SIGTERM every
//! plugin session is torn down and the socket file is removed.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use tracing::info;

use conduit_kernel::Kernel;
use conduit_telemetry::{LogConfig, setup_logging};

/// Conduit daemon - plugin host.
#[derive(Debug, Parser)]
#[command(name = "conduitd")]
#[command(author, version, about = "Conduit daemon - plugin host")]
struct Args {
    /// Config file merged over the user config. Must exist.
    #[arg(short, long, env = "CONDUIT_CONFIG")]
    config: Option<PathBuf>,

    /// Conduit home directory (default `~/.conduit`).
    #[arg(long, env = "CONDUIT_HOME")]
    home: Option<PathBuf>,

    /// Listen on this socket instead of the configured one.
    #[arg(short, long)]
    socket: Option<PathBuf>,

    /// Override the configured log level.
    #[arg(long)]
    log_level: Option<String>,

    /// Shorthand for `--log-level debug`.
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn log_level(&self) -> Option<&str> {
        match (&self.log_level, self.verbose) {
            (Some(level), _) => Some(level),
            (None, true) => Some("debug"),
            (None, false) => None,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = conduit_config::load(args.config.as_deref(), args.home.as_deref())
        .context("failed to load configuration")?;
    if let Some(socket) = &args.socket {
        config.server.socket_path = Some(socket.clone());
    }

    let mut log_config =
        LogConfig::try_from(&config.logging).context("invalid logging configuration")?;
    if let Some(level) = args.log_level() {
        log_config.level = level.to_string();
    }
    if let Err(e) = setup_logging(&log_config) {
        eprintln!("Failed to initialize logging: {e}");
    }

    let kernel = Kernel::builder_from_config(&config).build();
    kernel
        .listen_default()
        .context("failed to bind plugin socket")?;

    let socket = config.server.socket_path();
    info!(socket = %socket.display(), "conduitd started");
    println!(
        "{}",
        format!("conduitd listening on {}", socket.display())
            .cyan()
            .bold()
    );

    wait_for_signal().await?;

    println!("\n{}", "Shutting down...".yellow());
    kernel.shutdown().await;
    println!("{}", "Daemon stopped".green().bold());
    Ok(())
}

#[cfg(unix)]
async fn wait_for_signal() -> Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut terminate = signal(SignalKind::terminate()).context("failed to watch SIGTERM")?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result.context("failed to watch Ctrl+C")?,
        _ = terminate.recv() => {},
    }
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_signal() -> Result<()> {
    tokio::signal::ctrl_c()
        .await
        .context("failed to watch Ctrl+C")
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_args_definition() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_log_level_override() {
        let args = Args::try_parse_from(["conduitd", "-v"]).unwrap();
        assert_eq!(args.log_level(), Some("debug"));

        let args = Args::try_parse_from(["conduitd", "-v", "--log-level", "trace"]).unwrap();
        assert_eq!(args.log_level(), Some("trace"));

        let args = Args::try_parse_from(["conduitd", "--socket", "/tmp/c.sock"]).unwrap();
        assert_eq!(args.log_level(), None);
        assert_eq!(args.socket, Some(PathBuf::from("/tmp/c.sock")));
    }
}

//! # termbridge
//!
//! Server binary: loads settings, starts the WebSocket bridge and shuts
//! down gracefully on Ctrl-C.

#![deny(unsafe_code)]

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use termbridge_server::logging::init_subscriber;
use termbridge_server::metrics::install_recorder;
use termbridge_server::server::TermbridgeServer;
use termbridge_server::settings::{Settings, load_settings};

/// WebSocket bridge to echo or command sessions.
#[derive(Parser, Debug)]
#[command(name = "termbridge", about = "WebSocket bridge to backend sessions")]
struct Cli {
    /// Host to bind (overrides settings if specified).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings if specified).
    #[arg(long)]
    port: Option<u16>,

    /// Path to a JSON settings file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Command to run per session, e.g. `"/bin/sh -i"`. Sessions echo when unset.
    #[arg(long)]
    command: Option<String>,

    /// Default log filter when `RUST_LOG` is unset.
    #[arg(long)]
    log_level: Option<String>,

    /// Emit logs as JSON lines.
    #[arg(long)]
    json_logs: bool,
}

impl Cli {
    /// Layer command-line flags over loaded settings.
    fn apply(&self, settings: &mut Settings) {
        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(command) = &self.command {
            let argv: Vec<String> = command.split_whitespace().map(str::to_owned).collect();
            settings.server.command = (!argv.is_empty()).then_some(argv);
        }
        if let Some(level) = &self.log_level {
            settings.logging.level.clone_from(level);
        }
        if self.json_logs {
            settings.logging.json = true;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    let mut settings = load_settings(args.config.as_deref()).context("Failed to load settings")?;
    args.apply(&mut settings);

    init_subscriber(&settings.logging.level, settings.logging.json);
    let metrics = install_recorder().context("Failed to install metrics recorder")?;

    let shutdown_timeout = settings.server.shutdown_timeout();
    let server = TermbridgeServer::from_config(settings.server, metrics);
    let (addr, handle) = server.listen().await.context("Failed to start server")?;
    tracing::info!(%addr, "termbridge ready");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutting down...");
    if !server.shutdown().graceful_shutdown(Some(shutdown_timeout)).await {
        tracing::warn!("some sessions did not finish before the shutdown timeout");
    }
    let _ = handle.await;

    tracing::info!("Shutdown complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_defaults_leave_settings_untouched() {
        let cli = Cli::parse_from(["termbridge"]);
        let mut settings = Settings::default();
        cli.apply(&mut settings);
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn cli_port_and_host() {
        let cli = Cli::parse_from(["termbridge", "--host", "0.0.0.0", "--port", "8080"]);
        let mut settings = Settings::default();
        cli.apply(&mut settings);
        assert_eq!(settings.server.host, "0.0.0.0");
        assert_eq!(settings.server.port, 8080);
    }

    #[test]
    fn cli_command_is_split() {
        let cli = Cli::parse_from(["termbridge", "--command", "/bin/sh -i"]);
        let mut settings = Settings::default();
        cli.apply(&mut settings);
        assert_eq!(
            settings.server.command,
            Some(vec!["/bin/sh".to_owned(), "-i".to_owned()])
        );
    }

    #[test]
    fn blank_command_means_echo() {
        let cli = Cli::parse_from(["termbridge", "--command", "  "]);
        let mut settings = Settings::default();
        cli.apply(&mut settings);
        assert!(settings.server.command.is_none());
    }

    #[test]
    fn cli_logging_flags() {
        let cli = Cli::parse_from(["termbridge", "--log-level", "debug", "--json-logs"]);
        let mut settings = Settings::default();
        cli.apply(&mut settings);
        assert_eq!(settings.logging.level, "debug");
        assert!(settings.logging.json);
    }

    #[test]
    fn cli_config_path() {
        let cli = Cli::parse_from(["termbridge", "--config", "/tmp/termbridge.json"]);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/termbridge.json")));
    }
}

//! # chirp-gateway
//!
//! Gateway binary — loads settings, wires the server, and runs until
//! interrupted.

#![deny(unsafe_code)]

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use chirp_server::{GatewayServer, metrics};
use chirp_settings::loader;

/// Conversation gateway server.
#[derive(Parser, Debug)]
#[command(name = "chirp-gateway", about = "Real-time conversation gateway")]
struct Cli {
    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind (overrides settings; 0 for auto-assign).
    #[arg(long)]
    port: Option<u16>,

    /// Path to the settings file (default `~/.chirp/settings.json`).
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Skip installing the Prometheus recorder.
    #[arg(long)]
    no_metrics: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Cli::parse();

    let settings_path = args.settings.unwrap_or_else(loader::settings_path);
    let mut settings = loader::load_settings_from_path(&settings_path)
        .with_context(|| format!("failed to load settings from {}", settings_path.display()))?;
    if let Some(host) = args.host {
        settings.server.host = host;
    }
    if let Some(port) = args.port {
        settings.server.port = port;
    }

    let bind_addr = format!("{}:{}", settings.server.host, settings.server.port);
    let mut server = GatewayServer::new(settings);
    if !args.no_metrics {
        server = server.with_metrics(metrics::install_recorder());
    }

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;

    let shutdown = server.shutdown().clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown signal received");
            shutdown.shutdown();
        }
    });

    server.serve(listener).await.context("server error")?;
    tracing::info!("shutdown complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_defaults_leave_settings_alone() {
        let cli = Cli::parse_from(["chirp-gateway"]);
        assert!(cli.host.is_none());
        assert!(cli.port.is_none());
        assert!(!cli.no_metrics);
    }

    #[test]
    fn cli_overrides_parse() {
        let cli = Cli::parse_from([
            "chirp-gateway",
            "--host",
            "127.0.0.1",
            "--port",
            "0",
            "--no-metrics",
        ]);
        assert_eq!(cli.host.as_deref(), Some("127.0.0.1"));
        assert_eq!(cli.port, Some(0));
        assert!(cli.no_metrics);
    }
}

//! TCP chat client: entry point.
//!
//! ```text
//! /connect <ip> <port>   connect and authenticate
//! <text>                 send "Client: <text>"
//! /disconnect            leave the server
//! /quit                  disconnect (if needed) and exit
//! ```
//!
//! # Usage
//!
//! ```text
//! chat-client [OPTIONS]
//!
//! Options:
//!   --config <PATH>             Config file [default: platform config dir]
//!   --address <IP>              Server address for --connect / the hint
//!   --port <PORT>               Server port for --connect / the hint
//!   --secret <SECRET>           Shared secret (env: CHAT_SECRET)
//!   --connect-timeout <SECS>    Give up on the TCP connect after SECS
//!   --handshake-timeout <SECS>  Give up on the handshake after SECS
//!   --connect                   Connect immediately
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::io::BufReader;
use tracing::info;
use tracing_subscriber::EnvFilter;

use chat_client::infrastructure::network::TcpDialer;
use chat_client::infrastructure::storage::config::{self, ClientConfig};
use chat_client::infrastructure::ui_bridge::{print_events, run_console};
use chat_client::{ClientLink, ClientSettings};
use chat_core::{ChannelUiSink, Credentials, UiSink};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// TCP chat client.
#[derive(Debug, Parser)]
#[command(name = "chat-client", about = "TCP chat client", version)]
struct Cli {
    /// Path to the TOML config file.
    #[arg(long, env = "CHAT_CLIENT_CONFIG")]
    config: Option<PathBuf>,

    /// Server IP address.  Overrides `[network] server_address`.
    #[arg(long, env = "CHAT_SERVER_ADDRESS")]
    address: Option<String>,

    /// Server port.  Overrides `[network] port`.
    #[arg(long, env = "CHAT_PORT")]
    port: Option<u16>,

    /// Shared secret.  Overrides `[auth] shared_secret`.
    #[arg(long, env = "CHAT_SECRET", hide_env_values = true)]
    secret: Option<String>,

    /// TCP connect timeout in seconds.  Overrides `[timeouts] connect_secs`.
    #[arg(long, env = "CHAT_CONNECT_TIMEOUT")]
    connect_timeout: Option<u64>,

    /// Handshake timeout in seconds.  Overrides `[timeouts] handshake_secs`.
    #[arg(long, env = "CHAT_HANDSHAKE_TIMEOUT")]
    handshake_timeout: Option<u64>,

    /// Connect to the configured server right away.
    #[arg(long)]
    connect: bool,
}

impl Cli {
    fn apply(&self, mut cfg: ClientConfig) -> ClientConfig {
        if let Some(address) = &self.address {
            cfg.network.server_address = address.clone();
        }
        if let Some(port) = self.port {
            cfg.network.port = port;
        }
        if let Some(secret) = &self.secret {
            cfg.auth.shared_secret = secret.clone();
        }
        if let Some(secs) = self.connect_timeout {
            cfg.timeouts.connect_secs = Some(secs);
        }
        if let Some(secs) = self.handshake_timeout {
            cfg.timeouts.handshake_secs = Some(secs);
        }
        cfg
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let file_cfg = match &cli.config {
        Some(path) => config::load_config_from(path),
        None => config::load_config(),
    }
    .context("failed to load client config")?;
    let cfg = cli.apply(file_cfg);

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&cfg.logging.level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let credentials =
        Credentials::new(&cfg.auth.shared_secret).context("invalid shared secret")?;
    let (sink, events) = ChannelUiSink::channel();
    let ui: Arc<dyn UiSink> = Arc::new(sink);
    let printer = tokio::spawn(print_events(events, tokio::io::stdout()));

    let link = ClientLink::new(
        Arc::new(TcpDialer::new(cfg.timeouts.connect())),
        credentials,
        Arc::clone(&ui),
        ClientSettings {
            handshake_timeout: cfg.timeouts.handshake(),
        },
    );

    let port = cfg.network.port.to_string();
    if cli.connect {
        if let Err(e) = link.connect(&cfg.network.server_address, &port).await {
            ui.alert(&e.to_string());
        }
    } else {
        ui.notify(&format!(
            "Type /connect {} {port} to join a server.",
            cfg.network.server_address
        ));
    }

    let stdin = BufReader::new(tokio::io::stdin());
    tokio::select! {
        result = run_console(&link, Arc::clone(&ui), stdin) => {
            result.context("failed to read console input")?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
        }
    }

    link.disconnect().await;
    drop(link);
    drop(ui);
    let _ = tokio::time::timeout(Duration::from_millis(500), printer).await;
    Ok(())
}

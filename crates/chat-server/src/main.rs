//! TCP chat server: entry point.
//!
//! Starts a console front end for the chat server.  Commands are typed on
//! stdin; everything the server reports is printed to stdout.
//!
//! ```text
//! /start <ip> <port>   start listening
//! /stop                notify clients and stop
//! <text>               send "Server: <text>" to every client
//! /quit                stop (if needed) and exit
//! ```
//!
//! # Usage
//!
//! ```text
//! chat-server [OPTIONS]
//!
//! Options:
//!   --config <PATH>            Config file [default: platform config dir]
//!   --address <IP>             Address for --listen / the start hint
//!   --port <PORT>              Port for --listen / the start hint
//!   --secret <SECRET>          Shared secret (env: CHAT_SECRET)
//!   --handshake-timeout <SECS> Give up on silent clients after SECS
//!   --listen                   Start listening immediately
//!   --write-config             Save the effective config and exit
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::io::BufReader;
use tracing::info;
use tracing_subscriber::EnvFilter;

use chat_core::{ChannelUiSink, Credentials, UiSink};
use chat_server::infrastructure::storage::config::{self, ServerConfig};
use chat_server::infrastructure::ui_bridge::{print_events, run_console};
use chat_server::{ChatServer, ServerSettings};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Multi-client TCP chat server.
#[derive(Debug, Parser)]
#[command(name = "chat-server", about = "Multi-client TCP chat server", version)]
struct Cli {
    /// Path to the TOML config file.
    #[arg(long, env = "CHAT_SERVER_CONFIG")]
    config: Option<PathBuf>,

    /// IP address to listen on.  Overrides `[network] bind_address`.
    #[arg(long, env = "CHAT_BIND_ADDRESS")]
    address: Option<String>,

    /// Port to listen on.  Overrides `[network] port`.
    #[arg(long, env = "CHAT_PORT")]
    port: Option<u16>,

    /// Shared secret clients must know.  Overrides `[auth] shared_secret`.
    #[arg(long, env = "CHAT_SECRET", hide_env_values = true)]
    secret: Option<String>,

    /// Handshake timeout in seconds.  Overrides `[timeouts] handshake_secs`.
    #[arg(long, env = "CHAT_HANDSHAKE_TIMEOUT")]
    handshake_timeout: Option<u64>,

    /// Start listening on the configured endpoint right away.
    #[arg(long)]
    listen: bool,

    /// Save the effective config (file values plus flags) and exit.
    #[arg(long)]
    write_config: bool,
}

impl Cli {
    /// Layers command-line values over the file config.
    fn apply(&self, mut cfg: ServerConfig) -> ServerConfig {
        if let Some(address) = &self.address {
            cfg.network.bind_address = address.clone();
        }
        if let Some(port) = self.port {
            cfg.network.port = port;
        }
        if let Some(secret) = &self.secret {
            cfg.auth.shared_secret = secret.clone();
        }
        if let Some(secs) = self.handshake_timeout {
            cfg.timeouts.handshake_secs = Some(secs);
        }
        cfg
    }

    /// Writes `cfg` to `--config`, or to the platform config path.
    fn save_effective_config(&self, cfg: &ServerConfig) -> anyhow::Result<PathBuf> {
        let path = match &self.config {
            Some(path) => path.clone(),
            None => config::config_file_path()?,
        };
        config::save_config_to(&path, cfg)
            .with_context(|| format!("failed to write config to {}", path.display()))?;
        Ok(path)
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
    .context("failed to load server config")?;
    let cfg = cli.apply(file_cfg);

    if cli.write_config {
        let path = cli.save_effective_config(&cfg)?;
        println!("Wrote {}", path.display());
        return Ok(());
    }

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

    let server = ChatServer::new(
        credentials,
        Arc::clone(&ui),
        ServerSettings {
            handshake_timeout: cfg.timeouts.handshake(),
        },
    );

    info!("chat server ready");
    if cli.listen {
        if let Err(e) = server
            .start(&cfg.network.bind_address, &cfg.network.port.to_string())
            .await
        {
            ui.alert(&e.to_string());
        }
    } else {
        ui.notify(&format!(
            "Type /start {} {} to begin listening.",
            cfg.network.bind_address, cfg.network.port
        ));
    }

    let stdin = BufReader::new(tokio::io::stdin());
    tokio::select! {
        result = run_console(&server, Arc::clone(&ui), stdin) => {
            result.context("failed to read console input")?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
        }
    }

    server.stop().await;
    drop(server);
    drop(ui);
    // Give the printer a moment to flush the final notices.
    let _ = tokio::time::timeout(Duration::from_millis(500), printer).await;
    info!("chat server exited");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

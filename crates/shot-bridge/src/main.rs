//! Shot Bridge: entry point.
//!
//! Connects to a launch monitor's JSON line API and fans every shot and
//! status report out to browser mini-games over WebSocket.  When the launch
//! monitor cannot be reached at startup the bridge runs in demo mode: browsers
//! still connect and can request test shots.
//!
//! # Usage
//!
//! ```text
//! shot-bridge [OPTIONS]
//!
//! Options:
//!   --ws-bind     <ADDR>   WebSocket bind address [default: 0.0.0.0]
//!   --ws-port     <PORT>   WebSocket listener port [default: 8765]
//!   --device-host <HOST>   Launch monitor IP address [default: 127.0.0.1]
//!   --device-port <PORT>   Launch monitor API port [default: 2921]
//! ```
//!
//! # Environment variable overrides
//!
//! CLI args take precedence when both are present.
//!
//! | Variable             | Default     | Description                     |
//! |----------------------|-------------|---------------------------------|
//! | `SHOT_WS_BIND`       | `0.0.0.0`   | WebSocket bind address          |
//! | `SHOT_WS_PORT`       | `8765`      | WebSocket listener port         |
//! | `SHOT_DEVICE_HOST`   | `127.0.0.1` | Launch monitor IP address       |
//! | `SHOT_DEVICE_PORT`   | `2921`      | Launch monitor API port         |
//! | `SHOT_BRIDGE_CONFIG` | unset       | Path of an optional tuning file |

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use shot_bridge::application::DeviceSource;
use shot_bridge::domain::config::{DEFAULT_DEVICE_PORT, DEFAULT_WS_PORT};
use shot_bridge::domain::BridgeConfig;
use shot_bridge::infrastructure::{apply_from_env, Bridge, OpenConnectClient};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Launch monitor to browser WebSocket bridge.
#[derive(Debug, Parser)]
#[command(
    name = "shot-bridge",
    about = "Broadcasts launch-monitor shots to browser mini-games over WebSocket",
    version
)]
struct Cli {
    /// IP address to bind the WebSocket server to.
    ///
    /// Use `0.0.0.0` to accept browsers from the LAN, or `127.0.0.1` for
    /// local browsers only.
    #[arg(long, default_value = "0.0.0.0", env = "SHOT_WS_BIND")]
    ws_bind: String,

    /// TCP port for the WebSocket server to listen on.
    #[arg(long, default_value_t = DEFAULT_WS_PORT, env = "SHOT_WS_PORT")]
    ws_port: u16,

    /// IP address of the launch monitor.
    #[arg(long, default_value = "127.0.0.1", env = "SHOT_DEVICE_HOST")]
    device_host: String,

    /// TCP port of the launch monitor's JSON API.
    #[arg(long, default_value_t = DEFAULT_DEVICE_PORT, env = "SHOT_DEVICE_PORT")]
    device_port: u16,
}

impl Cli {
    /// Applies the host/port arguments on top of `base`.
    ///
    /// # Errors
    ///
    /// Returns an error if `--ws-bind` or `--device-host` is not a valid IP
    /// address.
    fn into_bridge_config(self, base: BridgeConfig) -> anyhow::Result<BridgeConfig> {
        let ws_bind_addr: SocketAddr = format!("{}:{}", self.ws_bind, self.ws_port)
            .parse()
            .with_context(|| {
                format!(
                    "invalid WebSocket bind address: '{}:{}'",
                    self.ws_bind, self.ws_port
                )
            })?;

        let device_addr: SocketAddr = format!("{}:{}", self.device_host, self.device_port)
            .parse()
            .with_context(|| {
                format!(
                    "invalid launch monitor address: '{}:{}'",
                    self.device_host, self.device_port
                )
            })?;

        Ok(BridgeConfig {
            ws_bind_addr,
            device_addr,
            ..base
        })
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

/// Program entry point.
///
/// 1. Initialise logging (`RUST_LOG`, default `info`).
/// 2. Build the configuration: defaults, then the tuning file, then the CLI.
/// 3. Start the bridge.
/// 4. Wait for Ctrl+C, then shut everything down and exit with status 0.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut base = BridgeConfig::default();
    apply_from_env(&mut base).context("failed to load tuning file")?;
    let config = cli.into_bridge_config(base)?;

    info!(
        "Shot Bridge starting: ws={}, device={}",
        config.ws_bind_addr, config.device_addr
    );

    let device: Arc<dyn DeviceSource> = Arc::new(OpenConnectClient::new(&config));
    let bridge = Bridge::start(config, Some(device)).await?;

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("received Ctrl+C, shutting down"),
        Err(e) => tracing::error!("failed to listen for Ctrl+C signal: {e}"),
    }

    bridge.shutdown().await;
    info!("Shot Bridge stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

//! WebSocket echo server
//!
//! Run with: cargo run --bin ws-echo -- --addr 127.0.0.1:8888

use std::net::SocketAddr;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use ws_echo::server::{ConnectionMode, ServerConfig, WebSocketServer};
use ws_echo::{Config, DEFAULT_MAX_HEADER_SIZE, DEFAULT_MAX_PAYLOAD_SIZE};

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Address to listen on
    #[arg(short, long, env = "WS_ECHO_ADDR", default_value = "127.0.0.1:8888")]
    addr: SocketAddr,

    /// Reply to a single message per connection, then close
    #[arg(long, env = "WS_ECHO_ONCE")]
    once: bool,

    /// Byte budget for the upgrade request header block
    #[arg(long, env = "WS_ECHO_MAX_HEADER_SIZE", default_value_t = DEFAULT_MAX_HEADER_SIZE)]
    max_header_size: usize,

    /// Maximum payload of one inbound frame in bytes
    #[arg(long, env = "WS_ECHO_MAX_PAYLOAD_SIZE", default_value_t = DEFAULT_MAX_PAYLOAD_SIZE)]
    max_payload_size: usize,

    /// Reject unmasked client frames
    #[arg(long, env = "WS_ECHO_REQUIRE_MASKED")]
    require_masked: bool,

    /// Require a complete RFC 6455 upgrade request, not just the key
    #[arg(long, env = "WS_ECHO_STRICT")]
    strict: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, env = "WS_ECHO_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

impl Args {
    fn server_config(&self) -> ServerConfig {
        let ws = Config::builder()
            .max_header_size(self.max_header_size)
            .max_payload_size(self.max_payload_size)
            .require_masked(self.require_masked)
            .strict_handshake(self.strict)
            .build();

        ServerConfig {
            addr: self.addr,
            mode: if self.once {
                ConnectionMode::Single
            } else {
                ConnectionMode::Loop
            },
            ws,
            ..ServerConfig::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&args.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    let config = args.server_config();
    info!(
        version = env!("CARGO_PKG_VERSION"),
        addr = %config.addr,
        mode = ?config.mode,
        "Starting echo server"
    );

    let server = WebSocketServer::bind(config)
        .await
        .with_context(|| format!("Failed to bind {}", args.addr))?;

    server
        .run_until(async {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Received CTRL+C signal, shutting down");
            }
        })
        .await
        .context("Echo server failed")?;

    Ok(())
}

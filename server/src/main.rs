//! Gateway Server - standalone headless server bridging the edge protocol
//! to the remote live-audio model.
//!
//! Accepts one TCP connection per edge client and runs each through
//! [`gateway_core::edge::handle_tcp_connection`] on the shared Tokio
//! runtime; connections share nothing but the immutable [`Settings`] and a
//! [`HomeAssistantClient`].

mod config;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use gateway_core::{HomeAssistantClient, Settings};
use tokio::net::TcpListener;
use tokio::signal;

/// Headless gateway bridging the edge protocol to the remote live-audio model.
#[derive(Parser, Debug)]
#[command(name = "gateway-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the packaged-application options file (JSON).
    #[arg(short = 'o', long, value_name = "FILE", env = "GATEWAY_OPTIONS_PATH")]
    options: Option<PathBuf>,

    /// Bind host (overrides environment/options file).
    #[arg(long)]
    host: Option<String>,

    /// Bind port (overrides environment/options file).
    #[arg(short = 'p', long)]
    port: Option<u16>,

    /// Log level (error, warn, info, debug, trace); overrides environment/options file.
    #[arg(short = 'l', long)]
    log_level: Option<log::LevelFilter>,
}

/// Exit code used when no remote-model API key could be resolved.
const EXIT_MISSING_API_KEY: i32 = 2;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let options_path = args.options.clone().unwrap_or_else(|| PathBuf::from(config::DEFAULT_OPTIONS_PATH));
    let mut settings = config::load_settings(&options_path);

    if let Some(host) = args.host {
        settings.host = host;
    }
    if let Some(port) = args.port {
        settings.port = port;
    }
    if let Some(log_level) = args.log_level {
        settings.log_level = log_level.to_string().to_lowercase();
    }

    let level_filter = settings.log_level.parse().unwrap_or(log::LevelFilter::Info);
    env_logger::Builder::new().filter_level(level_filter).format_timestamp_millis().init();

    log::info!("gateway-server v{}", env!("CARGO_PKG_VERSION"));

    if !settings.has_api_key() {
        log::error!("no remote model API key configured (set GEMINI_API_KEY or GOOGLE_API_KEY)");
        std::process::exit(EXIT_MISSING_API_KEY);
    }

    let ha = Arc::new(HomeAssistantClient::new(
        reqwest::Client::new(),
        settings.ha_url.clone(),
        settings.ha_token.clone(),
    ));

    let addr: SocketAddr = format!("{}:{}", settings.host, settings.port)
        .parse()
        .context("invalid host/port")?;
    let listener = TcpListener::bind(addr).await.with_context(|| format!("failed to bind {addr}"))?;
    log::info!("listening on {addr}");

    tokio::select! {
        () = accept_loop(listener, settings, ha) => {},
        () = shutdown_signal() => {
            log::info!("shutdown signal received");
        }
    }

    Ok(())
}

/// Accepts edge connections forever, spawning one task per connection. Each
/// connection is independent: no state is shared across tasks beyond the
/// immutable `settings` and `ha` client, so a panic or hang in one
/// connection's task cannot affect another's.
async fn accept_loop(listener: TcpListener, settings: Settings, ha: Arc<HomeAssistantClient>) {
    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                log::warn!("accept failed: {e}");
                continue;
            }
        };
        log::info!("accepted edge connection from {peer}");

        let settings = settings.clone();
        let ha = Arc::clone(&ha);
        tokio::spawn(async move {
            gateway_core::edge::handle_tcp_connection(settings, ha, stream).await;
            log::info!("edge connection from {peer} closed");
        });
    }
}

/// Waits for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::prelude::*;

use debug_relay::clock::SystemClock;
use debug_relay::config::{FileConfig, load_config};
use debug_relay::registry::spawn_sweeper;
use debug_relay::{AppState, RelayConfig};

#[derive(Parser)]
#[command(name = "debug-relay")]
#[command(about = "Long-poll relay between a mobile JavaScript runtime and a desktop debugger")]
struct Args {
    /// Config file (defaults to ./debug-relay.toml when present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Host to bind to
    #[arg(short = 'b', long)]
    host: Option<String>,

    /// Port for the relay
    #[arg(short, long)]
    port: Option<u16>,

    /// Directory served by /files/list and /files/data
    #[arg(long)]
    files_root: Option<PathBuf>,

    /// Directory served under /ui/
    #[arg(long)]
    ui_root: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

impl Args {
    /// CLI flags sit on top of every other config layer.
    fn apply(&self, fc: &mut FileConfig) {
        if let Some(host) = &self.host {
            fc.server.host = host.clone();
        }
        if let Some(port) = self.port {
            fc.server.port = port;
        }
        if let Some(root) = &self.files_root {
            fc.files.root = root.clone();
        }
        if let Some(root) = &self.ui_root {
            fc.ui.root = root.clone();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let default_directive = if args.debug {
        "debug_relay=debug,tower_http=debug,info"
    } else {
        "debug_relay=info,tower_http=info,warn"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(env_filter)
        .init();

    let mut file_config: FileConfig = load_config(args.config.as_deref())
        .extract()
        .context("Failed to load configuration")?;
    args.apply(&mut file_config);
    let config = RelayConfig::from_file(&file_config);

    if !config.files_root.is_dir() {
        warn!(
            "Files root {} is not a directory; /files/* will return nothing",
            config.files_root.display()
        );
    }
    if !config.ui_root.is_dir() {
        warn!(
            "UI root {} is not a directory; /ui/* will return 404",
            config.ui_root.display()
        );
    }
    match config.long_poll_timeout {
        Some(timeout) => info!("Long polls time out after {}s", timeout.as_secs()),
        None => info!("Long polls are held until a message arrives"),
    }

    let addr = format!("{}:{}", config.host, config.port)
        .parse::<SocketAddr>()
        .with_context(|| format!("Invalid listen address {}:{}", config.host, config.port))?;
    let eviction = config.eviction;

    let state = AppState::new(config, Arc::new(SystemClock));
    let registry = state.registry.clone();
    if let Some(policy) = eviction {
        spawn_sweeper(registry.clone(), policy);
    }

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    let actual_addr = listener.local_addr()?;

    info!("Debug relay listening on http://{}", actual_addr);
    info!("Targets: http://{}/", actual_addr);

    let shutdown_signal = async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Received shutdown signal, closing held requests...");
        registry.close_all().await;
    };

    axum::serve(
        listener,
        debug_relay::app(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal)
    .await
    .context("Server error")?;

    info!("Debug relay stopped");
    Ok(())
}

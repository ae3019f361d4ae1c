//! share-server - HTTP service for multi-platform media sharing
//!
//! Serves the share endpoint and the OAuth connection routes until it
//! receives SIGINT or SIGTERM.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use libsharecast::logging::{LogFormat, LoggingConfig};
use libsharecast::{create_platforms, Config, Database, Dispatcher};
use share_server::{build_router, AppState};
use tokio::net::TcpListener;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "share-server")]
#[command(version)]
#[command(about = "HTTP service for sharing media to several platforms at once")]
#[command(long_about = "\
share-server - HTTP service for sharing media to several platforms at once

DESCRIPTION:
    share-server accepts a media upload and publishes it to every platform
    the user selected and has connected (TikTok, YouTube, Instagram,
    Facebook, Twitter). Uploads to different platforms run concurrently and
    fail independently.

ROUTES:
    POST   /api/social/share                          Share a file (multipart)
    GET    /api/social/connect/{platform}             Start an OAuth connection
    GET    /api/social/callback/{platform}            OAuth redirect target
    GET    /api/social/connections                    List connections
    DELETE /api/social/connections/{platform}         Disconnect
    POST   /api/social/connections/{platform}/refresh Refresh a token
    GET    /api/social/shares                         Recent shares
    GET    /health                                    Health check

    Every /api route except the callback needs an x-user-id header.

SIGNALS:
    SIGTERM, SIGINT - Graceful shutdown (finishes in-flight requests)

CONFIGURATION:
    Configuration file: ~/.config/sharecast/config.toml
    (override with --config or SHARECAST_CONFIG)

    [server]
    bind = \"127.0.0.1:8787\"
    max_upload_bytes = 536870912

EXIT CODES:
    0 - Clean shutdown
    1 - Startup or runtime error
")]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Address to listen on (overrides [server] bind)
    #[arg(long, value_name = "ADDR")]
    bind: Option<String>,

    /// Log output format: text, json or pretty
    #[arg(long, value_name = "FORMAT", env = "SHARECAST_LOG_FORMAT")]
    log_format: Option<String>,

    /// Enable verbose logging to stderr
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let mut logging = LoggingConfig::from_env().verbose(cli.verbose);
    if let Some(format) = cli.log_format.as_deref() {
        match format.parse::<LogFormat>() {
            Ok(format) => logging.format = format,
            Err(e) => {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        }
    }
    logging.init();

    if let Err(e) = run(cli).await {
        error!("share-server failed: {:#}", e);
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => Config::load_from_path(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => Config::load().context("Failed to load config")?,
    };

    let db = Database::new(&config.database_path()?).await?;
    let platforms = create_platforms(&config)?;
    info!("Loaded {} platform client(s)", platforms.len());

    let dispatcher = Dispatcher::new(platforms, Arc::new(db.clone())).with_history(db.clone());
    let state = AppState::new(dispatcher, &config)?.with_history(db);
    let app = build_router(state);

    let bind = cli.bind.unwrap_or_else(|| config.server.bind.clone());
    let listener = TcpListener::bind(&bind)
        .await
        .with_context(|| format!("Failed to bind {}", bind))?;
    info!("share-server listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("share-server stopped");
    Ok(())
}

/// Resolves on the first SIGINT or SIGTERM
#[cfg(unix)]
async fn shutdown_signal() {
    use futures::StreamExt;
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook_tokio::Signals;

    match Signals::new([SIGINT, SIGTERM]) {
        Ok(mut signals) => {
            if let Some(signal) = signals.next().await {
                info!("Received signal {}, shutting down gracefully", signal);
            }
        }
        Err(e) => {
            error!("Signal setup failed: {}; falling back to Ctrl-C", e);
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("Received Ctrl-C, shutting down gracefully");
}

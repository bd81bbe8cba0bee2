//! Keybridge Server - Headless Relay Daemon
//!
//! A local HTTP relay that:
//! - Forwards chat completion requests to the enterprise LLM endpoint
//! - Injects OAuth client-credentials tokens, refreshed in the background
//! - Exposes a status snapshot for dashboards on /api/state
//!
//! Access via: http://localhost:8889

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use keybridge_core::proxy::server::RelayServer;
use keybridge_core::AppState;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod server_utils;

/// How long to wait for the refresh task after the listener drains.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[derive(Parser, Debug)]
#[command(name = "keybridge-server", version, about = "Local OAuth relay for LLM endpoints")]
struct Cli {
    /// Bind address override
    #[arg(long)]
    host: Option<String>,

    /// Listen port override
    #[arg(long)]
    port: Option<u16>,

    /// Serve mock tokens without contacting the OAuth endpoint
    #[arg(long)]
    mock: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();

    let mut config =
        keybridge_core::modules::config::load_config().context("Failed to load configuration")?;
    if let Some(host) = cli.host {
        config.host = host;
    }
    if let Some(port) = cli.port {
        config.port = port;
    }
    if cli.mock {
        config.oauth.mock_mode = true;
    }

    info!("🚀 Keybridge relay starting on {}...", config.proxy_url());

    let refresh_interval = Duration::from_secs(config.refresh_interval_secs);
    let state = AppState::new(config).context("Failed to initialize relay state")?;

    info!("🔀 Upstream endpoint: {}", state.config.upstream_base_url);
    info!("🤖 Model: {}", state.config.model_name);
    if state.token_manager.mock_mode() {
        info!("🧪 Mock mode enabled, OAuth endpoint will not be contacted");
    }
    info!("📝 Transcript: {}", state.transcript.path().display());

    // Warm the token cache before accepting traffic. A failure here is not
    // fatal; the first proxied request retries the fetch.
    match state.token_manager.get_token().await {
        Ok(cred) => {
            let remaining = cred.remaining_secs(Utc::now().timestamp());
            info!("🔑 OAuth token acquired (valid for {remaining}s)");
        }
        Err(e) => warn!("⚠️ Initial token fetch failed: {e}"),
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let refresh_handle =
        state.token_manager.spawn_background_refresh(refresh_interval, shutdown_rx);

    let server = RelayServer::new(state);
    server
        .run(async move {
            server_utils::shutdown_signal().await;
            let _ = shutdown_tx.send(true);
        })
        .await
        .context("Relay server failed")?;

    if tokio::time::timeout(SHUTDOWN_GRACE, refresh_handle).await.is_err() {
        warn!("⚠️ Token refresh task did not stop within {}s", SHUTDOWN_GRACE.as_secs());
    }

    info!("👋 Keybridge relay stopped");
    Ok(())
}

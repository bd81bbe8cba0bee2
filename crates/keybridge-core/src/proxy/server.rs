//! Axum server wiring.

use axum::routing::get;
use axum::Router;
use keybridge_types::RelayConfig;
use std::future::Future;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::error::AppResult;
use crate::proxy::handlers::{self, UPSTREAM_TIMEOUT};
use crate::proxy::monitor::RelayMonitor;
use crate::proxy::token_manager::TokenManager;
use crate::proxy::transcript::Transcript;

/// Shared handler state. Cheap to clone per request.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<RelayConfig>,
    pub token_manager: TokenManager,
    pub monitor: Arc<RelayMonitor>,
    pub transcript: Arc<Transcript>,
    pub upstream: reqwest::Client,
}

impl AppState {
    pub fn new(config: RelayConfig) -> AppResult<Self> {
        let monitor = Arc::new(RelayMonitor::new());
        let token_manager = TokenManager::new(config.oauth.clone(), Arc::clone(&monitor))?;
        let transcript = Arc::new(Transcript::create(&config.log_dir)?);
        let upstream = reqwest::Client::builder().timeout(UPSTREAM_TIMEOUT).build()?;
        Ok(Self { config: Arc::new(config), token_manager, monitor, transcript, upstream })
    }
}

/// Build the relay router.
///
/// `/api/state` serves the status snapshot; every other path falls through to
/// the forwarding handler.
pub fn build_relay_router(state: AppState) -> Router<()> {
    Router::new()
        .route("/api/state", get(handlers::handle_state))
        .fallback(handlers::handle_relay)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Axum server instance.
pub struct RelayServer {
    state: AppState,
}

impl RelayServer {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Bind and serve until the shutdown future resolves.
    pub async fn run<F>(self, shutdown: F) -> AppResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = format!("{}:{}", self.state.config.host, self.state.config.port);
        tracing::info!("Starting relay server on {}", addr);

        let app = build_relay_router(self.state);
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        axum::serve(listener, app).with_graceful_shutdown(shutdown).await?;

        Ok(())
    }
}

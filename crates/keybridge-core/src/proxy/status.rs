//! Status snapshot assembly.

use keybridge_types::{StatusSnapshot, TokenStatus};

use crate::proxy::server::AppState;

/// Build a point-in-time snapshot of the relay.
///
/// Each source is read independently under its own lock, so the snapshot is
/// internally consistent per field but not a global atomic view.
pub async fn collect(state: &AppState) -> StatusSnapshot {
    let token = TokenStatus {
        state: state.token_manager.token_state().await,
        refresh_count: state.token_manager.refresh_count(),
        last_refresh: state.token_manager.last_refresh().await,
        mock_mode: state.token_manager.mock_mode(),
    };

    StatusSnapshot {
        started_at: state.monitor.started_at(),
        uptime_secs: state.monitor.uptime_secs(),
        token,
        stats: state.monitor.stats().await,
        recent_requests: state.monitor.recent_requests().await,
        recent_events: state.monitor.recent_events().await,
        proxy_url: state.config.proxy_url(),
        upstream_base_url: state.config.upstream_base_url.clone(),
        model_name: state.config.model_name.clone(),
        max_tokens: state.config.max_tokens,
        log_file: state.transcript.path().display().to_string(),
    }
}

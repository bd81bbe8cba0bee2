//! Relay request handlers.

use axum::extract::State;
use axum::http::{header, Method, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use bytes::Bytes;
use keybridge_types::{RequestOutcome, Severity, StatusSnapshot};
use serde_json::Value;
use std::time::{Duration, Instant};

use crate::proxy::server::AppState;
use crate::proxy::status;

/// Bound on the upstream completion round trip.
pub const UPSTREAM_TIMEOUT: Duration = Duration::from_secs(120);

/// Fixed route suffix appended to the configured base URL.
const UPSTREAM_SUFFIX: &str = "chat/completions";

/// Cap on the upstream error body echoed back to the caller.
const ERROR_BODY_PREFIX: usize = 500;

/// Join the configured base URL with the completion suffix, with exactly one
/// separating slash regardless of how the base URL ends.
pub fn completions_url(base: &str) -> String {
    format!("{}/{UPSTREAM_SUFFIX}", base.trim_end_matches('/'))
}

/// `GET /api/state` - read-only status snapshot.
pub async fn handle_state(State(state): State<AppState>) -> Json<StatusSnapshot> {
    Json(status::collect(&state).await)
}

/// Fallback handler: any POST path is treated as a completion request and
/// forwarded upstream with a bearer token injected.
pub async fn handle_relay(State(state): State<AppState>, method: Method, body: Bytes) -> Response {
    if method != Method::POST {
        return (StatusCode::METHOD_NOT_ALLOWED, "relay accepts POST requests only")
            .into_response();
    }

    let request_json: Value = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(e) => {
            // Rejected before an id is assigned so recorded ids stay gap-free.
            state
                .monitor
                .add_event(
                    Severity::Error,
                    "Rejected request with invalid JSON",
                    Some(e.to_string()),
                )
                .await;
            return (StatusCode::BAD_REQUEST, "Invalid JSON").into_response();
        }
    };

    let model = request_json
        .get("model")
        .and_then(Value::as_str)
        .unwrap_or("unknown")
        .to_string();
    let messages_count =
        request_json.get("messages").and_then(Value::as_array).map_or(0, |m| m.len());
    let max_tokens = request_json.get("max_tokens").and_then(Value::as_u64);

    let id = state.monitor.begin_request(&model, messages_count, max_tokens).await;
    state.transcript.record_request(id, &request_json);
    state
        .monitor
        .add_event(
            Severity::Info,
            format!("API request #{id}"),
            Some(format!(
                "Model: {model}, Max tokens: {}",
                max_tokens.map_or_else(|| "not set".to_string(), |n| n.to_string())
            )),
        )
        .await;

    let token = match state.token_manager.get_token().await {
        Ok(token) => token,
        Err(e) => {
            let message = e.to_string();
            state
                .monitor
                .complete_request(id, RequestOutcome::AuthError { message: message.clone() })
                .await;
            state
                .monitor
                .add_event(Severity::Error, format!("Request #{id} failed"), Some(message.clone()))
                .await;
            state.transcript.record_error(id, &format!("No OAuth token available: {message}"));
            return (StatusCode::UNAUTHORIZED, format!("No OAuth token: {message}"))
                .into_response();
        }
    };

    let url = completions_url(&state.config.upstream_base_url);
    tracing::debug!("Forwarding request #{id} to {url}");
    let started = Instant::now();

    let upstream_response = state
        .upstream
        .post(&url)
        .bearer_auth(&token.access_token)
        .header(header::CONTENT_TYPE, "application/json")
        .body(body)
        .send()
        .await;

    let response = match upstream_response {
        Ok(response) => response,
        Err(e) => {
            let (status, message) = if e.is_timeout() {
                (
                    StatusCode::GATEWAY_TIMEOUT,
                    format!("Request timed out after {} seconds", UPSTREAM_TIMEOUT.as_secs()),
                )
            } else {
                (StatusCode::INTERNAL_SERVER_ERROR, format!("Request failed: {e}"))
            };
            return transport_failure(&state, id, status, message).await;
        }
    };

    let upstream_status = response.status().as_u16();
    if upstream_status != 200 {
        let body_text = response.text().await.unwrap_or_default();
        let message = format!("HTTP {upstream_status}: {}", prefix(&body_text, ERROR_BODY_PREFIX));
        state
            .monitor
            .complete_request(
                id,
                RequestOutcome::UpstreamError { status: upstream_status, message: message.clone() },
            )
            .await;
        state
            .monitor
            .add_event(Severity::Error, format!("Request #{id} failed"), Some(message.clone()))
            .await;
        state.transcript.record_error(id, &message);
        // Relay the upstream status unchanged.
        let status =
            StatusCode::from_u16(upstream_status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        return (status, message).into_response();
    }

    let response_bytes = match response.bytes().await {
        Ok(bytes) => bytes,
        Err(e) => {
            return transport_failure(
                &state,
                id,
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to read upstream response: {e}"),
            )
            .await;
        }
    };

    let response_json: Value = match serde_json::from_slice(&response_bytes) {
        Ok(v) => v,
        Err(_) => {
            let preview = String::from_utf8_lossy(&response_bytes);
            return transport_failure(
                &state,
                id,
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Invalid JSON response: {}", prefix(&preview, ERROR_BODY_PREFIX)),
            )
            .await;
        }
    };

    let elapsed = started.elapsed();
    let finish_reason = response_json
        .pointer("/choices/0/finish_reason")
        .and_then(Value::as_str)
        .unwrap_or("unknown")
        .to_string();
    let total_tokens = extract_total_tokens(&response_json);

    state
        .monitor
        .complete_request(
            id,
            RequestOutcome::Success {
                finish_reason: finish_reason.clone(),
                total_tokens,
                elapsed_ms: elapsed.as_millis() as u64,
            },
        )
        .await;

    let severity = if finish_reason == "stop" { Severity::Success } else { Severity::Warning };
    state
        .monitor
        .add_event(
            severity,
            format!("API response #{id} ({:.1}s)", elapsed.as_secs_f64()),
            Some(format!("Finish: {finish_reason}, Tokens: {total_tokens}")),
        )
        .await;
    if finish_reason == "length" {
        tracing::warn!("Request #{id}: response was cut off (finish_reason=length)");
        state
            .monitor
            .add_event(
                Severity::Warning,
                format!("Response #{id} truncated (finish_reason=length)"),
                Some("Consider increasing MAX_TOKENS".to_string()),
            )
            .await;
    }
    state.transcript.record_response(
        id,
        &response_json,
        &finish_reason,
        total_tokens,
        elapsed.as_secs_f64(),
    );

    // Relay the upstream body byte-for-byte.
    (StatusCode::OK, [(header::CONTENT_TYPE, "application/json")], response_bytes).into_response()
}

async fn transport_failure(
    state: &AppState,
    id: u64,
    status: StatusCode,
    message: String,
) -> Response {
    state
        .monitor
        .complete_request(id, RequestOutcome::TransportError { message: message.clone() })
        .await;
    let event = if status == StatusCode::GATEWAY_TIMEOUT {
        format!("Request #{id} timeout")
    } else {
        format!("Request #{id} failed")
    };
    state.monitor.add_event(Severity::Error, event, Some(message.clone())).await;
    state.transcript.record_error(id, &message);
    (status, message).into_response()
}

fn extract_total_tokens(response: &Value) -> u64 {
    if let Some(total) = response.pointer("/usage/total_tokens").and_then(Value::as_u64) {
        return total;
    }
    let prompt = response.pointer("/usage/prompt_tokens").and_then(Value::as_u64).unwrap_or(0);
    let completion =
        response.pointer("/usage/completion_tokens").and_then(Value::as_u64).unwrap_or(0);
    prompt + completion
}

fn prefix(text: &str, max_len: usize) -> String {
    if text.chars().count() <= max_len {
        return text.to_string();
    }
    text.chars().take(max_len).collect()
}

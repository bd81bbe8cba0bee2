//! Monitoring and status snapshot models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Severity of a monitor event.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
}

/// Append-only monitor event. Never mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventEntry {
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub severity: Severity,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Final disposition of a proxied request.
///
/// Attached to a [`RequestRecord`] exactly once after the upstream call
/// resolves; `Pending` is the only state an outcome may be replaced from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RequestOutcome {
    Pending,
    Success {
        finish_reason: String,
        total_tokens: u64,
        elapsed_ms: u64,
    },
    UpstreamError {
        #[serde(rename = "status_code")]
        status: u16,
        message: String,
    },
    TransportError {
        message: String,
    },
    AuthError {
        message: String,
    },
}

impl RequestOutcome {
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }

    /// Whether this outcome counts as an error for the stats counters.
    pub fn is_error(&self) -> bool {
        !matches!(self, Self::Pending | Self::Success { .. })
    }
}

/// One proxied request as seen by the monitor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RequestRecord {
    /// Monotonically increasing, gap-free request id.
    pub id: u64,
    pub timestamp: DateTime<Utc>,
    pub model: String,
    pub messages_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u64>,
    #[serde(flatten)]
    pub outcome: RequestOutcome,
}

/// Aggregate request counters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct RelayStats {
    pub request_count: u64,
    pub response_count: u64,
    pub error_count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_request_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_response_at: Option<DateTime<Utc>>,
}

/// Token lifecycle metadata for the status snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TokenStatus {
    pub state: super::credential::TokenState,
    pub refresh_count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_refresh: Option<DateTime<Utc>>,
    pub mock_mode: bool,
}

/// Read-only point-in-time view composed by the status aggregator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatusSnapshot {
    pub started_at: DateTime<Utc>,
    pub uptime_secs: u64,
    pub token: TokenStatus,
    pub stats: RelayStats,
    /// Most-recent-first.
    pub recent_requests: Vec<RequestRecord>,
    /// Most-recent-first.
    pub recent_events: Vec<EventEntry>,
    pub proxy_url: String,
    pub upstream_base_url: String,
    pub model_name: String,
    pub max_tokens: u32,
    pub log_file: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_error_classification() {
        assert!(!RequestOutcome::Pending.is_error());
        assert!(!RequestOutcome::Success {
            finish_reason: "stop".to_string(),
            total_tokens: 5,
            elapsed_ms: 10,
        }
        .is_error());
        assert!(RequestOutcome::AuthError { message: "no token".to_string() }.is_error());
        assert!(RequestOutcome::UpstreamError { status: 429, message: "busy".to_string() }
            .is_error());
        assert!(RequestOutcome::TransportError { message: "timeout".to_string() }.is_error());
    }

    #[test]
    fn record_serializes_with_flattened_outcome() {
        let record = RequestRecord {
            id: 7,
            timestamp: Utc::now(),
            model: "gpt-4-internal".to_string(),
            messages_count: 3,
            max_tokens: Some(2048),
            outcome: RequestOutcome::Success {
                finish_reason: "stop".to_string(),
                total_tokens: 42,
                elapsed_ms: 1500,
            },
        };
        let value = serde_json::to_value(&record).expect("serialize");
        assert_eq!(value["id"], 7);
        assert_eq!(value["status"], "success");
        assert_eq!(value["finish_reason"], "stop");
        assert_eq!(value["total_tokens"], 42);
    }

    #[test]
    fn severity_uses_snake_case_wire_names() {
        let entry = EventEntry {
            timestamp: Utc::now(),
            severity: Severity::Warning,
            message: "truncated".to_string(),
            details: None,
        };
        let value = serde_json::to_value(&entry).expect("serialize");
        assert_eq!(value["type"], "warning");
        assert!(value.get("details").is_none());
    }
}

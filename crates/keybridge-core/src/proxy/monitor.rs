//! Request monitoring and event logging.
//!
//! Two bounded rings behind their own locks: one ledger of proxied request
//! records (with the id counter and aggregate counters) and one event log.
//! Snapshots are point-in-time copies; no lock is held while a caller
//! serializes or iterates the result.

use chrono::{DateTime, Utc};
use keybridge_types::{EventEntry, RelayStats, RequestOutcome, RequestRecord, Severity};
use std::collections::VecDeque;
use std::time::Instant;
use tokio::sync::RwLock;

const MAX_REQUESTS: usize = 50;
const MAX_EVENTS: usize = 100;

struct RequestLedger {
    next_id: u64,
    entries: VecDeque<RequestRecord>,
    stats: RelayStats,
}

/// Shared monitor for proxied requests and lifecycle events.
pub struct RelayMonitor {
    started_at: DateTime<Utc>,
    start_instant: Instant,
    ledger: RwLock<RequestLedger>,
    events: RwLock<VecDeque<EventEntry>>,
    max_requests: usize,
    max_events: usize,
}

impl RelayMonitor {
    pub fn new() -> Self {
        Self::with_capacity(MAX_REQUESTS, MAX_EVENTS)
    }

    pub fn with_capacity(max_requests: usize, max_events: usize) -> Self {
        Self {
            started_at: Utc::now(),
            start_instant: Instant::now(),
            ledger: RwLock::new(RequestLedger {
                next_id: 0,
                entries: VecDeque::with_capacity(max_requests),
                stats: RelayStats::default(),
            }),
            events: RwLock::new(VecDeque::with_capacity(max_events)),
            max_requests,
            max_events,
        }
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn uptime_secs(&self) -> u64 {
        self.start_instant.elapsed().as_secs()
    }

    /// Append an event, evicting the oldest entry past capacity.
    pub async fn add_event(
        &self,
        severity: Severity,
        message: impl Into<String>,
        details: Option<String>,
    ) {
        let entry = EventEntry {
            timestamp: Utc::now(),
            severity,
            message: message.into(),
            details,
        };
        let mut events = self.events.write().await;
        if events.len() >= self.max_events {
            events.pop_front();
        }
        events.push_back(entry);
    }

    /// Register a newly accepted request and return its id.
    ///
    /// The id is taken from a counter incremented under the ledger write
    /// lock, so ids are strictly increasing and gap-free even when requests
    /// arrive concurrently.
    pub async fn begin_request(
        &self,
        model: impl Into<String>,
        messages_count: usize,
        max_tokens: Option<u64>,
    ) -> u64 {
        let mut ledger = self.ledger.write().await;
        ledger.next_id += 1;
        let id = ledger.next_id;

        ledger.stats.request_count += 1;
        ledger.stats.last_request_at = Some(Utc::now());

        if ledger.entries.len() >= self.max_requests {
            ledger.entries.pop_front();
        }
        ledger.entries.push_back(RequestRecord {
            id,
            timestamp: Utc::now(),
            model: model.into(),
            messages_count,
            max_tokens,
            outcome: RequestOutcome::Pending,
        });

        id
    }

    /// Attach the final outcome to a request.
    ///
    /// Counters are always updated; the record itself is only written while
    /// still `Pending` (an outcome is never overwritten) and may already have
    /// been evicted from the ring under sustained load.
    pub async fn complete_request(&self, id: u64, outcome: RequestOutcome) {
        debug_assert!(!outcome.is_pending());

        let mut ledger = self.ledger.write().await;
        if outcome.is_error() {
            ledger.stats.error_count += 1;
        } else {
            ledger.stats.response_count += 1;
            ledger.stats.last_response_at = Some(Utc::now());
        }

        if let Some(record) = ledger.entries.iter_mut().rev().find(|r| r.id == id) {
            if record.outcome.is_pending() {
                record.outcome = outcome;
            } else {
                tracing::warn!("Ignoring duplicate outcome for request #{id}");
            }
        }
    }

    pub async fn stats(&self) -> RelayStats {
        self.ledger.read().await.stats.clone()
    }

    /// Recorded requests, most recent first.
    pub async fn recent_requests(&self) -> Vec<RequestRecord> {
        let ledger = self.ledger.read().await;
        ledger.entries.iter().rev().cloned().collect()
    }

    /// Logged events, most recent first.
    pub async fn recent_events(&self) -> Vec<EventEntry> {
        let events = self.events.read().await;
        events.iter().rev().cloned().collect()
    }
}

impl Default for RelayMonitor {
    fn default() -> Self {
        Self::new()
    }
}

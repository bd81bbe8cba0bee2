//! Token store and lifecycle management.
//!
//! The manager owns the single cached credential, fetches replacements from
//! the OAuth endpoint (or synthesizes mock tokens), and runs the recurring
//! background refresh. Concurrent callers that find the cache expired or
//! empty join one shared fetch instead of issuing duplicate OAuth calls:
//! the in-flight fetch lives in a mutex-guarded slot as a shared future, and
//! every joiner receives the same credential or the same failure.

use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use keybridge_types::{Credential, OAuthConfig, Severity, TokenState};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;

use crate::error::{AppError, AppResult};
use crate::modules::oauth;
use crate::proxy::monitor::RelayMonitor;

// The error side must be Clone to travel through a shared future.
type FetchFlight = Shared<BoxFuture<'static, Result<Credential, String>>>;

struct TokenInner {
    oauth: OAuthConfig,
    http: reqwest::Client,
    store: RwLock<Option<Credential>>,
    inflight: Mutex<Option<FetchFlight>>,
    refresh_count: AtomicU64,
    last_refresh: RwLock<Option<DateTime<Utc>>>,
    monitor: Arc<RelayMonitor>,
}

/// Manages the cached OAuth credential for the relay.
///
/// Cheap to clone; all clones share the same store.
#[derive(Clone)]
pub struct TokenManager {
    inner: Arc<TokenInner>,
}

impl TokenManager {
    pub fn new(oauth: OAuthConfig, monitor: Arc<RelayMonitor>) -> AppResult<Self> {
        let http = oauth::build_client()?;
        Ok(Self {
            inner: Arc::new(TokenInner {
                oauth,
                http,
                store: RwLock::new(None),
                inflight: Mutex::new(None),
                refresh_count: AtomicU64::new(0),
                last_refresh: RwLock::new(None),
                monitor,
            }),
        })
    }

    /// Return a credential that is valid right now.
    ///
    /// The cached credential is returned as long as it has not expired (the
    /// early-refresh margin is already baked into `expires_at`). Otherwise
    /// the caller joins or starts the single fetch flight.
    pub async fn get_token(&self) -> AppResult<Credential> {
        let now = Utc::now().timestamp();
        if let Some(cred) = self.inner.store.read().await.clone() {
            if cred.is_valid_at(now) {
                return Ok(cred);
            }
        }
        self.run_fetch(true).await
    }

    /// Fetch and republish a fresh credential regardless of cache validity.
    ///
    /// Used by the background refresh cycle; a fetch already in flight
    /// counts as fresh and is joined instead of duplicated.
    pub async fn refresh_now(&self) -> AppResult<Credential> {
        self.run_fetch(false).await
    }

    /// Join the in-flight fetch or start a new one.
    ///
    /// With `reuse_fresh` set, the store is re-read under the slot lock
    /// before a new flight starts: a caller that observed an expired
    /// credential may land here after a concurrent flight has already
    /// published a replacement and cleared the slot, and must not trigger
    /// a second fetch.
    async fn run_fetch(&self, reuse_fresh: bool) -> AppResult<Credential> {
        let flight = {
            let mut slot = self.inner.inflight.lock().await;
            match slot.as_ref() {
                Some(flight) => flight.clone(),
                None => {
                    if reuse_fresh {
                        let now = Utc::now().timestamp();
                        if let Some(cred) = self.inner.store.read().await.clone() {
                            if cred.is_valid_at(now) {
                                return Ok(cred);
                            }
                        }
                    }
                    let inner = Arc::clone(&self.inner);
                    let flight = async move {
                        let result = oauth::fetch_token(&inner.http, &inner.oauth).await;
                        let result = match result {
                            Ok(cred) => {
                                // Atomic swap: readers see either the old or
                                // the new credential, never a torn one.
                                *inner.store.write().await = Some(cred.clone());
                                inner.refresh_count.fetch_add(1, Ordering::SeqCst);
                                *inner.last_refresh.write().await = Some(Utc::now());
                                Ok(cred)
                            }
                            Err(e) => Err(e.to_string()),
                        };
                        // Clear the slot so the next expiry starts a new
                        // flight; joiners already hold their own clone.
                        *inner.inflight.lock().await = None;
                        result
                    }
                    .boxed()
                    .shared();
                    *slot = Some(flight.clone());
                    flight
                }
            }
        };

        flight.await.map_err(AppError::OAuth)
    }

    /// Launch the recurring proactive refresh task.
    ///
    /// Failures are downgraded to warnings; the stale credential stays in use
    /// until a later refresh succeeds or `get_token` finds it expired. The
    /// task stops when the watch channel flips or its sender is dropped.
    pub fn spawn_background_refresh(
        &self,
        interval: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let manager = self.clone();
        tracing::info!("Token refresh task started (interval: {}s)", interval.as_secs());
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick fires immediately; the startup fetch already
            // happened, so skip it.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        manager
                            .monitor()
                            .add_event(Severity::Info, "Refreshing OAuth token (background)", None)
                            .await;
                        match manager.refresh_now().await {
                            Ok(cred) => {
                                let remaining = cred.remaining_secs(Utc::now().timestamp());
                                tracing::info!("OAuth token refreshed (valid for {remaining}s)");
                                manager
                                    .monitor()
                                    .add_event(
                                        Severity::Success,
                                        "OAuth token refreshed",
                                        Some(format!("Expires in {remaining}s")),
                                    )
                                    .await;
                            }
                            Err(e) => {
                                tracing::warn!("Background token refresh failed: {e}");
                                manager
                                    .monitor()
                                    .add_event(
                                        Severity::Warning,
                                        "Failed to refresh OAuth token",
                                        Some(e.to_string()),
                                    )
                                    .await;
                            }
                        }
                    }
                    _ = shutdown.changed() => break,
                }
            }
            tracing::info!("Token refresh task stopped");
        })
    }

    pub fn monitor(&self) -> &Arc<RelayMonitor> {
        &self.inner.monitor
    }

    pub fn mock_mode(&self) -> bool {
        self.inner.oauth.mock_mode
    }

    /// Successful fetches since startup.
    pub fn refresh_count(&self) -> u64 {
        self.inner.refresh_count.load(Ordering::SeqCst)
    }

    pub async fn last_refresh(&self) -> Option<DateTime<Utc>> {
        *self.inner.last_refresh.read().await
    }

    pub async fn token_state(&self) -> TokenState {
        let now = Utc::now().timestamp();
        match self.inner.store.read().await.as_ref() {
            None => TokenState::Missing,
            Some(cred) if cred.is_valid_at(now) => TokenState::Valid,
            Some(_) => TokenState::Expired,
        }
    }

    #[cfg(test)]
    pub(crate) async fn inject_credential(&self, cred: Credential) {
        *self.inner.store.write().await = Some(cred);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn mock_manager() -> TokenManager {
        let oauth = OAuthConfig { mock_mode: true, ..OAuthConfig::default() };
        TokenManager::new(oauth, Arc::new(RelayMonitor::new())).expect("manager")
    }

    fn real_manager(endpoint: String) -> TokenManager {
        let oauth = OAuthConfig {
            endpoint,
            client_id: "cid".to_string(),
            client_secret: "secret".to_string(),
            mock_mode: false,
        };
        TokenManager::new(oauth, Arc::new(RelayMonitor::new())).expect("manager")
    }

    fn token_body(token: &str) -> serde_json::Value {
        serde_json::json!({ "access_token": token, "expires_in": 3600 })
    }

    #[tokio::test]
    async fn mock_mode_is_deterministic() {
        let manager = mock_manager();
        let a = manager.get_token().await.expect("token");
        let b = manager.get_token().await.expect("token");
        assert_eq!(a.access_token, b.access_token);
        assert!(a.access_token.starts_with("mock_token_for_local_development_"));
    }

    #[tokio::test]
    async fn expired_credential_is_never_returned() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_body("fresh")))
            .expect(1)
            .mount(&server)
            .await;

        let manager = real_manager(server.uri());
        let now = Utc::now().timestamp();
        manager
            .inject_credential(Credential {
                access_token: "stale".to_string(),
                obtained_at: now - 7200,
                expires_at: now - 60,
            })
            .await;

        let cred = manager.get_token().await.expect("token");
        assert_eq!(cred.access_token, "fresh");
        assert_eq!(manager.token_state().await, TokenState::Valid);
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_fetch() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(token_body("shared"))
                    .set_delay(Duration::from_millis(100)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let manager = real_manager(server.uri());
        let mut handles = Vec::new();
        for _ in 0..20 {
            let manager = manager.clone();
            handles.push(tokio::spawn(async move { manager.get_token().await }));
        }

        for handle in handles {
            let cred = handle.await.expect("join").expect("token");
            assert_eq!(cred.access_token, "shared");
        }
        assert_eq!(manager.refresh_count(), 1);
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(500)
                    .set_body_string("boom")
                    .set_delay(Duration::from_millis(100)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let manager = real_manager(server.uri());
        let mut handles = Vec::new();
        for _ in 0..10 {
            let manager = manager.clone();
            handles.push(tokio::spawn(async move { manager.get_token().await }));
        }

        for handle in handles {
            let err = handle.await.expect("join").expect_err("must fail");
            assert!(err.to_string().contains("500"), "unexpected error: {err}");
        }
        assert_eq!(manager.refresh_count(), 0);
        assert_eq!(manager.token_state().await, TokenState::Missing);
    }

    #[tokio::test]
    async fn fetch_path_reuses_credential_published_by_a_completed_flight() {
        // Unroutable endpoint: any fetch attempt would fail the test.
        let manager = real_manager("http://127.0.0.1:1/token".to_string());
        let now = Utc::now().timestamp();
        manager
            .inject_credential(Credential {
                access_token: "published-by-peer".to_string(),
                obtained_at: now,
                expires_at: now + 600,
            })
            .await;

        // A caller that saw an expired credential can reach the fetch path
        // after a concurrent flight has published and cleared its slot; the
        // re-read under the slot lock must hand back the fresh credential.
        let cred = manager.run_fetch(true).await.expect("reuse");
        assert_eq!(cred.access_token, "published-by-peer");
        assert_eq!(manager.refresh_count(), 0);
    }

    #[tokio::test]
    async fn refresh_now_republishes_even_when_valid() {
        let manager = mock_manager();
        manager.get_token().await.expect("token");
        assert_eq!(manager.refresh_count(), 1);

        manager.refresh_now().await.expect("refresh");
        assert_eq!(manager.refresh_count(), 2);
        assert!(manager.last_refresh().await.is_some());
    }

    #[tokio::test]
    async fn background_refresh_ticks_and_stops() {
        let manager = mock_manager();
        let (tx, rx) = watch::channel(false);

        let handle = manager.spawn_background_refresh(Duration::from_millis(50), rx);
        tokio::time::sleep(Duration::from_millis(180)).await;

        let count = manager.refresh_count();
        assert!(count >= 2, "expected at least 2 refreshes, got {count}");

        tx.send(true).expect("signal");
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("task must stop after shutdown")
            .expect("join");

        let events = manager.monitor().recent_events().await;
        assert!(events
            .iter()
            .any(|e| e.severity == Severity::Success && e.message == "OAuth token refreshed"));
    }

    #[tokio::test]
    async fn refresh_failure_keeps_stale_credential() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("down"))
            .mount(&server)
            .await;

        let manager = real_manager(server.uri());
        let now = Utc::now().timestamp();
        manager
            .inject_credential(Credential {
                access_token: "still-good".to_string(),
                obtained_at: now,
                expires_at: now + 600,
            })
            .await;

        assert!(manager.refresh_now().await.is_err());
        // The stale-but-valid credential remains in use.
        let cred = manager.get_token().await.expect("token");
        assert_eq!(cred.access_token, "still-good");
        assert_eq!(manager.token_state().await, TokenState::Valid);
    }
}

//! Cached OAuth credential.

use serde::{Deserialize, Serialize};

/// An OAuth access token together with its lifetime bounds.
///
/// Credentials are replaced wholesale on every refresh; the token store never
/// mutates one in place. The early-refresh safety margin is already baked
/// into `expires_at` when the credential is built, so validity is a plain
/// comparison against the current time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Credential {
    /// Opaque bearer token.
    pub access_token: String,
    /// Unix timestamp (seconds) when the token was obtained.
    pub obtained_at: i64,
    /// Unix timestamp (seconds) past which the token must not be used.
    pub expires_at: i64,
}

impl Credential {
    /// Whether the credential may still be sent upstream at `now`.
    pub fn is_valid_at(&self, now: i64) -> bool {
        now < self.expires_at
    }

    /// Seconds of remaining lifetime at `now` (zero when expired).
    pub fn remaining_secs(&self, now: i64) -> i64 {
        (self.expires_at - now).max(0)
    }
}

/// Externally visible validity state of the token store.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TokenState {
    /// No credential has been fetched yet.
    Missing,
    /// A credential is cached and still valid.
    Valid,
    /// A credential is cached but past its expiry.
    Expired,
}

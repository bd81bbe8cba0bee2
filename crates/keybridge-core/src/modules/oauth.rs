//! OAuth2 client-credentials token fetching.
//!
//! One token endpoint, one grant type. In mock mode a deterministic
//! placeholder credential is synthesized without touching the network.

use chrono::Utc;
use keybridge_types::{Credential, OAuthConfig};
use serde::Deserialize;
use std::time::Duration;

use crate::error::{AppError, AppResult};

/// Bound on the token endpoint round trip.
pub const OAUTH_TIMEOUT: Duration = Duration::from_secs(30);

/// Fallback lifetime when the token response omits `expires_in`.
const DEFAULT_EXPIRES_IN_SECS: i64 = 3600;

/// Tokens are treated as expired this many seconds early so none expires
/// mid-flight on an upstream call.
pub const SAFETY_MARGIN_SECS: i64 = 60;

/// Nominal lifetime of a synthesized mock credential.
const MOCK_EXPIRES_IN_SECS: i64 = 86_400;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    expires_in: Option<i64>,
    #[allow(dead_code)]
    token_type: Option<String>,
}

/// Build a reqwest client with the OAuth timeout applied.
pub fn build_client() -> AppResult<reqwest::Client> {
    Ok(reqwest::Client::builder().timeout(OAUTH_TIMEOUT).build()?)
}

/// Fetch a credential from the configured token endpoint.
///
/// All failure modes (network, timeout, non-2xx, malformed JSON, missing
/// `access_token`) map to [`AppError::OAuth`]; callers decide how to react.
pub async fn fetch_token(client: &reqwest::Client, config: &OAuthConfig) -> AppResult<Credential> {
    if config.mock_mode {
        return Ok(mock_credential());
    }

    let response = client
        .post(&config.endpoint)
        .form(&[
            ("grant_type", "client_credentials"),
            ("client_id", config.client_id.as_str()),
            ("client_secret", config.client_secret.as_str()),
        ])
        .send()
        .await
        .map_err(|e| {
            if e.is_timeout() {
                AppError::OAuth(format!(
                    "token endpoint timed out after {}s",
                    OAUTH_TIMEOUT.as_secs()
                ))
            } else {
                AppError::OAuth(format!("token endpoint request failed: {e}"))
            }
        })?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(AppError::OAuth(format!(
            "token endpoint returned HTTP {}: {}",
            status.as_u16(),
            truncate(&body, 200)
        )));
    }

    let token: TokenResponse = response
        .json()
        .await
        .map_err(|e| AppError::OAuth(format!("malformed token response: {e}")))?;

    let access_token = token
        .access_token
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AppError::OAuth("no access_token in OAuth response".to_string()))?;

    let expires_in = token.expires_in.unwrap_or(DEFAULT_EXPIRES_IN_SECS);
    let now = Utc::now().timestamp();

    Ok(Credential {
        access_token,
        obtained_at: now,
        expires_at: now + expires_in - SAFETY_MARGIN_SECS,
    })
}

/// Deterministic placeholder credential for local testing.
pub fn mock_credential() -> Credential {
    let now = Utc::now().timestamp();
    Credential {
        access_token: format!("mock_token_for_local_development_{}", "x".repeat(50)),
        obtained_at: now,
        expires_at: now + MOCK_EXPIRES_IN_SECS - SAFETY_MARGIN_SECS,
    }
}

fn truncate(text: &str, max_len: usize) -> String {
    if text.chars().count() <= max_len {
        return text.to_string();
    }
    let mut s: String = text.chars().take(max_len).collect();
    s.push('…');
    s
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(endpoint: String) -> OAuthConfig {
        OAuthConfig {
            endpoint,
            client_id: "cid".to_string(),
            client_secret: "secret".to_string(),
            mock_mode: false,
        }
    }

    #[test]
    fn mock_credential_is_deterministic_and_well_formed() {
        let a = mock_credential();
        let b = mock_credential();
        assert_eq!(a.access_token, b.access_token);
        assert!(a.access_token.starts_with("mock_token_for_local_development_"));
        assert!(a.expires_at > a.obtained_at);
    }

    #[tokio::test]
    async fn mock_mode_never_hits_the_network() {
        // Unroutable endpoint: any network attempt would error out.
        let config = OAuthConfig {
            endpoint: "http://127.0.0.1:1/token".to_string(),
            mock_mode: true,
            ..OAuthConfig::default()
        };
        let client = build_client().expect("client");
        let cred = fetch_token(&client, &config).await.expect("mock fetch");
        assert!(cred.is_valid_at(Utc::now().timestamp()));
    }

    #[tokio::test]
    async fn fetch_parses_token_and_applies_margin() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=client_credentials"))
            .and(body_string_contains("client_id=cid"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "abc123",
                "expires_in": 600,
                "token_type": "Bearer"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = build_client().expect("client");
        let cred = fetch_token(&client, &test_config(format!("{}/token", server.uri())))
            .await
            .expect("fetch");

        assert_eq!(cred.access_token, "abc123");
        let lifetime = cred.expires_at - cred.obtained_at;
        assert_eq!(lifetime, 600 - SAFETY_MARGIN_SECS);
    }

    #[tokio::test]
    async fn missing_expires_in_defaults_to_one_hour() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "abc123"
            })))
            .mount(&server)
            .await;

        let client = build_client().expect("client");
        let cred = fetch_token(&client, &test_config(format!("{}/token", server.uri())))
            .await
            .expect("fetch");
        assert_eq!(cred.expires_at - cred.obtained_at, 3600 - SAFETY_MARGIN_SECS);
    }

    #[tokio::test]
    async fn missing_access_token_is_recoverable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "expires_in": 600
            })))
            .mount(&server)
            .await;

        let client = build_client().expect("client");
        let err = fetch_token(&client, &test_config(format!("{}/token", server.uri())))
            .await
            .expect_err("must fail");
        assert!(err.to_string().contains("no access_token"));
    }

    #[tokio::test]
    async fn non_2xx_maps_to_oauth_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("down for maintenance"))
            .mount(&server)
            .await;

        let client = build_client().expect("client");
        let err = fetch_token(&client, &test_config(format!("{}/token", server.uri())))
            .await
            .expect_err("must fail");
        let msg = err.to_string();
        assert!(msg.contains("503"), "unexpected message: {msg}");
    }
}

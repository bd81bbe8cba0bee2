//! Environment configuration.
//!
//! The entire configuration surface is read once at startup; there is no
//! hot-reload. Variable names match the original wrapper scripts so an
//! existing `.env` keeps working when exported into the environment.

use keybridge_types::{OAuthConfig, RelayConfig};
use std::path::PathBuf;

use crate::error::{AppError, AppResult};

const DEFAULT_PORT: u16 = 8889;
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_MODEL: &str = "gpt-4-internal";
const DEFAULT_MAX_TOKENS: u32 = 4096;
const DEFAULT_REFRESH_INTERVAL_SECS: u64 = 900;

/// Load the relay configuration from process environment variables.
pub fn load_config() -> AppResult<RelayConfig> {
    build_config(|name| std::env::var(name).ok())
}

fn build_config<F>(var: F) -> AppResult<RelayConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let mock_mode = var("MOCK_MODE")
        .map(|v| matches!(v.trim().to_lowercase().as_str(), "true" | "1" | "yes"))
        .unwrap_or(false);

    let upstream_base_url = var("LLM_API_BASE_URL")
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| AppError::Config("LLM_API_BASE_URL is not set".to_string()))?;
    validate_url("LLM_API_BASE_URL", &upstream_base_url)?;

    let oauth = if mock_mode {
        OAuthConfig { mock_mode: true, ..OAuthConfig::default() }
    } else {
        let endpoint = var("OAUTH_ENDPOINT")
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| AppError::Config("OAUTH_ENDPOINT is not set".to_string()))?;
        validate_url("OAUTH_ENDPOINT", &endpoint)?;

        OAuthConfig {
            endpoint,
            client_id: var("OAUTH_CLIENT_ID")
                .ok_or_else(|| AppError::Config("OAUTH_CLIENT_ID is not set".to_string()))?,
            client_secret: var("OAUTH_CLIENT_SECRET")
                .ok_or_else(|| AppError::Config("OAUTH_CLIENT_SECRET is not set".to_string()))?,
            mock_mode: false,
        }
    };

    let port = match var("KEYBRIDGE_PORT") {
        Some(raw) => raw
            .parse::<u16>()
            .map_err(|e| AppError::Config(format!("Invalid KEYBRIDGE_PORT '{raw}': {e}")))?,
        None => DEFAULT_PORT,
    };

    let refresh_interval_secs = match var("TOKEN_REFRESH_INTERVAL") {
        Some(raw) => {
            let secs = raw.parse::<u64>().map_err(|e| {
                AppError::Config(format!("Invalid TOKEN_REFRESH_INTERVAL '{raw}': {e}"))
            })?;
            if secs == 0 {
                return Err(AppError::Config(
                    "TOKEN_REFRESH_INTERVAL must be positive".to_string(),
                ));
            }
            secs
        }
        None => DEFAULT_REFRESH_INTERVAL_SECS,
    };

    let max_tokens = match var("MAX_TOKENS") {
        Some(raw) => raw
            .parse::<u32>()
            .map_err(|e| AppError::Config(format!("Invalid MAX_TOKENS '{raw}': {e}")))?,
        None => DEFAULT_MAX_TOKENS,
    };

    Ok(RelayConfig {
        host: var("KEYBRIDGE_HOST").unwrap_or_else(|| DEFAULT_HOST.to_string()),
        port,
        upstream_base_url,
        model_name: var("LLM_MODEL_NAME").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        max_tokens,
        oauth,
        refresh_interval_secs,
        log_dir: var("KEYBRIDGE_LOG_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("logs")),
    })
}

fn validate_url(name: &str, value: &str) -> AppResult<()> {
    url::Url::parse(value)
        .map_err(|e| AppError::Config(format!("{name} is not a valid URL ('{value}'): {e}")))?;
    Ok(())
}

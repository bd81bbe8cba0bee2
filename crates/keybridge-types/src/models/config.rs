//! Startup configuration models.
//!
//! Both structs are built once at startup (from the environment, see
//! `keybridge-core::modules::config`) and treated as immutable afterwards.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// OAuth2 client-credentials endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct OAuthConfig {
    /// Token endpoint URL.
    pub endpoint: String,
    pub client_id: String,
    pub client_secret: String,
    /// When set, tokens are synthesized locally and no network call is made.
    pub mock_mode: bool,
}

/// Full relay configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Address the relay listens on.
    pub host: String,
    pub port: u16,
    /// Base URL of the real completion endpoint (suffix `chat/completions`
    /// is appended per request).
    pub upstream_base_url: String,
    /// Model name advertised to the coding assistant.
    pub model_name: String,
    /// Declared completion budget, surfaced in the status snapshot.
    pub max_tokens: u32,
    pub oauth: OAuthConfig,
    /// Background token refresh period in seconds.
    pub refresh_interval_secs: u64,
    /// Directory for the per-process transcript file.
    pub log_dir: PathBuf,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8889,
            upstream_base_url: String::new(),
            model_name: "gpt-4-internal".to_string(),
            max_tokens: 4096,
            oauth: OAuthConfig::default(),
            refresh_interval_secs: 900,
            log_dir: PathBuf::from("logs"),
        }
    }
}

impl RelayConfig {
    /// Local URL the coding assistant should point at.
    pub fn proxy_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

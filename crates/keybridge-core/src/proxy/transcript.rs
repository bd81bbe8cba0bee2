//! Durable request transcript.
//!
//! One append-only file per process start, holding a human-readable record
//! of every proxied request, response, and error. Meant for offline
//! debugging, not machine parsing. Write failures are logged and never fail
//! the request that triggered them.

use chrono::Local;
use parking_lot::Mutex;
use serde_json::Value;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::AppResult;

const SEPARATOR: &str =
    "================================================================================";

/// Cap on the response body echoed into the transcript.
const RESPONSE_BODY_LIMIT: usize = 2000;

pub struct Transcript {
    path: PathBuf,
    file: Mutex<File>,
}

impl Transcript {
    /// Create the per-process transcript file, keyed by the start time.
    pub fn create(log_dir: &Path) -> AppResult<Self> {
        std::fs::create_dir_all(log_dir)?;
        let stamp = Local::now().format("%Y%m%d_%H%M%S");
        let path = log_dir.join(format!("proxy_requests_{stamp}.log"));
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        tracing::info!("Proxy transcript: {}", path.display());
        Ok(Self { path, file: Mutex::new(file) })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn record_request(&self, id: u64, body: &Value) {
        let time = Local::now().format("%H:%M:%S");
        let model = body.get("model").and_then(|v| v.as_str()).unwrap_or("unknown");
        let messages = body.get("messages").and_then(|v| v.as_array()).map_or(0, |m| m.len());
        let max_tokens = body
            .get("max_tokens")
            .and_then(|v| v.as_u64())
            .map_or_else(|| "not set".to_string(), |n| n.to_string());
        let pretty = serde_json::to_string_pretty(body).unwrap_or_else(|_| body.to_string());

        self.append(format!(
            "\n{SEPARATOR}\nREQUEST #{id} at {time}\n{SEPARATOR}\n\
             Model: {model}\nMax Tokens: {max_tokens}\nMessages: {messages}\n\n\
             Full Request:\n{pretty}\n"
        ));
    }

    pub fn record_response(
        &self,
        id: u64,
        body: &Value,
        finish_reason: &str,
        total_tokens: u64,
        elapsed_secs: f64,
    ) {
        let time = Local::now().format("%H:%M:%S");
        let pretty = serde_json::to_string_pretty(body).unwrap_or_else(|_| body.to_string());
        let truncated: String = pretty.chars().take(RESPONSE_BODY_LIMIT).collect();

        self.append(format!(
            "\nRESPONSE #{id} at {time} (took {elapsed_secs:.2}s)\n{SEPARATOR}\n\
             Finish Reason: {finish_reason}\nTotal Tokens: {total_tokens}\n\n\
             Full Response:\n{truncated}\n"
        ));
        if finish_reason == "length" {
            self.append(format!(
                "\nWARNING #{id}: response was cut off (finish_reason=length)\n"
            ));
        }
    }

    pub fn record_error(&self, id: u64, message: &str) {
        let time = Local::now().format("%H:%M:%S");
        self.append(format!("\nERROR #{id} at {time}\n{SEPARATOR}\n{message}\n"));
    }

    fn append(&self, block: String) {
        let mut file = self.file.lock();
        if let Err(e) = file.write_all(block.as_bytes()) {
            tracing::warn!("Failed to append to transcript {}: {}", self.path.display(), e);
        }
    }
}

//! # Keybridge Core
//!
//! Core logic for the Keybridge relay.
//!
//! ```text
//! keybridge-core/src/
//! ├── modules/
//! │   ├── config.rs        # Env-style configuration, read once at startup
//! │   └── oauth.rs         # OAuth2 client-credentials fetch + mock tokens
//! └── proxy/
//!     ├── token_manager.rs # Token store, single-flight fetch, background refresh
//!     ├── monitor.rs       # Bounded rings for request records and events
//!     ├── transcript.rs    # Durable per-process request log file
//!     ├── status.rs        # Read-only status snapshot
//!     ├── handlers.rs      # Forwarding + state handlers
//!     └── server.rs        # AppState, router, graceful serve
//! ```
//!
//! The relay sits between a CLI coding assistant and an enterprise LLM
//! endpoint: every outbound call carries a valid OAuth bearer token, every
//! request/response pair is logged, and `/api/state` exposes a live snapshot.

pub mod error;
pub mod modules;
pub mod proxy;

pub use error::{AppError, AppResult};
pub use proxy::monitor::RelayMonitor;
pub use proxy::server::{AppState, RelayServer};
pub use proxy::token_manager::TokenManager;

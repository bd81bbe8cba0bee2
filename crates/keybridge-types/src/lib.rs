//! # Keybridge Types
//!
//! Shared models for the Keybridge relay.
//!
//! This crate sits at the bottom of the dependency graph and carries the
//! serde-serializable types exchanged between the core logic, the HTTP API,
//! and external consumers of the `/api/state` snapshot:
//!
//! - **`models::credential`** - cached OAuth credential and its validity state
//! - **`models::config`** - startup configuration (relay + OAuth endpoints)
//! - **`models::stats`** - request records, event log entries, status snapshot
//!
//! All types are `Clone` for cheap sharing across async boundaries and
//! serializable via serde for the API surface.

pub mod models;

pub use models::config::{OAuthConfig, RelayConfig};
pub use models::credential::{Credential, TokenState};
pub use models::stats::{
    EventEntry, RelayStats, RequestOutcome, RequestRecord, Severity, StatusSnapshot, TokenStatus,
};

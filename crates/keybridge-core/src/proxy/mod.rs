//! Forwarding proxy and its supporting state.

pub mod handlers;
pub mod monitor;
pub mod server;
pub mod status;
pub mod token_manager;
pub mod transcript;

pub use monitor::RelayMonitor;
pub use server::{AppState, RelayServer};
pub use token_manager::TokenManager;
pub use transcript::Transcript;

//! Domain models.

pub mod config;
pub mod credential;
pub mod stats;

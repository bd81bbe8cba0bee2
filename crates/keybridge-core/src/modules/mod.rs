//! Supporting modules (configuration, OAuth client).

pub mod config;
pub mod oauth;

#![deny(clippy::mod_module_files)]
//! Watches the IPA listing of each release branch and notifies downstream
//! repositories exactly once per new version.

pub mod branch;
pub mod checker;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod fingerprint;
pub mod listing;
pub mod logging;
pub mod storage;

#[cfg(test)]
mod test_server;

/// Sent with every outbound request
pub const USER_AGENT: &str = concat!("dipa-auto/", env!("CARGO_PKG_VERSION"));

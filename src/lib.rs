//! Torpool - Rotating Tor proxy cluster
//!
//! Runs multiple independent Tor instances and periodically switches each
//! one's circuit identity, so client tooling can treat the cluster as a
//! pool of rotating-IP SOCKS proxies.
//!
//! ## Features
//!
//! - Deterministic per-instance data directories and port pairs
//! - Sequential, fail-fast process launch with bootstrap readiness checks
//! - Coordinated circuit switches on a fixed schedule
//! - File-sentinel stop protocol with ordered teardown and grace period
//! - Optional SOCKS endpoint list output for downstream clients

pub mod cluster;
pub mod config;
pub mod control;
pub mod error;
pub mod scheduler;
pub mod sentinel;
pub mod shutdown;

pub use config::Config;
pub use error::{Result, TorPoolError};

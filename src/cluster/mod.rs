//! Cluster state on disk and under supervision
//!
//! Per-instance directory allocation, tor process supervision, and the
//! SOCKS endpoint list output.

pub mod allocator;
pub mod endpoints;
pub mod supervisor;

pub use allocator::InstanceLayout;
pub use supervisor::{TorLauncher, TorProcess};

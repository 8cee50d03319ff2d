//! Tor control-port sessions
//!
//! The orchestration code only sees the [`ControlSession`] capability:
//! authenticate on attach, ask whether a circuit switch is currently
//! permitted, request one, close. The wire client lives in [`client`].

mod client;

pub use client::TorControlSession;

use async_trait::async_trait;

use crate::config::Config;
use crate::error::Result;

/// Capability surface of one authenticated control connection
#[async_trait]
pub trait ControlSession: Send {
    /// Whether a NEWNYM request would currently be accepted
    ///
    /// Tor rate-limits identity switches; an unavailable instance is
    /// simply skipped for the current cycle.
    fn newnym_available(&self) -> bool;

    /// Request a fresh circuit identity
    async fn rotate(&mut self) -> Result<()>;

    /// Close the session; repeated calls are no-ops
    async fn close(&mut self) -> Result<()>;
}

/// Attach to every instance's control port in index order
///
/// Fail-fast: the first unreachable port or rejected handshake aborts
/// the whole batch, mirroring the launch policy.
pub async fn attach_all(config: &Config) -> Result<Vec<Box<dyn ControlSession>>> {
    let mut sessions: Vec<Box<dyn ControlSession>> =
        Vec::with_capacity(config.instance_count as usize);
    for n in 0..config.instance_count {
        let session = TorControlSession::attach(&config.control_addr(n)).await?;
        sessions.push(Box::new(session));
    }
    Ok(sessions)
}

//! Ordered cluster teardown
//!
//! Closing the control sessions severs the ownership link; the tor
//! processes then persist state and exit on their own, which is what the
//! unconditional grace period is for. Directory and sentinel reclamation
//! runs afterwards, and also after failed startups, so a bad run never
//! leaves instance state behind.

use std::time::Duration;

use tracing::{info, warn};

use crate::cluster::InstanceLayout;
use crate::control::ControlSession;
use crate::error::Result;
use crate::sentinel::StopSentinel;

/// Executes the shutdown half of the stop protocol
pub struct ShutdownCoordinator {
    exit_timeout: Duration,
}

impl ShutdownCoordinator {
    pub fn new(exit_timeout_secs: u64) -> Self {
        Self {
            exit_timeout: Duration::from_secs(exit_timeout_secs),
        }
    }

    /// Close every session in index order, then wait the exit grace period
    ///
    /// Close failures are logged, not propagated: the peer may already be
    /// gone, and teardown must keep going either way.
    pub async fn close_sessions(&self, sessions: &mut [Box<dyn ControlSession>]) {
        for (n, session) in sessions.iter_mut().enumerate() {
            if let Err(e) = session.close().await {
                warn!("Instance {}: control close failed: {}", n, e);
            }
        }

        info!(
            "Waiting {}s for tor processes to exit",
            self.exit_timeout.as_secs()
        );
        tokio::time::sleep(self.exit_timeout).await;
    }

    /// Reclaim every instance directory and the stop marker
    ///
    /// Covers all `count` instances whether or not they ever launched;
    /// safe to run repeatedly.
    pub fn reclaim(
        &self,
        layout: &InstanceLayout,
        count: u16,
        sentinel: &StopSentinel,
    ) -> Result<()> {
        layout.clean_all(count)?;
        sentinel.clear()?;
        Ok(())
    }
}

//! Coordinated identity rotation
//!
//! One cooperative loop drives the whole cluster: poll the stop flag,
//! broadcast NEWNYM when the schedule is due, sleep one tick. There is
//! no internal parallelism across instances; broadcasts run in strictly
//! increasing index order.

use std::time::Duration;

use tracing::{debug, info};

use crate::control::ControlSession;
use crate::error::Result;
use crate::sentinel::StopFlag;

/// Drives periodic circuit switches across all instances
pub struct RotationScheduler {
    switch_delay: u64,
    tick: Duration,
}

impl RotationScheduler {
    /// Scheduler with the standard one-second tick
    pub fn new(switch_delay: u64) -> Self {
        Self::with_tick(switch_delay, Duration::from_secs(1))
    }

    /// Scheduler with a custom tick duration
    pub fn with_tick(switch_delay: u64, tick: Duration) -> Self {
        Self { switch_delay, tick }
    }

    /// Run until the stop flag is observed
    ///
    /// The flag is polled once per tick before the rotation check, so a
    /// stop request is honored within one tick regardless of how much of
    /// the switch delay has accumulated. Rotation failures propagate;
    /// the loop has no retry logic.
    pub async fn run(
        &self,
        sessions: &mut [Box<dyn ControlSession>],
        stop: &dyn StopFlag,
    ) -> Result<()> {
        self.drive(sessions, stop, 0).await
    }

    async fn drive(
        &self,
        sessions: &mut [Box<dyn ControlSession>],
        stop: &dyn StopFlag,
        mut elapsed: u64,
    ) -> Result<()> {
        loop {
            if stop.is_set() {
                info!("Stop requested, leaving rotation loop");
                return Ok(());
            }

            if elapsed >= self.switch_delay {
                self.broadcast(sessions).await?;
                // Subtract instead of resetting: any surplus from a slow
                // tick carries into the next window, keeping the cadence
                // at one broadcast per switch_delay ticks.
                elapsed -= self.switch_delay;
            }

            elapsed += 1;
            tokio::time::sleep(self.tick).await;
        }
    }

    /// Signal every instance in index order, skipping rate-limited ones
    async fn broadcast(&self, sessions: &mut [Box<dyn ControlSession>]) -> Result<()> {
        for (n, session) in sessions.iter_mut().enumerate() {
            if !session.newnym_available() {
                debug!("Instance {}: NEWNYM rate-limited, skipping this cycle", n);
                continue;
            }
            session.rotate().await?;
            info!("Switched circuit for instance {}", n);
        }
        Ok(())
    }
}

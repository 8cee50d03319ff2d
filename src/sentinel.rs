//! Stop sentinel
//!
//! A marker file whose mere existence tells a running cluster to shut
//! down. A separate `--stop` invocation creates it; the orchestrator that
//! owns the scheduler polls for it and removes it once teardown finishes,
//! restoring a startable state.

use std::path::{Path, PathBuf};

use crate::error::Result;

/// Well-known stop marker file name
pub const STOP_FILE_NAME: &str = ".stop";

/// Observable stop condition for the rotation scheduler
///
/// The scheduler only sees this trait, so tests can drive the loop
/// without touching the filesystem.
pub trait StopFlag: Send + Sync {
    fn is_set(&self) -> bool;
}

/// Filesystem-backed stop flag shared between the stop requester and the
/// running orchestrator
#[derive(Debug, Clone)]
pub struct StopSentinel {
    path: PathBuf,
}

impl StopSentinel {
    pub fn new(base_dir: &Path) -> Self {
        Self {
            path: base_dir.join(STOP_FILE_NAME),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create the marker, signalling a separately running cluster to stop
    pub fn request(&self) -> Result<()> {
        std::fs::write(&self.path, b"x")?;
        Ok(())
    }

    /// Remove the marker if present; absence is not an error
    pub fn clear(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

impl StopFlag for StopSentinel {
    fn is_set(&self) -> bool {
        self.path.exists()
    }
}

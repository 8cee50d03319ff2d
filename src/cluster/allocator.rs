//! Per-instance data directory allocation
//!
//! Directory names are deterministic in the instance index. Instances
//! never resume prior state: preparing a directory wipes whatever a
//! previous run (or crash) left at the same path.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::Result;

/// Prefix of per-instance data directories
pub const DATA_DIR_PREFIX: &str = ".tor-";

/// Maps instance indices to data directories under a base directory
#[derive(Debug, Clone)]
pub struct InstanceLayout {
    base_dir: PathBuf,
}

impl InstanceLayout {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Data directory of instance `n`
    pub fn data_dir(&self, n: u16) -> PathBuf {
        self.base_dir.join(format!("{}{}", DATA_DIR_PREFIX, n))
    }

    /// Recreate the instance directory empty and return its path
    pub fn prepare(&self, n: u16) -> Result<PathBuf> {
        let dir = self.data_dir(n);
        remove_dir_if_present(&dir)?;
        std::fs::create_dir_all(&dir)?;
        debug!("Prepared data directory {}", dir.display());
        Ok(dir)
    }

    /// Remove the instance directory; absence is not an error
    pub fn clean(&self, n: u16) -> Result<()> {
        remove_dir_if_present(&self.data_dir(n))
    }

    /// Remove every instance directory in index order
    ///
    /// Applied to all `count` directories regardless of which instances
    /// actually got off the ground; safe to repeat.
    pub fn clean_all(&self, count: u16) -> Result<()> {
        for n in 0..count {
            self.clean(n)?;
        }
        Ok(())
    }
}

fn remove_dir_if_present(dir: &Path) -> Result<()> {
    match std::fs::remove_dir_all(dir) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_data_dirs_distinct() {
        let layout = InstanceLayout::new("/work");

        let dirs: HashSet<_> = (0..16).map(|n| layout.data_dir(n)).collect();
        assert_eq!(dirs.len(), 16);
        assert_eq!(layout.data_dir(0), PathBuf::from("/work/.tor-0"));
        assert_eq!(layout.data_dir(3), PathBuf::from("/work/.tor-3"));
    }

    #[test]
    fn test_prepare_creates_empty_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = InstanceLayout::new(tmp.path());

        let dir = layout.prepare(0).unwrap();
        assert!(dir.is_dir());
        assert_eq!(std::fs::read_dir(&dir).unwrap().count(), 0);
    }

    #[test]
    fn test_prepare_wipes_previous_state() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = InstanceLayout::new(tmp.path());

        let dir = layout.prepare(1).unwrap();
        std::fs::write(dir.join("cached-descriptors"), b"stale").unwrap();

        let dir = layout.prepare(1).unwrap();
        assert_eq!(std::fs::read_dir(&dir).unwrap().count(), 0);
    }

    #[test]
    fn test_clean_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = InstanceLayout::new(tmp.path());

        layout.prepare(0).unwrap();
        layout.clean(0).unwrap();
        layout.clean(0).unwrap();
        assert!(!layout.data_dir(0).exists());
    }

    #[test]
    fn test_clean_all_removes_every_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = InstanceLayout::new(tmp.path());

        // Only some instances ever got a directory; clean_all must still
        // cover the full range without error.
        layout.prepare(0).unwrap();
        layout.prepare(2).unwrap();

        layout.clean_all(4).unwrap();
        for n in 0..4 {
            assert!(!layout.data_dir(n).exists());
        }

        // Second pass over already-clean state is error-free.
        layout.clean_all(4).unwrap();
    }
}

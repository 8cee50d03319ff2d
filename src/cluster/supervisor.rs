//! Tor process supervision
//!
//! Launches one tor process per instance and blocks until it reports
//! readiness on stdout. Launches are sequential by index; the first
//! failure aborts the whole startup sequence.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStdout, Command};
use tokio::time::timeout;
use tracing::{debug, info};

use crate::cluster::allocator::InstanceLayout;
use crate::config::Config;
use crate::error::{Result, TorPoolError};

/// Line tor prints once its initial circuit bootstrap is complete
pub const BOOTSTRAP_DONE: &str = "Bootstrapped 100%";

/// Default time allowed for a single instance to bootstrap
const DEFAULT_LAUNCH_TIMEOUT: Duration = Duration::from_secs(90);

/// A supervised tor process
///
/// The handle owns the child exclusively until shutdown. The process is
/// told who its owning controller is, so it exits on its own when this
/// orchestrator goes away; `kill_on_drop` is the backstop.
#[derive(Debug)]
pub struct TorProcess {
    pub index: u16,
    pub proxy_port: u16,
    child: Child,
}

impl TorProcess {
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }
}

/// Launches tor instances from a shared executable path
pub struct TorLauncher {
    executable: PathBuf,
    launch_timeout: Duration,
}

impl TorLauncher {
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self::with_timeout(executable, DEFAULT_LAUNCH_TIMEOUT)
    }

    pub fn with_timeout(executable: impl Into<PathBuf>, launch_timeout: Duration) -> Self {
        Self {
            executable: executable.into(),
            launch_timeout,
        }
    }

    /// Launch a single instance and wait for it to bootstrap
    pub async fn launch(
        &self,
        index: u16,
        data_dir: &Path,
        proxy_port: u16,
        control_port: u16,
    ) -> Result<TorProcess> {
        info!("Run Tor proxy on port {}", proxy_port);

        let mut child = Command::new(&self.executable)
            .arg("--DataDirectory")
            .arg(data_dir)
            .arg("--SocksPort")
            .arg(proxy_port.to_string())
            .arg("--ControlPort")
            .arg(control_port.to_string())
            .arg("--__OwningControllerProcess")
            .arg(std::process::id().to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                TorPoolError::Launch(format!(
                    "cannot start {}: {}",
                    self.executable.display(),
                    e
                ))
            })?;

        let stdout = child.stdout.take().ok_or_else(|| {
            TorPoolError::Launch(format!("instance {}: no stdout pipe", index))
        })?;

        let stdout = match timeout(self.launch_timeout, wait_for_bootstrap(index, stdout)).await
        {
            Ok(Ok(stdout)) => stdout,
            Ok(Err(e)) => return Err(e),
            Err(_) => {
                return Err(TorPoolError::Launch(format!(
                    "instance {}: no bootstrap within {}s",
                    index,
                    self.launch_timeout.as_secs()
                )))
            }
        };

        // Keep draining stdout so the child never blocks on a full pipe.
        tokio::spawn(drain_stdout(index, stdout));

        debug!("Instance {} bootstrapped (pid {:?})", index, child.id());
        Ok(TorProcess {
            index,
            proxy_port,
            child,
        })
    }

    /// Launch every instance sequentially by index
    ///
    /// Each instance gets a freshly wiped data directory. Aborts on the
    /// first failure; directories already created are reclaimed by the
    /// caller's teardown.
    pub async fn launch_all(
        &self,
        config: &Config,
        layout: &InstanceLayout,
    ) -> Result<Vec<TorProcess>> {
        let mut processes = Vec::with_capacity(config.instance_count as usize);
        for n in 0..config.instance_count {
            let data_dir = layout.prepare(n)?;
            let process = self
                .launch(n, &data_dir, config.proxy_port(n), config.control_port(n))
                .await?;
            processes.push(process);
        }
        Ok(processes)
    }
}

/// Read child stdout until the bootstrap-complete line appears
async fn wait_for_bootstrap(
    index: u16,
    stdout: ChildStdout,
) -> Result<BufReader<ChildStdout>> {
    let mut reader = BufReader::new(stdout);
    let mut line = String::new();
    loop {
        line.clear();
        let n = reader.read_line(&mut line).await?;
        if n == 0 {
            return Err(TorPoolError::Launch(format!(
                "instance {}: tor exited before completing bootstrap",
                index
            )));
        }
        let line = line.trim_end();
        debug!("Instance {} tor: {}", index, line);
        if line.contains(BOOTSTRAP_DONE) {
            return Ok(reader);
        }
    }
}

async fn drain_stdout(index: u16, mut reader: BufReader<ChildStdout>) {
    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) | Err(_) => break,
            Ok(_) => debug!("Instance {} tor: {}", index, line.trim_end()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    /// Write an executable stand-in for tor that prints `lines` and then
    /// sleeps, ignoring the usual tor arguments.
    fn fake_tor(dir: &Path, lines: &str, then_sleep: bool) -> PathBuf {
        let path = dir.join("fake-tor");
        let tail = if then_sleep { "sleep 60\n" } else { "" };
        std::fs::write(&path, format!("#!/bin/sh\n{}\n{}", lines, tail)).unwrap();
        let mut perms = std::fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&path, perms).unwrap();
        path
    }

    #[tokio::test]
    async fn test_launch_waits_for_bootstrap() {
        let tmp = tempfile::tempdir().unwrap();
        let exe = fake_tor(
            tmp.path(),
            "echo 'Bootstrapped 10%: Connecting'\necho 'Bootstrapped 100%: Done'",
            true,
        );

        let launcher = TorLauncher::with_timeout(&exe, Duration::from_secs(5));
        let process = launcher
            .launch(0, tmp.path(), 5100, 5200)
            .await
            .unwrap();
        assert_eq!(process.index, 0);
        assert_eq!(process.proxy_port, 5100);
        assert!(process.id().is_some());
    }

    #[tokio::test]
    async fn test_launch_fails_on_early_exit() {
        let tmp = tempfile::tempdir().unwrap();
        let exe = fake_tor(tmp.path(), "echo 'failed to bind'", false);

        let launcher = TorLauncher::with_timeout(&exe, Duration::from_secs(5));
        let err = launcher
            .launch(0, tmp.path(), 5100, 5200)
            .await
            .unwrap_err();
        assert!(matches!(err, TorPoolError::Launch(_)));
    }

    #[tokio::test]
    async fn test_launch_fails_on_timeout() {
        let tmp = tempfile::tempdir().unwrap();
        let exe = fake_tor(tmp.path(), "", true);

        let launcher = TorLauncher::with_timeout(&exe, Duration::from_millis(200));
        let err = launcher
            .launch(0, tmp.path(), 5100, 5200)
            .await
            .unwrap_err();
        assert!(matches!(err, TorPoolError::Launch(_)));
    }

    #[tokio::test]
    async fn test_launch_fails_on_missing_executable() {
        let tmp = tempfile::tempdir().unwrap();
        let launcher = TorLauncher::new(tmp.path().join("no-such-tor"));

        let err = launcher
            .launch(0, tmp.path(), 5100, 5200)
            .await
            .unwrap_err();
        assert!(matches!(err, TorPoolError::Launch(_)));
        assert!(err.is_startup_error());
    }

    #[tokio::test]
    async fn test_launch_all_prepares_directories() {
        let tmp = tempfile::tempdir().unwrap();
        let exe = fake_tor(tmp.path(), "echo 'Bootstrapped 100%'", true);
        let layout = InstanceLayout::new(tmp.path());
        let config = Config {
            tor_executable: exe.clone(),
            instance_count: 2,
            base_dir: tmp.path().to_path_buf(),
            ..Config::default()
        };

        let launcher = TorLauncher::with_timeout(&exe, Duration::from_secs(5));
        let processes = launcher.launch_all(&config, &layout).await.unwrap();

        assert_eq!(processes.len(), 2);
        assert!(layout.data_dir(0).is_dir());
        assert!(layout.data_dir(1).is_dir());
        assert_eq!(processes[1].proxy_port, 5101);
    }
}

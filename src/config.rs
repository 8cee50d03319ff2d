//! Cluster configuration
//!
//! Built-in defaults, merged with an optional `torpool.toml` file and
//! command-line flag overrides.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Result, TorPoolError};

/// Well-known configuration file name, looked up in the working directory
pub const CONFIG_FILE_NAME: &str = "torpool.toml";

/// Cluster configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the tor executable
    pub tor_executable: PathBuf,
    /// Number of tor instances to run
    pub instance_count: u16,
    /// Seconds between coordinated circuit switches
    pub switch_delay: u64,
    /// SOCKS port of instance 0; instance n listens on base + n
    pub base_proxy_port: u16,
    /// Control port of instance 0; instance n listens on base + n
    pub base_control_port: u16,
    /// Optional output file listing the SOCKS endpoints
    pub proxy_list: Option<PathBuf>,
    /// Grace period in seconds after closing control sessions
    pub exit_timeout: u64,
    /// Working directory holding instance state and the stop marker
    pub base_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tor_executable: PathBuf::from("tor/tor"),
            instance_count: 4,
            switch_delay: 300,
            base_proxy_port: 5100,
            base_control_port: 5200,
            proxy_list: None,
            exit_timeout: 5,
            base_dir: PathBuf::from("."),
        }
    }
}

/// On-disk configuration file contents
///
/// Every field is optional; anything absent keeps its default.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    pub tor: Option<PathBuf>,
    pub count: Option<u16>,
    pub switch_delay: Option<u64>,
    pub port_proxy: Option<u16>,
    pub port_control: Option<u16>,
    pub proxies: Option<PathBuf>,
    pub exit_timeout: Option<u64>,
}

impl Config {
    /// Load configuration from `torpool.toml` under `base_dir`, if present
    pub fn load(base_dir: &Path) -> Result<Self> {
        let mut config = Config {
            base_dir: base_dir.to_path_buf(),
            ..Config::default()
        };

        let path = base_dir.join(CONFIG_FILE_NAME);
        if path.exists() {
            let raw = std::fs::read_to_string(&path)?;
            let file: ConfigFile = toml::from_str(&raw).map_err(|e| {
                TorPoolError::InvalidConfig(format!("{}: {}", path.display(), e))
            })?;
            config.apply_file(file);
        }

        Ok(config)
    }

    /// Apply values from a configuration file over the current settings
    pub fn apply_file(&mut self, file: ConfigFile) {
        if let Some(tor) = file.tor {
            self.tor_executable = tor;
        }
        if let Some(count) = file.count {
            self.instance_count = count;
        }
        if let Some(delay) = file.switch_delay {
            self.switch_delay = delay;
        }
        if let Some(port) = file.port_proxy {
            self.base_proxy_port = port;
        }
        if let Some(port) = file.port_control {
            self.base_control_port = port;
        }
        if let Some(list) = file.proxies {
            self.proxy_list = Some(list);
        }
        if let Some(timeout) = file.exit_timeout {
            self.exit_timeout = timeout;
        }
    }

    /// Validate port arithmetic and instance count
    ///
    /// All `2 * count` ports must be distinct by construction, so the two
    /// port ranges may not overlap and must fit in u16.
    pub fn validate(&self) -> Result<()> {
        if self.instance_count == 0 {
            return Err(TorPoolError::InvalidConfig(
                "instance count must be at least 1".into(),
            ));
        }

        let last = self.instance_count - 1;
        if self.base_proxy_port.checked_add(last).is_none() {
            return Err(TorPoolError::InvalidConfig(
                "proxy port range exceeds 65535".into(),
            ));
        }
        if self.base_control_port.checked_add(last).is_none() {
            return Err(TorPoolError::InvalidConfig(
                "control port range exceeds 65535".into(),
            ));
        }

        // Widen before the range comparison so bases near 65535 cannot wrap.
        let proxy = self.base_proxy_port as u32;
        let control = self.base_control_port as u32;
        let count = self.instance_count as u32;
        if proxy < control + count && control < proxy + count {
            return Err(TorPoolError::InvalidConfig(format!(
                "proxy ports {}..{} overlap control ports {}..{}",
                proxy,
                proxy + count - 1,
                control,
                control + count - 1
            )));
        }

        Ok(())
    }

    /// SOCKS port of instance `n`
    pub fn proxy_port(&self, n: u16) -> u16 {
        self.base_proxy_port + n
    }

    /// Control port of instance `n`
    pub fn control_port(&self, n: u16) -> u16 {
        self.base_control_port + n
    }

    /// Control endpoint address of instance `n`
    pub fn control_addr(&self, n: u16) -> String {
        format!("127.0.0.1:{}", self.control_port(n))
    }
}

use std::path::PathBuf;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RuntimeConfig {
    /// Root of the listener's local state (cache, cursor, transaction file)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Handler module directories, scanned in order
    #[serde(default)]
    pub module_dirs: Vec<PathBuf>,

    /// Log directory for the file appender
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,

    /// Idle seconds before postrun hooks fire and the directory
    /// connection is closed
    #[serde(default = "default_postrun_idle_secs")]
    pub postrun_idle_secs: u64,

    /// Minimum free space per monitored filesystem in MiB (0 disables)
    #[serde(default)]
    pub min_free_mib: u64,

    /// Extra mount points checked by the free-space watchdog
    #[serde(default)]
    pub monitored_dirs: Vec<PathBuf>,

    /// Append committed transactions to the transaction file
    #[serde(default)]
    pub write_transaction_file: bool,

    /// Unprivileged account the effective identity is reset to after every
    /// handler hook; only consulted when the process starts elevated
    #[serde(default)]
    pub drop_privileges_to: Option<String>,

    /// Tolerate not-ready handlers instead of failing their invocations
    #[serde(default)]
    pub init_only: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            module_dirs: Vec::new(),
            log_dir: default_log_dir(),
            postrun_idle_secs: default_postrun_idle_secs(),
            min_free_mib: 0,
            monitored_dirs: Vec::new(),
            write_transaction_file: false,
            drop_privileges_to: None,
            init_only: false,
        }
    }
}

impl RuntimeConfig {
    pub fn validate(&self) -> Result<()> {
        if self.postrun_idle_secs == 0 {
            return Err(Error::Config(ConfigError::Message(
                "runtime: postrun_idle_secs cannot be 0".to_string(),
            )));
        }

        Ok(())
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.data_dir.join(crate::constants::CACHE_DIR)
    }

    pub fn quarantine_sentinel(&self) -> PathBuf {
        self.data_dir.join(crate::constants::QUARANTINE_SENTINEL)
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("/var/lib/dirsync")
}
fn default_log_dir() -> PathBuf {
    PathBuf::from("/var/log/dirsync")
}
fn default_postrun_idle_secs() -> u64 {
    300
}

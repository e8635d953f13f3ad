use std::path::PathBuf;

use nix::sys::statvfs::statvfs;
use tracing::debug;
use tracing::warn;

use crate::config::RuntimeConfig;
use crate::PipelineError;
use crate::Result;

/// Pre-transaction safety checks: the failed-replay quarantine sentinel and
/// the free-space watchdog. Both are fatal by design; the listener must
/// never silently advance past either.
#[derive(Debug, Clone)]
pub struct Supervisor {
    sentinel: PathBuf,
    min_free_mib: u64,
    monitored: Vec<PathBuf>,
}

impl Supervisor {
    pub fn new(runtime: &RuntimeConfig) -> Self {
        let mut monitored = vec![runtime.cache_dir()];
        monitored.extend(runtime.monitored_dirs.iter().cloned());

        Self {
            sentinel: runtime.quarantine_sentinel(),
            min_free_mib: runtime.min_free_mib,
            monitored,
        }
    }

    /// Runs before every transaction is taken from the notifier.
    pub fn check(&self) -> Result<()> {
        self.check_quarantine()?;
        self.check_free_space()?;
        Ok(())
    }

    /// Operators pause the pipeline by placing the sentinel after manual
    /// intervention; its presence is the only signal, the content is not
    /// interpreted.
    pub fn check_quarantine(&self) -> Result<()> {
        if self.sentinel.exists() {
            return Err(PipelineError::Quarantined(self.sentinel.clone()).into());
        }
        Ok(())
    }

    fn check_free_space(&self) -> Result<()> {
        if self.min_free_mib == 0 {
            return Ok(());
        }

        for dir in &self.monitored {
            let stat = match statvfs(dir) {
                Ok(stat) => stat,
                Err(e) => {
                    // A missing mount point is not a full one.
                    debug!(path = %dir.display(), %e, "statvfs failed, skipping");
                    continue;
                }
            };

            let free_mib =
                (stat.blocks_available() as u64).saturating_mul(stat.fragment_size() as u64) >> 20;
            if free_mib < self.min_free_mib {
                warn!(
                    path = %dir.display(),
                    free_mib,
                    min_mib = self.min_free_mib,
                    "file system full"
                );
                return Err(PipelineError::FreeSpace {
                    path: dir.clone(),
                    free_mib,
                    min_mib: self.min_free_mib,
                }
                .into());
            }
        }

        Ok(())
    }
}

use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;
use sha2::Digest;
use sha2::Sha256;
use tracing::info;
use tracing::warn;

use crate::utils::file_io::atomic_write;
use crate::CacheError;
use crate::Result;

/// Persisted resume point: the highest committed transaction id, the
/// authoritative schema generation it was processed under, and a digest of
/// the module-directory list last observed.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MasterState {
    pub notifier_id: u64,
    pub schema_id: u64,
    pub modules_hash: Vec<u8>,
}

/// Owns `cache/master.state`. Every advance rewrites the file atomically
/// (temp + rename + fsync); after a crash the last fully-committed state is
/// what restart resumes from.
#[derive(Debug)]
pub struct MasterCursor {
    path: PathBuf,
    state: MasterState,
}

impl MasterCursor {
    /// Loads the cursor, starting from zero when no state file exists yet.
    pub fn load(path: PathBuf) -> Result<Self> {
        let state = match std::fs::read(&path) {
            Ok(raw) => {
                let state: MasterState = bincode::deserialize(&raw).map_err(CacheError::Encoding)?;
                info!(
                    notifier_id = state.notifier_id,
                    schema_id = state.schema_id,
                    "loaded master state"
                );
                state
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("no master state found, starting from id 0");
                MasterState::default()
            }
            Err(e) => {
                return Err(CacheError::Path { path, source: e }.into());
            }
        };

        Ok(Self { path, state })
    }

    pub fn notifier_id(&self) -> u64 {
        self.state.notifier_id
    }

    pub fn schema_id(&self) -> u64 {
        self.state.schema_id
    }

    pub fn modules_hash(&self) -> &[u8] {
        &self.state.modules_hash
    }

    /// Records a newly committed transaction id. Callers must have flushed
    /// the cache (and the transaction file, if enabled) first.
    pub fn advance(
        &mut self,
        notifier_id: u64,
    ) -> Result<()> {
        self.state.notifier_id = notifier_id;
        self.persist()
    }

    pub fn set_schema_id(
        &mut self,
        schema_id: u64,
    ) -> Result<()> {
        self.state.schema_id = schema_id;
        self.persist()
    }

    /// Updates the module digest; returns whether it differed from the
    /// recorded one (a changed module set calls for operator attention).
    pub fn update_modules_hash(
        &mut self,
        module_dirs: &[PathBuf],
    ) -> Result<bool> {
        let hash = modules_hash(module_dirs);
        let changed = !self.state.modules_hash.is_empty() && self.state.modules_hash != hash;
        if changed {
            warn!("module directory list changed since last run");
        }
        self.state.modules_hash = hash;
        self.persist()?;
        Ok(changed)
    }

    fn persist(&self) -> Result<()> {
        let raw = bincode::serialize(&self.state).map_err(CacheError::Encoding)?;
        atomic_write(&self.path, &raw)
    }
}

/// Digest over the sorted module-directory path list.
pub fn modules_hash(module_dirs: &[PathBuf]) -> Vec<u8> {
    let mut dirs: Vec<&Path> = module_dirs.iter().map(|p| p.as_path()).collect();
    dirs.sort_unstable();

    let mut hasher = Sha256::new();
    for dir in dirs {
        hasher.update(dir.as_os_str().as_encoded_bytes());
        hasher.update([0u8]);
    }
    hasher.finalize().to_vec()
}

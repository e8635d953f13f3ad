use std::path::PathBuf;

use tracing::warn;

use crate::constants::HANDLER_STATE_DIR;
use crate::utils::file_io::atomic_write;
use crate::HandlerError;
use crate::Result;

/// Per-handler persistent state bit-sets, one file per handler under
/// `cache/handlers/<name>`, content a decimal integer.
#[derive(Debug, Clone)]
pub struct HandlerStateStore {
    dir: PathBuf,
}

impl HandlerStateStore {
    pub fn new(cache_dir: PathBuf) -> Self {
        Self {
            dir: cache_dir.join(HANDLER_STATE_DIR),
        }
    }

    /// Missing or unparsable files read as 0 (handler never initialized).
    pub fn load(
        &self,
        name: &str,
    ) -> u32 {
        let path = self.dir.join(name);
        match std::fs::read_to_string(&path) {
            Ok(raw) => match raw.trim().parse::<u32>() {
                Ok(state) => state,
                Err(_) => {
                    warn!(handler = name, ?path, "unparsable handler state, assuming 0");
                    0
                }
            },
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(handler = name, ?path, %e, "failed reading handler state");
                }
                0
            }
        }
    }

    pub fn store(
        &self,
        name: &str,
        state: u32,
    ) -> Result<()> {
        let path = self.dir.join(name);
        atomic_write(&path, state.to_string().as_bytes()).map_err(|e| {
            HandlerError::State {
                name: name.to_string(),
                source: std::io::Error::other(e),
            }
            .into()
        })
    }
}

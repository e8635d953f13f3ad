use std::path::Path;
use std::path::PathBuf;

use libloading::Library;
use libloading::Symbol;
use tracing::debug;
use tracing::warn;

use super::Handler;
use super::HandlerSet;
use crate::constants::HANDLER_CREATE_SYMBOL;
use crate::constants::HANDLER_MODULE_SUFFIX;
use crate::HandlerError;
use crate::Result;

/// Constructor every handler module exports under `handler_create`.
pub type HandlerCreate = fn() -> Box<dyn Handler>;

/// Scans the module directories in order and loads every recognized module.
/// Load errors are logged and skipped; partial loads are permitted.
pub fn load_modules(
    set: &mut HandlerSet,
    module_dirs: &[PathBuf],
) {
    for dir in module_dirs {
        load_path(set, dir);
    }
}

/// Loads from one directory (every `.so` inside, in name order) or from a
/// single module file.
pub fn load_path(
    set: &mut HandlerSet,
    path: &Path,
) {
    if path.is_dir() {
        let mut files: Vec<PathBuf> = match std::fs::read_dir(path) {
            Ok(dir) => dir
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .filter(|p| {
                    p.is_file()
                        && p.file_name()
                            .and_then(|n| n.to_str())
                            .map(|n| n.ends_with(HANDLER_MODULE_SUFFIX))
                            .unwrap_or(false)
                })
                .collect(),
            Err(e) => {
                warn!(path = %path.display(), %e, "cannot scan module directory");
                return;
            }
        };
        // Deterministic load order inside a directory.
        files.sort();

        for file in files {
            if let Err(e) = load_module(set, &file) {
                warn!(module = %file.display(), %e, "failed to load handler module");
            }
        }
    } else if path.is_file() {
        if let Err(e) = load_module(set, path) {
            warn!(module = %path.display(), %e, "failed to load handler module");
        }
    } else {
        warn!(path = %path.display(), "module path is neither file nor directory");
    }
}

fn load_module(
    set: &mut HandlerSet,
    path: &Path,
) -> Result<()> {
    debug!(module = %path.display(), "importing handler");

    let library = unsafe { Library::new(path) }.map_err(|e| HandlerError::Load {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    let handler = {
        let create: Symbol<HandlerCreate> =
            unsafe { library.get(HANDLER_CREATE_SYMBOL) }.map_err(|e| HandlerError::Load {
                path: path.to_path_buf(),
                reason: format!("missing handler_create: {e}"),
            })?;
        create()
    };

    let stem = path.file_stem().and_then(|s| s.to_str());
    set.register(handler, stem, Some(library))
}

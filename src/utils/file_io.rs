use std::fs;
use std::fs::File;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;

use tracing::error;

use crate::CacheError;
use crate::Result;

/// Creates parent directories for the given path.
/// e.g. path = "/var/lib/listener/cache/master.state" creates
/// "/var/lib/listener/cache"
pub fn create_parent_dir_if_not_exist(path: &Path) -> Result<()> {
    let dir_to_create = path.parent().unwrap_or(path);

    if !dir_to_create.exists() {
        if let Err(e) = fs::create_dir_all(dir_to_create) {
            error!(?e, "create_parent_dir_if_not_exist failed.");
            return Err(CacheError::Path {
                path: path.to_path_buf(),
                source: e,
            }
            .into());
        }
    }

    Ok(())
}

pub fn open_file_for_append(path: PathBuf) -> Result<File> {
    create_parent_dir_if_not_exist(&path)?;
    let file = match OpenOptions::new().append(true).create(true).open(&path) {
        Ok(f) => f,
        Err(e) => {
            return Err(CacheError::Path { path, source: e }.into());
        }
    };
    Ok(file)
}

/// Writes `buf` to `path` atomically: write to a temp sibling, fsync, rename
/// over the target, then fsync the containing directory. A reader sees
/// either the old content or the new content, never a torn file.
pub fn atomic_write(
    path: &Path,
    buf: &[u8],
) -> Result<()> {
    create_parent_dir_if_not_exist(path)?;

    let tmp_path = tmp_sibling(path);
    let map_err = |source: std::io::Error| CacheError::Path {
        path: path.to_path_buf(),
        source,
    };

    let mut tmp = File::create(&tmp_path).map_err(map_err)?;
    tmp.write_all(buf).map_err(map_err)?;
    tmp.sync_all().map_err(map_err)?;
    drop(tmp);

    fs::rename(&tmp_path, path).map_err(map_err)?;

    if let Some(dir) = path.parent() {
        let dir_handle = File::open(dir).map_err(map_err)?;
        dir_handle.sync_all().map_err(map_err)?;
    }

    Ok(())
}

fn tmp_sibling(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

//! Export of volatile files to the real filesystem.

use std::fs;
use std::path::{Component, Path, PathBuf};

use crate::error::{VfsError, VfsResult};
use crate::namespace::VolatileVfs;

/// Write every file in `vfs` to `dir/<name>`.
///
/// Stops at the first failure; files written before it are left in place.
pub fn dump(vfs: &VolatileVfs, dir: &Path) -> VfsResult<()> {
    tracing::debug!(dir = %dir.display(), "dumping volatile files");
    vfs.try_for_each_file(|name, file| {
        file.with_contents_ref(|data| dump_file(data, dir, name))
            .map_err(|e| VfsError::dump(name, e))
    })
}

/// Target path for `name` under `dir`.
fn target_path(dir: &Path, name: &str) -> VfsResult<PathBuf> {
    let relative = Path::new(name);
    if name.starts_with('/') || relative.is_absolute() {
        return Err(VfsError::absolute_path(name));
    }
    if relative
        .components()
        .any(|c| matches!(c, Component::ParentDir | Component::Prefix(_)))
    {
        return Err(VfsError::path_escapes_root(name));
    }
    Ok(dir.join(relative))
}

fn dump_file(data: &[u8], dir: &Path, name: &str) -> VfsResult<()> {
    let path = target_path(dir, name)?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&path, data)?;
    tracing::trace!(path = %path.display(), bytes = data.len(), "dumped");
    Ok(())
}

//! Shared filesystem helpers.

use std::io;
use std::path::Path;
use walkdir::WalkDir;

/// Recursively delete `path`, clearing read-only bits if the first attempt is denied.
///
/// Git marks pack and object files read-only, which blocks deletion on some
/// platforms. A missing path is not an error.
pub fn remove_tree(path: &Path) -> io::Result<()> {
    match std::fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
            make_writable(path)?;
            std::fs::remove_dir_all(path)
        }
        Err(e) => Err(e),
    }
}

fn make_writable(root: &Path) -> io::Result<()> {
    for entry in WalkDir::new(root).into_iter().filter_map(Result::ok) {
        let metadata = entry.metadata().map_err(io::Error::other)?;
        let mut permissions = metadata.permissions();
        if permissions.readonly() {
            #[allow(clippy::permissions_set_readonly_false)]
            permissions.set_readonly(false);
            std::fs::set_permissions(entry.path(), permissions)?;
        }
    }
    Ok(())
}

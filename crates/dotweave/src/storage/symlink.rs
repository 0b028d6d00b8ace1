use std::path::Path;

use crate::error::StorageError;

use super::filesystem::run_elevated;

/// Creates a symlink at `target` pointing to `source`, possibly through an
/// elevated helper. The reconciler only ever creates links through this.
pub trait SymlinkCreator {
    fn create_symlink(&self, source: &Path, target: &Path, elevated: bool)
        -> Result<(), StorageError>;
}

/// Platform symlinks: `symlink(2)` on Unix (`sudo ln -s` when elevated),
/// file or directory symlinks on Windows.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeSymlinks;

impl SymlinkCreator for NativeSymlinks {
    fn create_symlink(
        &self,
        source: &Path,
        target: &Path,
        elevated: bool,
    ) -> Result<(), StorageError> {
        match std::fs::metadata(source) {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::SourceMissing(source.to_path_buf()))
            }
            Err(e) => {
                return Err(StorageError::CreateSymlink {
                    link: target.to_path_buf(),
                    target: source.to_path_buf(),
                    source: e,
                })
            }
        }

        if elevated && cfg!(unix) {
            let source_arg = source.to_string_lossy();
            let target_arg = target.to_string_lossy();
            return run_elevated("ln", &["-s", source_arg.as_ref(), target_arg.as_ref()]);
        }

        #[cfg(unix)]
        let result = std::os::unix::fs::symlink(source, target);

        #[cfg(windows)]
        let result = if source.is_dir() {
            std::os::windows::fs::symlink_dir(source, target)
        } else {
            std::os::windows::fs::symlink_file(source, target)
        };

        result.map_err(|e| StorageError::CreateSymlink {
            link: target.to_path_buf(),
            target: source.to_path_buf(),
            source: e,
        })
    }
}

/// True if `path` itself is a symlink (dangling links included).
pub fn is_symlink(path: &Path) -> bool {
    std::fs::symlink_metadata(path)
        .map(|m| m.file_type().is_symlink())
        .unwrap_or(false)
}

/// True if `link` is a symlink whose target is exactly `source`.
pub fn symlink_points_to(link: &Path, source: &Path) -> bool {
    std::fs::read_link(link)
        .map(|dest| dest == source)
        .unwrap_or(false)
}

/// Existence check that does not follow symlinks.
pub fn path_exists(path: &Path) -> bool {
    std::fs::symlink_metadata(path).is_ok()
}

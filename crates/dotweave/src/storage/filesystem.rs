use std::path::Path;
use std::process::Command;

use walkdir::WalkDir;

use crate::error::StorageError;

use super::symlink::is_symlink;

/// Runs `sudo <program> <args>` and maps a non-zero exit to an error.
pub(crate) fn run_elevated(program: &str, args: &[&str]) -> Result<(), StorageError> {
    let command = format!("sudo {} {}", program, args.join(" "));
    log::debug!("Running elevated: {}", command);

    let output = Command::new("sudo")
        .arg(program)
        .args(args)
        .output()
        .map_err(|e| StorageError::Elevated {
            command: command.clone(),
            message: e.to_string(),
        })?;

    if !output.status.success() {
        return Err(StorageError::Elevated {
            command,
            message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(())
}

/// Moves a file or directory from `src` to `dst`. Uses `rename` first. Falls
/// back to copy + delete when rename fails, which covers cross-device moves.
pub fn move_path(src: &Path, dst: &Path, elevated: bool) -> Result<(), StorageError> {
    if elevated && cfg!(unix) {
        let src_arg = src.to_string_lossy();
        let dst_arg = dst.to_string_lossy();
        return run_elevated("mv", &[src_arg.as_ref(), dst_arg.as_ref()]);
    }

    let rename_err = match std::fs::rename(src, dst) {
        Ok(()) => return Ok(()),
        Err(e) => e,
    };
    log::debug!(
        "rename {} -> {} failed ({}), falling back to copy",
        src.display(),
        dst.display(),
        rename_err
    );

    let move_err = |e: std::io::Error| StorageError::MoveFile {
        from: src.to_path_buf(),
        to: dst.to_path_buf(),
        source: e,
    };

    if src.is_dir() && !is_symlink(src) {
        copy_tree(src, dst)?;
        std::fs::remove_dir_all(src).map_err(move_err)?;
    } else {
        std::fs::copy(src, dst).map_err(move_err)?;
        std::fs::remove_file(src).map_err(move_err)?;
    }
    Ok(())
}

fn copy_tree(src: &Path, dst: &Path) -> Result<(), StorageError> {
    for entry in WalkDir::new(src).follow_links(false) {
        let entry = entry.map_err(|e| StorageError::ReadFile {
            path: src.to_path_buf(),
            source: e.into(),
        })?;
        let rel = entry.path().strip_prefix(src).unwrap_or(entry.path());
        let dest = dst.join(rel);

        if entry.file_type().is_dir() {
            ensure_directory(&dest, false)?;
        } else if entry.file_type().is_symlink() {
            copy_symlink(entry.path(), &dest)?;
        } else {
            std::fs::copy(entry.path(), &dest).map_err(|e| StorageError::CopyFile {
                from: entry.path().to_path_buf(),
                to: dest.clone(),
                source: e,
            })?;
        }
    }
    Ok(())
}

fn copy_symlink(link: &Path, dest: &Path) -> Result<(), StorageError> {
    let target = std::fs::read_link(link).map_err(|e| StorageError::ReadFile {
        path: link.to_path_buf(),
        source: e,
    })?;

    #[cfg(unix)]
    let result = std::os::unix::fs::symlink(&target, dest);
    #[cfg(windows)]
    let result = std::os::windows::fs::symlink_file(&target, dest);

    result.map_err(|e| StorageError::CreateSymlink {
        link: dest.to_path_buf(),
        target,
        source: e,
    })
}

pub fn read_file(path: &Path) -> Result<Vec<u8>, StorageError> {
    std::fs::read(path).map_err(|e| StorageError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Writes `content` to `path`, creating the parent directory when needed.
pub fn write_file(path: &Path, content: &[u8]) -> Result<(), StorageError> {
    if let Some(parent) = path.parent() {
        ensure_directory(parent, false)?;
    }
    std::fs::write(path, content).map_err(|e| StorageError::WriteFile {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Copies `src` to `dst`, overwriting any previous backup.
pub fn backup_copy(src: &Path, dst: &Path) -> Result<(), StorageError> {
    std::fs::copy(src, dst)
        .map(|_| ())
        .map_err(|e| StorageError::CopyFile {
            from: src.to_path_buf(),
            to: dst.to_path_buf(),
            source: e,
        })
}

pub fn ensure_directory(path: &Path, elevated: bool) -> Result<(), StorageError> {
    if path.is_dir() {
        return Ok(());
    }
    if elevated && cfg!(unix) {
        let path_arg = path.to_string_lossy();
        return run_elevated("mkdir", &["-p", path_arg.as_ref()]);
    }
    std::fs::create_dir_all(path).map_err(|e| StorageError::CreateDirectory {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Removes a file, symlink or directory tree. Symlinks are removed, never
/// followed.
pub fn remove_path(path: &Path, elevated: bool) -> Result<(), StorageError> {
    if elevated && cfg!(unix) {
        let path_arg = path.to_string_lossy();
        return run_elevated("rm", &["-rf", path_arg.as_ref()]);
    }

    let meta = match std::fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => {
            return Err(StorageError::RemovePath {
                path: path.to_path_buf(),
                source: e,
            })
        }
    };

    let result = if meta.file_type().is_symlink() {
        // directory symlinks on Windows need remove_dir
        std::fs::remove_file(path).or_else(|_| std::fs::remove_dir(path))
    } else if meta.is_dir() {
        std::fs::remove_dir_all(path)
    } else {
        std::fs::remove_file(path)
    };

    result.map_err(|e| StorageError::RemovePath {
        path: path.to_path_buf(),
        source: e,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_move_file() {
        let temp_dir = TempDir::new().unwrap();
        let src = temp_dir.path().join("a.conf");
        let dst = temp_dir.path().join("b.conf");
        std::fs::write(&src, "user data").unwrap();

        move_path(&src, &dst, false).unwrap();

        assert!(!src.exists());
        assert_eq!(std::fs::read_to_string(&dst).unwrap(), "user data");
    }

    #[test]
    fn test_move_directory() {
        let temp_dir = TempDir::new().unwrap();
        let src = temp_dir.path().join("nvim");
        std::fs::create_dir_all(src.join("lua")).unwrap();
        std::fs::write(src.join("lua/init.lua"), "x").unwrap();
        let dst = temp_dir.path().join("backup").join("nvim");
        std::fs::create_dir_all(dst.parent().unwrap()).unwrap();

        move_path(&src, &dst, false).unwrap();

        assert!(!src.exists());
        assert_eq!(std::fs::read_to_string(dst.join("lua/init.lua")).unwrap(), "x");
    }

    #[test]
    fn test_move_missing_source_fails() {
        let temp_dir = TempDir::new().unwrap();
        let err = move_path(
            &temp_dir.path().join("missing"),
            &temp_dir.path().join("dst"),
            false,
        )
        .unwrap_err();
        assert!(matches!(err, StorageError::MoveFile { .. }));
    }

    #[test]
    fn test_copy_tree() {
        let temp_dir = TempDir::new().unwrap();
        let src = temp_dir.path().join("src");
        std::fs::create_dir_all(src.join("a/b")).unwrap();
        std::fs::write(src.join("a/b/c.txt"), "deep").unwrap();
        std::fs::write(src.join("top.txt"), "top").unwrap();
        let dst = temp_dir.path().join("dst");

        copy_tree(&src, &dst).unwrap();

        assert_eq!(std::fs::read_to_string(dst.join("a/b/c.txt")).unwrap(), "deep");
        assert_eq!(std::fs::read_to_string(dst.join("top.txt")).unwrap(), "top");
        assert!(src.join("top.txt").exists());
    }

    #[test]
    fn test_write_file_creates_parents() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("x/y/z.conf");
        write_file(&path, b"hello").unwrap();
        assert_eq!(read_file(&path).unwrap(), b"hello".to_vec());
    }

    #[test]
    fn test_backup_copy_overwrites() {
        let temp_dir = TempDir::new().unwrap();
        let src = temp_dir.path().join("a");
        let bak = temp_dir.path().join("a.bak");
        std::fs::write(&src, "new").unwrap();
        std::fs::write(&bak, "old").unwrap();

        backup_copy(&src, &bak).unwrap();
        assert_eq!(std::fs::read_to_string(&bak).unwrap(), "new");
        assert!(src.exists());
    }

    #[test]
    fn test_remove_path_variants() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("f");
        let dir = temp_dir.path().join("d");
        std::fs::write(&file, "x").unwrap();
        std::fs::create_dir_all(dir.join("inner")).unwrap();

        remove_path(&file, false).unwrap();
        remove_path(&dir, false).unwrap();
        remove_path(&temp_dir.path().join("never-existed"), false).unwrap();

        assert!(!file.exists());
        assert!(!dir.exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_remove_symlink_keeps_target() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("real");
        std::fs::create_dir(&dir).unwrap();
        std::fs::write(dir.join("keep"), "x").unwrap();
        let link = temp_dir.path().join("link");
        std::os::unix::fs::symlink(&dir, &link).unwrap();

        remove_path(&link, false).unwrap();

        assert!(!is_symlink(&link));
        assert!(dir.join("keep").exists());
    }
}

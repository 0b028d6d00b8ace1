//! Filename conventions shared by the engine and the reconciliation driver.
//!
//! `foo.conf.tmpl` is the template, `foo.conf.tmpl.rendered` the artifact users
//! may edit and the symlink points at, `foo.conf.tmpl.conflict` the advisory
//! conflict artifact, and `foo.conf` the logical target name.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

pub const TEMPLATE_SUFFIX: &str = ".tmpl";
pub const RENDERED_SUFFIX: &str = ".tmpl.rendered";
pub const CONFLICT_SUFFIX: &str = ".tmpl.conflict";
pub const RENDERED_BACKUP_SUFFIX: &str = ".tmpl.rendered.bak";

/// True for `*.tmpl` names that are not themselves generated artifacts.
pub fn is_template_file(filename: &str) -> bool {
    filename.ends_with(TEMPLATE_SUFFIX)
        && !filename.ends_with(RENDERED_SUFFIX)
        && !filename.ends_with(CONFLICT_SUFFIX)
}

pub fn is_rendered_file(filename: &str) -> bool {
    filename.ends_with(RENDERED_SUFFIX)
}

pub fn is_conflict_file(filename: &str) -> bool {
    filename.ends_with(CONFLICT_SUFFIX)
}

/// Rendered, conflict and orphan-backup artifacts are outputs only.
pub fn is_generated_file(filename: &str) -> bool {
    is_rendered_file(filename)
        || is_conflict_file(filename)
        || filename.ends_with(RENDERED_BACKUP_SUFFIX)
}

pub fn rendered_path(template_path: &Path) -> PathBuf {
    append_suffix(template_path, ".rendered")
}

pub fn conflict_path(template_path: &Path) -> PathBuf {
    append_suffix(template_path, ".conflict")
}

/// Sibling used to preserve an orphaned rendered artifact before overwriting it.
pub fn backup_path(rendered_path: &Path) -> PathBuf {
    append_suffix(rendered_path, ".bak")
}

/// Strips the template suffix: `config.toml.tmpl` -> `config.toml`.
pub fn target_name(template_filename: &str) -> String {
    let base = Path::new(template_filename)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(template_filename);
    base.strip_suffix(TEMPLATE_SUFFIX).unwrap_or(base).to_string()
}

fn append_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut raw: OsString = path.as_os_str().to_owned();
    raw.push(suffix);
    PathBuf::from(raw)
}

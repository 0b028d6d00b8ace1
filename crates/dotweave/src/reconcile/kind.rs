//! Classification of backup-tree entries.

use std::path::Path;

use crate::template::{is_generated_file, is_template_file};

/// What a backup-tree entry is, decided once from its name and file type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Directory,
    /// Rendered, conflict or orphan-backup artifact. Never a walk input.
    GeneratedArtifact,
    PlainFile,
    TemplateFile,
}

impl EntryKind {
    pub fn classify(filename: &str, is_dir: bool) -> Self {
        if is_dir {
            EntryKind::Directory
        } else if is_generated_file(filename) {
            EntryKind::GeneratedArtifact
        } else if is_template_file(filename) {
            EntryKind::TemplateFile
        } else {
            EntryKind::PlainFile
        }
    }

    /// Classifies an on-disk path. Symlinks to directories count as directories.
    pub fn of_path(path: &Path) -> Self {
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self::classify(&filename, path.is_dir())
    }
}

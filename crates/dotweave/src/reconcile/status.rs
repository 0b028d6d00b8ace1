use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::state::{content_hash, RenderStore};
use crate::template;

use super::driver::Reconciler;

/// Where a template stands relative to its last render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateStatus {
    pub key: String,
    pub template_path: PathBuf,
    pub has_history: bool,
    /// No history, or the template source changed since the last render.
    pub template_changed: bool,
    /// The rendered artifact differs from the last pure render.
    pub user_edited: bool,
    pub has_conflict: bool,
}

impl<S: RenderStore> Reconciler<S> {
    /// Reports every template under `backup_dir` without changing anything.
    pub fn template_status(&self, backup_dir: &Path) -> Vec<TemplateStatus> {
        WalkDir::new(backup_dir)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.file_type().is_file()
                    && template::is_template_file(&e.file_name().to_string_lossy())
            })
            .map(|e| self.status_of(e.path()))
            .collect()
    }

    fn status_of(&self, template_path: &Path) -> TemplateStatus {
        let key = self.store_key(template_path);
        let record = self.store().get_latest(&key);
        let current_hash = std::fs::read(template_path).ok().map(|src| content_hash(&src));

        let template_changed = match (&record, &current_hash) {
            (Some(record), Some(hash)) => record.template_hash != *hash,
            _ => true,
        };

        let user_edited = record.as_ref().is_some_and(|record| {
            std::fs::read(template::rendered_path(template_path))
                .map(|on_disk| on_disk != record.pure_render)
                .unwrap_or(false)
        });

        TemplateStatus {
            has_history: record.is_some(),
            template_changed,
            user_edited,
            has_conflict: template::conflict_path(template_path).exists(),
            template_path: template_path.to_path_buf(),
            key,
        }
    }
}

//! The reconciler: walks backup entries, renders and merges templates,
//! and links each file or folder into its target location.

use std::path::{Component, Path, PathBuf};

use tracing::info_span;

use crate::config::Entry;
use crate::error::{DotweaveError, StorageError, TemplateError};
use crate::merge::three_way_merge;
use crate::platform::Platform;
use crate::sanitize;
use crate::state::{content_hash, RenderRecord, RenderStore};
use crate::storage::{self, NativeSymlinks, SymlinkCreator};
use crate::template::{self, TemplateEngine};

use super::kind::EntryKind;
use super::options::{CancelToken, ReconcileOptions};
use super::progress::{NoopProgress, ProgressEvent, ProgressReporter};
use super::summary::{FileOutcome, ReconcileSummary};

type StepResult = Result<FileOutcome, DotweaveError>;

/// A config entry with its target resolved for the current machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedEntry {
    pub name: String,
    pub backup_dir: PathBuf,
    pub target_dir: PathBuf,
    /// Empty means the whole backup folder is managed.
    pub files: Vec<String>,
    pub sudo: bool,
}

/// How a template's rendered artifact is about to change.
struct RenderPlan {
    content: Vec<u8>,
    outcome: FileOutcome,
    /// Copy the current artifact to `.bak` before overwriting it.
    backup_existing: bool,
    /// The artifact already holds exactly `content`.
    up_to_date: bool,
}

/// Walks backup trees and brings their targets in line: renders and merges
/// templates, mirrors directories, and links everything into place.
///
/// Files are processed strictly one after another. The store is owned by
/// the reconciler for the duration of a run.
pub struct Reconciler<S: RenderStore> {
    platform: Platform,
    engine: TemplateEngine,
    store: S,
    backup_root: PathBuf,
    linker: Box<dyn SymlinkCreator>,
    options: ReconcileOptions,
    cancel: CancelToken,
    progress: Box<dyn ProgressReporter>,
}

impl<S: RenderStore> Reconciler<S> {
    pub fn new(platform: Platform, store: S, backup_root: impl Into<PathBuf>) -> Self {
        let engine = TemplateEngine::new(&platform);
        // Links are created to paths under the root, so a relative root
        // would leave them dangling
        let backup_root: PathBuf = backup_root.into();
        let backup_root = std::path::absolute(&backup_root).unwrap_or(backup_root);
        Self {
            platform,
            engine,
            store,
            backup_root,
            linker: Box::new(NativeSymlinks),
            options: ReconcileOptions::default(),
            cancel: CancelToken::new(),
            progress: Box::new(NoopProgress),
        }
    }

    pub fn with_options(mut self, options: ReconcileOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_linker(mut self, linker: Box<dyn SymlinkCreator>) -> Self {
        self.linker = linker;
        self
    }

    pub fn with_progress(mut self, progress: Box<dyn ProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    /// Replaces the template engine, e.g. to add custom functions.
    pub fn with_engine(mut self, engine: TemplateEngine) -> Self {
        self.engine = engine;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn platform(&self) -> &Platform {
        &self.platform
    }

    pub fn options(&self) -> ReconcileOptions {
        self.options
    }

    /// Store key for a backup file: its path relative to the backup root,
    /// `/`-separated.
    pub fn store_key(&self, path: &Path) -> String {
        let rel = path.strip_prefix(&self.backup_root).unwrap_or(path);
        rel.components()
            .filter_map(|c| match c {
                Component::Normal(part) => Some(part.to_string_lossy()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("/")
    }

    /// Resolves the entry's target for this platform. `None` when the entry
    /// has no target for the current OS.
    pub fn resolve_entry(&self, entry: &Entry) -> Result<Option<ResolvedEntry>, TemplateError> {
        let Some(target_dir) = entry.resolve_target(&self.platform.os, &self.engine)? else {
            return Ok(None);
        };
        Ok(Some(ResolvedEntry {
            name: entry.name.clone(),
            backup_dir: self.backup_root.join(&entry.backup),
            target_dir,
            files: entry.files.clone(),
            sudo: entry.sudo,
        }))
    }

    /// Reconciles every entry in order, stopping early on cancellation.
    pub fn reconcile_all(&self, entries: &[Entry]) -> ReconcileSummary {
        let mut summary = ReconcileSummary::default();

        for entry in entries {
            if self.check_cancelled(&mut summary) {
                break;
            }
            match self.resolve_entry(entry) {
                Ok(Some(resolved)) => summary.absorb(self.reconcile_entry(&resolved)),
                Ok(None) => log::debug!(
                    "Entry {} has no target for {}, skipping",
                    entry.name,
                    self.platform.os
                ),
                Err(e) => self.fail(&mut summary, self.backup_root.join(&entry.backup), e),
            }
        }

        summary
    }

    pub fn reconcile_entry(&self, entry: &ResolvedEntry) -> ReconcileSummary {
        let _entry_span = info_span!("entry",
            name = %entry.name,
            target = %sanitize::redact_path(&entry.target_dir),
            dry_run = self.options.dry_run,
        )
        .entered();

        self.progress.report(ProgressEvent::EntryStarted {
            name: entry.name.clone(),
        });

        let mut summary = ReconcileSummary::default();
        if self.check_cancelled(&mut summary) {
            return summary;
        }

        if !entry.files.is_empty() {
            self.reconcile_file_list(entry, &mut summary);
        } else if contains_templates(&entry.backup_dir) {
            self.reconcile_tree(entry, &mut summary);
        } else {
            // No templates: the folder itself is the link.
            let result = self.link_path(&entry.backup_dir, &entry.target_dir, entry.sudo);
            self.finish(&mut summary, entry.backup_dir.clone(), result);
        }

        summary
    }

    fn reconcile_file_list(&self, entry: &ResolvedEntry, summary: &mut ReconcileSummary) {
        if let Err(e) = self.prepare_directory(&entry.target_dir, entry.sudo) {
            self.fail(summary, entry.target_dir.clone(), e);
            return;
        }

        for file in &entry.files {
            if self.check_cancelled(summary) {
                return;
            }

            let source = entry.backup_dir.join(file);
            let target = entry.target_dir.join(file);
            let filename = file_name(&source);

            let result = match EntryKind::classify(&filename, source.is_dir()) {
                EntryKind::TemplateFile => {
                    self.process_template(&source, &template_link_path(&target), entry.sudo)
                }
                EntryKind::GeneratedArtifact => {
                    log::debug!("Skipping generated file {}", filename);
                    continue;
                }
                EntryKind::Directory | EntryKind::PlainFile => {
                    self.link_path(&source, &target, entry.sudo)
                }
            };
            self.finish(summary, source, result);
        }
    }

    /// Depth-first walk over a backup folder that contains templates,
    /// mirroring directories into the target.
    fn reconcile_tree(&self, entry: &ResolvedEntry, summary: &mut ReconcileSummary) {
        if let Err(e) = self.prepare_directory(&entry.target_dir, entry.sudo) {
            self.fail(summary, entry.target_dir.clone(), e);
            return;
        }

        let mut stack = Vec::new();
        if let Err(e) = push_children(&mut stack, &entry.backup_dir, &entry.target_dir) {
            self.fail(summary, entry.backup_dir.clone(), e);
            return;
        }

        while let Some((source, target)) = stack.pop() {
            if self.check_cancelled(summary) {
                return;
            }

            let result = match EntryKind::of_path(&source) {
                EntryKind::Directory => {
                    let descended = self
                        .prepare_directory(&target, entry.sudo)
                        .and_then(|()| push_children(&mut stack, &source, &target));
                    if let Err(e) = descended {
                        self.fail(summary, source, e);
                    }
                    continue;
                }
                EntryKind::GeneratedArtifact => continue,
                EntryKind::PlainFile => self.link_path(&source, &target, entry.sudo),
                EntryKind::TemplateFile => {
                    self.process_template(&source, &template_link_path(&target), entry.sudo)
                }
            };
            self.finish(summary, source, result);
        }
    }

    /// Renders one template, merges it with the on-disk artifact when history
    /// exists, records the pure render and links the artifact into place.
    pub fn process_template(&self, template_path: &Path, link_path: &Path, sudo: bool) -> StepResult {
        let key = self.store_key(template_path);
        let _template_span = info_span!("template",
            filename = %sanitize::redact_path(template_path),
            key_hash = %sanitize::hash_path(Path::new(&key)),
        )
        .entered();

        let source = storage::read_file(template_path)?;
        let template_hash = content_hash(&source);
        let rendered_path = template::rendered_path(template_path);
        let record = self.store.get_latest(&key);

        if !self.options.force_render {
            if let Some(record) = &record {
                if record.template_hash == template_hash && storage::path_exists(&rendered_path) {
                    log::debug!("Template {} unchanged, skipping render", key);
                    self.ensure_link(&rendered_path, link_path, sudo)?;
                    return Ok(FileOutcome::Unchanged);
                }
            }
        }

        let fresh = self.engine.render(&key, &source)?;
        let plan = self.plan_render(&rendered_path, record.as_ref(), &fresh);
        let conflict = matches!(plan.outcome, FileOutcome::Merged { conflict: true });

        if self.options.dry_run {
            log::info!(
                "Would write {} ({:?})",
                sanitize::redact_path(&rendered_path),
                plan.outcome
            );
            if plan.backup_existing {
                log::info!("Would back up existing {}", sanitize::redact_path(&rendered_path));
            }
            if conflict {
                log::warn!("Would write conflict file for {}", key);
            }
            self.ensure_link(&rendered_path, link_path, sudo)?;
            return Ok(plan.outcome);
        }

        if plan.backup_existing {
            let backup = template::backup_path(&rendered_path);
            match storage::backup_copy(&rendered_path, &backup) {
                Ok(()) => log::info!(
                    "Backed up existing {} to {}",
                    sanitize::redact_path(&rendered_path),
                    sanitize::redact_path(&backup)
                ),
                Err(e) => log::warn!("Failed to back up {}: {}", key, e),
            }
        }

        if conflict {
            let conflict_path = template::conflict_path(template_path);
            match storage::write_file(&conflict_path, &plan.content) {
                Ok(()) => log::warn!(
                    "Merge conflict in {}, review {}",
                    key,
                    sanitize::redact_path(&conflict_path)
                ),
                Err(e) => log::warn!("Merge conflict in {}, conflict file not written: {}", key, e),
            }
        }

        if plan.up_to_date {
            log::debug!("Rendered {} already up to date", key);
        } else {
            storage::write_file(&rendered_path, &plan.content)?;
        }

        // Always the fresh render, never the merged content.
        if let Err(e) = self.store.save(
            &key,
            &fresh,
            &template_hash,
            &self.platform.os,
            &self.platform.hostname,
        ) {
            log::warn!("Failed to save render history for {}: {}", key, e);
        }

        self.ensure_link(&rendered_path, link_path, sudo)?;
        Ok(plan.outcome)
    }

    fn plan_render(
        &self,
        rendered_path: &Path,
        record: Option<&RenderRecord>,
        fresh: &[u8],
    ) -> RenderPlan {
        let existing = std::fs::read(rendered_path).ok();
        let differs = existing.as_deref().is_some_and(|e| e != fresh);

        let (content, outcome, backup_existing) = match record {
            Some(record) if !self.options.force_render => {
                // Unreadable or missing artifact means no user edits.
                let theirs = existing.as_deref().unwrap_or(record.pure_render.as_slice());
                match (
                    std::str::from_utf8(&record.pure_render),
                    std::str::from_utf8(theirs),
                    std::str::from_utf8(fresh),
                ) {
                    (Ok(base), Ok(theirs), Ok(ours)) => {
                        let merged = three_way_merge(base, theirs, ours);
                        (
                            merged.content.into_bytes(),
                            FileOutcome::Merged {
                                conflict: merged.has_conflict,
                            },
                            false,
                        )
                    }
                    // Binary content cannot be line-merged.
                    _ => (fresh.to_vec(), FileOutcome::Rendered, differs),
                }
            }
            Some(_) => (fresh.to_vec(), FileOutcome::Rendered, differs),
            None => (fresh.to_vec(), FileOutcome::Rendered, existing.is_some()),
        };

        RenderPlan {
            up_to_date: existing.as_deref() == Some(content.as_slice()),
            content,
            outcome,
            backup_existing,
        }
    }

    /// Links `target` to `source`. A missing source is adopted from an
    /// existing target, so first runs never discard user data.
    pub fn link_path(&self, source: &Path, target: &Path, sudo: bool) -> StepResult {
        let _link_span = info_span!("link", filename = %sanitize::redact_path(target)).entered();

        if storage::symlink_points_to(target, source) {
            return Ok(FileOutcome::AlreadyLinked);
        }

        if !storage::path_exists(source) {
            if storage::path_exists(target) && !storage::is_symlink(target) {
                self.adopt(target, source, sudo)?;
                self.ensure_link(source, target, sudo)?;
                return Ok(FileOutcome::Adopted);
            }
            log::warn!(
                "Neither backup nor target exists for {}, skipping",
                sanitize::redact_path(source)
            );
            return Ok(FileOutcome::Skipped);
        }

        self.ensure_link(source, target, sudo)?;
        Ok(FileOutcome::Linked)
    }

    fn adopt(&self, target: &Path, source: &Path, sudo: bool) -> Result<(), StorageError> {
        if self.options.dry_run {
            log::info!(
                "Would adopt {} into the backup tree",
                sanitize::redact_path(target)
            );
            return Ok(());
        }

        if let Some(parent) = source.parent() {
            storage::ensure_directory(parent, sudo)?;
        }
        storage::move_path(target, source, sudo)?;
        log::info!("Adopted {} into the backup tree", sanitize::redact_path(target));
        Ok(())
    }

    /// Makes `link` a symlink to `source`, replacing whatever is there.
    /// Returns whether anything changed.
    fn ensure_link(&self, source: &Path, link: &Path, sudo: bool) -> Result<bool, StorageError> {
        if storage::symlink_points_to(link, source) {
            return Ok(false);
        }

        if self.options.dry_run {
            log::info!(
                "Would link {} -> {}",
                sanitize::redact_path(link),
                sanitize::redact_path(source)
            );
            return Ok(true);
        }

        if storage::path_exists(link) {
            storage::remove_path(link, sudo)?;
        }
        if let Some(parent) = link.parent() {
            storage::ensure_directory(parent, sudo)?;
        }
        self.linker.create_symlink(source, link, sudo)?;
        log::debug!(
            "Linked {} -> {}",
            sanitize::redact_path(link),
            sanitize::redact_path(source)
        );
        Ok(true)
    }

    /// Ensures `path` is a real directory. A symlink left over from when the
    /// folder was linked whole is replaced.
    fn prepare_directory(&self, path: &Path, sudo: bool) -> Result<(), StorageError> {
        if storage::is_symlink(path) {
            if self.options.dry_run {
                log::info!("Would replace linked folder {}", sanitize::redact_path(path));
                return Ok(());
            }
            log::info!("Replacing linked folder {}", sanitize::redact_path(path));
            storage::remove_path(path, sudo)?;
        }

        if path.is_dir() {
            return Ok(());
        }
        if self.options.dry_run {
            log::info!("Would create directory {}", sanitize::redact_path(path));
            return Ok(());
        }
        storage::ensure_directory(path, sudo)
    }

    fn check_cancelled(&self, summary: &mut ReconcileSummary) -> bool {
        if !self.cancel.is_cancelled() {
            return false;
        }
        if !summary.cancelled {
            summary.cancelled = true;
            self.progress.report(ProgressEvent::Cancelled);
        }
        true
    }

    fn finish(&self, summary: &mut ReconcileSummary, path: PathBuf, result: StepResult) {
        match result {
            Ok(outcome) => {
                self.progress.report(ProgressEvent::FileDone {
                    path: path.clone(),
                    outcome,
                });
                summary.record(path, outcome);
            }
            Err(e) => self.fail(summary, path, e),
        }
    }

    fn fail(&self, summary: &mut ReconcileSummary, path: PathBuf, error: impl std::fmt::Display) {
        let error = error.to_string();
        log::warn!("Failed to reconcile {}: {}", sanitize::redact_path(&path), error);
        self.progress.report(ProgressEvent::FileFailed {
            path: path.clone(),
            error: error.clone(),
        });
        summary.record_failure(path, error);
    }
}

/// Where a template's logical target lives: its target path without `.tmpl`.
fn template_link_path(target: &Path) -> PathBuf {
    target.with_file_name(template::target_name(&file_name(target)))
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn contains_templates(dir: &Path) -> bool {
    walkdir::WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .any(|e| e.file_type().is_file() && template::is_template_file(&e.file_name().to_string_lossy()))
}

/// Pushes the children of `source_dir` so they pop in name order.
fn push_children(
    stack: &mut Vec<(PathBuf, PathBuf)>,
    source_dir: &Path,
    target_dir: &Path,
) -> Result<(), StorageError> {
    let read_dir = std::fs::read_dir(source_dir).map_err(|e| StorageError::ReadFile {
        path: source_dir.to_path_buf(),
        source: e,
    })?;

    let mut children: Vec<PathBuf> = read_dir.filter_map(|e| e.ok()).map(|e| e.path()).collect();
    children.sort();

    for child in children.into_iter().rev() {
        if let Some(name) = child.file_name() {
            let target = target_dir.join(name);
            stack.push((child, target));
        }
    }
    Ok(())
}

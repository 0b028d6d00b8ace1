//! Test harness for isolated reconciliation runs.
//!
//! Each `TestHarness` owns a temporary directory holding a backup root, a
//! target root standing in for `$HOME`, and an on-disk state database.

#![allow(dead_code)]

use std::path::{Path, PathBuf};

use tempfile::TempDir;

use dotweave::db::Database;
use dotweave::platform::Platform;
use dotweave::reconcile::{ReconcileOptions, ReconcileSummary, Reconciler, ResolvedEntry};
use dotweave::state::SqliteRenderStore;

pub struct TestHarness {
    temp_dir: TempDir,
    pub backup_root: PathBuf,
    pub target_root: PathBuf,
    pub db_path: PathBuf,
    platform: Platform,
}

impl TestHarness {
    /// Linux host `myhost`, user `tester`.
    pub fn new() -> Self {
        Self::with_platform(
            Platform::default()
                .with_os("linux")
                .with_distro("arch")
                .with_hostname("myhost")
                .with_user("tester"),
        )
    }

    pub fn with_platform(platform: Platform) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let base = temp_dir.path();

        let backup_root = base.join("dotfiles");
        let target_root = base.join("home");
        std::fs::create_dir_all(&backup_root).expect("Failed to create backup root");
        std::fs::create_dir_all(&target_root).expect("Failed to create target root");

        Self {
            db_path: base.join("state").join("state.db"),
            temp_dir,
            backup_root,
            target_root,
            platform,
        }
    }

    pub fn platform(&self) -> &Platform {
        &self.platform
    }

    pub fn temp_path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Writes a file under the backup root and returns its path.
    pub fn write_backup(&self, rel: &str, content: &str) -> PathBuf {
        write(&self.backup_root.join(rel), content)
    }

    /// Writes a file under the target root and returns its path.
    pub fn write_target(&self, rel: &str, content: &str) -> PathBuf {
        write(&self.target_root.join(rel), content)
    }

    pub fn backup(&self, rel: &str) -> PathBuf {
        self.backup_root.join(rel)
    }

    pub fn target(&self, rel: &str) -> PathBuf {
        self.target_root.join(rel)
    }

    pub fn read(&self, path: &Path) -> String {
        std::fs::read_to_string(path)
            .unwrap_or_else(|e| panic!("Failed to read {}: {}", path.display(), e))
    }

    /// Opens the harness database. Every call opens a fresh connection, the
    /// way a new process would.
    pub fn store(&self) -> SqliteRenderStore {
        SqliteRenderStore::new(Database::open(&self.db_path).expect("Failed to open state db"))
    }

    pub fn reconciler(&self, options: ReconcileOptions) -> Reconciler<SqliteRenderStore> {
        Reconciler::new(self.platform.clone(), self.store(), &self.backup_root).with_options(options)
    }

    /// Whole-folder entry: `dotfiles/<name>` managed at `home/<name>`.
    pub fn folder_entry(&self, name: &str) -> ResolvedEntry {
        ResolvedEntry {
            name: name.to_string(),
            backup_dir: self.backup(name),
            target_dir: self.target(name),
            files: vec![],
            sudo: false,
        }
    }

    /// File-list entry: selected files of `dotfiles/<name>` linked into the
    /// target root.
    pub fn file_entry(&self, name: &str, files: &[&str]) -> ResolvedEntry {
        ResolvedEntry {
            name: name.to_string(),
            backup_dir: self.backup(name),
            target_dir: self.target_root.clone(),
            files: files.iter().map(|f| f.to_string()).collect(),
            sudo: false,
        }
    }

    /// Runs one entry with a fresh reconciler over the on-disk database.
    pub fn run(&self, entry: &ResolvedEntry, options: ReconcileOptions) -> ReconcileSummary {
        self.reconciler(options).reconcile_entry(entry)
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

fn write(path: &Path, content: &str) -> PathBuf {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("Failed to create parent directory");
    }
    std::fs::write(path, content).expect("Failed to write file");
    path.to_path_buf()
}

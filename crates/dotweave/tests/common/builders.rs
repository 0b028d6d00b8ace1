//! Builder patterns for creating test configurations programmatically.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use dotweave::config::{Config, Entry};

/// Builder for creating `Config` instances.
pub struct ConfigBuilder {
    backup_root: PathBuf,
    state_database: Option<PathBuf>,
    dry_run: bool,
    force_render: bool,
    entries: Vec<Entry>,
}

impl ConfigBuilder {
    pub fn new(backup_root: &Path) -> Self {
        Self {
            backup_root: backup_root.to_path_buf(),
            state_database: None,
            dry_run: false,
            force_render: false,
            entries: vec![],
        }
    }

    pub fn state_database(mut self, path: &Path) -> Self {
        self.state_database = Some(path.to_path_buf());
        self
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn force_render(mut self, force: bool) -> Self {
        self.force_render = force;
        self
    }

    pub fn entry(mut self, entry: Entry) -> Self {
        self.entries.push(entry);
        self
    }

    pub fn build(self) -> Config {
        Config {
            version: 1,
            backup_root: self.backup_root,
            state_database: self.state_database,
            dry_run: self.dry_run,
            force_render: self.force_render,
            entries: self.entries,
        }
    }
}

/// Builder for creating `Entry` instances.
pub struct EntryBuilder {
    name: String,
    backup: String,
    targets: BTreeMap<String, String>,
    sudo: bool,
    files: Vec<String>,
}

impl EntryBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            backup: name.to_string(),
            targets: BTreeMap::new(),
            sudo: false,
            files: vec![],
        }
    }

    pub fn backup(mut self, backup: &str) -> Self {
        self.backup = backup.to_string();
        self
    }

    pub fn target(mut self, os: &str, path: &str) -> Self {
        self.targets.insert(os.to_string(), path.to_string());
        self
    }

    pub fn file(mut self, file: &str) -> Self {
        self.files.push(file.to_string());
        self
    }

    pub fn build(self) -> Entry {
        Entry {
            name: self.name,
            backup: self.backup,
            targets: self.targets,
            sudo: self.sudo,
            files: self.files,
        }
    }
}

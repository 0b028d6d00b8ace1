use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::TemplateError;
use crate::template::TemplateEngine;

pub const CONFIG_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    pub version: u32,
    /// Root of the dotfile repository. Entry `backup` paths are relative to it.
    pub backup_root: PathBuf,
    #[serde(default)]
    pub state_database: Option<PathBuf>,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default)]
    pub force_render: bool,
    #[serde(default)]
    pub entries: Vec<Entry>,
}

impl Config {
    /// Where the render history lives: the configured path, else
    /// `<data dir>/dotweave/state.db`, else `<backup_root>/.dotweave/state.db`.
    pub fn state_database_path(&self) -> PathBuf {
        if let Some(path) = &self.state_database {
            return expand_home(&path.to_string_lossy());
        }
        crate::db::default_database_path()
            .unwrap_or_else(|| self.backup_root.join(".dotweave").join("state.db"))
    }

    pub fn backup_path(&self, entry: &Entry) -> PathBuf {
        self.backup_root.join(&entry.backup)
    }

    /// Expands `~` in `backupRoot` and `stateDatabase` and anchors relative
    /// paths at `base`. Symlinks point into the backup root, so it must be
    /// absolute before anything is linked.
    pub fn resolve_paths(&mut self, base: &Path) {
        self.backup_root = resolve_against(&self.backup_root, base);
        if let Some(path) = &self.state_database {
            self.state_database = Some(resolve_against(path, base));
        }
    }
}

fn resolve_against(path: &Path, base: &Path) -> PathBuf {
    let expanded = expand_home(&path.to_string_lossy());
    if expanded.is_absolute() {
        expanded
    } else {
        base.join(expanded)
    }
}

/// One managed location: a backup folder (or a list of files inside it) and
/// where it lives on each OS.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entry {
    pub name: String,
    pub backup: String,
    /// OS name (`linux`, `darwin`, `windows`) to target path. Target paths may
    /// contain template actions and a leading `~`.
    #[serde(default)]
    pub targets: BTreeMap<String, String>,
    #[serde(default)]
    pub sudo: bool,
    /// When empty the whole backup folder is managed.
    #[serde(default)]
    pub files: Vec<String>,
}

impl Entry {
    pub fn target_for(&self, os: &str) -> Option<&str> {
        self.targets.get(os).map(String::as_str)
    }

    pub fn is_folder(&self) -> bool {
        self.files.is_empty()
    }

    /// Renders the target path for the engine's platform and expands `~`.
    pub fn resolve_target(
        &self,
        os: &str,
        engine: &TemplateEngine,
    ) -> Result<Option<PathBuf>, TemplateError> {
        let Some(raw) = self.target_for(os) else {
            return Ok(None);
        };
        let rendered = engine.render_str(&format!("{}.target", self.name), raw)?;
        let rendered = rendered.trim();
        if rendered.is_empty() {
            return Ok(None);
        }
        Ok(Some(expand_home(rendered)))
    }
}

/// Expands a leading `~` or `~/` to the home directory.
pub fn expand_home(path: &str) -> PathBuf {
    let rest = if path == "~" {
        Some("")
    } else {
        path.strip_prefix("~/").or_else(|| path.strip_prefix("~\\"))
    };

    match (rest, dirs::home_dir()) {
        (Some(rest), Some(home)) if rest.is_empty() => home,
        (Some(rest), Some(home)) => home.join(rest),
        _ => Path::new(path).to_path_buf(),
    }
}

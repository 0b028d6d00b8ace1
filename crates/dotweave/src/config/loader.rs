use std::collections::HashSet;
use std::path::Path;

use crate::config::schema::{Config, CONFIG_VERSION};
use crate::error::ConfigError;

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    let mut config = parse_config(&content)?;

    // Relative paths are relative to the directory holding the file
    let base = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => std::path::absolute(dir),
        _ => std::env::current_dir(),
    }
    .map_err(ConfigError::WorkingDirectory)?;
    config.resolve_paths(&base);

    Ok(config)
}

/// Parses and validates config JSON. Relative paths are anchored at the
/// current working directory.
pub fn load_config_from_str(content: &str) -> Result<Config, ConfigError> {
    let mut config = parse_config(content)?;

    let cwd = std::env::current_dir().map_err(ConfigError::WorkingDirectory)?;
    config.resolve_paths(&cwd);

    Ok(config)
}

fn parse_config(content: &str) -> Result<Config, ConfigError> {
    let config: Config = serde_json::from_str(content)?;

    validate_config(&config)?;

    Ok(config)
}

fn invalid(message: String) -> ConfigError {
    ConfigError::Validation { message }
}

/// Rejects NUL bytes and `..` traversal in repository-relative paths.
pub fn validate_path(path: &str) -> Result<(), String> {
    if path.contains('\0') {
        return Err("path contains null byte".to_string());
    }
    if path.contains("..") {
        return Err("path contains traversal pattern '..'".to_string());
    }
    Ok(())
}

fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.version != CONFIG_VERSION {
        return Err(invalid(format!(
            "Unsupported config version: {} (expected {})",
            config.version, CONFIG_VERSION
        )));
    }

    if config.backup_root.as_os_str().is_empty() {
        return Err(invalid("backupRoot must not be empty".to_string()));
    }

    let mut names = HashSet::new();
    for entry in &config.entries {
        if entry.name.trim().is_empty() {
            return Err(invalid("Entry has empty name".to_string()));
        }
        if !names.insert(entry.name.as_str()) {
            return Err(invalid(format!("Duplicate entry name '{}'", entry.name)));
        }

        validate_path(&entry.backup).map_err(|reason| {
            invalid(format!("Entry '{}' backup path: {}", entry.name, reason))
        })?;

        for file in &entry.files {
            validate_path(file).map_err(|reason| {
                invalid(format!("Entry '{}' file '{}': {}", entry.name, file, reason))
            })?;
            if file.is_empty() || Path::new(file).is_absolute() {
                return Err(invalid(format!(
                    "Entry '{}' file '{}' must be a relative path",
                    entry.name, file
                )));
            }
        }

        for (os, target) in &entry.targets {
            if target.contains('\0') {
                return Err(invalid(format!(
                    "Entry '{}' target for {} contains null byte",
                    entry.name, os
                )));
            }
        }
    }

    Ok(())
}

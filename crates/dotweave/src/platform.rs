//! Read-only snapshot of the machine a reconciliation runs on.
//!
//! A `Platform` is built once before any rendering and handed to the template
//! engine as its context. Nothing in the engine mutates it.

use std::collections::BTreeMap;

pub const OS_LINUX: &str = "linux";
pub const OS_MACOS: &str = "darwin";
pub const OS_WINDOWS: &str = "windows";

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Platform {
    pub os: String,
    /// Linux distribution ID from `/etc/os-release` (e.g. "arch", "ubuntu").
    pub distro: String,
    pub hostname: String,
    pub user: String,
    pub has_display: bool,
    pub env: BTreeMap<String, String>,
}

impl Platform {
    /// Detects the current machine.
    pub fn detect() -> Self {
        let os = detect_os();
        let env: BTreeMap<String, String> = std::env::vars().collect();
        let distro = if os == OS_LINUX {
            detect_distro().unwrap_or_default()
        } else {
            String::new()
        };
        let has_display = detect_display(&os, &env);

        let platform = Self {
            hostname: detect_hostname(&env),
            user: detect_user(&env),
            os,
            distro,
            has_display,
            env,
        };

        log::debug!(
            "Detected platform os={} distro={} hostname={} display={}",
            platform.os,
            platform.distro,
            platform.hostname,
            platform.has_display
        );

        platform
    }

    pub fn with_os(&self, os: &str) -> Self {
        Self {
            os: os.to_string(),
            ..self.clone()
        }
    }

    pub fn with_hostname(&self, hostname: &str) -> Self {
        Self {
            hostname: hostname.to_string(),
            ..self.clone()
        }
    }

    pub fn with_user(&self, user: &str) -> Self {
        Self {
            user: user.to_string(),
            ..self.clone()
        }
    }

    pub fn with_distro(&self, distro: &str) -> Self {
        Self {
            distro: distro.to_string(),
            ..self.clone()
        }
    }

    pub fn with_display(&self, has_display: bool) -> Self {
        Self {
            has_display,
            ..self.clone()
        }
    }

    pub fn with_env(&self, key: &str, value: &str) -> Self {
        let mut env = self.env.clone();
        env.insert(key.to_string(), value.to_string());
        Self {
            env,
            ..self.clone()
        }
    }
}

fn detect_os() -> String {
    if cfg!(windows) {
        return OS_WINDOWS.to_string();
    }
    if cfg!(target_os = "macos") {
        return OS_MACOS.to_string();
    }

    // Cross-platform shells on Windows export OS=Windows_NT
    if std::env::var("OS")
        .map(|v| v.to_lowercase().contains("windows"))
        .unwrap_or(false)
    {
        return OS_WINDOWS.to_string();
    }

    OS_LINUX.to_string()
}

fn detect_distro() -> Option<String> {
    let content = std::fs::read_to_string("/etc/os-release").ok()?;
    parse_os_release_id(&content)
}

fn parse_os_release_id(content: &str) -> Option<String> {
    content
        .lines()
        .find_map(|line| line.strip_prefix("ID="))
        .map(|id| id.trim().trim_matches('"').to_string())
}

fn detect_hostname(env: &BTreeMap<String, String>) -> String {
    if let Ok(name) = std::fs::read_to_string("/etc/hostname") {
        let name = name.trim();
        if !name.is_empty() {
            return name.to_string();
        }
    }

    for key in ["HOSTNAME", "COMPUTERNAME"] {
        if let Some(name) = env.get(key).filter(|v| !v.is_empty()) {
            return name.clone();
        }
    }

    std::process::Command::new("hostname")
        .output()
        .ok()
        .filter(|out| out.status.success())
        .map(|out| String::from_utf8_lossy(&out.stdout).trim().to_string())
        .unwrap_or_default()
}

fn detect_user(env: &BTreeMap<String, String>) -> String {
    ["USER", "USERNAME", "LOGNAME"]
        .iter()
        .find_map(|key| env.get(*key).filter(|v| !v.is_empty()).cloned())
        .unwrap_or_default()
}

fn detect_display(os: &str, env: &BTreeMap<String, String>) -> bool {
    if os != OS_LINUX {
        return true;
    }
    ["DISPLAY", "WAYLAND_DISPLAY"]
        .iter()
        .any(|key| env.get(*key).map(|v| !v.is_empty()).unwrap_or(false))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_os_release_id() {
        let content = "NAME=\"Arch Linux\"\nID=arch\nBUILD_ID=rolling\n";
        assert_eq!(parse_os_release_id(content), Some("arch".to_string()));

        let quoted = "NAME=Ubuntu\nID=\"ubuntu\"\nID_LIKE=debian\n";
        assert_eq!(parse_os_release_id(quoted), Some("ubuntu".to_string()));

        assert_eq!(parse_os_release_id("NAME=nothing\n"), None);
    }

    #[test]
    fn test_with_builders_do_not_mutate_original() {
        let base = Platform::default().with_os(OS_LINUX).with_hostname("one");
        let other = base.with_hostname("two").with_env("EDITOR", "nvim");

        assert_eq!(base.hostname, "one");
        assert!(base.env.is_empty());
        assert_eq!(other.hostname, "two");
        assert_eq!(other.os, OS_LINUX);
        assert_eq!(other.env.get("EDITOR"), Some(&"nvim".to_string()));
    }

    #[test]
    fn test_display_detection_linux() {
        let mut env = BTreeMap::new();
        assert!(!detect_display(OS_LINUX, &env));

        env.insert("WAYLAND_DISPLAY".to_string(), "wayland-0".to_string());
        assert!(detect_display(OS_LINUX, &env));

        assert!(detect_display(OS_WINDOWS, &BTreeMap::new()));
    }

    #[test]
    fn test_detect_user_prefers_user_var() {
        let mut env = BTreeMap::new();
        env.insert("USERNAME".to_string(), "win".to_string());
        env.insert("USER".to_string(), "unix".to_string());
        assert_eq!(detect_user(&env), "unix");
    }

    #[test]
    fn test_detect_is_populated() {
        let platform = Platform::detect();
        assert!(!platform.os.is_empty());
    }
}

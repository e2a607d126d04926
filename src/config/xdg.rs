//! XDG Base Directory support.

use std::path::{Path, PathBuf};

/// Application directory name under each XDG root.
const APP_DIR: &str = "codepot";

/// XDG directory paths for codepot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XdgDirs {
    /// Config directory (~/.config/codepot or XDG_CONFIG_HOME/codepot)
    pub config: PathBuf,
    /// Data directory (~/.local/share/codepot or XDG_DATA_HOME/codepot)
    pub data: PathBuf,
    /// Cache directory (~/.cache/codepot or XDG_CACHE_HOME/codepot)
    pub cache: PathBuf,
}

/// Resolve one XDG root from its environment value, falling back to `home/default`.
fn resolve(var: Option<String>, home: &Path, default: &str) -> PathBuf {
    var.filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| home.join(default))
        .join(APP_DIR)
}

impl XdgDirs {
    /// Get XDG directories, respecting environment variables.
    pub fn new() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        let var = |name: &str| std::env::var(name).ok();

        Self {
            config: resolve(var("XDG_CONFIG_HOME"), &home, ".config"),
            data: resolve(var("XDG_DATA_HOME"), &home, ".local/share"),
            cache: resolve(var("XDG_CACHE_HOME"), &home, ".cache"),
        }
    }

    /// All directories under one root (tests and portable installs).
    pub fn under(root: &Path) -> Self {
        Self {
            config: root.join("config"),
            data: root.join("data"),
            cache: root.join("cache"),
        }
    }

    /// Ensure all directories exist.
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        for dir in [&self.config, &self.data, &self.cache] {
            std::fs::create_dir_all(dir)?;
        }
        Ok(())
    }

    /// Default config file.
    pub fn config_file(&self) -> PathBuf {
        self.config.join("config.json")
    }

    /// Saved conversations.
    pub fn sessions_dir(&self) -> PathBuf {
        self.data.join("sessions")
    }
}

impl Default for XdgDirs {
    fn default() -> Self {
        Self::new()
    }
}

//! Process-level configuration: a small TOML file separate from the
//! per-project `sdd/sdd.json` (that one is spec-driven state, this one is
//! process bootstrap preference), loaded once at startup.

use anyhow::{Context, Result};
use sdd_pipeline::Mode;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessConfig {
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
    #[serde(default = "default_mode")]
    pub default_mode: Mode,
    #[serde(default)]
    pub log_level: Option<String>,
}

fn default_mode() -> Mode {
    Mode::Guided
}

impl Default for ProcessConfig {
    fn default() -> Self {
        ProcessConfig {
            data_dir: None,
            default_mode: default_mode(),
            log_level: None,
        }
    }
}

impl ProcessConfig {
    /// Loads `config.toml` from the standard per-user config directory.
    /// Returns `Default` if the file does not exist or the directory cannot
    /// be determined (e.g. no HOME in a container).
    pub fn load() -> Result<Self> {
        let path = match Self::config_path() {
            Some(p) => p,
            None => return Ok(Self::default()),
        };
        Self::load_from(&path)
    }

    fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let cfg: Self = toml::from_str(&content)
            .with_context(|| format!("parsing config {}", path.display()))?;
        Ok(cfg)
    }

    fn config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "sdd-mcp").map(|d| d.config_dir().join("config.toml"))
    }

    /// Resolution order: the `--data-dir` CLI flag, then `SDD_MCP_DATA_DIR`
    /// (so integration tests can isolate the database without touching the
    /// real per-user config), then `config.toml`'s `data_dir`, then the
    /// standard per-user data directory.
    pub fn resolved_db_path(&self, override_dir: Option<&Path>) -> PathBuf {
        if let Some(dir) = override_dir {
            return dir.join("observations.sqlite3");
        }
        if let Ok(dir) = std::env::var("SDD_MCP_DATA_DIR") {
            return PathBuf::from(dir).join("observations.sqlite3");
        }
        if let Some(dir) = &self.data_dir {
            return dir.join("observations.sqlite3");
        }
        sdd_store::default_db_path()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_from_missing_file_returns_default() {
        let dir = TempDir::new().unwrap();
        let cfg = ProcessConfig::load_from(&dir.path().join("config.toml")).unwrap();
        assert_eq!(cfg.default_mode, Mode::Guided);
    }

    #[test]
    fn test_load_from_parses_toml() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "default_mode = \"expert\"\n").unwrap();
        let cfg = ProcessConfig::load_from(&path).unwrap();
        assert_eq!(cfg.default_mode, Mode::Expert);
    }

    #[test]
    fn test_resolved_db_path_prefers_override() {
        let cfg = ProcessConfig::default();
        let dir = TempDir::new().unwrap();
        let path = cfg.resolved_db_path(Some(dir.path()));
        assert_eq!(path, dir.path().join("observations.sqlite3"));
    }
}

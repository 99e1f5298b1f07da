use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Per-project usage statistics, stored in TOML.
/// Keeps last 20 records per tool for P95 estimation.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct UsageStats {
    #[serde(default)]
    history: HashMap<String, Vec<u64>>,
}

impl UsageStats {
    /// P95 estimate: take 95th percentile from sorted history.
    /// Returns None if no history exists for this tool.
    pub fn get_p95_estimate(&self, tool: &str) -> Option<u64> {
        let records = self.history.get(tool)?;
        if records.is_empty() {
            return None;
        }

        let mut sorted = records.clone();
        sorted.sort_unstable();

        let idx = ((sorted.len() as f64) * 0.95).ceil() as usize;
        let idx = idx.min(sorted.len()).saturating_sub(1);
        Some(sorted[idx])
    }

    /// Record a usage observation. Keeps last 20 entries.
    pub fn record(&mut self, tool: &str, usage_mb: u64) {
        let entry = self.history.entry(tool.to_string()).or_default();
        entry.push(usage_mb);
        if entry.len() > 20 {
            entry.remove(0); // Remove oldest
        }
    }

    /// Load from file. Returns default if file doesn't exist.
    pub fn load(stats_path: &Path) -> Result<Self> {
        if !stats_path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(stats_path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Save to file. Creates parent directories if needed.
    pub fn save(&self, stats_path: &Path) -> Result<()> {
        if let Some(parent) = stats_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(stats_path, content)?;
        Ok(())
    }
}

use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use regex::RegexBuilder;
use tracing::warn;

use crate::entry::MemoryEntry;

const MEMORY_FILE_NAME: &str = "memories.jsonl";
const APP_NAME: &str = "cli-sub-agent";

#[derive(Debug, Clone, Default)]
pub struct MemoryFilter {
    pub project: Option<String>,
    pub tool: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub tag: Option<String>,
}

#[derive(Debug, Clone)]
pub struct MemoryStore {
    base_dir: PathBuf,
    file_path: PathBuf,
}

impl MemoryStore {
    pub fn new(base_dir: PathBuf) -> Self {
        let base_dir = if base_dir.as_os_str().is_empty() {
            default_memory_base_dir()
        } else {
            base_dir
        };
        Self {
            file_path: base_dir.join(MEMORY_FILE_NAME),
            base_dir,
        }
    }

    pub fn append(&self, entry: &MemoryEntry) -> Result<()> {
        self.ensure_storage_dir()?;

        let mut file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(&self.file_path)
            .with_context(|| format!("failed to open memory file: {}", self.file_path.display()))?;

        set_file_mode_600(&self.file_path)?;

        let line = serde_json::to_string(entry).context("failed to serialize memory entry")?;
        writeln!(file, "{line}").context("failed to append memory entry")?;
        file.flush()
            .context("failed to flush memory entry append")?;

        Ok(())
    }

    /// Rewrite all entries atomically (used by consolidation/GC).
    pub fn rewrite_all(&self, entries: &[MemoryEntry]) -> Result<()> {
        self.ensure_storage_dir()?;

        let tmp_path = self.base_dir.join("memories.jsonl.tmp");
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp_path)
            .with_context(|| format!("failed to open temp memory file: {}", tmp_path.display()))?;
        set_file_mode_600(&tmp_path)?;

        let mut writer = BufWriter::new(file);
        for entry in entries {
            let line = serde_json::to_string(entry).context("failed to serialize memory entry")?;
            writeln!(writer, "{line}").context("failed to write memory entry")?;
        }
        writer
            .flush()
            .context("failed to flush rewritten memory file")?;

        fs::rename(&tmp_path, &self.file_path).with_context(|| {
            format!(
                "failed to atomically replace memory file {}",
                self.file_path.display()
            )
        })?;
        Ok(())
    }

    pub fn load_all(&self) -> Result<Vec<MemoryEntry>> {
        if !self.file_path.exists() {
            return Ok(Vec::new());
        }

        let file = OpenOptions::new()
            .read(true)
            .open(&self.file_path)
            .with_context(|| format!("failed to read memory file: {}", self.file_path.display()))?;
        let reader = BufReader::new(file);

        let now = Utc::now();
        let mut entries = Vec::new();
        for (idx, line_result) in reader.lines().enumerate() {
            let line = line_result.with_context(|| {
                format!(
                    "failed to read memory line {} from {}",
                    idx + 1,
                    self.file_path.display()
                )
            })?;

            if line.trim().is_empty() {
                continue;
            }

            match serde_json::from_str::<MemoryEntry>(&line) {
                Ok(entry) => {
                    if entry.valid_until.is_some_and(|until| until < now) {
                        continue;
                    }
                    entries.push(entry);
                }
                Err(error) => {
                    warn!(
                        path = %self.file_path.display(),
                        line_number = idx + 1,
                        %error,
                        "skipping corrupt memory jsonl line"
                    );
                }
            }
        }

        Ok(entries)
    }

    pub fn quick_search(&self, pattern: &str) -> Result<Vec<MemoryEntry>> {
        let regex = RegexBuilder::new(pattern)
            .case_insensitive(true)
            .build()
            .with_context(|| format!("invalid regex pattern: {pattern}"))?;

        let mut entries: Vec<MemoryEntry> = self
            .load_all()?
            .into_iter()
            .filter(|entry| {
                regex.is_match(&entry.content)
                    || entry.facts.iter().any(|fact| regex.is_match(fact))
            })
            .collect();

        entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(entries)
    }

    pub fn list(&self, filter: MemoryFilter) -> Result<Vec<MemoryEntry>> {
        let mut entries: Vec<MemoryEntry> = self
            .load_all()?
            .into_iter()
            .filter(|entry| match &filter.project {
                Some(project) => entry.project.as_ref() == Some(project),
                None => true,
            })
            .filter(|entry| match &filter.tool {
                Some(tool) => entry.tool.as_ref() == Some(tool),
                None => true,
            })
            .filter(|entry| match filter.since {
                Some(since) => entry.timestamp >= since,
                None => true,
            })
            .filter(|entry| match &filter.tag {
                Some(tag) => entry.tags.iter().any(|entry_tag| entry_tag == tag),
                None => true,
            })
            .collect();

        entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(entries)
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn ensure_storage_dir(&self) -> Result<()> {
        let dir_exists = self.base_dir.exists();
        fs::create_dir_all(&self.base_dir)
            .with_context(|| format!("failed to create memory dir: {}", self.base_dir.display()))?;

        if !dir_exists {
            set_dir_mode_700(&self.base_dir)?;
        }

        Ok(())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(PathBuf::new())
    }
}

pub fn append_entry(entry: &MemoryEntry) -> Result<()> {
    MemoryStore::default().append(entry)
}

pub fn quick_search(pattern: &str) -> Result<Vec<MemoryEntry>> {
    MemoryStore::default().quick_search(pattern)
}

pub fn list_entries(filter: MemoryFilter) -> Result<Vec<MemoryEntry>> {
    MemoryStore::default().list(filter)
}

fn default_memory_base_dir() -> PathBuf {
    if let Some(project_dirs) = directories::ProjectDirs::from("", "", APP_NAME) {
        return project_dirs
            .state_dir()
            .unwrap_or_else(|| project_dirs.data_local_dir())
            .join("memory");
    }

    if let Some(base_dirs) = directories::BaseDirs::new() {
        return base_dirs
            .home_dir()
            .join(".local")
            .join("state")
            .join(APP_NAME)
            .join("memory");
    }

    std::env::temp_dir()
        .join(format!("{APP_NAME}-state"))
        .join("memory")
}

#[cfg(unix)]
fn set_dir_mode_700(path: &std::path::Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o700))
        .with_context(|| format!("failed to chmod 700: {}", path.display()))
}

#[cfg(not(unix))]
fn set_dir_mode_700(_path: &std::path::Path) -> Result<()> {
    Ok(())
}

#[cfg(unix)]
fn set_file_mode_600(path: &std::path::Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))
        .with_context(|| format!("failed to chmod 600: {}", path.display()))
}

#[cfg(not(unix))]
fn set_file_mode_600(_path: &std::path::Path) -> Result<()> {
    Ok(())
}

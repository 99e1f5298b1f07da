use crate::fsutil::atomic_write;
use sdd_core::{now_rfc3339, CoreError, CoreResult};
use sdd_pipeline::{Mode, PipelineState, Stage, STAGE_ORDER};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const SDD_DIR: &str = "sdd";
const CONFIG_FILE: &str = "sdd.json";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProjectConfig {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub mode: Mode,
    #[serde(flatten)]
    pub pipeline: PipelineState,
    #[serde(default)]
    pub clarity_score: u32,
    pub created_at: String,
    pub updated_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_change_slug: Option<String>,
}

impl ProjectConfig {
    pub fn new(name: &str, description: &str, mode: Mode) -> Self {
        let now = now_rfc3339();
        let mut pipeline = PipelineState::new(STAGE_ORDER.to_vec());
        // `init` is the container's own bootstrap step: it's done the
        // moment the config exists, so the pipeline starts at `propose`.
        pipeline.advance().expect("init -> propose is always valid");
        ProjectConfig {
            name: name.to_string(),
            description: description.to_string(),
            mode,
            pipeline,
            clarity_score: 0,
            created_at: now.clone(),
            updated_at: now,
            active_change_slug: None,
        }
    }

    pub fn current_stage(&self) -> Stage {
        self.pipeline.current_stage
    }
}

pub fn sdd_dir(project_root: &Path) -> PathBuf {
    project_root.join(SDD_DIR)
}

fn config_path(project_root: &Path) -> PathBuf {
    sdd_dir(project_root).join(CONFIG_FILE)
}

/// Loads `sdd/sdd.json`. Returns `Ok(None)` if it does not exist.
pub fn load(project_root: &Path) -> CoreResult<Option<ProjectConfig>> {
    let path = config_path(project_root);
    if !path.exists() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(&path)?;
    let cfg: ProjectConfig = serde_json::from_str(&content)?;
    Ok(Some(cfg))
}

/// Writes `sdd/sdd.json` atomically, refreshing `updated_at` first.
pub fn save(project_root: &Path, cfg: &mut ProjectConfig) -> CoreResult<()> {
    cfg.updated_at = now_rfc3339();
    std::fs::create_dir_all(sdd_dir(project_root))?;
    let body = serde_json::to_string_pretty(cfg)?;
    atomic_write(&config_path(project_root), body.as_bytes())
}

/// Walks upward from `start` until a directory containing `sdd/sdd.json`
/// is found. Mirrors the "nearest project marker" resolution convention
/// used throughout the toolchain for locating a project root from any
/// working directory beneath it.
pub fn find_project_root(start: &Path) -> CoreResult<PathBuf> {
    let mut dir = start
        .canonicalize()
        .map_err(|e| CoreError::Io(format!("resolving {}: {e}", start.display())))?;
    loop {
        if config_path(&dir).is_file() {
            return Ok(dir);
        }
        match dir.parent() {
            Some(parent) => dir = parent.to_path_buf(),
            None => return Err(CoreError::ProjectRootNotFound),
        }
    }
}

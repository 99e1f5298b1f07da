use rusqlite::Connection;
use sdd_core::{CoreError, CoreResult};
use std::path::{Path, PathBuf};

/// Shared handle every tool handler is given: the observation-store
/// connection and the resolved project root (if the current working
/// directory sits inside one). Project-pipeline and change-pipeline tools
/// require `project_root`; memory tools work without it.
pub struct ToolContext {
    pub conn: Connection,
    pub project_root: Option<PathBuf>,
}

impl ToolContext {
    /// Resolves the project root by walking up from `start_dir` looking for
    /// `sdd/sdd.json`; if none is found, `start_dir` itself is used so that
    /// `sdd_init_project` has somewhere to create one.
    pub fn open(db_path: &Path, start_dir: &Path) -> CoreResult<Self> {
        let conn = sdd_store::open(db_path)?;
        let project_root = Some(
            sdd_config::find_project_root(start_dir).unwrap_or_else(|_| start_dir.to_path_buf()),
        );
        Ok(ToolContext { conn, project_root })
    }

    #[cfg(test)]
    pub fn in_memory(project_root: Option<PathBuf>) -> CoreResult<Self> {
        let conn = sdd_store::open_in_memory()?;
        Ok(ToolContext { conn, project_root })
    }

    pub fn require_project_root(&self) -> CoreResult<&Path> {
        self.project_root
            .as_deref()
            .ok_or(CoreError::ProjectRootNotFound)
    }
}

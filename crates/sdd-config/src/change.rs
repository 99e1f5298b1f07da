use crate::fsutil::{atomic_write, with_write_lock};
use crate::project;
use sdd_core::{now_rfc3339, slugify, CoreError, CoreResult};
use sdd_pipeline::{flow_for, ChangeSize, ChangeType, PipelineState, Stage};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const CHANGES_DIR: &str = "changes";
const CHANGE_FILE: &str = "change.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeStatus {
    InProgress,
    Complete,
    Abandoned,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Change {
    pub id: String,
    #[serde(rename = "type")]
    pub change_type: ChangeType,
    pub size: ChangeSize,
    pub description: String,
    pub status: ChangeStatus,
    #[serde(flatten)]
    pub pipeline: PipelineState,
    pub created_at: String,
    pub updated_at: String,
}

impl Change {
    pub fn current_stage(&self) -> Stage {
        self.pipeline.current_stage
    }

    pub fn flow(&self) -> &[Stage] {
        &self.pipeline.order
    }
}

fn changes_dir(project_root: &Path) -> PathBuf {
    project::sdd_dir(project_root).join(CHANGES_DIR)
}

fn change_dir(project_root: &Path, slug: &str) -> PathBuf {
    changes_dir(project_root).join(slug)
}

fn change_path(project_root: &Path, slug: &str) -> PathBuf {
    change_dir(project_root, slug).join(CHANGE_FILE)
}

/// Creates a new change. Fails with `ChangeAlreadyActive` if the project
/// config already names one. The slug is derived from `description`,
/// disambiguated with a numeric suffix on collision, matching the
/// collision-safe directory-naming convention used elsewhere in this
/// toolchain for per-record directories.
pub fn create(
    project_root: &Path,
    change_type: ChangeType,
    size: ChangeSize,
    description: &str,
) -> CoreResult<Change> {
    with_write_lock(&changes_dir(project_root), || {
        let mut cfg = project::load(project_root)?
            .ok_or(CoreError::ProjectRootNotFound)?;
        if let Some(active) = &cfg.active_change_slug {
            return Err(CoreError::ChangeAlreadyActive(active.clone()));
        }

        let base_slug = slugify(description);
        let mut slug = base_slug.clone();
        let mut n = 2u32;
        while change_dir(project_root, &slug).exists() {
            slug = format!("{base_slug}-{n}");
            n += 1;
        }

        let flow = flow_for(change_type, size).to_vec();
        let now = now_rfc3339();
        let change = Change {
            id: slug.clone(),
            change_type,
            size,
            description: description.to_string(),
            status: ChangeStatus::InProgress,
            pipeline: PipelineState::new(flow),
            created_at: now.clone(),
            updated_at: now,
        };

        std::fs::create_dir_all(change_dir(project_root, &slug))?;
        let body = serde_json::to_string_pretty(&change)?;
        atomic_write(&change_path(project_root, &slug), body.as_bytes())?;

        cfg.active_change_slug = Some(slug.clone());
        project::save(project_root, &mut cfg)?;

        Ok(change)
    })
}

pub fn load(project_root: &Path, slug: &str) -> CoreResult<Change> {
    let path = change_path(project_root, slug);
    if !path.is_file() {
        return Err(CoreError::ChangeNotFound(slug.to_string()));
    }
    let content = std::fs::read_to_string(&path)?;
    Ok(serde_json::from_str(&content)?)
}

pub fn load_active(project_root: &Path) -> CoreResult<Change> {
    let cfg = project::load(project_root)?.ok_or(CoreError::ProjectRootNotFound)?;
    let slug = cfg
        .active_change_slug
        .ok_or_else(|| CoreError::InvalidInput("no change is currently active".into()))?;
    load(project_root, &slug)
}

/// Writes the current stage's artifact and advances. On reaching the
/// terminal `verify` stage, marks the change complete and clears the
/// project's `active_change_slug`.
pub fn advance_stage(project_root: &Path, slug: &str, content: &str) -> CoreResult<Change> {
    with_write_lock(&changes_dir(project_root), || {
        let mut change = load(project_root, slug)?;
        let stage = change.current_stage();
        let artifact_path = change_dir(project_root, slug).join(stage.filename());
        atomic_write(&artifact_path, content.as_bytes())?;

        change.pipeline.advance()?;
        change.updated_at = now_rfc3339();
        if change.pipeline.is_complete() {
            change.status = ChangeStatus::Complete;
        }

        let body = serde_json::to_string_pretty(&change)?;
        atomic_write(&change_path(project_root, slug), body.as_bytes())?;

        if change.status == ChangeStatus::Complete {
            if let Some(mut cfg) = project::load(project_root)? {
                if cfg.active_change_slug.as_deref() == Some(slug) {
                    cfg.active_change_slug = None;
                    project::save(project_root, &mut cfg)?;
                }
            }
        }

        Ok(change)
    })
}

/// Lists every change, newest-first by `created_at`.
pub fn list(project_root: &Path) -> CoreResult<Vec<Change>> {
    let dir = changes_dir(project_root);
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut changes = Vec::new();
    for entry in std::fs::read_dir(&dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let path = entry.path().join(CHANGE_FILE);
        if !path.is_file() {
            continue;
        }
        match std::fs::read_to_string(&path).ok().and_then(|s| serde_json::from_str::<Change>(&s).ok()) {
            Some(change) => changes.push(change),
            None => tracing::warn!(path = %path.display(), "skipping unreadable change.json"),
        }
    }
    changes.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(changes)
}

const STOPWORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "but", "to", "of", "in", "on", "for", "with", "is", "are",
    "was", "were", "be", "been", "this", "that", "it", "as", "at", "by", "from",
];

fn tokenize(s: &str) -> Vec<String> {
    s.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() >= 3 && !STOPWORDS.contains(t))
        .map(|t| t.to_string())
        .collect()
}

/// Scores completed changes by token-occurrence count against `description`,
/// returning the top `limit` by score descending. Zero-score rows are
/// dropped entirely.
pub fn keyword_match(project_root: &Path, description: &str, limit: usize) -> CoreResult<Vec<(Change, usize)>> {
    let query_tokens = tokenize(description);
    if query_tokens.is_empty() {
        return Ok(Vec::new());
    }
    let mut scored: Vec<(Change, usize)> = list(project_root)?
        .into_iter()
        .filter(|c| c.status == ChangeStatus::Complete)
        .filter_map(|c| {
            let haystack = tokenize(&format!("{} {}", c.id, c.description));
            let score = query_tokens
                .iter()
                .filter(|qt| haystack.contains(qt))
                .count();
            if score > 0 {
                Some((c, score))
            } else {
                None
            }
        })
        .collect();
    scored.sort_by(|a, b| b.1.cmp(&a.1));
    scored.truncate(limit);
    Ok(scored)
}

//! Resolve a pattern by name from standard search paths.
//!
//! Patterns are higher-level constructs that embed skills inside a
//! `patterns/<name>/skills/<name>/` directory layout. This resolver
//! searches for that layout and returns the embedded skill content.
//!
//! Search order (first match wins):
//! 1. `.csa/patterns/<name>/`               (project-local fork)
//! 2. `patterns/<name>/`                    (repo-shipped patterns)
//! 3. `.weave/deps/*/patterns/<name>/`      (weave-installed packages)

use anyhow::{Context, Result, bail};
use std::path::{Path, PathBuf};
use tracing::debug;

use weave::parser::{AgentConfig, SkillConfig, parse_skill_config};

/// A pattern resolved from disk, with its embedded skill content.
#[derive(Debug, Clone)]
pub(crate) struct ResolvedPattern {
    /// Root directory of the pattern (e.g. `patterns/csa-review/`).
    pub dir: PathBuf,
    /// Raw content of `skills/<name>/SKILL.md`.
    pub skill_md: String,
    /// Parsed `.skill.toml` configuration (if present at the pattern root).
    pub config: Option<SkillConfig>,
}

impl ResolvedPattern {
    /// Return the agent config section, if any.
    pub fn agent_config(&self) -> Option<&AgentConfig> {
        self.config.as_ref().and_then(|c| c.agent.as_ref())
    }
}

/// Resolve a pattern by name, searching standard paths in priority order.
///
/// `project_root` is the working directory / project root for the CSA run.
pub(crate) fn resolve_pattern(name: &str, project_root: &Path) -> Result<ResolvedPattern> {
    if name.is_empty() || name.contains('/') || name.contains('\\') || name.contains("..") {
        bail!("Invalid pattern name: '{name}' (must be a simple name, no path separators)");
    }

    let candidates = search_paths(name, project_root);

    for dir in &candidates {
        let skill_md_path = dir.join("skills").join(name).join("SKILL.md");
        if skill_md_path.is_file() {
            let skill_md = std::fs::read_to_string(&skill_md_path)
                .with_context(|| format!("failed to read {}", skill_md_path.display()))?;

            let config = load_skill_config(dir)?;

            debug!(pattern_dir = %dir.display(), "Pattern resolved");

            return Ok(ResolvedPattern {
                dir: dir.clone(),
                skill_md,
                config,
            });
        }
    }

    bail!(
        "Pattern '{name}' not found. Searched:\n{}",
        candidates
            .iter()
            .map(|p| format!("  - {}/skills/{name}/SKILL.md", p.display()))
            .collect::<Vec<_>>()
            .join("\n")
    )
}

/// Build the ordered list of directories to search for a pattern.
fn search_paths(name: &str, project_root: &Path) -> Vec<PathBuf> {
    let mut paths = Vec::with_capacity(4);

    // 1. Project-local fork: .csa/patterns/<name>/
    paths.push(project_root.join(".csa").join("patterns").join(name));

    // 2. Repo-shipped: patterns/<name>/
    paths.push(project_root.join("patterns").join(name));

    // 3. Weave-installed packages: .weave/deps/*/patterns/<name>/
    let weave_deps = project_root.join(".weave").join("deps");
    if let Ok(entries) = std::fs::read_dir(&weave_deps) {
        for entry in entries.flatten() {
            if entry.path().is_dir() {
                paths.push(entry.path().join("patterns").join(name));
            }
        }
    }

    paths
}

/// Load `.skill.toml` from a pattern directory (optional file).
fn load_skill_config(pattern_dir: &Path) -> Result<Option<SkillConfig>> {
    let config_path = pattern_dir.join(".skill.toml");
    if !config_path.is_file() {
        return Ok(None);
    }

    let content = std::fs::read_to_string(&config_path)
        .with_context(|| format!("failed to read {}", config_path.display()))?;

    let config = parse_skill_config(&content)
        .with_context(|| format!("failed to parse {}", config_path.display()))?;

    Ok(Some(config))
}

//! Project context loader for auto-injecting CLAUDE.md/AGENTS.md into tool sessions.
//!
//! Loads project context files lazily (only when spawning a tool) and formats them
//! as tagged blocks for injection into the tool's prompt or system prompt.

use std::path::{Path, PathBuf};

use tracing::warn;

/// Default maximum total size of injected context (bytes).
const DEFAULT_MAX_CONTEXT_BYTES: usize = 50 * 1024;

/// A loaded context file with its relative path and content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextFile {
    /// Relative path from project root (e.g., "CLAUDE.md").
    pub rel_path: String,
    /// File content.
    pub content: String,
}

/// Options for context loading.
#[derive(Debug, Clone, Default)]
pub struct ContextLoadOptions {
    /// Files to skip loading (matched against relative path).
    pub skip_files: Vec<String>,
    /// Maximum total bytes of injected context. Defaults to 50KB.
    pub max_bytes: Option<usize>,
}

/// Load project context files from `project_root`.
///
/// Reads CLAUDE.md, AGENTS.md, and any detail files referenced by AGENTS.md
/// (lines matching `→ path/to/file.md`). Skips files listed in `options.skip_files`.
/// Missing files emit a warning but do not cause failure.
///
/// Total loaded content is capped at `options.max_bytes` (default 50KB).
pub fn load_project_context(project_root: &Path, options: &ContextLoadOptions) -> Vec<ContextFile> {
    let max_bytes = options.max_bytes.unwrap_or(DEFAULT_MAX_CONTEXT_BYTES);
    let mut files = Vec::new();
    let mut total_bytes: usize = 0;

    // Primary context files in priority order.
    let primary_files = ["CLAUDE.md", "AGENTS.md"];

    for rel_path in &primary_files {
        if options.skip_files.iter().any(|s| s == rel_path) {
            continue;
        }
        if let Some(cf) = try_load_file(project_root, rel_path, max_bytes, &mut total_bytes) {
            files.push(cf);
        }
    }

    // Parse AGENTS.md for detail file references if it was loaded.
    let agents_content = files
        .iter()
        .find(|f| f.rel_path == "AGENTS.md")
        .map(|f| f.content.clone());

    if let Some(content) = agents_content {
        let refs = parse_agents_references(&content);
        for ref_path in refs {
            let rel = ref_path.to_string_lossy().to_string();
            if options.skip_files.iter().any(|s| s == &rel) {
                continue;
            }
            if let Some(cf) = try_load_file(project_root, &rel, max_bytes, &mut total_bytes) {
                files.push(cf);
            }
        }
    }

    files
}

/// Format loaded context files as tagged blocks for prompt injection.
///
/// Format: `<context-file path="CLAUDE.md">\n{content}\n</context-file>`
pub fn format_context_for_prompt(files: &[ContextFile]) -> String {
    if files.is_empty() {
        return String::new();
    }

    let mut output = String::new();
    for cf in files {
        output.push_str(&format!(
            "<context-file path=\"{}\">\n{}\n</context-file>\n\n",
            cf.rel_path, cf.content
        ));
    }
    output
}

/// Try to load a single file, respecting the byte budget.
///
/// Validates that the resolved path stays within `project_root` to prevent
/// path traversal via `../` in AGENTS.md detail references.
fn try_load_file(
    project_root: &Path,
    rel_path: &str,
    max_bytes: usize,
    total_bytes: &mut usize,
) -> Option<ContextFile> {
    let full_path = project_root.join(rel_path);

    // Boundary check: canonicalize both paths and ensure the file is within
    // project_root. This prevents `../` traversal from escaping the project.
    let canonical_root = match project_root.canonicalize() {
        Ok(p) => p,
        Err(e) => {
            warn!(path = %project_root.display(), error = %e, "Cannot canonicalize project root");
            return None;
        }
    };
    let canonical_file = match full_path.canonicalize() {
        Ok(p) => p,
        Err(e) => {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %rel_path, error = %e, "Cannot canonicalize context file path");
            }
            return None;
        }
    };
    if !canonical_file.starts_with(&canonical_root) {
        warn!(
            path = %rel_path,
            resolved = %canonical_file.display(),
            root = %canonical_root.display(),
            "Context file path escapes project root (path traversal blocked)"
        );
        return None;
    }

    match std::fs::read_to_string(&full_path) {
        Ok(content) => {
            let new_total = *total_bytes + content.len();
            if new_total > max_bytes {
                warn!(
                    path = %rel_path,
                    file_bytes = content.len(),
                    total_so_far = *total_bytes,
                    max_bytes,
                    "Skipping context file: would exceed max context bytes"
                );
                return None;
            }
            *total_bytes = new_total;
            Some(ContextFile {
                rel_path: rel_path.to_string(),
                content,
            })
        }
        Err(e) => {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %rel_path, error = %e, "Failed to read context file");
            }
            None
        }
    }
}

/// Parse AGENTS.md content for detail file references.
///
/// Looks for lines containing `→ path/to/file.md` patterns.
/// Handles both `→ ~/path` (home-relative, resolved to absolute) and
/// `→ path/to/file.md` (project-relative).
/// Returns only project-relative paths (skips home-relative ones since
/// those are user-private and may not exist in project root).
pub(crate) fn parse_agents_references(content: &str) -> Vec<PathBuf> {
    let mut refs = Vec::new();

    for line in content.lines() {
        let trimmed = line.trim();

        // Match lines like: `→ ~/s/llm/coding/rules/meta/001-task-delegation.md`
        // or `→ path/to/detail.md`
        if let Some(rest) = trimmed
            .strip_prefix("→")
            .or_else(|| trimmed.strip_prefix("->"))
        {
            let path_str = rest.trim().trim_matches('`');
            if path_str.is_empty() {
                continue;
            }
            // Skip home-relative paths (~/...) - these are user-private.
            if path_str.starts_with("~/") || path_str.starts_with('~') {
                continue;
            }
            // Skip absolute paths.
            if path_str.starts_with('/') {
                continue;
            }
            refs.push(PathBuf::from(path_str));
        }
    }

    refs
}

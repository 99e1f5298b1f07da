//! Genealogy tracking and tree building

use crate::manager::list_all_sessions_in;
use crate::state::MetaSessionState;
use anyhow::Result;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Find all child sessions of a given session
pub fn find_children(project_path: &Path, session_id: &str) -> Result<Vec<String>> {
    use crate::manager::get_session_root;
    let base_dir = get_session_root(project_path)?;
    find_children_in(&base_dir, session_id)
}

/// Internal implementation: find children in explicit base directory
fn find_children_in(base_dir: &Path, session_id: &str) -> Result<Vec<String>> {
    let all_sessions = list_all_sessions_in(base_dir)?;

    let children: Vec<String> = all_sessions
        .into_iter()
        .filter_map(|session| {
            if session.genealogy.parent_session_id.as_deref() == Some(session_id) {
                Some(session.meta_session_id)
            } else {
                None
            }
        })
        .collect();

    Ok(children)
}

/// Build a tree representation of sessions
///
/// Format: `{prefix}{short_id}  {tools}  {description}`
/// where short_id is the first 11 characters of the ULID
pub fn list_sessions_tree(project_path: &Path, tool_filter: Option<&[&str]>) -> Result<String> {
    list_sessions_tree_filtered(project_path, tool_filter, None)
}

/// Build a tree representation of sessions with optional branch filtering.
pub fn list_sessions_tree_filtered(
    project_path: &Path,
    tool_filter: Option<&[&str]>,
    branch_filter: Option<&str>,
) -> Result<String> {
    let roots = session_roots_with_legacy(project_path)?;
    let root_refs: Vec<&Path> = roots.iter().map(PathBuf::as_path).collect();
    list_sessions_tree_in_roots(&root_refs, tool_filter, branch_filter)
}

/// Internal implementation: build tree from explicit base directory
#[cfg(test)]
fn list_sessions_tree_in(
    base_dir: &Path,
    tool_filter: Option<&[&str]>,
    branch_filter: Option<&str>,
) -> Result<String> {
    list_sessions_tree_in_roots(&[base_dir], tool_filter, branch_filter)
}

fn session_roots_with_legacy(project_path: &Path) -> Result<Vec<PathBuf>> {
    use crate::manager::get_session_root;

    let primary_root = get_session_root(project_path)?;
    let mut roots = vec![primary_root.clone()];

    let Some(primary_state_dir) = csa_config::paths::state_dir_write() else {
        return Ok(roots);
    };
    let Some(legacy_state_dir) = csa_config::paths::legacy_state_dir() else {
        return Ok(roots);
    };
    let Ok(relative_root) = primary_root.strip_prefix(&primary_state_dir) else {
        return Ok(roots);
    };

    let legacy_root = legacy_state_dir.join(relative_root);
    if legacy_root != primary_root {
        roots.push(legacy_root);
    }

    Ok(roots)
}

fn list_sessions_tree_in_roots(
    base_dirs: &[&Path],
    tool_filter: Option<&[&str]>,
    branch_filter: Option<&str>,
) -> Result<String> {
    let mut all_sessions = Vec::new();
    let mut seen_ids = HashSet::new();
    for base_dir in base_dirs {
        for session in list_all_sessions_in(base_dir)? {
            if seen_ids.insert(session.meta_session_id.clone()) {
                all_sessions.push(session);
            }
        }
    }

    // Apply tool filter if specified
    if let Some(tools) = tool_filter {
        all_sessions.retain(|session| tools.iter().any(|tool| session.tools.contains_key(*tool)));
    }

    // Apply branch filter if specified
    if let Some(branch) = branch_filter {
        all_sessions.retain(|session| session.branch.as_deref() == Some(branch));
    }

    // Sort by created_at for consistent ordering
    all_sessions.sort_by(|a, b| a.created_at.cmp(&b.created_at));

    // Find root sessions (no parent)
    let roots: Vec<&MetaSessionState> = all_sessions
        .iter()
        .filter(|s| s.genealogy.parent_session_id.is_none())
        .collect();

    let mut output = String::new();

    for root in roots {
        output.push_str(&format_session_tree(root, &all_sessions, 0));
    }

    Ok(output)
}

/// Recursively format a session and its children as a tree
fn format_session_tree(
    session: &MetaSessionState,
    all_sessions: &[MetaSessionState],
    indent: usize,
) -> String {
    let mut output = String::new();

    // Build prefix
    let prefix = if indent == 0 {
        String::new()
    } else {
        "  ".repeat(indent - 1) + "├─ "
    };

    // Short ID (first 11 chars)
    let short_id = &session.meta_session_id[..11.min(session.meta_session_id.len())];

    // Tools list
    let tools: Vec<&str> = session.tools.keys().map(|s| s.as_str()).collect();
    let tools_str = if tools.is_empty() {
        "[]".to_string()
    } else {
        format!("[{}]", tools.join(", "))
    };

    // Description
    let description = session.description.as_deref().unwrap_or("<no description>");

    output.push_str(&format!(
        "{}{}  {}  {}\n",
        prefix, short_id, tools_str, description
    ));

    // Find and format children
    let children: Vec<&MetaSessionState> = all_sessions
        .iter()
        .filter(|s| s.genealogy.parent_session_id.as_deref() == Some(&session.meta_session_id))
        .collect();

    for child in children {
        output.push_str(&format_session_tree(child, all_sessions, indent + 1));
    }

    output
}

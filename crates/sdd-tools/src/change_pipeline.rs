use crate::context::ToolContext;
use sdd_core::{slugify, CoreError, CoreResult};
use sdd_pipeline::{ChangeSize, ChangeType};
use sdd_render::{parse_sections, render_change_stage, render_sections};
use sdd_store::{AddObservationParams, ObservationFilter, Scope};
use std::path::Path;

pub fn sdd_change(project_root: &Path, change_type: ChangeType, size: ChangeSize, description: &str) -> CoreResult<String> {
    let change = sdd_config::create(project_root, change_type, size, description)?;
    Ok(format!(
        "Created change \"{}\" ({change_type}/{size}). Flow: {}. Current stage: {}.",
        change.id,
        change.flow().iter().map(|s| s.as_str()).collect::<Vec<_>>().join(" -> "),
        change.current_stage(),
    ))
}

pub fn sdd_change_advance(project_root: &Path, content: &str) -> CoreResult<String> {
    let active = sdd_config::load_active(project_root)?;
    let stage = active.current_stage();
    let rendered = render_change_stage(stage, content);
    let advanced = sdd_config::advance_stage(project_root, &active.id, &rendered)?;
    if advanced.flow().last() == Some(&stage) {
        Ok(format!("Change \"{}\" complete.", advanced.id))
    } else {
        Ok(format!("Advanced \"{}\" to {}.", advanced.id, advanced.current_stage()))
    }
}

pub fn sdd_change_status(project_root: &Path) -> CoreResult<String> {
    let active = sdd_config::load_active(project_root)?;
    Ok(format!(
        "Change \"{}\" ({}/{}): stage {} of {}.",
        active.id,
        active.change_type,
        active.size,
        active.current_stage(),
        active.flow().last().map(|s| s.as_str()).unwrap_or("?"),
    ))
}

const CONVENTION_FILES: &[&str] = &["CLAUDE.md", "AGENTS.md", "README.md", "CONTRIBUTING.md"];
const CONVENTION_LINE_CAP: usize = 200;

fn read_capped(path: &Path) -> Option<String> {
    let content = std::fs::read_to_string(path).ok()?;
    Some(content.lines().take(CONVENTION_LINE_CAP).collect::<Vec<_>>().join("\n"))
}

fn scan_convention_files(project_root: &Path) -> Vec<(String, String)> {
    let mut found = Vec::new();
    for name in CONVENTION_FILES {
        if let Some(body) = read_capped(&project_root.join(name)) {
            found.push((name.to_string(), body));
        }
    }
    let cursor_rules = project_root.join(".cursor").join("rules");
    if let Ok(entries) = std::fs::read_dir(&cursor_rules) {
        for entry in entries.flatten() {
            if let Some(body) = read_capped(&entry.path()) {
                found.push((entry.path().display().to_string(), body));
            }
        }
    }
    found
}

const SDD_ARTIFACTS: &[&str] = &["business-rules.md", "requirements.md", "proposal.md", "design.md"];

/// Scanner only: reads existing SDD artifacts, keyword-matches completed
/// changes, searches memory for `type=explore` observations, and falls back
/// to project convention files when no SDD artifacts exist yet. Performs no
/// ambiguity analysis of its own — that's left to the instruction surface.
pub fn sdd_context_check(
    ctx: &ToolContext,
    project_root: &Path,
    change_description: &str,
    project_name: Option<&str>,
) -> CoreResult<String> {
    let mut out = format!("# Context Check: {change_description}\n\n");

    let sdd_dir = sdd_config::sdd_dir(project_root);
    let mut artifacts_found = false;
    for name in SDD_ARTIFACTS {
        let path = sdd_dir.join(name);
        if let Ok(body) = std::fs::read_to_string(&path) {
            artifacts_found = true;
            out.push_str(&format!("## Existing artifact: {name}\n{body}\n\n"));
        }
    }

    let matches = sdd_config::keyword_match(project_root, change_description, 5)?;
    if matches.is_empty() {
        out.push_str("## Related completed changes\nNone found.\n\n");
    } else {
        out.push_str("## Related completed changes\n");
        for (change, score) in &matches {
            out.push_str(&format!("- {} (score {score}): {}\n", change.id, change.description));
        }
        out.push('\n');
    }

    let f = ObservationFilter {
        project: project_name.map(str::to_string),
        scope: None,
        namespace: None,
    };
    let explorations = sdd_store::search(&ctx.conn, change_description, &f, 10)?
        .into_iter()
        .filter(|o| o.obs_type == "explore")
        .collect::<Vec<_>>();
    if explorations.is_empty() {
        out.push_str("## Related explorations\nNone found.\n\n");
    } else {
        out.push_str("## Related explorations\n");
        for obs in &explorations {
            out.push_str(&format!("- #{} {}\n", obs.id, obs.title));
        }
        out.push('\n');
    }

    if !artifacts_found {
        let conventions = scan_convention_files(project_root);
        if conventions.is_empty() {
            out.push_str("## Convention files\nNone found.\n");
        } else {
            out.push_str("## Convention files\n");
            for (name, body) in &conventions {
                out.push_str(&format!("### {name}\n{body}\n\n"));
            }
        }
    }

    Ok(out)
}

fn adr_dir(project_root: &Path) -> std::path::PathBuf {
    sdd_config::sdd_dir(project_root).join("adr")
}

/// Finds the next `NNNN` sequence number for the ADR ledger by counting
/// existing `sdd/adr/*.md` entries.
fn next_adr_sequence(project_root: &Path) -> CoreResult<u32> {
    let dir = adr_dir(project_root);
    if !dir.is_dir() {
        return Ok(1);
    }
    let count = std::fs::read_dir(&dir)?
        .filter_map(|e| e.ok())
        .filter(|e| e.path().extension().map(|ext| ext == "md").unwrap_or(false))
        .count();
    Ok(count as u32 + 1)
}

#[allow(clippy::too_many_arguments)]
pub fn sdd_adr(
    ctx: &mut ToolContext,
    project_root: &Path,
    title: &str,
    status: Option<&str>,
    context: &str,
    decision: &str,
    consequences: &str,
    alternatives: Option<&str>,
    project: Option<&str>,
) -> CoreResult<String> {
    let status = status.unwrap_or("proposed");
    if !["proposed", "accepted", "superseded", "deprecated"].contains(&status) {
        return Err(CoreError::InvalidInput(format!("unknown ADR status: {status}")));
    }
    let slug = slugify(title);

    let mut body = format!("# {title}\n\nStatus: {status}\n\n## Context\n{context}\n\n## Decision\n{decision}\n\n## Consequences\n{consequences}\n");
    if let Some(alt) = alternatives {
        body.push_str(&format!("\n## Alternatives\n{alt}\n"));
    }

    let id = sdd_store::add_observation(
        &mut ctx.conn,
        &AddObservationParams {
            session_id: None,
            obs_type: "architecture".into(),
            title: title.to_string(),
            content: body.clone(),
            project: project.map(str::to_string),
            scope: Scope::Project,
            topic_key: Some(format!("architecture/{slug}")),
            namespace: None,
        },
    )?;

    let dir = adr_dir(project_root);
    std::fs::create_dir_all(&dir)?;
    let seq = next_adr_sequence(project_root)?;
    let ledger_path = dir.join(format!("{seq:04}-{slug}.md"));
    sdd_config::atomic_write(&ledger_path, body.as_bytes())?;

    Ok(format!("Recorded ADR #{id} at {}.", ledger_path.display()))
}

const EXPLORE_FIELDS: &[&str] = &["Goals", "Constraints", "Preferences", "Unknowns", "Decisions", "Context"];

fn explore_topic_key(title: &str) -> String {
    format!("explore/{}", slugify(title))
}

/// Keyword heuristic mapping an exploration's accumulated content to a
/// suggested change `type`/`size` — advisory only, never binding.
fn suggest_change_shape(merged: &[(String, String)]) -> (ChangeType, ChangeSize) {
    let all_text = merged.iter().map(|(_, v)| v.to_lowercase()).collect::<Vec<_>>().join(" ");
    let change_type = if all_text.contains("bug") || all_text.contains("crash") || all_text.contains("fix") {
        ChangeType::Fix
    } else if all_text.contains("refactor") || all_text.contains("rewrite") {
        ChangeType::Refactor
    } else if all_text.contains("new feature") || all_text.contains("add ") {
        ChangeType::Feature
    } else {
        ChangeType::Enhancement
    };
    let word_count = all_text.split_whitespace().count();
    let size = if word_count < 40 {
        ChangeSize::Small
    } else if word_count < 150 {
        ChangeSize::Medium
    } else {
        ChangeSize::Large
    };
    (change_type, size)
}

#[allow(clippy::too_many_arguments)]
pub fn sdd_explore(
    ctx: &mut ToolContext,
    title: &str,
    goals: Option<&str>,
    constraints: Option<&str>,
    preferences: Option<&str>,
    unknowns: Option<&str>,
    decisions: Option<&str>,
    context: Option<&str>,
    project: Option<&str>,
    scope: Scope,
    session_id: Option<i64>,
    namespace: Option<&str>,
) -> CoreResult<String> {
    let new_fields = [
        ("Goals", goals),
        ("Constraints", constraints),
        ("Preferences", preferences),
        ("Unknowns", unknowns),
        ("Decisions", decisions),
        ("Context", context),
    ];
    if new_fields.iter().all(|(_, v)| v.map(str::is_empty).unwrap_or(true)) {
        return Err(CoreError::InvalidInput("at least one content field must be non-empty".into()));
    }

    let topic_key = explore_topic_key(title);
    let f = ObservationFilter { project: project.map(str::to_string), scope: Some(scope), namespace: namespace.map(str::to_string) };
    let existing = sdd_store::recent_observations(&ctx.conn, &f, 200)?
        .into_iter()
        .find(|o| o.topic_key.as_deref() == Some(topic_key.as_str()));

    let mut section_map: Vec<(String, String)> = existing
        .as_ref()
        .map(|o| parse_sections(&o.content))
        .unwrap_or_default();
    if section_map.is_empty() {
        section_map = EXPLORE_FIELDS.iter().map(|f| (f.to_string(), String::new())).collect();
    }

    for (name, value) in new_fields {
        if let Some(value) = value {
            if !value.is_empty() {
                if let Some(entry) = section_map.iter_mut().find(|(n, _)| n == name) {
                    entry.1 = value.to_string();
                } else {
                    section_map.push((name.to_string(), value.to_string()));
                }
            }
        }
    }

    let rendered = render_sections(&section_map);
    let id = sdd_store::add_observation(
        &mut ctx.conn,
        &AddObservationParams {
            session_id,
            obs_type: "explore".into(),
            title: title.to_string(),
            content: rendered.clone(),
            project: project.map(str::to_string),
            scope,
            topic_key: Some(topic_key),
            namespace: namespace.map(str::to_string),
        },
    )?;

    let (change_type, change_size) = suggest_change_shape(&section_map);
    Ok(format!(
        "Saved exploration #{id}. Suggested change shape: type={change_type}, size={change_size}."
    ))
}

//! Translates one decoded `tools/call` into a call against `sdd-tools`,
//! decoding typed parameters (`Mode`, `ChangeType`, `ChangeSize` via serde;
//! `Scope`, `RelationType` via their own `::parse`; `DetailLevel` via its
//! total parser) from the untyped JSON arguments object.

use sdd_core::{CoreError, CoreResult, DetailLevel};
use sdd_pipeline::{ChangeSize, ChangeType, Mode};
use sdd_store::Scope;
use sdd_tools::*;
use serde_json::Value;

fn req_str<'a>(args: &'a Value, key: &str) -> CoreResult<&'a str> {
    args.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| CoreError::InvalidInput(format!("missing required string parameter: {key}")))
}

fn opt_str<'a>(args: &'a Value, key: &str) -> Option<&'a str> {
    args.get(key).and_then(Value::as_str)
}

fn req_i64(args: &Value, key: &str) -> CoreResult<i64> {
    args.get(key)
        .and_then(Value::as_i64)
        .ok_or_else(|| CoreError::InvalidInput(format!("missing required integer parameter: {key}")))
}

fn opt_i64(args: &Value, key: &str) -> Option<i64> {
    args.get(key).and_then(Value::as_i64)
}

fn opt_u32(args: &Value, key: &str, default: u32) -> u32 {
    args.get(key).and_then(Value::as_u64).map(|v| v as u32).unwrap_or(default)
}

fn opt_usize(args: &Value, key: &str, default: usize) -> usize {
    args.get(key).and_then(Value::as_u64).map(|v| v as usize).unwrap_or(default)
}

fn opt_bool(args: &Value, key: &str) -> bool {
    args.get(key).and_then(Value::as_bool).unwrap_or(false)
}

fn opt_scope(args: &Value, key: &str) -> CoreResult<Option<Scope>> {
    match opt_str(args, key) {
        None => Ok(None),
        Some(s) => Scope::parse(s).map(Some).ok_or_else(|| CoreError::InvalidInput(format!("unknown scope: {s}"))),
    }
}

fn req_scope(args: &Value, key: &str) -> CoreResult<Scope> {
    Ok(opt_scope(args, key)?.unwrap_or_default())
}

fn req_mode(args: &Value, key: &str) -> Mode {
    opt_str(args, key).and_then(|s| serde_json::from_value(Value::String(s.to_string())).ok()).unwrap_or(Mode::Guided)
}

fn req_change_type(args: &Value, key: &str) -> CoreResult<ChangeType> {
    let s = req_str(args, key)?;
    serde_json::from_value(Value::String(s.to_string())).map_err(|_| CoreError::InvalidInput(format!("unknown change type: {s}")))
}

fn req_change_size(args: &Value, key: &str) -> CoreResult<ChangeSize> {
    let s = req_str(args, key)?;
    serde_json::from_value(Value::String(s.to_string())).map_err(|_| CoreError::InvalidInput(format!("unknown change size: {s}")))
}

fn read_opts(args: &Value) -> ReadOpts {
    ReadOpts {
        limit: opt_usize(args, "limit", 20),
        detail_level: DetailLevel::parse(opt_str(args, "detail_level")),
        max_tokens: opt_i64(args, "max_tokens").map(|n| n.max(0) as usize),
    }
}

fn compact_outcome_text(outcome: CompactOutcome) -> String {
    match outcome {
        CompactOutcome::Candidates(rows) => {
            if rows.is_empty() {
                "No stale observations found.".to_string()
            } else {
                let mut out = format!("{} stale observation(s):\n", rows.len());
                for obs in &rows {
                    out.push_str(&format!("- #{} {} ({})\n", obs.id, obs.title, obs.obs_type));
                }
                out
            }
        }
        CompactOutcome::Executed(result) => format!(
            "Compacted {} observation(s){}. Total {} -> {}.",
            result.deleted,
            result.summary_id.map(|id| format!(", summary #{id}")).unwrap_or_default(),
            result.total_before,
            result.total_after,
        ),
    }
}

/// Looks up `name` in the catalog and invokes the matching `sdd-tools`
/// function with parameters decoded from `arguments`.
pub fn call_tool(ctx: &mut ToolContext, name: &str, arguments: &Value) -> CoreResult<String> {
    match name {
        "mem_save" => mem_save(
            ctx,
            req_str(arguments, "obs_type")?,
            req_str(arguments, "title")?,
            req_str(arguments, "content")?,
            opt_str(arguments, "project"),
            req_scope(arguments, "scope")?,
            opt_str(arguments, "topic_key"),
            opt_str(arguments, "namespace"),
            opt_i64(arguments, "session_id"),
        ),
        "mem_save_prompt" => mem_save_prompt(
            ctx,
            req_str(arguments, "content")?,
            opt_str(arguments, "project"),
            opt_str(arguments, "namespace"),
            opt_i64(arguments, "session_id"),
        ),
        "mem_search" => mem_search(
            ctx,
            req_str(arguments, "query")?,
            opt_str(arguments, "project"),
            opt_scope(arguments, "scope")?,
            opt_str(arguments, "namespace"),
            &read_opts(arguments),
        ),
        "mem_context" => mem_context(
            ctx,
            opt_str(arguments, "project"),
            opt_scope(arguments, "scope")?,
            opt_str(arguments, "namespace"),
            &read_opts(arguments),
        ),
        "mem_timeline" => mem_timeline(
            ctx,
            req_i64(arguments, "observation_id")?,
            opt_u32(arguments, "before", 2) as usize,
            opt_u32(arguments, "after", 2) as usize,
            DetailLevel::parse(opt_str(arguments, "detail_level")),
        ),
        "mem_get_observation" => mem_get_observation(ctx, req_i64(arguments, "id")?),
        "mem_relate" => mem_relate(
            ctx,
            req_i64(arguments, "from_id")?,
            req_i64(arguments, "to_id")?,
            req_str(arguments, "relation_type")?,
        ),
        "mem_unrelate" => mem_unrelate(
            ctx,
            req_i64(arguments, "from_id")?,
            req_i64(arguments, "to_id")?,
            req_str(arguments, "relation_type")?,
        ),
        "mem_build_context" => mem_build_context(ctx, req_i64(arguments, "id")?, opt_u32(arguments, "max_depth", 2)),
        "mem_session_start" => mem_session_start(ctx, opt_str(arguments, "project")),
        "mem_session_end" => mem_session_end(ctx, req_i64(arguments, "id")?, opt_str(arguments, "summary")),
        "mem_session_summary" => mem_session_summary(ctx, req_i64(arguments, "id")?, req_str(arguments, "summary")?),
        "mem_stats" => mem_stats(
            ctx,
            opt_str(arguments, "project"),
            opt_scope(arguments, "scope")?,
            opt_str(arguments, "namespace"),
        ),
        "mem_capture_passive" => mem_capture_passive(
            ctx,
            req_str(arguments, "content")?,
            opt_str(arguments, "project"),
            opt_str(arguments, "namespace"),
            opt_i64(arguments, "session_id"),
        ),
        "mem_delete" => mem_delete(ctx, req_i64(arguments, "id")?, opt_bool(arguments, "hard")),
        "mem_update" => mem_update(ctx, req_i64(arguments, "id")?, opt_str(arguments, "title"), opt_str(arguments, "content")),
        "mem_suggest_topic_key" => Ok(mem_suggest_topic_key(
            req_str(arguments, "obs_type")?,
            req_str(arguments, "title")?,
            req_str(arguments, "content")?,
        )),
        "mem_compact" => {
            let ids: Option<Vec<i64>> = arguments
                .get("compact_ids")
                .and_then(Value::as_array)
                .map(|a| a.iter().filter_map(Value::as_i64).collect());
            mem_compact(
                ctx,
                opt_str(arguments, "project"),
                req_scope(arguments, "scope")?,
                opt_str(arguments, "namespace"),
                req_i64(arguments, "older_than_days")?,
                ids.as_deref(),
                opt_str(arguments, "summary_title"),
                opt_str(arguments, "summary_content"),
            )
            .map(compact_outcome_text)
        }
        "mem_progress" => mem_progress(
            ctx,
            req_str(arguments, "project")?,
            opt_str(arguments, "content"),
            opt_i64(arguments, "session_id"),
            opt_str(arguments, "namespace"),
        ),

        "sdd_init_project" => sdd_init_project(
            ctx.require_project_root()?,
            req_str(arguments, "name")?,
            req_str(arguments, "description")?,
            req_mode(arguments, "mode"),
        ),
        "sdd_create_proposal" => sdd_create_proposal(ctx.require_project_root()?, req_str(arguments, "goal")?, req_str(arguments, "approach")?),
        "sdd_generate_requirements" => sdd_generate_requirements(ctx.require_project_root()?, req_str(arguments, "requirements")?),
        "sdd_create_business_rules" => sdd_create_business_rules(ctx.require_project_root()?, req_str(arguments, "rules")?),
        "sdd_clarify" => sdd_clarify(ctx.require_project_root()?, opt_str(arguments, "answers"), opt_str(arguments, "dimension_scores")),
        "sdd_create_design" => sdd_create_design(ctx.require_project_root()?, req_str(arguments, "design")?),
        "sdd_create_tasks" => sdd_create_tasks(ctx.require_project_root()?, req_str(arguments, "tasks")?),
        "sdd_validate" => sdd_validate(ctx.require_project_root()?, req_str(arguments, "validation")?),
        "sdd_get_context" => sdd_get_context(ctx.require_project_root()?),

        "sdd_change" => sdd_change(
            ctx.require_project_root()?,
            req_change_type(arguments, "change_type")?,
            req_change_size(arguments, "size")?,
            req_str(arguments, "description")?,
        ),
        "sdd_change_advance" => sdd_change_advance(ctx.require_project_root()?, req_str(arguments, "content")?),
        "sdd_change_status" => sdd_change_status(ctx.require_project_root()?),
        "sdd_context_check" => {
            let root = ctx.require_project_root()?.to_path_buf();
            sdd_context_check(ctx, &root, req_str(arguments, "change_description")?, opt_str(arguments, "project_name"))
        }
        "sdd_adr" => {
            let root = ctx.require_project_root()?.to_path_buf();
            sdd_adr(
                ctx,
                &root,
                req_str(arguments, "title")?,
                opt_str(arguments, "status"),
                req_str(arguments, "context")?,
                req_str(arguments, "decision")?,
                req_str(arguments, "consequences")?,
                opt_str(arguments, "alternatives"),
                opt_str(arguments, "project"),
            )
        }
        "sdd_explore" => sdd_explore(
            ctx,
            req_str(arguments, "title")?,
            opt_str(arguments, "goals"),
            opt_str(arguments, "constraints"),
            opt_str(arguments, "preferences"),
            opt_str(arguments, "unknowns"),
            opt_str(arguments, "decisions"),
            opt_str(arguments, "context"),
            opt_str(arguments, "project"),
            req_scope(arguments, "scope")?,
            opt_i64(arguments, "session_id"),
            opt_str(arguments, "namespace"),
        ),

        other => Err(CoreError::InvalidInput(format!("unknown tool: {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn test_ctx(project_root: Option<PathBuf>) -> ToolContext {
        ToolContext { conn: sdd_store::open_in_memory().unwrap(), project_root }
    }

    #[test]
    fn test_unknown_tool_is_invalid_input() {
        let mut ctx = test_ctx(None);
        let result = call_tool(&mut ctx, "nope", &json!({}));
        assert!(matches!(result, Err(CoreError::InvalidInput(_))));
    }

    #[test]
    fn test_mem_save_round_trip() {
        let mut ctx = test_ctx(None);
        let result = call_tool(
            &mut ctx,
            "mem_save",
            &json!({ "obs_type": "note", "title": "t", "content": "c", "scope": "project" }),
        )
        .unwrap();
        assert!(result.contains("Saved observation"));
    }

    #[test]
    fn test_sdd_init_project_requires_project_root() {
        let mut ctx = test_ctx(None);
        let result = call_tool(&mut ctx, "sdd_init_project", &json!({ "name": "x", "description": "y" }));
        assert!(matches!(result, Err(CoreError::ProjectRootNotFound)));
    }

    #[test]
    fn test_sdd_init_project_through_dispatch() {
        let dir = TempDir::new().unwrap();
        let mut ctx = test_ctx(Some(dir.path().to_path_buf()));
        let result = call_tool(
            &mut ctx,
            "sdd_init_project",
            &json!({ "name": "demo", "description": "d", "mode": "expert" }),
        )
        .unwrap();
        assert!(result.contains("expert") || result.to_lowercase().contains("expert"));
    }

    #[test]
    fn test_mem_compact_identify_mode_through_dispatch() {
        let mut ctx = test_ctx(None);
        call_tool(&mut ctx, "mem_save", &json!({ "obs_type": "note", "title": "t", "content": "c" })).unwrap();
        let result = call_tool(&mut ctx, "mem_compact", &json!({ "older_than_days": 0 })).unwrap();
        assert!(result.contains("stale observation"));
    }
}

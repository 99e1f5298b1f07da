use crate::context::ToolContext;
use crate::opts::ReadOpts;
use sdd_core::{estimate_tokens, navigation_hint, token_footer, BudgetBuilder, CoreError, CoreResult, DetailLevel};
use sdd_store::{AddObservationParams, ObservationFilter, RelationType, Scope};

fn filter(project: Option<&str>, scope: Option<Scope>, namespace: Option<&str>) -> ObservationFilter {
    ObservationFilter {
        project: project.map(str::to_string),
        scope,
        namespace: namespace.map(str::to_string),
    }
}

pub fn mem_save(
    ctx: &mut ToolContext,
    obs_type: &str,
    title: &str,
    content: &str,
    project: Option<&str>,
    scope: Scope,
    topic_key: Option<&str>,
    namespace: Option<&str>,
    session_id: Option<i64>,
) -> CoreResult<String> {
    let id = sdd_store::add_observation(
        &mut ctx.conn,
        &AddObservationParams {
            session_id,
            obs_type: obs_type.to_string(),
            title: title.to_string(),
            content: content.to_string(),
            project: project.map(str::to_string),
            scope,
            topic_key: topic_key.map(str::to_string),
            namespace: namespace.map(str::to_string),
        },
    )?;
    Ok(format!("Saved observation #{id}."))
}

pub fn mem_save_prompt(
    ctx: &mut ToolContext,
    content: &str,
    project: Option<&str>,
    namespace: Option<&str>,
    session_id: Option<i64>,
) -> CoreResult<String> {
    let id = sdd_store::save_prompt(&ctx.conn, session_id, content, project, namespace)?;
    Ok(format!("Saved prompt #{id}."))
}

#[allow(clippy::too_many_arguments)]
pub fn mem_search(
    ctx: &ToolContext,
    query: &str,
    project: Option<&str>,
    scope: Option<Scope>,
    namespace: Option<&str>,
    opts: &ReadOpts,
) -> CoreResult<String> {
    let f = filter(project, scope, namespace);
    let results = sdd_store::search(&ctx.conn, query, &f, opts.limit)?;
    let total = sdd_store::count_search_results(&ctx.conn, query, &f)? as usize;

    let mut builder = BudgetBuilder::new(opts.max_tokens, total);
    for (i, obs) in results.iter().enumerate() {
        let chunk = format!("{}. **{}** ({})\n{}\n\n", i + 1, obs.title, obs.obs_type, obs.content);
        if !builder.push(&chunk) {
            break;
        }
    }
    let mut out = builder.finish(opts.detail_level);
    out.push_str(&navigation_hint(results.len(), total, "Refine your query or raise `limit`."));
    Ok(out)
}

pub fn mem_context(
    ctx: &ToolContext,
    project: Option<&str>,
    scope: Option<Scope>,
    namespace: Option<&str>,
    opts: &ReadOpts,
) -> CoreResult<String> {
    let f = filter(project, scope, namespace);
    sdd_store::format_context_detailed(
        &ctx.conn,
        &f,
        &sdd_store::FormatOpts {
            limit: opts.limit,
            detail_level: opts.detail_level,
            max_tokens: opts.max_tokens,
        },
    )
}

pub fn mem_timeline(
    ctx: &ToolContext,
    observation_id: i64,
    before: usize,
    after: usize,
    detail_level: DetailLevel,
) -> CoreResult<String> {
    let focus = sdd_store::get_observation(&ctx.conn, observation_id)?;
    let session_id = focus.session_id.ok_or_else(|| {
        CoreError::InvalidInput("observation has no session to build a timeline within".into())
    })?;

    let all = ctx
        .conn
        .prepare(
            "SELECT id FROM observation WHERE session_id = ?1 AND deleted_at IS NULL ORDER BY created_at ASC",
        )
        .and_then(|mut stmt| {
            let rows = stmt.query_map(rusqlite::params![session_id], |r| r.get::<_, i64>(0))?;
            rows.collect::<Result<Vec<_>, _>>()
        })
        .map_err(|e| CoreError::Io(e.to_string()))?;

    let pos = all.iter().position(|&id| id == observation_id).unwrap_or(0);
    let start = pos.saturating_sub(before);
    let end = (pos + after + 1).min(all.len());

    let mut out = String::new();
    for &id in &all[start..end] {
        let obs = sdd_store::get_observation(&ctx.conn, id)?;
        let marker = if id == observation_id { " <- focus" } else { "" };
        match detail_level {
            DetailLevel::Summary => out.push_str(&format!("- [{}] {}{}\n", obs.obs_type, obs.title, marker)),
            _ => out.push_str(&format!("## {} ({}){}\n{}\n\n", obs.title, obs.obs_type, marker, obs.content)),
        }
    }
    let n = estimate_tokens(&out);
    out.push_str(&token_footer(n));
    Ok(out)
}

pub fn mem_get_observation(ctx: &ToolContext, id: i64) -> CoreResult<String> {
    let obs = sdd_store::get_observation(&ctx.conn, id)?;
    let outgoing: Vec<(i64, String)> = ctx
        .conn
        .prepare("SELECT to_obs_id, type FROM relation WHERE from_obs_id = ?1")
        .and_then(|mut stmt| {
            let rows = stmt.query_map(rusqlite::params![id], |r| Ok((r.get(0)?, r.get(1)?)))?;
            rows.collect::<Result<Vec<_>, _>>()
        })
        .map_err(|e| CoreError::Io(e.to_string()))?;
    let incoming: Vec<(i64, String)> = ctx
        .conn
        .prepare("SELECT from_obs_id, type FROM relation WHERE to_obs_id = ?1")
        .and_then(|mut stmt| {
            let rows = stmt.query_map(rusqlite::params![id], |r| Ok((r.get(0)?, r.get(1)?)))?;
            rows.collect::<Result<Vec<_>, _>>()
        })
        .map_err(|e| CoreError::Io(e.to_string()))?;

    let mut out = format!("## {} ({})\n{}\n\n", obs.title, obs.obs_type, obs.content);
    if !outgoing.is_empty() {
        out.push_str("**Relates to:**\n");
        for (to, kind) in &outgoing {
            out.push_str(&format!("- #{to} ({kind})\n"));
        }
    }
    if !incoming.is_empty() {
        out.push_str("**Related from:**\n");
        for (from, kind) in &incoming {
            out.push_str(&format!("- #{from} ({kind})\n"));
        }
    }
    Ok(out)
}

pub fn mem_relate(ctx: &ToolContext, from_id: i64, to_id: i64, relation_type: &str) -> CoreResult<String> {
    if from_id == to_id {
        return Err(CoreError::InvalidInput("cannot relate an observation to itself".into()));
    }
    let kind = RelationType::parse(relation_type)
        .ok_or_else(|| CoreError::InvalidInput(format!("unknown relation type: {relation_type}")))?;
    sdd_store::relate(&ctx.conn, from_id, to_id, kind)?;
    Ok(format!("Related #{from_id} --{relation_type}--> #{to_id}."))
}

pub fn mem_unrelate(ctx: &ToolContext, from_id: i64, to_id: i64, relation_type: &str) -> CoreResult<String> {
    let kind = RelationType::parse(relation_type)
        .ok_or_else(|| CoreError::InvalidInput(format!("unknown relation type: {relation_type}")))?;
    sdd_store::unrelate(&ctx.conn, from_id, to_id, kind)?;
    Ok(format!("Removed relation #{from_id} --{relation_type}--> #{to_id}."))
}

pub fn mem_build_context(ctx: &ToolContext, id: i64, max_depth: u32) -> CoreResult<String> {
    let observations = sdd_store::build_context(&ctx.conn, id, max_depth)?;
    let mut out = format!("Context graph for #{id} (depth {max_depth}):\n\n");
    for obs in &observations {
        out.push_str(&format!("- #{} {} ({})\n", obs.id, obs.title, obs.obs_type));
    }
    let n = estimate_tokens(&out);
    out.push_str(&token_footer(n));
    Ok(out)
}

pub fn mem_session_start(ctx: &ToolContext, project: Option<&str>) -> CoreResult<String> {
    let id = sdd_store::session_start(&ctx.conn, project)?;
    Ok(format!("Session #{id} started."))
}

pub fn mem_session_end(ctx: &ToolContext, id: i64, summary: Option<&str>) -> CoreResult<String> {
    sdd_store::session_end(&ctx.conn, id, summary)?;
    Ok(format!("Session #{id} ended."))
}

pub fn mem_session_summary(ctx: &ToolContext, id: i64, summary: &str) -> CoreResult<String> {
    sdd_store::session_summary(&ctx.conn, id, summary)?;
    Ok(format!("Session #{id} summary updated."))
}

pub fn mem_stats(
    ctx: &ToolContext,
    project: Option<&str>,
    scope: Option<Scope>,
    namespace: Option<&str>,
) -> CoreResult<String> {
    let f = filter(project, scope, namespace);
    let total = sdd_store::count_observations(&ctx.conn, &f)?;
    Ok(format!("{total} active observation(s) matching the given filters."))
}

/// A low-friction variant of `mem_save` for ambient capture: derives a title
/// from the first line of `content` and tags the row `type=passive_capture`.
pub fn mem_capture_passive(
    ctx: &mut ToolContext,
    content: &str,
    project: Option<&str>,
    namespace: Option<&str>,
    session_id: Option<i64>,
) -> CoreResult<String> {
    let title = content
        .lines()
        .next()
        .unwrap_or("")
        .chars()
        .take(80)
        .collect::<String>();
    let id = sdd_store::add_observation(
        &mut ctx.conn,
        &AddObservationParams {
            session_id,
            obs_type: "passive_capture".into(),
            title,
            content: content.to_string(),
            project: project.map(str::to_string),
            scope: Scope::Project,
            topic_key: None,
            namespace: namespace.map(str::to_string),
        },
    )?;
    Ok(format!("Captured #{id}."))
}

pub fn mem_delete(ctx: &ToolContext, id: i64, hard: bool) -> CoreResult<String> {
    sdd_store::delete_observation(&ctx.conn, id, hard)?;
    let kind = if hard { "hard" } else { "soft" };
    Ok(format!("Deleted #{id} ({kind})."))
}

pub fn mem_update(
    ctx: &ToolContext,
    id: i64,
    title: Option<&str>,
    content: Option<&str>,
) -> CoreResult<String> {
    sdd_store::update_observation(&ctx.conn, id, title, content)?;
    Ok(format!("Updated #{id}."))
}

pub fn mem_suggest_topic_key(obs_type: &str, title: &str, content: &str) -> String {
    sdd_store::suggest_topic_key(obs_type, title, content)
}

#[derive(Debug)]
pub enum CompactOutcome {
    Candidates(Vec<sdd_store::Observation>),
    Executed(sdd_store::CompactResult),
}

#[allow(clippy::too_many_arguments)]
pub fn mem_compact(
    ctx: &mut ToolContext,
    project: Option<&str>,
    scope: Scope,
    namespace: Option<&str>,
    older_than_days: i64,
    compact_ids: Option<&[i64]>,
    summary_title: Option<&str>,
    summary_content: Option<&str>,
) -> CoreResult<CompactOutcome> {
    match compact_ids {
        None => {
            let f = filter(project, Some(scope), namespace);
            let candidates = sdd_store::find_stale_observations(&ctx.conn, &f, older_than_days, None)?;
            Ok(CompactOutcome::Candidates(candidates))
        }
        Some(ids) => {
            let result = sdd_store::compact_observations(
                &mut ctx.conn,
                ids,
                project,
                scope,
                summary_title,
                summary_content,
            )?;
            Ok(CompactOutcome::Executed(result))
        }
    }
}

fn progress_topic_key(project: &str, namespace: Option<&str>) -> String {
    match namespace {
        Some(ns) if !ns.is_empty() => format!("progress/{ns}/{project}"),
        _ => format!("progress/{project}"),
    }
}

pub fn mem_progress(
    ctx: &mut ToolContext,
    project: &str,
    content: Option<&str>,
    session_id: Option<i64>,
    namespace: Option<&str>,
) -> CoreResult<String> {
    let topic_key = progress_topic_key(project, namespace);
    match content {
        None => {
            let f = ObservationFilter {
                project: Some(project.to_string()),
                scope: None,
                namespace: namespace.map(str::to_string),
            };
            let rows = sdd_store::recent_observations(&ctx.conn, &f, 200)?;
            rows.into_iter()
                .find(|o| o.topic_key.as_deref() == Some(topic_key.as_str()))
                .map(|o| o.content)
                .ok_or_else(|| CoreError::InvalidInput(format!("no progress recorded for project {project}")))
        }
        Some(body) => {
            serde_json::from_str::<serde_json::Value>(body)
                .map_err(|e| CoreError::InvalidInput(format!("progress content must be JSON: {e}")))?;
            let id = sdd_store::add_observation(
                &mut ctx.conn,
                &AddObservationParams {
                    session_id,
                    obs_type: "progress".into(),
                    title: format!("Progress: {project}"),
                    content: body.to_string(),
                    project: Some(project.to_string()),
                    scope: Scope::Project,
                    topic_key: Some(topic_key),
                    namespace: namespace.map(str::to_string),
                },
            )?;
            Ok(format!("Progress updated (#{id})."))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> ToolContext {
        ToolContext::in_memory(None).unwrap()
    }

    #[test]
    fn test_mem_save_and_get() {
        let mut c = ctx();
        let saved = mem_save(&mut c, "notes", "hello", "world", None, Scope::Project, None, None, None).unwrap();
        assert!(saved.contains("Saved observation"));
        let rendered = mem_get_observation(&c, 1).unwrap();
        assert!(rendered.contains("hello"));
    }

    #[test]
    fn test_mem_relate_rejects_self_loop() {
        let mut c = ctx();
        mem_save(&mut c, "notes", "a", "x", None, Scope::Project, None, None, None).unwrap();
        let result = mem_relate(&c, 1, 1, "relates_to");
        assert!(matches!(result, Err(CoreError::InvalidInput(_))));
    }

    #[test]
    fn test_mem_relate_rejects_unknown_type() {
        let mut c = ctx();
        mem_save(&mut c, "notes", "a", "x", None, Scope::Project, None, None, None).unwrap();
        mem_save(&mut c, "notes", "b", "y", None, Scope::Project, None, None, None).unwrap();
        let result = mem_relate(&c, 1, 2, "nonsense");
        assert!(matches!(result, Err(CoreError::InvalidInput(_))));
    }

    #[test]
    fn test_mem_search_includes_navigation_hint_when_truncated() {
        let mut c = ctx();
        for i in 0..5 {
            mem_save(&mut c, "notes", &format!("item {i}"), "needle content", None, Scope::Project, None, None, None).unwrap();
        }
        let opts = ReadOpts { limit: 2, ..Default::default() };
        let rendered = mem_search(&c, "needle", None, None, None, &opts).unwrap();
        assert!(rendered.contains("Showing 2 of 5"));
    }

    #[test]
    fn test_mem_progress_roundtrip() {
        let mut c = ctx();
        mem_progress(&mut c, "demo", Some("{\"step\":1}"), None, None).unwrap();
        let read = mem_progress(&mut c, "demo", None, None, None).unwrap();
        assert!(read.contains("step"));
    }

    #[test]
    fn test_mem_progress_rejects_non_json() {
        let mut c = ctx();
        let result = mem_progress(&mut c, "demo", Some("not json"), None, None);
        assert!(matches!(result, Err(CoreError::InvalidInput(_))));
    }

    #[test]
    fn test_mem_compact_identify_then_execute() {
        let mut c = ctx();
        mem_save(&mut c, "notes", "old", "content", None, Scope::Project, None, None, None).unwrap();
        let candidates = mem_compact(&mut c, None, Scope::Project, None, 0, None, None, None).unwrap();
        let ids: Vec<i64> = match candidates {
            CompactOutcome::Candidates(rows) => rows.iter().map(|o| o.id).collect(),
            _ => panic!("expected candidates"),
        };
        assert_eq!(ids, vec![1]);
        let executed = mem_compact(&mut c, None, Scope::Project, None, 0, Some(&ids), Some("s"), Some("c")).unwrap();
        assert!(matches!(executed, CompactOutcome::Executed(_)));
    }

    #[test]
    fn test_mem_timeline_orders_around_focus() {
        let mut c = ctx();
        let session_id = sdd_store::session_start(&c.conn, None).unwrap();
        for i in 0..5 {
            mem_save(&mut c, "notes", &format!("n{i}"), "c", None, Scope::Project, None, None, Some(session_id)).unwrap();
        }
        let rendered = mem_timeline(&c, 3, 1, 1, DetailLevel::Summary).unwrap();
        assert!(rendered.contains("n1"));
        assert!(rendered.contains("n2"));
        assert!(rendered.contains("n3"));
        assert!(!rendered.contains("n0"));
        assert!(!rendered.contains("n4"));
    }
}

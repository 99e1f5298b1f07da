use crate::types::{AddObservationParams, Observation, ObservationFilter, Scope};
use rusqlite::{params, Connection, OptionalExtension, Row};
use sdd_core::{now_rfc3339, CoreError, CoreResult};

/// Observations written with the same `(title, content, session_id,
/// namespace)` within this window are treated as a duplicate resubmission
/// and return the existing row instead of inserting a new one.
const DEDUP_WINDOW_SECS: i64 = 60;

fn row_to_observation(row: &Row) -> rusqlite::Result<Observation> {
    let scope_str: String = row.get("scope")?;
    Ok(Observation {
        id: row.get("id")?,
        session_id: row.get("session_id")?,
        obs_type: row.get("type")?,
        title: row.get("title")?,
        content: row.get("content")?,
        project: row.get("project")?,
        scope: Scope::parse(&scope_str).unwrap_or_default(),
        topic_key: row.get("topic_key")?,
        namespace: row.get("namespace")?,
        revision_count: row.get("revision_count")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
        deleted_at: row.get("deleted_at")?,
    })
}

fn index_insert(conn: &Connection, id: i64, title: &str, content: &str) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO observation_fts(rowid, title, content) VALUES (?1, ?2, ?3)",
        params![id, title, content],
    )?;
    Ok(())
}

/// FTS5 external-content tables have no UPSERT: reindexing a changed row
/// means telling the index to drop the exact tokens it built for the old
/// title/content, then inserting the new ones.
fn index_reindex(
    conn: &Connection,
    id: i64,
    old_title: &str,
    old_content: &str,
    new_title: &str,
    new_content: &str,
) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO observation_fts(observation_fts, rowid, title, content) VALUES ('delete', ?1, ?2, ?3)",
        params![id, old_title, old_content],
    )?;
    index_insert(conn, id, new_title, new_content)
}

fn remove_fts(conn: &Connection, id: i64, title: &str, content: &str) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO observation_fts(observation_fts, rowid, title, content) VALUES ('delete', ?1, ?2, ?3)",
        params![id, title, content],
    )?;
    Ok(())
}

pub fn add_observation(conn: &mut Connection, p: &AddObservationParams) -> CoreResult<i64> {
    if p.title.trim().is_empty() {
        return Err(CoreError::InvalidInput("title must not be empty".into()));
    }

    let tx = conn
        .transaction()
        .map_err(|e| CoreError::Io(format!("starting transaction: {e}")))?;
    let now = now_rfc3339();

    if let Some(topic_key) = &p.topic_key {
        let existing: Option<i64> = tx
            .query_row(
                "SELECT id FROM observation
                 WHERE topic_key = ?1
                   AND COALESCE(project, '') = COALESCE(?2, '')
                   AND scope = ?3
                   AND COALESCE(namespace, '') = COALESCE(?4, '')
                   AND deleted_at IS NULL",
                params![topic_key, p.project, p.scope.as_str(), p.namespace],
                |r| r.get(0),
            )
            .optional()
            .map_err(|e| CoreError::Io(e.to_string()))?;

        if let Some(id) = existing {
            let (old_title, old_content): (String, String) = tx
                .query_row(
                    "SELECT title, content FROM observation WHERE id = ?1",
                    params![id],
                    |r| Ok((r.get(0)?, r.get(1)?)),
                )
                .map_err(|e| CoreError::Io(e.to_string()))?;
            tx.execute(
                "UPDATE observation
                 SET type = ?1, title = ?2, content = ?3, revision_count = revision_count + 1, updated_at = ?4
                 WHERE id = ?5",
                params![p.obs_type, p.title, p.content, now, id],
            )
            .map_err(|e| CoreError::Io(e.to_string()))?;
            index_reindex(&tx, id, &old_title, &old_content, &p.title, &p.content)
                .map_err(|e| CoreError::Io(e.to_string()))?;
            tx.commit().map_err(|e| CoreError::Io(e.to_string()))?;
            return Ok(id);
        }
    } else {
        // Dedup suppression: same title/content/session/namespace within
        // the window returns the existing row rather than inserting again.
        let dup: Option<i64> = tx
            .query_row(
                "SELECT id FROM observation
                 WHERE title = ?1 AND content = ?2
                   AND session_id IS ?3
                   AND COALESCE(namespace, '') = COALESCE(?4, '')
                   AND deleted_at IS NULL
                   AND (julianday(?5) - julianday(created_at)) * 86400.0 <= ?6
                 ORDER BY id DESC LIMIT 1",
                params![p.title, p.content, p.session_id, p.namespace, now, DEDUP_WINDOW_SECS as f64],
                |r| r.get(0),
            )
            .optional()
            .map_err(|e| CoreError::Io(e.to_string()))?;
        if let Some(id) = dup {
            tx.commit().map_err(|e| CoreError::Io(e.to_string()))?;
            return Ok(id);
        }
    }

    tx.execute(
        "INSERT INTO observation
            (session_id, type, title, content, project, scope, topic_key, namespace, revision_count, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 0, ?9, ?9)",
        params![
            p.session_id,
            p.obs_type,
            p.title,
            p.content,
            p.project,
            p.scope.as_str(),
            p.topic_key,
            p.namespace,
            now,
        ],
    )
    .map_err(|e| CoreError::Io(e.to_string()))?;
    let id = tx.last_insert_rowid();
    index_insert(&tx, id, &p.title, &p.content).map_err(|e| CoreError::Io(e.to_string()))?;
    tx.commit().map_err(|e| CoreError::Io(e.to_string()))?;
    Ok(id)
}

pub fn get_observation(conn: &Connection, id: i64) -> CoreResult<Observation> {
    conn.query_row(
        "SELECT * FROM observation WHERE id = ?1 AND deleted_at IS NULL",
        params![id],
        row_to_observation,
    )
    .optional()
    .map_err(|e| CoreError::Io(e.to_string()))?
    .ok_or(CoreError::ObservationNotFound(id))
}

pub fn update_observation(
    conn: &Connection,
    id: i64,
    title: Option<&str>,
    content: Option<&str>,
) -> CoreResult<()> {
    let existing = get_observation(conn, id)?;
    let title = title.unwrap_or(&existing.title);
    let content = content.unwrap_or(&existing.content);
    conn.execute(
        "UPDATE observation SET title = ?1, content = ?2, updated_at = ?3 WHERE id = ?4",
        params![title, content, now_rfc3339(), id],
    )
    .map_err(|e| CoreError::Io(e.to_string()))?;
    index_reindex(conn, id, &existing.title, &existing.content, title, content)
        .map_err(|e| CoreError::Io(e.to_string()))?;
    Ok(())
}

pub fn delete_observation(conn: &Connection, id: i64, hard: bool) -> CoreResult<()> {
    let existing = get_observation(conn, id)?;
    if hard {
        conn.execute("DELETE FROM relation WHERE from_obs_id = ?1 OR to_obs_id = ?1", params![id])
            .map_err(|e| CoreError::Io(e.to_string()))?;
        conn.execute("DELETE FROM observation WHERE id = ?1", params![id])
            .map_err(|e| CoreError::Io(e.to_string()))?;
        remove_fts(conn, id, &existing.title, &existing.content).map_err(|e| CoreError::Io(e.to_string()))?;
    } else {
        conn.execute(
            "UPDATE observation SET deleted_at = ?1 WHERE id = ?2",
            params![now_rfc3339(), id],
        )
        .map_err(|e| CoreError::Io(e.to_string()))?;
        remove_fts(conn, id, &existing.title, &existing.content).map_err(|e| CoreError::Io(e.to_string()))?;
    }
    Ok(())
}

fn filter_clause(filter: &ObservationFilter, params_out: &mut Vec<Box<dyn rusqlite::ToSql>>) -> String {
    let mut clause = String::from(" AND deleted_at IS NULL");
    if let Some(project) = &filter.project {
        clause.push_str(" AND project = ?");
        params_out.push(Box::new(project.clone()));
    }
    if let Some(scope) = &filter.scope {
        clause.push_str(" AND scope = ?");
        params_out.push(Box::new(scope.as_str().to_string()));
    }
    if let Some(ns) = &filter.namespace {
        if !ns.is_empty() {
            clause.push_str(" AND namespace = ?");
            params_out.push(Box::new(ns.clone()));
        }
    }
    clause
}

pub fn recent_observations(
    conn: &Connection,
    filter: &ObservationFilter,
    limit: usize,
) -> CoreResult<Vec<Observation>> {
    let mut bound: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();
    let clause = filter_clause(filter, &mut bound);
    let sql = format!("SELECT * FROM observation WHERE 1=1{clause} ORDER BY created_at DESC LIMIT ?");
    bound.push(Box::new(limit as i64));
    let mut stmt = conn.prepare(&sql).map_err(|e| CoreError::Io(e.to_string()))?;
    let refs: Vec<&dyn rusqlite::ToSql> = bound.iter().map(|b| b.as_ref()).collect();
    let rows = stmt
        .query_map(refs.as_slice(), row_to_observation)
        .map_err(|e| CoreError::Io(e.to_string()))?;
    rows.collect::<Result<Vec<_>, _>>()
        .map_err(|e| CoreError::Io(e.to_string()))
}

pub fn count_observations(conn: &Connection, filter: &ObservationFilter) -> CoreResult<i64> {
    let mut bound: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();
    let clause = filter_clause(filter, &mut bound);
    let sql = format!("SELECT count(*) FROM observation WHERE 1=1{clause}");
    let mut stmt = conn.prepare(&sql).map_err(|e| CoreError::Io(e.to_string()))?;
    let refs: Vec<&dyn rusqlite::ToSql> = bound.iter().map(|b| b.as_ref()).collect();
    stmt.query_row(refs.as_slice(), |r| r.get(0))
        .map_err(|e| CoreError::Io(e.to_string()))
}

/// `older_than_days` observations not soft-deleted, oldest first.
/// `limit` is clamped to `[1, 200]`.
pub fn find_stale_observations(
    conn: &Connection,
    filter: &ObservationFilter,
    older_than_days: i64,
    limit: Option<usize>,
) -> CoreResult<Vec<Observation>> {
    let limit = limit.unwrap_or(50).clamp(1, 200);
    let mut bound: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();
    let clause = filter_clause(filter, &mut bound);
    // `'now'` carries only second resolution while `created_at` carries
    // sub-second resolution, so comparing them as julianday floats makes a
    // just-created row race negative; strftime('%s', ...) puts both sides
    // on the same integer-second footing.
    let sql = format!(
        "SELECT * FROM observation
         WHERE (strftime('%s','now') - strftime('%s', created_at)) / 86400.0 >= ?{clause}
         ORDER BY created_at ASC LIMIT ?"
    );
    let mut all_params: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(older_than_days)];
    all_params.extend(bound);
    all_params.push(Box::new(limit as i64));
    let mut stmt = conn.prepare(&sql).map_err(|e| CoreError::Io(e.to_string()))?;
    let refs: Vec<&dyn rusqlite::ToSql> = all_params.iter().map(|b| b.as_ref()).collect();
    let rows = stmt
        .query_map(refs.as_slice(), row_to_observation)
        .map_err(|e| CoreError::Io(e.to_string()))?;
    rows.collect::<Result<Vec<_>, _>>()
        .map_err(|e| CoreError::Io(e.to_string()))
}

use crate::observation::recent_observations;
use crate::types::{Observation, ObservationFilter, Scope};
use rusqlite::{Connection, Row};
use sdd_core::CoreError;

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

/// Strips characters FTS5's query syntax treats specially, so a freeform
/// user query never trips a syntax error inside MATCH.
fn sanitize_query(query: &str) -> String {
    query
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect::<String>()
        .split_whitespace()
        // Quoting each token as a phrase keeps reserved FTS5 keywords
        // (AND/OR/NOT) from being parsed as operators when a user's query
        // happens to contain them.
        .map(|tok| format!("\"{tok}\"*"))
        .collect::<Vec<_>>()
        .join(" ")
}

fn filter_clause(filter: &ObservationFilter, bound: &mut Vec<Box<dyn rusqlite::ToSql>>) -> String {
    let mut clause = String::from(" AND o.deleted_at IS NULL");
    if let Some(project) = &filter.project {
        clause.push_str(" AND o.project = ?");
        bound.push(Box::new(project.clone()));
    }
    if let Some(scope) = &filter.scope {
        clause.push_str(" AND o.scope = ?");
        bound.push(Box::new(scope.as_str().to_string()));
    }
    if let Some(ns) = &filter.namespace {
        if !ns.is_empty() {
            clause.push_str(" AND o.namespace = ?");
            bound.push(Box::new(ns.clone()));
        }
    }
    clause
}

/// A blank query falls back to the most recent observations rather than
/// an empty FTS result set.
pub fn search(
    conn: &Connection,
    query: &str,
    filter: &ObservationFilter,
    limit: usize,
) -> Result<Vec<Observation>, CoreError> {
    if query.trim().is_empty() {
        return recent_observations(conn, filter, limit);
    }
    let fts_query = sanitize_query(query);
    if fts_query.is_empty() {
        return recent_observations(conn, filter, limit);
    }

    let mut bound: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(fts_query)];
    let clause = filter_clause(filter, &mut bound);
    let sql = format!(
        "SELECT o.* FROM observation o
         JOIN observation_fts f ON f.rowid = o.id
         WHERE observation_fts MATCH ?{clause}
         ORDER BY bm25(observation_fts) LIMIT ?"
    );
    bound.push(Box::new(limit as i64));
    let mut stmt = conn.prepare(&sql).map_err(|e| CoreError::Io(e.to_string()))?;
    let refs: Vec<&dyn rusqlite::ToSql> = bound.iter().map(|b| b.as_ref()).collect();
    let rows = stmt
        .query_map(refs.as_slice(), row_to_observation)
        .map_err(|e| CoreError::Io(e.to_string()))?;
    rows.collect::<Result<Vec<_>, _>>()
        .map_err(|e| CoreError::Io(e.to_string()))
}

pub fn count_search_results(
    conn: &Connection,
    query: &str,
    filter: &ObservationFilter,
) -> Result<i64, CoreError> {
    if query.trim().is_empty() {
        return crate::observation::count_observations(conn, filter);
    }
    let fts_query = sanitize_query(query);
    if fts_query.is_empty() {
        return crate::observation::count_observations(conn, filter);
    }
    let mut bound: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(fts_query)];
    let clause = filter_clause(filter, &mut bound);
    let sql = format!(
        "SELECT count(*) FROM observation o
         JOIN observation_fts f ON f.rowid = o.id
         WHERE observation_fts MATCH ?{clause}"
    );
    let mut stmt = conn.prepare(&sql).map_err(|e| CoreError::Io(e.to_string()))?;
    let refs: Vec<&dyn rusqlite::ToSql> = bound.iter().map(|b| b.as_ref()).collect();
    stmt.query_row(refs.as_slice(), |r| r.get(0))
        .map_err(|e| CoreError::Io(e.to_string()))
}

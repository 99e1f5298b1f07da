use crate::types::Scope;
use rusqlite::{params, OptionalExtension};
use sdd_core::{now_rfc3339, CoreError, CoreResult};

#[derive(Debug, Clone, Default)]
pub struct CompactResult {
    pub deleted: usize,
    pub summary_id: Option<i64>,
    pub total_before: i64,
    pub total_after: i64,
}

/// Soft-deletes every id in `ids` and optionally inserts a `compaction_summary`
/// observation, all within one transaction. Any invalid or already-deleted id
/// rolls the whole operation back with no partial effect.
pub fn compact_observations(
    conn: &mut rusqlite::Connection,
    ids: &[i64],
    project: Option<&str>,
    scope: Scope,
    summary_title: Option<&str>,
    summary_content: Option<&str>,
) -> CoreResult<CompactResult> {
    if summary_content.is_some() && summary_title.is_none() {
        return Err(CoreError::InvalidInput(
            "summary_title is required when summary_content is provided".into(),
        ));
    }

    let tx = conn
        .transaction()
        .map_err(|e| CoreError::Io(format!("starting transaction: {e}")))?;

    let total_before: i64 = tx
        .query_row(
            "SELECT count(*) FROM observation WHERE deleted_at IS NULL",
            [],
            |r| r.get(0),
        )
        .map_err(|e| CoreError::Io(e.to_string()))?;

    let now = now_rfc3339();
    for &id in ids {
        let existing: Option<(String, String)> = tx
            .query_row(
                "SELECT title, content FROM observation WHERE id = ?1 AND deleted_at IS NULL",
                params![id],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .optional()
            .map_err(|e| CoreError::Io(e.to_string()))?;
        let Some((title, content)) = existing else {
            return Err(CoreError::ObservationNotFound(id));
        };
        tx.execute(
            "UPDATE observation SET deleted_at = ?1 WHERE id = ?2",
            params![now, id],
        )
        .map_err(|e| CoreError::Io(e.to_string()))?;
        tx.execute(
            "INSERT INTO observation_fts(observation_fts, rowid, title, content) VALUES ('delete', ?1, ?2, ?3)",
            params![id, title, content],
        )
        .map_err(|e| CoreError::Io(e.to_string()))?;
    }

    let mut summary_id = None;
    if let Some(content) = summary_content {
        let title = summary_title.unwrap();
        tx.execute(
            "INSERT INTO observation
                (session_id, type, title, content, project, scope, topic_key, namespace, revision_count, created_at, updated_at)
             VALUES (NULL, 'compaction_summary', ?1, ?2, ?3, ?4, NULL, NULL, 0, ?5, ?5)",
            params![title, content, project, scope.as_str(), now],
        )
        .map_err(|e| CoreError::Io(e.to_string()))?;
        let id = tx.last_insert_rowid();
        tx.execute(
            "INSERT INTO observation_fts(rowid, title, content) VALUES (?1, ?2, ?3)",
            params![id, title, content],
        )
        .map_err(|e| CoreError::Io(e.to_string()))?;
        summary_id = Some(id);
    }

    let total_after: i64 = tx
        .query_row(
            "SELECT count(*) FROM observation WHERE deleted_at IS NULL",
            [],
            |r| r.get(0),
        )
        .map_err(|e| CoreError::Io(e.to_string()))?;

    tx.commit().map_err(|e| CoreError::Io(e.to_string()))?;

    Ok(CompactResult {
        deleted: ids.len(),
        summary_id,
        total_before,
        total_after,
    })
}

use crate::types::UserPrompt;
use rusqlite::{params, Connection};
use sdd_core::{now_rfc3339, CoreError, CoreResult};

pub fn save_prompt(
    conn: &Connection,
    session_id: Option<i64>,
    content: &str,
    project: Option<&str>,
    namespace: Option<&str>,
) -> CoreResult<i64> {
    if content.trim().is_empty() {
        return Err(CoreError::InvalidInput("prompt content must not be empty".into()));
    }
    conn.execute(
        "INSERT INTO user_prompt (session_id, content, project, namespace, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![session_id, content, project, namespace, now_rfc3339()],
    )
    .map_err(|e| CoreError::Io(e.to_string()))?;
    Ok(conn.last_insert_rowid())
}

pub fn recent_prompts(conn: &Connection, session_id: i64, limit: usize) -> CoreResult<Vec<UserPrompt>> {
    let mut stmt = conn
        .prepare(
            "SELECT id, session_id, content, project, namespace, created_at
             FROM user_prompt WHERE session_id = ?1 ORDER BY created_at DESC LIMIT ?2",
        )
        .map_err(|e| CoreError::Io(e.to_string()))?;
    let rows = stmt
        .query_map(params![session_id, limit as i64], |r| {
            Ok(UserPrompt {
                id: r.get(0)?,
                session_id: r.get(1)?,
                content: r.get(2)?,
                project: r.get(3)?,
                namespace: r.get(4)?,
                created_at: r.get(5)?,
            })
        })
        .map_err(|e| CoreError::Io(e.to_string()))?;
    rows.collect::<Result<Vec<_>, _>>()
        .map_err(|e| CoreError::Io(e.to_string()))
}

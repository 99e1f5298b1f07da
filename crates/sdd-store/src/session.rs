use rusqlite::{params, Connection, OptionalExtension};
use sdd_core::{now_rfc3339, CoreError, CoreResult};

pub struct Session {
    pub id: i64,
    pub project: Option<String>,
    pub started_at: String,
    pub ended_at: Option<String>,
    pub summary: Option<String>,
}

pub fn session_start(conn: &Connection, project: Option<&str>) -> CoreResult<i64> {
    conn.execute(
        "INSERT INTO session (project, started_at) VALUES (?1, ?2)",
        params![project, now_rfc3339()],
    )
    .map_err(|e| CoreError::Io(e.to_string()))?;
    Ok(conn.last_insert_rowid())
}

pub fn session_end(conn: &Connection, id: i64, summary: Option<&str>) -> CoreResult<()> {
    let affected = conn
        .execute(
            "UPDATE session SET ended_at = ?1, summary = COALESCE(?2, summary) WHERE id = ?3",
            params![now_rfc3339(), summary, id],
        )
        .map_err(|e| CoreError::Io(e.to_string()))?;
    if affected == 0 {
        return Err(CoreError::InvalidInput(format!("no such session: {id}")));
    }
    Ok(())
}

pub fn session_summary(conn: &Connection, id: i64, summary: &str) -> CoreResult<()> {
    let affected = conn
        .execute(
            "UPDATE session SET summary = ?1 WHERE id = ?2",
            params![summary, id],
        )
        .map_err(|e| CoreError::Io(e.to_string()))?;
    if affected == 0 {
        return Err(CoreError::InvalidInput(format!("no such session: {id}")));
    }
    Ok(())
}

pub fn get_session(conn: &Connection, id: i64) -> CoreResult<Session> {
    conn.query_row(
        "SELECT id, project, started_at, ended_at, summary FROM session WHERE id = ?1",
        params![id],
        |r| {
            Ok(Session {
                id: r.get(0)?,
                project: r.get(1)?,
                started_at: r.get(2)?,
                ended_at: r.get(3)?,
                summary: r.get(4)?,
            })
        },
    )
    .optional()
    .map_err(|e| CoreError::Io(e.to_string()))?
    .ok_or_else(|| CoreError::InvalidInput(format!("no such session: {id}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    #[test]
    fn test_session_start_and_end() {
        let conn = db::open_in_memory().unwrap();
        let id = session_start(&conn, Some("demo")).unwrap();
        session_end(&conn, id, Some("did stuff")).unwrap();
        let s = get_session(&conn, id).unwrap();
        assert!(s.ended_at.is_some());
        assert_eq!(s.summary.as_deref(), Some("did stuff"));
    }

    #[test]
    fn test_session_end_missing_is_error() {
        let conn = db::open_in_memory().unwrap();
        assert!(matches!(session_end(&conn, 999, None), Err(CoreError::InvalidInput(_))));
    }

    #[test]
    fn test_session_summary_overwrites() {
        let conn = db::open_in_memory().unwrap();
        let id = session_start(&conn, None).unwrap();
        session_summary(&conn, id, "first").unwrap();
        session_summary(&conn, id, "second").unwrap();
        let s = get_session(&conn, id).unwrap();
        assert_eq!(s.summary.as_deref(), Some("second"));
    }
}

use rusqlite::Connection;
use sdd_core::CoreError;
use std::path::{Path, PathBuf};

const APP_NAME: &str = "sdd-mcp";

/// Resolves the default per-user data directory for the observation
/// database, the same way the rest of this toolchain resolves its own
/// state directories.
pub fn default_db_path() -> PathBuf {
    if let Some(dirs) = directories::ProjectDirs::from("", "", APP_NAME) {
        return dirs
            .data_dir()
            .join("observations.sqlite3");
    }
    PathBuf::from("observations.sqlite3")
}

/// Opens (creating if absent) the observation database at `path` and
/// applies the idempotent schema. There is exactly one schema generation
/// at this revision, so there is no migration runner yet.
pub fn open(path: &Path) -> Result<Connection, CoreError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            CoreError::Fatal(format!("creating data directory {}: {e}", parent.display()))
        })?;
    }
    let conn = Connection::open(path)
        .map_err(|e| CoreError::Fatal(format!("opening database {}: {e}", path.display())))?;
    conn.pragma_update(None, "journal_mode", "WAL")
        .map_err(|e| CoreError::Fatal(format!("setting journal_mode: {e}")))?;
    conn.pragma_update(None, "foreign_keys", "ON")
        .map_err(|e| CoreError::Fatal(format!("enabling foreign_keys: {e}")))?;
    apply_schema(&conn)?;
    Ok(conn)
}

pub fn open_in_memory() -> Result<Connection, CoreError> {
    let conn = Connection::open_in_memory()
        .map_err(|e| CoreError::Fatal(format!("opening in-memory database: {e}")))?;
    apply_schema(&conn)?;
    Ok(conn)
}

fn apply_schema(conn: &Connection) -> Result<(), CoreError> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS session (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            project TEXT,
            started_at TEXT NOT NULL,
            ended_at TEXT,
            summary TEXT
        );

        CREATE TABLE IF NOT EXISTS observation (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            session_id INTEGER REFERENCES session(id),
            type TEXT NOT NULL,
            title TEXT NOT NULL,
            content TEXT NOT NULL,
            project TEXT,
            scope TEXT NOT NULL DEFAULT 'project',
            topic_key TEXT,
            namespace TEXT,
            revision_count INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            deleted_at TEXT
        );

        CREATE UNIQUE INDEX IF NOT EXISTS observation_topic_key_unique
            ON observation (
                topic_key,
                COALESCE(project, ''),
                scope,
                COALESCE(namespace, '')
            )
            WHERE topic_key IS NOT NULL AND deleted_at IS NULL;

        CREATE TABLE IF NOT EXISTS user_prompt (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            session_id INTEGER REFERENCES session(id),
            content TEXT NOT NULL,
            project TEXT,
            namespace TEXT,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS relation (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            from_obs_id INTEGER NOT NULL REFERENCES observation(id),
            to_obs_id INTEGER NOT NULL REFERENCES observation(id),
            type TEXT NOT NULL,
            created_at TEXT NOT NULL,
            UNIQUE (from_obs_id, to_obs_id, type)
        );

        CREATE VIRTUAL TABLE IF NOT EXISTS observation_fts USING fts5(
            title,
            content,
            content='observation',
            content_rowid='id'
        );
        ",
    )
    .map_err(|e| CoreError::Fatal(format!("applying schema: {e}")))
}

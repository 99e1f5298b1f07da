//! Structured session execution result.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

pub const RESULT_FILE_NAME: &str = "result.toml";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionArtifact {
    /// Artifact path relative to session dir (e.g., "output/acp-events.jsonl")
    pub path: String,
    /// Optional number of lines (used by transcript JSONL artifacts).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_count: Option<u64>,
    /// Optional file size in bytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
}

impl SessionArtifact {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            line_count: None,
            size_bytes: None,
        }
    }

    pub fn with_stats(path: impl Into<String>, line_count: u64, size_bytes: u64) -> Self {
        Self {
            path: path.into(),
            line_count: Some(line_count),
            size_bytes: Some(size_bytes),
        }
    }
}

impl fmt::Display for SessionArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.line_count, self.size_bytes) {
            (Some(lines), Some(bytes)) => {
                write!(f, "{} (lines={}, bytes={})", self.path, lines, bytes)
            }
            (Some(lines), None) => write!(f, "{} (lines={})", self.path, lines),
            (None, Some(bytes)) => write!(f, "{} (bytes={})", self.path, bytes),
            (None, None) => f.write_str(&self.path),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SessionArtifactCompat {
    Path(String),
    Detailed(SessionArtifact),
}

fn deserialize_artifacts<'de, D>(deserializer: D) -> Result<Vec<SessionArtifact>, D::Error>
where
    D: Deserializer<'de>,
{
    let compat = Vec::<SessionArtifactCompat>::deserialize(deserializer)?;
    Ok(compat
        .into_iter()
        .map(|entry| match entry {
            SessionArtifactCompat::Path(path) => SessionArtifact::new(path),
            SessionArtifactCompat::Detailed(detailed) => detailed,
        })
        .collect())
}

fn is_zero(value: &u64) -> bool {
    *value == 0
}

/// Structured result of a session execution.
/// Written to `sessions/{id}/result.toml` after each tool invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionResult {
    /// Execution status: "success", "failure", "timeout", "signal"
    pub status: String,
    /// Tool exit code
    pub exit_code: i32,
    /// Brief summary of what happened (last meaningful output line, max 200 chars)
    pub summary: String,
    /// Tool that was executed
    pub tool: String,
    /// When execution started
    pub started_at: DateTime<Utc>,
    /// When execution completed
    pub completed_at: DateTime<Utc>,
    /// Number of ACP events observed from transport.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub events_count: u64,
    /// List of artifact metadata relative to session dir.
    #[serde(
        default,
        skip_serializing_if = "Vec::is_empty",
        deserialize_with = "deserialize_artifacts"
    )]
    pub artifacts: Vec<SessionArtifact>,
}

impl SessionResult {
    /// Derive status string from exit code
    pub fn status_from_exit_code(exit_code: i32) -> String {
        match exit_code {
            0 => "success".to_string(),
            137 | 143 => "signal".to_string(), // SIGKILL / SIGTERM
            _ => "failure".to_string(),
        }
    }
}

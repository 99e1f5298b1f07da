//! ULID validation and prefix matching

use anyhow::{bail, Context, Result};
use std::path::Path;

/// Generate a new ULID session ID
pub fn new_session_id() -> String {
    ulid::Ulid::new().to_string()
}

/// Validate that a string is a valid ULID
pub fn validate_session_id(id: &str) -> Result<()> {
    if id.len() != 26 {
        bail!(
            "Invalid session ID '{}': expected 26 characters, got {}",
            id,
            id.len()
        );
    }

    // Try to parse as ULID
    ulid::Ulid::from_string(id)
        .with_context(|| format!("Invalid session ID '{}': not a valid ULID", id))?;

    Ok(())
}

/// Resolve a session ID prefix to a full session ID
///
/// Scans the sessions directory and finds sessions matching the prefix.
/// Returns an error if 0 or more than 1 match is found.
pub fn resolve_session_prefix(sessions_dir: &Path, prefix: &str) -> Result<String> {
    if !sessions_dir.exists() {
        bail!("No session matching prefix '{}'", prefix);
    }

    let entries = std::fs::read_dir(sessions_dir).with_context(|| {
        format!(
            "Failed to read sessions directory: {}",
            sessions_dir.display()
        )
    })?;

    let mut matches = Vec::new();

    for entry in entries {
        let entry = entry.context("Failed to read directory entry")?;
        let file_name = entry.file_name();
        let name = file_name.to_string_lossy();

        if name.to_uppercase().starts_with(&prefix.to_uppercase()) {
            matches.push(name.to_string());
        }
    }

    match matches.len() {
        0 => bail!("No session matching prefix '{}'", prefix),
        1 => Ok(matches.into_iter().next().unwrap()),
        _ => bail!(
            "Ambiguous session prefix '{}': matches multiple sessions: {}",
            prefix,
            matches.join(", ")
        ),
    }
}

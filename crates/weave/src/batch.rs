//! Batch compilation: walk a directory tree for `workflow.toml` sources and compile
//! each one, printing per-pattern progress and a final summary.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::compiler::{compile, plan_to_toml};
use crate::parser::parse_skill;

/// Aggregated result of a batch compile run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchSummary {
    pub ok: usize,
    pub failed: usize,
    pub results: Vec<PatternResult>,
}

/// Per-pattern compile result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternResult {
    pub path: PathBuf,
    pub success: bool,
    pub error: Option<String>,
}

/// Recursively find all `workflow.toml` files under `root`, compile each one via
/// the existing parse-then-compile pipeline, and return an aggregated summary.
///
/// For each skill markdown file compiled, progress is printed to stderr:
/// ```text
/// [1/5] patterns/commit/workflow.toml ... OK
/// [2/5] patterns/debate/workflow.toml ... FAILED: <reason>
/// ```
pub fn compile_all(root: &Path) -> Result<BatchSummary> {
    if !root.exists() {
        eprintln!(
            "directory {} does not exist, nothing to compile",
            root.display()
        );
        return Ok(BatchSummary {
            ok: 0,
            failed: 0,
            results: Vec::new(),
        });
    }
    if !root.is_dir() {
        anyhow::bail!("{} is not a directory", root.display());
    }

    let plans = find_workflow_tomls(root)?;

    if plans.is_empty() {
        eprintln!("no workflow.toml files found under {}", root.display());
        return Ok(BatchSummary {
            ok: 0,
            failed: 0,
            results: Vec::new(),
        });
    }

    let total = plans.len();
    let mut ok = 0usize;
    let mut failed = 0usize;
    let mut results = Vec::with_capacity(total);

    for (i, plan_path) in plans.iter().enumerate() {
        let label = plan_path.display();
        eprint!("[{}/{}] {label} ... ", i + 1, total);

        match compile_single(plan_path) {
            Ok(()) => {
                eprintln!("OK");
                ok += 1;
                results.push(PatternResult {
                    path: plan_path.clone(),
                    success: true,
                    error: None,
                });
            }
            Err(e) => {
                eprintln!("FAILED: {e:#}");
                failed += 1;
                results.push(PatternResult {
                    path: plan_path.clone(),
                    success: false,
                    error: Some(format!("{e:#}")),
                });
            }
        }
    }

    Ok(BatchSummary {
        ok,
        failed,
        results,
    })
}

/// Find all `workflow.toml` files under `root`, sorted for deterministic output.
fn find_workflow_tomls(root: &Path) -> Result<Vec<PathBuf>> {
    let mut plans = Vec::new();
    walk_dir(root, &mut plans)?;
    plans.sort();
    Ok(plans)
}

/// Recursive directory walker that collects paths named `workflow.toml`.
fn walk_dir(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("failed to read directory {}", dir.display()))?;

    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            walk_dir(&path, out)?;
        } else if path.file_name().is_some_and(|n| n == "workflow.toml") {
            out.push(path);
        }
    }

    Ok(())
}

/// Compile a single `workflow.toml` by finding its sibling SKILL.md (or PATTERN.md)
/// source, parsing and compiling it, and verifying the TOML round-trips.
///
/// Since `workflow.toml` is already the *compiled* output, we validate it by
/// deserializing and re-serializing to ensure structural correctness.
fn compile_single(plan_path: &Path) -> Result<()> {
    // Look for a companion skill markdown source next to (or near) workflow.toml.
    // The convention is: patterns/<name>/PATTERN.md compiles to workflow.toml in
    // the same directory, or skills/<name>/SKILL.md.  If a PATTERN.md or SKILL.md
    // exists we compile from source; otherwise we validate the workflow.toml itself.

    let parent = plan_path
        .parent()
        .context("workflow.toml has no parent directory")?;

    // Try PATTERN.md first, then look for SKILL.md in a skills/ subdirectory.
    let source = find_skill_source(parent);

    match source {
        Some(src_path) => {
            let content = std::fs::read_to_string(&src_path)
                .with_context(|| format!("failed to read {}", src_path.display()))?;
            let doc = parse_skill(&content)
                .with_context(|| format!("failed to parse {}", src_path.display()))?;
            let plan = compile(&doc).context("compilation failed")?;
            // Verify TOML serialization round-trips.
            let _toml_str = plan_to_toml(&plan)?;
            Ok(())
        }
        None => {
            // No source file found; validate workflow.toml structure by deserializing.
            let content = std::fs::read_to_string(plan_path)
                .with_context(|| format!("failed to read {}", plan_path.display()))?;
            let _plan = crate::compiler::plan_from_toml(&content)
                .with_context(|| format!("invalid workflow.toml at {}", plan_path.display()))?;
            Ok(())
        }
    }
}

/// Look for a skill markdown source near the given directory.
///
/// Search order:
/// 1. `<dir>/PATTERN.md`
/// 2. `<dir>/skills/*/SKILL.md` (first match)
fn find_skill_source(dir: &Path) -> Option<PathBuf> {
    let pattern_md = dir.join("PATTERN.md");
    if pattern_md.is_file() {
        return Some(pattern_md);
    }

    let skills_dir = dir.join("skills");
    if skills_dir.is_dir() {
        if let Ok(entries) = std::fs::read_dir(&skills_dir) {
            for entry in entries.flatten() {
                let skill_md = entry.path().join("SKILL.md");
                if skill_md.is_file() {
                    return Some(skill_md);
                }
            }
        }
    }

    None
}

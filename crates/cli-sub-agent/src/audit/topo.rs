use regex::Regex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::fs;
use std::path::Path;
use std::sync::LazyLock;

/// Regex matching `mod foo;` declarations (not inline `mod foo { ... }`).
static MOD_DECL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*(?:pub(?:\(crate\))?\s+)?mod\s+(\w+)\s*;").unwrap());

/// Regex matching `use crate::some::path` declarations.
static USE_CRATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*use\s+crate::(\w+)").unwrap());

/// Sort files in topological order based on Rust `mod`/`use crate::` dependencies.
///
/// Returns files with leaves (no dependencies) first so auditors process
/// foundational modules before the code that depends on them.
///
/// Non-Rust files and files where dependency parsing fails fall back to
/// directory-depth ordering (deeper paths first, then alphabetical).
///
/// Dependencies are resolved by file path structure rather than module name
/// indexing, which correctly handles nested modules with the same basename
/// (e.g., `src/config.rs` and `src/foo/config.rs`).
///
/// `context_files` provides the full manifest file list for crate root
/// discovery. This ensures `lib.rs`/`main.rs` are found even when `files`
/// has been filtered (e.g., `--filter generated`). Pass `files` again when
/// no filtering was applied.
pub(crate) fn topo_sort(
    files: &[String],
    context_files: &[String],
    project_root: &Path,
) -> Vec<String> {
    let rust_files: Vec<&String> = files.iter().filter(|f| f.ends_with(".rs")).collect();
    let non_rust_files: Vec<&String> = files.iter().filter(|f| !f.ends_with(".rs")).collect();

    // Discover crate roots from the full (unfiltered) file set so that
    // `lib.rs`/`main.rs` are found even when the sort input was filtered.
    let context_rust: Vec<&String> = context_files
        .iter()
        .filter(|f| f.ends_with(".rs"))
        .collect();
    let crate_roots = discover_crate_roots(&context_rust);

    // Build file set for O(1) membership checks.
    let file_set: HashSet<&str> = rust_files.iter().map(|f| f.as_str()).collect();

    // Build adjacency list using path-based dependency resolution.
    let mut deps: HashMap<String, HashSet<String>> = HashMap::new();
    for file in &rust_files {
        deps.insert((*file).clone(), HashSet::new());
    }

    for file in &rust_files {
        let abs_path = project_root.join(file);
        let content = match fs::read_to_string(&abs_path) {
            Ok(c) => c,
            Err(_) => continue,
        };

        let crate_root = find_crate_root(file, &crate_roots);

        // Resolve `mod foo;` declarations to child module file paths.
        for mod_name in parse_mod_declarations(&content) {
            for candidate in resolve_child_module(file, &mod_name) {
                if file_set.contains(candidate.as_str()) && candidate != **file {
                    deps.entry((*file).clone()).or_default().insert(candidate);
                }
            }
        }

        // Resolve `use crate::foo` to crate-root-level module file paths.
        for module_name in parse_use_crate_refs(&content) {
            for candidate in resolve_crate_use(&crate_root, &module_name) {
                if file_set.contains(candidate.as_str()) && candidate != **file {
                    deps.entry((*file).clone()).or_default().insert(candidate);
                }
            }
        }
    }

    // Kahn's algorithm for topological sort (leaves first).
    let sorted_rust = kahns_sort(&deps);

    // Non-Rust files sorted by depth (deeper first), then alphabetical.
    let mut non_rust_sorted: Vec<String> = non_rust_files.into_iter().cloned().collect();
    non_rust_sorted.sort_by(|a, b| {
        let depth_a = path_depth(a);
        let depth_b = path_depth(b);
        depth_b.cmp(&depth_a).then_with(|| a.cmp(b))
    });

    // Combine: Rust files in topo order first, then non-Rust files.
    let mut result = sorted_rust;
    result.extend(non_rust_sorted);
    result
}

/// Discover crate root directories from the file list.
///
/// A crate root is the directory containing `lib.rs` or `main.rs`.
/// Returns a sorted list of crate root paths (longest first for greedy matching).
fn discover_crate_roots(rust_files: &[&String]) -> Vec<String> {
    let mut roots: HashSet<String> = HashSet::new();
    for file in rust_files {
        let path = Path::new(file.as_str());
        if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
            if stem == "lib" || stem == "main" {
                if let Some(parent) = path.parent() {
                    roots.insert(parent.to_string_lossy().replace('\\', "/"));
                }
            }
        }
    }
    // Sort longest first so deeper crate roots match before shallower ones.
    let mut sorted: Vec<String> = roots.into_iter().collect();
    sorted.sort_by_key(|r| std::cmp::Reverse(r.len()));
    sorted
}

/// Find the crate root for a given file path.
///
/// Returns the longest matching crate root, or "." as fallback.
/// Matches on path-segment boundaries to avoid `crate_a/src` matching
/// `crate_a/src2/file.rs`.
fn find_crate_root(file: &str, crate_roots: &[String]) -> String {
    let file_normalized = file.replace('\\', "/");
    for root in crate_roots {
        if file_normalized.starts_with(root)
            && (file_normalized.len() == root.len()
                || file_normalized[root.len()..].starts_with('/'))
        {
            return root.clone();
        }
    }
    // Fallback: use "." (project root as single implicit crate).
    ".".to_string()
}

/// Extract `mod foo;` declaration names from source code.
///
/// Matches `mod foo;`, `pub mod foo;`, and `pub(crate) mod foo;` but NOT
/// inline `mod foo { ... }` blocks (no trailing semicolon).
fn parse_mod_declarations(content: &str) -> HashSet<String> {
    MOD_DECL_RE
        .captures_iter(content)
        .filter_map(|cap| cap.get(1).map(|m| m.as_str().to_string()))
        .collect()
}

/// Extract top-level crate module names from `use crate::foo` declarations.
fn parse_use_crate_refs(content: &str) -> HashSet<String> {
    USE_CRATE_RE
        .captures_iter(content)
        .filter_map(|cap| cap.get(1).map(|m| m.as_str().to_string()))
        .collect()
}

/// Resolve `mod foo;` from a declaring file to candidate child module file paths.
///
/// Rust module resolution rules:
/// - `src/lib.rs` declaring `mod foo` -> `src/foo.rs` or `src/foo/mod.rs`
/// - `src/bar.rs` declaring `mod foo` -> `src/bar/foo.rs` or `src/bar/foo/mod.rs`
/// - `src/bar/mod.rs` declaring `mod foo` -> `src/bar/foo.rs` or `src/bar/foo/mod.rs`
fn resolve_child_module(declaring_file: &str, mod_name: &str) -> Vec<String> {
    let path = Path::new(declaring_file);
    let parent_dir = match path.file_stem().and_then(|s| s.to_str()) {
        Some("mod" | "lib" | "main") => {
            // mod.rs, lib.rs, main.rs -> child modules are siblings in the same dir
            path.parent().unwrap_or(Path::new("")).to_path_buf()
        }
        _ => {
            // foo.rs -> child modules are in foo/ directory
            path.with_extension("")
        }
    };

    let candidate_file = parent_dir.join(format!("{mod_name}.rs"));
    let candidate_mod = parent_dir.join(mod_name).join("mod.rs");

    vec![
        candidate_file.to_string_lossy().replace('\\', "/"),
        candidate_mod.to_string_lossy().replace('\\', "/"),
    ]
}

/// Resolve `use crate::foo` to candidate file paths within the crate root.
///
/// `use crate::foo` always references a top-level module of the crate,
/// regardless of where the `use` statement appears.
fn resolve_crate_use(crate_root: &str, module_name: &str) -> Vec<String> {
    if crate_root == "." {
        vec![format!("{module_name}.rs"), format!("{module_name}/mod.rs")]
    } else {
        vec![
            format!("{crate_root}/{module_name}.rs"),
            format!("{crate_root}/{module_name}/mod.rs"),
        ]
    }
}

/// Kahn's algorithm producing a topological ordering (leaves first).
///
/// `deps` maps each file to the set of files it depends on.  We want leaves
/// (files with zero dependencies) emitted first, so we run Kahn's on the
/// *forward* dependency graph using **out-degree** (number of unresolved deps).
///
/// If cycles are detected, cyclic components fall back to depth-based ordering
/// and are appended after the acyclic portion.
fn kahns_sort(deps: &HashMap<String, HashSet<String>>) -> Vec<String> {
    // Build reverse adjacency: for each node, which other nodes depend on it?
    let mut dependents: HashMap<&String, Vec<&String>> = HashMap::new();
    for node in deps.keys() {
        dependents.entry(node).or_default();
    }
    // out_degree[node] = how many (known) dependencies node still has.
    let mut out_degree: HashMap<&String, usize> = HashMap::new();
    for (node, node_deps) in deps {
        // Only count deps that are actually in our file set.
        let count = node_deps.iter().filter(|d| deps.contains_key(*d)).count();
        out_degree.insert(node, count);
        for dep in node_deps {
            if deps.contains_key(dep) {
                dependents.entry(dep).or_default().push(node);
            }
        }
    }

    // Start with nodes that have zero dependencies (leaves / foundations).
    let mut initial: Vec<&String> = out_degree
        .iter()
        .filter(|&(_, &deg)| deg == 0)
        .map(|(node, _)| *node)
        .collect();
    initial.sort(); // deterministic
    let mut queue: VecDeque<&String> = initial.into_iter().collect();

    let mut result: Vec<String> = Vec::new();

    while let Some(node) = queue.pop_front() {
        result.push(node.clone());

        // For each node that depends on `node`, decrement its out-degree.
        if let Some(users) = dependents.get(node) {
            let mut next_ready: Vec<&String> = Vec::new();
            for user in users {
                if let Some(deg) = out_degree.get_mut(*user) {
                    *deg = deg.saturating_sub(1);
                    if *deg == 0 {
                        next_ready.push(user);
                    }
                }
            }
            next_ready.sort(); // deterministic
            for ready in next_ready {
                queue.push_back(ready);
            }
        }
    }

    // Handle cycles: any remaining nodes not in result are part of cycles.
    if result.len() < deps.len() {
        let result_set: HashSet<&str> = result.iter().map(|s| s.as_str()).collect();
        let mut cyclic: Vec<String> = deps
            .keys()
            .filter(|k| !result_set.contains(k.as_str()))
            .cloned()
            .collect();
        // Fall back to depth ordering for cyclic nodes.
        cyclic.sort_by(|a, b| {
            let depth_a = path_depth(a);
            let depth_b = path_depth(b);
            depth_b.cmp(&depth_a).then_with(|| a.cmp(b))
        });
        result.extend(cyclic);
    }

    result
}

fn path_depth(path: &str) -> usize {
    path.split('/')
        .filter(|segment| !segment.is_empty())
        .count()
}

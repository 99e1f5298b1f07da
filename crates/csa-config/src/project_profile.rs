use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::path::Path;
use std::str::FromStr;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Default)]
pub enum ProjectProfile {
    Rust,
    Node,
    Python,
    Go,
    Mixed,
    #[default]
    Unknown,
}

impl Display for ProjectProfile {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let value = match self {
            Self::Rust => "rust",
            Self::Node => "node",
            Self::Python => "python",
            Self::Go => "go",
            Self::Mixed => "mixed",
            Self::Unknown => "unknown",
        };
        write!(f, "{value}")
    }
}

impl FromStr for ProjectProfile {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rust" => Ok(Self::Rust),
            "node" => Ok(Self::Node),
            "python" => Ok(Self::Python),
            "go" => Ok(Self::Go),
            "mixed" => Ok(Self::Mixed),
            "unknown" => Ok(Self::Unknown),
            _ => Err(()),
        }
    }
}

fn has_non_symlink_file(project_root: &Path, file_name: &str) -> bool {
    let path = project_root.join(file_name);
    match std::fs::symlink_metadata(path) {
        Ok(metadata) => !metadata.file_type().is_symlink() && metadata.is_file(),
        Err(_) => false,
    }
}

pub fn detect_project_profile(project_root: &Path) -> ProjectProfile {
    let has_rust =
        has_non_symlink_file(project_root, "Cargo.toml") || has_non_symlink_file(project_root, "Cargo.lock");
    let has_node = has_non_symlink_file(project_root, "package.json")
        || has_non_symlink_file(project_root, "package-lock.json")
        || has_non_symlink_file(project_root, "yarn.lock")
        || has_non_symlink_file(project_root, "pnpm-lock.yaml");
    let has_python = has_non_symlink_file(project_root, "pyproject.toml")
        || has_non_symlink_file(project_root, "requirements.txt")
        || has_non_symlink_file(project_root, "poetry.lock")
        || has_non_symlink_file(project_root, "Pipfile");
    let has_go =
        has_non_symlink_file(project_root, "go.mod") || has_non_symlink_file(project_root, "go.sum");

    let detected_count = [has_rust, has_node, has_python, has_go]
        .into_iter()
        .filter(|detected| *detected)
        .count();

    if detected_count > 1 {
        return ProjectProfile::Mixed;
    }
    if has_rust {
        return ProjectProfile::Rust;
    }
    if has_node {
        return ProjectProfile::Node;
    }
    if has_python {
        return ProjectProfile::Python;
    }
    if has_go {
        return ProjectProfile::Go;
    }

    ProjectProfile::Unknown
}

pub fn detect_project_profile_with_override(
    project_root: &Path,
    config_override: Option<&str>,
) -> ProjectProfile {
    if let Some(override_value) = config_override {
        if let Ok(parsed) = ProjectProfile::from_str(override_value) {
            return parsed;
        }
    }

    detect_project_profile(project_root)
}

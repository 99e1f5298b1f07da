//! Hook configuration loading with 4-tier priority.

use crate::event::HookEvent;
use crate::guard::PromptGuardEntry;
use crate::guard::builtin_prompt_guards;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// Configuration for a single hook
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HookConfig {
    /// Whether this hook is enabled (default: true for built-in events)
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Shell command template. If None, uses the built-in default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    /// Timeout in seconds (default: 30)
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_true() -> bool {
    true
}
fn default_timeout() -> u64 {
    30
}

/// All hooks configuration, keyed by event name.
///
/// The `prompt_guard` field is an independent typed array that does NOT go
/// through the `flatten` HashMap. This allows `[[prompt_guard]]` TOML arrays
/// to be deserialized as structured entries alongside the flat hook map.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HooksConfig {
    /// Whether to prepend built-in prompt guards before user-defined guards.
    /// `None` = not specified (inherit from lower-priority layer; defaults to `true`).
    /// `Some(false)` = explicitly disable builtins. `Some(true)` = explicitly enable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub builtin_guards: Option<bool>,

    /// User-configurable prompt guard scripts. Each entry is a shell script
    /// that receives JSON context on stdin and outputs injection text on stdout.
    #[serde(default)]
    pub prompt_guard: Vec<PromptGuardEntry>,

    #[serde(flatten)]
    pub hooks: HashMap<String, HookConfig>,
}

impl HooksConfig {
    /// Load from a TOML file, returning empty config on error.
    fn load_from_file(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }

        match fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => config,
                Err(e) => {
                    tracing::warn!("Failed to parse hooks config at {}: {}", path.display(), e);
                    Self::default()
                }
            },
            Err(e) => {
                tracing::warn!("Failed to read hooks config at {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    /// Merge another config into self, with other taking priority.
    ///
    /// For hooks: higher-priority entries override by key.
    /// For prompt_guard: higher-priority entries replace the entire array
    /// (non-empty array wins; empty array means "no override from this layer").
    fn merge_with(&mut self, other: Self) {
        // builtin_guards: only override when explicitly set (Some); None = no opinion
        if other.builtin_guards.is_some() {
            self.builtin_guards = other.builtin_guards;
        }
        for (key, value) in other.hooks {
            self.hooks.insert(key, value);
        }
        // prompt_guard: non-empty higher-priority array replaces lower
        if !other.prompt_guard.is_empty() {
            self.prompt_guard = other.prompt_guard;
        }
    }

    /// Get configuration for a specific event, falling back to built-in defaults.
    pub fn get_for_event(&self, event: HookEvent) -> HookConfig {
        let key = event.as_config_key();
        if let Some(config) = self.hooks.get(key) {
            config.clone()
        } else if event.builtin_command().is_some() {
            // Use built-in default for events that have one
            HookConfig {
                enabled: true,
                command: None, // Will be resolved from builtin_command()
                timeout_secs: 30,
            }
        } else {
            // Events without built-in: disabled by default
            HookConfig {
                enabled: false,
                command: None,
                timeout_secs: 30,
            }
        }
    }
}

/// Load hooks config with 4-tier priority:
/// 1. runtime_overrides (CLI params) — highest
/// 2. project config (~/.local/state/csa/{project}/hooks.toml)
/// 3. global config (~/.config/cli-sub-agent/hooks.toml)
/// 4. built-in defaults — lowest
///
/// For each hook event key, the first non-None source wins.
pub fn load_hooks_config(
    project_hooks_path: Option<&Path>,
    global_hooks_path: Option<&Path>,
    runtime_overrides: Option<&HashMap<String, HookConfig>>,
) -> HooksConfig {
    // Start with built-in defaults (empty map, resolved on-demand via get_for_event)
    let mut config = HooksConfig::default();

    // Layer 4 (lowest): built-in defaults are implicit in get_for_event()

    // Layer 3: global config
    if let Some(path) = global_hooks_path {
        let global = HooksConfig::load_from_file(path);
        config.merge_with(global);
    }

    // Layer 2: project config
    if let Some(path) = project_hooks_path {
        let project = HooksConfig::load_from_file(path);
        config.merge_with(project);
    }

    // Layer 1 (highest): runtime overrides
    if let Some(overrides) = runtime_overrides {
        let runtime_config = HooksConfig {
            builtin_guards: None, // runtime overrides don't change guard enablement
            prompt_guard: Vec::new(),
            hooks: overrides.clone(),
        };
        config.merge_with(runtime_config);
    }

    // Layer 0 (lowest): built-in prompt guards prepended to user guards.
    // Builtins run first, then user-defined guards. `builtin_guards = false` disables.
    if config.builtin_guards.unwrap_or(true) {
        let mut combined = builtin_prompt_guards();
        combined.extend(config.prompt_guard);
        config.prompt_guard = combined;
    }

    config
}

/// Resolve the global hooks config path
pub fn global_hooks_path() -> Option<std::path::PathBuf> {
    directories::ProjectDirs::from("", "", "cli-sub-agent")
        .map(|dirs| dirs.config_dir().join("hooks.toml"))
}

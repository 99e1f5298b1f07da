//! Hook command execution with template variable substitution.

use crate::config::HookConfig;
use crate::event::HookEvent;
use anyhow::{bail, Result};
use std::collections::HashMap;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

/// Escape a string for safe shell usage by wrapping in single quotes.
///
/// Internal single quotes are escaped as '\'' (end quote, escaped quote, start quote).
fn shell_escape(s: &str) -> String {
    format!("'{}'", s.replace('\'', "'\\''"))
}

/// Substitute template variables in a command string using single-pass parsing.
///
/// Variables are specified as `{key}` and replaced with shell-escaped values.
/// Unrecognized placeholders are left as-is. Already-substituted content is never
/// re-scanned, preventing double-substitution attacks.
fn substitute_variables(template: &str, variables: &HashMap<String, String>) -> String {
    let mut result = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '{' {
            let mut key = String::new();
            let mut found_close = false;
            for inner_ch in chars.by_ref() {
                if inner_ch == '}' {
                    found_close = true;
                    break;
                }
                key.push(inner_ch);
            }
            if found_close {
                if let Some(value) = variables.get(&key) {
                    result.push_str(&shell_escape(value));
                } else {
                    // Keep unresolved placeholders as-is
                    result.push('{');
                    result.push_str(&key);
                    result.push('}');
                }
            } else {
                // Unclosed brace, keep as-is
                result.push('{');
                result.push_str(&key);
            }
        } else {
            result.push(ch);
        }
    }
    result
}

/// Execute a hook command with template variable substitution.
///
/// Variables are shell-escaped to prevent injection.
/// Command is run via `sh -c` with a configurable timeout.
///
/// Returns `Err` on spawn failure, non-zero exit, or timeout.
/// Callers should handle errors as best-effort (log and continue).
pub fn run_hook(
    event: HookEvent,
    config: &HookConfig,
    variables: &HashMap<String, String>,
) -> Result<()> {
    // Skip if disabled
    if !config.enabled {
        tracing::debug!(event = ?event, "Hook disabled, skipping");
        return Ok(());
    }

    // Determine command: explicit config or built-in default
    let template = match config.command.as_deref() {
        Some(cmd) => cmd,
        None => match event.builtin_command() {
            Some(cmd) => cmd,
            None => {
                tracing::debug!(event = ?event, "Hook has no command configured, skipping");
                return Ok(());
            }
        },
    };

    // Substitute variables
    let expanded_command = substitute_variables(template, variables);
    tracing::debug!(event = ?event, "Executing hook");

    // Execute via sh -c with timeout.
    // Suppress stdout/stderr to avoid polluting CLI output (e.g., --format json).
    let mut cmd = Command::new("sh");
    cmd.arg("-c")
        .arg(&expanded_command)
        .stdout(Stdio::null())
        .stderr(Stdio::null());

    // Create new process group so timeout can kill the entire group,
    // not just the shell process (which would orphan its children).
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }

    let mut child = cmd.spawn()?;

    let timeout = Duration::from_secs(config.timeout_secs);
    let start = Instant::now();

    loop {
        match child.try_wait()? {
            Some(status) => {
                if status.success() {
                    tracing::debug!(event = ?event, "Hook completed successfully");
                    return Ok(());
                } else {
                    let exit_code = status.code().unwrap_or(-1);
                    bail!("Hook {event:?} exited with code {exit_code}");
                }
            }
            None => {
                if start.elapsed() >= timeout {
                    // Kill the entire process group on timeout
                    #[cfg(unix)]
                    {
                        // SAFETY: kill() is async-signal-safe. Negative PID targets
                        // the entire process group created by process_group(0).
                        unsafe {
                            libc::kill(-(child.id() as i32), libc::SIGKILL);
                        }
                    }
                    #[cfg(not(unix))]
                    {
                        let _ = child.kill();
                    }
                    let _ = child.wait(); // Reap zombie
                    bail!("Hook {event:?} timed out after {}s", config.timeout_secs);
                }
                std::thread::sleep(Duration::from_millis(100));
            }
        }
    }
}

/// Execute all hooks for an event, using the merged config.
///
/// This is a convenience wrapper around `run_hook` that handles the config lookup.
pub fn run_hooks_for_event(
    event: HookEvent,
    hooks_config: &crate::config::HooksConfig,
    variables: &HashMap<String, String>,
) -> Result<()> {
    let config = hooks_config.get_for_event(event);
    run_hook(event, &config, variables)
}

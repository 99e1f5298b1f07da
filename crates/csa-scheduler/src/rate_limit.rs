//! 429 / rate-limit detection from tool stderr and stdout.

use serde::Serialize;

/// Information about a detected rate-limit event.
#[derive(Debug, Clone, Serialize)]
pub struct RateLimitDetected {
    pub tool: String,
    pub matched_pattern: String,
}

/// Check stderr/stdout for rate-limit indicators.
///
/// Each tool emits different error messages when rate-limited. This function
/// checks known patterns and returns `Some` if a match is found.
pub fn detect_rate_limit(
    tool_name: &str,
    stderr: &str,
    stdout: &str,
    exit_code: i32,
) -> Option<RateLimitDetected> {
    // Non-zero exit + pattern match
    if exit_code == 0 {
        return None;
    }

    let combined = format!("{}\n{}", stderr, stdout);
    let patterns = patterns_for_tool(tool_name);

    for pattern in patterns {
        if combined.contains(pattern) {
            return Some(RateLimitDetected {
                tool: tool_name.to_string(),
                matched_pattern: pattern.to_string(),
            });
        }
    }

    None
}

fn patterns_for_tool(tool: &str) -> &'static [&'static str] {
    match tool {
        "gemini-cli" => &[
            "Resource exhausted",
            "429",
            "quota exceeded",
            "RESOURCE_EXHAUSTED",
        ],
        "opencode" => &["rate limit", "429", "too many requests", "Rate limit"],
        "codex" => &["rate_limit_exceeded", "429", "RateLimitError"],
        "claude-code" => &["rate limit", "429", "overloaded", "529"],
        _ => &["429", "rate limit"],
    }
}

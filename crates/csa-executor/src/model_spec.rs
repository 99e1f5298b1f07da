//! Model specification parsing.

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

/// Unified model spec: tool/provider/model/thinking_budget
///
/// Example: "opencode/google/gemini-2.5-pro/high"
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSpec {
    pub tool: String,
    pub provider: String,
    pub model: String,
    pub thinking_budget: ThinkingBudget,
}

/// Thinking budget for AI models.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ThinkingBudget {
    /// Use the tool's default thinking budget.
    DefaultBudget,
    Low,
    Medium,
    High,
    Xhigh,
    Custom(u32),
}

impl ModelSpec {
    /// Parse model spec from string format: tool/provider/model/thinking_budget
    pub fn parse(spec: &str) -> Result<Self> {
        let parts: Vec<&str> = spec.splitn(4, '/').collect();
        if parts.len() != 4 {
            bail!(
                "Invalid model spec '{}': expected tool/provider/model/thinking_budget",
                spec
            );
        }
        Ok(Self {
            tool: parts[0].to_string(),
            provider: parts[1].to_string(),
            model: parts[2].to_string(),
            thinking_budget: ThinkingBudget::parse(parts[3])?,
        })
    }
}

impl ThinkingBudget {
    /// Parse thinking budget from string.
    ///
    /// Accepts: default, low, medium/med, high, xhigh/extra-high, or a numeric value.
    pub fn parse(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "default" => Ok(Self::DefaultBudget),
            "low" => Ok(Self::Low),
            "medium" | "med" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "xhigh" | "extra-high" => Ok(Self::Xhigh),
            other => {
                if let Ok(n) = other.parse::<u32>() {
                    Ok(Self::Custom(n))
                } else {
                    bail!(
                        "Invalid thinking budget '{}': expected default/low/medium/high/xhigh or a number",
                        other
                    )
                }
            }
        }
    }

    /// Returns the token count for this thinking budget level.
    pub fn token_count(&self) -> u32 {
        match self {
            Self::DefaultBudget => 10000,
            Self::Low => 1024,
            Self::Medium => 8192,
            Self::High => 32768,
            Self::Xhigh => 65536,
            Self::Custom(n) => *n,
        }
    }

    /// Returns the reasoning effort level for codex-style tools.
    ///
    /// Maps thinking budget levels to codex's --reasoning-effort values.
    pub fn codex_effort(&self) -> &'static str {
        match self {
            Self::DefaultBudget => "medium",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Xhigh => "high", // codex doesn't support xhigh, fallback to high
            Self::Custom(_) => "high", // custom values map to high
        }
    }
}

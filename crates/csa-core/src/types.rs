use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// AI tool selection
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
pub enum ToolName {
    GeminiCli,
    Opencode,
    Codex,
    ClaudeCode,
}

impl ToolName {
    /// Returns the CLI-facing name for this tool
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GeminiCli => "gemini-cli",
            Self::Opencode => "opencode",
            Self::Codex => "codex",
            Self::ClaudeCode => "claude-code",
        }
    }

    /// Returns the model family for this tool
    pub fn model_family(&self) -> ModelFamily {
        match self {
            Self::ClaudeCode => ModelFamily::Claude,
            Self::GeminiCli => ModelFamily::Gemini,
            Self::Codex => ModelFamily::OpenAI,
            Self::Opencode => ModelFamily::Other,
        }
    }

    /// Returns prompt transport channels supported by this tool.
    pub fn prompt_transport_capabilities(&self) -> &'static [PromptTransport] {
        prompt_transport_capabilities(self)
    }
}

/// Prompt transport channel used to send user prompts to tools.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PromptTransport {
    Argv,
    Stdin,
}

const PROMPT_TRANSPORT_ARGV_ONLY: &[PromptTransport] = &[PromptTransport::Argv];
const PROMPT_TRANSPORT_ARGV_AND_STDIN: &[PromptTransport] =
    &[PromptTransport::Argv, PromptTransport::Stdin];

/// Prompt transport capabilities for each tool.
pub fn prompt_transport_capabilities(tool: &ToolName) -> &'static [PromptTransport] {
    match tool {
        ToolName::Codex => PROMPT_TRANSPORT_ARGV_AND_STDIN,
        ToolName::GeminiCli => PROMPT_TRANSPORT_ARGV_AND_STDIN,
        ToolName::ClaudeCode => PROMPT_TRANSPORT_ARGV_AND_STDIN,
        ToolName::Opencode => PROMPT_TRANSPORT_ARGV_ONLY,
    }
}

impl std::fmt::Display for ToolName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Model family for heterogeneous diversity enforcement.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ModelFamily {
    Claude,
    Gemini,
    OpenAI,
    Other,
}

impl std::fmt::Display for ModelFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Claude => write!(f, "Claude"),
            Self::Gemini => write!(f, "Gemini"),
            Self::OpenAI => write!(f, "OpenAI"),
            Self::Other => write!(f, "Other"),
        }
    }
}

/// CLI-level tool argument parsed from `--tool`.
#[derive(Clone, Debug)]
pub enum ToolArg {
    /// Auto-select (HeterogeneousStrict). Default when --tool omitted.
    Auto,
    /// First available tool in built-in preference order, no heterogeneity requirement.
    AnyAvailable,
    /// Explicit tool, no negotiation.
    Specific(ToolName),
}

impl std::str::FromStr for ToolArg {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auto" => Ok(Self::Auto),
            "any-available" => Ok(Self::AnyAvailable),
            other => {
                // Try to parse as ToolName using clap's ValueEnum
                // We need to iterate through all possible values
                match other {
                    "gemini-cli" => Ok(Self::Specific(ToolName::GeminiCli)),
                    "opencode" => Ok(Self::Specific(ToolName::Opencode)),
                    "codex" => Ok(Self::Specific(ToolName::Codex)),
                    "claude-code" => Ok(Self::Specific(ToolName::ClaudeCode)),
                    _ => Err(format!(
                        "Invalid tool argument '{}'. Valid values: auto, any-available, gemini-cli, opencode, codex, claude-code",
                        other
                    )),
                }
            }
        }
    }
}

impl ToolArg {
    /// Convert to execution strategy based on command context.
    pub fn into_strategy(self) -> ToolSelectionStrategy {
        match self {
            Self::Auto => ToolSelectionStrategy::HeterogeneousStrict,
            Self::AnyAvailable => ToolSelectionStrategy::AnyAvailable,
            Self::Specific(t) => ToolSelectionStrategy::Explicit(t),
        }
    }
}

impl std::fmt::Display for ToolArg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::AnyAvailable => write!(f, "any-available"),
            Self::Specific(t) => write!(f, "{}", t.as_str()),
        }
    }
}

/// Resolved tool selection strategy used by the execution pipeline.
#[derive(Clone, Debug)]
pub enum ToolSelectionStrategy {
    /// Must use a different model family than the parent. Fails with reverse prompt if impossible.
    HeterogeneousStrict,
    /// Any available tool, no heterogeneity constraint.
    AnyAvailable,
    /// Explicitly specified tool.
    Explicit(ToolName),
}

/// Output format for CLI responses
#[derive(Clone, Debug, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

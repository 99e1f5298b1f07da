use thiserror::Error;

#[derive(Error, Debug)]
pub enum AcpError {
    #[error("ACP connection failed: {0}")]
    ConnectionFailed(String),
    #[error("ACP initialization failed: {0}")]
    InitializationFailed(String),
    #[error("ACP session creation failed: {0}")]
    SessionFailed(String),
    #[error("ACP prompt failed: {0}")]
    PromptFailed(String),
    #[error(
        "ACP process exited unexpectedly: code {code}{}",
        format_stderr(stderr)
    )]
    ProcessExited { code: i32, stderr: String },
    #[error("Session fork failed: {0}")]
    ForkFailed(String),
    #[error("ACP subprocess spawn failed: {0}")]
    SpawnFailed(#[from] std::io::Error),
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Format captured stderr for inclusion in `ProcessExited` error display.
///
/// Returns last 10 lines prefixed with `"; stderr:\n..."` or empty if no stderr.
fn format_stderr(stderr: &str) -> String {
    let trimmed = stderr.trim();
    if trimmed.is_empty() {
        String::new()
    } else {
        let last_lines: String = trimmed
            .lines()
            .rev()
            .take(10)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect::<Vec<_>>()
            .join("\n");
        format!("; stderr:\n{last_lines}")
    }
}

pub type AcpResult<T> = std::result::Result<T, AcpError>;

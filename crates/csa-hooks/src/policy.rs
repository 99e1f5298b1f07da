use serde::{Deserialize, Serialize};

/// Hook failure handling strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailPolicy {
    /// Warn and continue when a hook fails.
    #[default]
    Open,
    /// Treat hook failure as a hard error unless a valid waiver exists.
    Closed,
}

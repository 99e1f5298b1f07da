use sdd_core::DetailLevel;

/// Parameters shared by every read-heavy memory tool.
#[derive(Debug, Clone)]
pub struct ReadOpts {
    pub limit: usize,
    pub detail_level: DetailLevel,
    pub max_tokens: Option<usize>,
}

impl Default for ReadOpts {
    fn default() -> Self {
        ReadOpts {
            limit: 20,
            detail_level: DetailLevel::Standard,
            max_tokens: None,
        }
    }
}

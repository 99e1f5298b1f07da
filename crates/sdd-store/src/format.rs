use crate::observation::recent_observations;
use crate::types::ObservationFilter;
use rusqlite::Connection;
use sdd_core::{BudgetBuilder, CoreResult, DetailLevel};

pub struct FormatOpts {
    pub limit: usize,
    pub detail_level: DetailLevel,
    pub max_tokens: Option<usize>,
}

impl Default for FormatOpts {
    fn default() -> Self {
        Self {
            limit: 20,
            detail_level: DetailLevel::Standard,
            max_tokens: None,
        }
    }
}

/// Renders a human-readable block of recent observations, respecting the
/// same budget rules every other tool response uses.
pub fn format_context_detailed(
    conn: &Connection,
    filter: &ObservationFilter,
    opts: &FormatOpts,
) -> CoreResult<String> {
    let observations = recent_observations(conn, filter, opts.limit)?;
    let total = observations.len();
    let mut builder = BudgetBuilder::new(opts.max_tokens, total);

    for (i, obs) in observations.iter().enumerate() {
        let chunk = match opts.detail_level {
            DetailLevel::Summary => format!("- [{}] {}\n", obs.obs_type, obs.title),
            DetailLevel::Standard => format!(
                "## {}. {} ({})\n{}\n\n",
                i + 1,
                obs.title,
                obs.obs_type,
                obs.content.lines().take(3).collect::<Vec<_>>().join("\n")
            ),
            DetailLevel::Full => format!(
                "## {}. {} ({})\nproject={:?} scope={:?} updated_at={}\n{}\n\n",
                i + 1,
                obs.title,
                obs.obs_type,
                obs.project,
                obs.scope,
                obs.updated_at,
                obs.content
            ),
        };
        if !builder.push(&chunk) {
            break;
        }
    }

    Ok(builder.finish(opts.detail_level))
}

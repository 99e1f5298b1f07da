//! The observation store: a per-user SQLite database (schema + FTS5 index)
//! holding sessions, prompts, observations, and the relation graph between
//! them. Every mutating entry point keeps the FTS index in sync within the
//! same transaction or statement that touches `observation`.

mod compact;
mod db;
mod format;
mod observation;
mod prompt;
mod relation;
mod search;
mod session;
mod topic;
mod types;

pub use compact::{compact_observations, CompactResult};
pub use db::{default_db_path, open, open_in_memory};
pub use format::{format_context_detailed, FormatOpts};
pub use observation::{
    add_observation, count_observations, delete_observation, find_stale_observations,
    get_observation, recent_observations, update_observation,
};
pub use prompt::{recent_prompts, save_prompt};
pub use relation::{build_context, relate, unrelate};
pub use search::{count_search_results, search};
pub use session::{get_session, session_end, session_start, session_summary, Session};
pub use topic::suggest_topic_key;
pub use types::{
    AddObservationParams, Observation, ObservationFilter, Relation, RelationType, Scope, UserPrompt,
};

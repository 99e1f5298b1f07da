//! Stateless tool handlers over the observation store, pipeline state
//! machines, config stores, and renderer. Each function here corresponds to
//! one MCP tool; dispatch and JSON parameter decoding live in the `sdd-mcp`
//! binary.

mod change_pipeline;
mod context;
mod memory;
mod opts;
mod project_pipeline;

pub use change_pipeline::{sdd_adr, sdd_change, sdd_change_advance, sdd_change_status, sdd_context_check, sdd_explore};
pub use context::ToolContext;
pub use memory::{
    mem_build_context, mem_capture_passive, mem_compact, mem_context, mem_delete, mem_get_observation,
    mem_progress, mem_relate, mem_save, mem_save_prompt, mem_search, mem_session_end, mem_session_start,
    mem_session_summary, mem_stats, mem_suggest_topic_key, mem_timeline, mem_unrelate, mem_update, CompactOutcome,
};
pub use opts::ReadOpts;
pub use project_pipeline::{
    sdd_clarify, sdd_create_business_rules, sdd_create_design, sdd_create_proposal, sdd_create_tasks,
    sdd_generate_requirements, sdd_get_context, sdd_init_project, sdd_validate,
};

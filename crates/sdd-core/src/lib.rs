//! Shared primitives used across the workspace: the error taxonomy, the
//! response-shaping helpers every tool handler builds its output with, and
//! slug normalization for on-disk identifiers.

mod error;
mod response;
mod slug;

pub use error::{CoreError, CoreResult};
pub use response::{
    budget_footer, estimate_tokens, navigation_hint, summary_footer, token_footer, BudgetBuilder,
    DetailLevel,
};
pub use slug::{slugify, validate_slug};

/// RFC 3339 timestamp, matching the format the rest of the toolchain uses
/// for `created_at`/`updated_at` fields.
pub fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

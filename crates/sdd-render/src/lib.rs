//! Deterministic markdown rendering from typed stage data. Greenfield stages
//! interpolate named fields into a guided-or-expert template; change stages
//! pass AI-authored content through under a per-stage header. `sections`
//! provides the section parse/render pair `sdd_explore` builds its
//! merge-and-re-render behavior on.

mod change;
mod greenfield;
mod sections;

pub use change::render_change_stage;
pub use greenfield::render_greenfield;
pub use sections::{parse_sections, render_sections};

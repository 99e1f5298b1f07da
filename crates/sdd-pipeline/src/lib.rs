//! Stage and flow state machines shared by the greenfield project pipeline
//! and the change pipeline. Pure data: no filesystem or store access lives
//! here, only the sequencing rules and the clarity-gate scoring math.

mod clarity;
mod flow;
mod machine;
mod stage;

pub use clarity::{
    calculate_score, clarity_threshold, default_dimensions, uncovered_dimensions, Dimension, Mode,
};
pub use flow::{flow_for, ChangeSize, ChangeType, ALL_CHANGE_SIZES, ALL_CHANGE_TYPES};
pub use machine::{PipelineState, StageStatus};
pub use stage::{stage_index, Stage, StageStatusValue, STAGE_ORDER};

//! Generic stage-sequencing state machine shared by the greenfield pipeline
//! and every change flow. Modeled after the project's session-phase
//! transition pattern: an exhaustive match over `(current, next)` rather
//! than an open-ended mutation API, so an out-of-order advance is a
//! compile-time-checked impossibility, not a runtime guard someone can
//! forget to call.

use crate::stage::{Stage, StageStatusValue};
use sdd_core::{now_rfc3339, CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageStatus {
    pub status: StageStatusValue,
    pub iterations: u32,
    pub updated_at: String,
}

impl StageStatus {
    fn pending() -> Self {
        StageStatus {
            status: StageStatusValue::Pending,
            iterations: 0,
            updated_at: now_rfc3339(),
        }
    }
}

/// The ordered sequence of stages for one run of a pipeline (greenfield or
/// a single change), plus the per-stage status map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineState {
    pub order: Vec<Stage>,
    pub current_stage: Stage,
    pub stage_status: BTreeMap<Stage, StageStatus>,
}

impl PipelineState {
    /// Starts a fresh run: the first stage in `order` is marked
    /// `in_progress`, everything else `pending`.
    pub fn new(order: Vec<Stage>) -> Self {
        let first = order[0];
        let mut stage_status = BTreeMap::new();
        for s in &order {
            stage_status.insert(*s, StageStatus::pending());
        }
        stage_status.insert(
            first,
            StageStatus {
                status: StageStatusValue::InProgress,
                iterations: 0,
                updated_at: now_rfc3339(),
            },
        );
        PipelineState {
            order,
            current_stage: first,
            stage_status,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.order
            .last()
            .and_then(|last| self.stage_status.get(last))
            .map(|s| s.status == StageStatusValue::Complete)
            .unwrap_or(false)
    }

    fn index_of(&self, stage: Stage) -> Option<usize> {
        self.order.iter().position(|s| *s == stage)
    }

    /// Fails with `WrongStage` unless `self.current_stage == expected`.
    pub fn require_stage(&self, expected: Stage) -> CoreResult<()> {
        if self.current_stage != expected {
            return Err(CoreError::WrongStage {
                expected: expected.as_str().to_string(),
                actual: self.current_stage.as_str().to_string(),
            });
        }
        Ok(())
    }

    /// Marks the current stage `in_progress` again (idempotent — calling
    /// this on a stage already `in_progress` is a no-op besides the
    /// iteration bump).
    pub fn mark_in_progress(&mut self) {
        let stage = self.current_stage;
        let entry = self
            .stage_status
            .entry(stage)
            .or_insert_with(StageStatus::pending);
        entry.status = StageStatusValue::InProgress;
        entry.iterations += 1;
        entry.updated_at = now_rfc3339();
    }

    /// Marks the current stage complete and advances to the next one in
    /// `order`, marking it `in_progress`. At the terminal stage, marks it
    /// complete and leaves `current_stage` pointed at it (there is no stage
    /// past the last one to move to).
    pub fn advance(&mut self) -> CoreResult<()> {
        let idx = self.index_of(self.current_stage).ok_or_else(|| {
            CoreError::Fatal(format!(
                "current stage '{}' is not part of this pipeline's order",
                self.current_stage
            ))
        })?;

        if let Some(entry) = self.stage_status.get_mut(&self.current_stage) {
            entry.status = StageStatusValue::Complete;
            entry.updated_at = now_rfc3339();
        }

        if let Some(next) = self.order.get(idx + 1).copied() {
            self.current_stage = next;
            let entry = self
                .stage_status
                .entry(next)
                .or_insert_with(StageStatus::pending);
            entry.status = StageStatusValue::InProgress;
            entry.updated_at = now_rfc3339();
        }
        Ok(())
    }

    /// True iff every stage strictly before `current_stage` in `order` is
    /// complete.
    pub fn prefix_complete(&self) -> bool {
        let idx = match self.index_of(self.current_stage) {
            Some(i) => i,
            None => return false,
        };
        self.order[..idx].iter().all(|s| {
            self.stage_status
                .get(s)
                .map(|st| st.status == StageStatusValue::Complete)
                .unwrap_or(false)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::{flow_for, ChangeSize, ChangeType};
    use crate::stage::STAGE_ORDER;

    #[test]
    fn test_new_marks_first_stage_in_progress() {
        let p = PipelineState::new(STAGE_ORDER.to_vec());
        assert_eq!(p.current_stage, Stage::Init);
        assert_eq!(
            p.stage_status[&Stage::Init].status,
            StageStatusValue::InProgress
        );
        assert_eq!(
            p.stage_status[&Stage::Propose].status,
            StageStatusValue::Pending
        );
    }

    #[test]
    fn test_require_stage_rejects_mismatch() {
        let p = PipelineState::new(STAGE_ORDER.to_vec());
        assert!(p.require_stage(Stage::Init).is_ok());
        assert!(p.require_stage(Stage::Propose).is_err());
    }

    #[test]
    fn test_advance_walks_full_greenfield_pipeline() {
        let mut p = PipelineState::new(STAGE_ORDER.to_vec());
        for expected in STAGE_ORDER.iter().skip(1) {
            p.advance().unwrap();
            assert_eq!(p.current_stage, *expected);
            assert!(p.prefix_complete());
        }
        p.advance().unwrap();
        assert!(p.is_complete());
    }

    #[test]
    fn test_advance_marks_previous_stage_complete() {
        let mut p = PipelineState::new(STAGE_ORDER.to_vec());
        p.advance().unwrap();
        assert_eq!(
            p.stage_status[&Stage::Init].status,
            StageStatusValue::Complete
        );
    }

    #[test]
    fn test_mark_in_progress_is_idempotent_on_status() {
        let mut p = PipelineState::new(STAGE_ORDER.to_vec());
        p.mark_in_progress();
        p.mark_in_progress();
        assert_eq!(
            p.stage_status[&Stage::Init].status,
            StageStatusValue::InProgress
        );
        assert_eq!(p.stage_status[&Stage::Init].iterations, 2);
    }

    #[test]
    fn test_change_flow_advances_through_all_stages() {
        let flow = flow_for(ChangeType::Fix, ChangeSize::Small).to_vec();
        let mut p = PipelineState::new(flow.clone());
        for expected in flow.iter().skip(1) {
            p.advance().unwrap();
            assert_eq!(p.current_stage, *expected);
        }
        assert_eq!(p.current_stage, Stage::Verify);
        p.advance().unwrap();
        assert!(p.is_complete());
    }

    #[test]
    fn test_terminal_stage_advance_is_a_no_op_on_current() {
        let mut p = PipelineState::new(vec![Stage::ContextCheck]);
        p.advance().unwrap();
        assert_eq!(p.current_stage, Stage::ContextCheck);
        assert!(p.is_complete());
    }

    #[test]
    fn test_serde_roundtrip() {
        let p = PipelineState::new(STAGE_ORDER.to_vec());
        let json = serde_json::to_string(&p).unwrap();
        let back: PipelineState = serde_json::from_str(&json).unwrap();
        assert_eq!(p, back);
    }
}

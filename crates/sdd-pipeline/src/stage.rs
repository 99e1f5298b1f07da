use serde::{Deserialize, Serialize};
use std::fmt;

/// A single step in either the greenfield pipeline or a change flow. Every
/// stage that appears in any flow (greenfield or change) is a variant here;
/// `StageFilenames` below is the closed map from stage to artifact name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    Init,
    Propose,
    Specify,
    BusinessRules,
    Clarify,
    Design,
    Tasks,
    Validate,

    ContextCheck,
    Describe,
    Scope,
    Spec,
    Verify,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Init => "init",
            Stage::Propose => "propose",
            Stage::Specify => "specify",
            Stage::BusinessRules => "business-rules",
            Stage::Clarify => "clarify",
            Stage::Design => "design",
            Stage::Tasks => "tasks",
            Stage::Validate => "validate",
            Stage::ContextCheck => "context-check",
            Stage::Describe => "describe",
            Stage::Scope => "scope",
            Stage::Spec => "spec",
            Stage::Verify => "verify",
        }
    }

    /// The closed filename each stage writes its artifact to. Every stage
    /// that can appear in any flow has an entry here.
    pub fn filename(&self) -> &'static str {
        match self {
            Stage::Init => "sdd.json",
            Stage::Propose => "proposal.md",
            Stage::Specify => "requirements.md",
            Stage::BusinessRules => "business-rules.md",
            Stage::Clarify => "clarifications.md",
            Stage::Design => "design.md",
            Stage::Tasks => "tasks.md",
            Stage::Validate => "validation.md",
            Stage::ContextCheck => "context-check.md",
            Stage::Describe => "describe.md",
            Stage::Scope => "scope.md",
            Stage::Spec => "spec.md",
            Stage::Verify => "verify.md",
        }
    }
}

/// The fixed order of the greenfield project pipeline.
pub const STAGE_ORDER: [Stage; 8] = [
    Stage::Init,
    Stage::Propose,
    Stage::Specify,
    Stage::BusinessRules,
    Stage::Clarify,
    Stage::Design,
    Stage::Tasks,
    Stage::Validate,
];

pub fn stage_index(order: &[Stage], stage: Stage) -> Option<usize> {
    order.iter().position(|s| *s == stage)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatusValue {
    Pending,
    InProgress,
    Complete,
}

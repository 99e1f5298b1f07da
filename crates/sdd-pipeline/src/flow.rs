use crate::stage::Stage;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    Fix,
    Feature,
    Refactor,
    Enhancement,
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ChangeType::Fix => "fix",
            ChangeType::Feature => "feature",
            ChangeType::Refactor => "refactor",
            ChangeType::Enhancement => "enhancement",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeSize {
    Small,
    Medium,
    Large,
}

impl fmt::Display for ChangeSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ChangeSize::Small => "small",
            ChangeSize::Medium => "medium",
            ChangeSize::Large => "large",
        };
        write!(f, "{s}")
    }
}

use Stage::{ContextCheck, Describe, Design, Propose, Scope, Spec, Tasks, Verify};
use Stage::Clarify;

/// The 12-cell `type x size` matrix. Every row starts with `context-check`
/// and ends with `verify`; this is checked by `flow_invariants` below rather
/// than trusted by construction, since that's the property callers actually
/// depend on.
pub fn flow_for(change_type: ChangeType, size: ChangeSize) -> &'static [Stage] {
    use ChangeSize::*;
    use ChangeType::*;
    match (change_type, size) {
        (Fix, Small) => &[ContextCheck, Describe, Tasks, Verify],
        (Fix, Medium) => &[ContextCheck, Describe, Spec, Tasks, Verify],
        (Fix, Large) => &[ContextCheck, Describe, Spec, Design, Tasks, Verify],

        (Feature, Small) => &[ContextCheck, Describe, Tasks, Verify],
        (Feature, Medium) => &[ContextCheck, Propose, Spec, Tasks, Verify],
        (Feature, Large) => &[ContextCheck, Propose, Spec, Clarify, Design, Tasks, Verify],

        (Refactor, Small) => &[ContextCheck, Scope, Tasks, Verify],
        (Refactor, Medium) => &[ContextCheck, Scope, Design, Tasks, Verify],
        (Refactor, Large) => &[ContextCheck, Scope, Spec, Design, Tasks, Verify],

        (Enhancement, Small) => &[ContextCheck, Describe, Tasks, Verify],
        (Enhancement, Medium) => &[ContextCheck, Propose, Spec, Tasks, Verify],
        (Enhancement, Large) => {
            &[ContextCheck, Propose, Spec, Clarify, Design, Tasks, Verify]
        }
    }
}

pub const ALL_CHANGE_TYPES: [ChangeType; 4] = [
    ChangeType::Fix,
    ChangeType::Feature,
    ChangeType::Refactor,
    ChangeType::Enhancement,
];
pub const ALL_CHANGE_SIZES: [ChangeSize; 3] =
    [ChangeSize::Small, ChangeSize::Medium, ChangeSize::Large];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_flow_starts_context_check_ends_verify() {
        for t in ALL_CHANGE_TYPES {
            for s in ALL_CHANGE_SIZES {
                let flow = flow_for(t, s);
                assert_eq!(flow[0], Stage::ContextCheck, "{t}/{s}");
                assert_eq!(flow[flow.len() - 1], Stage::Verify, "{t}/{s}");
            }
        }
    }

    #[test]
    fn test_flow_has_no_duplicate_stages() {
        for t in ALL_CHANGE_TYPES {
            for s in ALL_CHANGE_SIZES {
                let flow = flow_for(t, s);
                let mut seen = flow.to_vec();
                seen.sort_by_key(|s| s.as_str());
                seen.dedup();
                assert_eq!(seen.len(), flow.len(), "{t}/{s}");
            }
        }
    }

    #[test]
    fn test_fix_small_matches_spec_table() {
        assert_eq!(
            flow_for(ChangeType::Fix, ChangeSize::Small),
            &[
                Stage::ContextCheck,
                Stage::Describe,
                Stage::Tasks,
                Stage::Verify
            ]
        );
    }

    #[test]
    fn test_feature_large_matches_spec_table() {
        assert_eq!(
            flow_for(ChangeType::Feature, ChangeSize::Large),
            &[
                Stage::ContextCheck,
                Stage::Propose,
                Stage::Spec,
                Stage::Clarify,
                Stage::Design,
                Stage::Tasks,
                Stage::Verify,
            ]
        );
    }

    #[test]
    fn test_refactor_medium_matches_spec_table() {
        assert_eq!(
            flow_for(ChangeType::Refactor, ChangeSize::Medium),
            &[
                Stage::ContextCheck,
                Stage::Scope,
                Stage::Design,
                Stage::Tasks,
                Stage::Verify
            ]
        );
    }

    #[test]
    fn test_enhancement_mirrors_feature() {
        for size in ALL_CHANGE_SIZES {
            assert_eq!(
                flow_for(ChangeType::Enhancement, size),
                flow_for(ChangeType::Feature, size)
            );
        }
    }

    #[test]
    fn test_display() {
        assert_eq!(ChangeType::Fix.to_string(), "fix");
        assert_eq!(ChangeSize::Large.to_string(), "large");
    }

    #[test]
    fn test_serde_roundtrip() {
        for t in ALL_CHANGE_TYPES {
            let json = serde_json::to_string(&t).unwrap();
            let back: ChangeType = serde_json::from_str(&json).unwrap();
            assert_eq!(t, back);
        }
    }
}

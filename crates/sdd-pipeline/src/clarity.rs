use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Guided,
    Expert,
}

/// Minimum weighted clarity score required before `clarify` can advance.
pub fn clarity_threshold(mode: Mode) -> u32 {
    match mode {
        Mode::Guided => 70,
        Mode::Expert => 50,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimension {
    pub name: &'static str,
    pub weight: u32,
}

/// The eight weighted clarity dimensions. Weights sum to 100 so
/// `calculate_score` is a direct weighted average without normalization.
pub const DIMENSIONS: [Dimension; 8] = [
    Dimension { name: "target_users", weight: 15 },
    Dimension { name: "core_functionality", weight: 20 },
    Dimension { name: "data_model", weight: 15 },
    Dimension { name: "integrations", weight: 10 },
    Dimension { name: "edge_cases", weight: 10 },
    Dimension { name: "security", weight: 10 },
    Dimension { name: "scale", weight: 10 },
    Dimension { name: "scope_boundaries", weight: 10 },
];

pub fn default_dimensions() -> &'static [Dimension] {
    &DIMENSIONS
}

/// `scores` maps dimension name -> score in `[0, 100]`; dimensions absent
/// from the map are treated as score 0. Returns the weighted average,
/// rounded to the nearest integer, clamped to `[0, 100]`.
pub fn calculate_score(scores: &std::collections::HashMap<String, u32>) -> u32 {
    let mut total_weight = 0u32;
    let mut weighted_sum = 0u32;
    for dim in DIMENSIONS {
        let score = scores.get(dim.name).copied().unwrap_or(0).min(100);
        weighted_sum += score * dim.weight;
        total_weight += dim.weight;
    }
    if total_weight == 0 {
        return 0;
    }
    ((weighted_sum as f64 / total_weight as f64).round() as u32).min(100)
}

/// Dimensions whose score is `<= 30` — the "still needs clarification"
/// threshold, independent of the overall pass/fail threshold.
pub fn uncovered_dimensions(scores: &std::collections::HashMap<String, u32>) -> Vec<&'static str> {
    DIMENSIONS
        .iter()
        .filter(|dim| scores.get(dim.name).copied().unwrap_or(0) <= 30)
        .map(|dim| dim.name)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_threshold_by_mode() {
        assert_eq!(clarity_threshold(Mode::Guided), 70);
        assert_eq!(clarity_threshold(Mode::Expert), 50);
    }

    #[test]
    fn test_weights_sum_to_100() {
        let sum: u32 = DIMENSIONS.iter().map(|d| d.weight).sum();
        assert_eq!(sum, 100);
    }

    #[test]
    fn test_calculate_score_all_same() {
        let mut scores = HashMap::new();
        for dim in DIMENSIONS {
            scores.insert(dim.name.to_string(), 60);
        }
        assert_eq!(calculate_score(&scores), 60);
    }

    #[test]
    fn test_calculate_score_missing_dimensions_count_as_zero() {
        let scores = HashMap::new();
        assert_eq!(calculate_score(&scores), 0);
    }

    #[test]
    fn test_calculate_score_clamped_to_100() {
        let mut scores = HashMap::new();
        for dim in DIMENSIONS {
            scores.insert(dim.name.to_string(), 500);
        }
        assert_eq!(calculate_score(&scores), 100);
    }

    #[test]
    fn test_uncovered_dimensions_boundary() {
        let mut scores = HashMap::new();
        scores.insert("target_users".to_string(), 30);
        scores.insert("core_functionality".to_string(), 31);
        let uncovered = uncovered_dimensions(&scores);
        assert!(uncovered.contains(&"target_users"));
        assert!(!uncovered.contains(&"core_functionality"));
        // everything else is missing => defaults to 0 => uncovered
        assert!(uncovered.contains(&"data_model"));
    }

    #[test]
    fn test_default_dimensions_has_eight_entries() {
        assert_eq!(default_dimensions().len(), 8);
    }
}

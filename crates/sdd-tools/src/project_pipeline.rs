use sdd_config::ProjectConfig;
use sdd_core::{CoreError, CoreResult};
use sdd_pipeline::{calculate_score, clarity_threshold, default_dimensions, uncovered_dimensions, Mode, Stage};
use sdd_render::render_greenfield;
use std::collections::HashMap;
use std::path::Path;

fn load_cfg(project_root: &Path) -> CoreResult<ProjectConfig> {
    sdd_config::load(project_root)?.ok_or(CoreError::ProjectRootNotFound)
}

/// Renders `fields` through (E), writes the current stage's artifact, and
/// advances — the same three steps every greenfield writer tool performs.
fn write_and_advance(project_root: &Path, stage: Stage, fields: &[(&str, &str)]) -> CoreResult<ProjectConfig> {
    let mut cfg = load_cfg(project_root)?;
    cfg.pipeline.require_stage(stage)?;
    let rendered = render_greenfield(stage, cfg.mode, fields);
    sdd_config::atomic_write(&sdd_config::sdd_dir(project_root).join(stage.filename()), rendered.as_bytes())?;
    cfg.pipeline.advance()?;
    sdd_config::save(project_root, &mut cfg)?;
    Ok(cfg)
}

pub fn sdd_init_project(project_root: &Path, name: &str, description: &str, mode: Mode) -> CoreResult<String> {
    if sdd_config::load(project_root)?.is_some() {
        return Err(CoreError::InvalidInput("a project already exists at this root".into()));
    }
    let mut cfg = ProjectConfig::new(name, description, mode);
    sdd_config::save(project_root, &mut cfg)?;
    Ok(format!("Initialized project \"{name}\" in {mode:?} mode. Next stage: {}.", cfg.current_stage()))
}

pub fn sdd_create_proposal(project_root: &Path, goal: &str, approach: &str) -> CoreResult<String> {
    write_and_advance(project_root, Stage::Propose, &[("Goal", goal), ("Approach", approach)])?;
    Ok("Proposal recorded.".to_string())
}

pub fn sdd_generate_requirements(project_root: &Path, requirements: &str) -> CoreResult<String> {
    write_and_advance(project_root, Stage::Specify, &[("Requirements", requirements)])?;
    Ok("Requirements recorded.".to_string())
}

pub fn sdd_create_business_rules(project_root: &Path, rules: &str) -> CoreResult<String> {
    write_and_advance(project_root, Stage::BusinessRules, &[("Rules", rules)])?;
    Ok("Business rules recorded.".to_string())
}

/// Parses `name:score` pairs (comma-separated), clamping each score to
/// `[0,100]` and ignoring malformed pairs.
fn parse_dimension_scores(raw: &str) -> HashMap<String, u32> {
    raw.split(',')
        .filter_map(|pair| {
            let (name, score) = pair.split_once(':')?;
            let score: i64 = score.trim().parse().ok()?;
            Some((name.trim().to_string(), score.clamp(0, 100) as u32))
        })
        .collect()
}

/// Without `answers`: returns the clarity questionnaire for the dimensions
/// not yet covered. With `answers`: appends a round to `clarifications.md`,
/// updates `clarity_score`, and advances only if the score clears the
/// mode's threshold.
pub fn sdd_clarify(project_root: &Path, answers: Option<&str>, dimension_scores: Option<&str>) -> CoreResult<String> {
    let mut cfg = load_cfg(project_root)?;
    cfg.pipeline.require_stage(Stage::Clarify)?;

    let Some(answers) = answers else {
        let dims = default_dimensions();
        let mut out = String::from("## Clarity Questionnaire\n");
        for d in dims {
            out.push_str(&format!("- {} (weight {})\n", d.name, d.weight));
        }
        return Ok(out);
    };

    let scores = dimension_scores.map(parse_dimension_scores).unwrap_or_default();
    let score = calculate_score(&scores);
    cfg.clarity_score = score;

    let rendered = render_greenfield(Stage::Clarify, cfg.mode, &[("Round", answers)]);
    let path = sdd_config::sdd_dir(project_root).join(Stage::Clarify.filename());
    let mut existing = std::fs::read_to_string(&path).unwrap_or_default();
    existing.push_str(&rendered);
    sdd_config::atomic_write(&path, existing.as_bytes())?;

    let threshold = clarity_threshold(cfg.mode);
    if score >= threshold {
        cfg.pipeline.advance()?;
        sdd_config::save(project_root, &mut cfg)?;
        Ok(format!("Clarity score {score} meets threshold {threshold}; advanced to {}.", cfg.current_stage()))
    } else {
        sdd_config::save(project_root, &mut cfg)?;
        let uncovered = uncovered_dimensions(&scores);
        Ok(format!(
            "Clarity score {score} below threshold {threshold}. Still uncovered: {}.",
            uncovered.join(", ")
        ))
    }
}

pub fn sdd_create_design(project_root: &Path, design: &str) -> CoreResult<String> {
    write_and_advance(project_root, Stage::Design, &[("Design", design)])?;
    Ok("Design recorded.".to_string())
}

pub fn sdd_create_tasks(project_root: &Path, tasks: &str) -> CoreResult<String> {
    write_and_advance(project_root, Stage::Tasks, &[("Tasks", tasks)])?;
    Ok("Tasks recorded.".to_string())
}

pub fn sdd_validate(project_root: &Path, validation: &str) -> CoreResult<String> {
    let cfg = write_and_advance(project_root, Stage::Validate, &[("Validation", validation)])?;
    if cfg.pipeline.is_complete() {
        Ok("Validation recorded. Greenfield pipeline complete.".to_string())
    } else {
        Ok("Validation recorded.".to_string())
    }
}

/// Read-only introspection report. Unlike every other tool here,
/// `detail_level` defaults to `summary` rather than `standard` for this
/// one — it's meant as a quick orientation check, not a full read.
pub fn sdd_get_context(project_root: &Path) -> CoreResult<String> {
    let cfg = load_cfg(project_root)?;
    Ok(format!(
        "# {}\n{}\n\nMode: {:?}\nCurrent stage: {}\nClarity score: {}\nLast updated: {}\n",
        cfg.name, cfg.description, cfg.mode, cfg.current_stage(), cfg.clarity_score, cfg.updated_at,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn init(dir: &Path) {
        sdd_init_project(dir, "demo", "a demo project", Mode::Expert).unwrap();
    }

    #[test]
    fn test_init_project_rejects_second_init() {
        let dir = TempDir::new().unwrap();
        init(dir.path());
        let result = sdd_init_project(dir.path(), "again", "x", Mode::Expert);
        assert!(matches!(result, Err(CoreError::InvalidInput(_))));
    }

    #[test]
    fn test_create_proposal_advances_stage() {
        let dir = TempDir::new().unwrap();
        init(dir.path());
        sdd_create_proposal(dir.path(), "ship it", "incrementally").unwrap();
        let cfg = load_cfg(dir.path()).unwrap();
        assert_eq!(cfg.current_stage(), Stage::Specify);
    }

    #[test]
    fn test_wrong_stage_rejected() {
        let dir = TempDir::new().unwrap();
        init(dir.path());
        let result = sdd_generate_requirements(dir.path(), "reqs");
        assert!(matches!(result, Err(CoreError::WrongStage { .. })));
    }

    #[test]
    fn test_clarify_without_answers_returns_questionnaire() {
        let dir = TempDir::new().unwrap();
        init(dir.path());
        sdd_create_proposal(dir.path(), "g", "a").unwrap();
        sdd_generate_requirements(dir.path(), "r").unwrap();
        sdd_create_business_rules(dir.path(), "b").unwrap();
        let questionnaire = sdd_clarify(dir.path(), None, None).unwrap();
        assert!(questionnaire.contains("Clarity Questionnaire"));
    }

    #[test]
    fn test_clarify_advances_when_score_clears_threshold() {
        let dir = TempDir::new().unwrap();
        init(dir.path());
        sdd_create_proposal(dir.path(), "g", "a").unwrap();
        sdd_generate_requirements(dir.path(), "r").unwrap();
        sdd_create_business_rules(dir.path(), "b").unwrap();
        let scores = "target_users:90,core_functionality:90,data_model:90,integrations:90,edge_cases:90,security:90,scale:90,scope_boundaries:90";
        let result = sdd_clarify(dir.path(), Some("round 1"), Some(scores)).unwrap();
        assert!(result.contains("advanced"));
        let cfg = load_cfg(dir.path()).unwrap();
        assert_eq!(cfg.current_stage(), Stage::Design);
    }

    #[test]
    fn test_clarify_blocks_when_score_below_threshold() {
        let dir = TempDir::new().unwrap();
        init(dir.path());
        sdd_create_proposal(dir.path(), "g", "a").unwrap();
        sdd_generate_requirements(dir.path(), "r").unwrap();
        sdd_create_business_rules(dir.path(), "b").unwrap();
        let result = sdd_clarify(dir.path(), Some("round 1"), Some("target_users:10")).unwrap();
        assert!(result.contains("below threshold"));
        let cfg = load_cfg(dir.path()).unwrap();
        assert_eq!(cfg.current_stage(), Stage::Clarify);
    }

    #[test]
    fn test_get_context_reports_current_stage() {
        let dir = TempDir::new().unwrap();
        init(dir.path());
        let report = sdd_get_context(dir.path()).unwrap();
        assert!(report.contains("propose"));
    }
}

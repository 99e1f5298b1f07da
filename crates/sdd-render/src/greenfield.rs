use sdd_pipeline::{Mode, Stage};

/// The research citation shown in the `guided` variant's blockquote for each
/// greenfield stage. Expert mode renders the same fields without it.
fn citation_for(stage: Stage) -> &'static str {
    match stage {
        Stage::Propose => "Business Requirements Gathering (BRG) practice",
        Stage::Specify => "IEEE 29148 and EARS (Easy Approach to Requirements Syntax)",
        Stage::BusinessRules => "Domain-Driven Design (DDD) ubiquitous language",
        Stage::Clarify => "IEEE 29148 ambiguity-resolution guidance",
        Stage::Design => "Domain-Driven Design (DDD) bounded-context modeling",
        Stage::Tasks => "BRG task-breakdown practice",
        Stage::Validate => "IEEE 29148 verification criteria",
        _ => "",
    }
}

/// Heading shown atop the rendered artifact for each greenfield stage.
fn heading_for(stage: Stage) -> &'static str {
    match stage {
        Stage::Propose => "Proposal",
        Stage::Specify => "Requirements",
        Stage::BusinessRules => "Business Rules",
        Stage::Clarify => "Clarifications",
        Stage::Design => "Design",
        Stage::Tasks => "Tasks",
        Stage::Validate => "Validation",
        _ => "Untitled",
    }
}

/// Renders a greenfield-stage artifact by interpolating `fields` (name/value
/// pairs, in order) into named `## <Name>` sections under the stage's
/// heading. In `guided` mode a blockquote citing the stage's research source
/// is inserted under the top-level heading; `expert` mode omits it.
pub fn render_greenfield(stage: Stage, mode: Mode, fields: &[(&str, &str)]) -> String {
    let mut out = format!("# {}\n\n", heading_for(stage));
    if mode == Mode::Guided {
        let citation = citation_for(stage);
        if !citation.is_empty() {
            out.push_str(&format!("> Grounded in {citation}.\n\n"));
        }
    }
    for (name, value) in fields {
        out.push_str(&format!("## {name}\n{}\n\n", value.trim_end()));
    }
    out
}

use sdd_pipeline::Stage;

fn title_for(stage: Stage) -> &'static str {
    match stage {
        Stage::ContextCheck => "Context Check",
        Stage::Describe => "Description",
        Stage::Scope => "Scope",
        Stage::Spec => "Spec",
        Stage::Propose => "Proposal",
        Stage::Specify => "Requirements",
        Stage::Clarify => "Clarifications",
        Stage::Design => "Design",
        Stage::Tasks => "Tasks",
        Stage::Verify => "Verification",
        other => other.as_str(),
    }
}

/// Change-pipeline stages carry AI-authored markdown straight through;
/// the renderer's only job is a per-stage header wrapper.
pub fn render_change_stage(stage: Stage, body: &str) -> String {
    format!("# {}\n\n{}\n", title_for(stage), body.trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wraps_body_with_stage_header() {
        let rendered = render_change_stage(Stage::ContextCheck, "found two prior explorations");
        assert!(rendered.starts_with("# Context Check"));
        assert!(rendered.contains("found two prior explorations"));
    }

    #[test]
    fn test_body_saved_verbatim() {
        let body = "## Sub heading\n- item one\n- item two";
        let rendered = render_change_stage(Stage::Verify, body);
        assert!(rendered.contains(body));
    }
}

/// Renders an ordered list of named sections as `## <Name>` markdown blocks.
/// `parse_sections` is the exact inverse: feeding `render_sections`'s output
/// back through it reproduces the same list, which is what lets `sdd_explore`
/// merge new fields into a document it wrote earlier.
pub fn render_sections(sections: &[(String, String)]) -> String {
    let mut out = String::new();
    for (name, body) in sections {
        out.push_str("## ");
        out.push_str(name);
        out.push('\n');
        out.push_str(body.trim_end());
        out.push_str("\n\n");
    }
    out
}

/// Splits markdown on `## <Name>` headers, returning `(name, body)` pairs in
/// document order. Text before the first header is discarded.
pub fn parse_sections(markdown: &str) -> Vec<(String, String)> {
    let mut sections = Vec::new();
    let mut current_name: Option<String> = None;
    let mut current_body = String::new();

    for line in markdown.lines() {
        if let Some(name) = line.strip_prefix("## ") {
            if let Some(prev_name) = current_name.take() {
                sections.push((prev_name, current_body.trim().to_string()));
                current_body.clear();
            }
            current_name = Some(name.trim().to_string());
        } else if current_name.is_some() {
            current_body.push_str(line);
            current_body.push('\n');
        }
    }
    if let Some(name) = current_name {
        sections.push((name, current_body.trim().to_string()));
    }
    sections
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_then_parse_round_trips() {
        let sections = vec![
            ("Goals".to_string(), "Ship the thing".to_string()),
            ("Constraints".to_string(), "No new dependencies".to_string()),
        ];
        let rendered = render_sections(&sections);
        let parsed = parse_sections(&rendered);
        assert_eq!(parsed, sections);
    }

    #[test]
    fn test_parse_ignores_preamble_text() {
        let markdown = "Some intro text\n\n## Goals\nShip it\n";
        let parsed = parse_sections(markdown);
        assert_eq!(parsed, vec![("Goals".to_string(), "Ship it".to_string())]);
    }

    #[test]
    fn test_parse_empty_section_body() {
        let markdown = "## Unknowns\n\n## Decisions\nPicked Postgres\n";
        let parsed = parse_sections(markdown);
        assert_eq!(parsed[0], ("Unknowns".to_string(), String::new()));
        assert_eq!(parsed[1], ("Decisions".to_string(), "Picked Postgres".to_string()));
    }

    #[test]
    fn test_parse_no_headers_returns_empty() {
        assert!(parse_sections("just plain text").is_empty());
    }
}

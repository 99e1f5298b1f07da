use sdd_core::slugify;

/// Maps an observation `type` to its topic family via a closed switch,
/// falling back to `"notes"` for anything unrecognized.
fn family_for(obs_type: &str) -> &'static str {
    match obs_type.to_lowercase().as_str() {
        "explore" | "exploration" | "discuss" | "discussion" => "explore",
        "architecture" | "decision" | "adr" => "architecture",
        "progress" | "status" => "progress",
        "bug" | "issue" | "incident" => "incident",
        "preference" | "convention" => "preference",
        _ => "notes",
    }
}

/// Deterministic `<family>/<slug>` suggestion for a new observation's topic key.
pub fn suggest_topic_key(obs_type: &str, title: &str, _content: &str) -> String {
    format!("{}/{}", family_for(obs_type), slugify(title))
}

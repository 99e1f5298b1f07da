//! The tool catalog: name, description, and JSON Schema for every tool this
//! server exposes, grouped the way the tools themselves are grouped (memory,
//! greenfield pipeline, change pipeline).

use serde::Serialize;
use serde_json::{json, Value};

#[derive(Debug, Clone, Serialize)]
pub struct McpToolDef {
    pub name: &'static str,
    pub description: &'static str,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

fn schema(required: &[&str], properties: Value) -> Value {
    json!({
        "type": "object",
        "properties": properties,
        "required": required,
    })
}

fn string() -> Value {
    json!({ "type": "string" })
}

fn integer() -> Value {
    json!({ "type": "integer" })
}

fn boolean() -> Value {
    json!({ "type": "boolean" })
}

fn enum_str(variants: &[&str]) -> Value {
    json!({ "type": "string", "enum": variants })
}

const SCOPE_VARIANTS: &[&str] = &["project", "personal"];
const RELATION_VARIANTS: &[&str] = &["relates_to", "depends_on", "caused_by", "implements", "supersedes", "part_of"];
const DETAIL_VARIANTS: &[&str] = &["summary", "standard", "full"];
const CHANGE_TYPE_VARIANTS: &[&str] = &["fix", "feature", "refactor", "enhancement"];
const CHANGE_SIZE_VARIANTS: &[&str] = &["small", "medium", "large"];
const MODE_VARIANTS: &[&str] = &["guided", "expert"];

pub fn get_tools() -> Vec<McpToolDef> {
    vec![
        // --- memory tools ---
        McpToolDef {
            name: "mem_save",
            description: "Save a durable observation. Give `topic_key` for a recurring subject to upsert instead of append.",
            input_schema: schema(
                &["obs_type", "title", "content"],
                json!({
                    "obs_type": string(), "title": string(), "content": string(),
                    "project": string(), "scope": enum_str(SCOPE_VARIANTS),
                    "topic_key": string(), "namespace": string(), "session_id": integer(),
                }),
            ),
        },
        McpToolDef {
            name: "mem_save_prompt",
            description: "Save a raw prompt/instruction observation for later recall.",
            input_schema: schema(
                &["content"],
                json!({ "content": string(), "project": string(), "namespace": string(), "session_id": integer() }),
            ),
        },
        McpToolDef {
            name: "mem_search",
            description: "Full-text search over saved observations.",
            input_schema: schema(
                &["query"],
                json!({
                    "query": string(), "project": string(), "scope": enum_str(SCOPE_VARIANTS),
                    "namespace": string(), "limit": integer(), "detail_level": enum_str(DETAIL_VARIANTS),
                    "max_tokens": integer(),
                }),
            ),
        },
        McpToolDef {
            name: "mem_context",
            description: "Render the most relevant recent observations as a context block.",
            input_schema: schema(
                &[],
                json!({
                    "project": string(), "scope": enum_str(SCOPE_VARIANTS), "namespace": string(),
                    "limit": integer(), "detail_level": enum_str(DETAIL_VARIANTS), "max_tokens": integer(),
                }),
            ),
        },
        McpToolDef {
            name: "mem_timeline",
            description: "Show the observations immediately before and after one focus observation within its session.",
            input_schema: schema(
                &["observation_id"],
                json!({
                    "observation_id": integer(), "before": integer(), "after": integer(),
                    "detail_level": enum_str(DETAIL_VARIANTS),
                }),
            ),
        },
        McpToolDef {
            name: "mem_get_observation",
            description: "Fetch one observation by id along with its relation graph edges.",
            input_schema: schema(&["id"], json!({ "id": integer() })),
        },
        McpToolDef {
            name: "mem_relate",
            description: "Create a typed relation edge between two observations.",
            input_schema: schema(
                &["from_id", "to_id", "relation_type"],
                json!({ "from_id": integer(), "to_id": integer(), "relation_type": enum_str(RELATION_VARIANTS) }),
            ),
        },
        McpToolDef {
            name: "mem_unrelate",
            description: "Remove a typed relation edge between two observations.",
            input_schema: schema(
                &["from_id", "to_id", "relation_type"],
                json!({ "from_id": integer(), "to_id": integer(), "relation_type": enum_str(RELATION_VARIANTS) }),
            ),
        },
        McpToolDef {
            name: "mem_build_context",
            description: "Walk the relation graph outward from one observation up to a given depth.",
            input_schema: schema(&["id"], json!({ "id": integer(), "max_depth": integer() })),
        },
        McpToolDef {
            name: "mem_session_start",
            description: "Start a memory session to group subsequent observations.",
            input_schema: schema(&[], json!({ "project": string() })),
        },
        McpToolDef {
            name: "mem_session_end",
            description: "End a memory session, optionally recording a closing summary.",
            input_schema: schema(&["id"], json!({ "id": integer(), "summary": string() })),
        },
        McpToolDef {
            name: "mem_session_summary",
            description: "Update the running summary for an open session.",
            input_schema: schema(&["id", "summary"], json!({ "id": integer(), "summary": string() })),
        },
        McpToolDef {
            name: "mem_stats",
            description: "Count active observations matching a filter.",
            input_schema: schema(
                &[],
                json!({ "project": string(), "scope": enum_str(SCOPE_VARIANTS), "namespace": string() }),
            ),
        },
        McpToolDef {
            name: "mem_capture_passive",
            description: "Low-friction capture of ambient context not yet worth structuring.",
            input_schema: schema(
                &["content"],
                json!({ "content": string(), "project": string(), "namespace": string(), "session_id": integer() }),
            ),
        },
        McpToolDef {
            name: "mem_delete",
            description: "Delete an observation (soft by default, hard when `hard` is true).",
            input_schema: schema(&["id"], json!({ "id": integer(), "hard": boolean() })),
        },
        McpToolDef {
            name: "mem_update",
            description: "Update an observation's title and/or content in place.",
            input_schema: schema(&["id"], json!({ "id": integer(), "title": string(), "content": string() })),
        },
        McpToolDef {
            name: "mem_suggest_topic_key",
            description: "Suggest a topic_key for a new observation from its type, title, and content.",
            input_schema: schema(
                &["obs_type", "title", "content"],
                json!({ "obs_type": string(), "title": string(), "content": string() }),
            ),
        },
        McpToolDef {
            name: "mem_compact",
            description: "Identify stale observations (omit `compact_ids`), or execute a compaction (provide `compact_ids`).",
            input_schema: schema(
                &["older_than_days"],
                json!({
                    "project": string(), "scope": enum_str(SCOPE_VARIANTS), "namespace": string(),
                    "older_than_days": integer(), "compact_ids": { "type": "array", "items": integer() },
                    "summary_title": string(), "summary_content": string(),
                }),
            ),
        },
        McpToolDef {
            name: "mem_progress",
            description: "Read (omit `content`) or write (provide `content`, a JSON string) the progress blob for a project.",
            input_schema: schema(
                &["project"],
                json!({ "project": string(), "content": string(), "session_id": integer(), "namespace": string() }),
            ),
        },
        // --- greenfield pipeline tools ---
        McpToolDef {
            name: "sdd_init_project",
            description: "Initialize a new greenfield project (fails if one already exists at this root).",
            input_schema: schema(
                &["name", "description"],
                json!({ "name": string(), "description": string(), "mode": enum_str(MODE_VARIANTS) }),
            ),
        },
        McpToolDef {
            name: "sdd_create_proposal",
            description: "Record the proposal stage (goal and approach) and advance to requirements.",
            input_schema: schema(&["goal", "approach"], json!({ "goal": string(), "approach": string() })),
        },
        McpToolDef {
            name: "sdd_generate_requirements",
            description: "Record the requirements stage and advance to business rules.",
            input_schema: schema(&["requirements"], json!({ "requirements": string() })),
        },
        McpToolDef {
            name: "sdd_create_business_rules",
            description: "Record the business-rules stage and advance to clarify.",
            input_schema: schema(&["rules"], json!({ "rules": string() })),
        },
        McpToolDef {
            name: "sdd_clarify",
            description: "Without `answers`, returns the clarity questionnaire. With `answers` and `dimension_scores` (\"name:score,...\"), records a round and advances only once the score clears the mode threshold.",
            input_schema: schema(&[], json!({ "answers": string(), "dimension_scores": string() })),
        },
        McpToolDef {
            name: "sdd_create_design",
            description: "Record the design stage and advance to tasks.",
            input_schema: schema(&["design"], json!({ "design": string() })),
        },
        McpToolDef {
            name: "sdd_create_tasks",
            description: "Record the tasks stage and advance to validate.",
            input_schema: schema(&["tasks"], json!({ "tasks": string() })),
        },
        McpToolDef {
            name: "sdd_validate",
            description: "Record the validate stage, completing the greenfield pipeline.",
            input_schema: schema(&["validation"], json!({ "validation": string() })),
        },
        McpToolDef {
            name: "sdd_get_context",
            description: "Read-only: report the greenfield pipeline's current position.",
            input_schema: schema(&[], json!({})),
        },
        // --- change pipeline tools ---
        McpToolDef {
            name: "sdd_change",
            description: "Start a change (fails if one is already active for this project).",
            input_schema: schema(
                &["change_type", "size", "description"],
                json!({
                    "change_type": enum_str(CHANGE_TYPE_VARIANTS), "size": enum_str(CHANGE_SIZE_VARIANTS),
                    "description": string(),
                }),
            ),
        },
        McpToolDef {
            name: "sdd_change_advance",
            description: "Record the active change's current stage and advance to the next one in its flow.",
            input_schema: schema(&["content"], json!({ "content": string() })),
        },
        McpToolDef {
            name: "sdd_change_status",
            description: "Read-only: report the active change's position in its flow.",
            input_schema: schema(&[], json!({})),
        },
        McpToolDef {
            name: "sdd_context_check",
            description: "Scan existing SDD artifacts, keyword-matched completed changes, related explorations, and (if no artifacts exist) project convention files.",
            input_schema: schema(
                &["change_description"],
                json!({ "change_description": string(), "project_name": string() }),
            ),
        },
        McpToolDef {
            name: "sdd_adr",
            description: "Record an architecture decision as both a memory observation and a numbered ledger file.",
            input_schema: schema(
                &["title", "context", "decision", "consequences"],
                json!({
                    "title": string(), "status": enum_str(&["proposed", "accepted", "superseded", "deprecated"]),
                    "context": string(), "decision": string(), "consequences": string(),
                    "alternatives": string(), "project": string(),
                }),
            ),
        },
        McpToolDef {
            name: "sdd_explore",
            description: "Record or merge an open-ended exploration; repeated calls with the same title accumulate into one document and suggest a change shape.",
            input_schema: schema(
                &["title"],
                json!({
                    "title": string(), "goals": string(), "constraints": string(), "preferences": string(),
                    "unknowns": string(), "decisions": string(), "context": string(), "project": string(),
                    "scope": enum_str(SCOPE_VARIANTS), "session_id": integer(), "namespace": string(),
                }),
            ),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_has_expected_tool_count() {
        assert_eq!(get_tools().len(), 34);
    }

    #[test]
    fn test_catalog_names_are_unique() {
        let tools = get_tools();
        let mut names: Vec<&str> = tools.iter().map(|t| t.name).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), tools.len());
    }

    #[test]
    fn test_every_tool_has_object_schema() {
        for tool in get_tools() {
            assert_eq!(tool.input_schema["type"], "object");
        }
    }
}

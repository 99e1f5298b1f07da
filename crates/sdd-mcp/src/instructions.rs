//! The server-instruction document returned on `initialize`, and the two
//! static prompts. Kept well under the ~460-line budget so it is cheap to
//! include with every session.

pub const INSTRUCTIONS: &str = r#"# Spec-Driven Development Assistant

This server gives you a persistent memory store, a greenfield project
pipeline, and a change pipeline for existing projects. Use the tools below
instead of tracking this state in your own context.

## When to activate

- A new, empty project with no `sdd/sdd.json`: start the greenfield
  pipeline with `sdd_init_project`.
- An existing project with `sdd/sdd.json` but no active change: start a
  change with `sdd_change`.
- Mid-pipeline (greenfield or change): call `sdd_get_context` or
  `sdd_change_status` first to see where you left off, then call the next
  stage's tool.
- Anything worth remembering across turns (decisions, open questions,
  progress, exploration notes) goes through the memory tools (`mem_*`),
  not your own scratch notes.

## Greenfield pipeline order

`init -> propose -> specify -> business-rules -> clarify -> design ->
tasks -> validate`. Each stage after `init` is a tool call:
`sdd_create_proposal`, `sdd_generate_requirements`,
`sdd_create_business_rules`, `sdd_clarify`, `sdd_create_design`,
`sdd_create_tasks`, `sdd_validate`. Stages are grounded in:
- Proposal: Business Requirements Gathering (BRG) practice.
- Requirements: IEEE 29148 and EARS (Easy Approach to Requirements Syntax).
- Business Rules / Design: Domain-Driven Design (DDD).
- Clarify: IEEE 29148 ambiguity-resolution guidance.
- Tasks: BRG task-breakdown practice.
- Validate: IEEE 29148 verification criteria.

`sdd_clarify` called without `answers` returns the outstanding clarity
questionnaire. Called with `answers` and `dimension_scores`
(`name:score` pairs, e.g. `"target_users:60,core_functionality:55"`), it
records the round and only advances past `clarify` once the weighted
score clears the project's mode threshold (50 in expert mode, 70 in
guided mode). A response below threshold is not an error — it lists the
still-uncovered dimensions; ask about those and call `sdd_clarify` again.

## Change pipeline

Every change flow starts with `context-check` and ends with `verify`; the
stages in between depend on `type` (`fix` | `feature` | `refactor` |
`enhancement`) and `size` (`small` | `medium` | `large`):

| type \ size | small | medium | large |
|---|---|---|---|
| fix | context-check, describe, tasks, verify | + spec | + spec, design |
| feature | context-check, describe, tasks, verify | context-check, propose, spec, tasks, verify | + clarify, design |
| refactor | context-check, scope, tasks, verify | + design | + spec, design |
| enhancement | context-check, describe, tasks, verify | context-check, propose, spec, tasks, verify | + clarify, design |

Only one change may be active per project (`sdd_change` fails otherwise).
`sdd_context_check` is a scanner, not a judge: it surfaces existing SDD
artifacts, keyword-matched completed changes, related `explore`
observations, and (when no SDD artifacts exist yet) project convention
files. It never blocks advancement — the ambiguity analysis (requirements
smells, SemVer impact, EARS phrasing) is your job, reasoning over what the
scan returns. After reasoning, call `sdd_change_advance({content})` with
your authored markdown for the current stage; it is saved verbatim under a
per-stage header and the pipeline advances. The final `verify` stage
clears the project's active-change slot.

Use `sdd_adr` for durable architecture decisions outside the change
pipeline proper — it writes both a topic-keyed memory observation and a
numbered ledger file under `sdd/adr/`. Use `sdd_explore` for open-ended
investigation before you know the change's shape yet; repeated calls with
the same `title` merge into one running document and the tool suggests a
`type`/`size` pair once enough has accumulated.

## Memory workflows

- Start a session with `mem_session_start` when beginning sustained work;
  end it with `mem_session_end` and a summary when you're done.
- Save durable facts with `mem_save`. Give `topic_key` (e.g.
  `"architecture/db"`) to a recurring subject so repeated saves update the
  same row (`mem_suggest_topic_key` proposes one from type/title).
- `mem_search` and `mem_context` are your recall tools; `mem_timeline`
  shows what surrounded an observation within its session;
  `mem_build_context` walks the relation graph outward from one
  observation.
- `mem_relate` / `mem_unrelate` link observations (`relates_to`,
  `depends_on`, `caused_by`, `implements`, `supersedes`, `part_of`).
- `mem_progress` reads/writes one JSON progress blob per project — use it
  for durable "where things stand" state a sub-agent can resume from.
- `mem_capture_passive` is a low-friction save for ambient context you
  don't want to lose but haven't structured yet.
- Pass `namespace` (e.g. `"subagent/<name>"`) to keep a sub-agent's
  observations out of the parent's default-namespace reads.
- `mem_compact` without `compact_ids` identifies stale candidates; with
  `compact_ids` it atomically soft-deletes them and optionally writes one
  summary observation in their place.

## Response budgeting

Every read tool accepts `detail_level` (`summary` | `standard` | `full`,
default `standard` except `sdd_get_context`, which defaults `summary`) and
`max_tokens`. When a response is truncated to fit a token budget, a footer
reports the estimate; when more rows exist than were returned, a
navigation hint tells you how to see the rest (raise `limit`, refine the
query). Treat both as signals to either ask for more or move on, not as
something to retry blindly.

## Wave execution guidance

When a stage calls for several independent pieces of work (e.g. several
design components, several task groups), prefer in this order:
1. A single shared task list you work through serially, if the pieces are
   small or interdependent.
2. Parallel sub-agents, one per independent piece, each given a distinct
   `namespace` so their memory writes don't collide, synchronizing through
   `mem_progress` on the shared project.
3. A sequential fallback (one piece after another in this same
   conversation) when sub-agents aren't available or the pieces are too
   entangled to parallelize safely.
"#;

pub const PROMPT_SDD_START: &str = "sdd-start";
pub const PROMPT_SDD_STATUS: &str = "sdd-status";

pub fn prompt_body(name: &str) -> Option<&'static str> {
    match name {
        "sdd-start" => Some(
            "Check whether this project has `sdd/sdd.json`. If not, call `sdd_init_project` \
             to begin the greenfield pipeline. If it exists with no active change, call \
             `sdd_change` to start one. If a change or greenfield stage is already in \
             progress, call `sdd_get_context` or `sdd_change_status` to resume it.",
        ),
        "sdd-status" => Some(
            "Call `sdd_get_context` for the greenfield pipeline position and \
             `sdd_change_status` for the active change (if any), and summarize both for the \
             user.",
        ),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instructions_under_line_budget() {
        assert!(INSTRUCTIONS.lines().count() <= 460);
    }

    #[test]
    fn test_prompt_body_known_names() {
        assert!(prompt_body("sdd-start").is_some());
        assert!(prompt_body("sdd-status").is_some());
        assert!(prompt_body("unknown").is_none());
    }
}

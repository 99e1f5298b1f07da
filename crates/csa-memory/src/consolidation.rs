use std::collections::{HashMap, HashSet};

use anyhow::Result;
use chrono::Utc;
use ulid::Ulid;

use crate::llm_client::MemoryLlmClient;
use crate::{MemoryEntry, MemoryIndex, MemorySource, MemoryStore};

/// Plan for consolidation, returned by dry-run.
#[derive(Debug)]
pub struct ConsolidationPlan {
    /// ULIDs to mark with `valid_until`.
    pub entries_to_expire: Vec<String>,
    /// Groups of entries that can be merged into one consolidated entry.
    pub groups_to_merge: Vec<MergeGroup>,
    pub total_before: usize,
    pub total_after_estimate: usize,
}

#[derive(Debug)]
pub struct MergeGroup {
    pub source_ids: Vec<String>,
    pub merged_content_preview: String,
    pub full_summary: String,
    pub merged_tags: Vec<String>,
}

/// Generate a consolidation plan (dry-run).
pub async fn plan_consolidation(
    store: &MemoryStore,
    client: &dyn MemoryLlmClient,
) -> Result<ConsolidationPlan> {
    let entries = store.load_all()?;
    if entries.len() < 10 {
        return Ok(ConsolidationPlan {
            entries_to_expire: Vec::new(),
            groups_to_merge: Vec::new(),
            total_before: entries.len(),
            total_after_estimate: entries.len(),
        });
    }

    let mut by_project: HashMap<String, Vec<MemoryEntry>> = HashMap::new();
    for entry in entries {
        let project_key = entry
            .project
            .clone()
            .unwrap_or_else(|| "global".to_string());
        by_project.entry(project_key).or_default().push(entry);
    }

    let mut plan = ConsolidationPlan {
        entries_to_expire: Vec::new(),
        groups_to_merge: Vec::new(),
        total_before: by_project.values().map(Vec::len).sum(),
        total_after_estimate: by_project.values().map(Vec::len).sum(),
    };

    for project_entries in by_project.values() {
        if project_entries.len() < 5 {
            continue;
        }

        let full_summary = client.summarize(project_entries).await?;
        if full_summary.trim().is_empty() {
            continue;
        }

        let source_ids: Vec<String> = project_entries
            .iter()
            .map(|entry| entry.id.to_string())
            .collect();
        let preview_len = full_summary
            .char_indices()
            .nth(200)
            .map_or(full_summary.len(), |(idx, _)| idx);
        let merged_content_preview = full_summary[..preview_len].to_string();
        let mut merged_tags: Vec<String> = project_entries
            .iter()
            .flat_map(|entry| entry.tags.iter().cloned())
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        merged_tags.sort();

        let group = MergeGroup {
            source_ids,
            merged_content_preview,
            full_summary,
            merged_tags,
        };

        plan.total_after_estimate = plan
            .total_after_estimate
            .saturating_sub(group.source_ids.len().saturating_sub(1));
        plan.groups_to_merge.push(group);
    }

    Ok(plan)
}

/// Execute consolidation (apply plan effects to store and index).
pub async fn execute_consolidation(
    store: &MemoryStore,
    index: Option<&MemoryIndex>,
    client: &dyn MemoryLlmClient,
) -> Result<ConsolidationPlan> {
    let plan = plan_consolidation(store, client).await?;
    if plan.groups_to_merge.is_empty() && plan.entries_to_expire.is_empty() {
        return Ok(plan);
    }

    let mut entries = store.load_all()?;
    let now = Utc::now();

    for entry_id in &plan.entries_to_expire {
        if let Some(entry) = entries
            .iter_mut()
            .find(|item| item.id.to_string() == *entry_id)
        {
            entry.valid_until = Some(now);
        }
    }

    for group in &plan.groups_to_merge {
        let project = entries.iter().find_map(|entry| {
            let id = entry.id.to_string();
            group
                .source_ids
                .iter()
                .any(|source_id| source_id == &id)
                .then(|| entry.project.clone())
                .flatten()
        });

        for source_id in &group.source_ids {
            if let Some(entry) = entries
                .iter_mut()
                .find(|item| item.id.to_string() == *source_id)
            {
                entry.valid_until = Some(now);
            }
        }

        let consolidated = MemoryEntry {
            id: Ulid::new(),
            timestamp: now,
            project,
            tool: None,
            session_id: None,
            tags: group.merged_tags.clone(),
            content: group.full_summary.clone(),
            facts: Vec::new(),
            source: MemorySource::Consolidated,
            valid_from: Some(now),
            valid_until: None,
        };
        entries.push(consolidated);
    }

    store.rewrite_all(&entries)?;

    if let Some(idx) = index {
        let active: Vec<MemoryEntry> = entries
            .into_iter()
            .filter(|entry| entry.valid_until.is_none_or(|until| until > now))
            .collect();
        idx.rebuild(&active)?;
    }

    Ok(plan)
}

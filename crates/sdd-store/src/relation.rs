use crate::observation::get_observation;
use crate::types::{Observation, RelationType};
use rusqlite::{params, Connection, OptionalExtension};
use sdd_core::{now_rfc3339, CoreError, CoreResult};
use std::collections::{HashSet, VecDeque};

pub fn relate(conn: &Connection, from_id: i64, to_id: i64, relation_type: RelationType) -> CoreResult<()> {
    get_observation(conn, from_id)?;
    get_observation(conn, to_id)?;

    let existing: Option<i64> = conn
        .query_row(
            "SELECT id FROM relation WHERE from_obs_id = ?1 AND to_obs_id = ?2 AND type = ?3",
            params![from_id, to_id, relation_type.as_str()],
            |r| r.get(0),
        )
        .optional()
        .map_err(|e| CoreError::Io(e.to_string()))?;
    if existing.is_some() {
        return Err(CoreError::DuplicateRelation {
            from: from_id,
            to: to_id,
            kind: relation_type.as_str().to_string(),
        });
    }

    conn.execute(
        "INSERT INTO relation (from_obs_id, to_obs_id, type, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![from_id, to_id, relation_type.as_str(), now_rfc3339()],
    )
    .map_err(|e| CoreError::Io(e.to_string()))?;
    Ok(())
}

pub fn unrelate(conn: &Connection, from_id: i64, to_id: i64, relation_type: RelationType) -> CoreResult<()> {
    let affected = conn
        .execute(
            "DELETE FROM relation WHERE from_obs_id = ?1 AND to_obs_id = ?2 AND type = ?3",
            params![from_id, to_id, relation_type.as_str()],
        )
        .map_err(|e| CoreError::Io(e.to_string()))?;
    if affected == 0 {
        return Err(CoreError::InvalidInput(format!(
            "no {} relation from {from_id} to {to_id}",
            relation_type.as_str()
        )));
    }
    Ok(())
}

fn neighbors(conn: &Connection, id: i64) -> CoreResult<Vec<i64>> {
    let mut stmt = conn
        .prepare("SELECT to_obs_id FROM relation WHERE from_obs_id = ?1 UNION SELECT from_obs_id FROM relation WHERE to_obs_id = ?1")
        .map_err(|e| CoreError::Io(e.to_string()))?;
    let rows = stmt
        .query_map(params![id], |r| r.get::<_, i64>(0))
        .map_err(|e| CoreError::Io(e.to_string()))?;
    rows.collect::<Result<Vec<_>, _>>()
        .map_err(|e| CoreError::Io(e.to_string()))
}

/// Breadth-first traversal of the relation graph from `root`, up to
/// `max_depth` hops, deduped so a node already visited is never re-queued.
pub fn build_context(conn: &Connection, root: i64, max_depth: u32) -> CoreResult<Vec<Observation>> {
    get_observation(conn, root)?;

    let mut visited: HashSet<i64> = HashSet::new();
    visited.insert(root);
    let mut queue: VecDeque<(i64, u32)> = VecDeque::new();
    queue.push_back((root, 0));
    let mut ordered_ids = Vec::new();

    while let Some((id, depth)) = queue.pop_front() {
        if id != root {
            ordered_ids.push(id);
        }
        if depth >= max_depth {
            continue;
        }
        for next in neighbors(conn, id)? {
            if visited.insert(next) {
                queue.push_back((next, depth + 1));
            }
        }
    }

    ordered_ids
        .into_iter()
        .map(|id| get_observation(conn, id))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::observation::add_observation;
    use crate::types::AddObservationParams;

    fn add(conn: &mut Connection, title: &str) -> i64 {
        add_observation(
            conn,
            &AddObservationParams {
                obs_type: "notes".into(),
                title: title.into(),
                content: "c".into(),
                ..Default::default()
            },
        )
        .unwrap()
    }

    #[test]
    fn test_relate_and_build_context() {
        let mut conn = db::open_in_memory().unwrap();
        let a = add(&mut conn, "a");
        let b = add(&mut conn, "b");
        let c = add(&mut conn, "c");
        relate(&conn, a, b, RelationType::RelatesTo).unwrap();
        relate(&conn, b, c, RelationType::DependsOn).unwrap();

        let ctx = build_context(&conn, a, 2).unwrap();
        let ids: Vec<i64> = ctx.iter().map(|o| o.id).collect();
        assert!(ids.contains(&b));
        assert!(ids.contains(&c));
    }

    #[test]
    fn test_build_context_respects_max_depth() {
        let mut conn = db::open_in_memory().unwrap();
        let a = add(&mut conn, "a");
        let b = add(&mut conn, "b");
        let c = add(&mut conn, "c");
        relate(&conn, a, b, RelationType::RelatesTo).unwrap();
        relate(&conn, b, c, RelationType::RelatesTo).unwrap();

        let ctx = build_context(&conn, a, 1).unwrap();
        let ids: Vec<i64> = ctx.iter().map(|o| o.id).collect();
        assert!(ids.contains(&b));
        assert!(!ids.contains(&c));
    }

    #[test]
    fn test_duplicate_relation_rejected() {
        let mut conn = db::open_in_memory().unwrap();
        let a = add(&mut conn, "a");
        let b = add(&mut conn, "b");
        relate(&conn, a, b, RelationType::RelatesTo).unwrap();
        let result = relate(&conn, a, b, RelationType::RelatesTo);
        assert!(matches!(result, Err(CoreError::DuplicateRelation { .. })));
    }

    #[test]
    fn test_unrelate_removes_edge() {
        let mut conn = db::open_in_memory().unwrap();
        let a = add(&mut conn, "a");
        let b = add(&mut conn, "b");
        relate(&conn, a, b, RelationType::RelatesTo).unwrap();
        unrelate(&conn, a, b, RelationType::RelatesTo).unwrap();
        let ctx = build_context(&conn, a, 1).unwrap();
        assert!(ctx.is_empty());
    }

    #[test]
    fn test_unrelate_missing_is_error() {
        let mut conn = db::open_in_memory().unwrap();
        let a = add(&mut conn, "a");
        let b = add(&mut conn, "b");
        let result = unrelate(&conn, a, b, RelationType::RelatesTo);
        assert!(matches!(result, Err(CoreError::InvalidInput(_))));
    }
}

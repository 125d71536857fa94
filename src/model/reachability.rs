//! Reflexive-transitive closure of the group relation graph.
//!
//! The closure is a pure function of the current group-id set and relation
//! edges; [`groups::rebuild_reachable_cache`](super::groups::rebuild_reachable_cache)
//! materializes it into the cache table. Depth-first traversal memoizes
//! completed closures, so the amortized cost across all groups is O(V+E).
//! An explicit in-progress marker turns a cyclic edge set into an error
//! instead of unbounded recursion; since every relation mutation rebuilds
//! the cache inside the same transaction, a cycle-introducing write is
//! rejected before it commits.

use std::collections::{BTreeSet, HashMap};

use crate::error::{Error, Result};

/// DFS node states: absent = unvisited, `InProgress` = on the current
/// traversal path, `Done` = closure fully computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Visit {
    InProgress,
    Done,
}

/// Computes, for every group, the set of groups reachable by zero or more
/// relation edges. Every group reaches itself. Edges referencing unknown
/// group ids are ignored.
pub(crate) fn reflexive_transitive_closure(
    group_idxs: &[i32],
    edges: &[(i32, i32)],
) -> Result<HashMap<i32, BTreeSet<i32>>> {
    let mut direct: HashMap<i32, Vec<i32>> = HashMap::with_capacity(group_idxs.len());
    for &idx in group_idxs {
        direct.entry(idx).or_default();
    }
    for &(supergroup, subgroup) in edges {
        if !direct.contains_key(&subgroup) {
            continue;
        }
        if let Some(subs) = direct.get_mut(&supergroup) {
            if !subs.contains(&subgroup) {
                subs.push(subgroup);
            }
        }
    }

    let mut closure: HashMap<i32, BTreeSet<i32>> = HashMap::with_capacity(group_idxs.len());
    let mut state: HashMap<i32, Visit> = HashMap::with_capacity(group_idxs.len());
    let mut path: Vec<i32> = Vec::new();

    for &idx in group_idxs {
        dfs(idx, &direct, &mut closure, &mut state, &mut path)?;
    }

    Ok(closure)
}

fn dfs(
    idx: i32,
    direct: &HashMap<i32, Vec<i32>>,
    closure: &mut HashMap<i32, BTreeSet<i32>>,
    state: &mut HashMap<i32, Visit>,
    path: &mut Vec<i32>,
) -> Result<()> {
    match state.get(&idx) {
        Some(Visit::Done) => return Ok(()),
        Some(Visit::InProgress) => {
            let start = path.iter().position(|&n| n == idx).unwrap_or(0);
            let mut cycle: Vec<String> = path[start..].iter().map(ToString::to_string).collect();
            cycle.push(idx.to_string());
            return Err(Error::GroupCycle {
                path: cycle.join(" -> "),
            });
        }
        None => {}
    }

    state.insert(idx, Visit::InProgress);
    path.push(idx);

    let mut reachable = BTreeSet::new();
    reachable.insert(idx);

    if let Some(subs) = direct.get(&idx) {
        for &subgroup in subs {
            dfs(subgroup, direct, closure, state, path)?;
            if let Some(sub_closure) = closure.get(&subgroup) {
                reachable.extend(sub_closure.iter().copied());
            }
        }
    }

    path.pop();
    state.insert(idx, Visit::Done);
    closure.insert(idx, reachable);

    Ok(())
}

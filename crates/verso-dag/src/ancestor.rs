//! Common-ancestor search over first and secondary parents.

use std::collections::HashMap;

use tracing::debug;
use verso_store::Persist;
use verso_types::ObjId;

use crate::error::{DagError, DagResult};

/// One side of the search: every commit reached so far with its distance
/// from the head, plus the ids reached in the last layer.
struct Walk {
    distances: HashMap<ObjId, u32>,
    frontier: Vec<ObjId>,
}

impl Walk {
    fn new(head: ObjId) -> Self {
        Self {
            distances: HashMap::from([(head, 0)]),
            frontier: vec![head],
        }
    }

    /// Visit the parents of the current frontier. Returns the ids seen for
    /// the first time, which become the new frontier.
    fn advance(&mut self, persist: &dyn Persist, depth: u32) -> DagResult<Vec<ObjId>> {
        let ids: Vec<ObjId> = self
            .frontier
            .iter()
            .copied()
            .filter(|id| !id.is_empty())
            .collect();
        let mut reached = Vec::new();
        if !ids.is_empty() {
            for commit in persist.fetch_commits(&ids)? {
                let parents = std::iter::once(commit.parent()).chain(commit.secondary_parents);
                for parent in parents {
                    if !self.distances.contains_key(&parent) {
                        self.distances.insert(parent, depth);
                        reached.push(parent);
                    }
                }
            }
        }
        self.frontier = reached.clone();
        Ok(reached)
    }

    fn is_done(&self) -> bool {
        self.frontier.is_empty()
    }
}

/// Find the common ancestor of `a` and `b`.
///
/// Walks both histories one layer at a time, following first and secondary
/// parents and visiting each id at most once per side. In the first layer in
/// which the two walks meet, the winner is the common commit with the
/// smallest combined distance from both heads, ties going to the smallest
/// [`ObjId`]. Every history ends in [`ObjId::EMPTY`], so two unrelated
/// histories meet there.
///
/// If one head is an ancestor of the other, the result is that head.
pub fn common_ancestor(persist: &dyn Persist, a: ObjId, b: ObjId) -> DagResult<ObjId> {
    if a == b || a.is_empty() || b.is_empty() {
        let found = if a == b { a } else { ObjId::EMPTY };
        return Ok(found);
    }
    let mut left = Walk::new(a);
    let mut right = Walk::new(b);
    let mut depth = 0u32;
    while !(left.is_done() && right.is_done()) {
        depth += 1;
        let from_left = left.advance(persist, depth)?;
        let from_right = right.advance(persist, depth)?;

        let best = from_left
            .iter()
            .chain(&from_right)
            .filter_map(|id| {
                let l = left.distances.get(id)?;
                let r = right.distances.get(id)?;
                Some((l + r, *id))
            })
            .min();
        if let Some((distance, found)) = best {
            debug!(
                left = %a.short_hex(),
                right = %b.short_hex(),
                ancestor = %found.short_hex(),
                distance,
                "found common ancestor"
            );
            return Ok(found);
        }
    }
    Err(DagError::NoCommonAncestor(a, b))
}

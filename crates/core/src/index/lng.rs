//! Label navigating graph: the DAG of immediate label-set supersets.
//!
//! Nodes are groups; there is an edge `g → h` exactly when `S_g ⊊ S_h`
//! and no third group sits strictly between them. The synthetic root
//! (group 0, empty label set) points at every group with no other
//! ancestor, so the root reaches every group and edges strictly grow set
//! cardinality — the graph is acyclic by construction.

use crate::index::group::{GroupId, GroupTable};
use serde::{Deserialize, Serialize};

/// Child adjacency of the label-set lattice restricted to present groups.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelNavGraph {
    /// `children[g]` = immediate supersets of group `g`; index 0 is the root.
    children: Vec<Vec<GroupId>>,
}

impl LabelNavGraph {
    /// Builds the DAG over all real groups plus the root.
    pub fn build(groups: &GroupTable) -> Self {
        let num_nodes = groups.num_groups() + 1;
        let mut children: Vec<Vec<GroupId>> = vec![Vec::new(); num_nodes];

        // Visit groups by ascending label-set size so every candidate
        // ancestor is already final when its descendants are processed.
        let mut order: Vec<GroupId> = groups.ids().collect();
        order.sort_unstable_by_key(|&g| (groups.get(g).label_set.len(), g));

        for &h in &order {
            let set_h = &groups.get(h).label_set;
            let ancestors: Vec<GroupId> = order
                .iter()
                .copied()
                .filter(|&g| g != h && groups.get(g).label_set.is_strict_subset_of(set_h))
                .collect();

            // Keep only immediate ancestors: drop g when another candidate
            // sits strictly between g and h.
            let mut attached = false;
            for &g in &ancestors {
                let set_g = &groups.get(g).label_set;
                let shadowed = ancestors.iter().any(|&k| {
                    k != g && set_g.is_strict_subset_of(&groups.get(k).label_set)
                });
                if !shadowed {
                    children[g as usize].push(h);
                    attached = true;
                }
            }
            if !attached {
                children[0].push(h);
            }
        }

        for list in &mut children {
            list.sort_unstable();
        }
        tracing::debug!(
            "label navigating graph: {} groups, {} edges",
            num_nodes - 1,
            children.iter().map(Vec::len).sum::<usize>()
        );
        Self { children }
    }

    /// Number of nodes, root included. Zero for an equality-only index.
    pub fn num_nodes(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Immediate supersets of `g`.
    pub fn children(&self, g: GroupId) -> &[GroupId] {
        &self.children[g as usize]
    }

    /// Every group reachable from the root, in BFS order. Used by the
    /// validation pass; on a well-formed graph this is all groups.
    pub fn reachable_from_root(&self) -> Vec<GroupId> {
        let mut seen = vec![false; self.children.len()];
        let mut queue = std::collections::VecDeque::from([0 as GroupId]);
        let mut order = Vec::new();
        seen[0] = true;
        while let Some(g) = queue.pop_front() {
            for &h in self.children(g) {
                if !seen[h as usize] {
                    seen[h as usize] = true;
                    order.push(h);
                    queue.push_back(h);
                }
            }
        }
        order
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::labels::LabelSet;

    fn table_for(raw: &[&[u32]]) -> GroupTable {
        // One point per distinct label set is enough for LNG shape tests.
        let sets: Vec<LabelSet> = raw.iter().map(|s| LabelSet::new(s.to_vec())).collect();
        GroupTable::from_label_sets(&sets).0
    }

    fn gid(groups: &GroupTable, raw: &[u32]) -> GroupId {
        groups.find_exact(&LabelSet::new(raw.to_vec())).unwrap()
    }

    #[test]
    fn test_immediate_ancestors_only() {
        let groups = table_for(&[&[1], &[2], &[1, 2], &[1, 2, 3]]);
        let lng = LabelNavGraph::build(&groups);

        let g1 = gid(&groups, &[1]);
        let g2 = gid(&groups, &[2]);
        let g12 = gid(&groups, &[1, 2]);
        let g123 = gid(&groups, &[1, 2, 3]);

        // {1} and {2} are minimal: children of the root.
        assert_eq!(lng.children(0), &[g1, g2]);
        // {1,2} hangs off both singletons; {1,2,3} only off {1,2} (the
        // singletons are shadowed).
        assert_eq!(lng.children(g1), &[g12]);
        assert_eq!(lng.children(g2), &[g12]);
        assert_eq!(lng.children(g12), &[g123]);
        assert!(lng.children(g123).is_empty());
    }

    #[test]
    fn test_skip_level_edge_when_no_intermediate() {
        // {1,2,3} has no {1,2}-style intermediate here, so it attaches
        // directly to {1}.
        let groups = table_for(&[&[1], &[1, 2, 3]]);
        let lng = LabelNavGraph::build(&groups);
        let g1 = gid(&groups, &[1]);
        let g123 = gid(&groups, &[1, 2, 3]);
        assert_eq!(lng.children(g1), &[g123]);
        assert_eq!(lng.children(0), &[g1]);
    }

    #[test]
    fn test_root_reaches_every_group_and_acyclic() {
        let groups = table_for(&[&[1], &[2], &[3], &[1, 2], &[2, 3], &[1, 2, 3], &[9]]);
        let lng = LabelNavGraph::build(&groups);

        let reachable = lng.reachable_from_root();
        assert_eq!(reachable.len(), groups.num_groups());

        // Acyclic: every edge strictly grows label-set size.
        for g in groups.ids() {
            for &h in lng.children(g) {
                assert!(groups.get(g).label_set.len() < groups.get(h).label_set.len());
            }
        }
        // Root edges only lead to minimal groups.
        for &h in lng.children(0) {
            let set_h = &groups.get(h).label_set;
            for g in groups.ids() {
                assert!(
                    g == h || !groups.get(g).label_set.is_strict_subset_of(set_h),
                    "group {h} under the root has a real ancestor {g}"
                );
            }
        }
    }

    #[test]
    fn test_disjoint_sets_all_under_root() {
        let groups = table_for(&[&[1], &[2], &[3]]);
        let lng = LabelNavGraph::build(&groups);
        assert_eq!(lng.children(0).len(), 3);
        for g in groups.ids() {
            assert!(lng.children(g).is_empty());
        }
    }
}

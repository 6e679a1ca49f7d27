//! The unified navigating graph and its traversal machinery.
//!
//! [`UnifiedGraph`] holds one directed adjacency over all points. Intra-group
//! edges (inserted by the Vamana builder, capped at the max degree) and cross
//! edges (inserted by the cross-edge planner, exempt from the cap) live in
//! companion lists per vertex; search walks their union without
//! distinguishing them.

/// Filtered best-first beam search over the frozen graph.
pub mod search;
/// Vamana proximity-graph construction for one contiguous id range.
pub mod vamana;
/// Generation-based visited set reused across traversals.
pub mod visited;

use crate::IdxType;
use serde::{Deserialize, Serialize};

/// Directed adjacency over all `N` points of the index.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnifiedGraph {
    intra: Vec<Vec<IdxType>>,
    cross: Vec<Vec<IdxType>>,
}

impl UnifiedGraph {
    pub fn new(num_vertices: IdxType) -> Self {
        Self {
            intra: vec![Vec::new(); num_vertices as usize],
            cross: vec![Vec::new(); num_vertices as usize],
        }
    }

    pub fn num_vertices(&self) -> IdxType {
        self.intra.len() as IdxType
    }

    /// Intra-group out-neighbors of `v` (bounded by the build max degree).
    #[inline]
    pub fn intra_neighbors(&self, v: IdxType) -> &[IdxType] {
        &self.intra[v as usize]
    }

    /// Cross-edge out-neighbors of `v` (unbounded companion list).
    #[inline]
    pub fn cross_neighbors(&self, v: IdxType) -> &[IdxType] {
        &self.cross[v as usize]
    }

    /// All out-neighbors: intra followed by cross.
    #[inline]
    pub fn neighbors(&self, v: IdxType) -> impl Iterator<Item = IdxType> + '_ {
        self.intra[v as usize]
            .iter()
            .chain(self.cross[v as usize].iter())
            .copied()
    }

    /// Installs the intra adjacency of one contiguous id range, translating
    /// the builder's range-local ids by `lo`.
    pub(crate) fn install_range(&mut self, lo: IdxType, local_adjacency: Vec<Vec<IdxType>>) {
        for (local_id, neighbors) in local_adjacency.into_iter().enumerate() {
            let v = lo as usize + local_id;
            self.intra[v] = neighbors.into_iter().map(|u| u + lo).collect();
        }
    }

    /// Appends cross edges from `v`, skipping duplicates and self-loops.
    pub(crate) fn add_cross_edges(&mut self, v: IdxType, targets: &[IdxType]) {
        let list = &mut self.cross[v as usize];
        for &t in targets {
            if t != v && !list.contains(&t) {
                list.push(t);
            }
        }
    }

    /// Largest intra out-degree over all vertices.
    pub fn max_intra_degree(&self) -> usize {
        self.intra.iter().map(Vec::len).max().unwrap_or(0)
    }

    /// Total edge count (intra + cross).
    pub fn num_edges(&self) -> usize {
        self.intra.iter().map(Vec::len).sum::<usize>()
            + self.cross.iter().map(Vec::len).sum::<usize>()
    }
}

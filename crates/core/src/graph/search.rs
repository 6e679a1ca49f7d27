//! Filtered best-first beam search over the frozen unified graph.
//!
//! The candidate pool is bounded by the beam width; only vertices passing
//! the filter predicate enter the result pool, but every vertex remains
//! expandable so the walk can cross non-matching regions (and descend
//! cross edges) to reach matching ones. Distance-comparison counts are
//! reported back to the caller.

use crate::distance::DistanceMetric;
use crate::graph::visited::VisitedSet;
use crate::graph::UnifiedGraph;
use crate::storage::{Element, Storage};
use crate::IdxType;
use ordered_float::OrderedFloat;
use std::collections::BinaryHeap;

/// A candidate during search: ordered closest-first out of a max-heap via
/// negated distance, with ascending-id tie-breaks for determinism.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Candidate {
    neg_distance: OrderedFloat<f32>,
    id: IdxType,
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.neg_distance
            .cmp(&other.neg_distance)
            .then(other.id.cmp(&self.id))
    }
}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// A result entry: max-heap by (distance, id) so the worst accepted match
/// sits on top for pruning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ResultEntry {
    distance: OrderedFloat<f32>,
    id: IdxType,
}

impl Ord for ResultEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.distance
            .cmp(&other.distance)
            .then(self.id.cmp(&other.id))
    }
}

impl PartialOrd for ResultEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// Traversal knobs for one [`beam_search`] call.
#[derive(Debug, Clone)]
pub struct BeamOptions {
    /// Bound on the result pool (L).
    pub beam_width: usize,
    /// Restrict expansion to intra-group edges (used by the cross-edge
    /// planner to stay inside one group).
    pub intra_only: bool,
    /// Also return every evaluated vertex with its distance (used by
    /// construction to feed robust prune).
    pub collect_visited: bool,
}

/// Output of one beam search.
#[derive(Debug, Default)]
pub struct BeamOutput {
    /// Filter-passing vertices, ascending by (distance, id), at most
    /// `beam_width` entries.
    pub results: Vec<(f32, IdxType)>,
    /// Every evaluated vertex with its distance (empty unless
    /// `collect_visited` was set).
    pub visited: Vec<(f32, IdxType)>,
    /// Number of distance computations performed.
    pub num_cmps: usize,
}

/// Best-first walk from `entry_points` toward `query`.
///
/// `visited` is a reusable [`VisitedSet`]; it is cleared here and must
/// cover `graph.num_vertices()` ids.
pub fn beam_search<T: Element, F: Fn(IdxType) -> bool>(
    graph: &UnifiedGraph,
    storage: &Storage<T>,
    metric: DistanceMetric,
    query: &[T],
    entry_points: &[IdxType],
    options: &BeamOptions,
    filter: &F,
    visited: &mut VisitedSet,
) -> BeamOutput {
    visited.clear();
    let beam = options.beam_width.max(1);
    let mut candidates: BinaryHeap<Candidate> = BinaryHeap::with_capacity(beam * 2);
    let mut results: BinaryHeap<ResultEntry> = BinaryHeap::with_capacity(beam + 1);
    let mut output = BeamOutput::default();
    // Cached worst accepted distance, avoids repeated heap peeks.
    let mut worst_dist = f32::MAX;

    let mut evaluate = |id: IdxType,
                        output: &mut BeamOutput,
                        results: &mut BinaryHeap<ResultEntry>,
                        worst_dist: &mut f32|
     -> f32 {
        let dist = metric.compute(query, storage.vector(id));
        output.num_cmps += 1;
        if options.collect_visited {
            output.visited.push((dist, id));
        }
        if filter(id) {
            results.push(ResultEntry {
                distance: OrderedFloat(dist),
                id,
            });
            if results.len() > beam {
                results.pop();
            }
            if results.len() >= beam {
                *worst_dist = results.peek().map_or(f32::MAX, |r| r.distance.0);
            }
        }
        dist
    };

    for &ep in entry_points {
        if ep < graph.num_vertices() && visited.insert(ep) {
            let dist = evaluate(ep, &mut output, &mut results, &mut worst_dist);
            candidates.push(Candidate {
                neg_distance: OrderedFloat(-dist),
                id: ep,
            });
        }
    }

    while let Some(candidate) = candidates.pop() {
        let c_dist = -candidate.neg_distance.0;
        if results.len() >= beam && c_dist > worst_dist {
            break;
        }

        let intra = graph.intra_neighbors(candidate.id);
        let cross: &[IdxType] = if options.intra_only {
            &[]
        } else {
            graph.cross_neighbors(candidate.id)
        };
        for (i, &neighbor) in intra.iter().chain(cross.iter()).enumerate() {
            // Prefetch the next neighbor's vector while this one computes.
            if i + 1 < intra.len() {
                storage.prefetch(intra[i + 1]);
            }
            if !visited.insert(neighbor) {
                continue;
            }
            let dist = evaluate(neighbor, &mut output, &mut results, &mut worst_dist);
            if results.len() < beam || dist < worst_dist {
                candidates.push(Candidate {
                    neg_distance: OrderedFloat(-dist),
                    id: neighbor,
                });
            }
        }
    }

    output.results = results
        .into_sorted_vec()
        .into_iter()
        .map(|r| (r.distance.0, r.id))
        .collect();
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::labels::LabelSet;

    fn line_storage() -> Storage<f32> {
        // Five points on a line at x = 0, 1, 2, 3, 4.
        let rows: Vec<Vec<f32>> = (0..5).map(|i| vec![i as f32, 0.0]).collect();
        Storage::from_rows(&rows, vec![LabelSet::default(); 5]).unwrap()
    }

    fn line_graph() -> UnifiedGraph {
        // Chain 0 <-> 1 <-> 2 <-> 3 <-> 4.
        let mut graph = UnifiedGraph::new(5);
        graph.install_range(
            0,
            vec![vec![1], vec![0, 2], vec![1, 3], vec![2, 4], vec![3]],
        );
        graph
    }

    fn options(beam: usize) -> BeamOptions {
        BeamOptions {
            beam_width: beam,
            intra_only: false,
            collect_visited: false,
        }
    }

    #[test]
    fn test_walks_to_nearest() {
        let storage = line_storage();
        let graph = line_graph();
        let mut visited = VisitedSet::new(5);
        let out = beam_search(
            &graph,
            &storage,
            DistanceMetric::L2,
            &[3.9, 0.0],
            &[0],
            &options(3),
            &|_| true,
            &mut visited,
        );
        assert_eq!(out.results[0].1, 4);
        assert!(out.num_cmps >= 5, "walked the whole chain");
    }

    #[test]
    fn test_filter_excludes_but_still_expands() {
        let storage = line_storage();
        let graph = line_graph();
        let mut visited = VisitedSet::new(5);
        // Only even ids match; the walk must pass through odd ids anyway.
        let out = beam_search(
            &graph,
            &storage,
            DistanceMetric::L2,
            &[4.0, 0.0],
            &[0],
            &options(3),
            &|id| id % 2 == 0,
            &mut visited,
        );
        let ids: Vec<IdxType> = out.results.iter().map(|&(_, id)| id).collect();
        assert_eq!(ids, vec![4, 2, 0]);
    }

    #[test]
    fn test_intra_only_ignores_cross_edges() {
        let storage = line_storage();
        let mut graph = UnifiedGraph::new(5);
        graph.install_range(0, vec![vec![1], vec![0], vec![], vec![], vec![]]);
        graph.add_cross_edges(1, &[4]);
        let mut visited = VisitedSet::new(5);

        let mut opts = options(4);
        opts.intra_only = true;
        let out = beam_search(
            &graph,
            &storage,
            DistanceMetric::L2,
            &[4.0, 0.0],
            &[0],
            &opts,
            &|_| true,
            &mut visited,
        );
        assert!(out.results.iter().all(|&(_, id)| id <= 1));

        opts.intra_only = false;
        let out = beam_search(
            &graph,
            &storage,
            DistanceMetric::L2,
            &[4.0, 0.0],
            &[0],
            &opts,
            &|_| true,
            &mut visited,
        );
        assert_eq!(out.results[0].1, 4, "cross edge reaches the far point");
    }

    #[test]
    fn test_collect_visited_reports_every_evaluation() {
        let storage = line_storage();
        let graph = line_graph();
        let mut visited = VisitedSet::new(5);
        let mut opts = options(5);
        opts.collect_visited = true;
        let out = beam_search(
            &graph,
            &storage,
            DistanceMetric::L2,
            &[0.0, 0.0],
            &[2],
            &opts,
            &|_| true,
            &mut visited,
        );
        assert_eq!(out.visited.len(), out.num_cmps);
        assert!(out.visited.iter().any(|&(_, id)| id == 0));
    }

    #[test]
    fn test_empty_entries_yield_empty_output() {
        let storage = line_storage();
        let graph = line_graph();
        let mut visited = VisitedSet::new(5);
        let out = beam_search(
            &graph,
            &storage,
            DistanceMetric::L2,
            &[0.0, 0.0],
            &[],
            &options(3),
            &|_| true,
            &mut visited,
        );
        assert!(out.results.is_empty());
        assert_eq!(out.num_cmps, 0);
    }
}

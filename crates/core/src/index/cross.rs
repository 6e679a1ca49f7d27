//! Cross-edge planning between groups along the label navigating graph.
//!
//! For every LNG edge `g → h` the planner emits up to `num_cross_edges`
//! directed edges from `m_g` (the medoid of `g`) into `h`, so beam search
//! can leave an entry group and descend into its label-set descendants.
//! Targets inside `h` are found by a greedy search restricted to `h`'s
//! intra edges, seeded at `m_h` with query `vec(m_g)`, then robust-pruned
//! for diversity. Cross edges are exempt from the per-vertex R cap.

use crate::distance::DistanceMetric;
use crate::graph::search::{beam_search, BeamOptions};
use crate::graph::vamana::robust_prune;
use crate::graph::visited::VisitedSet;
use crate::graph::UnifiedGraph;
use crate::index::group::{GroupId, GroupTable};
use crate::index::lng::LabelNavGraph;
use crate::storage::{Element, Storage};
use crate::IdxType;
use rayon::prelude::*;

/// Knobs for one planning run.
#[derive(Debug, Clone)]
pub struct CrossEdgeParams {
    pub num_cross_edges: u32,
    pub l_build: u32,
    pub alpha: f32,
}

/// Plans and installs all cross edges. Planning per LNG edge runs in
/// parallel; installation is sequential because edges append to shared
/// per-vertex lists.
pub fn plan_cross_edges<T: Element>(
    graph: &mut UnifiedGraph,
    storage: &Storage<T>,
    groups: &GroupTable,
    lng: &LabelNavGraph,
    metric: DistanceMetric,
    params: &CrossEdgeParams,
) {
    if params.num_cross_edges == 0 {
        return;
    }
    // The root is synthetic: it has no medoid of its own to link from,
    // and its children are entered directly as entry groups.
    let edges: Vec<(GroupId, GroupId)> = groups
        .ids()
        .flat_map(|g| lng.children(g).iter().map(move |&h| (g, h)))
        .collect();

    let frozen: &UnifiedGraph = graph;
    let planned: Vec<(IdxType, Vec<IdxType>)> = edges
        .par_iter()
        .map(|&(g, h)| {
            let source = groups.get(g).medoid;
            let targets = plan_one_edge(frozen, storage, groups, metric, params, source, h);
            (source, targets)
        })
        .collect();

    let mut installed = 0usize;
    for (source, targets) in planned {
        installed += targets.len();
        graph.add_cross_edges(source, &targets);
    }
    tracing::info!(
        "planned {} cross edges over {} group pairs",
        installed,
        edges.len()
    );
}

/// Picks the targets of one `g → h` edge bundle.
fn plan_one_edge<T: Element>(
    graph: &UnifiedGraph,
    storage: &Storage<T>,
    groups: &GroupTable,
    metric: DistanceMetric,
    params: &CrossEdgeParams,
    source: IdxType,
    child: GroupId,
) -> Vec<IdxType> {
    let child_group = groups.get(child);
    let query = storage.vector(source);

    let mut visited = VisitedSet::new(graph.num_vertices() as usize);
    let options = BeamOptions {
        beam_width: params.l_build as usize,
        intra_only: true,
        collect_visited: true,
    };
    let out = beam_search(
        graph,
        storage,
        metric,
        query,
        &[child_group.medoid],
        &options,
        &|_| true,
        &mut visited,
    );

    let pairwise = |a: IdxType, b: IdxType| metric.compute(storage.vector(a), storage.vector(b));
    robust_prune(
        out.visited,
        params.alpha,
        params.num_cross_edges as usize,
        &pairwise,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::vamana::{build_subgraph, VamanaParams};
    use crate::labels::LabelSet;
    use crate::storage::Storage;

    /// Two groups: {1} at the origin cluster, {1,2} around (10, 10).
    fn two_group_fixture() -> (Storage<f32>, GroupTable, LabelNavGraph, UnifiedGraph) {
        let mut rows = Vec::new();
        let mut label_sets = Vec::new();
        for i in 0..8 {
            rows.push(vec![i as f32 * 0.1, 0.0]);
            label_sets.push(LabelSet::new(vec![1]));
        }
        for i in 0..8 {
            rows.push(vec![10.0 + i as f32 * 0.1, 10.0]);
            label_sets.push(LabelSet::new(vec![1, 2]));
        }
        let mut storage = Storage::from_rows(&rows, label_sets).unwrap();

        let (mut groups, new_to_old) = GroupTable::from_label_sets(storage.label_sets());
        storage.reorder(&new_to_old).unwrap();

        let mut graph = UnifiedGraph::new(storage.num_points());
        let params = VamanaParams {
            max_degree: 4,
            l_build: 16,
            alpha: 1.2,
        };
        for gid in groups.ids().collect::<Vec<_>>() {
            let (lo, hi) = {
                let g = groups.get(gid);
                (g.lo, g.hi)
            };
            let (adj, medoid) =
                build_subgraph(&storage.slice(lo, hi), DistanceMetric::L2, &params);
            graph.install_range(lo, adj);
            groups.set_medoid(gid, lo + medoid);
        }
        let lng = LabelNavGraph::build(&groups);
        (storage, groups, lng, graph)
    }

    #[test]
    fn test_cross_edges_point_into_child_range() {
        let (storage, groups, lng, mut graph) = two_group_fixture();
        let params = CrossEdgeParams {
            num_cross_edges: 3,
            l_build: 16,
            alpha: 1.2,
        };
        plan_cross_edges(&mut graph, &storage, &groups, &lng, DistanceMetric::L2, &params);

        let parent = groups.find_exact(&LabelSet::new(vec![1])).unwrap();
        let child = groups.find_exact(&LabelSet::new(vec![1, 2])).unwrap();
        let source = groups.get(parent).medoid;

        let cross = graph.cross_neighbors(source);
        assert!(!cross.is_empty(), "parent medoid must gain cross edges");
        assert!(cross.len() <= 3);
        for &t in cross {
            assert!(groups.get(child).contains_id(t));
        }

        // The child group's points gained no cross edges (it has no LNG
        // children), and no intra list grew past the cap.
        let child_group = groups.get(child);
        for v in child_group.lo..child_group.hi {
            assert!(graph.cross_neighbors(v).is_empty());
        }
        assert!(graph.max_intra_degree() <= 4);
    }

    #[test]
    fn test_zero_cross_edges_is_a_noop() {
        let (storage, groups, lng, mut graph) = two_group_fixture();
        let edges_before = graph.num_edges();
        let params = CrossEdgeParams {
            num_cross_edges: 0,
            l_build: 16,
            alpha: 1.2,
        };
        plan_cross_edges(&mut graph, &storage, &groups, &lng, DistanceMetric::L2, &params);
        assert_eq!(graph.num_edges(), edges_before);
    }
}

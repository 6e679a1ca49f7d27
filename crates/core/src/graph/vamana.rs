//! Vamana proximity-graph construction over one contiguous id range.
//!
//! The builder bootstraps a random R-regular digraph, then refines it over
//! two passes: every point is re-inserted in a pre-generated random
//! permutation by greedy-searching from the range medoid, robust-pruning
//! the visited set into a neighbor list, and back-linking the point from
//! each selected neighbor (re-pruning lists that overflow R). All ids here
//! are range-local; the caller translates them into global ids.

use crate::config;
use crate::distance::DistanceMetric;
use crate::graph::visited::VisitedSet;
use crate::storage::{Element, StorageView};
use crate::IdxType;
use ordered_float::OrderedFloat;
use parking_lot::Mutex;
use rand::seq::SliceRandom;
use rand::Rng;
use rayon::prelude::*;
use std::cell::RefCell;
use std::collections::BinaryHeap;

thread_local! {
    /// Reused visited set for construction-side greedy searches.
    static BUILD_VISITED: RefCell<VisitedSet> = RefCell::new(VisitedSet::new(0));
}

/// Tuning parameters for one subgraph build.
#[derive(Debug, Clone)]
pub struct VamanaParams {
    /// Maximum out-degree R.
    pub max_degree: u32,
    /// Candidate list size of the construction greedy searches.
    pub l_build: u32,
    /// Pruning parameter; ≥ 1.0.
    pub alpha: f32,
}

impl Default for VamanaParams {
    fn default() -> Self {
        Self {
            max_degree: config::DEFAULT_MAX_DEGREE,
            l_build: config::DEFAULT_L_BUILD,
            alpha: config::DEFAULT_ALPHA,
        }
    }
}

/// Builds a Vamana graph over the view's id range.
///
/// Returns the per-vertex out-neighbor lists (range-local ids, each list
/// ≤ R, no self-loops, no duplicates) and the range medoid used as the
/// build entry point.
pub fn build_subgraph<T: Element>(
    view: &StorageView<'_, T>,
    metric: DistanceMetric,
    params: &VamanaParams,
) -> (Vec<Vec<IdxType>>, IdxType) {
    let n = view.num_points();
    debug_assert!(n > 0);
    if n == 1 {
        return (vec![Vec::new()], 0);
    }

    let r_cap = (params.max_degree as usize).min(n as usize - 1);
    let adjacency = random_regular_bootstrap(n, r_cap);
    let medoid = view.medoid(metric);

    for _pass in 0..config::VAMANA_BUILD_PASSES {
        // Fixed permutation per pass; the parallel loop only consumes it.
        let mut order: Vec<IdxType> = (0..n).collect();
        order.shuffle(&mut rand::thread_rng());

        order.par_iter().for_each(|&p| {
            insert_point(&adjacency, view, metric, params, medoid, p, r_cap);
        });
    }

    let frozen = adjacency
        .into_iter()
        .map(|list| list.into_inner())
        .collect();
    (frozen, medoid)
}

/// Random R-regular bootstrap: distinct out-neighbors, no self-loops.
fn random_regular_bootstrap(n: IdxType, r_cap: usize) -> Vec<Mutex<Vec<IdxType>>> {
    let mut rng = rand::thread_rng();
    (0..n)
        .map(|v| {
            let mut neighbors = Vec::with_capacity(r_cap);
            if n as usize - 1 <= r_cap {
                neighbors.extend((0..n).filter(|&u| u != v));
            } else {
                while neighbors.len() < r_cap {
                    let u = rng.gen_range(0..n);
                    if u != v && !neighbors.contains(&u) {
                        neighbors.push(u);
                    }
                }
            }
            Mutex::new(neighbors)
        })
        .collect()
}

/// One refinement step: re-select `p`'s neighbors and back-link.
fn insert_point<T: Element>(
    adjacency: &[Mutex<Vec<IdxType>>],
    view: &StorageView<'_, T>,
    metric: DistanceMetric,
    params: &VamanaParams,
    medoid: IdxType,
    p: IdxType,
    r_cap: usize,
) {
    let query = view.vector(p);
    let mut candidates = BUILD_VISITED.with(|cell| {
        let mut visited = cell.borrow_mut();
        visited.ensure_capacity(view.num_points() as usize);
        greedy_collect(
            adjacency,
            view,
            metric,
            medoid,
            query,
            params.l_build as usize,
            &mut visited,
        )
    });

    // Union with the current out-neighbors before pruning.
    let current = adjacency[p as usize].lock().clone();
    for q in current {
        candidates.push((metric.compute(query, view.vector(q)), q));
    }
    candidates.retain(|&(_, id)| id != p);

    let pairwise = |a: IdxType, b: IdxType| metric.compute(view.vector(a), view.vector(b));
    let new_neighbors = robust_prune(candidates, params.alpha, r_cap, &pairwise);
    *adjacency[p as usize].lock() = new_neighbors.clone();

    for q in new_neighbors {
        let mut list = adjacency[q as usize].lock();
        if !list.contains(&p) {
            list.push(p);
            if list.len() > r_cap {
                let base = view.vector(q);
                let cands: Vec<(f32, IdxType)> = list
                    .iter()
                    .map(|&u| (metric.compute(base, view.vector(u)), u))
                    .collect();
                *list = robust_prune(cands, params.alpha, r_cap, &pairwise);
            }
        }
    }
}

/// Greedy search over the locked adjacency, returning every evaluated
/// vertex with its distance to `query`.
fn greedy_collect<T: Element>(
    adjacency: &[Mutex<Vec<IdxType>>],
    view: &StorageView<'_, T>,
    metric: DistanceMetric,
    entry: IdxType,
    query: &[T],
    l: usize,
    visited: &mut VisitedSet,
) -> Vec<(f32, IdxType)> {
    visited.clear();
    let l = l.max(1);
    // Min-heap over (distance, id) via Reverse-free negation trick is not
    // needed here; Reverse keeps the intent readable.
    let mut frontier: BinaryHeap<std::cmp::Reverse<(OrderedFloat<f32>, IdxType)>> =
        BinaryHeap::new();
    let mut pool: BinaryHeap<(OrderedFloat<f32>, IdxType)> = BinaryHeap::with_capacity(l + 1);
    let mut evaluated = Vec::with_capacity(l * 2);

    visited.insert(entry);
    let dist = metric.compute(query, view.vector(entry));
    evaluated.push((dist, entry));
    frontier.push(std::cmp::Reverse((OrderedFloat(dist), entry)));
    pool.push((OrderedFloat(dist), entry));

    while let Some(std::cmp::Reverse((dist, v))) = frontier.pop() {
        if pool.len() >= l {
            let worst = pool.peek().map_or(f32::MAX, |&(d, _)| d.0);
            if dist.0 > worst {
                break;
            }
        }

        let neighbors = adjacency[v as usize].lock().clone();
        for u in neighbors {
            if !visited.insert(u) {
                continue;
            }
            let d = metric.compute(query, view.vector(u));
            evaluated.push((d, u));
            let worst = pool.peek().map_or(f32::MAX, |&(w, _)| w.0);
            if pool.len() < l || d < worst {
                frontier.push(std::cmp::Reverse((OrderedFloat(d), u)));
                pool.push((OrderedFloat(d), u));
                if pool.len() > l {
                    pool.pop();
                }
            }
        }
    }

    evaluated
}

/// Distance-ratio neighbor selection.
///
/// Candidates are visited by ascending (distance, id); a candidate `q` is
/// kept only if no already-kept `r` dominates it, i.e. only while
/// `alpha · d(r, q) > d(p, q)` holds for every kept `r`. Stops at `cap`.
pub(crate) fn robust_prune<F: Fn(IdxType, IdxType) -> f32>(
    mut candidates: Vec<(f32, IdxType)>,
    alpha: f32,
    cap: usize,
    pairwise: &F,
) -> Vec<IdxType> {
    candidates.sort_unstable_by_key(|&(dist, id)| (OrderedFloat(dist), id));
    candidates.dedup_by_key(|&mut (_, id)| id);

    let mut selected: Vec<IdxType> = Vec::with_capacity(cap);
    for &(dist_pq, q) in &candidates {
        if selected.len() >= cap {
            break;
        }
        let dominated = selected
            .iter()
            .any(|&r| alpha * pairwise(r, q) <= dist_pq);
        if !dominated {
            selected.push(q);
        }
    }
    selected
}

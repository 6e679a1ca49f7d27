//! The unified navigating graph index.
//!
//! [`UngIndex`] is the typed core: it owns the (reordered) storage, the
//! unified adjacency, the group table, and the label navigating graph, and
//! orchestrates construction, persistence, and filtered search.
//! [`UniNavGraph`] is the non-generic façade dispatching over the three
//! element types.
//!
//! Construction: group points by label set, reorder storage so groups are
//! contiguous, build one Vamana subgraph per group (parallel across and
//! within groups), derive the LNG, and stitch groups with cross edges.
//! Search: pick entry groups by walking the LNG with the query's label
//! set, then run one filtered beam search over the unified graph per
//! query, in parallel across queries.

/// Cross-edge planning along LNG edges.
pub mod cross;
/// Label-set groups and the contiguity permutation.
pub mod group;
/// The immediate-superset DAG over groups.
pub mod lng;
/// On-disk artifact framing and the index meta record.
pub mod persistence;

use crate::config;
use crate::distance::DistanceMetric;
use crate::error::{Error, Result};
use crate::graph::search::{beam_search, BeamOptions};
use crate::graph::vamana::{build_subgraph, VamanaParams};
use crate::graph::visited::VisitedSet;
use crate::graph::UnifiedGraph;
use crate::index::cross::{plan_cross_edges, CrossEdgeParams};
use crate::index::group::{GroupId, GroupTable};
use crate::index::lng::LabelNavGraph;
use crate::index::persistence::{read_artifact, read_meta, write_artifact, IndexMeta};
use crate::labels::LabelSet;
use crate::storage::{AnyStorage, DataType, Element, Storage};
use crate::IdxType;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::path::Path;

thread_local! {
    /// Per-worker visited set, reused across queries.
    static QUERY_VISITED: RefCell<VisitedSet> = RefCell::new(VisitedSet::new(0));
}

/// Build-time scenario: whether queries will only ever use exact-match
/// entry groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BuildScenario {
    /// Queries are equality-only; LNG and cross edges are skipped.
    Equality,
    /// Full index supporting equality, containment, and overlap queries.
    General,
}

impl std::str::FromStr for BuildScenario {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "equality" => Ok(BuildScenario::Equality),
            "general" => Ok(BuildScenario::General),
            other => Err(Error::Config(format!("unknown build scenario '{other}'"))),
        }
    }
}

/// Filter predicate selector between a query label set `Q` and a point
/// label set `L`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryScenario {
    /// `L == Q`
    Equality,
    /// `Q ⊆ L`
    Containment,
    /// `L ∩ Q ≠ ∅`
    Overlap,
}

impl std::str::FromStr for QueryScenario {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "equality" => Ok(QueryScenario::Equality),
            "containment" => Ok(QueryScenario::Containment),
            "overlap" => Ok(QueryScenario::Overlap),
            other => Err(Error::Config(format!("unknown query scenario '{other}'"))),
        }
    }
}

/// Graph algorithm used inside each group. Only Vamana is supported;
/// parsing any other name fails with a config error.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum IndexType {
    #[default]
    Vamana,
}

impl std::str::FromStr for IndexType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "Vamana" | "vamana" => Ok(IndexType::Vamana),
            other => Err(Error::Config(format!("unsupported index type '{other}'"))),
        }
    }
}

/// Construction parameters.
#[derive(Debug, Clone)]
pub struct BuildParams {
    pub scenario: BuildScenario,
    pub index_type: IndexType,
    /// Worker threads; 0 means one per core.
    pub num_threads: usize,
    pub num_cross_edges: u32,
    pub max_degree: u32,
    pub l_build: u32,
    pub alpha: f32,
}

impl Default for BuildParams {
    fn default() -> Self {
        Self {
            scenario: BuildScenario::General,
            index_type: IndexType::Vamana,
            num_threads: 0,
            num_cross_edges: config::DEFAULT_NUM_CROSS_EDGES,
            max_degree: config::DEFAULT_MAX_DEGREE,
            l_build: config::DEFAULT_L_BUILD,
            alpha: config::DEFAULT_ALPHA,
        }
    }
}

/// Search parameters.
#[derive(Debug, Clone)]
pub struct SearchParams {
    pub scenario: QueryScenario,
    /// Worker threads; 0 means one per core.
    pub num_threads: usize,
    pub l_search: u32,
    /// Seeds taken per entry group (prefix of its entry table).
    pub num_entry_points: u32,
    pub k: usize,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            scenario: QueryScenario::Containment,
            num_threads: 0,
            l_search: config::DEFAULT_L_SEARCH,
            num_entry_points: config::DEFAULT_NUM_ENTRY_POINTS,
            k: 10,
        }
    }
}

/// Per-query results and telemetry of one search batch.
#[derive(Debug, Default)]
pub struct SearchOutput {
    /// For each query: up to k `(original_id, distance)` pairs, ascending
    /// by distance. Shorter when the filter admits fewer matches.
    pub hits: Vec<Vec<(IdxType, f32)>>,
    /// For each query: number of distance comparisons performed.
    pub num_cmps: Vec<usize>,
}

/// The typed unified-navigating-graph index over one element type.
#[derive(Debug)]
pub struct UngIndex<T: Element> {
    storage: Storage<T>,
    metric: DistanceMetric,
    graph: UnifiedGraph,
    groups: GroupTable,
    lng: LabelNavGraph,
    /// Reordered-to-original id map; search reports original ids.
    new_to_old: Vec<IdxType>,
    build_scenario: BuildScenario,
    max_degree: u32,
    num_cross_edges: u32,
}

fn thread_pool(num_threads: usize) -> Result<rayon::ThreadPool> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(num_threads)
        .build()
        .map_err(|e| Error::Internal(format!("failed to build thread pool: {e}")))
}

impl<T: Element> UngIndex<T> {
    /// Builds the index, consuming (and reordering) the storage.
    pub fn build(storage: Storage<T>, metric: DistanceMetric, params: &BuildParams) -> Result<Self> {
        if storage.num_points() == 0 {
            return Err(Error::Data("cannot build an index over empty storage".into()));
        }
        let pool = thread_pool(params.num_threads)?;
        pool.install(|| Self::build_inner(storage, metric, params))
    }

    fn build_inner(
        mut storage: Storage<T>,
        metric: DistanceMetric,
        params: &BuildParams,
    ) -> Result<Self> {
        let start = std::time::Instant::now();
        let (mut groups, new_to_old) = GroupTable::from_label_sets(storage.label_sets());
        storage.reorder(&new_to_old)?;

        let vamana = VamanaParams {
            max_degree: params.max_degree,
            l_build: params.l_build,
            alpha: params.alpha,
        };
        let mut graph = UnifiedGraph::new(storage.num_points());

        // One Vamana build per group; groups are independent and each
        // build parallelizes internally over its points.
        let group_ids: Vec<GroupId> = groups.ids().collect();
        let built: Vec<(GroupId, IdxType, Vec<Vec<IdxType>>, IdxType)> = group_ids
            .par_iter()
            .map(|&gid| {
                let (lo, hi) = {
                    let g = groups.get(gid);
                    (g.lo, g.hi)
                };
                let view = storage.slice(lo, hi);
                let (adjacency, medoid) = build_subgraph(&view, metric, &vamana);
                (gid, lo, adjacency, medoid)
            })
            .collect();
        for (gid, lo, adjacency, medoid) in built {
            graph.install_range(lo, adjacency);
            groups.set_medoid(gid, lo + medoid);
        }

        let root_medoid = Self::root_medoid(&storage, &groups, metric);
        {
            let root = groups.get_mut(0);
            root.medoid = root_medoid;
            root.entry_points = vec![root_medoid];
        }

        let lng = match params.scenario {
            BuildScenario::Equality => LabelNavGraph::default(),
            BuildScenario::General => {
                let lng = LabelNavGraph::build(&groups);
                let cross_params = CrossEdgeParams {
                    num_cross_edges: params.num_cross_edges,
                    l_build: params.l_build,
                    alpha: params.alpha,
                };
                plan_cross_edges(&mut graph, &storage, &groups, &lng, metric, &cross_params);
                lng
            }
        };

        tracing::info!(
            "built index: {} points, {} groups, {} edges in {:.3}s",
            storage.num_points(),
            groups.num_groups(),
            graph.num_edges(),
            start.elapsed().as_secs_f64()
        );
        Ok(Self {
            storage,
            metric,
            graph,
            groups,
            lng,
            new_to_old,
            build_scenario: params.scenario,
            max_degree: params.max_degree,
            num_cross_edges: params.num_cross_edges,
        })
    }

    /// Medoid of the virtual root: the group medoid closest to the
    /// centroid of all group medoids. Distance evaluations run in
    /// parallel; ties break toward the smaller id.
    fn root_medoid(storage: &Storage<T>, groups: &GroupTable, metric: DistanceMetric) -> IdxType {
        let dim = storage.dim() as usize;
        let medoids: Vec<IdxType> = groups.iter().map(|g| g.medoid).collect();
        let mut center = vec![0f32; dim];
        for &m in &medoids {
            for (c, v) in center.iter_mut().zip(storage.vector(m)) {
                *c += v.to_f32();
            }
        }
        for c in &mut center {
            *c /= medoids.len() as f32;
        }

        let (best, _) = medoids
            .par_iter()
            .map(|&m| (m, metric.compute_asym(&center, storage.vector(m))))
            .reduce(
                || (IdxType::MAX, f32::MAX),
                |a, b| {
                    if b.1 < a.1 || (b.1 == a.1 && b.0 < a.0) {
                        b
                    } else {
                        a
                    }
                },
            );
        best
    }

    /// Answers a batch of labeled queries, in parallel across queries.
    pub fn search(&self, queries: &Storage<T>, params: &SearchParams) -> Result<SearchOutput> {
        if queries.dim() != self.storage.dim() {
            return Err(Error::Data(format!(
                "query dimension {} != index dimension {}",
                queries.dim(),
                self.storage.dim()
            )));
        }
        if self.build_scenario == BuildScenario::Equality
            && params.scenario != QueryScenario::Equality
        {
            return Err(Error::Config(
                "index was built for equality only; rebuild with the general scenario \
                 to run containment or overlap queries"
                    .into(),
            ));
        }

        let pool = thread_pool(params.num_threads)?;
        let num_queries = queries.num_points();
        let per_query: Vec<(Vec<(IdxType, f32)>, usize)> = pool.install(|| {
            (0..num_queries)
                .into_par_iter()
                .map(|qi| self.search_one(queries, qi, params))
                .collect()
        });

        let mut output = SearchOutput::default();
        for (hits, cmps) in per_query {
            output.hits.push(hits);
            output.num_cmps.push(cmps);
        }
        Ok(output)
    }

    fn search_one(
        &self,
        queries: &Storage<T>,
        qi: IdxType,
        params: &SearchParams,
    ) -> (Vec<(IdxType, f32)>, usize) {
        let query_labels = queries.labels(qi);
        let entry_groups = self.select_entry_groups(query_labels, params.scenario);

        let mut seeds: Vec<IdxType> = Vec::new();
        for gid in entry_groups {
            let table = &self.groups.get(gid).entry_points;
            for &ep in table.iter().take(params.num_entry_points as usize) {
                if !seeds.contains(&ep) {
                    seeds.push(ep);
                }
            }
        }
        if seeds.is_empty() {
            return (Vec::new(), 0);
        }

        let filter =
            |id: IdxType| self.matches(params.scenario, query_labels, self.storage.labels(id));
        let options = BeamOptions {
            beam_width: (params.l_search as usize).max(params.k),
            intra_only: false,
            collect_visited: false,
        };
        let output = QUERY_VISITED.with(|cell| {
            let mut visited = cell.borrow_mut();
            visited.ensure_capacity(self.storage.num_points() as usize);
            beam_search(
                &self.graph,
                &self.storage,
                self.metric,
                queries.vector(qi),
                &seeds,
                &options,
                &filter,
                &mut visited,
            )
        });

        let hits = output
            .results
            .into_iter()
            .take(params.k)
            .map(|(dist, id)| (self.new_to_old[id as usize], dist))
            .collect();
        (hits, output.num_cmps)
    }

    #[inline]
    fn matches(&self, scenario: QueryScenario, query: &LabelSet, labels: &LabelSet) -> bool {
        match scenario {
            QueryScenario::Equality => labels == query,
            QueryScenario::Containment => query.is_subset_of(labels),
            QueryScenario::Overlap => labels.intersects(query),
        }
    }

    /// Entry groups for one query.
    ///
    /// Equality takes the unique exact-match group. Containment and
    /// overlap walk the LNG from the root, stopping at compatible groups
    /// (their descendants are reached through cross edges instead); for
    /// containment the result is additionally reduced to groups minimal
    /// under ⊆, since a compatible group can also be discovered through an
    /// incompatible parent.
    fn select_entry_groups(&self, query: &LabelSet, scenario: QueryScenario) -> Vec<GroupId> {
        if scenario == QueryScenario::Equality {
            return self.groups.find_exact(query).into_iter().collect();
        }

        let compatible = |gid: GroupId| {
            let set = &self.groups.get(gid).label_set;
            match scenario {
                QueryScenario::Containment => query.is_subset_of(set),
                QueryScenario::Overlap => set.intersects(query),
                QueryScenario::Equality => unreachable!(),
            }
        };

        let mut entries: Vec<GroupId> = Vec::new();
        let mut seen = vec![false; self.lng.num_nodes()];
        let mut queue: VecDeque<GroupId> = VecDeque::new();
        seen[0] = true;
        queue.extend(self.lng.children(0));
        for &g in self.lng.children(0) {
            seen[g as usize] = true;
        }

        while let Some(g) = queue.pop_front() {
            if entries.len() >= config::MAX_ENTRY_GROUPS {
                break;
            }
            if compatible(g) {
                entries.push(g);
                continue;
            }
            for &h in self.lng.children(g) {
                if !seen[h as usize] {
                    seen[h as usize] = true;
                    queue.push_back(h);
                }
            }
        }

        if scenario == QueryScenario::Containment {
            let sets: Vec<&LabelSet> =
                entries.iter().map(|&g| &self.groups.get(g).label_set).collect();
            let minimal: Vec<GroupId> = entries
                .iter()
                .enumerate()
                .filter(|&(i, _)| {
                    !sets
                        .iter()
                        .enumerate()
                        .any(|(j, other)| j != i && other.is_strict_subset_of(sets[i]))
                })
                .map(|(_, &g)| g)
                .collect();
            return minimal;
        }
        entries
    }

    /// Persists all artifacts under the prefix directory.
    pub fn save(&self, prefix: &Path) -> Result<()> {
        std::fs::create_dir_all(prefix)?;
        let meta = IndexMeta {
            format_version: config::FORMAT_VERSION,
            data_type: T::DATA_TYPE,
            metric: self.metric,
            num_points: self.storage.num_points(),
            dim: self.storage.dim(),
            max_degree: self.max_degree,
            num_cross_edges: self.num_cross_edges,
            build_scenario: self.build_scenario,
        };
        write_artifact(prefix, persistence::META_FILE, &meta)?;
        write_artifact(prefix, persistence::GRAPH_FILE, &self.graph)?;
        write_artifact(prefix, persistence::GROUPS_FILE, &self.groups)?;
        write_artifact(prefix, persistence::LNG_FILE, &self.lng)?;
        write_artifact(prefix, persistence::IDMAP_FILE, &self.new_to_old)?;

        // Reordered base vectors and labels in the raw load formats,
        // written through temp paths like every other artifact.
        let tmp_vec = prefix.join("vectors.bin.tmp");
        let tmp_labels = prefix.join("labels.txt.tmp");
        self.storage.write(&tmp_vec, &tmp_labels)?;
        std::fs::rename(&tmp_vec, prefix.join(persistence::VECTORS_FILE))?;
        std::fs::rename(&tmp_labels, prefix.join(persistence::LABELS_FILE))?;

        tracing::info!("saved index to {}", prefix.display());
        Ok(())
    }

    /// Restores an index saved by [`UngIndex::save`].
    pub fn load(prefix: &Path) -> Result<Self> {
        let meta = read_meta(prefix)?;
        if meta.data_type != T::DATA_TYPE {
            return Err(Error::Config(format!(
                "index at {} holds {} elements, requested {}",
                prefix.display(),
                meta.data_type,
                T::DATA_TYPE
            )));
        }

        let storage: Storage<T> = Storage::load(
            &prefix.join(persistence::VECTORS_FILE),
            &prefix.join(persistence::LABELS_FILE),
            IdxType::MAX,
        )?;
        let graph: UnifiedGraph = read_artifact(prefix, persistence::GRAPH_FILE)?;
        let groups: GroupTable = read_artifact(prefix, persistence::GROUPS_FILE)?;
        let lng: LabelNavGraph = read_artifact(prefix, persistence::LNG_FILE)?;
        let new_to_old: Vec<IdxType> = read_artifact(prefix, persistence::IDMAP_FILE)?;

        let index = Self {
            storage,
            metric: meta.metric,
            graph,
            groups,
            lng,
            new_to_old,
            build_scenario: meta.build_scenario,
            max_degree: meta.max_degree,
            num_cross_edges: meta.num_cross_edges,
        };
        index.validate(&meta)?;
        tracing::info!(
            "loaded index from {} ({} points, {} groups)",
            prefix.display(),
            index.storage.num_points(),
            index.groups.num_groups()
        );
        Ok(index)
    }

    /// Consistency checks after deserialization.
    fn validate(&self, meta: &IndexMeta) -> Result<()> {
        let n = self.storage.num_points();
        if n != meta.num_points || self.storage.dim() != meta.dim {
            return Err(Error::Data(format!(
                "storage shape {}x{} does not match meta {}x{}",
                n,
                self.storage.dim(),
                meta.num_points,
                meta.dim
            )));
        }
        if self.graph.num_vertices() != n {
            return Err(Error::Data(format!(
                "graph has {} vertices for {} points",
                self.graph.num_vertices(),
                n
            )));
        }
        if self.new_to_old.len() != n as usize {
            return Err(Error::Data("id map length mismatch".into()));
        }

        // Group ranges must partition [0, n) in order.
        let mut expected_lo = 0;
        for group in self.groups.iter() {
            if group.lo != expected_lo || group.hi < group.lo {
                return Err(Error::Data(format!(
                    "group {} range [{}, {}) is not contiguous",
                    group.id, group.lo, group.hi
                )));
            }
            expected_lo = group.hi;
            if group.size() > 0 && !group.contains_id(group.medoid) {
                return Err(Error::Data(format!(
                    "group {} medoid {} outside its range",
                    group.id, group.medoid
                )));
            }
            for v in group.lo..group.hi {
                for &u in self.graph.intra_neighbors(v) {
                    if !group.contains_id(u) {
                        return Err(Error::Data(format!(
                            "intra edge {v} → {u} escapes group {}",
                            group.id
                        )));
                    }
                }
            }
        }
        if expected_lo != n {
            return Err(Error::Data(format!(
                "groups cover [0, {expected_lo}) but storage has {n} points"
            )));
        }

        if self.build_scenario == BuildScenario::General {
            if self.lng.num_nodes() != self.groups.num_groups() + 1 {
                return Err(Error::Data("label navigating graph node count mismatch".into()));
            }
            if self.lng.reachable_from_root().len() != self.groups.num_groups() {
                return Err(Error::Data(
                    "label navigating graph root does not reach every group".into(),
                ));
            }
        }
        Ok(())
    }

    pub fn metric(&self) -> DistanceMetric {
        self.metric
    }

    pub fn num_points(&self) -> IdxType {
        self.storage.num_points()
    }

    pub fn graph(&self) -> &UnifiedGraph {
        &self.graph
    }

    pub fn groups(&self) -> &GroupTable {
        &self.groups
    }

    pub fn lng(&self) -> &LabelNavGraph {
        &self.lng
    }

    pub fn new_to_old(&self) -> &[IdxType] {
        &self.new_to_old
    }
}

/// Non-generic façade over the three element instantiations.
#[derive(Debug)]
pub enum UniNavGraph {
    Float32(UngIndex<f32>),
    Int8(UngIndex<i8>),
    UInt8(UngIndex<u8>),
}

impl UniNavGraph {
    /// Builds an index of the storage's element type.
    pub fn build(storage: AnyStorage, metric: DistanceMetric, params: &BuildParams) -> Result<Self> {
        match storage {
            AnyStorage::Float32(s) => UngIndex::build(s, metric, params).map(Self::Float32),
            AnyStorage::Int8(s) => UngIndex::build(s, metric, params).map(Self::Int8),
            AnyStorage::UInt8(s) => UngIndex::build(s, metric, params).map(Self::UInt8),
        }
    }

    /// Runs a query batch; the query storage must match the index element
    /// type.
    pub fn search(&self, queries: &AnyStorage, params: &SearchParams) -> Result<SearchOutput> {
        match (self, queries) {
            (Self::Float32(index), AnyStorage::Float32(q)) => index.search(q, params),
            (Self::Int8(index), AnyStorage::Int8(q)) => index.search(q, params),
            (Self::UInt8(index), AnyStorage::UInt8(q)) => index.search(q, params),
            _ => Err(Error::Config(format!(
                "query element type {} does not match index element type {}",
                queries.data_type(),
                self.data_type()
            ))),
        }
    }

    pub fn save(&self, prefix: &Path) -> Result<()> {
        match self {
            Self::Float32(index) => index.save(prefix),
            Self::Int8(index) => index.save(prefix),
            Self::UInt8(index) => index.save(prefix),
        }
    }

    /// Loads a saved index, checking the requested element type against
    /// the stored tag.
    pub fn load(prefix: &Path, data_type: DataType) -> Result<Self> {
        let meta = read_meta(prefix)?;
        if meta.data_type != data_type {
            return Err(Error::Config(format!(
                "index at {} holds {} elements, requested {}",
                prefix.display(),
                meta.data_type,
                data_type
            )));
        }
        match data_type {
            DataType::Float32 => UngIndex::load(prefix).map(Self::Float32),
            DataType::Int8 => UngIndex::load(prefix).map(Self::Int8),
            DataType::UInt8 => UngIndex::load(prefix).map(Self::UInt8),
        }
    }

    pub fn data_type(&self) -> DataType {
        match self {
            Self::Float32(_) => DataType::Float32,
            Self::Int8(_) => DataType::Int8,
            Self::UInt8(_) => DataType::UInt8,
        }
    }

    pub fn num_points(&self) -> IdxType {
        match self {
            Self::Float32(index) => index.num_points(),
            Self::Int8(index) => index.num_points(),
            Self::UInt8(index) => index.num_points(),
        }
    }
}

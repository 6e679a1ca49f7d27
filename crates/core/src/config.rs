//! Global configuration constants for uninav-core.
//!
//! All build and search defaults live here as compile-time constants.
//! Per-call overrides go through [`BuildParams`](crate::index::BuildParams)
//! and [`SearchParams`](crate::index::SearchParams).

/// Default maximum out-degree (R) of the intra-group Vamana graphs.
///
/// Higher values improve recall but increase memory and build time.
/// Typical range: 16–64.
pub const DEFAULT_MAX_DEGREE: u32 = 32;

/// Default candidate list size during graph construction (L_build).
///
/// Controls the beam width of the greedy searches used to collect prune
/// candidates. Must be ≥ the max degree to be effective.
pub const DEFAULT_L_BUILD: u32 = 100;

/// Default pruning parameter alpha.
///
/// 1.0 keeps only the shortest non-dominated edges; larger values retain
/// longer edges, reducing hop count at the cost of degree utilization.
pub const DEFAULT_ALPHA: f32 = 1.2;

/// Default candidate list size during search (L_search).
pub const DEFAULT_L_SEARCH: u32 = 100;

/// Default number of cross edges planned per (group, child-group) pair.
pub const DEFAULT_NUM_CROSS_EDGES: u32 = 6;

/// Default number of seeds taken from each entry group at query time.
pub const DEFAULT_NUM_ENTRY_POINTS: u32 = 16;

/// Number of entry-point candidates recorded per group at build time.
///
/// The table always starts with the group medoid; the remainder are evenly
/// strided in-group points. Search takes a prefix of this table.
pub const ENTRY_TABLE_SIZE: usize = 16;

/// Cap on the number of entry groups a single query may select from the
/// label navigating graph.
pub const MAX_ENTRY_GROUPS: usize = 64;

/// Number of refinement passes over the point permutation in Vamana build.
pub const VAMANA_BUILD_PASSES: usize = 2;

/// Label assigned to every point when the label file is absent
/// (degrades to unfiltered ANNS).
pub const UNLABELED_LABEL: u32 = 1;

/// On-disk format version recorded in the index meta artifact.
pub const FORMAT_VERSION: u32 = 1;

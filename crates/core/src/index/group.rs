//! Label-set groups and the permutation that makes them contiguous.
//!
//! Points sharing an identical label set form one group; after the
//! new-to-old permutation is applied to storage, each group occupies one
//! contiguous id range. Group ids are 1-based; id 0 is the synthetic root
//! with the empty label set and no id range, attached to the label
//! navigating graph as the ancestor of all minimal groups.

use crate::config;
use crate::error::{Error, Result};
use crate::labels::LabelSet;
use crate::IdxType;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 1-based group identifier; 0 is the synthetic root.
pub type GroupId = u32;

/// One maximal contiguous run of points sharing a label set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: GroupId,
    /// Start of the id range (inclusive).
    pub lo: IdxType,
    /// End of the id range (exclusive). The root has `lo == hi == 0`.
    pub hi: IdxType,
    pub label_set: LabelSet,
    /// Global id of the in-group point closest to the group centroid.
    /// For the root: the group medoid closest to the centroid of all
    /// group medoids.
    pub medoid: IdxType,
    /// Ordered entry-point candidates; the medoid always comes first.
    pub entry_points: Vec<IdxType>,
}

impl Group {
    pub fn size(&self) -> IdxType {
        self.hi - self.lo
    }

    pub fn contains_id(&self, id: IdxType) -> bool {
        self.lo <= id && id < self.hi
    }
}

/// All groups of an index, root included, ordered by ascending label set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupTable {
    groups: Vec<Group>,
}

impl GroupTable {
    /// Partitions points by label set.
    ///
    /// Returns the table (group ranges refer to post-permutation ids,
    /// medoids and entry tables still unset) and the new-to-old
    /// permutation to apply to storage.
    pub fn from_label_sets(label_sets: &[LabelSet]) -> (GroupTable, Vec<IdxType>) {
        let mut buckets: BTreeMap<&LabelSet, Vec<IdxType>> = BTreeMap::new();
        for (id, set) in label_sets.iter().enumerate() {
            buckets.entry(set).or_default().push(id as IdxType);
        }

        let mut groups = vec![Group {
            id: 0,
            lo: 0,
            hi: 0,
            label_set: LabelSet::default(),
            medoid: 0,
            entry_points: Vec::new(),
        }];
        let mut new_to_old = Vec::with_capacity(label_sets.len());
        for (set, old_ids) in buckets {
            let lo = new_to_old.len() as IdxType;
            new_to_old.extend_from_slice(&old_ids);
            let hi = new_to_old.len() as IdxType;
            groups.push(Group {
                id: groups.len() as GroupId,
                lo,
                hi,
                label_set: set.clone(),
                medoid: lo,
                entry_points: Vec::new(),
            });
        }
        tracing::info!(
            "partitioned {} points into {} label-set groups",
            label_sets.len(),
            groups.len() - 1
        );
        (GroupTable { groups }, new_to_old)
    }

    /// Number of real groups (root excluded).
    pub fn num_groups(&self) -> usize {
        self.groups.len() - 1
    }

    pub fn get(&self, id: GroupId) -> &Group {
        &self.groups[id as usize]
    }

    pub fn root(&self) -> &Group {
        &self.groups[0]
    }

    pub(crate) fn get_mut(&mut self, id: GroupId) -> &mut Group {
        &mut self.groups[id as usize]
    }

    /// Real groups in table order (root excluded).
    pub fn iter(&self) -> impl Iterator<Item = &Group> {
        self.groups.iter().skip(1)
    }

    /// Group ids 1..=num_groups.
    pub fn ids(&self) -> impl Iterator<Item = GroupId> {
        1..self.groups.len() as GroupId
    }

    /// The group whose label set equals `query`, if present. O(log G):
    /// real groups are ordered by label set.
    pub fn find_exact(&self, query: &LabelSet) -> Option<GroupId> {
        let real = &self.groups[1..];
        real.binary_search_by(|g| g.label_set.cmp(query))
            .ok()
            .map(|pos| (pos + 1) as GroupId)
    }

    /// The group owning a point id. O(log G) over the sorted ranges.
    pub fn group_of(&self, id: IdxType) -> Result<GroupId> {
        let real = &self.groups[1..];
        let pos = real.partition_point(|g| g.hi <= id);
        if pos < real.len() && real[pos].contains_id(id) {
            Ok((pos + 1) as GroupId)
        } else {
            Err(Error::Internal(format!("point {id} outside every group")))
        }
    }

    /// Records a group's medoid and derives its entry-point table: the
    /// medoid first, then evenly strided in-group points.
    pub(crate) fn set_medoid(&mut self, id: GroupId, medoid: IdxType) {
        let group = &mut self.groups[id as usize];
        debug_assert!(group.contains_id(medoid));
        group.medoid = medoid;

        let size = group.size() as usize;
        let want = config::ENTRY_TABLE_SIZE.min(size);
        let mut entry_points = vec![medoid];
        if want > 1 {
            let stride = (size / want).max(1);
            let mut candidate = group.lo;
            while entry_points.len() < want && candidate < group.hi {
                if candidate != medoid {
                    entry_points.push(candidate);
                }
                candidate += stride as IdxType;
            }
        }
        group.entry_points = entry_points;
    }
}

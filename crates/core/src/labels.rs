//! Sorted label sets and the predicates evaluated over them.
//!
//! Every point carries a [`LabelSet`]: a sorted, deduplicated sequence of
//! 32-bit label ids. Equality, subset, and overlap tests are merge-style
//! passes over the sorted sequences, so all predicates run in
//! O(|a| + |b|) without allocation.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Identifier of a single discrete label.
pub type LabelId = u32;

/// A sorted, deduplicated set of labels attached to one point (or query).
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LabelSet(Vec<LabelId>);

impl LabelSet {
    /// Builds a label set from arbitrary label ids, sorting and deduplicating.
    pub fn new(mut labels: Vec<LabelId>) -> Self {
        labels.sort_unstable();
        labels.dedup();
        Self(labels)
    }

    /// Parses one line of a label file: comma-separated non-negative
    /// integers. An empty line yields the empty set.
    pub fn parse_line(line: &str) -> Result<Self> {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.is_empty() {
            return Ok(Self::default());
        }
        let mut labels = Vec::new();
        for token in line.split(',') {
            let token = token.trim();
            let label: LabelId = token
                .parse()
                .map_err(|_| Error::Format(format!("invalid label token '{token}'")))?;
            labels.push(label);
        }
        Ok(Self::new(labels))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[LabelId] {
        &self.0
    }

    pub fn contains(&self, label: LabelId) -> bool {
        self.0.binary_search(&label).is_ok()
    }

    /// Subset test (`self ⊆ other`) via a single merge pass.
    pub fn is_subset_of(&self, other: &LabelSet) -> bool {
        let (a, b) = (&self.0, &other.0);
        if a.len() > b.len() {
            return false;
        }
        let mut j = 0;
        for &label in a {
            while j < b.len() && b[j] < label {
                j += 1;
            }
            if j == b.len() || b[j] != label {
                return false;
            }
            j += 1;
        }
        true
    }

    /// Strict subset test (`self ⊊ other`).
    pub fn is_strict_subset_of(&self, other: &LabelSet) -> bool {
        self.0.len() < other.0.len() && self.is_subset_of(other)
    }

    /// Non-empty intersection test via a single merge pass.
    pub fn intersects(&self, other: &LabelSet) -> bool {
        let (a, b) = (&self.0, &other.0);
        let (mut i, mut j) = (0, 0);
        while i < a.len() && j < b.len() {
            match a[i].cmp(&b[j]) {
                std::cmp::Ordering::Less => i += 1,
                std::cmp::Ordering::Greater => j += 1,
                std::cmp::Ordering::Equal => return true,
            }
        }
        false
    }
}

impl From<Vec<LabelId>> for LabelSet {
    fn from(labels: Vec<LabelId>) -> Self {
        Self::new(labels)
    }
}

impl std::fmt::Display for LabelSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut first = true;
        for label in &self.0 {
            if !first {
                write!(f, ",")?;
            }
            write!(f, "{label}")?;
            first = false;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_sorts_and_dedups() {
        let set = LabelSet::new(vec![5, 1, 3, 1, 5]);
        assert_eq!(set.as_slice(), &[1, 3, 5]);
    }

    #[test]
    fn test_parse_line() {
        let set = LabelSet::parse_line("3,1,2").unwrap();
        assert_eq!(set.as_slice(), &[1, 2, 3]);
    }

    #[test]
    fn test_parse_empty_line() {
        assert!(LabelSet::parse_line("").unwrap().is_empty());
        assert!(LabelSet::parse_line("\n").unwrap().is_empty());
    }

    #[test]
    fn test_parse_rejects_bad_token() {
        let err = LabelSet::parse_line("1,x,3").unwrap_err();
        assert!(matches!(err, Error::Format(_)));
        assert!(LabelSet::parse_line("1,-2").is_err());
    }

    #[test]
    fn test_parse_tolerates_trailing_newline() {
        let set = LabelSet::parse_line("7,9\n").unwrap();
        assert_eq!(set.as_slice(), &[7, 9]);
    }

    #[test]
    fn test_subset() {
        let a = LabelSet::new(vec![1, 3]);
        let b = LabelSet::new(vec![1, 2, 3]);
        assert!(a.is_subset_of(&b));
        assert!(!b.is_subset_of(&a));
        assert!(a.is_subset_of(&a));
        assert!(a.is_strict_subset_of(&b));
        assert!(!a.is_strict_subset_of(&a));
        assert!(LabelSet::default().is_subset_of(&a));
    }

    #[test]
    fn test_intersects() {
        let a = LabelSet::new(vec![1, 5, 9]);
        let b = LabelSet::new(vec![2, 5]);
        let c = LabelSet::new(vec![2, 4]);
        assert!(a.intersects(&b));
        assert!(!a.intersects(&c));
        assert!(!a.intersects(&LabelSet::default()));
    }

    #[test]
    fn test_contains() {
        let a = LabelSet::new(vec![2, 4, 8]);
        assert!(a.contains(4));
        assert!(!a.contains(3));
    }

    #[test]
    fn test_display_roundtrip() {
        let a = LabelSet::new(vec![4, 2, 7]);
        let line = a.to_string();
        assert_eq!(LabelSet::parse_line(&line).unwrap(), a);
    }
}

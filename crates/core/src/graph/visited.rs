//! Generation-stamped visited set for graph traversals.
//!
//! A `HashSet<u32>` would allocate and hash on every probe; this keeps one
//! stamp per vertex and bumps a generation counter on `clear`, so resets
//! are O(1) and probes are a single array access. Workers reuse one
//! instance across queries.

/// Visited marker backed by per-vertex generation stamps.
#[derive(Debug)]
pub struct VisitedSet {
    stamps: Vec<u32>,
    generation: u32,
}

impl VisitedSet {
    pub fn new(capacity: usize) -> Self {
        Self {
            stamps: vec![0; capacity],
            generation: 1,
        }
    }

    /// Resets the set. The stamp array is only rewritten when the
    /// generation counter wraps.
    pub fn clear(&mut self) {
        if self.generation == u32::MAX {
            self.stamps.fill(0);
            self.generation = 1;
        } else {
            self.generation += 1;
        }
    }

    /// Grows the stamp array to cover at least `cap` vertices.
    pub fn ensure_capacity(&mut self, cap: usize) {
        if cap > self.stamps.len() {
            self.stamps.resize(cap, 0);
        }
    }

    /// Marks `id` visited. Returns `true` if it was not already marked.
    #[inline]
    pub fn insert(&mut self, id: u32) -> bool {
        let stamp = &mut self.stamps[id as usize];
        if *stamp == self.generation {
            false
        } else {
            *stamp = self.generation;
            true
        }
    }

    /// Whether `id` is marked in the current generation.
    #[inline]
    pub fn contains(&self, id: u32) -> bool {
        self.stamps[id as usize] == self.generation
    }
}

impl Default for VisitedSet {
    fn default() -> Self {
        Self::new(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_clear() {
        let mut visited = VisitedSet::new(16);
        assert!(visited.insert(3));
        assert!(!visited.insert(3));
        assert!(visited.contains(3));
        assert!(!visited.contains(4));

        visited.clear();
        assert!(!visited.contains(3));
        assert!(visited.insert(3));
    }

    #[test]
    fn test_ensure_capacity_grows() {
        let mut visited = VisitedSet::new(2);
        visited.ensure_capacity(10);
        assert!(visited.insert(9));
    }

    #[test]
    fn test_generation_wrap_resets_stamps() {
        let mut visited = VisitedSet::new(4);
        visited.generation = u32::MAX - 1;
        visited.clear();
        assert_eq!(visited.generation, u32::MAX);
        visited.insert(1);

        visited.clear();
        assert_eq!(visited.generation, 1);
        assert!(visited.insert(1));
    }
}

use core::fmt;

/// A sorted set of half-open index intervals.
///
/// Invariant: the stored intervals are pairwise disjoint and never adjacent;
/// `add` and `remove` merge or split endpoints accordingly.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Intervals {
    spans: Vec<(usize, usize)>,
}

impl Intervals {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if no index is contained.
    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    /// The stored intervals in ascending order.
    pub fn spans(&self) -> &[(usize, usize)] {
        &self.spans
    }

    /// Adds `[from, to)` to the set.
    pub fn add(&mut self, from: usize, to: usize) {
        if from >= to {
            return;
        }

        // first span that could overlap or touch the new one
        let start = self.spans.partition_point(|&(_, e)| e < from);

        // last span overlapping or touching
        let end = self.spans.partition_point(|&(s, _)| s <= to);

        let merged = (
            self.spans[start..end]
                .first()
                .map_or(from, |&(s, _)| s.min(from)),
            self.spans[start..end]
                .last()
                .map_or(to, |&(_, e)| e.max(to)),
        );

        self.spans.splice(start..end, [merged]);
    }

    /// Removes `[from, to)` from the set.
    pub fn remove(&mut self, from: usize, to: usize) {
        if from >= to || self.spans.is_empty() {
            return;
        }

        let start = self.spans.partition_point(|&(_, e)| e <= from);
        let end = self.spans.partition_point(|&(s, _)| s < to);

        let mut replacement = Vec::new();

        if let Some(&(s, _)) = self.spans[start..end].first() {
            if s < from {
                replacement.push((s, from));
            }
        }

        if let Some(&(_, e)) = self.spans[start..end].last() {
            if to < e {
                replacement.push((to, e));
            }
        }

        self.spans.splice(start..end, replacement);
    }

    /// Returns `true` if `idx` is contained.
    pub fn covers(&self, idx: usize) -> bool {
        let pos = self.spans.partition_point(|&(_, e)| e <= idx);

        self.spans.get(pos).is_some_and(|&(s, _)| s <= idx)
    }

    /// Returns `true` if every index of `[from, to)` is contained.
    pub fn covers_all(&self, from: usize, to: usize) -> bool {
        if from >= to {
            return true;
        }

        let pos = self.spans.partition_point(|&(_, e)| e <= from);

        self.spans
            .get(pos)
            .is_some_and(|&(s, e)| s <= from && to <= e)
    }

    /// Returns `true` if any index of `[from, to)` is contained.
    pub fn covers_any(&self, from: usize, to: usize) -> bool {
        if from >= to {
            return false;
        }

        let pos = self.spans.partition_point(|&(_, e)| e <= from);

        self.spans.get(pos).is_some_and(|&(s, _)| s < to)
    }
}

impl fmt::Debug for Intervals {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;

        for (i, (s, e)) in self.spans.iter().enumerate() {
            if i != 0 {
                write!(f, ",")?;
            }

            write!(f, "[{s}-{e})")?;
        }

        write!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disjoint_adds_stay_separate() {
        let mut set = Intervals::new();

        set.add(0, 2);
        set.add(4, 6);

        assert_eq!(set.spans(), &[(0, 2), (4, 6)]);
        assert!(set.covers(1));
        assert!(!set.covers(2));
        assert!(!set.covers(3));
        assert!(set.covers(4));
    }

    #[test]
    fn adjacent_adds_merge() {
        let mut set = Intervals::new();

        set.add(0, 2);
        set.add(2, 4);

        assert_eq!(set.spans(), &[(0, 4)]);

        set.add(6, 8);
        set.add(4, 6);

        assert_eq!(set.spans(), &[(0, 8)]);
    }

    #[test]
    fn overlapping_adds_merge() {
        let mut set = Intervals::new();

        set.add(0, 5);
        set.add(3, 9);
        set.add(20, 30);
        set.add(8, 21);

        assert_eq!(set.spans(), &[(0, 30)]);
    }

    #[test]
    fn removal_splits_intervals() {
        let mut set = Intervals::new();

        set.add(0, 10);
        set.remove(3, 6);

        assert_eq!(set.spans(), &[(0, 3), (6, 10)]);

        set.remove(0, 3);

        assert_eq!(set.spans(), &[(6, 10)]);

        set.remove(5, 20);

        assert!(set.is_empty());
    }

    #[test]
    fn removal_trims_boundaries() {
        let mut set = Intervals::new();

        set.add(2, 8);
        set.remove(0, 4);

        assert_eq!(set.spans(), &[(4, 8)]);

        set.remove(6, 12);

        assert_eq!(set.spans(), &[(4, 6)]);
    }

    #[test]
    fn coverage_queries() {
        let mut set = Intervals::new();

        set.add(2, 5);
        set.add(8, 10);

        assert!(set.covers_all(2, 5));
        assert!(set.covers_all(3, 4));
        assert!(!set.covers_all(2, 6));
        assert!(!set.covers_all(5, 8));

        assert!(set.covers_any(4, 9));
        assert!(set.covers_any(0, 3));
        assert!(!set.covers_any(5, 8));
        assert!(!set.covers_any(10, 20));

        assert!(set.covers_all(7, 7));
        assert!(!set.covers_any(7, 7));
    }
}

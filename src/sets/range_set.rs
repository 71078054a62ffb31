/*
 * SPDX-FileCopyrightText: 2026 The filigree authors
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! A set of `u64`s kept as sorted, non-overlapping half-open ranges.
//!
//! Cheap for the clustered id sets that come out of graph walks; set
//! algebra merges range lists pairwise.

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SimpleRangeSet {
    ranges: Vec<(u64, u64)>,
}

impl SimpleRangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_range(begin: u64, end: u64) -> Self {
        SimpleRangeSet {
            ranges: if begin < end { vec![(begin, end)] } else { Vec::new() },
        }
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Number of elements.
    pub fn size(&self) -> u64 {
        self.ranges.iter().map(|(b, e)| e - b).sum()
    }

    /// Number of ranges.
    pub fn count(&self) -> usize {
        self.ranges.len()
    }

    pub fn range(&self, idx: usize) -> (u64, u64) {
        self.ranges[idx]
    }

    pub fn contains(&self, elem: u64) -> bool {
        match self.ranges.binary_search_by(|&(b, _)| b.cmp(&elem)) {
            Ok(_) => true,
            Err(0) => false,
            Err(i) => elem < self.ranges[i - 1].1,
        }
    }

    pub fn insert(&mut self, elem: u64) {
        // First range whose end reaches elem.
        let i = self.ranges.partition_point(|&(_, e)| e < elem);
        if i < self.ranges.len() && self.ranges[i].0 <= elem && elem < self.ranges[i].1 {
            return; // already present
        }
        let extends_left = i < self.ranges.len() && self.ranges[i].1 == elem;
        let j = if extends_left { i + 1 } else { i };
        let extends_right = j < self.ranges.len() && self.ranges[j].0 == elem + 1;
        match (extends_left, extends_right) {
            (true, true) => {
                // The element bridges two ranges.
                self.ranges[i].1 = self.ranges[j].1;
                self.ranges.remove(j);
            }
            (true, false) => self.ranges[i].1 += 1,
            (false, true) => self.ranges[j].0 = elem,
            (false, false) => self.ranges.insert(i, (elem, elem + 1)),
        }
    }

    pub fn clear(&mut self) {
        self.ranges.clear();
    }

    /// Union.
    pub fn merge(&mut self, rhs: &SimpleRangeSet) {
        let mut out: Vec<(u64, u64)> = Vec::with_capacity(self.ranges.len() + rhs.ranges.len());
        let mut l = self.ranges.iter().copied().peekable();
        let mut r = rhs.ranges.iter().copied().peekable();
        loop {
            let next = match (l.peek(), r.peek()) {
                (Some(&a), Some(&b)) => {
                    if a.0 <= b.0 {
                        l.next();
                        a
                    } else {
                        r.next();
                        b
                    }
                }
                (Some(&a), None) => {
                    l.next();
                    a
                }
                (None, Some(&b)) => {
                    r.next();
                    b
                }
                (None, None) => break,
            };
            match out.last_mut() {
                Some(last) if next.0 <= last.1 => last.1 = last.1.max(next.1),
                _ => out.push(next),
            }
        }
        self.ranges = out;
    }

    pub fn iter(&self) -> impl Iterator<Item = u64> + '_ {
        self.ranges.iter().flat_map(|&(b, e)| b..e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inserts_coalesce() {
        let mut s = SimpleRangeSet::new();
        for x in [5u64, 3, 4, 10, 11, 9, 6] {
            s.insert(x);
        }
        assert_eq!(s.count(), 2);
        assert_eq!(s.range(0), (3, 7));
        assert_eq!(s.range(1), (9, 12));
        assert_eq!(s.size(), 7);
        assert!(s.contains(5));
        assert!(!s.contains(8));
        assert!(!s.contains(12));
    }

    #[test]
    fn bridge_insert_fuses_ranges() {
        let mut s = SimpleRangeSet::new();
        s.insert(1);
        s.insert(3);
        assert_eq!(s.count(), 2);
        s.insert(2);
        assert_eq!(s.count(), 1);
        assert_eq!(s.range(0), (1, 4));
    }

    #[test]
    fn union_matches_elementwise() {
        let mut a = SimpleRangeSet::from_range(0, 10);
        let b = SimpleRangeSet::from_range(5, 20);
        a.merge(&b);
        assert_eq!(a.count(), 1);
        assert_eq!(a.range(0), (0, 20));

        let mut c = SimpleRangeSet::from_range(0, 3);
        c.merge(&SimpleRangeSet::from_range(7, 9));
        assert_eq!(c.iter().collect::<Vec<_>>(), vec![0, 1, 2, 7, 8]);
    }

    #[test]
    fn duplicate_insert_is_noop() {
        let mut s = SimpleRangeSet::from_range(2, 6);
        s.insert(4);
        assert_eq!(s.count(), 1);
        assert_eq!(s.size(), 4);
    }
}

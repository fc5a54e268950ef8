/*
    Copyright © 2025, Lux Industries Inc.
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Compact tracking of which heights have been fetched during bootstrap.

use std::collections::BTreeMap;

use crate::types::basic::Height;

/// A set of heights stored as disjoint closed intervals.
///
/// Adjacent and overlapping intervals merge on insertion, so a mostly-contiguous
/// bootstrap keeps the map at a handful of entries. Intervals are keyed by their low
/// end.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IntervalTree {
    ranges: BTreeMap<u64, u64>,
}

impl IntervalTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts one height, merging with neighbors where they touch.
    pub fn add(&mut self, height: Height) {
        self.add_range(height, height);
    }

    /// Inserts the closed interval `[lo, hi]`.
    pub fn add_range(&mut self, lo: Height, hi: Height) {
        let (mut lo, mut hi) = (lo.int(), hi.int());
        if lo > hi {
            std::mem::swap(&mut lo, &mut hi);
        }

        // Absorb the interval starting at or before `lo` if it reaches us.
        if let Some((&plo, &phi)) = self.ranges.range(..=lo).next_back() {
            if phi.saturating_add(1) >= lo {
                lo = plo;
                hi = hi.max(phi);
                self.ranges.remove(&plo);
            }
        }
        // Absorb every interval that starts inside or immediately after `[lo, hi]`.
        loop {
            let next = self
                .ranges
                .range(lo..)
                .next()
                .map(|(&nlo, &nhi)| (nlo, nhi));
            match next {
                Some((nlo, nhi)) if nlo <= hi.saturating_add(1) => {
                    hi = hi.max(nhi);
                    self.ranges.remove(&nlo);
                }
                _ => break,
            }
        }
        self.ranges.insert(lo, hi);
    }

    pub fn contains(&self, height: Height) -> bool {
        let h = height.int();
        self.ranges
            .range(..=h)
            .next_back()
            .map(|(_, &hi)| h <= hi)
            .unwrap_or(false)
    }

    /// The gaps in `[0, max]` not yet covered, as closed intervals.
    pub fn missing_ranges(&self, max: Height) -> Vec<(Height, Height)> {
        let max = max.int();
        let mut missing = Vec::new();
        let mut cursor = 0u64;
        for (&lo, &hi) in &self.ranges {
            if lo > max {
                break;
            }
            if lo > cursor {
                missing.push((Height::new(cursor), Height::new(lo - 1)));
            }
            cursor = cursor.max(hi.saturating_add(1));
        }
        if cursor <= max {
            missing.push((Height::new(cursor), Height::new(max)));
        }
        missing
    }

    /// The number of disjoint intervals currently stored.
    pub fn span_count(&self) -> usize {
        self.ranges.len()
    }

    /// Total heights covered.
    pub fn covered(&self) -> u64 {
        self.ranges.iter().map(|(&lo, &hi)| hi - lo + 1).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// The disjoint intervals in ascending order.
    pub fn spans(&self) -> Vec<(Height, Height)> {
        self.ranges
            .iter()
            .map(|(&lo, &hi)| (Height::new(lo), Height::new(hi)))
            .collect()
    }
}

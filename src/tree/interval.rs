//! The interval-tree variant shared by `IntInterval` and `TimeInterval`
//! (spec §3, §4.F: "shared logic for int and time variants, distinguished
//! only by which unit their bounds are measured in").
//!
//! `put` uses an overlap-chop policy (spec §4.F, redesign flag): a newer
//! write clips or fully replaces whatever older interval(s) it overlaps,
//! so the tree never holds two entries covering the same point. Grounded
//! on the "coalesce adjacent, clip overlapping" style of
//! `jj-lib/src/default_index/composite.rs`'s position-range bookkeeping,
//! adapted from position ranges to valued intervals.

use crate::error::Result;
use crate::tokenize::Value;

use super::{Diff, Patch, TreeKey};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct IntervalTree {
    /// Sorted by `begin`, pairwise non-overlapping; maintained by `put`.
    entries: Vec<(i64, i64, Value)>,
}

impl IntervalTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get_exact(&self, begin: i64, end: i64) -> Option<&Value> {
        self.entries.iter().find(|(b, e, _)| *b == begin && *e == end).map(|(_, _, v)| v)
    }

    /// The value covering point `x`, if any. Non-overlap is an invariant
    /// maintained by `put`, so at most one entry can match.
    pub fn get_point(&self, x: i64) -> Option<&Value> {
        self.entries.iter().find(|(b, e, _)| *b <= x && x < *e).map(|(_, _, v)| v)
    }

    /// All entries intersecting `[begin, end)`, clipped to that window.
    pub fn get_range(&self, begin: i64, end: i64) -> Vec<(i64, i64, Value)> {
        self.entries
            .iter()
            .filter(|(b, e, _)| *b < end && begin < *e)
            .map(|(b, e, v)| ((*b).max(begin), (*e).min(end), v.clone()))
            .collect()
    }

    pub fn iter_items(&self) -> impl Iterator<Item = (i64, i64, &Value)> {
        self.entries.iter().map(|(b, e, v)| (*b, *e, v))
    }

    /// Clips or removes every entry overlapping `[begin, end)`, then
    /// inserts `(begin, end, value)`, keeping entries sorted and disjoint.
    pub fn put(&mut self, begin: i64, end: i64, value: Value) {
        let mut kept = Vec::with_capacity(self.entries.len() + 1);
        for (b, e, v) in std::mem::take(&mut self.entries) {
            if e <= begin || end <= b {
                // No overlap.
                kept.push((b, e, v));
                continue;
            }
            if b < begin {
                kept.push((b, begin, v.clone()));
            }
            if end < e {
                kept.push((end, e, v));
            }
            // Fully or partially overlapping middle section is dropped;
            // the new entry below replaces it.
        }
        kept.push((begin, end, value));
        kept.sort_by_key(|(b, _, _)| *b);
        self.entries = kept;
    }

    pub fn delete_exact(&mut self, begin: i64, end: i64) -> Option<Value> {
        let pos = self.entries.iter().position(|(b, e, _)| *b == begin && *e == end)?;
        Some(self.entries.remove(pos).2)
    }

    fn boundary_points(&self, other: &IntervalTree) -> Vec<i64> {
        let mut points: Vec<i64> =
            self.entries.iter().flat_map(|(b, e, _)| [*b, *e]).chain(other.entries.iter().flat_map(|(b, e, _)| [*b, *e])).collect();
        points.sort_unstable();
        points.dedup();
        points
    }

    /// Splits both trees along the union of their boundary points, then
    /// merges consecutive segments that carry the same patch into one
    /// range, so a diff over many touching sub-intervals collapses back
    /// down to the minimal set of changed ranges.
    pub fn diff(&self, other: &IntervalTree) -> Diff {
        let points = self.boundary_points(other);
        let mut raw = vec![];
        for window in points.windows(2) {
            let (lo, hi) = (window[0], window[1]);
            let old = self.get_point(lo);
            let new = other.get_point(lo);
            let patch = match (old, new) {
                (None, None) => None,
                (None, Some(new)) => Some(Patch::Insert { new: new.clone() }),
                (Some(old), None) => Some(Patch::Delete { old: old.clone() }),
                (Some(old), Some(new)) if old == new => None,
                (Some(old), Some(new)) => match (old.as_tree(), new.as_tree()) {
                    (Some(old_tree), Some(new_tree)) => {
                        Some(Patch::Nested(old_tree.diff(new_tree).unwrap_or_default()))
                    }
                    _ => Some(Patch::Edit { old: old.clone(), new: new.clone() }),
                },
            };
            raw.push((lo, hi, patch));
        }

        let mut patches = vec![];
        let mut iter = raw.into_iter().peekable();
        while let Some((lo, mut hi, patch)) = iter.next() {
            if let Some(patch) = patch {
                while let Some((next_lo, next_hi, Some(next_patch))) = iter.peek() {
                    if *next_lo != hi || next_patch != &patch {
                        break;
                    }
                    hi = *next_hi;
                    iter.next();
                }
                patches.push((TreeKey::Interval(lo, hi), patch));
            }
        }
        Diff { patches }
    }

    pub fn apply(&self, diff: &Diff) -> Result<IntervalTree> {
        let mut result = self.clone();
        for (key, patch) in &diff.patches {
            let TreeKey::Interval(begin, end) = key else {
                continue;
            };
            match patch {
                Patch::Insert { new } | Patch::Edit { new, .. } => result.put(*begin, *end, new.clone()),
                Patch::Delete { .. } => {
                    // Remove exactly the covered window; any portion of an
                    // older, wider entry outside [begin, end) is preserved
                    // by re-clipping rather than a blind delete_exact.
                    result.put_hole(*begin, *end);
                }
                Patch::Nested(nested) => {
                    if let Some(current) = result.get_point(*begin).cloned() {
                        if let Some(current_tree) = current.as_tree() {
                            let updated = current_tree.apply(nested)?;
                            result.put(*begin, *end, Value::Tree(Box::new(updated)));
                        }
                    }
                }
            }
        }
        Ok(result)
    }

    /// Clears `[begin, end)` without inserting a replacement, clipping any
    /// entries that straddle the boundary.
    fn put_hole(&mut self, begin: i64, end: i64) {
        let mut kept = Vec::with_capacity(self.entries.len());
        for (b, e, v) in std::mem::take(&mut self.entries) {
            if e <= begin || end <= b {
                kept.push((b, e, v));
                continue;
            }
            if b < begin {
                kept.push((b, begin, v.clone()));
            }
            if end < e {
                kept.push((end, e, v));
            }
        }
        kept.sort_by_key(|(b, _, _)| *b);
        self.entries = kept;
    }
}

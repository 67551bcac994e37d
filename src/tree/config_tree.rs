//! The config variant (spec §4.F): a label tree whose values are
//! themselves required to be interval trees, used to project several
//! overlapping parameter timelines onto their joint refinement (spec §8
//! scenario S6).
//!
//! Reuses [`LabelTree`]'s diff/apply/Merkle machinery entirely; this
//! type only adds the value-shape validation and the
//! `boundaries`/`split_on_boundaries` projection on top, the way the
//! teacher's `ConflictMarkerStyle` wraps a plain enum with
//! format-specific validation rather than reimplementing storage.

use std::collections::BTreeMap;

use crate::error::{IgitError, Result};
use crate::tokenize::Value;

use super::{Diff, Tree};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigTree {
    inner: crate::tree::LabelTree,
}

impl ConfigTree {
    pub fn new() -> Self {
        Self::default()
    }

    fn validate(value: &Value) -> Result<()> {
        match value {
            Value::Tree(tree) => match tree.as_ref() {
                Tree::IntInterval(_) | Tree::TimeInterval(_) => Ok(()),
                other => Err(IgitError::UnsupportedVariant(format!(
                    "config tree values must be interval trees, found {:?}",
                    other.variant()
                ))),
            },
            other => Err(IgitError::UnsupportedVariant(format!(
                "config tree values must be interval trees, found a bare {other:?}"
            ))),
        }
    }

    pub fn get(&self, label: &str) -> Option<&Value> {
        self.inner.get(label)
    }

    pub fn put(&mut self, label: impl Into<String>, value: Value) -> Result<()> {
        Self::validate(&value)?;
        self.inner.put(label, value);
        Ok(())
    }

    pub fn delete(&mut self, label: &str) -> Option<Value> {
        self.inner.delete(label)
    }

    pub fn contains(&self, label: &str) -> bool {
        self.inner.contains(label)
    }

    pub fn iter_items(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.inner.iter_items()
    }

    pub fn diff(&self, other: &ConfigTree) -> Diff {
        self.inner.diff(&other.inner)
    }

    pub fn apply(&self, diff: &Diff) -> Result<ConfigTree> {
        Ok(ConfigTree { inner: self.inner.apply(diff)? })
    }

    /// For each of `keys`, its interval tree's entries clipped to
    /// `[begin, end)` (spec §4.F: `boundaries(begin,end,*keys) ->
    /// {key: [clipped intervals]}`).
    pub fn boundaries(&self, begin: i64, end: i64, keys: &[&str]) -> BTreeMap<String, Vec<(i64, i64, Value)>> {
        let mut out = BTreeMap::new();
        for key in keys {
            if let Some(Tree::IntInterval(tree) | Tree::TimeInterval(tree)) = self.get(key).and_then(Value::as_tree) {
                out.insert((*key).to_string(), tree.get_range(begin, end));
            }
        }
        out
    }

    /// Projects `keys`' interval timelines onto their joint refinement
    /// over `[begin, end)`: clip each selected child to the window, tag
    /// each clipped interval with its key, union into a single interval
    /// index, split at every endpoint, and group the result by key (spec
    /// §4.F, scenario S6).
    pub fn split_on_boundaries(
        &self,
        begin: i64,
        end: i64,
        keys: &[&str],
    ) -> Vec<(i64, i64, BTreeMap<String, Value>)> {
        let clipped = self.boundaries(begin, end, keys);

        let mut points = vec![begin, end];
        for intervals in clipped.values() {
            for (b, e, _) in intervals {
                points.push(*b);
                points.push(*e);
            }
        }
        points.sort_unstable();
        points.dedup();

        let mut partitions = vec![];
        for window in points.windows(2) {
            let (lo, hi) = (window[0], window[1]);
            let mut values = BTreeMap::new();
            for (key, intervals) in &clipped {
                if let Some((_, _, value)) = intervals.iter().find(|(b, e, _)| *b <= lo && lo < *e) {
                    values.insert(key.clone(), value.clone());
                }
            }
            if !values.is_empty() {
                partitions.push((lo, hi, values));
            }
        }
        partitions
    }
}

//! The plain, Git-like tree variant: string labels to values (spec §3,
//! §4.F). Grounded on `jj-lib/src/merged_tree.rs`'s path-keyed diffing,
//! generalized here from paths-to-trees down to labels-to-values.

use std::collections::BTreeMap;

use crate::error::Result;
use crate::tokenize::Value;

use super::{Diff, Patch};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LabelTree {
    entries: BTreeMap<String, Value>,
}

impl LabelTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, label: &str) -> Option<&Value> {
        self.entries.get(label)
    }

    pub fn put(&mut self, label: impl Into<String>, value: Value) {
        self.entries.insert(label.into(), value);
    }

    pub fn delete(&mut self, label: &str) -> Option<Value> {
        self.entries.remove(label)
    }

    pub fn contains(&self, label: &str) -> bool {
        self.entries.contains_key(label)
    }

    pub fn iter_items(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Per-label structural diff. A label present in both sides whose
    /// values are both nested trees recurses into a [`Patch::Nested`]
    /// diff rather than reporting a flat `Edit` (spec §4.F).
    pub fn diff(&self, other: &LabelTree) -> Diff {
        let mut patches = vec![];
        for (label, new) in &other.entries {
            match self.entries.get(label) {
                None => patches.push((super::TreeKey::Label(label.clone()), Patch::Insert { new: new.clone() })),
                Some(old) if old == new => {}
                Some(old) => {
                    let patch = match (old.as_tree(), new.as_tree()) {
                        (Some(old_tree), Some(new_tree)) => {
                            Patch::Nested(old_tree.diff(new_tree).unwrap_or_default())
                        }
                        _ => Patch::Edit { old: old.clone(), new: new.clone() },
                    };
                    patches.push((super::TreeKey::Label(label.clone()), patch));
                }
            }
        }
        for (label, old) in &self.entries {
            if !other.entries.contains_key(label) {
                patches.push((super::TreeKey::Label(label.clone()), Patch::Delete { old: old.clone() }));
            }
        }
        Diff { patches }
    }

    pub fn apply(&self, diff: &Diff) -> Result<LabelTree> {
        let mut result = self.clone();
        for (key, patch) in &diff.patches {
            let super::TreeKey::Label(label) = key else {
                continue;
            };
            match patch {
                Patch::Insert { new } | Patch::Edit { new, .. } => {
                    result.entries.insert(label.clone(), new.clone());
                }
                Patch::Delete { .. } => {
                    result.entries.remove(label);
                }
                Patch::Nested(nested) => {
                    let current = result.entries.get(label).and_then(Value::as_tree);
                    if let Some(current) = current {
                        let updated = current.apply(nested)?;
                        result.entries.insert(label.clone(), Value::Tree(Box::new(updated)));
                    }
                }
            }
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diff_reports_inserts_deletes_and_edits() {
        let mut a = LabelTree::new();
        a.put("keep", Value::Int(1));
        a.put("remove", Value::Int(2));
        a.put("edit", Value::Int(3));

        let mut b = LabelTree::new();
        b.put("keep", Value::Int(1));
        b.put("edit", Value::Int(30));
        b.put("insert", Value::Int(4));

        let diff = a.diff(&b);
        assert_eq!(diff.patches.len(), 3);
        let applied = a.apply(&diff).unwrap();
        assert_eq!(applied, b);
    }

    #[test]
    fn nested_trees_diff_recursively() {
        let mut inner_a = LabelTree::new();
        inner_a.put("x", Value::Int(1));
        let mut inner_b = LabelTree::new();
        inner_b.put("x", Value::Int(2));

        let mut a = LabelTree::new();
        a.put("sub", Value::Tree(Box::new(super::super::Tree::Label(inner_a))));
        let mut b = LabelTree::new();
        b.put("sub", Value::Tree(Box::new(super::super::Tree::Label(inner_b))));

        let diff = a.diff(&b);
        assert!(matches!(diff.patches[0].1, Patch::Nested(_)));
        assert_eq!(a.apply(&diff).unwrap(), b);
    }
}

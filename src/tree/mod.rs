//! 4.F Tree Model — typed tree variants sharing one contract: `get`,
//! `put`, `delete`, `contains`, `iter_items`, plus `diff`/`apply`,
//! `to_merkle`/`from_merkle`, and `to_paths`/`from_paths`. Variants differ
//! only in key semantics (spec §4.F).

mod config_tree;
mod interval;
mod label;

pub use config_tree::ConfigTree;
pub use interval::IntervalTree;
pub use label::LabelTree;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::cancel::CancellationToken;
use crate::error::{IgitError, Result};
use crate::object::{MerkleEntry, MerkleTree, Object};
use crate::odb::ObjectDb;
use crate::tokenize::{Canon, Tokenize, Value};

/// Discriminator recorded alongside a Merkle tree's entries so
/// `from_merkle`/`from_paths` can restore the right concrete variant
/// without runtime reflection (spec §4.F "tree variant registry"; §9
/// design note). Named after the original's `TREECLASS_KEY` convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TreeVariant {
    Label,
    IntInterval,
    TimeInterval,
    Config,
}

impl TreeVariant {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Label => "label",
            Self::IntInterval => "int_interval",
            Self::TimeInterval => "time_interval",
            Self::Config => "config",
        }
    }

    pub fn parse(name: &str) -> Result<Self> {
        match name {
            "label" => Ok(Self::Label),
            "int_interval" => Ok(Self::IntInterval),
            "time_interval" => Ok(Self::TimeInterval),
            "config" => Ok(Self::Config),
            other => Err(IgitError::UnsupportedVariant(format!("tree variant: {other}"))),
        }
    }
}

/// Reserved path segment `to_paths`/`from_paths` use to carry a nested
/// subtree's [`TreeVariant`] alongside its flattened entries, so
/// `from_paths` can reconstruct the right concrete variant instead of
/// always assuming `Label` (spec §4.F variant registry; §9 design note,
/// the original's `TREECLASS_KEY` convention).
const VARIANT_KEY: &str = "__tree_variant__";

/// A uniform key type so the shared contract (`get`/`put`/`delete`/...)
/// can be written once against the `Tree` enum instead of once per
/// variant.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TreeKey {
    Label(String),
    /// Half-open `[begin, end)`.
    Interval(i64, i64),
}

impl std::fmt::Display for TreeKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TreeKey::Label(name) => write!(f, "{name}"),
            TreeKey::Interval(b, e) => write!(f, "[{b},{e})"),
        }
    }
}

/// A single entry in a [`Diff`] (spec §4.F).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Patch {
    Insert { new: Value },
    Delete { old: Value },
    Edit { old: Value, new: Value },
    /// Both sides carried a nested tree at this key; the patch is a
    /// recursive diff rather than a flat edit.
    Nested(Diff),
}

/// A mapping of keys to patches, produced by [`Tree::diff`] and consumed
/// by [`Tree::apply`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Diff {
    pub patches: Vec<(TreeKey, Patch)>,
}

impl Diff {
    pub fn is_empty(&self) -> bool {
        self.patches.is_empty()
    }

    /// Every key path reachable through this diff where *both* sides
    /// carried an `Edit` (spec §4.I: "the intersection of the edit-leaves
    /// of the two diffs"). Nested diffs contribute dotted paths.
    pub fn edit_leaf_paths(&self) -> Vec<String> {
        let mut out = vec![];
        collect_edit_paths(self, "", &mut out);
        out
    }
}

fn collect_edit_paths(diff: &Diff, prefix: &str, out: &mut Vec<String>) {
    for (key, patch) in &diff.patches {
        let path = if prefix.is_empty() { key.to_string() } else { format!("{prefix}.{key}") };
        match patch {
            Patch::Edit { .. } => out.push(path),
            Patch::Nested(nested) => collect_edit_paths(nested, &path, out),
            Patch::Insert { .. } | Patch::Delete { .. } => {}
        }
    }
}

/// The in-memory working-tree representation. All four variants (spec
/// §3) share this one type; methods dispatch per-variant internally.
#[derive(Debug, Clone, PartialEq)]
pub enum Tree {
    Label(LabelTree),
    IntInterval(IntervalTree),
    TimeInterval(IntervalTree),
    Config(ConfigTree),
}

impl Tree {
    pub fn variant(&self) -> TreeVariant {
        match self {
            Tree::Label(_) => TreeVariant::Label,
            Tree::IntInterval(_) => TreeVariant::IntInterval,
            Tree::TimeInterval(_) => TreeVariant::TimeInterval,
            Tree::Config(_) => TreeVariant::Config,
        }
    }

    pub fn empty(variant: TreeVariant) -> Self {
        match variant {
            TreeVariant::Label => Tree::Label(LabelTree::new()),
            TreeVariant::IntInterval => Tree::IntInterval(IntervalTree::new()),
            TreeVariant::TimeInterval => Tree::TimeInterval(IntervalTree::new()),
            TreeVariant::Config => Tree::Config(ConfigTree::new()),
        }
    }

    pub fn as_label(&self) -> Option<&LabelTree> {
        match self {
            Tree::Label(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_label_mut(&mut self) -> Option<&mut LabelTree> {
        match self {
            Tree::Label(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_interval(&self) -> Option<&IntervalTree> {
        match self {
            Tree::IntInterval(t) | Tree::TimeInterval(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_interval_mut(&mut self) -> Option<&mut IntervalTree> {
        match self {
            Tree::IntInterval(t) | Tree::TimeInterval(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_config(&self) -> Option<&ConfigTree> {
        match self {
            Tree::Config(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_config_mut(&mut self) -> Option<&mut ConfigTree> {
        match self {
            Tree::Config(t) => Some(t),
            _ => None,
        }
    }

    pub fn get(&self, key: &TreeKey) -> Option<Value> {
        match (self, key) {
            (Tree::Label(t), TreeKey::Label(name)) => t.get(name).cloned(),
            (Tree::IntInterval(t) | Tree::TimeInterval(t), TreeKey::Interval(b, e)) => {
                t.get_exact(*b, *e).cloned()
            }
            (Tree::Config(t), TreeKey::Label(name)) => t.get(name).cloned(),
            _ => None,
        }
    }

    pub fn put(&mut self, key: TreeKey, value: Value) -> Result<()> {
        match (self, key) {
            (Tree::Label(t), TreeKey::Label(name)) => {
                t.put(name, value);
                Ok(())
            }
            (Tree::IntInterval(t) | Tree::TimeInterval(t), TreeKey::Interval(b, e)) => {
                t.put(b, e, value);
                Ok(())
            }
            (Tree::Config(t), TreeKey::Label(name)) => t.put(name, value),
            (tree, key) => Err(IgitError::UnsupportedVariant(format!(
                "key {key} does not fit tree variant {:?}",
                tree.variant()
            ))),
        }
    }

    pub fn delete(&mut self, key: &TreeKey) -> Option<Value> {
        match (self, key) {
            (Tree::Label(t), TreeKey::Label(name)) => t.delete(name),
            (Tree::IntInterval(t) | Tree::TimeInterval(t), TreeKey::Interval(b, e)) => {
                t.delete_exact(*b, *e)
            }
            (Tree::Config(t), TreeKey::Label(name)) => t.delete(name),
            _ => None,
        }
    }

    pub fn contains(&self, key: &TreeKey) -> bool {
        self.get(key).is_some()
    }

    pub fn iter_items(&self) -> Vec<(TreeKey, Value)> {
        match self {
            Tree::Label(t) => t.iter_items().map(|(k, v)| (TreeKey::Label(k.clone()), v.clone())).collect(),
            Tree::IntInterval(t) | Tree::TimeInterval(t) => t
                .iter_items()
                .map(|(b, e, v)| (TreeKey::Interval(b, e), v.clone()))
                .collect(),
            Tree::Config(t) => t.iter_items().map(|(k, v)| (TreeKey::Label(k.clone()), v.clone())).collect(),
        }
    }

    pub fn diff(&self, other: &Tree) -> Result<Diff> {
        match (self, other) {
            (Tree::Label(a), Tree::Label(b)) => Ok(a.diff(b)),
            (Tree::Config(a), Tree::Config(b)) => Ok(a.diff(b)),
            (Tree::IntInterval(a), Tree::IntInterval(b))
            | (Tree::TimeInterval(a), Tree::TimeInterval(b)) => Ok(a.diff(b)),
            (a, b) => Err(IgitError::UnsupportedVariant(format!(
                "cannot diff {:?} against {:?}",
                a.variant(),
                b.variant()
            ))),
        }
    }

    pub fn apply(&self, diff: &Diff) -> Result<Tree> {
        match self {
            Tree::Label(t) => Ok(Tree::Label(t.apply(diff)?)),
            Tree::Config(t) => Ok(Tree::Config(t.apply(diff)?)),
            Tree::IntInterval(t) => Ok(Tree::IntInterval(t.apply(diff)?)),
            Tree::TimeInterval(t) => Ok(Tree::TimeInterval(t.apply(diff)?)),
        }
    }

    /// Recursively hashes every leaf value (and nested tree) into the
    /// object database, returning a Merkle tree of references. Invariant
    /// 2: the result never contains inline blob bytes.
    pub fn to_merkle(&self, odb: &ObjectDb<'_>) -> Result<MerkleTree> {
        self.to_merkle_cancellable(odb, None)
    }

    /// As [`Tree::to_merkle`], but checks `token` once per entry and
    /// raises [`IgitError::Cancelled`] instead of continuing the
    /// materialization walk (spec §7).
    pub fn to_merkle_cancellable(&self, odb: &ObjectDb<'_>, token: Option<&CancellationToken>) -> Result<MerkleTree> {
        let mut entries = vec![];
        for (key, value) in self.iter_items() {
            if token.is_some_and(CancellationToken::is_cancelled) {
                return Err(IgitError::Cancelled);
            }
            let entry_key = match &key {
                TreeKey::Label(name) => MerkleEntry::Label(name.clone()),
                TreeKey::Interval(b, e) => MerkleEntry::Interval(*b, *e),
            };
            let reference = if let Value::Tree(subtree) = &value {
                let merkle = subtree.to_merkle_cancellable(odb, token)?;
                odb.put(&Object::Tree(merkle))?
            } else {
                odb.put(&Object::Blob(value.clone()))?
            };
            entries.push((entry_key, reference));
        }
        entries.sort_by(|(a, _), (b, _)| a.sort_key().cmp(&b.sort_key()));
        Ok(MerkleTree { variant: self.variant(), entries })
    }

    /// Inverse of [`Tree::to_merkle`]: transitively dereferences every
    /// reference back into an in-memory value.
    pub fn from_merkle(odb: &ObjectDb<'_>, merkle: &MerkleTree) -> Result<Tree> {
        Self::from_merkle_cancellable(odb, merkle, None)
    }

    /// As [`Tree::from_merkle`], but checks `token` once per entry and
    /// raises [`IgitError::Cancelled`] instead of continuing the
    /// dereference walk (spec §7).
    pub fn from_merkle_cancellable(
        odb: &ObjectDb<'_>,
        merkle: &MerkleTree,
        token: Option<&CancellationToken>,
    ) -> Result<Tree> {
        let mut tree = Tree::empty(merkle.variant);
        for (entry_key, reference) in &merkle.entries {
            if token.is_some_and(CancellationToken::is_cancelled) {
                return Err(IgitError::Cancelled);
            }
            let object = odb.get(&reference.key)?;
            let value = match object {
                Object::Tree(nested) => Value::Tree(Box::new(Self::from_merkle_cancellable(odb, &nested, token)?)),
                Object::Blob(value) => value,
                other => {
                    return Err(IgitError::UnsupportedVariant(format!(
                        "tree entry referenced a non-blob, non-tree object: {other:?}"
                    )))
                }
            };
            let key = match entry_key {
                MerkleEntry::Label(name) => TreeKey::Label(name.clone()),
                MerkleEntry::Interval(b, e) => TreeKey::Interval(*b, *e),
            };
            tree.put(key, value)?;
        }
        Ok(tree)
    }

    /// Flat path projection for persistence to hierarchical backends
    /// (spec §4.F). Label trees join nested keys with `sep`; interval
    /// trees render `begin:end` as the path segment. Every nested subtree
    /// also gets a sibling [`VARIANT_KEY`] entry recording its concrete
    /// variant, so `from_paths` can restore it exactly.
    pub fn to_paths(&self, sep: &str) -> BTreeMap<String, Value> {
        let mut out = BTreeMap::new();
        for (key, value) in self.iter_items() {
            let segment = match &key {
                TreeKey::Label(name) => name.clone(),
                TreeKey::Interval(b, e) => format!("{b}:{e}"),
            };
            match value {
                Value::Tree(subtree) => {
                    out.insert(
                        format!("{segment}{sep}{VARIANT_KEY}"),
                        Value::Str(subtree.variant().as_str().to_string()),
                    );
                    for (sub_path, sub_value) in subtree.to_paths(sep) {
                        out.insert(format!("{segment}{sep}{sub_path}"), sub_value);
                    }
                }
                other => {
                    out.insert(segment, other);
                }
            }
        }
        out
    }

    pub fn from_paths(variant: TreeVariant, flat: &BTreeMap<String, Value>, sep: &str) -> Result<Tree> {
        let mut children: BTreeMap<String, BTreeMap<String, Value>> = BTreeMap::new();
        let mut direct: BTreeMap<String, Value> = BTreeMap::new();
        for (path, value) in flat {
            match path.split_once(sep) {
                Some((head, rest)) => {
                    children.entry(head.to_string()).or_default().insert(rest.to_string(), value.clone());
                }
                None => {
                    direct.insert(path.clone(), value.clone());
                }
            }
        }

        let mut tree = Tree::empty(variant);
        for (segment, value) in direct {
            let key = parse_segment(variant, &segment)?;
            tree.put(key, value)?;
        }
        // A nested path set carries its own variant tag under VARIANT_KEY
        // (written by to_paths); fall back to Label only for a flat map
        // that predates the tag.
        for (segment, mut nested_flat) in children {
            let child_variant = match nested_flat.remove(VARIANT_KEY) {
                Some(Value::Str(name)) => TreeVariant::parse(&name)?,
                Some(other) => {
                    return Err(IgitError::UnsupportedVariant(format!(
                        "tree variant tag at {segment}{sep}{VARIANT_KEY} must be a string, found {other:?}"
                    )))
                }
                None => TreeVariant::Label,
            };
            let nested = Tree::from_paths(child_variant, &nested_flat, sep)?;
            let key = parse_segment(variant, &segment)?;
            tree.put(key, Value::Tree(Box::new(nested)))?;
        }
        Ok(tree)
    }
}

fn parse_segment(variant: TreeVariant, segment: &str) -> Result<TreeKey> {
    match variant {
        TreeVariant::Label | TreeVariant::Config => Ok(TreeKey::Label(segment.to_string())),
        TreeVariant::IntInterval | TreeVariant::TimeInterval => {
            let (b, e) = segment.split_once(':').ok_or_else(|| {
                IgitError::UnsupportedVariant(format!("malformed interval path segment: {segment}"))
            })?;
            let b: i64 = b
                .parse()
                .map_err(|_| IgitError::UnsupportedVariant(format!("bad interval begin: {b}")))?;
            let e: i64 = e
                .parse()
                .map_err(|_| IgitError::UnsupportedVariant(format!("bad interval end: {e}")))?;
            Ok(TreeKey::Interval(b, e))
        }
    }
}

impl Tokenize for Tree {
    /// Variant does NOT affect the token (spec §4.D): `[(k, normalize(v))
    /// for k,v in sorted(items)]`.
    fn canonicalize(&self) -> Canon {
        let mut entries: Vec<(String, Value)> =
            self.iter_items().into_iter().map(|(k, v)| (k.to_string(), v)).collect();
        entries.sort_by(|(a, _), (b, _)| a.cmp(b));
        Canon::Omap(
            entries
                .into_iter()
                .map(|(k, v)| (Canon::Str(k), v.canonicalize()))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_round_trip_label_tree() {
        let mut tree = Tree::empty(TreeVariant::Label);
        tree.put(TreeKey::Label("x".into()), Value::Int(1)).unwrap();
        tree.put(TreeKey::Label("y".into()), Value::Str("hi".into())).unwrap();
        let paths = tree.to_paths("/");
        let restored = Tree::from_paths(TreeVariant::Label, &paths, "/").unwrap();
        assert_eq!(tree, restored);
    }

    /// A `ConfigTree`'s children are interval trees, not label trees;
    /// `from_paths` must restore them as such instead of defaulting every
    /// nested subtree to `Label`.
    #[test]
    fn paths_round_trip_config_tree_preserves_child_variant() {
        let mut gain = IntervalTree::new();
        gain.put(0, 10, Value::Str("A".into()));
        gain.put(10, 20, Value::Str("B".into()));

        let mut config = ConfigTree::new();
        config.put("gain", Value::Tree(Box::new(Tree::IntInterval(gain)))).unwrap();
        let tree = Tree::Config(config);

        let paths = tree.to_paths("/");
        let restored = Tree::from_paths(TreeVariant::Config, &paths, "/").unwrap();
        assert_eq!(restored, tree);

        let child = restored.as_config().unwrap().get("gain").unwrap().as_tree().unwrap();
        assert!(matches!(child, Tree::IntInterval(_)));
    }

    #[test]
    fn empty_diff_is_empty_and_applies_to_self() {
        let mut tree = Tree::empty(TreeVariant::Label);
        tree.put(TreeKey::Label("x".into()), Value::Int(1)).unwrap();
        let diff = tree.diff(&tree).unwrap();
        assert!(diff.is_empty());
        assert_eq!(tree.apply(&diff).unwrap(), tree);
    }

    #[test]
    fn pre_cancelled_token_stops_merkle_materialization() {
        use crate::byte_map::MemoryByteMap;
        use crate::cancel::CancellationToken;
        use crate::transform::{Compression, Encryption, Serializer, TransformPipeline};

        let backing = MemoryByteMap::new();
        let odb = ObjectDb::new(&backing, TransformPipeline::new(Serializer::Json, Compression::None, Encryption::None));
        let mut tree = Tree::empty(TreeVariant::Label);
        tree.put(TreeKey::Label("x".into()), Value::Int(1)).unwrap();

        let token = CancellationToken::new();
        token.cancel();
        assert!(matches!(tree.to_merkle_cancellable(&odb, Some(&token)), Err(IgitError::Cancelled)));
    }
}

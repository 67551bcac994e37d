//! 4.I Merge Engine — common-ancestor search and three-way tree merge.
//!
//! Grounded on `igit/merges.py`'s `find_common_ancestor` (round-robin
//! parent walk with a counter) and `jj-lib/src/merge.rs`'s diff-based
//! conflict detection, adapted from jj's multi-way content merge down to
//! this spec's two-diff edit-intersection rule (spec §4.I).

use std::collections::{HashMap, HashSet, VecDeque};

use crate::cancel::CancellationToken;
use crate::error::{IgitError, Result};
use crate::object::Reference;
use crate::odb::ObjectDb;
use crate::tree::{Diff, Tree};

/// Interleaves a parent walk from each of `starts` in round-robin order,
/// counting how many distinct walkers have reached each commit key. The
/// first key reached by every walker is *an* ancestor common to all of
/// them (spec §4.I; property 8: linear chains resolve to the nearer
/// commit, symmetric inputs resolve to themselves).
pub fn find_common_ancestor(odb: &ObjectDb<'_>, starts: &[Reference]) -> Result<Reference> {
    find_common_ancestor_cancellable(odb, starts, None)
}

/// As [`find_common_ancestor`], but checks `token` once per round-robin
/// pass and raises [`IgitError::Cancelled`] instead of continuing the
/// commit-graph walk (spec §7: long walks must accept an external
/// cancellation signal).
pub fn find_common_ancestor_cancellable(
    odb: &ObjectDb<'_>,
    starts: &[Reference],
    token: Option<&CancellationToken>,
) -> Result<Reference> {
    let n = starts.len();
    let mut frontiers: Vec<VecDeque<Reference>> =
        starts.iter().map(|r| VecDeque::from([r.clone()])).collect();
    let mut visited: Vec<HashSet<String>> = vec![HashSet::new(); n];
    let mut counts: HashMap<String, usize> = HashMap::new();

    loop {
        if token.is_some_and(CancellationToken::is_cancelled) {
            return Err(IgitError::Cancelled);
        }
        let mut advanced = false;
        for i in 0..n {
            let Some(current) = frontiers[i].pop_front() else { continue };
            advanced = true;
            if !visited[i].insert(current.key.clone()) {
                continue;
            }
            let count = counts.entry(current.key.clone()).or_insert(0);
            *count += 1;
            if *count == n {
                return Ok(current);
            }
            let object = odb.get_ref(&current)?;
            if let Some(commit) = object.as_commit() {
                for parent in &commit.parents {
                    frontiers[i].push_back(parent.clone());
                }
            }
        }
        if !advanced {
            return Err(IgitError::NoCommonAncestor);
        }
    }
}

/// Every key reachable through `a`'s edit-leaves, intersected with `b`'s.
fn conflicting_paths(a: &Diff, b: &Diff) -> Vec<String> {
    let a_paths: HashSet<String> = a.edit_leaf_paths().into_iter().collect();
    let mut conflicts: Vec<String> =
        b.edit_leaf_paths().into_iter().filter(|path| a_paths.contains(path)).collect();
    conflicts.sort();
    conflicts.dedup();
    conflicts
}

/// Three-way merge: `d_ours = base.diff(ours)`, `d_theirs =
/// base.diff(theirs)`; fails [`IgitError::MergeConflict`] if the two
/// diffs both edit the same leaf, otherwise applies `theirs`'s changes on
/// top of `ours` (spec §4.I).
pub fn merge_trees(base: &Tree, ours: &Tree, theirs: &Tree) -> Result<Tree> {
    let d_ours = base.diff(ours)?;
    let d_theirs = base.diff(theirs)?;
    let conflicts = conflicting_paths(&d_ours, &d_theirs);
    if !conflicts.is_empty() {
        return Err(IgitError::MergeConflict { paths: conflicts });
    }
    ours.apply(&d_theirs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::byte_map::MemoryByteMap;
    use crate::object::{CommitObject, Object, User};
    use crate::tokenize::Value;
    use crate::transform::{Compression, Encryption, Serializer, TransformPipeline};
    use crate::tree::{TreeKey, TreeVariant};

    fn odb(backing: &MemoryByteMap) -> ObjectDb<'_> {
        ObjectDb::new(backing, TransformPipeline::new(Serializer::Json, Compression::None, Encryption::None))
    }

    fn user() -> User {
        User { username: "u".into(), email: "u@example.com".into() }
    }

    fn commit(odb: &ObjectDb<'_>, tree: Reference, parents: Vec<Reference>, message: &str) -> Reference {
        odb.put(&Object::Commit(CommitObject {
            tree,
            parents,
            author: user(),
            committer: user(),
            message: message.to_string(),
            timestamp: 0,
        }))
        .unwrap()
    }

    fn tree_ref(odb: &ObjectDb<'_>, pairs: &[(&str, i64)]) -> Reference {
        let mut tree = Tree::empty(TreeVariant::Label);
        for (k, v) in pairs {
            tree.put(TreeKey::Label((*k).to_string()), Value::Int(*v)).unwrap();
        }
        let merkle = tree.to_merkle(odb).unwrap();
        odb.put(&Object::Tree(merkle)).unwrap()
    }

    #[test]
    fn linear_chain_resolves_to_nearer_commit() {
        let backing = MemoryByteMap::new();
        let db = odb(&backing);
        let empty_tree = tree_ref(&db, &[]);
        let a = commit(&db, empty_tree.clone(), vec![], "a");
        let b = commit(&db, empty_tree.clone(), vec![a.clone()], "b");
        let c = commit(&db, empty_tree, vec![b.clone()], "c");

        let ancestor = find_common_ancestor(&db, &[c, b.clone()]).unwrap();
        assert_eq!(ancestor.key, b.key);
    }

    #[test]
    fn identical_refs_resolve_to_themselves() {
        let backing = MemoryByteMap::new();
        let db = odb(&backing);
        let empty_tree = tree_ref(&db, &[]);
        let a = commit(&db, empty_tree, vec![], "a");
        let ancestor = find_common_ancestor(&db, &[a.clone(), a.clone()]).unwrap();
        assert_eq!(ancestor.key, a.key);
    }

    #[test]
    fn diverged_branches_resolve_to_forking_point() {
        let backing = MemoryByteMap::new();
        let db = odb(&backing);
        let empty_tree = tree_ref(&db, &[]);
        let a = commit(&db, empty_tree.clone(), vec![], "a");
        let b = commit(&db, empty_tree.clone(), vec![a.clone()], "b");
        let c = commit(&db, empty_tree, vec![a.clone()], "c");

        let ancestor = find_common_ancestor(&db, &[b, c]).unwrap();
        assert_eq!(ancestor.key, a.key);
    }

    #[test]
    fn pre_cancelled_token_stops_the_walk_before_it_starts() {
        let backing = MemoryByteMap::new();
        let db = odb(&backing);
        let empty_tree = tree_ref(&db, &[]);
        let a = commit(&db, empty_tree.clone(), vec![], "a");
        let b = commit(&db, empty_tree, vec![a.clone()], "b");

        let token = crate::cancel::CancellationToken::new();
        token.cancel();
        assert!(matches!(
            find_common_ancestor_cancellable(&db, &[a, b], Some(&token)),
            Err(IgitError::Cancelled)
        ));
    }

    #[test]
    fn unrelated_histories_fail_no_common_ancestor() {
        let backing = MemoryByteMap::new();
        let db = odb(&backing);
        let t1 = tree_ref(&db, &[("x", 1)]);
        let t2 = tree_ref(&db, &[("y", 2)]);
        let a = commit(&db, t1, vec![], "a");
        let b = commit(&db, t2, vec![], "b");
        assert!(matches!(find_common_ancestor(&db, &[a, b]), Err(IgitError::NoCommonAncestor)));
    }

    #[test]
    fn non_overlapping_edits_merge_cleanly() {
        let mut base = Tree::empty(TreeVariant::Label);
        base.put(TreeKey::Label("a".into()), Value::Int(1)).unwrap();
        base.put(TreeKey::Label("b".into()), Value::Int(2)).unwrap();

        let mut ours = base.clone();
        ours.put(TreeKey::Label("a".into()), Value::Int(1)).unwrap();
        ours.put(TreeKey::Label("b".into()), Value::Int(3)).unwrap();

        let mut theirs = base.clone();
        theirs.put(TreeKey::Label("a".into()), Value::Int(9)).unwrap();
        theirs.put(TreeKey::Label("b".into()), Value::Int(2)).unwrap();

        let merged = merge_trees(&base, &ours, &theirs).unwrap();
        assert_eq!(merged.get(&TreeKey::Label("a".into())), Some(Value::Int(9)));
        assert_eq!(merged.get(&TreeKey::Label("b".into())), Some(Value::Int(3)));
    }

    #[test]
    fn overlapping_edits_conflict() {
        let mut base = Tree::empty(TreeVariant::Label);
        base.put(TreeKey::Label("a".into()), Value::Int(1)).unwrap();

        let mut ours = base.clone();
        ours.put(TreeKey::Label("a".into()), Value::Int(2)).unwrap();

        let mut theirs = base.clone();
        theirs.put(TreeKey::Label("a".into()), Value::Int(3)).unwrap();

        assert!(matches!(merge_trees(&base, &ours, &theirs), Err(IgitError::MergeConflict { .. })));
    }
}

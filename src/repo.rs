//! 4.H Commit Engine — the working tree / index / HEAD state machine:
//! `add`, `commit`, `checkout`, `branch`, `tag`, `merge` (spec §4.H,
//! §4.I).
//!
//! Grounded on `jj-lib/src/working_copy.rs`'s `LockedWorkingCopy`
//! snapshot/commit cycle and `jj-lib/src/repo.rs`'s mutable-repo
//! head-moving operations, generalized from jj's path-based tree down to
//! this spec's typed `Tree`.

use std::time::{SystemTime, UNIX_EPOCH};

use tracing::info;

use crate::byte_map::ByteMap;
use crate::error::{IgitError, Result};
use crate::merge;
use crate::object::{AnnotatedTagObject, CommitObject, Object, Reference, User};
use crate::odb::ObjectDb;
use crate::refs::{CommitRef, RefStore, Tag};
use crate::tokenize::{tokenize, Value};
use crate::transform::TransformPipeline;
use crate::tree::{Tree, TreeKey, TreeVariant};

/// The currently active branch name, or a detached commit reference
/// (spec §4.H: "HEAD symbol H (branch name or detached commit key)").
#[derive(Debug, Clone, PartialEq)]
pub enum Head {
    Branch(String),
    Detached(Reference),
}

fn now() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs() as i64
}

/// The mutable repository state machine: working tree `W`, index
/// reference `I`, HEAD symbol `H`, and the refs `R` it reads and writes
/// through.
pub struct Repository<'a> {
    odb: ObjectDb<'a>,
    refs: RefStore<'a>,
    working_tree: Tree,
    index: Option<Reference>,
    head: Head,
    user: User,
}

impl<'a> Repository<'a> {
    /// Opens a repository backed by separate object and ref byte maps
    /// (they are commonly the same store under different prefixes, but
    /// are not required to be), starting on `main_branch` with an empty
    /// working tree of `variant`.
    pub fn init(
        objects: &'a dyn ByteMap,
        refs_backing: &'a dyn ByteMap,
        pipeline: TransformPipeline,
        user: User,
        main_branch: impl Into<String>,
        variant: TreeVariant,
    ) -> Self {
        Self {
            odb: ObjectDb::new(objects, pipeline.clone()),
            refs: RefStore::new(refs_backing, pipeline),
            working_tree: Tree::empty(variant),
            index: None,
            head: Head::Branch(main_branch.into()),
            user,
        }
    }

    pub fn odb(&self) -> &ObjectDb<'a> {
        &self.odb
    }

    pub fn refs(&self) -> &RefStore<'a> {
        &self.refs
    }

    pub fn working_tree(&self) -> &Tree {
        &self.working_tree
    }

    pub fn working_tree_mut(&mut self) -> &mut Tree {
        &mut self.working_tree
    }

    pub fn head(&self) -> &Head {
        &self.head
    }

    fn resolve_head(&self) -> Result<Option<Reference>> {
        match &self.head {
            Head::Branch(name) => match self.refs.get_head(name) {
                Ok(commit_ref) => Ok(Some(commit_ref.commit)),
                Err(IgitError::NotFound { .. }) => Ok(None),
                Err(err) => Err(err),
            },
            Head::Detached(reference) => Ok(Some(reference.clone())),
        }
    }

    fn advance_head(&mut self, reference: &Reference) -> Result<()> {
        match &self.head {
            Head::Branch(name) => self.refs.set_head(name, &CommitRef { commit: reference.clone() }),
            Head::Detached(_) => {
                self.head = Head::Detached(reference.clone());
                Ok(())
            }
        }
    }

    fn commit_tree(&self, commit_ref: &Reference) -> Result<Reference> {
        let object = self.odb.get_ref(commit_ref)?;
        object
            .as_commit()
            .map(|commit| commit.tree.clone())
            .ok_or_else(|| IgitError::UnsupportedVariant(format!("{} is not a commit", commit_ref.key)))
    }

    /// True when the working tree differs from HEAD's materialized tree
    /// (or, with no HEAD yet, is non-empty).
    fn is_dirty(&self) -> Result<bool> {
        match self.resolve_head()? {
            Some(head_ref) => {
                let tree_ref = self.commit_tree(&head_ref)?;
                let materialized = self.odb.get_ref_deep(&tree_ref)?;
                Ok(tokenize(&materialized) != tokenize(&self.working_tree))
            }
            None => Ok(!self.working_tree.iter_items().is_empty()),
        }
    }

    /// Starting point for `add`/`rm`: the current index tree, dereferenced,
    /// or an empty tree of the working tree's variant if nothing is staged
    /// yet (spec §4.H: "the current index (or an empty tree of W's variant)").
    fn index_tree(&self) -> Result<Tree> {
        match &self.index {
            Some(reference) => self.odb.get_ref_deep(reference),
            None => Ok(Tree::empty(self.working_tree.variant())),
        }
    }

    /// Rejects a value the object database cannot hash consistently (spec
    /// §9: "`UnhashableValue` must be raised at `add` time, not later").
    fn check_hashable(&self, key: &TreeKey, value: &Value) -> Result<()> {
        if self.odb.consistent_hash(&Object::Blob(value.clone()))? {
            Ok(())
        } else {
            Err(IgitError::UnhashableValue { key: key.to_string() })
        }
    }

    fn stage(&mut self, index_tree: Tree) -> Result<Reference> {
        let merkle = index_tree.to_merkle(&self.odb)?;
        let reference = self.odb.put(&Object::Tree(merkle))?;
        self.index = Some(reference.clone());
        Ok(reference)
    }

    /// Builds the new index by copying `keys` (or every key in the working
    /// tree) from `W` on top of the current index, then dropping any
    /// index key no longer present in `W`; hashes the result into the
    /// object database (spec §4.H). Every copied value is checked against
    /// [`ObjectDb::consistent_hash`] before it is staged.
    pub fn add(&mut self, keys: Option<&[TreeKey]>) -> Result<Reference> {
        let mut index_tree = self.index_tree()?;
        let selected: Vec<TreeKey> = match keys {
            Some(keys) => keys.to_vec(),
            None => self.working_tree.iter_items().into_iter().map(|(key, _)| key).collect(),
        };
        for key in &selected {
            match self.working_tree.get(key) {
                Some(value) => {
                    self.check_hashable(key, &value)?;
                    index_tree.put(key.clone(), value)?;
                }
                None => {
                    index_tree.delete(key);
                }
            }
        }
        let stale: Vec<TreeKey> = index_tree
            .iter_items()
            .into_iter()
            .map(|(key, _)| key)
            .filter(|key| !self.working_tree.contains(key))
            .collect();
        for key in stale {
            index_tree.delete(&key);
        }
        self.stage(index_tree)
    }

    /// Deletes `keys` (or everything staged) from the index and rehashes
    /// (spec §4.H `rm(keys?)`).
    pub fn rm(&mut self, keys: Option<&[TreeKey]>) -> Result<Reference> {
        let mut index_tree = self.index_tree()?;
        let selected: Vec<TreeKey> = match keys {
            Some(keys) => keys.to_vec(),
            None => index_tree.iter_items().into_iter().map(|(key, _)| key).collect(),
        };
        for key in &selected {
            index_tree.delete(key);
        }
        self.stage(index_tree)
    }

    /// Fails [`IgitError::DirtyWorkingTree`] unless `add` was called and
    /// nothing has changed since (spec §4.H: "the current index tree ≠ W
    /// by tokenizer equality").
    pub fn commit(
        &mut self,
        message: impl Into<String>,
        author: Option<User>,
        committer: Option<User>,
    ) -> Result<Reference> {
        let index = self.index.clone().ok_or(IgitError::DirtyWorkingTree { operation: "commit" })?;
        let staged = self.odb.get_ref_deep(&index)?;
        if tokenize(&staged) != tokenize(&self.working_tree) {
            return Err(IgitError::DirtyWorkingTree { operation: "commit" });
        }

        let parents = self.resolve_head()?.into_iter().collect();
        let commit = CommitObject {
            tree: index,
            parents,
            author: author.unwrap_or_else(|| self.user.clone()),
            committer: committer.unwrap_or_else(|| self.user.clone()),
            message: message.into(),
            timestamp: now(),
        };
        let reference = self.odb.put(&Object::Commit(commit))?;
        self.advance_head(&reference)?;
        info!(commit = %reference.key, "committed");
        Ok(reference)
    }

    /// Resolves `name` (head, then tag, then fuzzy key), refusing if the
    /// working tree is dirty; optionally creates a branch at the current
    /// HEAD first (spec §4.H).
    pub fn checkout(&mut self, name: &str, create_branch: bool) -> Result<Reference> {
        if self.is_dirty()? {
            return Err(IgitError::DirtyWorkingTree { operation: "checkout" });
        }
        if create_branch {
            self.branch(name)?;
        }

        let commit_ref = self.refs.resolve(&self.odb, name)?;
        let tree_ref = self.commit_tree(&commit_ref)?;
        self.working_tree = self.odb.get_ref_deep(&tree_ref)?;
        self.index = Some(tree_ref);
        self.head =
            if self.refs.head_exists(name)? { Head::Branch(name.to_string()) } else { Head::Detached(commit_ref.clone()) };
        Ok(commit_ref)
    }

    /// Creates a head named `name` pointing at current HEAD; fails
    /// [`IgitError::AlreadyExists`] if the name is already a branch (spec
    /// §4.H, §4.G).
    pub fn branch(&self, name: &str) -> Result<Reference> {
        if self.refs.head_exists(name)? {
            return Err(IgitError::AlreadyExists { kind: "branch", name: name.to_string() });
        }
        let current = self.resolve_head()?.ok_or_else(|| IgitError::NotFound { key: "HEAD".to_string() })?;
        self.refs.set_head(name, &CommitRef { commit: current.clone() })?;
        Ok(current)
    }

    /// Creates a lightweight tag, or writes an [`AnnotatedTagObject`] and
    /// references it, at current HEAD (spec §4.H).
    pub fn tag(
        &self,
        name: &str,
        annotated: bool,
        tagger: Option<User>,
        message: Option<String>,
    ) -> Result<()> {
        if self.refs.tag_exists(name)? {
            return Err(IgitError::AlreadyExists { kind: "tag", name: name.to_string() });
        }
        let target = self.resolve_head()?.ok_or_else(|| IgitError::NotFound { key: "HEAD".to_string() })?;
        let tag = if annotated {
            let tag_object = AnnotatedTagObject {
                target,
                tagger: tagger.unwrap_or_else(|| self.user.clone()),
                name: name.to_string(),
                message: message.unwrap_or_default(),
            };
            let reference = self.odb.put(&Object::Tag(tag_object))?;
            Tag::Annotated(reference)
        } else {
            Tag::Lightweight(target)
        };
        self.refs.set_tag(name, &tag)
    }

    /// Three-way merges `other` into HEAD (spec §4.I). Returns `None` on
    /// a no-op merge (`base == other`); fast-forwards without a merge
    /// commit when `base == HEAD`.
    pub fn merge(&mut self, other: &str, message: impl Into<String>) -> Result<Option<Reference>> {
        let head_ref = self.resolve_head()?.ok_or_else(|| IgitError::NotFound { key: "HEAD".to_string() })?;
        let other_ref = self.refs.resolve(&self.odb, other)?;
        let base_ref = merge::find_common_ancestor(&self.odb, &[head_ref.clone(), other_ref.clone()])?;

        if base_ref.key == other_ref.key {
            return Ok(None);
        }

        if base_ref.key == head_ref.key {
            self.advance_head(&other_ref)?;
            let tree_ref = self.commit_tree(&other_ref)?;
            self.working_tree = self.odb.get_ref_deep(&tree_ref)?;
            self.index = Some(tree_ref);
            return Ok(Some(other_ref));
        }

        let base_tree = self.odb.get_ref_deep(&self.commit_tree(&base_ref)?)?;
        let ours_tree = self.odb.get_ref_deep(&self.commit_tree(&head_ref)?)?;
        let theirs_tree = self.odb.get_ref_deep(&self.commit_tree(&other_ref)?)?;

        let merged_tree = merge::merge_trees(&base_tree, &ours_tree, &theirs_tree)?;
        let merkle = merged_tree.to_merkle(&self.odb)?;
        let tree_ref = self.odb.put(&Object::Tree(merkle))?;

        let commit = CommitObject {
            tree: tree_ref.clone(),
            parents: vec![head_ref, other_ref],
            author: self.user.clone(),
            committer: self.user.clone(),
            message: message.into(),
            timestamp: now(),
        };
        let commit_ref = self.odb.put(&Object::Commit(commit))?;
        self.advance_head(&commit_ref)?;
        self.working_tree = merged_tree;
        self.index = Some(tree_ref);
        Ok(Some(commit_ref))
    }
}

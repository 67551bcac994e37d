//! 4.G Ref Store — named, mutable pointers layered over the byte map,
//! disjoint from the content-addressed object store: a head or tag name
//! is looked up directly, never hashed (spec §4.G, §6 wire layout
//! `refs/heads/<name>`, `refs/tags/<name>`, `refs/remotes/<name>`).
//!
//! Grounded on `jj-lib/src/op_store.rs`'s `RefTarget`/`BranchTarget`
//! naming and `jj-lib/src/view.rs`'s separate head/tag/remote maps,
//! adapted from jj's conflict-tracking ref targets down to this spec's
//! single-target refs.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{IgitError, Result};
use crate::object::{AnnotatedTagObject, Object, ObjectKind, Reference};
use crate::odb::ObjectDb;
use crate::transform::TransformPipeline;
use crate::byte_map::ByteMap;

const HEADS_PREFIX: &str = "refs/heads";
const TAGS_PREFIX: &str = "refs/tags";
const REMOTES_PREFIX: &str = "refs/remotes";

/// A branch head: a name pointing directly at a commit (spec §4.G).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitRef {
    pub commit: Reference,
}

/// A tag is either a bare pointer at a commit (lightweight) or a pointer
/// at a hashed, immutable [`AnnotatedTagObject`] (spec §4.G, §9 resolved
/// open question: tags are stored as a ref indirection — `tag -> ref ->
/// annotated-tag object` — matching Git conventions rather than storing
/// the annotated tag body inline under `refs/tags`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Tag {
    Lightweight(Reference),
    Annotated(Reference),
}

/// A named external origin (spec §4.G). Out of scope are the network
/// semantics of a remote; this crate only persists the record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Remote {
    pub url: String,
}

pub struct RefStore<'a> {
    pipeline: TransformPipeline,
    store: &'a dyn ByteMap,
}

impl<'a> RefStore<'a> {
    pub fn new(store: &'a dyn ByteMap, pipeline: TransformPipeline) -> Self {
        Self { pipeline, store }
    }

    fn read<T: serde::de::DeserializeOwned>(&self, key: &str) -> Result<T> {
        let bytes = self.store.get(key)?;
        self.pipeline.decode(&bytes)
    }

    fn write<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let bytes = self.pipeline.encode(value)?;
        self.store.put(key, &bytes)
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let prefix = format!("{prefix}/");
        Ok(self
            .store
            .iter_keys()?
            .into_iter()
            .filter_map(|key| key.strip_prefix(prefix.as_str()).map(str::to_string))
            .collect())
    }

    pub fn get_head(&self, name: &str) -> Result<CommitRef> {
        self.read(&format!("{HEADS_PREFIX}/{name}"))
    }

    /// Moving an existing head is a non-error rewrite (spec §4.G); only
    /// the `branch` operation in the commit engine enforces uniqueness.
    pub fn set_head(&self, name: &str, target: &CommitRef) -> Result<()> {
        self.write(&format!("{HEADS_PREFIX}/{name}"), target)?;
        debug!(name, commit = %target.commit.key, "moved head");
        Ok(())
    }

    pub fn head_exists(&self, name: &str) -> Result<bool> {
        self.store.contains(&format!("{HEADS_PREFIX}/{name}"))
    }

    pub fn list_heads(&self) -> Result<Vec<String>> {
        self.list(HEADS_PREFIX)
    }

    pub fn get_tag(&self, name: &str) -> Result<Tag> {
        self.read(&format!("{TAGS_PREFIX}/{name}"))
    }

    pub fn set_tag(&self, name: &str, tag: &Tag) -> Result<()> {
        self.write(&format!("{TAGS_PREFIX}/{name}"), tag)
    }

    pub fn tag_exists(&self, name: &str) -> Result<bool> {
        self.store.contains(&format!("{TAGS_PREFIX}/{name}"))
    }

    pub fn list_tags(&self) -> Result<Vec<String>> {
        self.list(TAGS_PREFIX)
    }

    pub fn get_remote(&self, name: &str) -> Result<Remote> {
        self.read(&format!("{REMOTES_PREFIX}/{name}"))
    }

    pub fn set_remote(&self, name: &str, remote: &Remote) -> Result<()> {
        self.write(&format!("{REMOTES_PREFIX}/{name}"), remote)
    }

    pub fn list_remotes(&self) -> Result<Vec<String>> {
        self.list(REMOTES_PREFIX)
    }

    /// A tag name's commit reference, dereferencing the `tag -> ref ->
    /// AnnotatedTag` indirection for annotated tags.
    fn resolve_tag(&self, odb: &ObjectDb<'_>, name: &str) -> Result<Reference> {
        match self.get_tag(name)? {
            Tag::Lightweight(reference) => Ok(reference),
            Tag::Annotated(reference) => {
                let object = odb.get_ref(&reference)?;
                match object {
                    Object::Tag(AnnotatedTagObject { target, .. }) => Ok(target),
                    other => Err(IgitError::DataCorruption {
                        key: reference.key.clone(),
                        expected: ObjectKind::Tag.as_str().to_string(),
                        actual: other.kind().as_str().to_string(),
                    }),
                }
            }
        }
    }

    /// Resolves a name to a commit reference: heads first, then tags,
    /// then (if it looks like a hex prefix) a fuzzy object key lookup
    /// (spec §4.G lookup policy, §4.H `checkout`).
    pub fn resolve(&self, odb: &ObjectDb<'_>, name: &str) -> Result<Reference> {
        if self.head_exists(name)? {
            return Ok(self.get_head(name)?.commit);
        }
        if self.tag_exists(name)? {
            return self.resolve_tag(odb, name);
        }
        let reference = odb.fuzzy_get(name)?;
        if reference.otype != ObjectKind::Commit {
            return Err(IgitError::NotFound { key: name.to_string() });
        }
        Ok(reference)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::byte_map::MemoryByteMap;
    use crate::transform::{Compression, Encryption, Serializer};

    fn pipeline() -> TransformPipeline {
        TransformPipeline::new(Serializer::Json, Compression::None, Encryption::None)
    }

    #[test]
    fn heads_round_trip_and_are_rewritable() {
        let backing = MemoryByteMap::new();
        let refs = RefStore::new(&backing, pipeline());
        let commit = Reference { key: "aaaa".into(), otype: ObjectKind::Commit, size: 10 };
        refs.set_head("main", &CommitRef { commit: commit.clone() }).unwrap();
        assert_eq!(refs.get_head("main").unwrap().commit, commit);

        let moved = Reference { key: "bbbb".into(), otype: ObjectKind::Commit, size: 20 };
        refs.set_head("main", &CommitRef { commit: moved.clone() }).unwrap();
        assert_eq!(refs.get_head("main").unwrap().commit, moved);
    }

    #[test]
    fn heads_resolve_before_tags() {
        let backing = MemoryByteMap::new();
        let refs = RefStore::new(&backing, pipeline());
        let head_target = Reference { key: "aaaa".into(), otype: ObjectKind::Commit, size: 0 };
        let tag_target = Reference { key: "bbbb".into(), otype: ObjectKind::Commit, size: 0 };
        refs.set_head("main", &CommitRef { commit: head_target.clone() }).unwrap();
        refs.set_tag("main", &Tag::Lightweight(tag_target)).unwrap();

        let odb_backing = MemoryByteMap::new();
        let odb = ObjectDb::new(&odb_backing, pipeline());
        assert_eq!(refs.resolve(&odb, "main").unwrap(), head_target);
    }
}

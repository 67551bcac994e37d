//! 4.E Object Model — the four object kinds the ODB persists: blobs,
//! Merkle trees, commits, and tags.
//!
//! Grounded on `jj-lib/src/backend.rs`'s `TreeValue`/`Commit`/`Signature`
//! types and its `id_type!` macro (which this crate's [`Reference`] plays
//! the role of, minus the macro: one concrete type instead of one
//! newtype per object kind, since every object here is addressed through
//! the same tokenizer regardless of kind).

use serde::{Deserialize, Serialize};

use crate::tokenize::{Canon, Tokenize, Value};
use crate::tree::TreeVariant;

/// The four object kinds the store distinguishes (spec §4.E).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObjectKind {
    Blob,
    Tree,
    Commit,
    Tag,
}

impl ObjectKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Blob => "blob",
            Self::Tree => "tree",
            Self::Commit => "commit",
            Self::Tag => "tag",
        }
    }
}

/// A content-addressed pointer: the tokenized key of an object, plus
/// enough metadata (kind, size) to act on it without fetching the
/// object body (spec §4.E, "references carry `otype` and `size`").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    pub key: String,
    pub otype: ObjectKind,
    pub size: i64,
}

/// A single entry key inside a [`MerkleTree`], mirroring [`crate::tree::TreeKey`]
/// but kept independent of it so the stored object format doesn't move
/// when the in-memory tree API does.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MerkleEntry {
    Label(String),
    Interval(i64, i64),
}

impl MerkleEntry {
    pub(crate) fn sort_key(&self) -> String {
        match self {
            MerkleEntry::Label(name) => name.clone(),
            MerkleEntry::Interval(b, e) => format!("{b:020}:{e:020}"),
        }
    }
}

/// The persisted, dereferenced form of a working tree: every leaf value
/// (and nested subtree) has already been hashed into the object database
/// and replaced by a [`Reference`] (spec invariant 2).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MerkleTree {
    pub variant: TreeVariant,
    pub entries: Vec<(MerkleEntry, Reference)>,
}

/// Identity attached to commits and annotated tags (spec §4.G).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub username: String,
    pub email: String,
}

/// A commit in the project's DAG. `parents` is empty for a root commit
/// and has two entries for a merge commit (spec §4.G, §4.I); more than
/// two is not produced by this crate's `merge` but is accepted on read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitObject {
    pub tree: Reference,
    pub parents: Vec<Reference>,
    pub author: User,
    pub committer: User,
    pub message: String,
    pub timestamp: i64,
}

/// An annotated tag object: a named, authored pointer at a commit,
/// distinct from a lightweight tag (which is just a ref, spec §4.H).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotatedTagObject {
    pub target: Reference,
    pub tagger: User,
    pub name: String,
    pub message: String,
}

/// The union of everything the object database can store or retrieve
/// (spec §4.E).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Object {
    Blob(Value),
    Tree(MerkleTree),
    Commit(CommitObject),
    Tag(AnnotatedTagObject),
}

impl Object {
    pub fn kind(&self) -> ObjectKind {
        match self {
            Object::Blob(_) => ObjectKind::Blob,
            Object::Tree(_) => ObjectKind::Tree,
            Object::Commit(_) => ObjectKind::Commit,
            Object::Tag(_) => ObjectKind::Tag,
        }
    }

    pub fn as_tree(&self) -> Option<&MerkleTree> {
        match self {
            Object::Tree(tree) => Some(tree),
            _ => None,
        }
    }

    pub fn as_commit(&self) -> Option<&CommitObject> {
        match self {
            Object::Commit(commit) => Some(commit),
            _ => None,
        }
    }

    pub fn as_tag(&self) -> Option<&AnnotatedTagObject> {
        match self {
            Object::Tag(tag) => Some(tag),
            _ => None,
        }
    }
}

/// Invariant 1: objects hash the same way regardless of kind, so a blob
/// and a commit that happened to normalize identically would collide —
/// acceptable per spec §4.E, since kind is recorded out-of-band on the
/// [`Reference`], not folded into the key.
impl Tokenize for Object {
    fn canonicalize(&self) -> Canon {
        match self {
            Object::Blob(value) => value.canonicalize(),
            Object::Tree(tree) => {
                let mut entries: Vec<_> = tree.entries.iter().collect();
                entries.sort_by(|(a, _), (b, _)| a.sort_key().cmp(&b.sort_key()));
                Canon::Omap(
                    entries
                        .into_iter()
                        .map(|(key, reference)| {
                            let key_canon = match key {
                                MerkleEntry::Label(name) => Canon::Str(name.clone()),
                                MerkleEntry::Interval(b, e) => {
                                    Canon::Seq(vec![Canon::Int(*b), Canon::Int(*e)])
                                }
                            };
                            (key_canon, Canon::Str(reference.key.clone()))
                        })
                        .collect(),
                )
            }
            Object::Commit(commit) => Canon::Omap(vec![
                (Canon::Str("tree".into()), Canon::Str(commit.tree.key.clone())),
                (
                    Canon::Str("parents".into()),
                    Canon::Seq(commit.parents.iter().map(|p| Canon::Str(p.key.clone())).collect()),
                ),
                (Canon::Str("author".into()), Canon::Str(format!("{} <{}>", commit.author.username, commit.author.email))),
                (
                    Canon::Str("committer".into()),
                    Canon::Str(format!("{} <{}>", commit.committer.username, commit.committer.email)),
                ),
                (Canon::Str("message".into()), Canon::Str(commit.message.clone())),
                (Canon::Str("timestamp".into()), Canon::Int(commit.timestamp)),
            ]),
            Object::Tag(tag) => Canon::Omap(vec![
                (Canon::Str("target".into()), Canon::Str(tag.target.key.clone())),
                (Canon::Str("tagger".into()), Canon::Str(format!("{} <{}>", tag.tagger.username, tag.tagger.email))),
                (Canon::Str("name".into()), Canon::Str(tag.name.clone())),
                (Canon::Str("message".into()), Canon::Str(tag.message.clone())),
            ]),
        }
    }
}

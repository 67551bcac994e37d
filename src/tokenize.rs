//! 4.D Tokenizer — the single source of truth for "is X equal to Y?"
//! inside the ODB and for all tree equality. A deterministic content hash,
//! `md5(stringify(normalize(value)))`, rendered as lowercase hex.
//!
//! Grounded on `jj-lib/src/content_hash.rs`'s `ContentHash` trait, which is
//! used throughout `backend.rs` via `#[derive(ContentHash, ...)]` to give
//! every backend type a canonical, serializer-independent hash. This crate
//! hand-writes the equivalent `Tokenize` trait instead of generating it
//! with a proc-macro crate, since the normalize rules here (sorted maps,
//! tagged sequences) are richer than a field-by-field derive would give
//! for free. The normalize rules themselves (sort unordered containers,
//! tag ordered vs. unordered, delegate to a custom hook) mirror the
//! original implementation's `igit/hashing.py` (`hashablize`/
//! `container_hash`).

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::tree::Tree;

/// The bounded leaf-value sum type (spec §9 design note): every value a
/// tree can store, plus a nested working tree so a `LabelTree` can hold
/// an entire sub-repository's worth of structure as one leaf.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    Timestamp(i64),
    List(Vec<Value>),
    /// An unordered mapping; entries are normalized by sorting on the
    /// stringified key before hashing, but insertion order is preserved
    /// for iteration.
    Map(Vec<(String, Value)>),
    Tree(Box<Tree>),
}

impl Value {
    pub fn as_tree(&self) -> Option<&Tree> {
        match self {
            Self::Tree(tree) => Some(tree),
            _ => None,
        }
    }
}

/// Canonical, order-normalized intermediate form. Rendered to a string by
/// [`render`] and then hashed; distinct tags (`seq` vs `omap`) keep an
/// ordered sequence from colliding with a sorted mapping of the same
/// values, matching spec §4.D.
pub(crate) enum Canon {
    Null,
    Bool(bool),
    Int(i64),
    /// Distinct from `Int` even at equal numeric value: spec §4.D lists
    /// `date` as its own identity primitive, and two objects differing
    /// only in this tag must not collide on the same ODB key.
    Timestamp(i64),
    Float(u64), // bit pattern, so NaN/-0.0 hash consistently with themselves
    Str(String),
    Bytes(Vec<u8>),
    Seq(Vec<Canon>),
    Omap(Vec<(Canon, Canon)>),
}

/// Implemented by anything the tokenizer can normalize: [`Value`] and
/// [`Tree`] both funnel through here so blob contents and Merkle trees
/// hash with the same algorithm (spec invariant 1: two semantically equal
/// trees produce the same key regardless of insertion order).
pub trait Tokenize {
    fn canonicalize(&self) -> Canon;
}

impl Tokenize for Value {
    fn canonicalize(&self) -> Canon {
        match self {
            Value::Null => Canon::Null,
            Value::Bool(b) => Canon::Bool(*b),
            Value::Int(i) => Canon::Int(*i),
            Value::Float(f) => Canon::Float(f.to_bits()),
            Value::Str(s) => Canon::Str(s.clone()),
            Value::Bytes(b) => Canon::Bytes(b.clone()),
            Value::Timestamp(t) => Canon::Timestamp(*t),
            Value::List(items) => Canon::Seq(items.iter().map(Tokenize::canonicalize).collect()),
            Value::Map(entries) => {
                let mut sorted: Vec<_> = entries.iter().collect();
                sorted.sort_by(|(a, _), (b, _)| a.cmp(b));
                Canon::Omap(
                    sorted
                        .into_iter()
                        .map(|(k, v)| (Canon::Str(k.clone()), v.canonicalize()))
                        .collect(),
                )
            }
            Value::Tree(tree) => tree.canonicalize(),
        }
    }
}

fn render(canon: &Canon, out: &mut String) {
    match canon {
        Canon::Null => out.push_str("n;"),
        Canon::Bool(b) => {
            let _ = write!(out, "b{};", *b as u8);
        }
        Canon::Int(i) => {
            let _ = write!(out, "i{i};");
        }
        Canon::Timestamp(t) => {
            let _ = write!(out, "t{t};");
        }
        Canon::Float(bits) => {
            let _ = write!(out, "f{bits};");
        }
        Canon::Str(s) => {
            let _ = write!(out, "s{}:", s.len());
            out.push_str(s);
            out.push(';');
        }
        Canon::Bytes(b) => {
            let _ = write!(out, "y{}:", b.len());
            out.push_str(&hex::encode(b));
            out.push(';');
        }
        Canon::Seq(items) => {
            out.push_str("seq[");
            for item in items {
                render(item, out);
            }
            out.push(']');
        }
        Canon::Omap(entries) => {
            out.push_str("omap[");
            for (k, v) in entries {
                render(k, out);
                out.push('=');
                render(v, out);
            }
            out.push(']');
        }
    }
}

/// `md5(stringify(normalize(value)))`, lowercase hex (spec §4.D).
pub fn tokenize(value: &impl Tokenize) -> String {
    let mut rendered = String::new();
    render(&value.canonicalize(), &mut rendered);
    format!("{:x}", md5::compute(rendered.as_bytes()))
}

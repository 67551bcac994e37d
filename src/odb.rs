//! 4.E Object Database — content-addressed storage over a [`ByteMap`],
//! wiring together the transform pipeline (serialize/compress/encrypt)
//! and the key-sharding layer.
//!
//! Grounded on `jj-lib/src/store.rs` (`Store::write_commit`/`read_commit`
//! hashing-then-verifying pattern) and `jj-lib/src/simple_backend.rs`
//! (sharded on-disk layout). Every write computes the key from the
//! object's own content (spec invariant 1); every read re-derives that
//! key and compares it against what was asked for, surfacing any
//! mismatch as [`IgitError::DataCorruption`] (spec invariant 4).

use tracing::{debug, trace};

use crate::byte_map::ByteMap;
use crate::error::{IgitError, Result};
use crate::object::{Object, ObjectKind, Reference};
use crate::shard::ShardedByteMap;
use crate::tokenize::tokenize;
use crate::transform::TransformPipeline;

/// Storage prefix objects are sharded under (spec §6: `.igit/objects/`).
const OBJECTS_PREFIX: &str = "objects";

pub struct ObjectDb<'a> {
    pipeline: TransformPipeline,
    store: ShardedByteMap<'a>,
}

impl<'a> ObjectDb<'a> {
    pub fn new(backing: &'a dyn ByteMap, pipeline: TransformPipeline) -> Self {
        Self { pipeline, store: ShardedByteMap::new(backing, OBJECTS_PREFIX) }
    }

    /// The content-addressed key an object would get if stored now,
    /// without actually storing it.
    pub fn hash(&self, object: &Object) -> String {
        tokenize(object)
    }

    /// Round-trip test (spec §4.E): `hash(obj) == hash(get(put(obj)))`.
    /// Used by the commit engine to reject a value at `add` time rather
    /// than discovering a serialization mismatch later (spec §9:
    /// "`UnhashableValue` must be raised at `add` time, not later").
    pub fn consistent_hash(&self, object: &Object) -> Result<bool> {
        let reference = self.put(object)?;
        let fetched = self.get(&reference.key)?;
        Ok(self.hash(&fetched) == reference.key)
    }

    /// Writes an object, keyed by its own tokenized hash (spec invariant
    /// 1: identical content always produces the same key, so a repeat
    /// `put` of an already-stored object is a no-op write).
    pub fn put(&self, object: &Object) -> Result<Reference> {
        let key = self.hash(object);
        let bytes = self.pipeline.encode(object)?;
        let size = bytes.len() as i64;
        if self.store.contains(&key)? {
            trace!(key = %key, "object already present, skipping write");
        } else {
            self.store.put(&key, &bytes)?;
            debug!(key = %key, otype = object.kind().as_str(), size, "wrote object");
        }
        Ok(Reference { key, otype: object.kind(), size })
    }

    /// Fetches and decodes an object, verifying its hash matches `key`
    /// (spec invariant 4: every read re-tokenizes and compares).
    pub fn get(&self, key: &str) -> Result<Object> {
        let bytes = self.store.get(key)?;
        let object: Object = self.pipeline.decode(&bytes)?;
        let actual = self.hash(&object);
        if actual != key {
            return Err(IgitError::DataCorruption {
                key: key.to_string(),
                expected: key.to_string(),
                actual,
            });
        }
        Ok(object)
    }

    pub fn get_ref(&self, reference: &Reference) -> Result<Object> {
        let object = self.get(&reference.key)?;
        if object.kind() != reference.otype {
            return Err(IgitError::DataCorruption {
                key: reference.key.clone(),
                expected: reference.otype.as_str().to_string(),
                actual: object.kind().as_str().to_string(),
            });
        }
        Ok(object)
    }

    /// Transitively dereferences a tree reference into a fully populated
    /// [`crate::tree::Tree`] (every nested subtree and blob fetched and
    /// verified). Returns [`IgitError::UnsupportedVariant`] if `reference`
    /// does not point at a tree object.
    pub fn get_ref_deep(&self, reference: &Reference) -> Result<crate::tree::Tree> {
        match self.get_ref(reference)? {
            Object::Tree(merkle) => crate::tree::Tree::from_merkle(self, &merkle),
            other => Err(IgitError::UnsupportedVariant(format!(
                "get_ref_deep expected a tree, found {:?}",
                other.kind()
            ))),
        }
    }

    /// Resolves a (possibly short) hex prefix to the one stored key it
    /// uniquely identifies (spec §4.E "fuzzy" lookup, mirroring Git's
    /// abbreviated-SHA resolution).
    pub fn fuzzy_get(&self, prefix: &str) -> Result<Reference> {
        let matches: Vec<String> =
            self.store.iter_keys()?.into_iter().filter(|key| key.starts_with(prefix)).collect();
        match matches.as_slice() {
            [] => Err(IgitError::NotFound { key: prefix.to_string() }),
            [only] => {
                let object = self.get(only)?;
                Ok(Reference { key: only.clone(), otype: object.kind(), size: 0 })
            }
            _ => Err(IgitError::Ambiguous { prefix: prefix.to_string(), matches }),
        }
    }

    pub fn contains(&self, key: &str) -> Result<bool> {
        self.store.contains(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::byte_map::MemoryByteMap;
    use crate::tokenize::Value;
    use crate::transform::{Compression, Encryption, Serializer};

    fn odb(backing: &MemoryByteMap) -> ObjectDb<'_> {
        ObjectDb::new(backing, TransformPipeline::new(Serializer::Json, Compression::Zlib, Encryption::None))
    }

    #[test]
    fn put_then_get_round_trips() {
        let backing = MemoryByteMap::new();
        let db = odb(&backing);
        let object = Object::Blob(Value::Str("payload".into()));
        let reference = db.put(&object).unwrap();
        assert_eq!(reference.otype, ObjectKind::Blob);
        assert_eq!(db.get(&reference.key).unwrap(), object);
    }

    #[test]
    fn put_is_idempotent_on_identical_content() {
        let backing = MemoryByteMap::new();
        let db = odb(&backing);
        let object = Object::Blob(Value::Int(7));
        let a = db.put(&object).unwrap();
        let b = db.put(&object).unwrap();
        assert_eq!(a.key, b.key);
    }

    #[test]
    fn mismatched_content_under_a_key_is_detected_on_read() {
        let backing = MemoryByteMap::new();
        let db = odb(&backing);
        let reference = db.put(&Object::Blob(Value::Str("x".into()))).unwrap();

        // Simulate on-disk corruption: valid, decodable bytes, but for a
        // different object than the one this key claims to be.
        let swapped = db.pipeline.encode(&Object::Blob(Value::Str("not x".into()))).unwrap();
        let sharded_key = format!("objects/{}/{}", &reference.key[..2], &reference.key[2..]);
        backing.put(&sharded_key, &swapped).unwrap();

        match db.get(&reference.key) {
            Err(IgitError::DataCorruption { .. }) => {}
            other => panic!("expected DataCorruption, got {other:?}"),
        }
    }

    #[test]
    fn consistent_hash_round_trips_through_the_pipeline() {
        let backing = MemoryByteMap::new();
        let db = odb(&backing);
        let object = Object::Blob(Value::Str("round trip me".into()));
        assert!(db.consistent_hash(&object).unwrap());
    }

    #[test]
    fn fuzzy_get_resolves_unique_prefix() {
        let backing = MemoryByteMap::new();
        let db = odb(&backing);
        let reference = db.put(&Object::Blob(Value::Str("unique".into()))).unwrap();
        let resolved = db.fuzzy_get(&reference.key[..6]).unwrap();
        assert_eq!(resolved.key, reference.key);
    }
}

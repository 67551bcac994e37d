//! 4.C Key-Sharding Map — splits hex keys across two path components so a
//! filesystem backend never has to hold millions of objects in one
//! directory.
//!
//! `prefix/key[:n]/key[n:]`, default `n = 2`. Every ODB key flows through
//! this layer before it reaches the underlying [`ByteMap`].

use crate::byte_map::ByteMap;
use crate::error::{IgitError, Result};

const DEFAULT_SHARD_LEN: usize = 2;

/// Wraps a [`ByteMap`] and shards flat hex keys into two path components.
pub struct ShardedByteMap<'a> {
    inner: &'a dyn ByteMap,
    prefix: String,
    shard_len: usize,
}

impl<'a> ShardedByteMap<'a> {
    pub fn new(inner: &'a dyn ByteMap, prefix: impl Into<String>) -> Self {
        Self { inner, prefix: prefix.into(), shard_len: DEFAULT_SHARD_LEN }
    }

    pub fn with_shard_len(inner: &'a dyn ByteMap, prefix: impl Into<String>, shard_len: usize) -> Self {
        Self { inner, prefix: prefix.into(), shard_len }
    }

    fn sharded_key(&self, key: &str) -> Result<String> {
        if key.len() < self.shard_len {
            return Err(IgitError::UnsupportedVariant(format!(
                "key {key} is shorter than shard length {}",
                self.shard_len
            )));
        }
        let (head, tail) = key.split_at(self.shard_len);
        Ok(format!("{}/{head}/{tail}", self.prefix))
    }

    pub fn get(&self, key: &str) -> Result<Vec<u8>> {
        self.inner.get(&self.sharded_key(key)?)
    }

    pub fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        self.inner.put(&self.sharded_key(key)?, value)
    }

    pub fn delete(&self, key: &str) -> Result<()> {
        self.inner.delete(&self.sharded_key(key)?)
    }

    pub fn contains(&self, key: &str) -> Result<bool> {
        self.inner.contains(&self.sharded_key(key)?)
    }

    /// Reconstructs the original flat keys from the sharded storage layout.
    pub fn iter_keys(&self) -> Result<Vec<String>> {
        let sharded_prefix = format!("{}/", self.prefix);
        let mut keys = vec![];
        for stored in self.inner.iter_keys()? {
            let Some(rest) = stored.strip_prefix(&sharded_prefix) else {
                continue;
            };
            keys.push(rest.replace('/', ""));
        }
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::byte_map::MemoryByteMap;

    #[test]
    fn shards_and_reconstructs_flat_keys() {
        let backing = MemoryByteMap::new();
        let shard = ShardedByteMap::new(&backing, "objects");
        shard.put("abcdef0123", b"payload").unwrap();
        assert!(backing.contains("objects/ab/cdef0123").unwrap());
        assert_eq!(shard.get("abcdef0123").unwrap(), b"payload");
        assert_eq!(shard.iter_keys().unwrap(), vec!["abcdef0123".to_string()]);
    }

    #[test]
    fn rejects_keys_shorter_than_shard_length() {
        let backing = MemoryByteMap::new();
        let shard = ShardedByteMap::new(&backing, "objects");
        assert!(shard.put("a", b"x").is_err());
    }
}

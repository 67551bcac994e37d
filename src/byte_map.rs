//! 4.A Byte Map — the abstract key -> bytes storage contract every higher
//! layer (sharding, transforms, ODB, ref store) is built over.
//!
//! This is the one seam external backends (object stores, databases) are
//! meant to plug into; only an in-memory map and a local-filesystem map
//! ship here, matching spec §6 ("concrete backends... are external
//! collaborators").

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::{IgitError, Result};
use crate::file_util::write_atomic;

/// A mutable string-keyed byte store with no ordering guarantee.
///
/// Nested paths use `/` as separator (§6); a backend is free to map that
/// either onto real subdirectories (as [`FsByteMap`] does) or onto a flat
/// namespace (as [`MemoryByteMap`] does).
pub trait ByteMap: Send + Sync {
    fn get(&self, key: &str) -> Result<Vec<u8>>;
    fn put(&self, key: &str, value: &[u8]) -> Result<()>;
    fn delete(&self, key: &str) -> Result<()>;
    fn contains(&self, key: &str) -> Result<bool>;
    /// Order is unspecified, matching §4.A ("no ordering guarantee").
    fn iter_keys(&self) -> Result<Vec<String>>;
}

/// In-memory [`ByteMap`], primarily for tests and ephemeral repositories.
#[derive(Debug, Default)]
pub struct MemoryByteMap {
    inner: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl MemoryByteMap {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ByteMap for MemoryByteMap {
    fn get(&self, key: &str) -> Result<Vec<u8>> {
        self.inner
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .ok_or_else(|| IgitError::NotFound { key: key.to_string() })
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        self.inner
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.inner.lock().unwrap().remove(key);
        Ok(())
    }

    fn contains(&self, key: &str) -> Result<bool> {
        Ok(self.inner.lock().unwrap().contains_key(key))
    }

    fn iter_keys(&self) -> Result<Vec<String>> {
        Ok(self.inner.lock().unwrap().keys().cloned().collect())
    }
}

/// Local-filesystem [`ByteMap`] rooted at a directory. Each key becomes a
/// file path under `root`, with `/` in the key mapping onto real
/// subdirectories (§6).
#[derive(Debug)]
pub struct FsByteMap {
    root: PathBuf,
}

impl FsByteMap {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }

    fn io_err(key: &str, err: std::io::Error) -> IgitError {
        if err.kind() == std::io::ErrorKind::NotFound {
            IgitError::NotFound { key: key.to_string() }
        } else {
            IgitError::BackendIo { key: key.to_string(), source: err }
        }
    }
}

impl ByteMap for FsByteMap {
    fn get(&self, key: &str) -> Result<Vec<u8>> {
        fs::read(self.path_for(key)).map_err(|err| Self::io_err(key, err))
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        write_atomic(&self.path_for(key), value).map_err(|err| Self::io_err(key, err))
    }

    fn delete(&self, key: &str) -> Result<()> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(Self::io_err(key, err)),
        }
    }

    fn contains(&self, key: &str) -> Result<bool> {
        Ok(self.path_for(key).is_file())
    }

    fn iter_keys(&self) -> Result<Vec<String>> {
        let mut keys = vec![];
        collect_keys(&self.root, &self.root, &mut keys)
            .map_err(|err| IgitError::BackendIo { key: self.root.display().to_string(), source: err })?;
        Ok(keys)
    }
}

fn collect_keys(root: &Path, dir: &Path, out: &mut Vec<String>) -> std::io::Result<()> {
    if !dir.is_dir() {
        return Ok(());
    }
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            collect_keys(root, &path, out)?;
        } else {
            let rel = path.strip_prefix(root).unwrap();
            let key = rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join("/");
            out.push(key);
        }
    }
    Ok(())
}

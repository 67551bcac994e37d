//! Atomic-write helpers shared by the filesystem-backed [`ByteMap`] and the
//! config loader.
//!
//! Grounded on `jj-lib/src/file_util.rs`'s `persist_content_addressed_temp_file`:
//! write to a temp file in the destination directory, `sync_data`, then
//! persist (rename) into place so a crash never leaves a partially-written
//! object visible under its final key.
//!
//! [`ByteMap`]: crate::byte_map::ByteMap

use std::fs;
use std::io;
use std::path::Path;

use tempfile::NamedTempFile;

/// Writes `contents` atomically to `path`, creating parent directories as
/// needed. Since objects are content-addressed, an existing file at `path`
/// already has identical contents (duplicate puts are no-ops, §4.E), so no
/// extra no-clobber handling is needed on write.
pub fn write_atomic(path: &Path, contents: &[u8]) -> io::Result<()> {
    let dir = path.parent().ok_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidInput, "path has no parent directory")
    })?;
    fs::create_dir_all(dir)?;
    let mut temp_file = NamedTempFile::new_in(dir)?;
    io::Write::write_all(&mut temp_file, contents)?;
    temp_file.as_file().sync_data()?;
    match temp_file.persist(path) {
        Ok(_) => Ok(()),
        Err(err) => Err(err.error),
    }
}

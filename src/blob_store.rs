// Shasplit backup engine.

//! The `.data/` content-addressed heap of blobs.
//!
//! Structurally this is conserve's `BlockDir` with the compression and
//! parallel-hashing machinery stripped out: a blob is looked up and stored
//! purely by its hex digest, admissibility is a size check rather than a
//! re-hash, and there is no addressing into sub-ranges of a blob.

use std::fs;
use std::path::{Path, PathBuf};

use crate::errors::{Error, Result};
use crate::fs_util;
use crate::path_model::{blob_path, DATA_DIR};

/// A readable, writable directory holding content-addressed blobs.
#[derive(Clone, Debug)]
pub struct BlobStore {
    /// Repository root; blobs live under `root.join(".data")`.
    root: PathBuf,
}

impl BlobStore {
    pub(crate) fn new(root: &Path) -> BlobStore {
        BlobStore {
            root: root.to_path_buf(),
        }
    }

    fn full_path(&self, digest: &str) -> PathBuf {
        self.root.join(blob_path(digest))
    }

    /// Store `bytes` under `digest`, unless a blob of the same digest and
    /// size already exists.
    ///
    /// Size equality is the sole admissibility test for an existing blob:
    /// on a genuine digest match the content is the same under collision
    /// resistance, so re-writing would be wasted I/O; a same-digest,
    /// different-size file (a truncated write from a prior crash) is
    /// overwritten. This is the only place an existing blob may be
    /// overwritten.
    pub fn put_blob(&self, digest: &str, bytes: &[u8]) -> Result<()> {
        let path = self.full_path(digest);
        if let Some(existing_size) = self.blob_size(digest)? {
            if existing_size == bytes.len() as u64 {
                return Ok(());
            }
        }
        fs_util::write_file(&path, bytes)
    }

    /// True if a blob named `digest` is present.
    pub fn has_blob(&self, digest: &str) -> Result<bool> {
        Ok(self.blob_size(digest)?.is_some())
    }

    /// Size in bytes of the blob named `digest`, or `None` if absent.
    pub fn blob_size(&self, digest: &str) -> Result<Option<u64>> {
        match fs::metadata(self.full_path(digest)) {
            Ok(meta) => Ok(Some(meta.len())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::io(self.full_path(digest), e)),
        }
    }

    /// Remove the blob named `digest`, if present, then try to remove its
    /// now-possibly-empty subdirectory (failure there is ignored: other
    /// blobs may still share the shard).
    pub fn remove_blob(&self, digest: &str) -> Result<()> {
        let path = self.full_path(digest);
        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(Error::io(&path, e)),
        }
        if let Some(subdir) = path.parent() {
            let _ = fs::remove_dir(subdir);
        }
        Ok(())
    }

    /// Lazily enumerate every blob in the store as `(digest, path)` pairs.
    ///
    /// Iterates subdirectories of `.data/` in whatever order `read_dir`
    /// returns them; callers that need a deterministic order should sort
    /// the collected results themselves.
    pub fn iter_blobs(&self) -> Result<impl Iterator<Item = (String, PathBuf)>> {
        let data_dir = self.root.join(DATA_DIR);
        let mut out = Vec::new();
        let subdirs = match fs::read_dir(&data_dir) {
            Ok(rd) => rd,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(out.into_iter()),
            Err(e) => return Err(Error::io(&data_dir, e)),
        };
        for subdir_entry in subdirs {
            let subdir_entry = subdir_entry.map_err(|e| Error::io(&data_dir, e))?;
            if !subdir_entry
                .file_type()
                .map_err(|e| Error::io(subdir_entry.path(), e))?
                .is_dir()
            {
                continue;
            }
            let subdir_path = subdir_entry.path();
            let prefix = subdir_entry.file_name().to_string_lossy().into_owned();
            for file_entry in fs::read_dir(&subdir_path).map_err(|e| Error::io(&subdir_path, e))? {
                let file_entry = file_entry.map_err(|e| Error::io(&subdir_path, e))?;
                if file_entry
                    .file_type()
                    .map_err(|e| Error::io(file_entry.path(), e))?
                    .is_file()
                {
                    let suffix = file_entry.file_name().to_string_lossy().into_owned();
                    out.push((format!("{prefix}{suffix}"), file_entry.path()));
                }
            }
        }
        Ok(out.into_iter())
    }
}

// Shasplit backup engine.

//! Crash-safe filesystem primitives.
//!
//! Every primitive here guarantees that, after it returns, the named
//! destination either exists with its final contents or does not exist at
//! all: no partial or corrupt file is ever observable under a final path.
//! This mirrors conserve's own `LocalTransport::write_file`, which writes to
//! a sibling temporary file and `persist`s it onto the final path rather
//! than writing in place.

use std::fs;
use std::io::Write;
use std::os::unix::fs::symlink as unix_symlink;
use std::path::Path;

use rand::Rng;

use crate::errors::{Error, Result};

/// Idempotent recursive directory creation.
pub fn mkdirs(path: &Path) -> Result<()> {
    fs::create_dir_all(path).map_err(|e| Error::io(path, e))
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        mkdirs(parent)?;
    }
    Ok(())
}

fn temp_name(prefix: &str) -> String {
    let token: u64 = rand::thread_rng().gen();
    format!("{prefix}.{token:016x}.tmp")
}

/// Write `bytes` to `path`, replacing any existing file atomically.
///
/// The parent directory is created if missing, the data is written and
/// fsynced to a fresh sibling temporary file, and that file is renamed onto
/// `path`. A crash at any point before the rename leaves `path` untouched;
/// a crash during or after the rename leaves `path` fully written.
pub fn write_file(path: &Path, bytes: &[u8]) -> Result<()> {
    ensure_parent(path)?;
    let dir = path.parent().expect("write_file path must have a parent");
    let mut temp = tempfile::Builder::new()
        .prefix(&temp_name("write"))
        .tempfile_in(dir)
        .map_err(|e| Error::io(dir, e))?;
    temp.write_all(bytes).map_err(|e| Error::io(path, e))?;
    temp.as_file().sync_all().map_err(|e| Error::io(path, e))?;
    temp.persist(path).map_err(|e| Error::io(path, e.error))?;
    Ok(())
}

/// Create a symlink at `path` pointing at `target`, replacing any existing
/// entry atomically.
///
/// There's no `persist` for symlinks in the `tempfile` crate, so this
/// creates the link at a sibling temporary name and renames it into place,
/// the same two-step pattern `write_file` uses for regular files.
pub fn symlink(target: &Path, path: &Path) -> Result<()> {
    ensure_parent(path)?;
    let dir = path.parent().expect("symlink path must have a parent");
    let temp_path = dir.join(temp_name("symlink"));
    unix_symlink(target, &temp_path).map_err(|e| Error::io(&temp_path, e))?;
    fs::rename(&temp_path, path).map_err(|e| {
        let _ = fs::remove_file(&temp_path);
        Error::io(path, e)
    })?;
    Ok(())
}

/// True if `path` exists and is a regular file, false if it does not
/// exist, error otherwise.
pub fn file_exists(path: &Path) -> Result<bool> {
    match fs::symlink_metadata(path) {
        Ok(meta) => Ok(meta.is_file()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(Error::io(path, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_file_creates_parent_and_content() {
        let temp = assert_fs::TempDir::new().unwrap();
        let path = temp.path().join("a/b/c.txt");
        write_file(&path, b"hello").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"hello");
    }

    #[test]
    fn write_file_replaces_existing() {
        let temp = assert_fs::TempDir::new().unwrap();
        let path = temp.path().join("c.txt");
        write_file(&path, b"one").unwrap();
        write_file(&path, b"two").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"two");
    }

    #[test]
    fn symlink_creates_parent_and_link() {
        let temp = assert_fs::TempDir::new().unwrap();
        let path = temp.path().join("a/b/link");
        symlink(Path::new("../../target"), &path).unwrap();
        assert_eq!(fs::read_link(&path).unwrap(), Path::new("../../target"));
    }

    #[test]
    fn symlink_replaces_existing() {
        let temp = assert_fs::TempDir::new().unwrap();
        let path = temp.path().join("link");
        symlink(Path::new("one"), &path).unwrap();
        symlink(Path::new("two"), &path).unwrap();
        assert_eq!(fs::read_link(&path).unwrap(), Path::new("two"));
    }

    #[test]
    fn file_exists_reports_correctly() {
        let temp = assert_fs::TempDir::new().unwrap();
        let path = temp.path().join("f");
        assert!(!file_exists(&path).unwrap());
        write_file(&path, b"x").unwrap();
        assert!(file_exists(&path).unwrap());
    }
}

// Shasplit backup engine.

//! The per-name, per-timestamp instance tree: enumeration of names and
//! their instances, and the actual-vs-expected size accounting that
//! determines whether an instance is completed.
//!
//! Grounded on conserve's own `Archive`/`Band` enumeration (listing
//! immediate subdirectories, filtering out what isn't a valid entity) but
//! flattened to shasplit's two-level name/timestamp tree rather than
//! conserve's band-id tree.

use std::fs;
use std::path::{Path, PathBuf};

use crate::errors::{Error, Result};
use crate::path_model::{instance_path, DATA_DIR};
use crate::validate::validate_name;

/// Read-only view over the instances stored under one repository root.
#[derive(Clone, Debug)]
pub struct InstanceStore {
    root: PathBuf,
}

/// Actual (on-disk) vs expected (declared) size of one instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstanceSizes {
    pub actual: u64,
    pub expected: Option<u64>,
}

impl InstanceSizes {
    /// An instance is completed iff both metadata files exist and the
    /// concatenated parts exactly match the declared size.
    pub fn is_completed(&self) -> bool {
        self.expected == Some(self.actual)
    }
}

impl InstanceStore {
    pub(crate) fn new(root: &Path) -> InstanceStore {
        InstanceStore {
            root: root.to_path_buf(),
        }
    }

    fn namedir(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    fn instancedir(&self, name: &str, timestamp: &str) -> PathBuf {
        self.root.join(instance_path(name, timestamp))
    }

    /// Lazily enumerate every name directory under the repository root,
    /// skipping `.data` and anything that doesn't pass [validate_name].
    pub fn names(&self) -> Result<Vec<String>> {
        let mut out = Vec::new();
        let entries = match fs::read_dir(&self.root) {
            Ok(rd) => rd,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(out),
            Err(e) => return Err(Error::io(&self.root, e)),
        };
        for entry in entries {
            let entry = entry.map_err(|e| Error::io(&self.root, e))?;
            if !entry.file_type().map_err(|e| Error::io(entry.path(), e))?.is_dir() {
                continue;
            }
            let file_name = entry.file_name().to_string_lossy().into_owned();
            if file_name == DATA_DIR {
                continue;
            }
            if validate_name(&file_name, "").is_ok() {
                out.push(file_name);
            }
        }
        out.sort();
        Ok(out)
    }

    /// Timestamps for `name`, newest first.
    pub fn timestamps(&self, name: &str) -> Result<Vec<String>> {
        let namedir = self.namedir(name);
        let mut out = Vec::new();
        let entries = match fs::read_dir(&namedir) {
            Ok(rd) => rd,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(out),
            Err(e) => return Err(Error::io(&namedir, e)),
        };
        for entry in entries {
            let entry = entry.map_err(|e| Error::io(&namedir, e))?;
            if !entry.file_type().map_err(|e| Error::io(entry.path(), e))?.is_dir() {
                continue;
            }
            let dirname = entry.file_name().to_string_lossy().into_owned();
            if let Some(ts) = reinsert_colons(&dirname) {
                out.push(ts);
            }
        }
        out.sort();
        out.reverse();
        Ok(out)
    }

    /// Sorted symlink paths (absolute) for every part of `(name, timestamp)`,
    /// in `(partdir, partfile)` order, which equals numeric part order.
    pub fn part_symlinks(&self, name: &str, timestamp: &str) -> Result<Vec<PathBuf>> {
        let instancedir = self.instancedir(name, timestamp);
        let mut partdirs: Vec<_> = match fs::read_dir(&instancedir) {
            Ok(rd) => rd
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .collect(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(Error::io(&instancedir, e)),
        };
        partdirs.sort();

        let mut out = Vec::new();
        for partdir in partdirs.drain(..) {
            let partdir_path = instancedir.join(&partdir);
            let mut partfiles: Vec<_> = fs::read_dir(&partdir_path)
                .map_err(|e| Error::io(&partdir_path, e))?
                .filter_map(|e| e.ok())
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .collect();
            partfiles.sort();
            out.extend(partfiles.into_iter().map(|f| partdir_path.join(f)));
        }
        Ok(out)
    }

    /// Actual (summed blob size) vs expected (declared `size`) for an
    /// instance. Fails with an integrity error if the declared size is
    /// negative or smaller than the actual size observed so far.
    ///
    /// Presence of `hash`/`size` is checked *before* stat-ing any part: an
    /// instance crashed mid-ingest (§4.5) is exactly a directory with
    /// dangling part symlinks and no `hash`/`size` yet, and that must read
    /// back as "not completed," not as a hard I/O error, so the next
    /// retention pass can still reclaim it.
    pub fn instance_sizes(&self, name: &str, timestamp: &str) -> Result<InstanceSizes> {
        let instancedir = self.instancedir(name, timestamp);
        let hash_path = instancedir.join("hash");
        let size_path = instancedir.join("size");
        if !hash_path.is_file() || !size_path.is_file() {
            // Incomplete: a part symlink may legitimately be dangling
            // (blob not yet written, or never will be). Best-effort sum,
            // skipping any part whose target can't be stat-ed rather than
            // failing the whole call.
            let actual = self
                .part_symlinks(name, timestamp)?
                .iter()
                .filter_map(|symlink| fs::metadata(symlink).ok())
                .map(|meta| meta.len())
                .sum();
            return Ok(InstanceSizes {
                actual,
                expected: None,
            });
        }

        let mut actual = 0u64;
        for symlink in self.part_symlinks(name, timestamp)? {
            let meta = fs::metadata(&symlink).map_err(|e| Error::io(&symlink, e))?;
            actual += meta.len();
        }

        let size_text = fs::read_to_string(&size_path).map_err(|e| Error::io(&size_path, e))?;
        let expected: i64 = size_text.trim().parse().map_err(|_| {
            Error::validation("size", format!("not a decimal integer: {size_text:?}"))
        })?;
        if expected < 0 {
            return Err(Error::NegativeExpectedSize { expected });
        }
        let expected = expected as u64;
        if actual > expected {
            return Err(Error::SizeMismatch { expected, actual });
        }
        Ok(InstanceSizes {
            actual,
            expected: Some(expected),
        })
    }

    /// Read the declared `hash` file for a completed instance, with the
    /// trailing newline stripped.
    pub fn read_declared_hash(&self, name: &str, timestamp: &str) -> Result<String> {
        let path = self.instancedir(name, timestamp).join("hash");
        let text = fs::read_to_string(&path).map_err(|e| Error::io(&path, e))?;
        Ok(text.trim_end_matches('\n').to_string())
    }

    /// Absolute path of the instance directory for `(name, timestamp)`.
    pub fn instance_dir(&self, name: &str, timestamp: &str) -> PathBuf {
        self.instancedir(name, timestamp)
    }

    /// True if the instance directory exists on disk at all.
    pub fn instance_exists(&self, name: &str, timestamp: &str) -> bool {
        self.instancedir(name, timestamp).exists()
    }
}

/// Reinsert the two `:` characters that were stripped from a timestamp to
/// form a directory name, i.e. the inverse of [path_model::instance_path]'s
/// `replace(':', "")`. Returns `None` if `dirname` isn't 15 characters
/// (`YYYY-MM-DDThhmmss`).
fn reinsert_colons(dirname: &str) -> Option<String> {
    if dirname.len() != 15 {
        return None;
    }
    let timestamp = format!("{}:{}:{}", &dirname[..13], &dirname[13..15], &dirname[15..]);
    Some(timestamp)
}

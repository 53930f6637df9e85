// Shasplit backup engine.

//! Deterministic, pure mappings from digests, names, timestamps, and part
//! numbers to relative repository paths. No I/O happens here: every
//! function is a total, side-effect-free string/path computation, the way
//! conserve's `apath` and `bandid` modules keep path arithmetic separate
//! from the filesystem calls that use it.

use std::path::{Path, PathBuf};

use crate::errors::{Error, Result};

/// Name of the directory holding the content-addressed blob store.
pub const DATA_DIR: &str = ".data";

/// Number of leading hex characters split off into a blob's subdirectory.
const SUBDIR_NAME_CHARS: usize = 3;

/// Minimum width of a zero-padded part number.
///
/// `w >= 4` guarantees that `part[SUBDIR_NAME_CHARS..]` is never empty, so
/// the part file always has a non-empty name distinct from its directory.
const MIN_PART_WIDTH: usize = 4;

/// Relative path of the blob holding the content of hex digest `digest`,
/// e.g. `.data/ab/cdef0123...`.
pub fn blob_path(digest: &str) -> PathBuf {
    Path::new(DATA_DIR).join(&digest[..SUBDIR_NAME_CHARS]).join(&digest[SUBDIR_NAME_CHARS..])
}

/// Relative path of the instance directory for `name` at `timestamp`
/// (colons stripped from the timestamp, as required for a valid directory
/// name on all supported platforms).
pub fn instance_path(name: &str, timestamp: &str) -> PathBuf {
    Path::new(name).join(timestamp.replace(':', ""))
}

/// Width used to zero-pad part numbers under the given `maxparts`.
fn part_width(maxparts: u64) -> usize {
    let digits = if maxparts == 0 {
        1
    } else {
        (maxparts - 1).to_string().len()
    };
    digits.max(MIN_PART_WIDTH)
}

/// Relative path of the symlink for part `index` inside `instance`, given
/// the repository's configured `maxparts`.
///
/// Parts are split at a fixed `SUBDIR_NAME_CHARS`-character boundary so
/// that lexicographic order of `(partdir, partfile)` always equals numeric
/// order of `index` (invariant 4 of the data model).
pub fn part_path(instance: &Path, index: u64, maxparts: u64) -> PathBuf {
    let width = part_width(maxparts);
    let part = format!("{index:0width$}");
    instance.join(&part[..SUBDIR_NAME_CHARS]).join(&part[SUBDIR_NAME_CHARS..])
}

/// Relative symlink target for a part pointing at the blob named `digest`,
/// written relative to the symlink's own location (`<name>/<ts>/<NNN>/`):
/// three `..` components climb out of the partdir, the instance, and the
/// name directory, landing back at the repository root.
pub fn symlink_target(digest: &str) -> PathBuf {
    Path::new("..").join("..").join("..").join(blob_path(digest))
}

/// Recover the hex digest a part symlink refers to, given the symlink's own
/// target (as produced by [symlink_target]).
///
/// This is the inverse operation used by retention GC: it strips the
/// `../../../.data/<prefix>/` components and rejoins the remainder, without
/// touching the filesystem.
pub fn digest_from_symlink_target(target: &Path) -> Result<String> {
    let mut components: Vec<&str> = target
        .components()
        .filter_map(|c| c.as_os_str().to_str())
        .collect();
    // Drop leading ".." components.
    while components.first() == Some(&"..") {
        components.remove(0);
    }
    if components.len() != 3 || components[0] != DATA_DIR {
        return Err(Error::MalformedSymlinkTarget {
            path: PathBuf::new(),
            target: target.to_path_buf(),
        });
    }
    Ok(format!("{}{}", components[1], components[2]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blob_path_splits_at_three_chars() {
        assert_eq!(
            blob_path("abcdef0123456789"),
            Path::new(".data/abc/def0123456789")
        );
    }

    #[test]
    fn instance_path_strips_colons() {
        assert_eq!(
            instance_path("myvolume", "2021-01-02T03:04:05"),
            Path::new("myvolume/2021-01-02T030405")
        );
    }

    #[test]
    fn part_width_is_at_least_four() {
        assert_eq!(part_width(10), 4);
        assert_eq!(part_width(1_000_000), 6);
    }

    #[test]
    fn part_path_zero_pads_to_width() {
        let instance = Path::new("myvolume/2021-01-02T030405");
        assert_eq!(
            part_path(instance, 0, 10),
            Path::new("myvolume/2021-01-02T030405/000/0")
        );
        assert_eq!(
            part_path(instance, 42, 1_000_000),
            Path::new("myvolume/2021-01-02T030405/000/042")
        );
    }

    #[test]
    fn part_order_matches_numeric_order() {
        let instance = Path::new("x");
        let maxparts = 1_000_000;
        let mut paths: Vec<_> = (0..20).map(|i| part_path(instance, i, maxparts)).collect();
        let sorted = {
            let mut s = paths.clone();
            s.sort();
            s
        };
        assert_eq!(paths, sorted);
        paths.sort();
        for (i, p) in paths.iter().enumerate() {
            assert_eq!(p, &part_path(instance, i as u64, maxparts));
        }
    }

    #[test]
    fn symlink_target_has_three_dotdots() {
        let target = symlink_target("abcdef0123456789");
        assert_eq!(target, Path::new("../../../.data/abc/def0123456789"));
    }

    #[test]
    fn digest_from_symlink_target_round_trips() {
        let digest = "abcdef0123456789";
        let target = symlink_target(digest);
        assert_eq!(digest_from_symlink_target(&target).unwrap(), digest);
    }

    #[test]
    fn digest_from_symlink_target_rejects_malformed() {
        assert!(digest_from_symlink_target(Path::new("../../not-data/abc/def")).is_err());
    }
}

// Shasplit backup engine.

//! Recovery and verification: reconstruct an instance's original byte
//! stream and check it against its declared hash, or summarize the state
//! of every instance in a repository.
//!
//! Grounded on conserve's `restore`/`show` split: one function streams
//! bytes out while re-hashing them, a separate one renders a status report
//! without touching the blob contents at all.

use std::io::{Read, Write};
use std::path::Path;

use crate::errors::{Error, Result};
use crate::instance_store::InstanceStore;

/// Stream the contents of `(name, timestamp)` to `out`, verifying both that
/// its declared and actual sizes agree and that the reconstructed stream's
/// digest matches the declared `hash`.
///
/// On a hash mismatch the bytes have already been written to `out` (the
/// caller is expected to discard `out`'s content on failure), matching the
/// "verify after writing" behavior of the original tool.
pub fn recover(
    config: &crate::config::Config,
    root: &Path,
    name: &str,
    timestamp: &str,
    out: &mut impl Write,
) -> Result<()> {
    crate::validate::validate_name(name, &config.snapshotsuffix)?;
    crate::validate::validate_timestamp(timestamp)?;

    let instances = InstanceStore::new(root);
    let sizes = instances.instance_sizes(name, timestamp)?;
    if !sizes.is_completed() {
        return Err(Error::IncompleteBackup {
            name: name.to_string(),
            timestamp: timestamp.to_string(),
        });
    }
    recover_no_size_check(config, root, name, timestamp, out)
}

/// Like [recover], but skips the actual-vs-expected size check: used after
/// the caller has already established the instance is completed (e.g. by
/// [recover_latest], which selects only from completed instances).
fn recover_no_size_check(
    config: &crate::config::Config,
    root: &Path,
    name: &str,
    timestamp: &str,
    out: &mut impl Write,
) -> Result<()> {
    let instances = InstanceStore::new(root);
    let mut digest = config.algorithm.digest();
    for symlink in instances.part_symlinks(name, timestamp)? {
        let bytes = std::fs::read(&symlink).map_err(|e| Error::io(&symlink, e))?;
        out.write_all(&bytes).map_err(|e| Error::io("<output>", e))?;
        digest.update(&bytes);
    }
    let actual_hash = digest.finalize_hex();
    let expected_hash = instances.read_declared_hash(name, timestamp)?;
    if actual_hash != expected_hash {
        return Err(Error::HashMismatch {
            expected: expected_hash,
            actual: actual_hash,
        });
    }
    Ok(())
}

/// Recover the newest completed instance of `name` to `out`.
pub fn recover_latest(
    config: &crate::config::Config,
    root: &Path,
    name: &str,
    out: &mut impl Write,
) -> Result<()> {
    crate::validate::validate_name(name, &config.snapshotsuffix)?;

    let instances = InstanceStore::new(root);
    let latest_completed = instances
        .timestamps(name)?
        .into_iter()
        .find(|ts| {
            instances
                .instance_sizes(name, ts)
                .map(|s| s.is_completed())
                .unwrap_or(false)
        })
        .ok_or_else(|| Error::NoCompletedBackup {
            name: name.to_string(),
        })?;
    recover_no_size_check(config, root, name, &latest_completed, out)
}

/// One line of `status` output for a single instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusLine {
    pub name: String,
    pub timestamp: String,
    pub expected_display: String,
    pub percentage: u64,
    pub incomplete: bool,
}

/// Summarize every instance of every name in the repository, newest
/// timestamp first within each name.
pub fn status(root: &Path) -> Result<Vec<StatusLine>> {
    let instances = InstanceStore::new(root);
    let mut out = Vec::new();
    for name in instances.names()? {
        for timestamp in instances.timestamps(&name)? {
            let sizes = instances.instance_sizes(&name, &timestamp)?;
            let (expected_display, percentage) = match sizes.expected {
                None => ("(unknown)".to_string(), 0),
                Some(0) => ("0".to_string(), 100),
                // Integer division truncates toward zero; this is
                // intentional and must be preserved bit-for-bit.
                Some(expected) => (expected.to_string(), 100 * sizes.actual / expected),
            };
            out.push(StatusLine {
                name: name.clone(),
                timestamp,
                expected_display,
                percentage,
                incomplete: !sizes.is_completed(),
            });
        }
    }
    Ok(out)
}

/// One structural problem found by [check].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckProblem {
    /// A part symlink's target doesn't resolve to an existing blob, or the
    /// target string itself can't be parsed back into a digest.
    DanglingSymlink { name: String, timestamp: String, symlink: std::path::PathBuf },
    /// An instance's declared/actual sizes disagree (data model invariant 2),
    /// or its declared size is malformed.
    SizeInvariantViolation { name: String, timestamp: String, detail: String },
}

impl std::fmt::Display for CheckProblem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CheckProblem::DanglingSymlink { name, timestamp, symlink } => {
                write!(f, "{name:?} {timestamp}: dangling part symlink {symlink:?}")
            }
            CheckProblem::SizeInvariantViolation { name, timestamp, detail } => {
                write!(f, "{name:?} {timestamp}: {detail}")
            }
        }
    }
}

/// Full structural validation pass (the `check` command's implementation):
/// walk every name and instance, confirming every part symlink resolves to
/// an existing blob (data model invariant 1) and every instance's declared
/// vs actual size agree where both are known (invariant 2, size half).
///
/// Unlike [recover], this never reads blob contents or recomputes the
/// whole-stream hash: it's the structural half of the invariants, cheap
/// enough to run on every call. A problem on one instance doesn't abort the
/// scan; every problem found across the whole repository is collected and
/// returned.
pub fn check(root: &Path) -> Result<Vec<CheckProblem>> {
    let instances = InstanceStore::new(root);
    let mut problems = Vec::new();
    for name in instances.names()? {
        for timestamp in instances.timestamps(&name)? {
            let mut dangling = false;
            for symlink in instances.part_symlinks(&name, &timestamp)? {
                if std::fs::metadata(&symlink).is_err() {
                    dangling = true;
                    problems.push(CheckProblem::DanglingSymlink {
                        name: name.clone(),
                        timestamp: timestamp.clone(),
                        symlink,
                    });
                }
            }
            // Already reported via the part-by-part scan above; skip the
            // size check rather than report the same instance twice.
            if dangling {
                continue;
            }
            match instances.instance_sizes(&name, &timestamp) {
                Ok(_) => {}
                Err(Error::SizeMismatch { expected, actual }) => {
                    problems.push(CheckProblem::SizeInvariantViolation {
                        name: name.clone(),
                        timestamp: timestamp.clone(),
                        detail: format!("actual size {actual} exceeds declared size {expected}"),
                    });
                }
                Err(Error::NegativeExpectedSize { expected }) => {
                    problems.push(CheckProblem::SizeInvariantViolation {
                        name: name.clone(),
                        timestamp: timestamp.clone(),
                        detail: format!("negative declared size {expected}"),
                    });
                }
                Err(other) => return Err(other),
            }
        }
    }
    Ok(problems)
}

impl std::fmt::Display for StatusLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "  {}  {}  {:3}%{}",
            self.timestamp,
            self.expected_display,
            self.percentage,
            if self.incomplete { "  incomplete" } else { "" }
        )
    }
}

// Shasplit backup engine.

//! Explicit, validated engine configuration.
//!
//! The original `shasplit.py` kept these as constructor defaults on a
//! single `Shasplit` class. Conserve's own design threads an explicit
//! options struct (e.g. `BackupOptions`, `RestoreOptions`) into each
//! operation rather than relying on module-level state; `Config` plays
//! that role here, but for the whole engine rather than one operation.

use std::path::PathBuf;

use crate::hash::Algorithm;
use crate::validate::validate_positive;
use crate::errors::Result;

/// Default part size: 1 MiB, matching the original tool's default.
pub const DEFAULT_PARTSIZE: u64 = 1024 * 1024;

/// Default cap on parts per instance.
pub const DEFAULT_MAXPARTS: u64 = 1_000_000;

/// Default suffix appended to a name to form its LVM snapshot volume name.
pub const DEFAULT_SNAPSHOT_SUFFIX: &str = ".shasplit-snap";

/// Default size requested for an LVM snapshot device: 1 GiB.
pub const DEFAULT_SNAPSHOTSIZE: u64 = 1024 * 1024 * 1024;

/// Validated configuration for one repository engine instance.
#[derive(Debug, Clone)]
pub struct Config {
    pub algorithm: Algorithm,
    pub partsize: u64,
    pub maxparts: u64,
    pub directory: PathBuf,
    pub snapshotsuffix: String,
    pub snapshotsize: u64,
}

impl Config {
    /// Build a `Config`, validating every field.
    pub fn new(
        algorithm: Algorithm,
        partsize: u64,
        maxparts: u64,
        directory: PathBuf,
        snapshotsuffix: String,
        snapshotsize: u64,
    ) -> Result<Config> {
        Ok(Config {
            algorithm,
            partsize: validate_positive("partsize", partsize)?,
            maxparts: validate_positive("maxparts", maxparts)?,
            directory,
            snapshotsuffix,
            snapshotsize: validate_positive("snapshotsize", snapshotsize)?,
        })
    }

    /// Default directory `~/.shasplit`, falling back to `.shasplit` in the
    /// current directory if the home directory cannot be determined.
    pub fn default_directory() -> PathBuf {
        dirs_home().unwrap_or_default().join(".shasplit")
    }
}

impl Default for Config {
    fn default() -> Config {
        Config {
            algorithm: Algorithm::Sha1,
            partsize: DEFAULT_PARTSIZE,
            maxparts: DEFAULT_MAXPARTS,
            directory: Config::default_directory(),
            snapshotsuffix: DEFAULT_SNAPSHOT_SUFFIX.to_string(),
            snapshotsize: DEFAULT_SNAPSHOTSIZE,
        }
    }
}

fn dirs_home() -> Option<PathBuf> {
    std::env::var_os("HOME").map(PathBuf::from)
}

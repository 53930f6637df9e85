// Shasplit backup engine.

//! Shasplit: a content-addressed backup engine.
//!
//! Ingests an opaque byte stream under a logical name, splits it into
//! fixed-size parts, stores each part once keyed by its digest, and records
//! a backup as an ordered sequence of references into that shared store.
//! Repeated backups of a slowly-changing volume cost only the changed
//! blocks; each backup remains independently retrievable and
//! integrity-checkable.
//!
//! This crate is organized the way conserve separates its own archive
//! engine from its CLI: every data-model and algorithmic concern lives in a
//! library module with no knowledge of argument parsing, terminal output, or
//! process exit codes, and [Repository] is the single facade a caller (the
//! `shasplit` binary, or a test) drives.

pub mod blob_store;
pub mod clock;
pub mod config;
pub mod errors;
pub mod fs_util;
pub mod hash;
pub mod ingest;
pub mod instance_store;
pub mod lvm;
pub mod path_model;
pub mod recover;
pub mod retention;
pub mod validate;

use std::io::{Read, Write};
use std::path::PathBuf;

use clock::Clock;
use lvm::Snapshotter;

pub use config::Config;
pub use errors::{Error, Result};
pub use ingest::IngestReport;
pub use recover::{CheckProblem, StatusLine};
pub use retention::RetentionReport;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// A repository: a [Config] bound to the directory it governs.
///
/// All mutating operations assume exclusive ownership of the directory for
/// their duration (§5 of the design: single-writer, documented precondition,
/// not lock-enforced).
#[derive(Debug, Clone)]
pub struct Repository {
    config: Config,
}

impl Repository {
    pub fn new(config: Config) -> Repository {
        Repository { config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn root(&self) -> &std::path::Path {
        &self.config.directory
    }

    /// Ingest `input` under `name`, then apply retention on both sides of
    /// the write: once before (to relieve storage pressure ahead of a large
    /// write) and once after (so a backup that is itself immediately
    /// obsolete, e.g. `maxbackups == 1` with a brand-new volume, is still
    /// pruned). This mirrors the original tool's `remove_obsolete; ingest;
    /// remove_obsolete` sequencing (§4.7).
    pub fn add(
        &self,
        clock: &dyn Clock,
        name: &str,
        maxbackups: u64,
        input: impl Read,
    ) -> Result<IngestReport> {
        self.remove_obsolete(name, maxbackups)?;
        let timestamp = clock.now_timestamp();
        let report = ingest::ingest(&self.config, self.root(), name, &timestamp, input)?;
        self.remove_obsolete(name, maxbackups)?;
        Ok(report)
    }

    /// The LVM variant of `add`: snapshot `origin` in `volumegroup`, ingest
    /// the snapshot's block device under `name` with retention, then tear
    /// the snapshot down whether ingest succeeded or not, so a failed
    /// ingest never leaks a live snapshot.
    pub fn add_from_snapshot(
        &self,
        clock: &dyn Clock,
        snapshotter: &dyn Snapshotter,
        volumegroup: &str,
        name: &str,
        maxbackups: u64,
    ) -> Result<IngestReport> {
        validate::validate_volumegroup(volumegroup)?;
        validate::validate_name(name, &self.config.snapshotsuffix)?;

        let snapshot_name = format!("{name}{}", self.config.snapshotsuffix);
        snapshotter.sync()?;
        snapshotter.lvcreate(volumegroup, name, &snapshot_name, self.config.snapshotsize)?;

        let result = (|| {
            let device = snapshotter.open_block_device(volumegroup, &snapshot_name)?;
            self.add(clock, name, maxbackups, device)
        })();

        // Always attempt teardown, even if ingest failed, so a failed
        // ingest never leaks a snapshot; the ingest error (if any) still
        // propagates, keeping snapshot-removal failure secondary.
        let teardown = snapshotter.lvremove(volumegroup, &snapshot_name);
        match (result, teardown) {
            (Ok(report), Ok(())) => Ok(report),
            (Err(e), _) => Err(e),
            (Ok(_), Err(e)) => Err(e),
        }
    }

    /// Apply retention to `name`'s instances directly, without ingesting.
    pub fn remove_obsolete(&self, name: &str, maxbackups: u64) -> Result<RetentionReport> {
        retention::remove_obsolete(self.root(), &self.config.snapshotsuffix, name, maxbackups)
    }

    /// Recover `(name, timestamp)` to `out`.
    pub fn recover(&self, name: &str, timestamp: &str, out: &mut impl Write) -> Result<()> {
        recover::recover(&self.config, self.root(), name, timestamp, out)
    }

    /// Recover the newest completed instance of `name` to `out`.
    pub fn recover_latest(&self, name: &str, out: &mut impl Write) -> Result<()> {
        recover::recover_latest(&self.config, self.root(), name, out)
    }

    /// Per-name, per-instance status summary.
    pub fn status(&self) -> Result<Vec<StatusLine>> {
        recover::status(self.root())
    }

    /// Full structural validation pass over every name and instance.
    pub fn check(&self) -> Result<Vec<CheckProblem>> {
        recover::check(self.root())
    }

    /// The repository's root directory.
    pub fn directory(&self) -> PathBuf {
        self.root().to_path_buf()
    }
}

// Shasplit backup engine.

//! Retention / garbage collection: drop instances beyond the configured
//! keep count, then sweep blobs no instance references any more.
//!
//! Grounded on conserve's own `validate_bands`/gc split (`validate.rs`,
//! `gc_lock.rs`): enumerate what's live, then compare against what's
//! present, and only delete what survives neither. The cross-name sweep
//! (step 3 below) uses the same `into_par_iter()` pattern conserve's
//! `mount.rs` uses for its own per-name hunk enumeration, since the sweep is
//! embarrassingly parallel across names and has no shared mutable state
//! until the final digest set is reduced.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use rayon::iter::{IntoParallelIterator, ParallelIterator};
use tracing::{debug, info};

use crate::blob_store::BlobStore;
use crate::errors::{Error, Result};
use crate::instance_store::InstanceStore;
use crate::path_model::digest_from_symlink_target;
use crate::validate::{validate_name, validate_positive};

/// Summary of one `remove_obsolete` pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetentionReport {
    /// Timestamps of instances that were dropped, under `name`.
    pub removed_instances: Vec<String>,
    /// Digests of blobs removed because no remaining instance referenced
    /// them.
    pub removed_blobs: Vec<String>,
}

/// Drop `name`'s instances beyond `maxbackups` completed ones, then sweep
/// blobs left unreferenced by any instance of any name.
///
/// Semantics (data model §4.7): among `name`'s instances newest-first, the
/// first `maxbackups` *completed* instances are kept. Every instance
/// encountered after the `maxbackups`-th completion is dropped, and every
/// incomplete instance is dropped unconditionally — an incomplete instance
/// is never recoverable, so there's nothing gained by keeping it around,
/// and §4.5's crash-safety guarantee requires the very next retention pass
/// to reclaim it rather than waiting for `maxbackups` newer completions to
/// accumulate first.
pub fn remove_obsolete(root: &Path, snapshot_suffix: &str, name: &str, maxbackups: u64) -> Result<RetentionReport> {
    validate_name(name, snapshot_suffix)?;
    validate_positive("maxbackups", maxbackups)?;

    let instances = InstanceStore::new(root);
    let drop = select_drop_list(&instances, name, maxbackups)?;

    let mut freed_digests: HashSet<String> = HashSet::new();
    for timestamp in &drop {
        freed_digests.extend(drop_instance(&instances, name, timestamp)?);
    }

    if !freed_digests.is_empty() {
        sweep_referenced(&instances, &mut freed_digests)?;
    }

    let blobs = BlobStore::new(root);
    for digest in &freed_digests {
        blobs.remove_blob(digest)?;
    }

    if !drop.is_empty() || !freed_digests.is_empty() {
        info!(name, dropped = drop.len(), freed_blobs = freed_digests.len(), "retention pass complete");
    }

    Ok(RetentionReport {
        removed_instances: drop,
        removed_blobs: freed_digests.into_iter().collect(),
    })
}

/// Walk `name`'s timestamps newest-first, keeping the first `maxbackups`
/// completed ones and dropping every incomplete instance unconditionally,
/// collecting everything else into the drop list.
fn select_drop_list(instances: &InstanceStore, name: &str, maxbackups: u64) -> Result<Vec<String>> {
    let mut drop = Vec::new();
    let mut completed = 0u64;
    for timestamp in instances.timestamps(name)? {
        if !instances.instance_sizes(name, &timestamp)?.is_completed() {
            drop.push(timestamp);
            continue;
        }
        if completed >= maxbackups {
            drop.push(timestamp);
        } else {
            completed += 1;
        }
    }
    Ok(drop)
}

/// Remove one instance's symlinks, now-empty partdirs, metadata files, and
/// its own directory, returning the digests its symlinks referenced.
fn drop_instance(instances: &InstanceStore, name: &str, timestamp: &str) -> Result<HashSet<String>> {
    let mut digests = HashSet::new();
    let mut partdirs = HashSet::new();
    for symlink in instances.part_symlinks(name, timestamp)? {
        let target = fs::read_link(&symlink).map_err(|e| Error::io(&symlink, e))?;
        digests.insert(digest_from_symlink_target(&target).map_err(|_| Error::MalformedSymlinkTarget {
            path: symlink.clone(),
            target: target.clone(),
        })?);
        if let Some(partdir) = symlink.parent() {
            partdirs.insert(partdir.to_path_buf());
        }
        fs::remove_file(&symlink).map_err(|e| Error::io(&symlink, e))?;
        debug!(?symlink, "removed part symlink");
    }
    for partdir in partdirs {
        let _ = fs::remove_dir(&partdir);
    }

    let instance_dir = instances.instance_dir(name, timestamp);
    for meta in ["hash", "size"] {
        let path = instance_dir.join(meta);
        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(Error::io(&path, e)),
        }
    }
    fs::remove_dir(&instance_dir).map_err(|e| Error::io(&instance_dir, e))?;
    debug!(name, timestamp, "removed instance");
    Ok(digests)
}

/// Discard from `freed_digests` every digest still referenced by any
/// remaining instance of any name. This is the safety gate that makes the
/// sweep correct even when a digest is shared across names or instances
/// that weren't dropped in this pass.
fn sweep_referenced(instances: &InstanceStore, freed_digests: &mut HashSet<String>) -> Result<()> {
    let names = instances.names()?;
    let referenced: HashSet<String> = names
        .into_par_iter()
        .map(|name| referenced_digests_for_name(instances, &name))
        .collect::<Result<Vec<_>>>()?
        .into_iter()
        .flatten()
        .collect();
    freed_digests.retain(|d| !referenced.contains(d));
    Ok(())
}

fn referenced_digests_for_name(instances: &InstanceStore, name: &str) -> Result<HashSet<String>> {
    let mut out = HashSet::new();
    for timestamp in instances.timestamps(name)? {
        for symlink in instances.part_symlinks(name, &timestamp)? {
            let target = match fs::read_link(&symlink) {
                Ok(target) => target,
                Err(_) => continue,
            };
            if let Ok(digest) = digest_from_symlink_target(&target) {
                out.insert(digest);
            }
        }
    }
    Ok(out)
}

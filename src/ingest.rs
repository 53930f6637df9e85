// Shasplit backup engine.

//! The streaming ingest pipeline: read an opaque byte stream, split it into
//! fixed-size parts, hash and store each part, and commit a new completed
//! instance.

use std::io::Read;
use std::path::PathBuf;

use tracing::debug;

use crate::blob_store::BlobStore;
use crate::config::Config;
use crate::errors::{Error, Result};
use crate::fs_util;
use crate::path_model::{instance_path, part_path, symlink_target};
use crate::validate::{validate_name, validate_positive};

/// Outcome of a successful ingest.
#[derive(Debug, Clone)]
pub struct IngestReport {
    pub name: String,
    pub timestamp: String,
    pub size: u64,
    pub hash: String,
    pub parts: u64,
}

/// Read `input` to completion, splitting it into `config.partsize`-byte
/// parts and committing them as a new instance named `name` at `timestamp`.
///
/// `timestamp` is captured by the caller (see [crate::clock]) so the core
/// engine never reads the system clock itself.
pub fn ingest(
    config: &Config,
    root: &std::path::Path,
    name: &str,
    timestamp: &str,
    mut input: impl Read,
) -> Result<IngestReport> {
    validate_name(name, &config.snapshotsuffix)?;
    crate::validate::validate_timestamp(timestamp)?;

    let blobs = BlobStore::new(root);
    let instance_rel = instance_path(name, timestamp);
    let instance_abs = root.join(&instance_rel);
    if instance_abs.exists() {
        return Err(Error::AlreadyExists { path: instance_abs });
    }

    let mut total_digest = config.algorithm.digest();
    let mut size_total: u64 = 0;
    let mut buf = vec![0u8; config.partsize as usize];
    let mut parts: u64 = 0;

    loop {
        let read_len = read_full(&mut input, &mut buf)?;
        if read_len == 0 {
            break;
        }
        let part_bytes = &buf[..read_len];

        if parts >= config.maxparts {
            return Err(Error::TooManyParts {
                index: parts,
                maxparts: config.maxparts,
            });
        }

        total_digest.update(part_bytes);
        size_total += read_len as u64;

        let digest = config.algorithm.hash_hex(part_bytes);
        let symlink_path = root.join(part_path(&instance_rel, parts, config.maxparts));
        fs_util::symlink(&symlink_target(&digest), &symlink_path)?;
        blobs.put_blob(&digest, part_bytes)?;

        debug!(part = parts, %digest, len = read_len, "wrote part");
        parts += 1;
    }

    let hash_hex = total_digest.finalize_hex();
    fs_util::write_file(&instance_abs.join("hash"), format!("{hash_hex}\n").as_bytes())?;
    fs_util::write_file(&instance_abs.join("size"), format!("{size_total}\n").as_bytes())?;

    Ok(IngestReport {
        name: name.to_string(),
        timestamp: timestamp.to_string(),
        size: size_total,
        hash: hash_hex,
        parts,
    })
}

/// Validate a requested `maxbackups` value used by the caller to drive
/// retention after ingest.
pub fn validate_maxbackups(maxbackups: u64) -> Result<u64> {
    validate_positive("maxbackups", maxbackups)
}

/// Read up to `buf.len()` bytes from `input`, retrying on short reads so a
/// slow producer never splits a part early. Returns the number of bytes
/// read, which is `0` only at true end-of-stream.
fn read_full(input: &mut impl Read, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = input
            .read(&mut buf[filled..])
            .map_err(|e| Error::io(PathBuf::from("<stream>"), e))?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

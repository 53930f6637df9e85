// Shasplit backup engine.

//! LVM snapshot collaborator.
//!
//! The `add <volumegroup> <name> <maxbackups>` command variant ingests a
//! consistent point-in-time copy of a live logical volume rather than a
//! plain stdin stream. Taking that copy is entirely outside the repository
//! engine's invariants (§1 lists it as an out-of-scope external
//! collaborator), so it's extracted behind [Snapshotter]: a real
//! implementation shells out to `sync(1)`/`lvcreate(8)`/`lvremove(8)`, and a
//! fake backed by in-memory buffers drives the orchestration in tests
//! without root or a real volume group.

use std::io::{Cursor, Read};
use std::process::Command;
use std::sync::Mutex;

use tracing::debug;

use crate::errors::{Error, Result};

/// Lifecycle of one LVM snapshot, as consumed by the `add`-over-snapshot
/// orchestration.
pub trait Snapshotter {
    /// Flush filesystem buffers so the snapshot taken immediately after is
    /// transactionally consistent.
    fn sync(&self) -> Result<()>;

    /// Create a copy-on-write snapshot `snapshot` of `origin` in
    /// `volumegroup`, requesting `size_bytes` of COW space.
    fn lvcreate(&self, volumegroup: &str, origin: &str, snapshot: &str, size_bytes: u64) -> Result<()>;

    /// Destroy a previously created snapshot.
    fn lvremove(&self, volumegroup: &str, snapshot: &str) -> Result<()>;

    /// Open the snapshot's block device for reading.
    fn open_block_device(&self, volumegroup: &str, snapshot: &str) -> Result<Box<dyn Read>>;
}

/// Real [Snapshotter] that shells out to the LVM command-line tools.
#[derive(Debug, Clone, Copy, Default)]
pub struct LvmSnapshotter;

impl LvmSnapshotter {
    /// Path of the block device for a snapshot, `/dev/<vg>/<snap>`.
    pub fn device_path(volumegroup: &str, snapshot: &str) -> String {
        format!("/dev/{volumegroup}/{snapshot}")
    }

    fn run(mut command: Command) -> Result<()> {
        let program = format!("{command:?}");
        let status = command
            .status()
            .map_err(|e| Error::Subprocess { command: program.clone(), message: e.to_string() })?;
        if !status.success() {
            return Err(Error::Subprocess {
                command: program,
                message: format!("exited with {status}"),
            });
        }
        Ok(())
    }
}

impl Snapshotter for LvmSnapshotter {
    fn sync(&self) -> Result<()> {
        debug!("sync()");
        Self::run(Command::new("sync"))
    }

    fn lvcreate(&self, volumegroup: &str, origin: &str, snapshot: &str, size_bytes: u64) -> Result<()> {
        debug!(volumegroup, origin, snapshot, size_bytes, "lvcreate");
        let mut command = Command::new("lvcreate");
        command
            .arg("--snapshot")
            .arg("--name")
            .arg(snapshot)
            .arg("--size")
            .arg(format!("{size_bytes}b"))
            .arg(format!("/dev/{volumegroup}/{origin}"));
        Self::run(command)
    }

    fn lvremove(&self, volumegroup: &str, snapshot: &str) -> Result<()> {
        debug!(volumegroup, snapshot, "lvremove");
        let mut command = Command::new("lvremove");
        command.arg("--force").arg(format!("/dev/{volumegroup}/{snapshot}"));
        Self::run(command)
    }

    fn open_block_device(&self, volumegroup: &str, snapshot: &str) -> Result<Box<dyn Read>> {
        let path = Self::device_path(volumegroup, snapshot);
        let file = std::fs::File::open(&path).map_err(|e| Error::io(&path, e))?;
        Ok(Box::new(file))
    }
}

/// One recorded call against a [FakeSnapshotter], for test assertions about
/// orchestration order (sync, then lvcreate, then lvremove even on
/// failure).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FakeCall {
    Sync,
    LvCreate { volumegroup: String, origin: String, snapshot: String, size_bytes: u64 },
    LvRemove { volumegroup: String, snapshot: String },
}

/// In-memory [Snapshotter] fake: `open_block_device` returns pre-seeded
/// bytes instead of opening a real device node, so the `add`-over-snapshot
/// path is testable without LVM or root.
#[derive(Debug, Default)]
pub struct FakeSnapshotter {
    device_contents: Mutex<Vec<(String, Vec<u8>)>>,
    calls: Mutex<Vec<FakeCall>>,
}

impl FakeSnapshotter {
    pub fn new() -> FakeSnapshotter {
        FakeSnapshotter::default()
    }

    /// Seed the bytes that `open_block_device(vg, snap)` will return.
    pub fn seed_device(&self, volumegroup: &str, snapshot: &str, bytes: impl Into<Vec<u8>>) {
        self.device_contents
            .lock()
            .expect("lock poisoned")
            .push((LvmSnapshotter::device_path(volumegroup, snapshot), bytes.into()));
    }

    pub fn calls(&self) -> Vec<FakeCall> {
        self.calls.lock().expect("lock poisoned").clone()
    }
}

impl Snapshotter for FakeSnapshotter {
    fn sync(&self) -> Result<()> {
        self.calls.lock().expect("lock poisoned").push(FakeCall::Sync);
        Ok(())
    }

    fn lvcreate(&self, volumegroup: &str, origin: &str, snapshot: &str, size_bytes: u64) -> Result<()> {
        self.calls.lock().expect("lock poisoned").push(FakeCall::LvCreate {
            volumegroup: volumegroup.to_string(),
            origin: origin.to_string(),
            snapshot: snapshot.to_string(),
            size_bytes,
        });
        Ok(())
    }

    fn lvremove(&self, volumegroup: &str, snapshot: &str) -> Result<()> {
        self.calls.lock().expect("lock poisoned").push(FakeCall::LvRemove {
            volumegroup: volumegroup.to_string(),
            snapshot: snapshot.to_string(),
        });
        Ok(())
    }

    fn open_block_device(&self, volumegroup: &str, snapshot: &str) -> Result<Box<dyn Read>> {
        let path = LvmSnapshotter::device_path(volumegroup, snapshot);
        let contents = self
            .device_contents
            .lock()
            .expect("lock poisoned")
            .iter()
            .find(|(p, _)| p == &path)
            .map(|(_, bytes)| bytes.clone())
            .ok_or_else(|| Error::NotFoundBlockDevice { path: path.clone() })?;
        Ok(Box::new(Cursor::new(contents)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fake_records_calls_in_order() {
        let fake = FakeSnapshotter::new();
        fake.sync().unwrap();
        fake.lvcreate("vg0", "vol", "vol.snap", 1024).unwrap();
        fake.lvremove("vg0", "vol.snap").unwrap();
        assert_eq!(
            fake.calls(),
            vec![
                FakeCall::Sync,
                FakeCall::LvCreate {
                    volumegroup: "vg0".to_string(),
                    origin: "vol".to_string(),
                    snapshot: "vol.snap".to_string(),
                    size_bytes: 1024,
                },
                FakeCall::LvRemove { volumegroup: "vg0".to_string(), snapshot: "vol.snap".to_string() },
            ]
        );
    }

    #[test]
    fn fake_device_round_trips_seeded_bytes() {
        let fake = FakeSnapshotter::new();
        fake.seed_device("vg0", "vol.snap", b"disk contents".to_vec());
        let mut reader = fake.open_block_device("vg0", "vol.snap").unwrap();
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).unwrap();
        assert_eq!(buf, b"disk contents");
    }

    #[test]
    fn fake_device_missing_is_an_error() {
        let fake = FakeSnapshotter::new();
        assert!(fake.open_block_device("vg0", "nope").is_err());
    }

    #[test]
    fn device_path_format() {
        assert_eq!(LvmSnapshotter::device_path("vg0", "vol.snap"), "/dev/vg0/vol.snap");
    }
}

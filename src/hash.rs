// Shasplit backup engine.

//! Hash algorithm selection and streaming digest computation.
//!
//! The repository fixes one algorithm at creation time (data model
//! invariant 6); everywhere else in the engine just asks a [Digest] to
//! update itself with bytes and eventually produce a hex digest. This is
//! the same seam conserve draws around its own (fixed) BLAKE2b hashing in
//! `blockdir.rs`, generalized here to a tagged enum because shasplit must
//! support a configurable algorithm.

use std::str::FromStr;

use sha1::Sha1;
use sha2::{Digest as _, Sha224, Sha256, Sha384, Sha512};
use strum_macros::{Display, EnumIter};

use crate::errors::{Error, Result};

/// A supported cryptographic hash algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum Algorithm {
    Sha1,
    Sha224,
    Sha256,
    Sha384,
    Sha512,
}

impl FromStr for Algorithm {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "sha1" => Ok(Algorithm::Sha1),
            "sha224" => Ok(Algorithm::Sha224),
            "sha256" => Ok(Algorithm::Sha256),
            "sha384" => Ok(Algorithm::Sha384),
            "sha512" => Ok(Algorithm::Sha512),
            other => Err(Error::validation(
                "algorithm",
                format!("unknown hash algorithm {other:?}"),
            )),
        }
    }
}

impl Algorithm {
    /// Start a fresh streaming digest for this algorithm.
    pub fn digest(self) -> StreamingDigest {
        match self {
            Algorithm::Sha1 => StreamingDigest::Sha1(Sha1::new()),
            Algorithm::Sha224 => StreamingDigest::Sha224(Sha224::new()),
            Algorithm::Sha256 => StreamingDigest::Sha256(Sha256::new()),
            Algorithm::Sha384 => StreamingDigest::Sha384(Sha384::new()),
            Algorithm::Sha512 => StreamingDigest::Sha512(Sha512::new()),
        }
    }

    /// Hash a single byte slice in one call, returning its hex digest.
    pub fn hash_hex(self, bytes: &[u8]) -> String {
        let mut digest = self.digest();
        digest.update(bytes);
        digest.finalize_hex()
    }
}

/// An in-progress digest over an algorithm chosen at runtime.
///
/// One variant per [Algorithm]; `update`/`finalize_hex` dispatch to the
/// concrete RustCrypto hasher without the caller needing to know which one.
pub enum StreamingDigest {
    Sha1(Sha1),
    Sha224(Sha224),
    Sha256(Sha256),
    Sha384(Sha384),
    Sha512(Sha512),
}

impl StreamingDigest {
    pub fn update(&mut self, bytes: &[u8]) {
        match self {
            StreamingDigest::Sha1(h) => h.update(bytes),
            StreamingDigest::Sha224(h) => h.update(bytes),
            StreamingDigest::Sha256(h) => h.update(bytes),
            StreamingDigest::Sha384(h) => h.update(bytes),
            StreamingDigest::Sha512(h) => h.update(bytes),
        }
    }

    /// Consume the digest, returning its hex-encoded final value.
    pub fn finalize_hex(self) -> String {
        match self {
            StreamingDigest::Sha1(h) => hex::encode(h.finalize()),
            StreamingDigest::Sha224(h) => hex::encode(h.finalize()),
            StreamingDigest::Sha256(h) => hex::encode(h.finalize()),
            StreamingDigest::Sha384(h) => hex::encode(h.finalize()),
            StreamingDigest::Sha512(h) => hex::encode(h.finalize()),
        }
    }
}

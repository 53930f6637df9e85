// Shasplit backup engine.

//! Input validation for all string and integer values that cross into the
//! repository engine.
//!
//! Every validator fails before any I/O happens, so a malformed argument
//! never leaves a half-finished instance behind. `timestamp` validation in
//! particular must accept exactly `YYYY-MM-DDThh:mm:ss`, per the original
//! `shasplit.py` regex this engine is modeled on.

use lazy_static::lazy_static;
use regex::Regex;

use crate::errors::{Error, Result};
use crate::hash::Algorithm;

lazy_static! {
    static ref TIMESTAMP_RE: Regex =
        Regex::new(r"^\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}$").expect("valid regex");
}

/// Validate a backup `name`.
///
/// Names must be non-empty, contain no path separator, not start with
/// `.`, `_`, or `-` (so they can never collide with `.data` or look like a
/// flag), and must not end with `snapshot_suffix` (which would collide with
/// a live LVM snapshot name).
pub fn validate_name(name: &str, snapshot_suffix: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::validation("name", "must not be empty"));
    }
    if name.contains('/') || name.contains(std::path::MAIN_SEPARATOR) {
        return Err(Error::validation("name", "must not have a path separator"));
    }
    if matches!(name.chars().next(), Some('.' | '_' | '-')) {
        return Err(Error::validation(
            "name",
            "must not start with '.', '_', or '-'",
        ));
    }
    if !snapshot_suffix.is_empty() && name.ends_with(snapshot_suffix) {
        return Err(Error::validation(
            "name",
            format!("must not end with the reserved snapshot suffix {snapshot_suffix:?}"),
        ));
    }
    Ok(())
}

/// Validate an ISO-8601 local timestamp of the form `YYYY-MM-DDThh:mm:ss`.
pub fn validate_timestamp(timestamp: &str) -> Result<()> {
    if TIMESTAMP_RE.is_match(timestamp) {
        Ok(())
    } else {
        Err(Error::validation(
            "timestamp",
            format!("must have format YYYY-MM-DDThh:mm:ss, got {timestamp:?}"),
        ))
    }
}

/// Validate a hash algorithm name, returning the parsed [Algorithm].
pub fn validate_algorithm(algorithm: &str) -> Result<Algorithm> {
    algorithm.parse()
}

/// Validate that `value` is a strictly positive integer parameter.
pub fn validate_positive(field: &'static str, value: u64) -> Result<u64> {
    if value == 0 {
        Err(Error::validation(field, "must be positive"))
    } else {
        Ok(value)
    }
}

/// Validate a volume group name for the LVM collaborator.
pub fn validate_volumegroup(volumegroup: &str) -> Result<()> {
    if volumegroup.is_empty() {
        return Err(Error::validation("volumegroup", "must not be empty"));
    }
    if volumegroup.contains('/') || volumegroup.contains(std::path::MAIN_SEPARATOR) {
        return Err(Error::validation(
            "volumegroup",
            "must not have a path component",
        ));
    }
    if volumegroup.starts_with('.') || volumegroup.starts_with('-') {
        return Err(Error::validation(
            "volumegroup",
            "must not start with '.' or '-'",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_names_accepted() {
        assert!(validate_name("myvolume", ".snap").is_ok());
        assert!(validate_name("a", ".snap").is_ok());
    }

    #[test]
    fn empty_name_rejected() {
        assert!(validate_name("", ".snap").is_err());
    }

    #[test]
    fn name_with_separator_rejected() {
        assert!(validate_name("a/b", ".snap").is_err());
    }

    #[test]
    fn name_starting_with_reserved_char_rejected() {
        for bad in [".data", "_hidden", "-flag"] {
            assert!(validate_name(bad, ".snap").is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn name_ending_with_snapshot_suffix_rejected() {
        assert!(validate_name("myvolume.snap", ".snap").is_err());
    }

    #[test]
    fn valid_timestamp_accepted() {
        assert!(validate_timestamp("2021-01-02T03:04:05").is_ok());
    }

    #[test]
    fn malformed_timestamps_rejected() {
        for bad in ["2021-01-02", "2021-01-02T03:04", "not-a-timestamp", "2021-01-02T03:04:05Z"] {
            assert!(validate_timestamp(bad).is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn algorithm_parses_known_names() {
        assert!(validate_algorithm("sha256").is_ok());
        assert!(validate_algorithm("sha3-256").is_err());
    }

    #[test]
    fn positive_rejects_zero() {
        assert!(validate_positive("partsize", 0).is_err());
        assert!(validate_positive("partsize", 1).is_ok());
    }

    #[test]
    fn volumegroup_rules() {
        assert!(validate_volumegroup("vg0").is_ok());
        assert!(validate_volumegroup("").is_err());
        assert!(validate_volumegroup(".hidden").is_err());
        assert!(validate_volumegroup("-flag").is_err());
        assert!(validate_volumegroup("a/b").is_err());
    }
}
